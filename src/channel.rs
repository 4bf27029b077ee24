//! Per-channel bookkeeping. A [`Channel`] is a cursor over the message
//! currently crossing the channel: how much of the body has gone by, how far
//! the current frame has to run, and the absolute header everything is being
//! merged against. It knows nothing about buffers or byte order; the decode
//! and encode layers drive it.

use crate::error::ProtocolError;
use crate::header::{ChunkHeader, Header, Timestamp};

#[derive(Debug)]
pub struct Channel {
    id: u32,
    header: Option<Header>,
    /// How the message currently on the channel moves the stream clock.
    /// Latched from the chunk that opened the message.
    timestamp: Timestamp,
    /// Body bytes of the current message already consumed or produced.
    bytes: u32,
    /// `header.body_length - bytes`. The message is complete at zero.
    body_remaining: u32,
    frame_size: u32,
    /// Bytes left before the next frame boundary.
    frame_remaining: u32,
}

impl Channel {
    pub fn new(id: u32, frame_size: u32) -> Self {
        Self {
            id,
            header: None,
            timestamp: Timestamp::Delta(0),
            bytes: 0,
            body_remaining: 0,
            frame_size,
            frame_remaining: frame_size,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// The current absolute header, or `None` if the channel has never seen
    /// one. Retained across messages as compression context.
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// The stream-clock event of the message currently on the channel.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Body bytes consumed or produced so far for the current message.
    pub fn bytes(&self) -> u32 {
        self.bytes
    }

    /// Whether the current message has met its body length.
    pub fn complete(&self) -> bool {
        self.body_remaining == 0
    }

    /// Clear the cursor so the channel can host a new message. The header
    /// survives: it is the merge context for the compressed headers of
    /// whatever message comes next, which is the whole point of the
    /// compression scheme.
    pub fn reset(&mut self) {
        self.timestamp = Timestamp::Delta(0);
        self.bytes = 0;
        self.body_remaining = 0;
        self.frame_remaining = self.frame_size;
    }

    /// Record a new frame size. A channel sitting at a frame boundary picks
    /// it up immediately; one mid-frame finishes its countdown first, and
    /// the boundary reset in [`advance`](Self::advance) applies the new
    /// size.
    pub fn set_frame_size(&mut self, size: u32) {
        if self.frame_remaining == self.frame_size {
            self.frame_remaining = size;
        }
        self.frame_size = size;
    }

    /// Resolve an incoming wire header against this channel's state without
    /// committing anything. Kept separate from [`set_header`](Self::set_header)
    /// so that a frame whose body has not fully arrived can be retried later
    /// without applying a timestamp delta twice.
    pub fn merge(&self, incoming: &ChunkHeader) -> Result<Header, ProtocolError> {
        let merged = incoming.merge(self.header.as_ref())?;

        if merged.body_length < self.bytes {
            return Err(ProtocolError::BodyOverrun(
                self.id,
                self.bytes,
                merged.body_length,
            ));
        }

        Ok(merged)
    }

    /// Commit an absolute header to the channel. When this opens a message
    /// (no body bytes consumed yet) the stream-clock event is latched;
    /// continuation headers mid-message leave it alone.
    pub fn set_header(&mut self, header: Header, timestamp: Timestamp) {
        if self.bytes == 0 {
            self.timestamp = timestamp;
        }

        self.body_remaining = header.body_length - self.bytes;
        self.header = Some(header);
    }

    /// How many body bytes the next frame carries: the frame countdown, the
    /// frame size and the remaining body, whichever runs out first.
    pub fn frame_len(&self) -> u32 {
        self.frame_remaining
            .min(self.frame_size)
            .min(self.body_remaining)
    }

    /// Like [`frame_len`](Self::frame_len) but against a header that has
    /// not been committed yet.
    pub fn frame_len_for(&self, header: &Header) -> u32 {
        self.frame_remaining
            .min(self.frame_size)
            .min(header.body_length - self.bytes)
    }

    /// Account for `n` body bytes moving through the channel. `n` never
    /// exceeds `frame_len()`; crossing a frame boundary resets the countdown
    /// to the current frame size.
    pub fn advance(&mut self, n: u32) {
        self.bytes += n;
        self.body_remaining -= n;

        if n == self.frame_remaining {
            self.frame_remaining = self.frame_size;
        } else {
            self.frame_remaining -= n;
        }
    }
}
