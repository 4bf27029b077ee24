//! The outbound half of the codec: messages in, an interleaved chunk stream
//! out.
//!
//! The muxer owns a bounded pool of channel ids. A message acquires a
//! channel, drains one frame per step — every active channel gets a turn,
//! in allocation order — and releases the channel when its body runs out.
//! The [`Encoder`] adds backpressure on top: messages that arrive while the
//! pool is saturated wait in a FIFO until a channel frees up.

use std::collections::{HashMap, VecDeque};

use bytes::{Bytes, BytesMut};

use crate::channel::Channel;
use crate::error::EncodeError;
use crate::header::{ChunkHeader, Header, Timestamp, MAX_BODY_LENGTH};
use crate::{FRAME_SIZE, MAX_CHANNELS, MIN_CHANNEL_ID};

/// Outcome of one encoder step.
#[derive(Debug, PartialEq, Eq)]
pub enum EncodeStep {
    /// Frames were written, or work is still queued; step again.
    Produced,
    /// Nothing active and nothing pending.
    Idle,
}

/// Shares the bounded pool of channel ids among competing messages and
/// emits their chunks round-robin.
#[derive(Debug)]
pub struct ChannelMuxer {
    channels: HashMap<u32, Channel>,
    /// Body buffers of the active channels.
    bodies: HashMap<u32, Bytes>,
    /// The last header emitted per channel id. Survives release so a reused
    /// id can keep compressing against what the peer already knows.
    last_sent: HashMap<u32, Header>,
    /// Ids available for allocation, recently released at the front.
    free: VecDeque<u32>,
    /// Active channel ids in allocation order.
    active: Vec<u32>,
    /// Position of each active id in `active`.
    index: HashMap<u32, usize>,
    in_use: usize,
    max_active: usize,
    frame_size: u32,
}

impl Default for ChannelMuxer {
    fn default() -> Self {
        Self::with_min_channel_id(MIN_CHANNEL_ID)
    }
}

impl ChannelMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A muxer allocating ids from `min_channel_id` up. Callers normally
    /// want [`MIN_CHANNEL_ID`]; tests and servers that reserve extra control
    /// channels can raise it.
    pub fn with_min_channel_id(min_channel_id: u32) -> Self {
        Self {
            channels: HashMap::new(),
            bodies: HashMap::new(),
            last_sent: HashMap::new(),
            free: (min_channel_id..MAX_CHANNELS).collect(),
            active: Vec::new(),
            index: HashMap::new(),
            in_use: 0,
            max_active: (MAX_CHANNELS - min_channel_id) as usize,
            frame_size: FRAME_SIZE,
        }
    }

    /// Set the frame size for every channel, effective at each channel's
    /// next frame boundary.
    pub fn set_frame_size(&mut self, size: u32) {
        tracing::debug!(size, "outbound frame size changed");
        self.frame_size = size;

        for channel in self.channels.values_mut() {
            channel.set_frame_size(size);
        }
    }

    /// Whether every channel id is spoken for. Callers must check this
    /// before [`send`](Self::send), or queue — see [`Encoder`].
    pub fn is_full(&self) -> bool {
        self.in_use == self.max_active
    }

    /// Whether no message is currently being drained.
    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    /// Number of channels currently carrying a message.
    pub fn channels_in_use(&self) -> usize {
        self.in_use
    }

    /// Number of channel ids available for allocation.
    pub fn free_channels(&self) -> usize {
        self.free.len()
    }

    /// Make the next available channel unavailable until the matching
    /// [`release`](Self::release), and return it. `None` means the pool is
    /// saturated. There is no control over which id comes back.
    pub fn acquire(&mut self) -> Option<&mut Channel> {
        let channel_id = self.free.pop_front()?;

        self.index.insert(channel_id, self.active.len());
        self.active.push(channel_id);
        self.in_use += 1;
        tracing::trace!(channel_id, "channel acquired");

        let frame_size = self.frame_size;
        Some(
            self.channels
                .entry(channel_id)
                .or_insert_with(|| Channel::new(channel_id, frame_size)),
        )
    }

    /// Return a channel id to the pool. Released ids go to the front of the
    /// queue: a recently used id likely still has header state cached on
    /// the peer.
    pub fn release(&mut self, channel_id: u32) -> Result<(), EncodeError> {
        let position = self
            .index
            .remove(&channel_id)
            .ok_or(EncodeError::ChannelNotActive(channel_id))?;

        self.active.remove(position);
        for (i, id) in self.active.iter().enumerate().skip(position) {
            self.index.insert(*id, i);
        }

        self.free.push_front(channel_id);
        self.in_use -= 1;
        self.bodies.remove(&channel_id);
        tracing::trace!(channel_id, "channel released");

        Ok(())
    }

    /// Claim a channel for a message and stage its body. The chunks come
    /// out of subsequent [`step`](Self::step) calls.
    pub fn send(
        &mut self,
        body: Bytes,
        datatype: u8,
        stream_id: u32,
        timestamp: u32,
    ) -> Result<(), EncodeError> {
        if body.len() > MAX_BODY_LENGTH as usize {
            return Err(EncodeError::MessageTooLong(body.len()));
        }

        let body_length = body.len() as u32;
        let channel = self.acquire().ok_or(EncodeError::ChannelsExhausted)?;
        let channel_id = channel.id();

        let header = Header {
            channel_id,
            timestamp,
            datatype,
            body_length,
            stream_id,
        };
        channel.set_header(header, Timestamp::Absolute(timestamp));

        self.bodies.insert(channel_id, body);
        Ok(())
    }

    /// Emit one chunk for every active channel, in allocation order, and
    /// release the channels that completed. Returns whether anything was
    /// written.
    pub fn step(&mut self, out: &mut BytesMut) -> Result<bool, EncodeError> {
        // channels release mid-iteration, so walk a snapshot
        let ids: Vec<u32> = self.active.clone();
        let mut wrote = false;

        for channel_id in ids {
            self.pump(channel_id, out)?;
            wrote = true;
        }

        Ok(wrote)
    }

    /// Write one chunk — compressed header plus one frame of body — for a
    /// single channel.
    fn pump(&mut self, channel_id: u32, out: &mut BytesMut) -> Result<(), EncodeError> {
        let channel = self
            .channels
            .get_mut(&channel_id)
            .ok_or(EncodeError::ChannelNotActive(channel_id))?;
        let header = match channel.header() {
            Some(header) => *header,
            None => return Err(EncodeError::ChannelNotActive(channel_id)),
        };

        // the first frame opens the message; later frames are continuations
        let wire = if channel.bytes() == 0 {
            ChunkHeader::diff(self.last_sent.get(&channel_id), &header)?
        } else {
            ChunkHeader::continuation(channel_id)?
        };
        out.extend_from_slice(&wire.encode().map_err(EncodeError::Header)?);

        let n = channel.frame_len() as usize;
        let offset = channel.bytes() as usize;
        let body = self
            .bodies
            .get(&channel_id)
            .ok_or(EncodeError::ChannelNotActive(channel_id))?;
        out.extend_from_slice(&body[offset..offset + n]);

        channel.advance(n as u32);
        let complete = channel.complete();
        if complete {
            channel.reset();
        }

        self.last_sent.insert(channel_id, header);

        if complete {
            self.release(channel_id)?;
        }

        Ok(())
    }
}

struct Pending {
    stream_id: u32,
    datatype: u8,
    timestamp: u32,
    body: Bytes,
}

/// The muxer plus backpressure: messages that cannot get a channel wait in
/// a FIFO and are promoted as channels free up.
pub struct Encoder {
    muxer: ChannelMuxer,
    pending: VecDeque<Pending>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            muxer: ChannelMuxer::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn with_min_channel_id(min_channel_id: u32) -> Self {
        Self {
            muxer: ChannelMuxer::with_min_channel_id(min_channel_id),
            pending: VecDeque::new(),
        }
    }

    pub fn set_frame_size(&mut self, size: u32) {
        self.muxer.set_frame_size(size);
    }

    /// Messages waiting for a free channel.
    pub fn pending_messages(&self) -> usize {
        self.pending.len()
    }

    /// Channels currently draining a message.
    pub fn active_channels(&self) -> usize {
        self.muxer.channels_in_use()
    }

    /// Queue a message for transmission. Never fails for lack of a channel;
    /// saturation just means the message waits its turn.
    pub fn send(
        &mut self,
        body: Bytes,
        datatype: u8,
        stream_id: u32,
        timestamp: u32,
    ) -> Result<(), EncodeError> {
        if body.len() > MAX_BODY_LENGTH as usize {
            return Err(EncodeError::MessageTooLong(body.len()));
        }

        if self.muxer.is_full() {
            self.pending.push_back(Pending {
                stream_id,
                datatype,
                timestamp,
                body,
            });
            return Ok(());
        }

        self.muxer.send(body, datatype, stream_id, timestamp)
    }

    /// Emit one frame per active channel, then promote pending messages
    /// into the channels that freed up.
    pub fn step(&mut self, out: &mut BytesMut) -> Result<EncodeStep, EncodeError> {
        let wrote = self.muxer.step(out)?;

        while !self.muxer.is_full() {
            match self.pending.pop_front() {
                Some(next) => {
                    self.muxer
                        .send(next.body, next.datatype, next.stream_id, next.timestamp)?
                }
                None => break,
            }
        }

        if wrote || !self.pending.is_empty() || !self.muxer.is_idle() {
            Ok(EncodeStep::Produced)
        } else {
            Ok(EncodeStep::Idle)
        }
    }
}
