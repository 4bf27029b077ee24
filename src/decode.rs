//! The inbound half of the codec: raw bytes in, dispatched messages out.
//!
//! Three layers, each driven by `step()`:
//!
//! * [`FrameReader`] pulls one chunk (header + at most one frame of body)
//!   off the buffer and advances the owning channel.
//! * [`ChannelDemuxer`] reassembles non-streamable channel data across
//!   chunks and emits complete messages; audio and video pass straight
//!   through.
//! * [`Decoder`] resolves the stream, accumulates the stream clock and
//!   hands the message to the dispatcher.
//!
//! Nothing here blocks: running out of buffered bytes rewinds and reports
//! [`Step::NeedMore`], and a fully drained buffer reports
//! [`Step::Exhausted`].

use std::collections::HashMap;
use std::mem;

use bytes::{Bytes, BytesMut};
use deku::bitvec::{BitVec, Msb0};
use deku::prelude::*;

use crate::channel::Channel;
use crate::error::{DecodeError, ProtocolError};
use crate::header::{ChunkHeader, Header, Timestamp};
use crate::message;
use crate::{FRAME_SIZE, MAX_CHANNELS};

/// Outcome of one decoder step.
#[derive(Debug)]
pub enum Step<T> {
    /// A unit of work was produced; step again.
    Ready(T),
    /// The buffer holds a partial header or frame; push more data.
    NeedMore,
    /// Every buffered byte has been consumed.
    Exhausted,
}

/// One chunk as read off the wire: up to a frame of body bytes plus the
/// state of the channel it advanced.
#[derive(Debug)]
pub struct Frame {
    pub payload: Bytes,
    /// Whether this chunk completed its message.
    pub complete: bool,
    /// Whether this chunk opened its message.
    pub started: bool,
    /// The merged absolute header governing the message.
    pub header: Header,
    /// The stream-clock event of the chunk that opened the message.
    pub timestamp: Timestamp,
}

/// A message (or, for streamable datatypes, a piece of one) ready for
/// dispatch.
#[derive(Debug)]
pub struct Message {
    pub header: Header,
    pub timestamp: Timestamp,
    pub body: Bytes,
}

/// Reads chunks from an append-only buffer, one per step, advancing the
/// per-channel cursors as it goes.
#[derive(Debug)]
pub struct FrameReader {
    /// Bytes pushed but not yet consumed.
    buffer: BitVec<u8, Msb0>,
    channels: HashMap<u32, Channel>,
    frame_size: u32,
    consumed: u64,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self {
            buffer: BitVec::new(),
            channels: HashMap::new(),
            frame_size: FRAME_SIZE,
            consumed: 0,
        }
    }
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add more data for the reader to consume.
    pub fn push(&mut self, data: &[u8]) {
        let mut bytes = mem::take(&mut self.buffer).into_vec();
        bytes.extend_from_slice(data);
        self.buffer = BitVec::from_vec(bytes);
    }

    /// Total wire bytes decoded so far. The message layer needs this to
    /// emit Acknowledgement messages against the peer's window.
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    /// Set the frame size for every channel, effective at each channel's
    /// next frame boundary.
    pub fn set_frame_size(&mut self, size: u32) {
        tracing::debug!(size, "inbound frame size changed");
        self.frame_size = size;

        for channel in self.channels.values_mut() {
            channel.set_frame_size(size);
        }
    }

    pub fn channel(&self, channel_id: u32) -> Option<&Channel> {
        self.channels.get(&channel_id)
    }

    /// Pull the next chunk out of the buffer.
    ///
    /// Nothing is consumed unless the whole chunk — header and frame — is
    /// buffered, so a `NeedMore` leaves the reader exactly where it was.
    pub fn step(&mut self) -> Result<Step<Frame>, DecodeError> {
        if self.buffer.is_empty() {
            return Ok(Step::Exhausted);
        }

        let (rest, wire) = match ChunkHeader::read(&self.buffer, ()) {
            Ok(parsed) => parsed,
            Err(DekuError::Incomplete(_)) => return Ok(Step::NeedMore),
            Err(e) => return Err(DecodeError::Malformed(e)),
        };

        let channel_id = wire.channel_id();
        if channel_id > MAX_CHANNELS {
            return Err(ProtocolError::ChannelOutOfRange(channel_id, MAX_CHANNELS).into());
        }

        let frame_size = self.frame_size;
        let channel = self
            .channels
            .entry(channel_id)
            .or_insert_with(|| Channel::new(channel_id, frame_size));

        let merged = channel.merge(&wire)?;
        let need = channel.frame_len_for(&merged) as usize;

        if rest.len() < need * 8 {
            return Ok(Step::NeedMore);
        }

        let started = channel.bytes() == 0;
        let payload = Bytes::from(rest[..need * 8].to_bitvec().into_vec());
        let remainder = rest[need * 8..].to_bitvec();
        self.consumed += (wire.size() + need) as u64;
        self.buffer = remainder;

        channel.set_header(merged, wire.timestamp());
        channel.advance(need as u32);

        let complete = channel.complete();
        let timestamp = channel.timestamp();

        if complete {
            channel.reset();
        }

        Ok(Step::Ready(Frame {
            payload,
            complete,
            started,
            header: merged,
            timestamp,
        }))
    }
}

/// Buffers non-streamable channel data across chunks and emits whole
/// messages. Streamable datatypes (audio, video) bypass the buffering and
/// come out one frame at a time.
#[derive(Debug, Default)]
pub struct ChannelDemuxer {
    reader: FrameReader,
    /// Partial bodies, keyed by channel id.
    buckets: HashMap<u32, BytesMut>,
}

impl ChannelDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.reader.push(data);
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.reader.bytes_consumed()
    }

    pub fn set_frame_size(&mut self, size: u32) {
        self.reader.set_frame_size(size);
    }

    /// Read one chunk. `Ready(Some(_))` carries a deliverable message;
    /// `Ready(None)` means the chunk was buffered and the caller should
    /// step again.
    pub fn step(&mut self) -> Result<Step<Option<Message>>, DecodeError> {
        let frame = match self.reader.step()? {
            Step::Ready(frame) => frame,
            Step::NeedMore => return Ok(Step::NeedMore),
            Step::Exhausted => return Ok(Step::Exhausted),
        };

        if message::is_streamable(frame.header.datatype) {
            // pass it right on through; the consumer handles partial data
            let timestamp = if frame.started {
                frame.timestamp
            } else {
                Timestamp::Delta(0)
            };

            return Ok(Step::Ready(Some(Message {
                header: frame.header,
                timestamp,
                body: frame.payload,
            })));
        }

        if frame.complete {
            let body = match self.buckets.remove(&frame.header.channel_id) {
                Some(mut bucket) => {
                    bucket.extend_from_slice(&frame.payload);
                    bucket.freeze()
                }
                None => frame.payload,
            };

            return Ok(Step::Ready(Some(Message {
                header: frame.header,
                timestamp: frame.timestamp,
                body,
            })));
        }

        self.buckets
            .entry(frame.header.channel_id)
            .or_default()
            .extend_from_slice(&frame.payload);

        Ok(Step::Ready(None))
    }
}

/// A logical stream as seen by the decoder: something with a running clock.
/// The caller decides what else a stream is.
pub trait MessageStream {
    fn timestamp(&self) -> u32;
    fn set_timestamp(&mut self, timestamp: u32);
}

/// Builds or looks up the stream object behind a stream id.
pub trait StreamFactory {
    type Stream: MessageStream;

    fn stream_for(&mut self, stream_id: u32) -> &mut Self::Stream;
}

/// Receives decoded messages. The return value of the dispatch is the
/// caller's business; the decoder ignores it.
pub trait Dispatcher<S> {
    fn dispatch(&mut self, stream: &mut S, datatype: u8, timestamp: u32, body: Bytes);
}

/// The top of the inbound stack: demultiplexes, accumulates the per-stream
/// clock and dispatches. Both collaborators are injected values — there is
/// no ambient registry.
#[derive(Debug)]
pub struct Decoder<D, F> {
    demuxer: ChannelDemuxer,
    dispatcher: D,
    streams: F,
}

impl<D, F> Decoder<D, F>
where
    F: StreamFactory,
    D: Dispatcher<F::Stream>,
{
    pub fn new(dispatcher: D, streams: F) -> Self {
        Self {
            demuxer: ChannelDemuxer::new(),
            dispatcher,
            streams,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.demuxer.push(data);
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.demuxer.bytes_consumed()
    }

    pub fn set_frame_size(&mut self, size: u32) {
        self.demuxer.set_frame_size(size);
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn streams(&self) -> &F {
        &self.streams
    }

    /// Decode one chunk and dispatch if it yielded a deliverable message.
    ///
    /// Format-0 headers carry an absolute timestamp and set the stream
    /// clock; the compressed formats advance it by their delta, once per
    /// message.
    pub fn step(&mut self) -> Result<Step<()>, DecodeError> {
        let message = match self.demuxer.step()? {
            Step::Ready(Some(message)) => message,
            Step::Ready(None) => return Ok(Step::Ready(())),
            Step::NeedMore => return Ok(Step::NeedMore),
            Step::Exhausted => return Ok(Step::Exhausted),
        };

        let stream = self.streams.stream_for(message.header.stream_id);

        match message.timestamp {
            Timestamp::Absolute(timestamp) => stream.set_timestamp(timestamp),
            Timestamp::Delta(delta) => {
                stream.set_timestamp(stream.timestamp().wrapping_add(delta))
            }
        }

        let timestamp = stream.timestamp();
        self.dispatcher
            .dispatch(stream, message.header.datatype, timestamp, message.body);

        Ok(Step::Ready(()))
    }
}
