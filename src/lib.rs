//! A sans-I/O codec for the RTMP chunk stream layer.
//!
//! RTMP multiplexes many logical message streams over one byte-oriented
//! transport by interleaving fixed-size chunks, each tagged with a
//! compressed header naming the channel it belongs to. This crate owns that
//! layer and nothing else: it turns raw bytes into complete, metadata-tagged
//! messages ([`Decoder`]) and turns outbound messages into an interleaved
//! chunk stream ([`Encoder`]). The handshake, the transport and the meaning
//! of message payloads all live with the caller.
//!
//! The codec never blocks and performs no I/O. Both directions are driven by
//! repeated `step()` calls from whatever scheduler owns the connection;
//! every suspension point is a return value, not a callback.

mod channel;
mod decode;
mod encode;
mod error;
pub mod header;
pub mod message;

pub use channel::Channel;
pub use decode::{
    ChannelDemuxer, Decoder, Dispatcher, Frame, FrameReader, Message, MessageStream, Step,
    StreamFactory,
};
pub use encode::{ChannelMuxer, EncodeStep, Encoder};
pub use error::{DecodeError, EncodeError, ProtocolError};
pub use header::{ChunkHeader, Header, Timestamp};

/// The default number of bytes per RTMP chunk, excluding the chunk header.
/// Either peer may raise it mid-stream with a Set Chunk Size message, which
/// the message layer relays here via `set_frame_size`.
pub const FRAME_SIZE: u32 = 128;

/// Maximum number of channels that can be active per RTMP connection.
pub const MAX_CHANNELS: u32 = 64;

/// The lowest channel id the encoder will allocate. Ids 0 and 1 are escape
/// markers in the basic header and id 2 is reserved for protocol control
/// messages, so outgoing messages start at 3.
pub const MIN_CHANNEL_ID: u32 = 3;
