use deku::DekuError;
use thiserror::Error;

pub use crate::header::ChannelIdError;

/// Fatal violations of the chunk stream protocol by the peer.
///
/// None of these are recoverable; the driver is expected to tear the
/// connection down when one surfaces.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A relative header arrived on a channel that has never seen an
    /// absolute one, so there is nothing to merge it against.
    #[error("relative header for channel {0} which has no prior header")]
    RelativeWithoutContext(u32),

    /// The peer referenced a channel id beyond what this codec tracks.
    #[error("channel id {0} exceeds the maximum of {1}")]
    ChannelOutOfRange(u32, u32),

    /// A header arrived mid-message declaring a body shorter than the bytes
    /// already consumed on the channel.
    #[error("body overrun on channel {0}: {1} bytes consumed of a {2} byte message")]
    BodyOverrun(u32, u32, u32),
}

/// Raised if there is an error decoding an RTMP bytestream.
///
/// Running out of buffered bytes is not an error at this level: the decoders
/// rewind and report `NeedMore` instead.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An impossible header encoding.
    #[error("malformed chunk header: {0}")]
    Malformed(DekuError),
}

/// Raised if there is an error encoding an RTMP bytestream.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The 3-byte length field caps message bodies at 0xFFFFFF bytes.
    #[error("message of {0} bytes does not fit a chunk stream message")]
    MessageTooLong(usize),

    /// Attempted to release a channel that is not active.
    #[error("attempted to release channel {0} but that channel is not active")]
    ChannelNotActive(u32),

    /// No channel could be allocated. Only reachable from paths that bypass
    /// `is_full`, which makes it an internal bug rather than backpressure.
    #[error("could not allocate a channel")]
    ChannelsExhausted,

    #[error(transparent)]
    ChannelId(#[from] ChannelIdError),

    #[error("failed to serialize chunk header: {0}")]
    Header(DekuError),
}
