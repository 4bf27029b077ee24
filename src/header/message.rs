//! The chunk message header: 11, 7, 3 or 0 bytes depending on the format
//! bits of the basic header. The shorter formats omit fields that repeat the
//! previous header on the same channel.

use deku::prelude::*;

/// The four message-header layouts. The format is carried in the basic
/// header, so this enum is discriminated by context rather than by its own
/// leading bits.
///
/// Any 3-byte timestamp field saturated at 0xFFFFFF announces a 4-byte
/// extended timestamp after the fixed portion; see
/// [`MessageHeader::has_extended_timestamp`].
#[derive(Debug, PartialEq, DekuRead, DekuWrite)]
#[deku(ctx = "format: u8", id = "format", endian = "big")]
pub enum MessageHeader {
    /// Format 0: the full, absolute description of a message. Required on
    /// the first chunk of a channel and whenever the timestamp moves
    /// backwards.
    #[deku(id = "0")]
    Full {
        /// Absolute timestamp of the message.
        #[deku(bytes = "3")]
        timestamp: u32,

        /// Length of the whole message body, which may span many chunks.
        #[deku(bytes = "3")]
        body_length: u32,

        /// What kind of payload the message carries. Opaque to this crate.
        datatype: u8,

        /// The logical stream the message belongs to. Stored low byte
        /// first, unlike every other multi-byte field in the protocol.
        #[deku(endian = "little")]
        stream_id: u32,
    },

    /// Format 1: a new message on the same stream as the previous one. The
    /// timestamp is a delta against the previous message.
    #[deku(id = "1")]
    TimestampDeltaAndLength {
        #[deku(bytes = "3")]
        timestamp_delta: u32,

        #[deku(bytes = "3")]
        body_length: u32,

        datatype: u8,
    },

    /// Format 2: a new message identical to the previous one except for its
    /// timestamp.
    #[deku(id = "2")]
    TimestampDelta {
        #[deku(bytes = "3")]
        timestamp_delta: u32,
    },

    /// Format 3: no header at all. Continues the previous header on the
    /// channel, either for the next chunk of an in-progress message or for
    /// a new message indistinguishable from the last.
    #[deku(id = "3")]
    Continuation,
}

impl MessageHeader {
    pub fn size(&self) -> usize {
        match self {
            Self::Full { .. } => 11,
            Self::TimestampDeltaAndLength { .. } => 7,
            Self::TimestampDelta { .. } => 3,
            Self::Continuation => 0,
        }
    }

    /// Whether a 4-byte extended timestamp follows the fixed portion. A
    /// continuation carries no timestamp field, so it never has one.
    pub fn has_extended_timestamp(&self) -> bool {
        match *self {
            MessageHeader::Full { timestamp, .. } => timestamp == 0xFFFFFF,
            MessageHeader::TimestampDeltaAndLength {
                timestamp_delta, ..
            }
            | MessageHeader::TimestampDelta { timestamp_delta } => timestamp_delta == 0xFFFFFF,
            MessageHeader::Continuation => false,
        }
    }

    /// The raw 3-byte timestamp or timestamp-delta field, if this format
    /// carries one.
    pub fn timestamp_field(&self) -> Option<u32> {
        match *self {
            MessageHeader::Full { timestamp, .. } => Some(timestamp),
            MessageHeader::TimestampDeltaAndLength {
                timestamp_delta, ..
            }
            | MessageHeader::TimestampDelta { timestamp_delta } => Some(timestamp_delta),
            MessageHeader::Continuation => None,
        }
    }

}
