//! Chunk headers: the wire forms, the absolute header they describe, and
//! the rules for moving between the two.
//!
//! The wire uses a three-way compression scheme. A header names only the
//! fields that changed since the previous header on the same channel;
//! [`ChunkHeader::merge`] reconstructs the absolute header on the way in and
//! [`ChunkHeader::diff`] picks the most compressed form on the way out.

use deku::{
    bitvec::{BitSlice, BitVec, Msb0},
    ctx::Endian,
    prelude::*,
};

mod basic;
mod message;

use crate::error::{EncodeError, ProtocolError};
use basic::BasicHeader;
use message::MessageHeader;

pub use basic::ChannelIdError;

/// Message bodies must fit the 3-byte length field.
pub const MAX_BODY_LENGTH: u32 = 0xFFFFFF;

/// The absolute description of a message on the wire: what every chunk
/// header decompresses to, and what the encoder compresses from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub channel_id: u32,
    pub timestamp: u32,
    pub datatype: u8,
    pub body_length: u32,
    pub stream_id: u32,
}

/// How a chunk header moves the stream clock: format 0 carries an absolute
/// timestamp, the compressed formats carry a delta against the previous
/// message on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    Absolute(u32),
    Delta(u32),
}

impl Timestamp {
    pub fn into_inner(self) -> u32 {
        match self {
            Self::Absolute(inner) | Self::Delta(inner) => inner,
        }
    }
}

/// A chunk header as it appears on the wire: basic header, one of the four
/// message-header layouts, and the optional extended timestamp.
#[derive(Debug, PartialEq)]
pub struct ChunkHeader {
    basic: BasicHeader,
    message: MessageHeader,
    extended_timestamp: Option<u32>,
}

impl<'a> DekuRead<'a> for ChunkHeader {
    fn read(
        input: &'a BitSlice<u8, Msb0>,
        _ctx: (),
    ) -> Result<(&'a BitSlice<u8, Msb0>, Self), DekuError>
    where
        Self: Sized,
    {
        let (input, basic) = BasicHeader::read(input, ())?;
        let (input, message) = MessageHeader::read(input, basic.format)?;

        let (input, extended_timestamp) = if message.has_extended_timestamp() {
            u32::read(input, Endian::Big).map(|(input, ts)| (input, Some(ts)))?
        } else {
            (input, None)
        };

        Ok((
            input,
            ChunkHeader {
                basic,
                message,
                extended_timestamp,
            },
        ))
    }
}

impl DekuWrite for ChunkHeader {
    fn write(&self, output: &mut BitVec<u8, Msb0>, ctx: ()) -> Result<(), DekuError> {
        self.basic.write(output, ctx)?;
        self.message.write(output, self.basic.format)?;
        self.extended_timestamp.write(output, Endian::Big)
    }
}

impl ChunkHeader {
    pub fn size(&self) -> usize {
        self.basic.size()
            + self.message.size()
            + if self.extended_timestamp.is_some() {
                4
            } else {
                0
            }
    }

    /// The id of the channel this chunk belongs to.
    pub fn channel_id(&self) -> u32 {
        self.basic.channel_id()
    }

    /// Whether this header must be merged against a prior header to be
    /// understood. Only format 0 stands on its own.
    pub fn is_relative(&self) -> bool {
        !matches!(self.message, MessageHeader::Full { .. })
    }

    /// The timestamp or timestamp delta carried by this header, with the
    /// extended field folded in. A continuation carries neither and reports
    /// a delta of zero.
    pub fn timestamp(&self) -> Timestamp {
        let value = match self.message.timestamp_field() {
            Some(raw) => self.extended_timestamp.unwrap_or(raw),
            None => 0,
        };

        match self.message {
            MessageHeader::Full { .. } => Timestamp::Absolute(value),
            _ => Timestamp::Delta(value),
        }
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>, DekuError> {
        let mut bits = BitVec::<u8, Msb0>::new();
        self.write(&mut bits, ())?;
        Ok(bits.into_vec())
    }

    /// Resolve this wire header into an absolute [`Header`], inheriting the
    /// omitted fields from `prior`. A relative header with no prior header
    /// to merge against is a protocol error.
    pub fn merge(&self, prior: Option<&Header>) -> Result<Header, ProtocolError> {
        let channel_id = self.channel_id();

        match (&self.message, prior) {
            (
                &MessageHeader::Full {
                    body_length,
                    datatype,
                    stream_id,
                    ..
                },
                _,
            ) => Ok(Header {
                channel_id,
                timestamp: self.timestamp().into_inner(),
                datatype,
                body_length,
                stream_id,
            }),
            (_, None) => Err(ProtocolError::RelativeWithoutContext(channel_id)),
            (
                &MessageHeader::TimestampDeltaAndLength {
                    body_length,
                    datatype,
                    ..
                },
                Some(prior),
            ) => Ok(Header {
                channel_id,
                timestamp: advance(channel_id, prior.timestamp, self.timestamp().into_inner()),
                datatype,
                body_length,
                stream_id: prior.stream_id,
            }),
            (&MessageHeader::TimestampDelta { .. }, Some(prior)) => Ok(Header {
                channel_id,
                timestamp: advance(channel_id, prior.timestamp, self.timestamp().into_inner()),
                ..*prior
            }),
            (&MessageHeader::Continuation, Some(prior)) => Ok(Header {
                channel_id,
                ..*prior
            }),
        }
    }

    /// Choose the most compressed wire form for `new` given the header last
    /// sent on the channel. Anything format 1 and 2 cannot express — a
    /// different stream, or a timestamp that moved backwards — falls back to
    /// format 0.
    pub fn diff(prior: Option<&Header>, new: &Header) -> Result<Self, EncodeError> {
        let prior = match prior {
            Some(prior) if prior.stream_id == new.stream_id && prior.timestamp <= new.timestamp => {
                prior
            }
            _ => {
                return Self::full(
                    new.channel_id,
                    new.timestamp,
                    new.body_length,
                    new.datatype,
                    new.stream_id,
                )
            }
        };

        let delta = new.timestamp - prior.timestamp;

        if new.datatype != prior.datatype || new.body_length != prior.body_length {
            Self::timestamp_delta_and_length(new.channel_id, delta, new.body_length, new.datatype)
        } else if delta != 0 {
            Self::timestamp_delta(new.channel_id, delta)
        } else {
            Self::continuation(new.channel_id)
        }
    }
}

// constructors
impl ChunkHeader {
    /// Construct a format-0 header carrying the full message description.
    pub fn full(
        channel_id: u32,
        timestamp: u32,
        body_length: u32,
        datatype: u8,
        stream_id: u32,
    ) -> Result<Self, EncodeError> {
        if body_length > MAX_BODY_LENGTH {
            return Err(EncodeError::MessageTooLong(body_length as usize));
        }

        let basic = BasicHeader::new(0, channel_id)?;
        let (timestamp, extended_timestamp) = split_timestamp(timestamp);

        Ok(Self {
            basic,
            message: MessageHeader::Full {
                timestamp,
                body_length,
                datatype,
                stream_id,
            },
            extended_timestamp,
        })
    }

    /// Construct a format-1 header for a new message on the same stream.
    pub fn timestamp_delta_and_length(
        channel_id: u32,
        timestamp_delta: u32,
        body_length: u32,
        datatype: u8,
    ) -> Result<Self, EncodeError> {
        if body_length > MAX_BODY_LENGTH {
            return Err(EncodeError::MessageTooLong(body_length as usize));
        }

        let basic = BasicHeader::new(1, channel_id)?;
        let (timestamp_delta, extended_timestamp) = split_timestamp(timestamp_delta);

        Ok(Self {
            basic,
            message: MessageHeader::TimestampDeltaAndLength {
                timestamp_delta,
                body_length,
                datatype,
            },
            extended_timestamp,
        })
    }

    /// Construct a format-2 header for a message that differs from the
    /// previous one only by its timestamp.
    pub fn timestamp_delta(channel_id: u32, timestamp_delta: u32) -> Result<Self, EncodeError> {
        let basic = BasicHeader::new(2, channel_id)?;
        let (timestamp_delta, extended_timestamp) = split_timestamp(timestamp_delta);

        Ok(Self {
            basic,
            message: MessageHeader::TimestampDelta { timestamp_delta },
            extended_timestamp,
        })
    }

    /// Construct a format-3 header continuing the previous header.
    pub fn continuation(channel_id: u32) -> Result<Self, EncodeError> {
        Ok(Self {
            basic: BasicHeader::new(3, channel_id)?,
            message: MessageHeader::Continuation,
            extended_timestamp: None,
        })
    }
}

fn split_timestamp(timestamp: u32) -> (u32, Option<u32>) {
    if timestamp >= 0xFFFFFF {
        (0xFFFFFF, Some(timestamp))
    } else {
        (timestamp, None)
    }
}

/// Add a timestamp delta without wrapping. A peer whose deltas overflow the
/// 32-bit clock is out of spec; hold the clock still rather than jumping
/// backwards.
fn advance(channel_id: u32, timestamp: u32, delta: u32) -> u32 {
    timestamp.checked_add(delta).unwrap_or_else(|| {
        tracing::warn!(
            channel_id,
            timestamp,
            delta,
            "timestamp overflow, keeping previous timestamp"
        );
        timestamp
    })
}
