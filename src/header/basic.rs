//! The chunk basic header: a 2-bit format selector and the channel id,
//! packed into 1, 2 or 3 bytes depending on how large the id is.

use std::convert::{TryFrom, TryInto};

use deku::prelude::*;
use thiserror::Error;

/// The leading bytes of every chunk. The format bits say which of the four
/// message-header layouts follows; the channel id says which channel the
/// chunk belongs to.
#[derive(Debug, PartialEq, DekuRead, DekuWrite)]
pub struct BasicHeader {
    #[deku(bits = "2")]
    pub(super) format: u8,
    channel_id: ChannelId,
}

impl BasicHeader {
    pub(super) fn new(format: u8, channel_id: u32) -> Result<Self, ChannelIdError> {
        Ok(Self {
            format,
            channel_id: channel_id.try_into()?,
        })
    }

    pub fn size(&self) -> usize {
        match self.channel_id {
            ChannelId::Direct(_) => 1,
            ChannelId::OneByte(_) => 2,
            ChannelId::TwoBytes(_) => 3,
        }
    }

    pub fn channel_id(&self) -> u32 {
        self.channel_id.into()
    }
}

/// Channel ids 2-63 fit in the low six bits of the first byte. The values 0
/// and 1 are escapes indicating the id is carried in one or two following
/// bytes, offset by 64.
#[derive(Debug, PartialEq, DekuRead, DekuWrite, Clone, Copy)]
#[deku(type = "u8", bits = "6")]
#[deku(endian = "big")]
enum ChannelId {
    /// ```text
    ///  0 1 2 3 4 5 6 7
    /// +-+-+-+-+-+-+-+-+
    /// |fmt|   cs id   |
    /// +-+-+-+-+-+-+-+-+
    /// ```
    #[deku(id_pat = "0x2..=63")]
    Direct(#[deku(bits = "6")] u8),

    /// Ids 64..=319: the second byte holds `id - 64`.
    ///
    /// ```text
    ///  0                   1
    ///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// |fmt|0 0 0 0 0 0|   cs id - 64  |
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// ```
    #[deku(id = "0")]
    OneByte(u8),

    /// Ids 64..=65599: the second and third bytes hold `id - 64` with the
    /// low byte first.
    ///
    /// ```text
    ///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// |fmt|0 0 0 0 0 1|          cs id - 64           |
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// ```
    #[deku(id = "1")]
    TwoBytes(#[deku(endian = "little")] u16),
}

#[derive(Debug, Error)]
pub enum ChannelIdError {
    #[error("attempted to use reserved value as channel id")]
    Reserved,
    #[error("channel id exceeds maximum value (65599)")]
    TooBig,
}

impl TryFrom<u32> for ChannelId {
    type Error = ChannelIdError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 | 1 => Err(ChannelIdError::Reserved),
            2..=63 => Ok(Self::Direct(value as u8)),
            64..=319 => Ok(Self::OneByte((value - 64) as u8)),
            320..=65599 => Ok(Self::TwoBytes((value - 64) as u16)),
            65600.. => Err(ChannelIdError::TooBig),
        }
    }
}

impl From<ChannelId> for u32 {
    fn from(value: ChannelId) -> Self {
        match value {
            ChannelId::Direct(id) => id as u32,
            ChannelId::OneByte(id) => id as u32 + 64,
            ChannelId::TwoBytes(id) => id as u32 + 64,
        }
    }
}
