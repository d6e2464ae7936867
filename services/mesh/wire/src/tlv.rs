//! Network-layer TLV encoding.
//!
//! ```text
//! +--------+--------+----------------------+
//! | type   | length | value (length bytes) |
//! +--------+--------+----------------------+
//! ```
//!
//! A length byte of `0xff` is followed by a big-endian `u16` extended length.

use crate::WireError;
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Length byte announcing an extended (16-bit) length
pub const EXTENDED_LENGTH: u8 = 0xff;

/// TLV types used by the address resolution messages
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TlvType {
    /// Target EID (16 bytes)
    Target = 0,
    /// Extended MAC address (8 bytes)
    ExtMacAddress = 1,
    /// RLOC16 (2 bytes)
    Rloc16 = 2,
    /// Mesh-local interface identifier of the owner (8 bytes)
    MeshLocalEid = 3,
    /// Status (1 byte)
    Status = 4,
    /// Seconds since the owner was last heard from (4 bytes)
    LastTransactionTime = 6,
}

impl TlvType {
    /// Minimum value length accepted for this type
    pub fn min_len(self) -> usize {
        match self {
            TlvType::Target => 16,
            TlvType::ExtMacAddress => 8,
            TlvType::Rloc16 => 2,
            TlvType::MeshLocalEid => 8,
            TlvType::Status => 1,
            TlvType::LastTransactionTime => 4,
        }
    }
}

impl TryFrom<u8> for TlvType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TlvType::Target),
            1 => Ok(TlvType::ExtMacAddress),
            2 => Ok(TlvType::Rloc16),
            3 => Ok(TlvType::MeshLocalEid),
            4 => Ok(TlvType::Status),
            6 => Ok(TlvType::LastTransactionTime),
            _ => Err(value),
        }
    }
}

/// A raw TLV borrowed from a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTlv<'a> {
    /// Type byte (may be a type this crate does not know)
    pub typ: u8,
    /// Value bytes
    pub value: &'a [u8],
}

/// Iterator over the TLVs of a payload
#[derive(Debug, Clone)]
pub struct TlvIter<'a> {
    buf: &'a [u8],
}

impl<'a> TlvIter<'a> {
    /// Iterate the TLVs in `buf`
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = Result<RawTlv<'a>, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }

        if self.buf.len() < 2 {
            self.buf = &[];
            return Some(Err(WireError::Truncated));
        }

        let typ = self.buf[0];
        let (len, header_len) = if self.buf[1] == EXTENDED_LENGTH {
            if self.buf.len() < 4 {
                self.buf = &[];
                return Some(Err(WireError::Truncated));
            }
            (u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize, 4)
        } else {
            (self.buf[1] as usize, 2)
        };

        if self.buf.len() < header_len + len {
            self.buf = &[];
            return Some(Err(WireError::Truncated));
        }

        let value = &self.buf[header_len..header_len + len];
        self.buf = &self.buf[header_len + len..];
        Some(Ok(RawTlv { typ, value }))
    }
}

/// Find the first TLV of the given type.
///
/// Returns `Ok(None)` when the type is absent, and an error when the payload
/// is malformed before the TLV is reached or the value is too short.
pub fn find(buf: &[u8], typ: TlvType) -> Result<Option<&[u8]>, WireError> {
    for tlv in TlvIter::new(buf) {
        let tlv = tlv?;
        if tlv.typ == typ as u8 {
            if tlv.value.len() < typ.min_len() {
                return Err(WireError::Length(typ, tlv.value.len()));
            }
            if tlv.value.len() > typ.min_len() {
                trace!(?typ, len = tlv.value.len(), "ignoring trailing TLV bytes");
            }
            return Ok(Some(&tlv.value[..typ.min_len()]));
        }
    }
    Ok(None)
}

/// Find a TLV that must be present
pub fn require(buf: &[u8], typ: TlvType) -> Result<&[u8], WireError> {
    find(buf, typ)?.ok_or(WireError::Missing(typ))
}

/// Append a TLV to `buf`
pub fn put(buf: &mut BytesMut, typ: TlvType, value: &[u8]) -> Result<(), WireError> {
    if value.len() > u16::MAX as usize {
        return Err(WireError::Size(value.len()));
    }

    buf.put_u8(typ as u8);
    if value.len() >= EXTENDED_LENGTH as usize {
        buf.put_u8(EXTENDED_LENGTH);
        buf.put_u16(value.len() as u16);
    } else {
        buf.put_u8(value.len() as u8);
    }
    buf.put_slice(value);
    Ok(())
}
