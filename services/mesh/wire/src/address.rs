//! Address resolution messages.
//!
//! Three management messages carry the EID-to-RLOC protocol:
//!
//! - **Address Query** (`a/aq`, non-confirmable): Target
//! - **Address Notify** (`a/an`, confirmable): Target, ML-EID, RLOC16,
//!   optional Last Transaction Time
//! - **Address Error** (`a/ae`): Target, ML-EID

use crate::tlv::{self, TlvType};
use crate::types::{MeshLocalIid, Rloc16};
use crate::WireError;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

/// Resource paths of the address resolution messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Uri {
    /// Address Query
    AddressQuery,
    /// Address Notify
    AddressNotify,
    /// Address Error
    AddressError,
}

impl Uri {
    /// Path string as carried in the URI-Path options
    pub fn path(self) -> &'static str {
        match self {
            Uri::AddressQuery => "a/aq",
            Uri::AddressNotify => "a/an",
            Uri::AddressError => "a/ae",
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Uri {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('/') {
            "a/aq" => Ok(Uri::AddressQuery),
            "a/an" => Ok(Uri::AddressNotify),
            "a/ae" => Ok(Uri::AddressError),
            other => Err(WireError::Uri(other.to_string())),
        }
    }
}

fn read_target(payload: &[u8]) -> Result<Ipv6Addr, WireError> {
    let value = tlv::require(payload, TlvType::Target)?;
    let mut octets = [0u8; 16];
    octets.copy_from_slice(value);
    Ok(Ipv6Addr::from(octets))
}

fn read_iid(payload: &[u8]) -> Result<MeshLocalIid, WireError> {
    let value = tlv::require(payload, TlvType::MeshLocalEid)?;
    let mut iid = [0u8; MeshLocalIid::SIZE];
    iid.copy_from_slice(value);
    Ok(MeshLocalIid(iid))
}

/// Address Query payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressQuery {
    /// EID being resolved
    pub target: Ipv6Addr,
}

impl AddressQuery {
    /// Create a new query
    pub fn new(target: Ipv6Addr) -> Self {
        Self { target }
    }

    /// Encode the TLV payload
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let mut buf = BytesMut::with_capacity(18);
        tlv::put(&mut buf, TlvType::Target, &self.target.octets())?;
        Ok(buf.freeze())
    }

    /// Decode a TLV payload
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        Ok(Self {
            target: read_target(payload)?,
        })
    }
}

/// Address Notify payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressNotify {
    /// EID being answered for
    pub target: Ipv6Addr,
    /// Interface identifier of the device owning the EID
    pub mesh_local_iid: MeshLocalIid,
    /// Locator currently serving the EID
    pub rloc16: Rloc16,
    /// Seconds since the owner was last heard from, when the answer
    /// comes from a parent rather than the owner itself
    pub last_transaction_time: Option<u32>,
}

impl AddressNotify {
    /// Encode the TLV payload
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let mut buf = BytesMut::with_capacity(40);
        tlv::put(&mut buf, TlvType::Target, &self.target.octets())?;
        tlv::put(&mut buf, TlvType::MeshLocalEid, &self.mesh_local_iid.0)?;
        tlv::put(&mut buf, TlvType::Rloc16, &self.rloc16.0.to_be_bytes())?;
        if let Some(time) = self.last_transaction_time {
            tlv::put(&mut buf, TlvType::LastTransactionTime, &time.to_be_bytes())?;
        }
        Ok(buf.freeze())
    }

    /// Decode a TLV payload
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let target = read_target(payload)?;
        let mesh_local_iid = read_iid(payload)?;
        let rloc = tlv::require(payload, TlvType::Rloc16)?;
        let last_transaction_time = tlv::find(payload, TlvType::LastTransactionTime)?
            .map(|v| u32::from_be_bytes([v[0], v[1], v[2], v[3]]));

        Ok(Self {
            target,
            mesh_local_iid,
            rloc16: Rloc16(u16::from_be_bytes([rloc[0], rloc[1]])),
            last_transaction_time,
        })
    }
}

/// Address Error payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressError {
    /// EID in conflict
    pub target: Ipv6Addr,
    /// Interface identifier of the device whose claim is valid
    pub mesh_local_iid: MeshLocalIid,
}

impl AddressError {
    /// Create a new error
    pub fn new(target: Ipv6Addr, mesh_local_iid: MeshLocalIid) -> Self {
        Self {
            target,
            mesh_local_iid,
        }
    }

    /// Encode the TLV payload
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let mut buf = BytesMut::with_capacity(28);
        tlv::put(&mut buf, TlvType::Target, &self.target.octets())?;
        tlv::put(&mut buf, TlvType::MeshLocalEid, &self.mesh_local_iid.0)?;
        Ok(buf.freeze())
    }

    /// Decode a TLV payload
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        Ok(Self {
            target: read_target(payload)?,
            mesh_local_iid: read_iid(payload)?,
        })
    }
}
