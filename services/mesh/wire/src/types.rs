//! Locator and interface identifier types shared by the mesh crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of bits the router id is shifted by inside an RLOC16
pub const ROUTER_ID_OFFSET: u16 = 10;

/// Mask of the child id bits inside an RLOC16
pub const CHILD_ID_MASK: u16 = 0x01ff;

/// Largest router id allocated by the leader
pub const MAX_ROUTER_ID: u8 = 62;

/// 16-bit routing locator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rloc16(pub u16);

impl Rloc16 {
    /// Reserved value meaning "no locator"
    pub const INVALID: Rloc16 = Rloc16(0xfffe);

    /// Locator of the router with the given id
    pub fn from_router_id(router_id: u8) -> Self {
        Rloc16((router_id as u16) << ROUTER_ID_OFFSET)
    }

    /// Router id portion of the locator
    pub fn router_id(self) -> u8 {
        (self.0 >> ROUTER_ID_OFFSET) as u8
    }

    /// Child id portion of the locator (zero for routers)
    pub fn child_id(self) -> u16 {
        self.0 & CHILD_ID_MASK
    }

    /// Whether this locator belongs to a child rather than a router
    pub fn is_child(self) -> bool {
        self.child_id() != 0
    }

    /// Locator of the router this locator is attached to
    pub fn parent(self) -> Self {
        Self::from_router_id(self.router_id())
    }

    /// Whether this is a usable locator
    pub fn is_valid(self) -> bool {
        self != Self::INVALID && self.router_id() <= MAX_ROUTER_ID
    }
}

impl fmt::Display for Rloc16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

impl From<u16> for Rloc16 {
    fn from(value: u16) -> Self {
        Rloc16(value)
    }
}

/// 64-bit mesh-local interface identifier of the device owning an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MeshLocalIid(pub [u8; 8]);

impl MeshLocalIid {
    /// Size in bytes
    pub const SIZE: usize = 8;

    /// Interface identifier derived from an IEEE 802.15.4 extended address
    /// (universal/local bit flipped)
    pub fn from_ext_address(ext: [u8; 8]) -> Self {
        let mut iid = ext;
        iid[0] ^= 0x02;
        MeshLocalIid(iid)
    }
}

impl fmt::Display for MeshLocalIid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rloc16_components() {
        let rloc = Rloc16(0x2c01);
        assert_eq!(rloc.router_id(), 11);
        assert_eq!(rloc.child_id(), 1);
        assert!(rloc.is_child());
        assert_eq!(rloc.parent(), Rloc16(0x2c00));
        assert!(!rloc.parent().is_child());
        assert_eq!(Rloc16::from_router_id(11), Rloc16(0x2c00));
    }

    #[test]
    fn test_rloc16_validity() {
        assert!(Rloc16(0x0400).is_valid());
        assert!(!Rloc16::INVALID.is_valid());
        assert!(!Rloc16(0xfc00).is_valid());
    }

    #[test]
    fn test_display() {
        assert_eq!(Rloc16(0x1234).to_string(), "0x1234");
        let iid = MeshLocalIid([0xde, 0xad, 0xbe, 0xef, 0, 1, 2, 3]);
        assert_eq!(iid.to_string(), "deadbeef00010203");
    }

    #[test]
    fn test_iid_from_ext_address() {
        let iid = MeshLocalIid::from_ext_address([0x10, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(iid.0[0], 0x12);
        assert_eq!(&iid.0[1..], &[1, 2, 3, 4, 5, 6, 7]);
    }
}
