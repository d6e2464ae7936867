//! Local interface and network-data service lookups.

use mesh_wire::{MeshLocalIid, Rloc16};
use std::collections::{HashMap, HashSet};
use std::net::Ipv6Addr;
use std::sync::RwLock;
use tracing::{debug, info};

/// Realm-local all-routers multicast address
pub const REALM_LOCAL_ALL_ROUTERS: Ipv6Addr = Ipv6Addr::new(0xff03, 0, 0, 0, 0, 0, 0, 2);

/// Locator address for `rloc16` under a mesh-local prefix
pub fn locator_address(mesh_local_prefix: [u8; 8], rloc16: Rloc16) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets[..8].copy_from_slice(&mesh_local_prefix);
    octets[8..14].copy_from_slice(&[0x00, 0x00, 0x00, 0xff, 0xfe, 0x00]);
    octets[14..].copy_from_slice(&rloc16.0.to_be_bytes());
    Ipv6Addr::from(octets)
}

/// State of this device the resolver consults
pub trait LocalInterface: Send + Sync {
    /// Locator of this device
    fn rloc16(&self) -> Rloc16;

    /// Mesh-local interface identifier of this device
    fn mesh_local_iid(&self) -> MeshLocalIid;

    /// Whether this device is a full thread device
    fn is_full_thread_device(&self) -> bool;

    /// Whether `address` is one of this device's unicast addresses
    fn has_unicast_address(&self, address: &Ipv6Addr) -> bool;

    /// Drop a unicast address, returns whether it was present
    fn remove_unicast_address(&self, address: &Ipv6Addr) -> bool;

    /// Locator address of `rloc16`
    fn locator_address(&self, rloc16: Rloc16) -> Ipv6Addr;
}

/// Network-data service lookup (anycast and service locators)
pub trait ServiceLookup: Send + Sync {
    /// Locator serving `address`, when it belongs to a published service
    fn lookup(&self, address: &Ipv6Addr) -> Option<Rloc16>;
}

/// In-memory local node state
#[derive(Debug)]
pub struct LocalNode {
    mesh_local_prefix: [u8; 8],
    mesh_local_iid: MeshLocalIid,
    rloc16: RwLock<Rloc16>,
    full_thread_device: bool,
    addresses: RwLock<HashSet<Ipv6Addr>>,
}

impl LocalNode {
    /// Create a node
    pub fn new(
        mesh_local_prefix: [u8; 8],
        mesh_local_iid: MeshLocalIid,
        rloc16: Rloc16,
        full_thread_device: bool,
    ) -> Self {
        Self {
            mesh_local_prefix,
            mesh_local_iid,
            rloc16: RwLock::new(rloc16),
            full_thread_device,
            addresses: RwLock::new(HashSet::new()),
        }
    }

    /// Change the locator of this node
    pub fn set_rloc16(&self, rloc16: Rloc16) {
        if let Ok(mut current) = self.rloc16.write() {
            *current = rloc16;
        }
    }

    /// Add a unicast address
    pub fn add_unicast_address(&self, address: Ipv6Addr) {
        if let Ok(mut addresses) = self.addresses.write() {
            if addresses.insert(address) {
                debug!("Added unicast address {}", address);
            }
        }
    }
}

impl LocalInterface for LocalNode {
    fn rloc16(&self) -> Rloc16 {
        self.rloc16
            .read()
            .map(|rloc| *rloc)
            .unwrap_or(Rloc16::INVALID)
    }

    fn mesh_local_iid(&self) -> MeshLocalIid {
        self.mesh_local_iid
    }

    fn is_full_thread_device(&self) -> bool {
        self.full_thread_device
    }

    fn has_unicast_address(&self, address: &Ipv6Addr) -> bool {
        self.addresses
            .read()
            .map(|addresses| addresses.contains(address))
            .unwrap_or(false)
    }

    fn remove_unicast_address(&self, address: &Ipv6Addr) -> bool {
        let removed = self
            .addresses
            .write()
            .map(|mut addresses| addresses.remove(address))
            .unwrap_or(false);
        if removed {
            info!("Removed unicast address {}", address);
        }
        removed
    }

    fn locator_address(&self, rloc16: Rloc16) -> Ipv6Addr {
        locator_address(self.mesh_local_prefix, rloc16)
    }
}

/// In-memory table of service addresses published in network data
#[derive(Debug, Default)]
pub struct ServiceTable {
    services: RwLock<HashMap<Ipv6Addr, Rloc16>>,
}

impl ServiceTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a service address
    pub fn insert(&self, address: Ipv6Addr, rloc16: Rloc16) {
        if let Ok(mut services) = self.services.write() {
            services.insert(address, rloc16);
        }
    }

    /// Withdraw a service address
    pub fn remove(&self, address: &Ipv6Addr) -> Option<Rloc16> {
        self.services
            .write()
            .ok()
            .and_then(|mut services| services.remove(address))
    }
}

impl ServiceLookup for ServiceTable {
    fn lookup(&self, address: &Ipv6Addr) -> Option<Rloc16> {
        self.services
            .read()
            .ok()
            .and_then(|services| services.get(address).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_address() {
        let prefix = [0xfd, 0xde, 0xad, 0x00, 0xbe, 0xef, 0x00, 0x00];
        assert_eq!(
            locator_address(prefix, Rloc16(0x0c01)),
            "fdde:ad00:beef:0:0:ff:fe00:c01".parse::<Ipv6Addr>().unwrap()
        );
    }

    #[test]
    fn test_local_node_addresses() {
        let node = LocalNode::new([0xfd, 0, 0, 0, 0, 0, 0, 0], MeshLocalIid([1; 8]), Rloc16(0x0400), true);
        let address: Ipv6Addr = "fd00::1".parse().unwrap();

        assert!(!node.has_unicast_address(&address));
        node.add_unicast_address(address);
        assert!(node.has_unicast_address(&address));
        assert!(node.remove_unicast_address(&address));
        assert!(!node.remove_unicast_address(&address));

        node.set_rloc16(Rloc16(0x0800));
        assert_eq!(node.rloc16(), Rloc16(0x0800));
    }

    #[test]
    fn test_service_table() {
        let table = ServiceTable::new();
        let anycast: Ipv6Addr = "fd00::ff:fe00:fc10".parse().unwrap();
        assert_eq!(table.lookup(&anycast), None);

        table.insert(anycast, Rloc16(0x0c00));
        assert_eq!(table.lookup(&anycast), Some(Rloc16(0x0c00)));
        assert_eq!(table.remove(&anycast), Some(Rloc16(0x0c00)));
    }
}
