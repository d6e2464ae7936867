//! Child table: devices attached to this router and the addresses they
//! registered.

use bitflags::bitflags;
use dashmap::DashMap;
use mesh_wire::{MeshLocalIid, Rloc16};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::net::Ipv6Addr;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// Maximum number of addresses a child may register
pub const MAX_CHILD_ADDRESSES: usize = 4;

/// Consecutive transmit failures after which a child is no longer answered for
pub const MAX_CHILD_LINK_FAILURES: u8 = 4;

bitflags! {
    /// Device mode advertised by a child
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DeviceMode: u8 {
        /// Full network data requested
        const FULL_NETWORK_DATA = 1 << 0;
        /// Full thread device (router capable)
        const FULL_THREAD_DEVICE = 1 << 1;
        /// Receiver on when idle
        const RX_ON_WHEN_IDLE = 1 << 3;
    }
}

/// Child table errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChildError {
    /// No child with the given locator
    #[error("unknown child {0}")]
    Unknown(Rloc16),
    /// Address table of the child is full
    #[error("address table full for child {0}")]
    AddressesFull(Rloc16),
}

/// A child attached to this device
#[derive(Debug, Clone)]
pub struct ChildEntry {
    /// Locator assigned to the child
    pub rloc16: Rloc16,
    /// IEEE 802.15.4 extended address
    pub ext_address: [u8; 8],
    /// Advertised mode
    pub mode: DeviceMode,
    /// Registered addresses
    pub addresses: SmallVec<[Ipv6Addr; MAX_CHILD_ADDRESSES]>,
    /// Last time a frame was received from the child
    pub last_heard: Instant,
    /// Consecutive transmit failures towards the child
    pub link_failures: u8,
}

impl ChildEntry {
    /// Create a new child entry
    pub fn new(rloc16: Rloc16, ext_address: [u8; 8], mode: DeviceMode) -> Self {
        Self {
            rloc16,
            ext_address,
            mode,
            addresses: SmallVec::new(),
            last_heard: Instant::now(),
            link_failures: 0,
        }
    }

    /// Whether this child is a minimal (end) device
    pub fn is_minimal(&self) -> bool {
        !self.mode.contains(DeviceMode::FULL_THREAD_DEVICE)
    }

    /// Mesh-local interface identifier of the child
    pub fn mesh_local_iid(&self) -> MeshLocalIid {
        MeshLocalIid::from_ext_address(self.ext_address)
    }

    /// Whether the child registered `address`
    pub fn has_address(&self, address: &Ipv6Addr) -> bool {
        self.addresses.iter().any(|a| a == address)
    }
}

/// Minimal child found to own an address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildOwner {
    /// Locator of the child
    pub rloc16: Rloc16,
    /// Mesh-local interface identifier of the child
    pub mesh_local_iid: MeshLocalIid,
    /// Seconds since the child was last heard from
    pub seconds_since_heard: u32,
}

/// Child lookups the address resolver needs
pub trait ChildLookup: Send + Sync {
    /// Whether `rloc16` is a minimal child of this device
    fn is_minimal_child(&self, rloc16: Rloc16) -> bool;

    /// Find a minimal child (with a healthy link) that registered `target`
    fn find_minimal_child_owning(&self, target: &Ipv6Addr) -> Option<ChildOwner>;

    /// Remove `target` from a minimal child whose interface identifier
    /// differs from `owner`, returning that child's locator
    fn remove_conflicting_address(&self, target: &Ipv6Addr, owner: &MeshLocalIid) -> Option<Rloc16>;
}

/// In-memory child table
#[derive(Debug, Default)]
pub struct ChildTable {
    children: DashMap<Rloc16, ChildEntry>,
}

impl ChildTable {
    /// Create an empty child table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a child
    pub fn add_child(&self, child: ChildEntry) {
        info!("Child {} attached (mode {:?})", child.rloc16, child.mode);
        self.children.insert(child.rloc16, child);
    }

    /// Remove a child
    pub fn remove_child(&self, rloc16: Rloc16) -> Option<ChildEntry> {
        let removed = self.children.remove(&rloc16).map(|(_, child)| child);
        if removed.is_some() {
            info!("Child {} detached", rloc16);
        }
        removed
    }

    /// Get a copy of a child entry
    pub fn get(&self, rloc16: Rloc16) -> Option<ChildEntry> {
        self.children.get(&rloc16).map(|child| child.clone())
    }

    /// Number of attached children
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether no child is attached
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Register an address for a child
    pub fn register_address(&self, rloc16: Rloc16, address: Ipv6Addr) -> Result<(), ChildError> {
        let mut child = self
            .children
            .get_mut(&rloc16)
            .ok_or(ChildError::Unknown(rloc16))?;

        if child.has_address(&address) {
            return Ok(());
        }
        if child.addresses.len() >= MAX_CHILD_ADDRESSES {
            return Err(ChildError::AddressesFull(rloc16));
        }

        debug!("Child {} registered {}", rloc16, address);
        child.addresses.push(address);
        Ok(())
    }

    /// Record a frame received from a child
    pub fn mark_heard(&self, rloc16: Rloc16) {
        if let Some(mut child) = self.children.get_mut(&rloc16) {
            child.last_heard = Instant::now();
            child.link_failures = 0;
        }
    }

    /// Record a transmit failure towards a child
    pub fn record_link_failure(&self, rloc16: Rloc16) -> Option<u8> {
        self.children.get_mut(&rloc16).map(|mut child| {
            child.link_failures = child.link_failures.saturating_add(1);
            child.link_failures
        })
    }
}

impl ChildLookup for ChildTable {
    fn is_minimal_child(&self, rloc16: Rloc16) -> bool {
        self.children
            .get(&rloc16)
            .map(|child| child.is_minimal())
            .unwrap_or(false)
    }

    fn find_minimal_child_owning(&self, target: &Ipv6Addr) -> Option<ChildOwner> {
        self.children
            .iter()
            .filter(|child| child.is_minimal() && child.link_failures < MAX_CHILD_LINK_FAILURES)
            .find(|child| child.has_address(target))
            .map(|child| ChildOwner {
                rloc16: child.rloc16,
                mesh_local_iid: child.mesh_local_iid(),
                seconds_since_heard: child.last_heard.elapsed().as_secs().min(u32::MAX as u64) as u32,
            })
    }

    fn remove_conflicting_address(&self, target: &Ipv6Addr, owner: &MeshLocalIid) -> Option<Rloc16> {
        for mut child in self.children.iter_mut() {
            if !child.is_minimal() || child.mesh_local_iid() == *owner {
                continue;
            }

            if let Some(pos) = child.addresses.iter().position(|a| a == target) {
                child.addresses.remove(pos);
                info!("Removed conflicting address {} from child {}", target, child.rloc16);
                return Some(child.rloc16);
            }
        }
        None
    }
}
