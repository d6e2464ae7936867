//! Cache entry records.

use mesh_wire::{MeshLocalIid, Rloc16};
use serde::Serialize;
use std::fmt;
use std::net::Ipv6Addr;

/// Index of an entry inside the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryIndex(pub(crate) u16);

impl EntryIndex {
    pub(crate) fn get(self) -> usize {
        self.0 as usize
    }
}

/// Lifecycle an entry is in; one list per state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CacheState {
    /// Resolved and in use
    Cached,
    /// Learned from forwarded traffic, not yet used
    Snooped,
    /// Address query outstanding
    Query,
    /// Last query failed, waiting out the retry delay
    QueryRetry,
}

impl CacheState {
    /// All states, in list order
    pub const ALL: [CacheState; 4] = [
        CacheState::Cached,
        CacheState::Snooped,
        CacheState::Query,
        CacheState::QueryRetry,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            CacheState::Cached => 0,
            CacheState::Snooped => 1,
            CacheState::Query => 2,
            CacheState::QueryRetry => 3,
        }
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheState::Cached => write!(f, "cached"),
            CacheState::Snooped => write!(f, "snooped"),
            CacheState::Query => write!(f, "query"),
            CacheState::QueryRetry => write!(f, "query-retry"),
        }
    }
}

/// Fields of an entry in the cached list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CachedFields {
    /// Interface identifier of the owner, when learned from a notify
    pub mesh_local_iid: Option<MeshLocalIid>,
    /// Seconds since the owner was last heard, `None` when not known
    pub last_transaction_time: Option<u32>,
    /// Seconds during which the entry skips reachability checks
    pub freshness_timeout: u16,
}

/// Fields of an entry in the snooped, query or query-retry list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingFields {
    /// Seconds until the current phase expires
    pub timeout: u16,
    /// Delay applied after the next query failure
    pub retry_delay: u16,
    /// Whether the entry may be reclaimed for a new one
    pub can_evict: bool,
    /// Retry delay is decaying (query-retry only)
    pub ramp_down: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryFields {
    Cached(CachedFields),
    Pending(PendingFields),
}

/// One EID-to-RLOC16 resolution record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub(crate) target: Ipv6Addr,
    pub(crate) rloc16: Rloc16,
    pub(crate) next: Option<EntryIndex>,
    pub(crate) fields: EntryFields,
}

impl Default for CacheEntry {
    fn default() -> Self {
        Self {
            target: Ipv6Addr::UNSPECIFIED,
            rloc16: Rloc16::INVALID,
            next: None,
            fields: EntryFields::Pending(PendingFields::default()),
        }
    }
}

impl CacheEntry {
    /// Target EID
    pub fn target(&self) -> Ipv6Addr {
        self.target
    }

    /// Locator serving the target
    pub fn rloc16(&self) -> Rloc16 {
        self.rloc16
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn as_cached(&self) -> Option<&CachedFields> {
        match &self.fields {
            EntryFields::Cached(fields) => Some(fields),
            EntryFields::Pending(_) => None,
        }
    }

    pub(crate) fn as_cached_mut(&mut self) -> Option<&mut CachedFields> {
        match &mut self.fields {
            EntryFields::Cached(fields) => Some(fields),
            EntryFields::Pending(_) => None,
        }
    }

    pub(crate) fn as_pending(&self) -> Option<&PendingFields> {
        match &self.fields {
            EntryFields::Pending(fields) => Some(fields),
            EntryFields::Cached(_) => None,
        }
    }

    pub(crate) fn as_pending_mut(&mut self) -> Option<&mut PendingFields> {
        match &mut self.fields {
            EntryFields::Pending(fields) => Some(fields),
            EntryFields::Cached(_) => None,
        }
    }

    pub(crate) fn set_cached(&mut self, fields: CachedFields) {
        self.fields = EntryFields::Cached(fields);
    }

    pub(crate) fn set_pending(&mut self, fields: PendingFields) {
        self.fields = EntryFields::Pending(fields);
    }

    /// Cached entries are always evictable
    pub fn can_evict(&self) -> bool {
        self.as_pending().map(|p| p.can_evict).unwrap_or(true)
    }

    /// Whether a notify refreshed this entry recently
    pub fn is_fresh(&self) -> bool {
        self.as_cached()
            .map(|c| c.freshness_timeout > 0)
            .unwrap_or(false)
    }

    /// Whether the entry is decaying its retry delay
    pub fn in_ramp_down(&self) -> bool {
        self.as_pending().map(|p| p.ramp_down).unwrap_or(false)
    }

    pub(crate) fn snapshot(&self, state: CacheState) -> EntryInfo {
        let (timeout, retry_delay, can_evict, ramp_down, iid, ltt) = match &self.fields {
            EntryFields::Cached(c) => (
                c.freshness_timeout,
                0,
                true,
                false,
                c.mesh_local_iid,
                c.last_transaction_time,
            ),
            EntryFields::Pending(p) => (p.timeout, p.retry_delay, p.can_evict, p.ramp_down, None, None),
        };

        EntryInfo {
            target: self.target,
            rloc16: self.rloc16,
            state,
            can_evict,
            ramp_down,
            last_transaction_time: ltt,
            mesh_local_iid: iid,
            timeout,
            retry_delay,
        }
    }
}

/// Diagnostic view of a cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    /// Target EID
    pub target: Ipv6Addr,
    /// Locator (invalid while querying)
    pub rloc16: Rloc16,
    /// List the entry is in
    pub state: CacheState,
    /// Whether the entry may be evicted
    pub can_evict: bool,
    /// Whether the retry delay is decaying
    pub ramp_down: bool,
    /// Seconds since the owner was last heard, when known
    pub last_transaction_time: Option<u32>,
    /// Owner interface identifier, when known
    pub mesh_local_iid: Option<MeshLocalIid>,
    /// Freshness countdown for cached entries, phase timeout otherwise
    pub timeout: u16,
    /// Current retry delay (zero for cached entries)
    pub retry_delay: u16,
}
