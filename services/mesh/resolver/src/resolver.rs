//! EID-to-RLOC16 address resolver.
//!
//! The resolver keeps a fixed pool of entries spread over four lists
//! (cached, snooped, query, query-retry). Every list keeps its most
//! recently touched entry at the head, so the tail-most evictable entry is
//! the eviction candidate.

use crate::agent::MessageAgent;
use crate::config::ResolverConfig;
use crate::entry::{CacheEntry, CacheState, CachedFields, EntryIndex, EntryInfo, PendingFields};
use crate::error::ResolverError;
use crate::events::{ChangeReason, EntryAction, RemoveReason, ResolutionEvent, ResolutionOutcome};
use crate::list::CacheEntryList;
use crate::logging::COMPONENT;
use crate::netif::{LocalInterface, ServiceLookup};
use crate::pool::CacheEntryPool;
use crate::ticker::TickerHandle;
use mesh_routing::{ChildLookup, RouteLookup};
use mesh_wire::Rloc16;
use std::fmt;
use std::net::Ipv6Addr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Collaborators the resolver consults and acts through
#[derive(Clone)]
pub struct Collaborators {
    /// Next-hop lookups
    pub routes: Arc<dyn RouteLookup>,
    /// Children of this device
    pub children: Arc<dyn ChildLookup>,
    /// This device
    pub netif: Arc<dyn LocalInterface>,
    /// Network-data service addresses
    pub services: Arc<dyn ServiceLookup>,
    /// Outbound messages
    pub agent: Arc<dyn MessageAgent>,
}

/// Address resolver state
pub struct AddressResolver {
    pub(crate) config: ResolverConfig,
    pub(crate) pool: CacheEntryPool,
    pub(crate) lists: [CacheEntryList; 4],
    pub(crate) deps: Collaborators,
    events: mpsc::UnboundedSender<ResolutionEvent>,
    pub(crate) ticker: TickerHandle,
}

impl fmt::Debug for AddressResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressResolver")
            .field("capacity", &self.pool.capacity())
            .field("free", &self.pool.free_count())
            .field("ticking", &self.ticker.is_registered())
            .finish()
    }
}

impl AddressResolver {
    /// Create a resolver; resolution events for held traffic go to `events`
    pub fn new(
        config: ResolverConfig,
        deps: Collaborators,
        events: mpsc::UnboundedSender<ResolutionEvent>,
    ) -> Self {
        let pool = CacheEntryPool::new(config.cache_entries);
        Self {
            config,
            pool,
            lists: [CacheEntryList::new(); 4],
            deps,
            events,
            ticker: TickerHandle::new(),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Tick registration shared with the event loop
    pub fn ticker(&self) -> TickerHandle {
        self.ticker.clone()
    }

    /// Resolve `eid` to a locator.
    ///
    /// Returns `QueryPending` when a query is (now) outstanding, `Drop` while
    /// a recent failure is being backed off, and `NotFound` when nothing is
    /// known and `allow_query` is false.
    pub fn resolve(&mut self, eid: &Ipv6Addr, allow_query: bool) -> Result<Rloc16, ResolverError> {
        if let Some(rloc16) = self.lookup_service(eid) {
            return Ok(rloc16);
        }

        match self.find_entry(eid) {
            Some((state @ (CacheState::Cached | CacheState::Snooped), idx, prev)) => {
                if let Some(rloc16) = self.use_entry(state, idx, prev) {
                    return Ok(rloc16);
                }
            }
            Some((CacheState::Query, ..)) => return Err(ResolverError::QueryPending),
            Some((CacheState::QueryRetry, idx, prev)) => {
                if !self.pool[idx].in_ramp_down() {
                    return Err(ResolverError::Drop);
                }
                if !allow_query {
                    return Err(ResolverError::NotFound);
                }
                self.pop_after(CacheState::QueryRetry, prev);
                return self.start_query(idx);
            }
            None => {}
        }

        if !allow_query {
            return Err(ResolverError::NotFound);
        }

        let idx = self.new_cache_entry(false).ok_or(ResolverError::NoBufs)?;
        let entry = &mut self.pool[idx];
        entry.target = *eid;
        entry.rloc16 = Rloc16::INVALID;
        entry.set_pending(PendingFields {
            retry_delay: self.config.initial_retry_delay,
            ..PendingFields::default()
        });
        self.log_change(EntryAction::Added, ChangeReason::QueryRequest, idx, CacheState::Query);

        self.start_query(idx)
    }

    /// Cache-only lookup; never sends a query
    pub fn look_up(&mut self, eid: &Ipv6Addr) -> Option<Rloc16> {
        self.resolve(eid, false).ok()
    }

    /// Record `rloc16` for an address that already has an entry
    pub fn update_cache_entry(&mut self, eid: &Ipv6Addr, rloc16: Rloc16) -> Result<(), ResolverError> {
        self.update_existing(eid, rloc16, ChangeReason::Update)
    }

    fn update_existing(
        &mut self,
        eid: &Ipv6Addr,
        rloc16: Rloc16,
        reason: ChangeReason,
    ) -> Result<(), ResolverError> {
        let (state, idx, prev) = self.find_entry(eid).ok_or(ResolverError::NotFound)?;

        match state {
            CacheState::Cached | CacheState::Snooped => {
                if self.pool[idx].rloc16 != rloc16 {
                    self.pool[idx].rloc16 = rloc16;
                    self.log_change(EntryAction::Updated, reason, idx, state);
                }
            }
            CacheState::Query | CacheState::QueryRetry => {
                self.pop_after(state, prev);
                let entry = &mut self.pool[idx];
                entry.rloc16 = rloc16;
                entry.set_cached(CachedFields::default());
                self.push(CacheState::Cached, idx);
                self.log_change(EntryAction::Updated, reason, idx, CacheState::Cached);
                self.signal(*eid, ResolutionOutcome::Resolved(rloc16));
            }
        }

        Ok(())
    }

    /// Learn `eid -> src` from forwarded traffic addressed to this device or
    /// one of its minimal children
    pub fn update_snooped_cache_entry(&mut self, eid: &Ipv6Addr, src: Rloc16, dst: Rloc16) {
        if !self.deps.netif.is_full_thread_device() {
            return;
        }
        if self.lookup_service(eid).is_some() {
            return;
        }
        if self.update_existing(eid, src, ChangeReason::Snoop).is_ok() {
            return;
        }

        let local = self.deps.netif.rloc16();
        if src == local || self.deps.children.is_minimal_child(src) {
            return;
        }
        if dst != local && !self.deps.children.is_minimal_child(dst) {
            return;
        }

        let Some(idx) = self.new_cache_entry(true) else {
            debug!("No entry available to snoop {} -> {}", eid, src);
            return;
        };

        let pinned = self
            .list(CacheState::Snooped)
            .iter(self.pool.entries())
            .filter(|&i| !self.pool[i].can_evict())
            .count();

        let pin = self.config.snoop_eviction_timeout > 0
            && pinned < self.config.max_snooped_non_evictable as usize;
        let fields = if pin {
            self.ticker.register();
            PendingFields {
                timeout: self.config.snoop_eviction_timeout,
                can_evict: false,
                ..PendingFields::default()
            }
        } else {
            PendingFields {
                timeout: 0,
                can_evict: true,
                ..PendingFields::default()
            }
        };

        let entry = &mut self.pool[idx];
        entry.target = *eid;
        entry.rloc16 = src;
        entry.set_pending(fields);
        self.push(CacheState::Snooped, idx);
        self.log_change(EntryAction::Added, ChangeReason::Snoop, idx, CacheState::Snooped);
    }

    /// Drop cached and snooped entries whose locator belongs to `router_id`
    pub fn remove_entries_for_router_id(&mut self, router_id: u8) -> usize {
        self.remove_matching(
            |entry| entry.rloc16.router_id() == router_id,
            RemoveReason::RemovingRouterId,
        )
    }

    /// Drop cached and snooped entries pointing at `rloc16`
    pub fn remove_entries_for_rloc16(&mut self, rloc16: Rloc16) -> usize {
        self.remove_matching(|entry| entry.rloc16 == rloc16, RemoveReason::RemovingRloc16)
    }

    /// Drop the cached or snooped entry for `eid`
    pub fn remove_entry_for_address(&mut self, eid: &Ipv6Addr) -> Result<(), ResolverError> {
        self.remove_entry_for_address_with(eid, RemoveReason::RemovingEid)
    }

    /// Rewrite cached and snooped entries from `old` to `new`
    pub fn replace_entries_for_rloc16(&mut self, old: Rloc16, new: Rloc16) -> usize {
        let mut replaced = 0;

        for state in [CacheState::Cached, CacheState::Snooped] {
            let mut cur = self.list(state).head();
            while let Some(idx) = cur {
                cur = self.pool[idx].next;
                if self.pool[idx].rloc16 == old {
                    self.pool[idx].rloc16 = new;
                    replaced += 1;
                    self.log_change(EntryAction::Updated, ChangeReason::ReplaceLocator, idx, state);
                }
            }
        }

        replaced
    }

    /// A destination-unreachable (no route) arrived for `dst`
    pub fn handle_destination_unreachable(&mut self, dst: &Ipv6Addr) {
        if self
            .remove_entry_for_address_with(dst, RemoveReason::ReceivedIcmpDstUnreachNoRoute)
            .is_err()
        {
            debug!("Destination unreachable for {}, no entry", dst);
        }
    }

    /// Free every entry. Traffic held on outstanding queries is dropped.
    pub fn clear(&mut self) {
        for state in CacheState::ALL {
            while let Some(idx) = self.lists[state.index()].pop(self.pool.entries_mut()) {
                if state == CacheState::Query {
                    self.signal(self.pool[idx].target, ResolutionOutcome::Drop);
                }
                self.log_removal(RemoveReason::Cleared, idx, state);
                self.pool.free(idx);
            }
        }
        self.ticker.unregister();
    }

    /// Resend queries for every pending and backed-off entry, e.g. after a
    /// role change
    pub fn restart_address_queries(&mut self) {
        let mut retry = std::mem::take(&mut self.lists[CacheState::QueryRetry.index()]);
        self.lists[CacheState::Query.index()].append(&mut retry, self.pool.entries_mut());

        let mut cur = self.list(CacheState::Query).head();
        while let Some(idx) = cur {
            cur = self.pool[idx].next;
            let target = self.pool[idx].target;

            if let Err(e) = self.send_address_query(&target) {
                component_warn!(COMPONENT, "Failed to resend address query for {}: {}", target, e);
            }
            self.pool[idx].set_pending(PendingFields {
                timeout: self.config.query_timeout,
                retry_delay: self.config.initial_retry_delay,
                can_evict: false,
                ramp_down: false,
            });
        }

        if !self.list(CacheState::Query).is_empty() {
            self.ticker.register();
        }
    }

    /// Snapshot of every entry, list by list
    pub fn entries(&self) -> Vec<EntryInfo> {
        CacheState::ALL
            .into_iter()
            .flat_map(|state| {
                self.list(state)
                    .iter(self.pool.entries())
                    .map(move |idx| self.pool[idx].snapshot(state))
            })
            .collect()
    }

    /// Snapshot of the entry for `eid`
    pub fn entry(&self, eid: &Ipv6Addr) -> Option<EntryInfo> {
        self.find_entry(eid)
            .map(|(state, idx, _)| self.pool[idx].snapshot(state))
    }

    fn lookup_service(&self, eid: &Ipv6Addr) -> Option<Rloc16> {
        if !self.config.resolve_using_net_data_services {
            return None;
        }
        let rloc16 = self.deps.services.lookup(eid)?;
        debug!("Resolved {} to {} from network data services", eid, rloc16);
        Some(rloc16)
    }

    /// Promote a cached/snooped hit to the cached head, unless its locator
    /// has become unreachable
    fn use_entry(&mut self, state: CacheState, idx: EntryIndex, prev: Option<EntryIndex>) -> Option<Rloc16> {
        let rloc16 = self.pool[idx].rloc16;

        if !self.pool[idx].is_fresh() && self.deps.routes.next_hop(rloc16).is_none() {
            self.remove_entry(state, idx, prev, RemoveReason::NoRoute);
            return None;
        }

        self.pop_after(state, prev);
        if state == CacheState::Snooped {
            self.pool[idx].set_cached(CachedFields::default());
        }
        self.push(CacheState::Cached, idx);
        Some(rloc16)
    }

    /// Send a query for an entry not on any list and move it to the query
    /// list. On send failure the entry is freed.
    fn start_query(&mut self, idx: EntryIndex) -> Result<Rloc16, ResolverError> {
        let target = self.pool[idx].target;

        if let Err(e) = self.send_address_query(&target) {
            component_warn!(COMPONENT, "Failed to send address query for {}: {}", target, e);
            self.pool.free(idx);
            return Err(e);
        }

        let query_timeout = self.config.query_timeout;
        if let Some(fields) = self.pool[idx].as_pending_mut() {
            fields.timeout = query_timeout;
            fields.can_evict = false;
            fields.ramp_down = false;
        }
        self.push(CacheState::Query, idx);
        self.ticker.register();

        Err(ResolverError::QueryPending)
    }

    /// Get an entry for a new resolution, evicting if the pool is empty.
    ///
    /// Eviction tries the snooped, query-retry, query and cached lists in
    /// that order and takes the tail-most evictable entry. A snooped
    /// allocation gives up when every snooped entry is pinned and the pin
    /// limit is reached.
    pub(crate) fn new_cache_entry(&mut self, snooped: bool) -> Option<EntryIndex> {
        if let Some(idx) = self.pool.allocate() {
            return Some(idx);
        }

        for state in [
            CacheState::Snooped,
            CacheState::QueryRetry,
            CacheState::Query,
            CacheState::Cached,
        ] {
            let mut candidate = None;
            let mut pinned = 0usize;
            let mut prev = None;

            for idx in self.list(state).iter(self.pool.entries()) {
                if self.pool[idx].can_evict() {
                    candidate = Some((idx, prev));
                } else {
                    pinned += 1;
                }
                prev = Some(idx);
            }

            if let Some((idx, prev)) = candidate {
                self.remove_entry(state, idx, prev, RemoveReason::EvictingForNewEntry);
                return self.pool.allocate();
            }

            if snooped
                && state == CacheState::Snooped
                && pinned >= self.config.max_snooped_non_evictable as usize
            {
                return None;
            }
        }

        None
    }

    fn remove_entry_for_address_with(&mut self, eid: &Ipv6Addr, reason: RemoveReason) -> Result<(), ResolverError> {
        for state in [CacheState::Cached, CacheState::Snooped] {
            if let Some((idx, prev)) = self.list(state).find_matching(eid, self.pool.entries()) {
                self.remove_entry(state, idx, prev, reason);
                return Ok(());
            }
        }
        Err(ResolverError::NotFound)
    }

    fn remove_matching<F>(&mut self, pred: F, reason: RemoveReason) -> usize
    where
        F: Fn(&CacheEntry) -> bool,
    {
        let mut count = 0;

        for state in [CacheState::Cached, CacheState::Snooped] {
            let mut removed = self.lists[state.index()].remove_all_matching(self.pool.entries_mut(), &pred);
            while let Some(idx) = removed.pop(self.pool.entries_mut()) {
                self.log_removal(reason, idx, state);
                self.pool.free(idx);
                count += 1;
            }
        }

        count
    }

    /// Unlink an entry from `state`'s list and return it to the pool
    pub(crate) fn remove_entry(
        &mut self,
        state: CacheState,
        idx: EntryIndex,
        prev: Option<EntryIndex>,
        reason: RemoveReason,
    ) {
        self.pop_after(state, prev);
        if state == CacheState::Query {
            self.signal(self.pool[idx].target, ResolutionOutcome::Drop);
        }
        self.log_removal(reason, idx, state);
        self.pool.free(idx);
    }

    pub(crate) fn find_entry(&self, eid: &Ipv6Addr) -> Option<(CacheState, EntryIndex, Option<EntryIndex>)> {
        CacheState::ALL.into_iter().find_map(|state| {
            self.list(state)
                .find_matching(eid, self.pool.entries())
                .map(|(idx, prev)| (state, idx, prev))
        })
    }

    pub(crate) fn list(&self, state: CacheState) -> &CacheEntryList {
        &self.lists[state.index()]
    }

    pub(crate) fn push(&mut self, state: CacheState, idx: EntryIndex) {
        self.lists[state.index()].push(idx, self.pool.entries_mut());
    }

    pub(crate) fn pop_after(&mut self, state: CacheState, prev: Option<EntryIndex>) -> Option<EntryIndex> {
        self.lists[state.index()].pop_after(prev, self.pool.entries_mut())
    }

    /// Tell the forwarder how resolution of `target` ended
    pub(crate) fn signal(&self, target: Ipv6Addr, outcome: ResolutionOutcome) {
        if self.events.send(ResolutionEvent { target, outcome }).is_err() {
            warn!("Resolution event for {} dropped, forwarder gone", target);
        }
    }

    pub(crate) fn log_change(&self, action: EntryAction, reason: ChangeReason, idx: EntryIndex, state: CacheState) {
        let entry = &self.pool[idx];
        component_info!(
            COMPONENT,
            "{} {} entry {} -> {} ({})",
            action,
            state,
            entry.target,
            entry.rloc16,
            reason
        );
    }

    fn log_removal(&self, reason: RemoveReason, idx: EntryIndex, state: CacheState) {
        let entry = &self.pool[idx];
        component_info!(
            COMPONENT,
            "{} {} entry {} -> {} ({})",
            EntryAction::Removed,
            state,
            entry.target,
            entry.rloc16,
            reason
        );
    }
}
