//! Address query, notify and error handling.

use crate::agent::{InboundRequest, TmfMessage};
use crate::entry::{CacheState, CachedFields};
use crate::error::ResolverError;
use crate::events::{ChangeReason, EntryAction, ResolutionOutcome};
use crate::logging::COMPONENT;
use crate::netif::REALM_LOCAL_ALL_ROUTERS;
use crate::resolver::AddressResolver;
use mesh_wire::{AddressError, AddressNotify, AddressQuery, MeshLocalIid, Rloc16, Uri};
use std::net::Ipv6Addr;
use tracing::{debug, warn};

impl AddressResolver {
    /// Dispatch an inbound resolution request by URI
    pub fn handle_request(&mut self, request: &InboundRequest) -> Result<(), ResolverError> {
        match request.uri {
            Uri::AddressQuery => self.handle_address_query(request),
            Uri::AddressNotify => self.handle_address_notify(request),
            Uri::AddressError => self.handle_address_error(request),
        }
    }

    /// Answer a query for one of our addresses or a minimal child's
    pub fn handle_address_query(&mut self, request: &InboundRequest) -> Result<(), ResolverError> {
        if request.confirmable {
            return Err(ResolverError::InvalidState("address query must be non-confirmable"));
        }

        let query = AddressQuery::decode(&request.payload)?;
        component_debug!(COMPONENT, "Received {} for {} from {}", Uri::AddressQuery, query.target, request.source);

        if self.deps.netif.has_unicast_address(&query.target) {
            let iid = self.deps.netif.mesh_local_iid();
            return self.send_address_notify(query.target, iid, None, request.source);
        }

        if let Some(child) = self.deps.children.find_minimal_child_owning(&query.target) {
            return self.send_address_notify(
                query.target,
                child.mesh_local_iid,
                Some(child.seconds_since_heard),
                request.source,
            );
        }

        Ok(())
    }

    /// Record the answer to one of our queries.
    ///
    /// A cached entry with a known transaction time only changes owner when
    /// the new claim is strictly fresher; the superseded owner is then sent
    /// an address error.
    pub fn handle_address_notify(&mut self, request: &InboundRequest) -> Result<(), ResolverError> {
        if !request.confirmable {
            return Err(ResolverError::InvalidState("address notify must be confirmable"));
        }

        let notify = AddressNotify::decode(&request.payload)?;
        let target = notify.target;
        let last_transaction_time = notify.last_transaction_time.unwrap_or(0);
        component_debug!(
            COMPONENT,
            "Received {} from {} for {} to {}",
            Uri::AddressNotify,
            request.source,
            target,
            notify.rloc16
        );

        let Some((state, idx, prev)) = self.find_entry(&target) else {
            debug!("No entry for {}, ignoring notification", target);
            return Ok(());
        };

        if state == CacheState::Cached {
            let held = self.pool[idx].as_cached().and_then(|cached| {
                cached
                    .last_transaction_time
                    .zip(cached.mesh_local_iid)
            });

            if let Some((held_time, held_iid)) = held {
                if held_iid != notify.mesh_local_iid {
                    if last_transaction_time >= held_time {
                        debug!(
                            "Ignoring stale claim for {} by {} ({}s >= {}s)",
                            target, notify.mesh_local_iid, last_transaction_time, held_time
                        );
                        return Ok(());
                    }

                    let previous_owner = self.pool[idx].rloc16;
                    component_warn!(
                        COMPONENT,
                        "Duplicate address {}: {} supersedes {}",
                        target,
                        notify.mesh_local_iid,
                        held_iid
                    );
                    let destination = self.deps.netif.locator_address(previous_owner);
                    if let Err(e) = self.send_address_error(target, notify.mesh_local_iid, Some(destination)) {
                        component_warn!(COMPONENT, "Failed to send address error for {}: {}", target, e);
                    }
                }
            }
        }

        self.pop_after(state, prev);
        let entry = &mut self.pool[idx];
        entry.rloc16 = notify.rloc16;
        entry.set_cached(CachedFields {
            mesh_local_iid: Some(notify.mesh_local_iid),
            last_transaction_time: Some(last_transaction_time),
            freshness_timeout: self.config.freshness_timeout,
        });
        self.push(CacheState::Cached, idx);
        self.ticker.register();
        self.log_change(EntryAction::Updated, ChangeReason::ReceivedNotification, idx, CacheState::Cached);

        match self.deps.agent.send_ack(request) {
            Ok(()) => debug!("Sent {} ack", Uri::AddressNotify),
            Err(e) => warn!("Failed to ack {} from {}: {}", Uri::AddressNotify, request.source, e),
        }

        self.signal(target, ResolutionOutcome::Resolved(notify.rloc16));
        Ok(())
    }

    /// Drop a duplicate address held locally or by a minimal child
    pub fn handle_address_error(&mut self, request: &InboundRequest) -> Result<(), ResolverError> {
        let error = AddressError::decode(&request.payload)?;
        component_debug!(COMPONENT, "Received {} for {} from {}", Uri::AddressError, error.target, request.source);

        if request.confirmable && !request.multicast {
            match self.deps.agent.send_ack(request) {
                Ok(()) => debug!("Sent {} ack", Uri::AddressError),
                Err(e) => warn!("Failed to ack {} from {}: {}", Uri::AddressError, request.source, e),
            }
        }

        if self.deps.netif.has_unicast_address(&error.target)
            && self.deps.netif.mesh_local_iid() != error.mesh_local_iid
        {
            self.deps.netif.remove_unicast_address(&error.target);
            component_warn!(COMPONENT, "Removed duplicate address {}", error.target);
            return Ok(());
        }

        if let Some(child) = self
            .deps
            .children
            .remove_conflicting_address(&error.target, &error.mesh_local_iid)
        {
            let destination = self.deps.netif.locator_address(child);
            self.send_address_error(error.target, error.mesh_local_iid, Some(destination))?;
        }

        Ok(())
    }

    /// Multicast a query for `target` to all routers
    pub(crate) fn send_address_query(&self, target: &Ipv6Addr) -> Result<(), ResolverError> {
        let payload = AddressQuery::new(*target).encode()?;
        self.deps
            .agent
            .send(TmfMessage::new(Uri::AddressQuery, REALM_LOCAL_ALL_ROUTERS, false, payload))?;
        component_debug!(COMPONENT, "Sent {} for {}", Uri::AddressQuery, target);
        Ok(())
    }

    fn send_address_notify(
        &self,
        target: Ipv6Addr,
        mesh_local_iid: MeshLocalIid,
        last_transaction_time: Option<u32>,
        destination: Ipv6Addr,
    ) -> Result<(), ResolverError> {
        let notify = AddressNotify {
            target,
            mesh_local_iid,
            rloc16: self.deps.netif.rloc16(),
            last_transaction_time,
        };
        self.deps
            .agent
            .send(TmfMessage::new(Uri::AddressNotify, destination, true, notify.encode()?))?;
        component_debug!(COMPONENT, "Sent {} for {} to {}", Uri::AddressNotify, target, destination);
        Ok(())
    }

    /// Send an address error; unicast errors are confirmable, `None` means
    /// multicast to all routers
    pub fn send_address_error(
        &self,
        target: Ipv6Addr,
        mesh_local_iid: MeshLocalIid,
        destination: Option<Ipv6Addr>,
    ) -> Result<(), ResolverError> {
        let payload = AddressError::new(target, mesh_local_iid).encode()?;
        let message = match destination {
            Some(destination) => TmfMessage::new(Uri::AddressError, destination, true, payload),
            None => TmfMessage::new(Uri::AddressError, REALM_LOCAL_ALL_ROUTERS, false, payload),
        };
        let destination = message.destination;
        self.deps.agent.send(message)?;
        component_debug!(COMPONENT, "Sent {} for {} to {}", Uri::AddressError, target, destination);
        Ok(())
    }

    /// Locator serving `rloc16`'s device
    pub fn locator_for(&self, rloc16: Rloc16) -> Ipv6Addr {
        self.deps.netif.locator_address(rloc16)
    }
}

#[cfg(test)]
mod tests {
    use crate::agent::{AgentOutput, InboundRequest};
    use crate::entry::CacheState;
    use crate::error::ResolverError;
    use crate::events::{ResolutionEvent, ResolutionOutcome};
    use crate::testing::{addr, Harness, LOCAL_IID};
    use bytes::Bytes;
    use mesh_routing::{ChildEntry, DeviceMode};
    use mesh_wire::{AddressError, AddressNotify, AddressQuery, MeshLocalIid, Rloc16, Uri};

    fn query_request(target: &str, confirmable: bool) -> InboundRequest {
        InboundRequest {
            uri: Uri::AddressQuery,
            source: addr("fd00::ff:fe00:800"),
            multicast: true,
            confirmable,
            payload: AddressQuery::new(addr(target)).encode().unwrap(),
        }
    }

    fn error_request(target: &str, iid: [u8; 8], multicast: bool, confirmable: bool) -> InboundRequest {
        InboundRequest {
            uri: Uri::AddressError,
            source: addr("fd00::ff:fe00:800"),
            multicast,
            confirmable,
            payload: AddressError::new(addr(target), MeshLocalIid(iid)).encode().unwrap(),
        }
    }

    fn only_message(outputs: Vec<AgentOutput>) -> crate::agent::TmfMessage {
        assert_eq!(outputs.len(), 1, "unexpected outputs {:?}", outputs);
        match outputs.into_iter().next() {
            Some(AgentOutput::Message(message)) => message,
            other => panic!("expected a message, got {:?}", other),
        }
    }

    #[test]
    fn test_notify_resolves_query() {
        let mut h = Harness::new();
        let a = addr("fd00::a");
        assert_eq!(h.resolver.resolve(&a, true), Err(ResolverError::QueryPending));
        h.sent();

        h.notify(&a, Rloc16(0x1234), [7; 8], Some(5)).unwrap();

        let info = h.resolver.entry(&a).unwrap();
        assert_eq!(info.state, CacheState::Cached);
        assert_eq!(info.rloc16, Rloc16(0x1234));
        assert_eq!(info.last_transaction_time, Some(5));
        assert_eq!(info.mesh_local_iid, Some(MeshLocalIid([7; 8])));
        assert_eq!(info.timeout, 3);
        assert_eq!(
            h.drain_events(),
            vec![ResolutionEvent {
                target: a,
                outcome: ResolutionOutcome::Resolved(Rloc16(0x1234)),
            }]
        );
        assert!(matches!(h.sent().as_slice(), [AgentOutput::Ack { uri: Uri::AddressNotify, .. }]));
        assert_eq!(h.resolver.resolve(&a, true), Ok(Rloc16(0x1234)));
    }

    #[test]
    fn test_notify_without_transaction_time_is_authoritative() {
        let mut h = Harness::new();
        let a = addr("fd00::a");
        let _ = h.resolver.resolve(&a, true);

        h.notify(&a, Rloc16(0x1c00), [7; 8], None).unwrap();
        assert_eq!(h.resolver.entry(&a).unwrap().last_transaction_time, Some(0));
    }

    #[test]
    fn test_notify_without_entry_is_ignored() {
        let mut h = Harness::new();
        let a = addr("fd00::a");
        h.notify(&a, Rloc16(0x1c00), [7; 8], None).unwrap();
        assert!(h.resolver.entry(&a).is_none());
        assert!(h.sent().is_empty());
    }

    #[test]
    fn test_notify_must_be_confirmable() {
        let mut h = Harness::new();
        let a = addr("fd00::a");
        let _ = h.resolver.resolve(&a, true);

        let mut request = h.notify_request(&a, Rloc16(0x1c00), [7; 8], None);
        request.confirmable = false;
        assert!(matches!(
            h.resolver.handle_request(&request),
            Err(ResolverError::InvalidState(_))
        ));
        assert_eq!(h.resolver.entry(&a).unwrap().state, CacheState::Query);
    }

    #[test]
    fn test_malformed_notify_is_rejected() {
        let mut h = Harness::new();
        let a = addr("fd00::a");
        let _ = h.resolver.resolve(&a, true);

        let mut request = h.notify_request(&a, Rloc16(0x1c00), [7; 8], None);
        request.payload = Bytes::from_static(&[0x00, 0x10, 0xfd]);
        assert!(matches!(h.resolver.handle_request(&request), Err(ResolverError::Parse(_))));
        assert_eq!(h.resolver.entry(&a).unwrap().state, CacheState::Query);
    }

    #[test]
    fn test_fresher_conflicting_claim_wins() {
        // Cached A owned by X (ltt 10), Y claims with ltt 5
        let mut h = Harness::new();
        let a = addr("fd00::a");
        let _ = h.resolver.resolve(&a, true);
        h.notify(&a, Rloc16(0x1c00), [0x11; 8], Some(10)).unwrap();
        h.sent();
        h.drain_events();

        h.notify(&a, Rloc16(0x2000), [0x22; 8], Some(5)).unwrap();

        let info = h.resolver.entry(&a).unwrap();
        assert_eq!(info.rloc16, Rloc16(0x2000));
        assert_eq!(info.mesh_local_iid, Some(MeshLocalIid([0x22; 8])));
        assert_eq!(info.last_transaction_time, Some(5));

        let outputs = h.sent();
        assert_eq!(outputs.len(), 2);
        let AgentOutput::Message(error) = &outputs[0] else {
            panic!("expected the address error first");
        };
        assert_eq!(error.uri, Uri::AddressError);
        assert!(error.confirmable);
        assert_eq!(error.destination, h.resolver.locator_for(Rloc16(0x1c00)));
        let payload = AddressError::decode(&error.payload).unwrap();
        assert_eq!(payload.target, a);
        assert_eq!(payload.mesh_local_iid, MeshLocalIid([0x22; 8]));
        assert!(matches!(outputs[1], AgentOutput::Ack { .. }));
    }

    #[test]
    fn test_stale_conflicting_claim_is_discarded() {
        let mut h = Harness::new();
        let a = addr("fd00::a");
        let _ = h.resolver.resolve(&a, true);
        h.notify(&a, Rloc16(0x1c00), [0x11; 8], Some(10)).unwrap();
        h.sent();
        h.drain_events();

        h.notify(&a, Rloc16(0x2000), [0x22; 8], Some(10)).unwrap();
        assert_eq!(h.resolver.entry(&a).unwrap().rloc16, Rloc16(0x1c00));
        assert!(h.sent().is_empty());
        assert!(h.drain_events().is_empty());
    }

    #[test]
    fn test_same_owner_always_updates() {
        let mut h = Harness::new();
        let a = addr("fd00::a");
        let _ = h.resolver.resolve(&a, true);
        h.notify(&a, Rloc16(0x1c00), [0x11; 8], Some(10)).unwrap();
        h.sent();

        h.notify(&a, Rloc16(0x1c01), [0x11; 8], Some(40)).unwrap();
        let info = h.resolver.entry(&a).unwrap();
        assert_eq!(info.rloc16, Rloc16(0x1c01));
        assert_eq!(info.last_transaction_time, Some(40));
        assert_eq!(h.sent().len(), 1);
    }

    #[test]
    fn test_notify_completes_retry_entry() {
        let mut h = Harness::new();
        let a = addr("fd00::a");
        let _ = h.resolver.resolve(&a, true);
        h.ticks(3);
        h.drain_events();

        h.notify(&a, Rloc16(0x1c00), [7; 8], None).unwrap();
        assert_eq!(h.resolver.entry(&a).unwrap().state, CacheState::Cached);
        assert_eq!(h.drain_events().len(), 1);
    }

    #[test]
    fn test_query_for_own_address() {
        let mut h = Harness::new();
        let own = addr("fd00::1234");
        h.node.add_unicast_address(own);

        h.resolver
            .handle_request(&query_request("fd00::1234", false))
            .unwrap();

        let message = only_message(h.sent());
        assert_eq!(message.uri, Uri::AddressNotify);
        assert!(message.confirmable);
        assert_eq!(message.destination, addr("fd00::ff:fe00:800"));
        let notify = AddressNotify::decode(&message.payload).unwrap();
        assert_eq!(notify.target, own);
        assert_eq!(notify.rloc16, h.local);
        assert_eq!(notify.mesh_local_iid, LOCAL_IID);
        assert_eq!(notify.last_transaction_time, None);
    }

    #[test]
    fn test_query_answered_for_minimal_child() {
        let mut h = Harness::new();
        let child = ChildEntry::new(Rloc16(0x0401), [0x10; 8], DeviceMode::empty());
        let child_iid = child.mesh_local_iid();
        h.children.add_child(child);
        h.children
            .register_address(Rloc16(0x0401), addr("fd00::c1"))
            .unwrap();

        h.resolver
            .handle_request(&query_request("fd00::c1", false))
            .unwrap();

        let notify = AddressNotify::decode(&only_message(h.sent()).payload).unwrap();
        assert_eq!(notify.mesh_local_iid, child_iid);
        assert_eq!(notify.rloc16, h.local);
        assert!(notify.last_transaction_time.is_some());
    }

    #[test]
    fn test_query_for_unknown_address_is_silent() {
        let mut h = Harness::new();
        h.resolver
            .handle_request(&query_request("fd00::99", false))
            .unwrap();
        assert!(h.sent().is_empty());

        assert!(matches!(
            h.resolver.handle_request(&query_request("fd00::99", true)),
            Err(ResolverError::InvalidState(_))
        ));
    }

    #[test]
    fn test_malformed_query_is_rejected() {
        let mut h = Harness::new();
        let own = addr("fd00::1234");
        h.node.add_unicast_address(own);

        let mut request = query_request("fd00::1234", false);
        request.payload = Bytes::from_static(&[0x00, 0x10, 0xfd, 0x00]);
        assert!(matches!(h.resolver.handle_request(&request), Err(ResolverError::Parse(_))));

        request.payload = Bytes::new();
        assert!(matches!(h.resolver.handle_request(&request), Err(ResolverError::Parse(_))));
        assert!(h.sent().is_empty());
    }

    #[test]
    fn test_malformed_error_is_rejected() {
        let mut h = Harness::new();
        let own = addr("fd00::1234");
        h.node.add_unicast_address(own);

        // Target present, interface id truncated
        let mut request = error_request("fd00::1234", [0x99; 8], false, true);
        let cut = request.payload.len() - 4;
        request.payload = request.payload.slice(..cut);
        assert!(matches!(h.resolver.handle_request(&request), Err(ResolverError::Parse(_))));

        assert!(h.node_has(&own));
        assert!(h.sent().is_empty());
    }

    #[test]
    fn test_error_removes_duplicate_own_address() {
        let mut h = Harness::new();
        let own = addr("fd00::1234");
        h.node.add_unicast_address(own);

        h.resolver
            .handle_request(&error_request("fd00::1234", [0x99; 8], true, false))
            .unwrap();
        assert!(!h.node_has(&own));
        assert!(h.sent().is_empty());
    }

    #[test]
    fn test_error_naming_us_keeps_address() {
        let mut h = Harness::new();
        let own = addr("fd00::1234");
        h.node.add_unicast_address(own);

        h.resolver
            .handle_request(&error_request("fd00::1234", LOCAL_IID.0, false, true))
            .unwrap();
        assert!(h.node_has(&own));
        // Confirmable unicast errors are acknowledged
        assert!(matches!(h.sent().as_slice(), [AgentOutput::Ack { uri: Uri::AddressError, .. }]));
    }

    #[test]
    fn test_error_relayed_to_conflicting_child() {
        let mut h = Harness::new();
        h.children
            .add_child(ChildEntry::new(Rloc16(0x0401), [0x10; 8], DeviceMode::empty()));
        h.children
            .register_address(Rloc16(0x0401), addr("fd00::c1"))
            .unwrap();

        h.resolver
            .handle_request(&error_request("fd00::c1", [0x99; 8], true, false))
            .unwrap();

        let message = only_message(h.sent());
        assert_eq!(message.uri, Uri::AddressError);
        assert!(message.confirmable);
        assert_eq!(message.destination, h.resolver.locator_for(Rloc16(0x0401)));
        assert!(!h.children.get(Rloc16(0x0401)).unwrap().has_address(&addr("fd00::c1")));
    }

    #[test]
    fn test_multicast_address_error() {
        let mut h = Harness::new();
        h.resolver
            .send_address_error(addr("fd00::a"), MeshLocalIid([1; 8]), None)
            .unwrap();

        let message = only_message(h.sent());
        assert!(!message.confirmable);
        assert_eq!(message.destination, addr("ff03::2"));
    }
}
