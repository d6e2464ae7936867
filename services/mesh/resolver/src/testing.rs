//! Test harness wiring a resolver to in-memory collaborators.

use crate::agent::{AgentOutput, ChannelAgent, InboundRequest, MessageAgent, TmfMessage};
use crate::config::ResolverConfig;
use crate::error::ResolverError;
use crate::events::ResolutionEvent;
use crate::netif::{LocalInterface, LocalNode, ServiceTable};
use crate::resolver::{AddressResolver, Collaborators};
use mesh_routing::{ChildTable, NextHop, RouterTable};
use mesh_wire::{AddressNotify, MeshLocalIid, Rloc16, Uri};
use std::io;
use std::net::Ipv6Addr;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing_subscriber::fmt::MakeWriter;

pub(crate) const LOCAL_RLOC16: Rloc16 = Rloc16(0x0400);
pub(crate) const LOCAL_IID: MeshLocalIid = MeshLocalIid([0xaa; 8]);
const MESH_LOCAL_PREFIX: [u8; 8] = [0xfd, 0xde, 0xad, 0x00, 0xbe, 0xef, 0x00, 0x00];

pub(crate) fn addr(s: &str) -> Ipv6Addr {
    s.parse().unwrap()
}

/// Log sink shared between a test and its subscriber
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` under a thread-local subscriber and return what it logged
pub(crate) fn capture_logs(f: impl FnOnce()) -> String {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}

/// Agent whose sends always fail
struct FailingAgent;

impl MessageAgent for FailingAgent {
    fn send(&self, _message: TmfMessage) -> Result<(), ResolverError> {
        Err(ResolverError::Send("link down".to_string()))
    }

    fn send_ack(&self, _request: &InboundRequest) -> Result<(), ResolverError> {
        Err(ResolverError::Send("link down".to_string()))
    }
}

/// Receiving ends of the agent and forwarder channels
pub(crate) struct Outputs {
    outbound: mpsc::UnboundedReceiver<AgentOutput>,
    events: mpsc::UnboundedReceiver<ResolutionEvent>,
}

impl Outputs {
    /// Everything handed to the message agent since the last call
    pub fn sent(&mut self) -> Vec<AgentOutput> {
        let mut outputs = Vec::new();
        while let Ok(output) = self.outbound.try_recv() {
            outputs.push(output);
        }
        outputs
    }

    /// Resolution events since the last call
    pub fn drain_events(&mut self) -> Vec<ResolutionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub(crate) struct Harness {
    pub resolver: AddressResolver,
    pub local: Rloc16,
    pub node: Arc<LocalNode>,
    pub routes: Arc<RouterTable>,
    pub children: Arc<ChildTable>,
    pub services: Arc<ServiceTable>,
    outputs: Outputs,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(ResolverConfig::default(), true, false)
    }

    pub fn with_config(config: ResolverConfig) -> Self {
        Self::build(config, true, false)
    }

    pub fn minimal_device() -> Self {
        Self::build(ResolverConfig::default(), false, false)
    }

    pub fn with_failing_agent() -> Self {
        Self::build(ResolverConfig::default(), true, true)
    }

    fn build(config: ResolverConfig, full_thread_device: bool, failing_agent: bool) -> Self {
        let node = Arc::new(LocalNode::new(
            MESH_LOCAL_PREFIX,
            LOCAL_IID,
            LOCAL_RLOC16,
            full_thread_device,
        ));

        // Routers 2..=10 reachable through router 2
        let routes = Arc::new(RouterTable::new(LOCAL_RLOC16));
        for router_id in 2..=10 {
            routes.add_route(router_id, NextHop::new(Rloc16::from_router_id(2), 1));
        }

        let children = Arc::new(ChildTable::new());
        let services = Arc::new(ServiceTable::new());
        let (channel_agent, outbound) = ChannelAgent::new();
        let agent: Arc<dyn MessageAgent> = if failing_agent {
            Arc::new(FailingAgent)
        } else {
            Arc::new(channel_agent)
        };
        let (events_tx, events) = mpsc::unbounded_channel();

        let deps = Collaborators {
            routes: routes.clone(),
            children: children.clone(),
            netif: node.clone(),
            services: services.clone(),
            agent,
        };

        Self {
            resolver: AddressResolver::new(config, deps, events_tx),
            local: LOCAL_RLOC16,
            node,
            routes,
            children,
            services,
            outputs: Outputs { outbound, events },
        }
    }

    /// Hand the resolver to a service, keeping the channel outputs
    pub fn split(self) -> (AddressResolver, Outputs) {
        (self.resolver, self.outputs)
    }

    pub fn sent(&mut self) -> Vec<AgentOutput> {
        self.outputs.sent()
    }

    pub fn drain_events(&mut self) -> Vec<ResolutionEvent> {
        self.outputs.drain_events()
    }

    /// Put `eid -> rloc16` in the cached list, discarding the traffic it
    /// generates
    pub fn cache(&mut self, eid: &Ipv6Addr, rloc16: Rloc16) {
        let _ = self.resolver.resolve(eid, true);
        self.resolver
            .update_cache_entry(eid, rloc16)
            .unwrap();
        self.sent();
        self.drain_events();
    }

    pub fn notify_request(
        &self,
        eid: &Ipv6Addr,
        rloc16: Rloc16,
        iid: [u8; 8],
        last_transaction_time: Option<u32>,
    ) -> InboundRequest {
        let notify = AddressNotify {
            target: *eid,
            mesh_local_iid: MeshLocalIid(iid),
            rloc16,
            last_transaction_time,
        };
        InboundRequest {
            uri: Uri::AddressNotify,
            source: self.resolver.locator_for(rloc16),
            multicast: false,
            confirmable: true,
            payload: notify.encode().unwrap(),
        }
    }

    pub fn notify(
        &mut self,
        eid: &Ipv6Addr,
        rloc16: Rloc16,
        iid: [u8; 8],
        last_transaction_time: Option<u32>,
    ) -> Result<(), ResolverError> {
        let request = self.notify_request(eid, rloc16, iid, last_transaction_time);
        self.resolver.handle_request(&request)
    }

    pub fn node_has(&self, address: &Ipv6Addr) -> bool {
        self.node.has_unicast_address(address)
    }

    pub fn tick(&mut self) {
        self.resolver.handle_time_tick();
    }

    pub fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }
}
