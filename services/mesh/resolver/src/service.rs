//! Event loop owning the resolver.
//!
//! All resolver calls, inbound messages and ticks are serialized on one
//! task. Callers talk to it through a cloneable [`ResolverHandle`].

use crate::agent::InboundRequest;
use crate::entry::EntryInfo;
use crate::error::ResolverError;
use crate::resolver::AddressResolver;
use mesh_wire::Rloc16;
use std::net::Ipv6Addr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Requests handled by the event loop
#[derive(Debug)]
pub enum ResolverCommand {
    Resolve {
        eid: Ipv6Addr,
        allow_query: bool,
        reply: oneshot::Sender<Result<Rloc16, ResolverError>>,
    },
    UpdateSnooped {
        eid: Ipv6Addr,
        src: Rloc16,
        dst: Rloc16,
    },
    Inbound(InboundRequest),
    RemoveRouterId(u8),
    RemoveRloc16(Rloc16),
    RemoveAddress {
        eid: Ipv6Addr,
        reply: oneshot::Sender<Result<(), ResolverError>>,
    },
    ReplaceRloc16 {
        old: Rloc16,
        new: Rloc16,
    },
    DestinationUnreachable(Ipv6Addr),
    RestartQueries,
    Clear,
    Entries(oneshot::Sender<Vec<EntryInfo>>),
}

/// Cloneable front end of a running [`ResolverService`]
#[derive(Debug, Clone)]
pub struct ResolverHandle {
    tx: mpsc::UnboundedSender<ResolverCommand>,
}

impl ResolverHandle {
    fn send(&self, command: ResolverCommand) {
        if self.tx.send(command).is_err() {
            warn!("Address resolver stopped, command dropped");
        }
    }

    async fn request<T>(&self, command: ResolverCommand, reply: oneshot::Receiver<T>) -> Result<T, ResolverError> {
        self.tx
            .send(command)
            .map_err(|_| ResolverError::InvalidState("address resolver stopped"))?;
        reply
            .await
            .map_err(|_| ResolverError::InvalidState("address resolver stopped"))
    }

    /// Resolve `eid`, querying the mesh when allowed
    pub async fn resolve(&self, eid: Ipv6Addr, allow_query: bool) -> Result<Rloc16, ResolverError> {
        let (reply, rx) = oneshot::channel();
        self.request(
            ResolverCommand::Resolve {
                eid,
                allow_query,
                reply,
            },
            rx,
        )
        .await?
    }

    /// Cache-only lookup
    pub async fn look_up(&self, eid: Ipv6Addr) -> Option<Rloc16> {
        self.resolve(eid, false).await.ok()
    }

    /// Learn from forwarded traffic
    pub fn update_snooped(&self, eid: Ipv6Addr, src: Rloc16, dst: Rloc16) {
        self.send(ResolverCommand::UpdateSnooped { eid, src, dst });
    }

    /// Hand over an inbound query, notify or error
    pub fn deliver(&self, request: InboundRequest) {
        self.send(ResolverCommand::Inbound(request));
    }

    /// A router id was released
    pub fn remove_router_id(&self, router_id: u8) {
        self.send(ResolverCommand::RemoveRouterId(router_id));
    }

    /// A locator went away
    pub fn remove_rloc16(&self, rloc16: Rloc16) {
        self.send(ResolverCommand::RemoveRloc16(rloc16));
    }

    /// Forget the cached entry for `eid`
    pub async fn remove_address(&self, eid: Ipv6Addr) -> Result<(), ResolverError> {
        let (reply, rx) = oneshot::channel();
        self.request(ResolverCommand::RemoveAddress { eid, reply }, rx)
            .await?
    }

    /// A device changed locator
    pub fn replace_rloc16(&self, old: Rloc16, new: Rloc16) {
        self.send(ResolverCommand::ReplaceRloc16 { old, new });
    }

    /// A destination-unreachable (no route) arrived for `dst`
    pub fn destination_unreachable(&self, dst: Ipv6Addr) {
        self.send(ResolverCommand::DestinationUnreachable(dst));
    }

    /// Resend all pending queries
    pub fn restart_queries(&self) {
        self.send(ResolverCommand::RestartQueries);
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.send(ResolverCommand::Clear);
    }

    /// Snapshot of all entries
    pub async fn entries(&self) -> Result<Vec<EntryInfo>, ResolverError> {
        let (reply, rx) = oneshot::channel();
        self.request(ResolverCommand::Entries(reply), rx).await
    }
}

/// Runs an [`AddressResolver`] on a single task
pub struct ResolverService {
    resolver: AddressResolver,
    commands: mpsc::UnboundedReceiver<ResolverCommand>,
    tick_period: Duration,
}

impl ResolverService {
    /// Wrap a resolver, returning the service and a handle to it
    pub fn new(resolver: AddressResolver) -> (Self, ResolverHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let tick_period = resolver.config().tick_period;
        (
            Self {
                resolver,
                commands,
                tick_period,
            },
            ResolverHandle { tx },
        )
    }

    /// Run until every handle is dropped
    pub async fn run(mut self) -> AddressResolver {
        info!("Starting address resolver (tick {:?})", self.tick_period);

        let ticker = self.resolver.ticker();
        let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + self.tick_period, self.tick_period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticking = ticker.is_registered();

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.dispatch(command),
                        None => {
                            info!("Address resolver shutting down");
                            break;
                        }
                    }
                }

                _ = ticks.tick(), if ticking => {
                    self.resolver.handle_time_tick();
                }
            }

            let registered = ticker.is_registered();
            if registered && !ticking {
                // First tick lands one full period after registration
                ticks.reset();
            }
            ticking = registered;
        }

        self.resolver
    }

    fn dispatch(&mut self, command: ResolverCommand) {
        match command {
            ResolverCommand::Resolve {
                eid,
                allow_query,
                reply,
            } => {
                let result = self.resolver.resolve(&eid, allow_query);
                if reply.send(result).is_err() {
                    debug!("Resolve caller for {} went away", eid);
                }
            }
            ResolverCommand::UpdateSnooped { eid, src, dst } => {
                self.resolver.update_snooped_cache_entry(&eid, src, dst);
            }
            ResolverCommand::Inbound(request) => {
                if let Err(e) = self.resolver.handle_request(&request) {
                    warn!("Failed to handle {} from {}: {}", request.uri, request.source, e);
                }
            }
            ResolverCommand::RemoveRouterId(router_id) => {
                self.resolver.remove_entries_for_router_id(router_id);
            }
            ResolverCommand::RemoveRloc16(rloc16) => {
                self.resolver.remove_entries_for_rloc16(rloc16);
            }
            ResolverCommand::RemoveAddress { eid, reply } => {
                let _ = reply.send(self.resolver.remove_entry_for_address(&eid));
            }
            ResolverCommand::ReplaceRloc16 { old, new } => {
                self.resolver.replace_entries_for_rloc16(old, new);
            }
            ResolverCommand::DestinationUnreachable(dst) => {
                self.resolver.handle_destination_unreachable(&dst);
            }
            ResolverCommand::RestartQueries => self.resolver.restart_address_queries(),
            ResolverCommand::Clear => self.resolver.clear(),
            ResolverCommand::Entries(reply) => {
                let _ = reply.send(self.resolver.entries());
            }
        }
    }
}
