//! Address resolver for mesh networks.
//!
//! Maps endpoint identifiers (EIDs) to the 16-bit routing locators of the
//! devices serving them. Resolution is backed by a fixed-size cache, passive
//! learning from forwarded traffic, and multicast address queries with
//! exponential retry backoff.
//!
//! ## Example
//!
//! ```ignore
//! let (resolver_events, forwarder) = tokio::sync::mpsc::unbounded_channel();
//! let resolver = AddressResolver::new(config, collaborators, resolver_events);
//! let (service, handle) = ResolverService::new(resolver);
//! tokio::spawn(service.run());
//!
//! match handle.resolve(eid, true).await {
//!     Ok(rloc16) => forward(rloc16),
//!     Err(ResolverError::QueryPending) => hold(eid),
//!     Err(_) => drop_traffic(),
//! }
//! ```

#![warn(clippy::all)]

#[macro_use]
pub mod logging;

pub mod agent;
pub mod config;
pub mod entry;
pub mod error;
pub mod events;
pub mod list;
pub mod netif;
pub mod pool;
pub mod resolver;
pub mod service;
pub mod ticker;

mod protocol;
mod tick;

#[cfg(test)]
mod testing;

// Re-export main types
pub use agent::{AgentOutput, ChannelAgent, InboundRequest, MessageAgent, TmfMessage};
pub use config::ResolverConfig;
pub use entry::{CacheState, EntryInfo};
pub use error::{ConfigError, ResolverError};
pub use events::{ChangeReason, RemoveReason, ResolutionEvent, ResolutionOutcome};
pub use logging::{init_logging, ResolverLogFormatter};
pub use netif::{LocalInterface, LocalNode, ServiceLookup, ServiceTable, REALM_LOCAL_ALL_ROUTERS};
pub use resolver::{AddressResolver, Collaborators};
pub use service::{ResolverHandle, ResolverService};
pub use ticker::TickerHandle;
