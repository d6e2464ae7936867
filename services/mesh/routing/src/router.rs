//! Route lookup trait and route updates

use crate::next_hop::NextHop;
use mesh_wire::Rloc16;
use serde::{Deserialize, Serialize};

/// Next-hop lookup consulted before trusting a cached locator
pub trait RouteLookup: Send + Sync {
    /// Next hop towards `dest`, or `None` when `dest` is unreachable
    fn next_hop(&self, dest: Rloc16) -> Option<Rloc16>;

    /// Check if a destination is reachable
    fn is_reachable(&self, dest: Rloc16) -> bool {
        self.next_hop(dest).is_some()
    }
}

/// Route update for a single router id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteUpdate {
    /// Router id the update is for
    pub router_id: u8,
    /// New next hop (None means the router id was released)
    pub next_hop: Option<NextHop>,
}

impl RouteUpdate {
    /// Create a new route update
    pub fn new(router_id: u8, next_hop: NextHop) -> Self {
        Self {
            router_id,
            next_hop: Some(next_hop),
        }
    }

    /// Create a route removal update
    pub fn remove(router_id: u8) -> Self {
        Self {
            router_id,
            next_hop: None,
        }
    }
}
