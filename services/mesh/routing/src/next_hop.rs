//! Next hop definitions and utilities

use mesh_wire::Rloc16;
use serde::{Deserialize, Serialize};

/// Route cost at and above which a destination is unreachable
pub const MAX_ROUTE_COST: u8 = 16;

/// A next hop for routing towards a router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NextHop {
    /// Locator of the neighboring router to forward through
    pub router: Rloc16,
    /// Path cost through this next hop
    pub cost: u8,
}

impl NextHop {
    /// Create a new next hop
    pub fn new(router: Rloc16, cost: u8) -> Self {
        Self { router, cost }
    }

    /// Whether the path cost is finite
    pub fn is_reachable(&self) -> bool {
        self.cost < MAX_ROUTE_COST && self.router.is_valid()
    }
}
