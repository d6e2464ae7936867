//! In-memory router table

use crate::next_hop::NextHop;
use crate::router::{RouteLookup, RouteUpdate};
use dashmap::DashMap;
use mesh_wire::Rloc16;
use std::sync::RwLock;
use tracing::{debug, info};

/// Router table keyed by router id
#[derive(Debug)]
pub struct RouterTable {
    /// Locator of this device
    local_rloc16: RwLock<Rloc16>,
    /// Routing table: router id -> next hop
    routes: DashMap<u8, NextHop>,
}

impl RouterTable {
    /// Create a new router table
    pub fn new(local_rloc16: Rloc16) -> Self {
        Self {
            local_rloc16: RwLock::new(local_rloc16),
            routes: DashMap::new(),
        }
    }

    /// Change the locator of this device (role change, re-attach).
    ///
    /// Next-hop computation uses this copy, so it must be updated together
    /// with the locator of the local interface.
    pub fn set_local_rloc16(&self, rloc16: Rloc16) {
        if let Ok(mut local) = self.local_rloc16.write() {
            info!("Local locator changed {} -> {}", *local, rloc16);
            *local = rloc16;
        }
    }

    /// Add or update a route
    pub fn add_route(&self, router_id: u8, next_hop: NextHop) {
        debug!(
            "Adding route to router {} via {} (cost: {})",
            router_id, next_hop.router, next_hop.cost
        );
        self.routes.insert(router_id, next_hop);
    }

    /// Remove a route, returns whether it existed
    pub fn remove_route(&self, router_id: u8) -> bool {
        if self.routes.remove(&router_id).is_some() {
            debug!("Removed route to router {}", router_id);
            true
        } else {
            false
        }
    }

    /// Get the route for a router id
    pub fn get_route(&self, router_id: u8) -> Option<NextHop> {
        self.routes.get(&router_id).map(|entry| *entry)
    }

    /// Get all routes
    pub fn get_all_routes(&self) -> Vec<(u8, NextHop)> {
        let mut routes: Vec<(u8, NextHop)> = self
            .routes
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        routes.sort_by_key(|(id, _)| *id);
        routes
    }

    /// Number of known routes
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Clear all routes
    pub fn clear_routes(&self) {
        self.routes.clear();
    }

    /// Apply a batch of route updates.
    ///
    /// Returns the router ids whose routes were released, so the caller can
    /// purge state tied to their locators.
    pub fn apply_updates(&self, updates: Vec<RouteUpdate>) -> Vec<u8> {
        let mut released = Vec::new();

        for update in updates {
            match update.next_hop {
                Some(next_hop) => self.add_route(update.router_id, next_hop),
                None => {
                    if self.remove_route(update.router_id) {
                        released.push(update.router_id);
                    }
                }
            }
        }

        if !released.is_empty() {
            info!("Router ids released: {:?}", released);
        }

        released
    }

    /// Locator of this device as seen by next-hop computation
    pub fn local_rloc16(&self) -> Rloc16 {
        self.local_rloc16
            .read()
            .map(|rloc| *rloc)
            .unwrap_or(Rloc16::INVALID)
    }
}

impl RouteLookup for RouterTable {
    fn next_hop(&self, dest: Rloc16) -> Option<Rloc16> {
        let local = self.local_rloc16();

        if !dest.is_valid() || !local.is_valid() {
            return None;
        }

        if dest == local {
            return Some(dest);
        }

        // A child forwards everything through its parent.
        if local.is_child() {
            return Some(local.parent());
        }

        if dest.router_id() == local.router_id() {
            return Some(dest);
        }

        match self.get_route(dest.router_id()) {
            Some(next_hop) if next_hop.is_reachable() => Some(next_hop.router),
            _ => {
                debug!("No route to {}", dest);
                None
            }
        }
    }
}
