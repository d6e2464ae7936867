//! Router table, next-hop lookup and child table for mesh.
//!
//! This crate provides the topology views the address resolver consults:
//! the router table answering "is there a next hop towards this locator",
//! and the child table tracking attached minimal children and the addresses
//! they registered.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod children;
pub mod next_hop;
pub mod router;
pub mod table;

pub use children::*;
pub use next_hop::*;
pub use router::*;
pub use table::*;
