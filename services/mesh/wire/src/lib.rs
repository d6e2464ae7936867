//! Network-layer TLVs, locator types and address resolution messages for mesh.
//!
//! This crate provides the low-level encoding used by the address resolver:
//! the 16-bit routing locator (`Rloc16`), the owner interface identifier,
//! the TLV codec and the three address resolution messages.
//!
//! ## Wire Format
//!
//! ```text
//! Address Query   a/aq  NON  [Target]
//! Address Notify  a/an  CON  [Target][ML-EID][RLOC16]([Last Transaction Time])
//! Address Error   a/ae  any  [Target][ML-EID]
//! ```
//!
//! Message framing (URI-Path options, message ids, tokens) belongs to the
//! message agent and is not handled here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod error;
pub mod tlv;
pub mod types;

// Re-export main types
pub use address::{AddressError, AddressNotify, AddressQuery, Uri};
pub use error::WireError;
pub use tlv::{RawTlv, TlvIter, TlvType};
pub use types::{MeshLocalIid, Rloc16, MAX_ROUTER_ID};
