//! Wire protocol error types.

use crate::tlv::TlvType;
use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Payload ended in the middle of a TLV header or value
    #[error("truncated tlv")]
    Truncated,

    /// A required TLV is absent from the payload
    #[error("missing {0:?} tlv")]
    Missing(TlvType),

    /// A TLV value is shorter than its type requires
    #[error("invalid {0:?} tlv length {1}")]
    Length(TlvType, usize),

    /// Value does not fit in a single TLV
    #[error("size limit exceeded: {0}")]
    Size(usize),

    /// Unknown resource path
    #[error("unknown uri {0}")]
    Uri(String),
}
