//! Resolver errors

use mesh_wire::WireError;
use thiserror::Error;

/// Outcome of a failed resolver operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    /// No entry for the address, and no query was allowed
    #[error("address not found")]
    NotFound,

    /// An address query is outstanding for the address
    #[error("address query pending")]
    QueryPending,

    /// The address recently failed to resolve; drop the traffic
    #[error("address resolution recently failed, dropping")]
    Drop,

    /// No entry could be allocated
    #[error("no entry available")]
    NoBufs,

    /// Malformed message payload
    #[error("parse error: {0}")]
    Parse(#[from] WireError),

    /// Request not acceptable in the current state
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Message could not be handed to the message agent
    #[error("send failed: {0}")]
    Send(String),
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value is outside its accepted range
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Name of the offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}
