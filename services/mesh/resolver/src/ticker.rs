//! Registration flag for the one-second tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Shared flag telling the event loop whether the resolver wants ticks
#[derive(Debug, Clone, Default)]
pub struct TickerHandle {
    registered: Arc<AtomicBool>,
}

impl TickerHandle {
    /// Create an unregistered handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for ticks
    pub fn register(&self) {
        if !self.registered.swap(true, Ordering::AcqRel) {
            trace!("Address resolver tick registered");
        }
    }

    /// Stop ticks
    pub fn unregister(&self) {
        if self.registered.swap(false, Ordering::AcqRel) {
            trace!("Address resolver tick unregistered");
        }
    }

    /// Whether ticks are wanted
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }
}
