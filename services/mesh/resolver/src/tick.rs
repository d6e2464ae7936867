//! Per-second timer handling.

use crate::entry::CacheState;
use crate::events::ResolutionOutcome;
use crate::logging::COMPONENT;
use crate::resolver::AddressResolver;
use tracing::debug;

impl AddressResolver {
    /// Advance every running counter by one tick.
    ///
    /// Query entries that time out move to the query-retry head with a
    /// doubled retry delay and signal Drop. Query-retry entries whose delay
    /// elapses enter ramp-down, during which the delay is halved once per
    /// `max_retry_delay` ticks down to `initial_retry_delay`. The tick is
    /// unregistered once no counter is running.
    pub fn handle_time_tick(&mut self) {
        let mut keep_ticking = false;
        let initial_retry_delay = self.config.initial_retry_delay;
        let max_retry_delay = self.config.max_retry_delay;

        let mut cur = self.list(CacheState::Cached).head();
        while let Some(idx) = cur {
            cur = self.pool[idx].next;
            if let Some(cached) = self.pool[idx].as_cached_mut() {
                if cached.freshness_timeout > 0 {
                    keep_ticking = true;
                    cached.freshness_timeout -= 1;
                }
            }
        }

        let mut cur = self.list(CacheState::Snooped).head();
        while let Some(idx) = cur {
            cur = self.pool[idx].next;
            if let Some(fields) = self.pool[idx].as_pending_mut() {
                if fields.timeout > 0 {
                    keep_ticking = true;
                    fields.timeout -= 1;
                    if fields.timeout == 0 {
                        fields.can_evict = true;
                    }
                }
            }
        }

        let mut cur = self.list(CacheState::QueryRetry).head();
        while let Some(idx) = cur {
            let entry = &mut self.pool[idx];
            cur = entry.next;
            let target = entry.target;

            let Some(fields) = entry.as_pending_mut() else {
                continue;
            };
            if fields.timeout == 0 {
                continue;
            }

            keep_ticking = true;
            fields.timeout -= 1;
            if fields.timeout > 0 {
                continue;
            }

            if !fields.ramp_down {
                fields.ramp_down = true;
                fields.timeout = max_retry_delay;
                component_info!(COMPONENT, "Starting retry delay ramp-down for {}", target);
            } else {
                let delay = (fields.retry_delay >> 1).max(initial_retry_delay);
                if delay != fields.retry_delay {
                    fields.retry_delay = delay;
                    fields.timeout = max_retry_delay;
                    component_info!(COMPONENT, "Retry delay for {} ramped down to {}s", target, delay);
                }
            }
        }

        let mut prev = None;
        let mut cur = self.list(CacheState::Query).head();
        while let Some(idx) = cur {
            cur = self.pool[idx].next;

            let timed_out = match self.pool[idx].as_pending_mut() {
                Some(fields) if fields.timeout > 0 => {
                    keep_ticking = true;
                    fields.timeout -= 1;
                    if fields.timeout == 0 {
                        let delay = fields.retry_delay;
                        fields.timeout = delay;
                        fields.retry_delay = delay.saturating_mul(2).min(max_retry_delay);
                        fields.can_evict = true;
                        fields.ramp_down = false;
                        true
                    } else {
                        false
                    }
                }
                _ => false,
            };

            if !timed_out {
                prev = Some(idx);
                continue;
            }

            let target = self.pool[idx].target;
            self.pop_after(CacheState::Query, prev);
            self.push(CacheState::QueryRetry, idx);
            component_info!(COMPONENT, "Timed out waiting for address notification for {}", target);
            self.signal(target, ResolutionOutcome::Drop);
        }

        if !keep_ticking {
            debug!("No resolver timers running");
            self.ticker.unregister();
        }
    }
}
