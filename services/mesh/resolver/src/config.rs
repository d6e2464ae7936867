//! Configuration handling for the address resolver.
//!
//! Values come from the `address_resolver:` section of the shared YAML
//! config file, then `MESH_RESOLVER_*` environment variables.

use crate::error::ConfigError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Address resolver configuration. Timeouts are in ticks (seconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Number of cache entries
    pub cache_entries: u16,
    /// Maximum number of snooped entries pinned against eviction at once
    pub max_snooped_non_evictable: u16,
    /// Seconds to wait for an address notify
    pub query_timeout: u16,
    /// First retry delay after a failed query, and the ramp-down floor
    pub initial_retry_delay: u16,
    /// Ceiling of the retry delay, and the length of each ramp-down step
    pub max_retry_delay: u16,
    /// Seconds a new snooped entry is pinned against eviction
    pub snoop_eviction_timeout: u16,
    /// Seconds a notified entry skips the reachability check
    pub freshness_timeout: u16,
    /// Tick period. Every counter above is in ticks, so only one second is
    /// accepted by `validate`.
    #[serde(with = "humantime_serde")]
    pub tick_period: Duration,
    /// Resolve network-data service addresses without querying
    pub resolve_using_net_data_services: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_entries: 32,
            max_snooped_non_evictable: 2,
            query_timeout: 3,
            initial_retry_delay: 15,
            max_retry_delay: 120,
            snoop_eviction_timeout: 3,
            freshness_timeout: 3,
            tick_period: Duration::from_secs(1),
            resolve_using_net_data_services: true,
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    address_resolver: Option<ResolverConfig>,
}

impl ResolverConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        match std::fs::read_to_string(&config_path) {
            Ok(content) => match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root) => {
                    if let Some(section) = root.address_resolver {
                        config = section;
                    }
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => warn!(
                    "Failed to parse config file {:?}, using defaults: {}",
                    config_path.as_ref(),
                    e
                ),
            },
            Err(_) => warn!("Config file {:?} not found, using defaults", config_path.as_ref()),
        }

        config.apply_environment_overrides();
        config.validate().context("invalid address resolver configuration")?;

        info!(
            "Final resolver configuration: entries={}, query_timeout={}s, retry={}..{}s, tick={}",
            config.cache_entries,
            config.query_timeout,
            config.initial_retry_delay,
            config.max_retry_delay,
            humantime::format_duration(config.tick_period)
        );

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let numeric: [(&str, &mut u16); 7] = [
            ("MESH_RESOLVER_CACHE_ENTRIES", &mut self.cache_entries),
            ("MESH_RESOLVER_MAX_SNOOPED_NON_EVICTABLE", &mut self.max_snooped_non_evictable),
            ("MESH_RESOLVER_QUERY_TIMEOUT", &mut self.query_timeout),
            ("MESH_RESOLVER_INITIAL_RETRY_DELAY", &mut self.initial_retry_delay),
            ("MESH_RESOLVER_MAX_RETRY_DELAY", &mut self.max_retry_delay),
            ("MESH_RESOLVER_SNOOP_EVICTION_TIMEOUT", &mut self.snoop_eviction_timeout),
            ("MESH_RESOLVER_FRESHNESS_TIMEOUT", &mut self.freshness_timeout),
        ];

        for (key, field) in numeric {
            if let Some(value) = lookup(key) {
                match value.parse::<u16>() {
                    Ok(parsed) => *field = parsed,
                    Err(_) => warn!("Ignoring {}={}: not a valid number", key, value),
                }
            }
        }

        if let Some(value) = lookup("MESH_RESOLVER_TICK_PERIOD") {
            match humantime::parse_duration(&value) {
                Ok(period) => self.tick_period = period,
                Err(e) => warn!("Ignoring MESH_RESOLVER_TICK_PERIOD={}: {}", value, e),
            }
        }

        if let Some(value) = lookup("MESH_RESOLVER_NET_DATA_SERVICES") {
            self.resolve_using_net_data_services = value.to_lowercase() == "true";
        }
    }

    /// Reject unusable values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_entries == 0 {
            return Err(ConfigError::invalid("cache_entries", "must be at least 1"));
        }
        if self.max_snooped_non_evictable > self.cache_entries {
            return Err(ConfigError::invalid(
                "max_snooped_non_evictable",
                format!("{} exceeds cache_entries {}", self.max_snooped_non_evictable, self.cache_entries),
            ));
        }
        if self.query_timeout == 0 {
            return Err(ConfigError::invalid("query_timeout", "must be at least 1"));
        }
        if self.initial_retry_delay == 0 {
            return Err(ConfigError::invalid("initial_retry_delay", "must be at least 1"));
        }
        if self.initial_retry_delay > self.max_retry_delay {
            return Err(ConfigError::invalid(
                "initial_retry_delay",
                format!("{} exceeds max_retry_delay {}", self.initial_retry_delay, self.max_retry_delay),
            ));
        }
        if self.snoop_eviction_timeout == 0 {
            return Err(ConfigError::invalid("snoop_eviction_timeout", "must be at least 1"));
        }
        if self.tick_period != Duration::from_secs(1) {
            return Err(ConfigError::invalid(
                "tick_period",
                format!(
                    "{} given, counters and transaction times are in seconds",
                    humantime::format_duration(self.tick_period)
                ),
            ));
        }
        Ok(())
    }
}

/// `Duration` as a humantime string ("1s", "500ms")
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
