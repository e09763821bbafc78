use std::time::Duration;

use crate::cache::DEFAULT_KEY_PREFIX;
use crate::session::SessionConfig;

/// Lobby client configuration
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// Interval of the `lastActive` liveness patch
    pub heartbeat_interval: Duration,
    /// File backing the local session cache
    pub session_cache_path: String,
    /// Prefix of the three cache slot names
    pub session_key_prefix: String,
    /// How many snapshots a roster subscriber may fall behind
    pub subscription_capacity: usize,
    /// Port of the metrics endpoint, disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            session_cache_path: ".lobby/session.json".to_string(),
            session_key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            subscription_capacity: 64,
            metrics_port: None,
        }
    }
}

impl LobbyConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load config from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(secs) = lookup("HEARTBEAT_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(parsed) if (1..=3600).contains(&parsed) => {
                    config.heartbeat_interval = Duration::from_secs(parsed);
                }
                Ok(_) => {
                    tracing::warn!("HEARTBEAT_INTERVAL_SECS must be 1-3600, using default")
                }
                Err(_) => {
                    tracing::warn!("Invalid HEARTBEAT_INTERVAL_SECS '{}', using default", secs)
                }
            }
        }

        if let Some(path) = lookup("SESSION_CACHE_PATH") {
            if path.trim().is_empty() {
                tracing::warn!("SESSION_CACHE_PATH is empty, using default");
            } else {
                config.session_cache_path = path;
            }
        }

        if let Some(prefix) = lookup("SESSION_KEY_PREFIX") {
            if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                config.session_key_prefix = prefix;
            } else {
                tracing::warn!("Invalid SESSION_KEY_PREFIX '{}', using default", prefix);
            }
        }

        if let Some(capacity) = lookup("SUBSCRIPTION_CAPACITY") {
            match capacity.parse::<usize>() {
                Ok(parsed) if (1..=65536).contains(&parsed) => {
                    config.subscription_capacity = parsed
                }
                Ok(_) => {
                    tracing::warn!("SUBSCRIPTION_CAPACITY must be 1-65536, using default")
                }
                Err(_) => {
                    tracing::warn!("Invalid SUBSCRIPTION_CAPACITY '{}', using default", capacity)
                }
            }
        }

        if let Some(port) = lookup("METRICS_PORT") {
            match port.parse::<u16>() {
                Ok(parsed) if parsed > 0 => config.metrics_port = Some(parsed),
                _ => tracing::warn!("Invalid METRICS_PORT '{}', metrics endpoint disabled", port),
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.heartbeat_interval.is_zero() {
            return Err("heartbeat_interval must be positive".to_string());
        }
        if self.subscription_capacity == 0 {
            return Err("subscription_capacity must be at least 1".to_string());
        }
        if self.session_key_prefix.is_empty() {
            return Err("session_key_prefix cannot be empty".to_string());
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            heartbeat_interval: self.heartbeat_interval,
        }
    }
}
