//! Engine configuration, read once from the environment at startup.

use std::collections::HashSet;

use crate::constants::{DEFAULT_MIN_DAYS, MIN_DAYS_CAP};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lowercased exchange ids excluded from every read API.
    pub blacklist_exchanges: HashSet<String>,
    /// Minimum populated daily buckets for an exchange to be considered,
    /// clamped to [`MIN_DAYS_CAP`].
    pub minimal_days: u32,
    /// Skip the recurrent prefetch job.
    pub disable_prefetch: bool,
    /// Emit per-batch diagnostics from the live pipeline.
    pub debug_live_rates: bool,
    /// Run the sync tasks inside the read process.
    pub hack_sync_in_server: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            blacklist_exchanges: HashSet::new(),
            minimal_days: DEFAULT_MIN_DAYS,
            disable_prefetch: false,
            debug_live_rates: false,
            hack_sync_in_server: false,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let blacklist_exchanges = std::env::var("BLACKLIST_EXCHANGES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        let minimal_days = std::env::var("MINIMAL_DAYS_TO_CONSIDER_EXCHANGE")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_MIN_DAYS)
            .min(MIN_DAYS_CAP);
        Self {
            blacklist_exchanges,
            minimal_days,
            disable_prefetch: env_bool("DISABLE_PREFETCH"),
            debug_live_rates: env_bool("DEBUG_LIVE_RATES"),
            hack_sync_in_server: env_bool("HACK_SYNC_IN_SERVER"),
        }
    }

    /// Blacklist membership is case-insensitive.
    pub fn is_blacklisted(&self, exchange: &str) -> bool {
        self.blacklist_exchanges.contains(&exchange.to_lowercase())
    }
}

fn env_bool(key: &str) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
        Err(_) => false,
    }
}
