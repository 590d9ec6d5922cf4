use std::{env, time::Duration as StdDuration};

use chrono::Duration;
use log::warn;

/// Tunables for the pipeline. `Default` gives the contract constants (30-day attribution window,
/// 30-minute session timeout); `from_env` applies `ACL_*` overrides on top, following the same
/// pattern as `ACL_DATABASE_URL`.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How long after a click a conversion is still credited to the referring partner.
    pub attribution_window: Duration,
    /// Hard session timeout: a session ends after this much inactivity.
    pub session_timeout: Duration,
    /// How long a referral-code lookup may be served from cache before re-reading the ledger.
    pub partner_cache_ttl: Duration,
    /// The durable session copy is refreshed every Nth tracked event (and always on end).
    pub session_reconcile_every: u32,
    /// Buffer size of the bounded event channels feeding the fan-out workers.
    pub event_buffer_size: usize,
    /// Liveness heartbeat period for the event hub.
    pub heartbeat_interval: StdDuration,
    pub partner_cache_capacity: u64,
    pub attribution_cache_capacity: u64,
    pub session_cache_capacity: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            attribution_window: Duration::days(30),
            session_timeout: Duration::minutes(30),
            partner_cache_ttl: Duration::seconds(300),
            session_reconcile_every: 10,
            event_buffer_size: 128,
            heartbeat_interval: StdDuration::from_secs(30),
            partner_cache_capacity: 10_000,
            attribution_cache_capacity: 1_000_000,
            session_cache_capacity: 100_000,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(days) = env_i64("ACL_ATTRIBUTION_WINDOW_DAYS") {
            config.attribution_window = Duration::days(days);
        }
        if let Some(minutes) = env_i64("ACL_SESSION_TIMEOUT_MINUTES") {
            config.session_timeout = Duration::minutes(minutes);
        }
        if let Some(seconds) = env_i64("ACL_PARTNER_CACHE_TTL_SECONDS") {
            config.partner_cache_ttl = Duration::seconds(seconds);
        }
        if let Some(n) = env_i64("ACL_SESSION_RECONCILE_EVERY") {
            config.session_reconcile_every = n.max(1) as u32;
        }
        if let Some(n) = env_i64("ACL_EVENT_BUFFER_SIZE") {
            config.event_buffer_size = n.max(1) as usize;
        }
        if let Some(seconds) = env_i64("ACL_HEARTBEAT_INTERVAL_SECONDS") {
            config.heartbeat_interval = StdDuration::from_secs(seconds.max(1) as u64);
        }
        config
    }
}

fn env_i64(name: &str) -> Option<i64> {
    let value = env::var(name).ok()?;
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("{name} is set to {value}, which is not a number. Ignoring it.");
            None
        },
    }
}
