//! Manager configuration.

use std::time::Duration;

/// Tunables for the agent manager and its background sweeps.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Heartbeat age after which an agent counts as unhealthy.
    pub agent_expiry_threshold: Duration,
    /// Heartbeat age after which an agent is deleted by the expiry sweep.
    pub agent_dead_threshold: Duration,
    /// Minimum retention of change-feed entries.
    pub feed_retention: Duration,
    /// Maximum idle time before a cursor is garbage-collected.
    pub cursor_idle_retention: Duration,
    /// Retention of process records.
    pub process_ttl: Duration,
    /// Deadline for each persisted batch.
    pub store_write_timeout: Duration,
    /// Period of the background sweeps.
    pub sweep_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            agent_expiry_threshold: Duration::from_secs(60),
            agent_dead_threshold: Duration::from_secs(180),
            feed_retention: Duration::from_secs(6 * 3600),
            cursor_idle_retention: Duration::from_secs(3600),
            process_ttl: Duration::from_secs(24 * 3600),
            store_write_timeout: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(15),
        }
    }
}

impl ManagerConfig {
    pub fn with_agent_expiry_threshold(mut self, threshold: Duration) -> Self {
        self.agent_expiry_threshold = threshold;
        self
    }

    pub fn with_agent_dead_threshold(mut self, threshold: Duration) -> Self {
        self.agent_dead_threshold = threshold;
        self
    }

    pub fn with_feed_retention(mut self, retention: Duration) -> Self {
        self.feed_retention = retention;
        self
    }

    pub fn with_cursor_idle_retention(mut self, retention: Duration) -> Self {
        self.cursor_idle_retention = retention;
        self
    }

    pub fn with_process_ttl(mut self, ttl: Duration) -> Self {
        self.process_ttl = ttl;
        self
    }
}
