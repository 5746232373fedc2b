//! Background sweeps — agent expiry and retention.
//!
//! Two periodic duties run off the same loop: agents whose heartbeat has
//! gone stale past the dead threshold are deleted through the normal
//! delete path (so the change feed observes them), and bounded retention
//! is enforced on feed entries, idle cursors and process records.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use telegrid_state::Agent;

use crate::config::ManagerConfig;
use crate::error::ManagerResult;
use crate::manager::Manager;

/// Heartbeat-derived health of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentLiveness {
    Healthy,
    /// Stale past the expiry threshold; retained, consumers may filter.
    Unhealthy,
    /// Stale past the dead threshold; deleted by the sweep.
    Dead,
}

/// Classify an agent's liveness from its heartbeat age.
pub fn classify_liveness(agent: &Agent, now_ns: u64, config: &ManagerConfig) -> AgentLiveness {
    let age = agent.heartbeat_age_ns(now_ns);
    if age >= config.agent_dead_threshold.as_nanos() as u64 {
        AgentLiveness::Dead
    } else if age >= config.agent_expiry_threshold.as_nanos() as u64 {
        AgentLiveness::Unhealthy
    } else {
        AgentLiveness::Healthy
    }
}

/// Counters from one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub agents_deleted: usize,
    pub feed_trimmed: usize,
    pub cursors_purged: usize,
    pub processes_purged: usize,
}

impl SweepStats {
    fn any(&self) -> bool {
        self.agents_deleted + self.feed_trimmed + self.cursors_purged + self.processes_purged
            > 0
    }
}

/// Periodic sweeper over one manager.
pub struct Sweeper {
    manager: Arc<Manager>,
}

impl Sweeper {
    pub fn new(manager: Arc<Manager>) -> Self {
        Self { manager }
    }

    /// Run sweeps until the shutdown signal fires.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.manager.config().sweep_interval;
        debug!(?interval, "sweeper started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.sweep_once() {
                        Ok(stats) if stats.any() => info!(
                            agents_deleted = stats.agents_deleted,
                            feed_trimmed = stats.feed_trimmed,
                            cursors_purged = stats.cursors_purged,
                            processes_purged = stats.processes_purged,
                            "sweep complete"
                        ),
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    debug!("sweeper shutting down");
                    break;
                }
            }
        }
    }

    /// One synchronous pass over both duties.
    pub fn sweep_once(&self) -> ManagerResult<SweepStats> {
        let now = self.manager.now_ns();
        let config = self.manager.config().clone();
        let mut stats = SweepStats::default();

        for agent in self.manager.get_active_agents()? {
            match classify_liveness(&agent, now, &config) {
                AgentLiveness::Dead => {
                    warn!(
                        agent = %agent.id,
                        age_ns = agent.heartbeat_age_ns(now),
                        "deleting dead agent"
                    );
                    self.manager.delete_agent(agent.id)?;
                    stats.agents_deleted += 1;
                }
                AgentLiveness::Unhealthy => {
                    debug!(agent = %agent.id, "agent unhealthy, retained")
                }
                AgentLiveness::Healthy => {}
            }
        }

        let store = self.manager.store();
        stats.feed_trimmed =
            store.trim_feed(now.saturating_sub(config.feed_retention.as_nanos() as u64))?;
        stats.cursors_purged = store
            .purge_idle_cursors(now.saturating_sub(config.cursor_idle_retention.as_nanos() as u64))?;
        stats.processes_purged = store
            .purge_stale_processes(now.saturating_sub(config.process_ttl.as_nanos() as u64))?;

        Ok(stats)
    }
}
