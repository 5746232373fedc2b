//! Manager facade — composes the store, the bus and the clock.
//!
//! All mutating operations serialize through a single write lock so the
//! invariant-preserving batches never interleave: the host and ASID
//! indices, the computed schema and the change feed stay consistent with
//! the agent records. Reads go straight to store snapshots.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use telegrid_bus::{agent_subject, AgentMessage, MessageBus};
use telegrid_state::{
    Agent, AgentDataInfo, AgentEvent, AgentStore, Clock, ComputedSchema, HostnamePair,
    ProcessCreated, ProcessRecord, ProcessTerminated, StoreError, StoreResult, SystemClock,
    TableInfo, Upid,
};

use crate::config::ManagerConfig;
use crate::cursor::CursorEngine;
use crate::error::{ManagerError, ManagerResult};
use crate::identity::{resolve_registration, RegistrationDecision};

/// Everything an agent may report in one streaming update.
#[derive(Debug, Clone, Default)]
pub struct UpdateInfo {
    /// Full replacement set of the agent's tables. Only applied when
    /// `does_update_schema` is set.
    pub schema: Vec<TableInfo>,
    pub does_update_schema: bool,
    pub process_created: Vec<ProcessCreated>,
    pub process_terminated: Vec<ProcessTerminated>,
    /// Bloom-filter metadata summary, overwritten when present.
    pub data: Option<AgentDataInfo>,
}

/// A streaming update addressed to one agent.
#[derive(Debug, Clone)]
pub struct AgentUpdate {
    pub agent_id: Uuid,
    pub update: UpdateInfo,
}

/// The authoritative registry and update-propagation engine for the
/// agent fleet.
pub struct Manager {
    store: AgentStore,
    bus: Arc<dyn MessageBus>,
    clock: Arc<dyn Clock>,
    config: ManagerConfig,
    write_lock: Mutex<()>,
    cursors: CursorEngine,
}

impl Manager {
    /// Create a manager on the system clock.
    pub fn new(store: AgentStore, bus: Arc<dyn MessageBus>, config: ManagerConfig) -> Self {
        Self::with_clock(store, bus, config, Arc::new(SystemClock))
    }

    /// Create a manager with an injected clock (tests pin time).
    pub fn with_clock(
        store: AgentStore,
        bus: Arc<dyn MessageBus>,
        config: ManagerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cursors = CursorEngine::new(store.clone());
        Self {
            store,
            bus,
            clock,
            config,
            write_lock: Mutex::new(()),
            cursors,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &AgentStore {
        &self.store
    }

    pub(crate) fn now_ns(&self) -> u64 {
        self.clock.now_ns()
    }

    // ── Registration & lifecycle ───────────────────────────────────

    /// Register an agent, resolving its identity against the current
    /// occupant of its host slot. Returns the committed ASID.
    ///
    /// A re-registration (same UUID on the same host identity, or a known
    /// UUID arriving from a new host) preserves the ASID and
    /// `create_time_ns` and refreshes the heartbeat; declared timestamps
    /// are always ignored. A different UUID holding the host slot is
    /// evicted first.
    pub fn register_agent(&self, declared: &Agent) -> ManagerResult<u32> {
        let _guard = self.write_lock.lock().expect("write lock");
        let now = self.clock.now_ns();

        let pair = HostnamePair::for_agent(declared);
        let occupant = self.store.agent_id_for_host_pair(&pair)?;
        if let RegistrationDecision::Evict { prior } =
            resolve_registration(occupant, declared.id)
        {
            info!(
                evicted = %prior,
                claimant = %declared.id,
                host = %pair.table_key(),
                "host identity conflict, evicting prior agent"
            );
            self.run_write(|| self.store.delete_agent(prior, now))?;
        }

        if let Some(existing) = self.store.get_agent(declared.id)? {
            let mut updated = declared.clone();
            updated.asid = existing.asid;
            updated.create_time_ns = existing.create_time_ns;
            updated.last_heartbeat_ns = now;
            self.run_write(|| self.store.update_agent(&updated, now))?;
            debug!(agent = %declared.id, asid = existing.asid, "agent re-registered");
            return Ok(existing.asid);
        }

        let mut fresh = declared.clone();
        fresh.asid = 0;
        fresh.create_time_ns = now;
        fresh.last_heartbeat_ns = now;
        let asid = self.run_write(|| self.store.create_agent(&fresh, now))?;
        info!(agent = %fresh.id, asid, host = %pair.table_key(), "agent registered");
        Ok(asid)
    }

    /// Refresh an agent's heartbeat. Fails with `AgentUnknown` for
    /// unregistered agents; callers must not treat that as an implicit
    /// registration. Heartbeats never reach the change feed.
    pub fn update_heartbeat(&self, agent_id: Uuid) -> ManagerResult<()> {
        let now = self.clock.now_ns();
        match self.run_write(|| self.store.update_heartbeat(agent_id, now)) {
            Err(ManagerError::Store(StoreError::NotFound(_))) => {
                Err(ManagerError::AgentUnknown(agent_id.to_string()))
            }
            other => other,
        }
    }

    /// Delete an agent and everything derived from it. Idempotent.
    pub fn delete_agent(&self, agent_id: Uuid) -> ManagerResult<()> {
        let _guard = self.write_lock.lock().expect("write lock");
        let now = self.clock.now_ns();
        self.run_write(|| self.store.delete_agent(agent_id, now))?;
        Ok(())
    }

    /// Get one agent record.
    pub fn get_agent(&self, agent_id: Uuid) -> ManagerResult<Option<Agent>> {
        Ok(self.store.get_agent(agent_id)?)
    }

    /// Every agent record, ASID ascending.
    pub fn get_active_agents(&self) -> ManagerResult<Vec<Agent>> {
        Ok(self.store.get_agents()?)
    }

    /// The materialized cluster schema.
    pub fn get_computed_schema(&self) -> ManagerResult<ComputedSchema> {
        Ok(self.store.get_computed_schema()?)
    }

    // ── Update ingest ──────────────────────────────────────────────

    /// Apply one streaming update from an agent: schema replacement,
    /// process lifecycle records and the data-info blob.
    ///
    /// Updates for agents that are no longer registered are dropped
    /// whole; an update racing a delete must not recreate derived state
    /// (process records key on the ASID and would become unreachable).
    pub fn apply_agent_update(&self, update: &AgentUpdate) -> ManagerResult<()> {
        let _guard = self.write_lock.lock().expect("write lock");
        let now = self.clock.now_ns();

        let Some(agent) = self.store.get_agent(update.agent_id)? else {
            debug!(agent = %update.agent_id, "dropping update for unregistered agent");
            return Ok(());
        };
        let info = &update.update;

        if info.does_update_schema {
            let changed = self.run_write(|| self.store.update_schemas(agent.id, &info.schema))?;
            if changed {
                debug!(agent = %agent.id, tables = info.schema.len(), "cluster schema updated");
            }
        }

        if !info.process_created.is_empty() {
            let records: Vec<ProcessRecord> = info
                .process_created
                .iter()
                .map(|created| ProcessRecord {
                    upid: Upid::from_parts(agent.asid, created.pid, created.start_time_ns),
                    cmdline: created.cmdline.clone(),
                    start_time_ns: created.start_time_ns,
                    stop_time_ns: None,
                    written_at_ns: now,
                })
                .collect();
            self.run_write(|| self.store.update_processes(&records))?;
        }

        if !info.process_terminated.is_empty() {
            let stops: Vec<(Upid, u64)> = info
                .process_terminated
                .iter()
                .map(|terminated| {
                    (
                        Upid::from_parts(agent.asid, terminated.pid, terminated.start_time_ns),
                        terminated.stop_time_ns,
                    )
                })
                .collect();
            self.run_write(|| self.store.mark_processes_stopped(&stops, now))?;
        }

        if let Some(data) = &info.data {
            self.run_write(|| self.store.update_agent_data_info(agent.id, data, now))?;
        }
        Ok(())
    }

    // ── Cursors ────────────────────────────────────────────────────

    /// Allocate a change-feed cursor positioned at the current head.
    pub fn new_agent_update_cursor(&self) -> ManagerResult<Uuid> {
        Ok(self.cursors.create(self.clock.now_ns())?)
    }

    /// Drain the changes committed since the cursor's last poll. The first
    /// poll delivers a snapshot of the live fleet plus the cluster schema;
    /// later polls deliver feed entries and the schema only when it
    /// changed since the cursor last saw it.
    pub fn get_agent_updates(
        &self,
        cursor_id: Uuid,
    ) -> ManagerResult<(Vec<AgentEvent>, Option<ComputedSchema>)> {
        self.cursors.poll(cursor_id, self.clock.now_ns())
    }

    /// Drop a cursor. Subsequent polls fail with `CursorUnknown`.
    pub fn delete_agent_update_cursor(&self, cursor_id: Uuid) -> ManagerResult<()> {
        self.cursors.delete(cursor_id)
    }

    // ── Command publishing ─────────────────────────────────────────

    /// Push a configuration-change request to the agent running in the
    /// given pod. Fire-and-forget; the apply is observed via subsequent
    /// agent updates.
    pub fn update_config(
        &self,
        namespace: &str,
        pod_name: &str,
        key: &str,
        value: &str,
    ) -> ManagerResult<()> {
        let agents = self.store.get_agents()?;
        let target = agents
            .iter()
            .find(|a| a.namespace == namespace && a.pod_name == pod_name)
            .ok_or_else(|| {
                ManagerError::AgentUnknown(format!("pod {namespace}/{pod_name}"))
            })?;

        let payload = AgentMessage::config_update(key, value).to_bytes()?;
        self.bus.publish(&agent_subject(target.id), &payload)?;
        info!(agent = %target.id, %key, %value, "config update published");
        Ok(())
    }

    // ── Write plumbing ─────────────────────────────────────────────

    /// Run a store mutation under this operation's deadline, retrying
    /// transient failures with exponential backoff. Batches are single
    /// transactions, so an expired deadline means nothing was written.
    fn run_write<T>(&self, mut op: impl FnMut() -> StoreResult<T>) -> ManagerResult<T> {
        let deadline = Instant::now() + self.config.store_write_timeout;
        let mut backoff = Duration::from_millis(5);
        loop {
            if Instant::now() >= deadline {
                return Err(ManagerError::Cancelled);
            }
            match op() {
                Ok(value) => return Ok(value),
                Err(StoreError::Transient(reason)) => {
                    if Instant::now() + backoff >= deadline {
                        return Err(ManagerError::Transient(reason));
                    }
                    warn!(%reason, "transient store error, retrying");
                    std::thread::sleep(backoff);
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use telegrid_bus::InProcessBus;
    use telegrid_state::{
        BloomFilter, ColumnInfo, ColumnType, FixedClock, MetadataField,
    };

    pub(crate) const NS_PER_SEC: u64 = 1_000_000_000;
    pub(crate) const CLOCK_NOW_NS: u64 = 70 * NS_PER_SEC;

    pub(crate) const EXISTING_AGENT_UUID: &str = "7ba7b810-9dad-11d1-80b4-00c04fd430c8";
    pub(crate) const UNHEALTHY_AGENT_UUID: &str = "8ba7b810-9dad-11d1-80b4-00c04fd430c8";
    pub(crate) const UNHEALTHY_KELVIN_UUID: &str = "5ba7b810-9dad-11d1-80b4-00c04fd430c8";
    pub(crate) const NEW_AGENT_UUID: &str = "6ba7b810-9dad-11d1-80b4-00c04fd430c8";

    pub(crate) struct TestEnv {
        pub store: AgentStore,
        pub manager: Manager,
        pub bus: Arc<InProcessBus>,
        pub clock: Arc<FixedClock>,
    }

    pub(crate) fn table_info(name: &str) -> TableInfo {
        TableInfo {
            name: name.to_string(),
            columns: vec![ColumnInfo {
                name: "time_".to_string(),
                column_type: ColumnType::Time,
            }],
            tabletization_key: None,
        }
    }

    pub(crate) fn data_info() -> AgentDataInfo {
        AgentDataInfo {
            metadata_fields: vec![MetadataField::ContainerId, MetadataField::PodName],
            bloom_filter: BloomFilter {
                data: vec![0x31, 0x32, 0x33, 0x34],
                num_hashes: 4,
            },
        }
    }

    fn seed_agent(
        store: &AgentStore,
        uuid: &str,
        asid: u32,
        hostname: &str,
        host_ip: &str,
        collects_data: bool,
        last_heartbeat_ns: u64,
    ) -> Agent {
        let mut agent = Agent {
            id: Uuid::parse_str(uuid).unwrap(),
            asid,
            hostname: hostname.to_string(),
            host_ip: host_ip.to_string(),
            namespace: String::new(),
            pod_name: String::new(),
            collects_data,
            create_time_ns: 0,
            last_heartbeat_ns,
        };
        if uuid == EXISTING_AGENT_UUID {
            agent.namespace = "pl".to_string();
            agent.pod_name = "pem-existing".to_string();
        }
        store.create_agent(&agent, 0).unwrap();
        store
            .update_schemas(agent.id, &[table_info("a_table")])
            .unwrap();
        agent
    }

    fn build_env(store: AgentStore) -> TestEnv {
        let bus = Arc::new(InProcessBus::new());
        let clock = Arc::new(FixedClock::at(CLOCK_NOW_NS));
        let manager = Manager::with_clock(
            store.clone(),
            bus.clone(),
            ManagerConfig::default(),
            clock.clone(),
        );
        TestEnv {
            store,
            manager,
            bus,
            clock,
        }
    }

    pub(crate) fn setup_empty() -> TestEnv {
        build_env(AgentStore::open_in_memory().unwrap())
    }

    /// Three agents, matching heartbeat states: one healthy collector with
    /// a pod identity, one stale collector, one stale kelvin. All three
    /// announce `a_table`.
    pub(crate) fn setup_seeded() -> TestEnv {
        let store = AgentStore::open_in_memory().unwrap();
        seed_agent(
            &store,
            EXISTING_AGENT_UUID,
            123,
            "testhost",
            "127.0.0.1",
            true,
            CLOCK_NOW_NS,
        );
        seed_agent(
            &store,
            UNHEALTHY_AGENT_UUID,
            456,
            "anotherhost",
            "127.0.0.2",
            true,
            0,
        );
        seed_agent(
            &store,
            UNHEALTHY_KELVIN_UUID,
            789,
            "abcd",
            "127.0.0.3",
            false,
            0,
        );
        build_env(store)
    }

    fn declared(uuid: &str, hostname: &str, host_ip: &str, collects_data: bool) -> Agent {
        Agent {
            id: Uuid::parse_str(uuid).unwrap(),
            asid: 0,
            hostname: hostname.to_string(),
            host_ip: host_ip.to_string(),
            namespace: String::new(),
            pod_name: String::new(),
            collects_data,
            // Declared timestamps must be ignored by registration.
            create_time_ns: 4,
            last_heartbeat_ns: 1,
        }
    }

    // ── Registration ───────────────────────────────────────────────

    #[test]
    fn register_new_data_collector() {
        let env = setup_empty();
        let agent = declared(NEW_AGENT_UUID, "localhost", "127.0.0.4", true);

        let asid = env.manager.register_agent(&agent).unwrap();
        assert_eq!(asid, 1);

        let stored = env.manager.get_agent(agent.id).unwrap().unwrap();
        assert_eq!(stored.last_heartbeat_ns, CLOCK_NOW_NS);
        assert_eq!(stored.create_time_ns, CLOCK_NOW_NS);
        assert_eq!(stored.hostname, "localhost");
        assert_eq!(stored.asid, 1);

        assert_eq!(
            env.store
                .agent_id_for_host_pair(&HostnamePair::new("", "127.0.0.4"))
                .unwrap(),
            Some(agent.id)
        );
    }

    #[test]
    fn register_kelvin_keys_on_full_host_pair() {
        let env = setup_empty();
        let agent = declared(NEW_AGENT_UUID, "test", "127.0.0.3", false);

        let asid = env.manager.register_agent(&agent).unwrap();
        assert_eq!(asid, 1);

        assert_eq!(
            env.store
                .agent_id_for_host_pair(&HostnamePair::new("test", "127.0.0.3"))
                .unwrap(),
            Some(agent.id)
        );
        // The collector-keyed slot stays free.
        assert_eq!(
            env.store
                .agent_id_for_host_pair(&HostnamePair::new("", "127.0.0.3"))
                .unwrap(),
            None
        );
    }

    #[test]
    fn re_registration_preserves_identity() {
        let env = setup_seeded();
        let agent = declared(EXISTING_AGENT_UUID, "localhost", "127.0.0.1", true);

        let asid = env.manager.register_agent(&agent).unwrap();
        assert_eq!(asid, 123);

        let stored = env.manager.get_agent(agent.id).unwrap().unwrap();
        assert_eq!(stored.asid, 123);
        assert_eq!(stored.create_time_ns, 0);
        // Declared timestamps ignored; the heartbeat comes from the clock.
        assert_eq!(stored.last_heartbeat_ns, CLOCK_NOW_NS);
    }

    #[test]
    fn host_collision_evicts_prior_agent() {
        let env = setup_seeded();
        let existing = Uuid::parse_str(EXISTING_AGENT_UUID).unwrap();
        let claimant = declared(NEW_AGENT_UUID, "testhost", "127.0.0.1", true);

        env.manager.register_agent(&claimant).unwrap();

        assert!(env.manager.get_agent(existing).unwrap().is_none());
        assert_eq!(
            env.store
                .agent_id_for_host_pair(&HostnamePair::new("", "127.0.0.1"))
                .unwrap(),
            Some(claimant.id)
        );
    }

    // ── Heartbeats ─────────────────────────────────────────────────

    #[test]
    fn heartbeat_refreshes_from_clock() {
        let env = setup_seeded();
        let id = Uuid::parse_str(EXISTING_AGENT_UUID).unwrap();

        env.clock.advance(5 * NS_PER_SEC);
        env.manager.update_heartbeat(id).unwrap();

        let stored = env.manager.get_agent(id).unwrap().unwrap();
        assert_eq!(stored.last_heartbeat_ns, CLOCK_NOW_NS + 5 * NS_PER_SEC);
        assert_eq!(stored.create_time_ns, 0);
    }

    #[test]
    fn heartbeat_for_unknown_agent_fails() {
        let env = setup_seeded();
        let unknown = Uuid::parse_str(NEW_AGENT_UUID).unwrap();
        assert!(matches!(
            env.manager.update_heartbeat(unknown),
            Err(ManagerError::AgentUnknown(_))
        ));
    }

    // ── Deletion ───────────────────────────────────────────────────

    #[test]
    fn delete_and_reindex() {
        let env = setup_seeded();
        let unhealthy = Uuid::parse_str(UNHEALTHY_AGENT_UUID).unwrap();
        let kelvin = Uuid::parse_str(UNHEALTHY_KELVIN_UUID).unwrap();

        env.manager.delete_agent(unhealthy).unwrap();
        env.manager.delete_agent(kelvin).unwrap();

        let agents = env.manager.get_active_agents().unwrap();
        assert_eq!(agents.len(), 1);
        assert!(env.manager.get_agent(unhealthy).unwrap().is_none());
        assert_eq!(
            env.store
                .agent_id_for_host_pair(&HostnamePair::new("", "127.0.0.2"))
                .unwrap(),
            None
        );

        // Idempotent.
        env.manager.delete_agent(unhealthy).unwrap();
    }

    #[test]
    fn get_active_agents_ordered_by_asid() {
        let env = setup_seeded();
        let agents = env.manager.get_active_agents().unwrap();
        assert_eq!(
            agents.iter().map(|a| a.asid).collect::<Vec<_>>(),
            vec![123, 456, 789]
        );
        assert_eq!(agents[0].id, Uuid::parse_str(EXISTING_AGENT_UUID).unwrap());
        assert_eq!(agents[0].pod_name, "pem-existing");
    }

    // ── Update ingest ──────────────────────────────────────────────

    #[test]
    fn apply_update_persists_processes_and_data_info() {
        let env = setup_seeded();
        let id = Uuid::parse_str(EXISTING_AGENT_UUID).unwrap();

        let update = AgentUpdate {
            agent_id: id,
            update: UpdateInfo {
                process_created: vec![
                    ProcessCreated {
                        pid: 567,
                        start_time_ns: 89101,
                        cmdline: "/usr/bin/server".to_string(),
                    },
                    ProcessCreated {
                        pid: 567,
                        start_time_ns: 468,
                        cmdline: "/usr/bin/worker".to_string(),
                    },
                ],
                data: Some(data_info()),
                ..Default::default()
            },
        };
        env.manager.apply_agent_update(&update).unwrap();

        let upid1 = Upid::from_parts(123, 567, 89101);
        let upid2 = Upid::from_parts(123, 567, 468);
        let records = env.store.get_processes(&[upid1, upid2]).unwrap();
        assert_eq!(records[0].as_ref().unwrap().cmdline, "/usr/bin/server");
        assert_eq!(records[1].as_ref().unwrap().cmdline, "/usr/bin/worker");

        let infos = env.store.get_agents_data_info().unwrap();
        assert_eq!(infos.get(&id), Some(&data_info()));
    }

    #[test]
    fn apply_update_for_unknown_agent_is_dropped_whole() {
        let env = setup_seeded();
        let unknown = Uuid::parse_str(NEW_AGENT_UUID).unwrap();

        let update = AgentUpdate {
            agent_id: unknown,
            update: UpdateInfo {
                schema: vec![table_info("b_table")],
                does_update_schema: true,
                process_created: vec![ProcessCreated {
                    pid: 1,
                    start_time_ns: 2,
                    cmdline: "/bin/x".to_string(),
                }],
                data: Some(data_info()),
                ..Default::default()
            },
        };
        env.manager.apply_agent_update(&update).unwrap();

        // Nothing may leak into the store for an unregistered agent.
        assert!(!env.store.get_agents_data_info().unwrap().contains_key(&unknown));
        assert!(!env
            .store
            .get_computed_schema()
            .unwrap()
            .tables
            .contains_key("b_table"));
    }

    #[test]
    fn process_termination_sets_stop_and_is_idempotent() {
        let env = setup_seeded();
        let id = Uuid::parse_str(EXISTING_AGENT_UUID).unwrap();

        env.manager
            .apply_agent_update(&AgentUpdate {
                agent_id: id,
                update: UpdateInfo {
                    process_created: vec![ProcessCreated {
                        pid: 567,
                        start_time_ns: 89101,
                        cmdline: "/usr/bin/server".to_string(),
                    }],
                    ..Default::default()
                },
            })
            .unwrap();

        let terminate = AgentUpdate {
            agent_id: id,
            update: UpdateInfo {
                process_terminated: vec![ProcessTerminated {
                    pid: 567,
                    start_time_ns: 89101,
                    stop_time_ns: 6,
                }],
                ..Default::default()
            },
        };
        env.manager.apply_agent_update(&terminate).unwrap();
        env.manager.apply_agent_update(&terminate).unwrap();

        let upid = Upid::from_parts(123, 567, 89101);
        let records = env.store.get_processes(&[upid]).unwrap();
        assert_eq!(records[0].as_ref().unwrap().stop_time_ns, Some(6));
    }

    #[test]
    fn schema_update_gated_on_flag() {
        let env = setup_seeded();
        let id = Uuid::parse_str(EXISTING_AGENT_UUID).unwrap();

        env.manager
            .apply_agent_update(&AgentUpdate {
                agent_id: id,
                update: UpdateInfo {
                    schema: vec![table_info("b_table")],
                    does_update_schema: false,
                    ..Default::default()
                },
            })
            .unwrap();
        assert!(!env
            .store
            .get_computed_schema()
            .unwrap()
            .tables
            .contains_key("b_table"));

        env.manager
            .apply_agent_update(&AgentUpdate {
                agent_id: id,
                update: UpdateInfo {
                    schema: vec![table_info("b_table")],
                    does_update_schema: true,
                    ..Default::default()
                },
            })
            .unwrap();

        let schema = env.store.get_computed_schema().unwrap();
        assert!(schema.tables.contains_key("b_table"));
        // Replacement semantics: this agent no longer owns a_table.
        assert!(!schema.owners_of("a_table").unwrap().contains(&id));
    }

    // ── Config push ────────────────────────────────────────────────

    #[test]
    fn update_config_publishes_to_agent_subject() {
        let env = setup_seeded();
        let id = Uuid::parse_str(EXISTING_AGENT_UUID).unwrap();
        let mut rx = env.bus.subscribe(&agent_subject(id));

        env.manager
            .update_config("pl", "pem-existing", "gprof", "true")
            .unwrap();

        let payload = rx.try_recv().unwrap();
        let AgentMessage::ConfigUpdate(req) = AgentMessage::from_bytes(&payload).unwrap();
        assert_eq!(req.key, "gprof");
        assert_eq!(req.value, "true");
    }

    #[test]
    fn update_config_for_unknown_pod_fails() {
        let env = setup_seeded();
        assert!(matches!(
            env.manager.update_config("pl", "no-such-pod", "gprof", "true"),
            Err(ManagerError::AgentUnknown(_))
        ));
    }
}
