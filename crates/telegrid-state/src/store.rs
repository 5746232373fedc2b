//! AgentStore — redb-backed persistence for the agent metadata plane.
//!
//! Provides typed operations over agents, the host-identity and ASID
//! indices, per-agent schemas, process records, data-info blobs, the
//! change feed and cursors. All values are JSON-serialized into redb's
//! `&[u8]` value columns. The store supports both on-disk and in-memory
//! backends (the latter for testing).
//!
//! Every mutating operation runs in a single write transaction, so the
//! indices, the computed schema and the change feed always agree with the
//! agent records after a crash.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::asid;
use crate::error::{StoreError, StoreResult};
use crate::schema::ComputedSchema;
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Read a `u64` counter out of the meta table, defaulting to zero.
macro_rules! meta_u64 {
    ($meta:expr, $key:expr) => {{
        match $meta.get($key).map_err(map_err!(Read))? {
            Some(guard) => {
                serde_json::from_slice::<u64>(guard.value()).map_err(map_err!(Corrupt))?
            }
            None => 0u64,
        }
    }};
}

/// Write a JSON value into the meta table.
macro_rules! put_meta {
    ($meta:expr, $key:expr, $value:expr) => {{
        let bytes = serde_json::to_vec($value).map_err(map_err!(Serialize))?;
        $meta
            .insert($key, bytes.as_slice())
            .map_err(map_err!(Write))?;
    }};
}

/// Append a change-feed entry and advance the head.
macro_rules! append_feed {
    ($feed:expr, $meta:expr, $event:expr, $time_ns:expr) => {{
        let seq = meta_u64!($meta, META_FEED_HEAD) + 1;
        let entry = FeedEntry {
            seq,
            time_ns: $time_ns,
            event: $event,
        };
        let bytes = serde_json::to_vec(&entry).map_err(map_err!(Serialize))?;
        $feed.insert(seq, bytes.as_slice()).map_err(map_err!(Write))?;
        put_meta!($meta, META_FEED_HEAD, &seq);
    }};
}

const STORE_VERSION: u64 = 1;

const META_VERSION: &str = "version";
const META_FEED_HEAD: &str = "feed_head";
const META_SCHEMA_EPOCH: &str = "schema_epoch";
const META_COMPUTED_SCHEMA: &str = "computed_schema";

/// Consistent snapshot handed to a cursor on its first poll.
#[derive(Debug, Clone)]
pub struct CursorSnapshot {
    /// Live agents, UUID ascending.
    pub agents: Vec<Agent>,
    pub schema: ComputedSchema,
    pub schema_epoch: u64,
    pub feed_head: u64,
}

/// Thread-safe agent metadata store backed by redb.
#[derive(Clone)]
pub struct AgentStore {
    db: Arc<Database>,
}

impl AgentStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "agent store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory agent store opened");
        Ok(store)
    }

    /// Create all tables if absent and check the layout version.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            // Opening a table in a write transaction creates it if absent.
            txn.open_table(AGENTS).map_err(map_err!(Table))?;
            txn.open_table(HOST_INDEX).map_err(map_err!(Table))?;
            txn.open_table(ASID_INDEX).map_err(map_err!(Table))?;
            txn.open_table(SCHEMAS).map_err(map_err!(Table))?;
            txn.open_table(PROCESSES).map_err(map_err!(Table))?;
            txn.open_table(DATA_INFO).map_err(map_err!(Table))?;
            txn.open_table(CURSORS).map_err(map_err!(Table))?;
            txn.open_table(FEED).map_err(map_err!(Table))?;
            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
            let version: Option<u64> = match meta.get(META_VERSION).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Corrupt))?)
                }
                None => None,
            };
            match version {
                Some(found) if found != STORE_VERSION => {
                    return Err(StoreError::Version {
                        found,
                        expected: STORE_VERSION,
                    });
                }
                Some(_) => {}
                None => put_meta!(meta, META_VERSION, &STORE_VERSION),
            }
        }
        txn.commit().map_err(map_err!(Transient))?;
        Ok(())
    }

    // ── Agents ─────────────────────────────────────────────────────

    /// Create an agent, its host-index and ASID-index entries, and the
    /// `AgentCreated` feed entry in one transaction. An `asid` of zero asks
    /// the store to allocate the smallest unused one; a nonzero `asid` is
    /// honored as-is (seeding and tests). Returns the committed ASID.
    pub fn create_agent(&self, declared: &Agent, now_ns: u64) -> StoreResult<u32> {
        let mut agent = declared.clone();
        let key = agent.id.to_string();

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut agents = txn.open_table(AGENTS).map_err(map_err!(Table))?;
            let mut hosts = txn.open_table(HOST_INDEX).map_err(map_err!(Table))?;
            let mut asids = txn.open_table(ASID_INDEX).map_err(map_err!(Table))?;
            let mut feed = txn.open_table(FEED).map_err(map_err!(Table))?;
            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;

            if agents.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StoreError::Write(format!("agent {key} already exists")));
            }

            if agent.asid == 0 {
                let mut taken = Vec::new();
                for entry in asids.iter().map_err(map_err!(Read))? {
                    let (k, _) = entry.map_err(map_err!(Read))?;
                    taken.push(k.value());
                }
                agent.asid = asid::first_free(taken);
            }

            let bytes = serde_json::to_vec(&agent).map_err(map_err!(Serialize))?;
            agents
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
            hosts
                .insert(
                    HostnamePair::for_agent(&agent).table_key().as_str(),
                    key.as_str(),
                )
                .map_err(map_err!(Write))?;
            asids
                .insert(agent.asid, key.as_str())
                .map_err(map_err!(Write))?;
            append_feed!(feed, meta, AgentEvent::Created(agent.clone()), now_ns);
        }
        txn.commit().map_err(map_err!(Transient))?;
        debug!(agent = %key, asid = agent.asid, "agent created");
        Ok(agent.asid)
    }

    /// Get an agent by UUID.
    pub fn get_agent(&self, id: Uuid) -> StoreResult<Option<Agent>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(AGENTS).map_err(map_err!(Table))?;
        match table
            .get(id.to_string().as_str())
            .map_err(map_err!(Read))?
        {
            Some(guard) => {
                let agent: Agent =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Corrupt))?;
                Ok(Some(agent))
            }
            None => Ok(None),
        }
    }

    /// Overwrite an agent record, rewriting the host index when its host
    /// identity changed, and append an `AgentUpdated` feed entry. The ASID
    /// must be unchanged. Fails with `NotFound` for unknown agents.
    pub fn update_agent(&self, agent: &Agent, now_ns: u64) -> StoreResult<()> {
        let key = agent.id.to_string();

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut agents = txn.open_table(AGENTS).map_err(map_err!(Table))?;
            let mut hosts = txn.open_table(HOST_INDEX).map_err(map_err!(Table))?;
            let mut feed = txn.open_table(FEED).map_err(map_err!(Table))?;
            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;

            let prior: Agent = match agents.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Corrupt))?
                }
                None => return Err(StoreError::NotFound(format!("agent {key}"))),
            };

            let bytes = serde_json::to_vec(agent).map_err(map_err!(Serialize))?;
            agents
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;

            let old_pair = HostnamePair::for_agent(&prior);
            let new_pair = HostnamePair::for_agent(agent);
            if old_pair != new_pair {
                let old_key = old_pair.table_key();
                let owned = hosts
                    .get(old_key.as_str())
                    .map_err(map_err!(Read))?
                    .map(|g| g.value() == key)
                    .unwrap_or(false);
                if owned {
                    hosts.remove(old_key.as_str()).map_err(map_err!(Write))?;
                }
                hosts
                    .insert(new_pair.table_key().as_str(), key.as_str())
                    .map_err(map_err!(Write))?;
            }
            append_feed!(feed, meta, AgentEvent::Updated(agent.clone()), now_ns);
        }
        txn.commit().map_err(map_err!(Transient))?;
        Ok(())
    }

    /// Overwrite `last_heartbeat_ns` only. No feed entry is written;
    /// heartbeats are high-frequency and liveness is derived from the
    /// field. Fails with `NotFound` for unknown agents.
    pub fn update_heartbeat(&self, id: Uuid, now_ns: u64) -> StoreResult<()> {
        let key = id.to_string();

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut agents = txn.open_table(AGENTS).map_err(map_err!(Table))?;
            let mut agent: Agent = match agents.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Corrupt))?
                }
                None => return Err(StoreError::NotFound(format!("agent {key}"))),
            };
            agent.last_heartbeat_ns = now_ns;
            let bytes = serde_json::to_vec(&agent).map_err(map_err!(Serialize))?;
            agents
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transient))?;
        Ok(())
    }

    /// Delete an agent together with its index entries, data-info blob and
    /// schema entries, recompute the cluster schema, and append an
    /// `AgentDeleted` feed entry — all in one transaction. Idempotent;
    /// returns whether the agent existed.
    pub fn delete_agent(&self, id: Uuid, now_ns: u64) -> StoreResult<bool> {
        let key = id.to_string();

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut agents = txn.open_table(AGENTS).map_err(map_err!(Table))?;
            let mut hosts = txn.open_table(HOST_INDEX).map_err(map_err!(Table))?;
            let mut asids = txn.open_table(ASID_INDEX).map_err(map_err!(Table))?;
            let mut schemas = txn.open_table(SCHEMAS).map_err(map_err!(Table))?;
            let mut data_info = txn.open_table(DATA_INFO).map_err(map_err!(Table))?;
            let mut feed = txn.open_table(FEED).map_err(map_err!(Table))?;
            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;

            let agent: Option<Agent> = match agents.remove(key.as_str()).map_err(map_err!(Write))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Corrupt))?)
                }
                None => None,
            };

            existed = match agent {
                None => false,
                Some(agent) => {
                    let pair_key = HostnamePair::for_agent(&agent).table_key();
                    let owned = hosts
                        .get(pair_key.as_str())
                        .map_err(map_err!(Read))?
                        .map(|g| g.value() == key)
                        .unwrap_or(false);
                    if owned {
                        hosts.remove(pair_key.as_str()).map_err(map_err!(Write))?;
                    }
                    asids.remove(agent.asid).map_err(map_err!(Write))?;
                    data_info.remove(key.as_str()).map_err(map_err!(Write))?;

                    let prefix = format!("{key}/");
                    let mut schema_keys = Vec::new();
                    for entry in schemas.range(prefix.as_str()..).map_err(map_err!(Read))? {
                        let (k, _) = entry.map_err(map_err!(Read))?;
                        let k = k.value();
                        if !k.starts_with(&prefix) {
                            break;
                        }
                        schema_keys.push(k.to_string());
                    }
                    for k in &schema_keys {
                        schemas.remove(k.as_str()).map_err(map_err!(Write))?;
                    }

                    let mut computed: ComputedSchema =
                        match meta.get(META_COMPUTED_SCHEMA).map_err(map_err!(Read))? {
                            Some(guard) => serde_json::from_slice(guard.value())
                                .map_err(map_err!(Corrupt))?,
                            None => ComputedSchema::default(),
                        };
                    if computed.remove_agent(id) {
                        let epoch = meta_u64!(meta, META_SCHEMA_EPOCH) + 1;
                        put_meta!(meta, META_SCHEMA_EPOCH, &epoch);
                        put_meta!(meta, META_COMPUTED_SCHEMA, &computed);
                    }

                    append_feed!(feed, meta, AgentEvent::Deleted { agent_id: id }, now_ns);
                    true
                }
            };
        }
        txn.commit().map_err(map_err!(Transient))?;
        if existed {
            debug!(agent = %key, "agent deleted");
        }
        Ok(existed)
    }

    /// All agents, ASID ascending. Corrupt records are skipped.
    pub fn get_agents(&self) -> StoreResult<Vec<Agent>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(AGENTS).map_err(map_err!(Table))?;
        let mut agents = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            match serde_json::from_slice::<Agent>(value.value()) {
                Ok(agent) => agents.push(agent),
                Err(e) => warn!(agent = key.value(), error = %e, "skipping corrupt agent record"),
            }
        }
        agents.sort_by_key(|a| a.asid);
        Ok(agents)
    }

    /// Resolve a host identity to its agent UUID.
    pub fn agent_id_for_host_pair(&self, pair: &HostnamePair) -> StoreResult<Option<Uuid>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HOST_INDEX).map_err(map_err!(Table))?;
        match table
            .get(pair.table_key().as_str())
            .map_err(map_err!(Read))?
        {
            Some(guard) => {
                let id = Uuid::parse_str(guard.value()).map_err(map_err!(Corrupt))?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Resolve several host identities in one snapshot.
    pub fn agents_for_host_pairs(
        &self,
        pairs: &[HostnamePair],
    ) -> StoreResult<Vec<Option<Uuid>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HOST_INDEX).map_err(map_err!(Table))?;
        let mut out = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let id = match table
                .get(pair.table_key().as_str())
                .map_err(map_err!(Read))?
            {
                Some(guard) => Some(Uuid::parse_str(guard.value()).map_err(map_err!(Corrupt))?),
                None => None,
            };
            out.push(id);
        }
        Ok(out)
    }

    /// The ASID committed for an agent, if registered.
    pub fn asid_for_agent(&self, id: Uuid) -> StoreResult<Option<u32>> {
        Ok(self.get_agent(id)?.map(|a| a.asid))
    }

    // ── Schemas ────────────────────────────────────────────────────

    /// Replace an agent's schema entries with `tables` and incrementally
    /// recompute the cluster schema, bumping the schema epoch when the
    /// cluster view changed. Returns whether it changed.
    pub fn update_schemas(&self, agent_id: Uuid, tables: &[TableInfo]) -> StoreResult<bool> {
        let prefix = format!("{agent_id}/");

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let changed;
        {
            let mut schemas = txn.open_table(SCHEMAS).map_err(map_err!(Table))?;
            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;

            let mut old_keys = Vec::new();
            for entry in schemas.range(prefix.as_str()..).map_err(map_err!(Read))? {
                let (k, _) = entry.map_err(map_err!(Read))?;
                let k = k.value();
                if !k.starts_with(&prefix) {
                    break;
                }
                old_keys.push(k.to_string());
            }

            let mut computed: ComputedSchema =
                match meta.get(META_COMPUTED_SCHEMA).map_err(map_err!(Read))? {
                    Some(guard) => {
                        serde_json::from_slice(guard.value()).map_err(map_err!(Corrupt))?
                    }
                    None => ComputedSchema::default(),
                };

            let new_names: BTreeSet<&str> = tables.iter().map(|t| t.name.as_str()).collect();
            let mut schema_changed = false;

            for old_key in &old_keys {
                let name = &old_key[prefix.len()..];
                if !new_names.contains(name) {
                    schemas.remove(old_key.as_str()).map_err(map_err!(Write))?;
                    schema_changed |= computed.remove_owner(name, agent_id);
                }
            }
            for info in tables {
                let entry_key = format!("{prefix}{}", info.name);
                let bytes = serde_json::to_vec(info).map_err(map_err!(Serialize))?;
                schemas
                    .insert(entry_key.as_str(), bytes.as_slice())
                    .map_err(map_err!(Write))?;
                schema_changed |= computed.add_owner(agent_id, info);
            }

            if schema_changed {
                let epoch = meta_u64!(meta, META_SCHEMA_EPOCH) + 1;
                put_meta!(meta, META_SCHEMA_EPOCH, &epoch);
                put_meta!(meta, META_COMPUTED_SCHEMA, &computed);
            }
            changed = schema_changed;
        }
        txn.commit().map_err(map_err!(Transient))?;
        Ok(changed)
    }

    /// The materialized cluster schema.
    pub fn get_computed_schema(&self) -> StoreResult<ComputedSchema> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let meta = txn.open_table(META).map_err(map_err!(Table))?;
        match meta.get(META_COMPUTED_SCHEMA).map_err(map_err!(Read))? {
            Some(guard) => {
                serde_json::from_slice(guard.value()).map_err(map_err!(Corrupt))
            }
            None => Ok(ComputedSchema::default()),
        }
    }

    /// Current schema-change marker.
    pub fn schema_epoch(&self) -> StoreResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let meta = txn.open_table(META).map_err(map_err!(Table))?;
        let epoch = meta_u64!(meta, META_SCHEMA_EPOCH);
        Ok(epoch)
    }

    // ── Processes ──────────────────────────────────────────────────

    /// Insert or overwrite process records.
    pub fn update_processes(&self, records: &[ProcessRecord]) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PROCESSES).map_err(map_err!(Table))?;
            for record in records {
                let bytes = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
                table
                    .insert(record.upid.table_key().as_str(), bytes.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transient))?;
        Ok(())
    }

    /// Set `stop_time_ns` on the given processes. Unknown UPIDs are
    /// ignored; a repeated termination rewrites the same value.
    pub fn mark_processes_stopped(
        &self,
        stops: &[(Upid, u64)],
        now_ns: u64,
    ) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PROCESSES).map_err(map_err!(Table))?;
            for (upid, stop_ns) in stops {
                let key = upid.table_key();
                let record: Option<ProcessRecord> =
                    match table.get(key.as_str()).map_err(map_err!(Read))? {
                        Some(guard) => {
                            Some(serde_json::from_slice(guard.value()).map_err(map_err!(Corrupt))?)
                        }
                        None => None,
                    };
                match record {
                    Some(mut record) => {
                        record.stop_time_ns = Some(*stop_ns);
                        record.written_at_ns = now_ns;
                        let bytes =
                            serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
                        table
                            .insert(key.as_str(), bytes.as_slice())
                            .map_err(map_err!(Write))?;
                    }
                    None => debug!(upid = %key, "termination for unknown process ignored"),
                }
            }
        }
        txn.commit().map_err(map_err!(Transient))?;
        Ok(())
    }

    /// Look up process records by UPID, `None` for absent or corrupt ones.
    pub fn get_processes(&self, upids: &[Upid]) -> StoreResult<Vec<Option<ProcessRecord>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PROCESSES).map_err(map_err!(Table))?;
        let mut out = Vec::with_capacity(upids.len());
        for upid in upids {
            let key = upid.table_key();
            let record = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => match serde_json::from_slice(guard.value()) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(upid = %key, error = %e, "skipping corrupt process record");
                        None
                    }
                },
                None => None,
            };
            out.push(record);
        }
        Ok(out)
    }

    // ── Data info ──────────────────────────────────────────────────

    /// Overwrite an agent's data-info blob and append a `DataInfoUpdated`
    /// feed entry.
    pub fn update_agent_data_info(
        &self,
        agent_id: Uuid,
        info: &AgentDataInfo,
        now_ns: u64,
    ) -> StoreResult<()> {
        let key = agent_id.to_string();

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DATA_INFO).map_err(map_err!(Table))?;
            let mut feed = txn.open_table(FEED).map_err(map_err!(Table))?;
            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
            let bytes = serde_json::to_vec(info).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
            append_feed!(
                feed,
                meta,
                AgentEvent::DataInfoUpdated {
                    agent_id,
                    data_info: info.clone(),
                },
                now_ns
            );
        }
        txn.commit().map_err(map_err!(Transient))?;
        Ok(())
    }

    /// Data-info blobs for all agents that have reported one.
    pub fn get_agents_data_info(&self) -> StoreResult<BTreeMap<Uuid, AgentDataInfo>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DATA_INFO).map_err(map_err!(Table))?;
        let mut out = BTreeMap::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let id = Uuid::parse_str(key.value()).map_err(map_err!(Corrupt))?;
            match serde_json::from_slice::<AgentDataInfo>(value.value()) {
                Ok(info) => {
                    out.insert(id, info);
                }
                Err(e) => warn!(agent = %id, error = %e, "skipping corrupt data-info record"),
            }
        }
        Ok(out)
    }

    // ── Change feed & cursors ──────────────────────────────────────

    /// Highest committed feed sequence.
    pub fn feed_head(&self) -> StoreResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let meta = txn.open_table(META).map_err(map_err!(Table))?;
        let head = meta_u64!(meta, META_FEED_HEAD);
        Ok(head)
    }

    /// Feed entries with sequence above `after_seq`, at most `limit`, plus
    /// the schema epoch from the same snapshot. Corrupt entries are
    /// skipped.
    pub fn read_feed_page(
        &self,
        after_seq: u64,
        limit: usize,
    ) -> StoreResult<(Vec<FeedEntry>, u64)> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let feed = txn.open_table(FEED).map_err(map_err!(Table))?;
        let meta = txn.open_table(META).map_err(map_err!(Table))?;

        let mut entries = Vec::new();
        for entry in feed.range(after_seq + 1..).map_err(map_err!(Read))? {
            let (seq, value) = entry.map_err(map_err!(Read))?;
            match serde_json::from_slice::<FeedEntry>(value.value()) {
                Ok(e) => entries.push(e),
                Err(e) => warn!(seq = seq.value(), error = %e, "skipping corrupt feed entry"),
            }
            if entries.len() >= limit {
                break;
            }
        }
        let epoch = meta_u64!(meta, META_SCHEMA_EPOCH);
        Ok((entries, epoch))
    }

    /// One consistent snapshot of the fleet, the schema and the feed
    /// position, for a cursor's first poll.
    pub fn cursor_snapshot(&self) -> StoreResult<CursorSnapshot> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let agents_table = txn.open_table(AGENTS).map_err(map_err!(Table))?;
        let meta = txn.open_table(META).map_err(map_err!(Table))?;

        let mut agents = Vec::new();
        for entry in agents_table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            match serde_json::from_slice::<Agent>(value.value()) {
                Ok(agent) => agents.push(agent),
                Err(e) => warn!(agent = key.value(), error = %e, "skipping corrupt agent record"),
            }
        }
        agents.sort_by_key(|a| a.id);

        let schema = match meta.get(META_COMPUTED_SCHEMA).map_err(map_err!(Read))? {
            Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Corrupt))?,
            None => ComputedSchema::default(),
        };
        let schema_epoch = meta_u64!(meta, META_SCHEMA_EPOCH);
        let feed_head = meta_u64!(meta, META_FEED_HEAD);

        Ok(CursorSnapshot {
            agents,
            schema,
            schema_epoch,
            feed_head,
        })
    }

    /// Trim feed entries older than `cutoff_ns`. Entries are time-ordered
    /// by sequence, so the scan stops at the first young entry. Returns the
    /// number removed.
    pub fn trim_feed(&self, cutoff_ns: u64) -> StoreResult<usize> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed;
        {
            let mut feed = txn.open_table(FEED).map_err(map_err!(Table))?;
            let mut stale = Vec::new();
            for entry in feed.iter().map_err(map_err!(Read))? {
                let (seq, value) = entry.map_err(map_err!(Read))?;
                let keep = serde_json::from_slice::<FeedEntry>(value.value())
                    .map(|e| e.time_ns >= cutoff_ns)
                    .unwrap_or(false);
                if keep {
                    break;
                }
                stale.push(seq.value());
            }
            for seq in &stale {
                feed.remove(*seq).map_err(map_err!(Write))?;
            }
            removed = stale.len();
        }
        txn.commit().map_err(map_err!(Transient))?;
        Ok(removed)
    }

    /// Store a cursor record.
    pub fn put_cursor(&self, cursor: &CursorState) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CURSORS).map_err(map_err!(Table))?;
            let bytes = serde_json::to_vec(cursor).map_err(map_err!(Serialize))?;
            table
                .insert(cursor.id.to_string().as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transient))?;
        Ok(())
    }

    /// Get a cursor record by id.
    pub fn get_cursor(&self, id: Uuid) -> StoreResult<Option<CursorState>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CURSORS).map_err(map_err!(Table))?;
        match table
            .get(id.to_string().as_str())
            .map_err(map_err!(Read))?
        {
            Some(guard) => {
                let cursor: CursorState =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Corrupt))?;
                Ok(Some(cursor))
            }
            None => Ok(None),
        }
    }

    /// Delete a cursor record. Returns whether it existed.
    pub fn delete_cursor(&self, id: Uuid) -> StoreResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(CURSORS).map_err(map_err!(Table))?;
            existed = table
                .remove(id.to_string().as_str())
                .map_err(map_err!(Write))?
                .is_some();
        }
        txn.commit().map_err(map_err!(Transient))?;
        Ok(existed)
    }

    /// Remove cursors not polled since `cutoff_ns`. Returns the number
    /// removed.
    pub fn purge_idle_cursors(&self, cutoff_ns: u64) -> StoreResult<usize> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed;
        {
            let mut table = txn.open_table(CURSORS).map_err(map_err!(Table))?;
            let mut stale = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let idle = serde_json::from_slice::<CursorState>(value.value())
                    .map(|c| c.last_polled_ns < cutoff_ns)
                    .unwrap_or(true);
                if idle {
                    stale.push(key.value().to_string());
                }
            }
            for key in &stale {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
                warn!(cursor = %key, "purged idle cursor");
            }
            removed = stale.len();
        }
        txn.commit().map_err(map_err!(Transient))?;
        Ok(removed)
    }

    /// Remove process records last written before `cutoff_ns`. Returns the
    /// number removed.
    pub fn purge_stale_processes(&self, cutoff_ns: u64) -> StoreResult<usize> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed;
        {
            let mut table = txn.open_table(PROCESSES).map_err(map_err!(Table))?;
            let mut stale = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let expired = serde_json::from_slice::<ProcessRecord>(value.value())
                    .map(|r| r.written_at_ns < cutoff_ns)
                    .unwrap_or(true);
                if expired {
                    stale.push(key.value().to_string());
                }
            }
            for key in &stale {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            removed = stale.len();
        }
        txn.commit().map_err(map_err!(Transient))?;
        Ok(removed)
    }
}
