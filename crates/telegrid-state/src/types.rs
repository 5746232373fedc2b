//! Domain types for the telegrid agent store.
//!
//! These types represent the persisted state of agents, their table
//! schemas, tracked processes, data-info blobs, change-feed entries and
//! cursors. All types are serializable to/from JSON for storage in redb
//! tables.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Agent ─────────────────────────────────────────────────────────

/// A registered telemetry agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Agent {
    /// Stable 128-bit identity, declared by the agent itself.
    pub id: Uuid,
    /// Agent short id: dense, unique among live agents, assigned here.
    pub asid: u32,
    pub hostname: String,
    pub host_ip: String,
    /// Kubernetes namespace of the agent pod (empty when not applicable).
    pub namespace: String,
    /// Pod the agent runs in (empty when not applicable).
    pub pod_name: String,
    /// Whether this agent collects data on its host. Non-collectors are
    /// aggregators ("kelvin" agents) and may share a host.
    pub collects_data: bool,
    pub create_time_ns: u64,
    pub last_heartbeat_ns: u64,
}

impl Agent {
    /// Heartbeat age relative to `now_ns`, saturating at zero.
    pub fn heartbeat_age_ns(&self, now_ns: u64) -> u64 {
        now_ns.saturating_sub(self.last_heartbeat_ns)
    }
}

/// Host identity under which an agent is indexed.
///
/// Data-collecting agents are tied to the physical host and key on the IP
/// alone; non-collectors may coexist on a host and key on the full pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct HostnamePair {
    pub hostname: String,
    pub host_ip: String,
}

impl HostnamePair {
    pub fn new(hostname: &str, host_ip: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            host_ip: host_ip.to_string(),
        }
    }

    /// The index identity for an agent, derived from its capabilities.
    pub fn for_agent(agent: &Agent) -> Self {
        if agent.collects_data {
            Self::new("", &agent.host_ip)
        } else {
            Self::new(&agent.hostname, &agent.host_ip)
        }
    }

    /// Composite key for the host-index table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.hostname, self.host_ip)
    }
}

// ── Schema ────────────────────────────────────────────────────────

/// Descriptor for one table a data-collecting agent announces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    /// Column the table is tabletized on, if any.
    pub tabletization_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Bool,
    Int64,
    Uint128,
    Float64,
    String,
    Time,
}

// ── Process ───────────────────────────────────────────────────────

/// Unique process id: the high word packs the owning agent's ASID and the
/// pid, the low word is the process start time in nanoseconds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Upid {
    pub high: u64,
    pub low: u64,
}

impl Upid {
    pub fn from_parts(asid: u32, pid: u32, start_time_ns: u64) -> Self {
        Self {
            high: (u64::from(asid) << 32) | u64::from(pid),
            low: start_time_ns,
        }
    }

    pub fn asid(&self) -> u32 {
        (self.high >> 32) as u32
    }

    pub fn pid(&self) -> u32 {
        self.high as u32
    }

    pub fn start_time_ns(&self) -> u64 {
        self.low
    }

    /// Fixed-width hex key; lexicographic order matches numeric order, so a
    /// range scan walks processes grouped by owning ASID.
    pub fn table_key(&self) -> String {
        format!("{:016x}{:016x}", self.high, self.low)
    }
}

/// Lifecycle record of one process observed by an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessRecord {
    pub upid: Upid,
    pub cmdline: String,
    pub start_time_ns: u64,
    /// Set once the process-terminated event arrives.
    pub stop_time_ns: Option<u64>,
    /// Last write time, used for TTL expiry.
    pub written_at_ns: u64,
}

/// A process-created event reported by an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessCreated {
    pub pid: u32,
    pub start_time_ns: u64,
    pub cmdline: String,
}

/// A process-terminated event reported by an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessTerminated {
    pub pid: u32,
    pub start_time_ns: u64,
    pub stop_time_ns: u64,
}

// ── Data info ─────────────────────────────────────────────────────

/// Metadata kinds an agent's bloom filter covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    ContainerId,
    PodName,
    ServiceName,
    Namespace,
}

/// Serialized bloom filter over metadata entities present on an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BloomFilter {
    pub data: Vec<u8>,
    pub num_hashes: u32,
}

/// Per-agent metadata summary, overwritten on each agent update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentDataInfo {
    pub metadata_fields: Vec<MetadataField>,
    pub bloom_filter: BloomFilter,
}

// ── Change feed ───────────────────────────────────────────────────

/// One agent-level change event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentEvent {
    Created(Agent),
    Updated(Agent),
    Deleted { agent_id: Uuid },
    DataInfoUpdated { agent_id: Uuid, data_info: AgentDataInfo },
}

impl AgentEvent {
    /// The agent the event concerns.
    pub fn agent_id(&self) -> Uuid {
        match self {
            AgentEvent::Created(a) | AgentEvent::Updated(a) => a.id,
            AgentEvent::Deleted { agent_id } => *agent_id,
            AgentEvent::DataInfoUpdated { agent_id, .. } => *agent_id,
        }
    }
}

/// Durable envelope for one change-feed entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedEntry {
    pub seq: u64,
    pub time_ns: u64,
    pub event: AgentEvent,
}

// ── Cursor ────────────────────────────────────────────────────────

/// Durable position of one change-feed subscriber.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CursorState {
    pub id: Uuid,
    /// Highest feed sequence already delivered.
    pub last_seq: u64,
    /// Schema epoch last delivered to this subscriber.
    pub schema_epoch: u64,
    /// Whether the initial fleet snapshot has been delivered.
    pub snapshot_read: bool,
    pub created_at_ns: u64,
    pub last_polled_ns: u64,
}
