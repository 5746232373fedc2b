//! redb table definitions for the telegrid agent store.
//!
//! Each table is one keyspace partition, so a range scan enumerates exactly
//! one kind of record. Values are JSON-serialized domain types; index tables
//! map straight to agent UUID strings.

use redb::TableDefinition;

/// Agent records keyed by agent UUID.
pub const AGENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("agents");

/// Host-identity index: `{hostname}/{host_ip}` → agent UUID.
/// Data-collecting agents use an empty hostname component.
pub const HOST_INDEX: TableDefinition<&str, &str> = TableDefinition::new("host_index");

/// ASID index: agent short id → agent UUID.
pub const ASID_INDEX: TableDefinition<u32, &str> = TableDefinition::new("asid_index");

/// Per-agent schema entries keyed by `{agent_uuid}/{table_name}`.
pub const SCHEMAS: TableDefinition<&str, &[u8]> = TableDefinition::new("schemas");

/// Process records keyed by 32-hex-digit UPID.
pub const PROCESSES: TableDefinition<&str, &[u8]> = TableDefinition::new("processes");

/// Data-info blobs keyed by agent UUID.
pub const DATA_INFO: TableDefinition<&str, &[u8]> = TableDefinition::new("data_info");

/// Cursor state keyed by cursor UUID.
pub const CURSORS: TableDefinition<&str, &[u8]> = TableDefinition::new("cursors");

/// Change-feed entries keyed by sequence number.
pub const FEED: TableDefinition<u64, &[u8]> = TableDefinition::new("feed");

/// Store metadata: `version`, `feed_head`, `schema_epoch`, `computed_schema`.
pub const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
