//! telegrid-state — embedded metadata store for the telegrid agent fleet.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and
//! in-memory storage for agent records, the host-identity and ASID
//! indices, per-agent table schemas, process records, data-info blobs,
//! the agent change feed and its cursors.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value
//! columns; one table per keyspace so range scans enumerate one kind of
//! record. Composite operations (create/delete agent, schema update)
//! run in a single write transaction, keeping the indices, the computed
//! cluster schema and the change feed consistent with the agent records
//! across crashes.
//!
//! The `AgentStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across threads and async tasks.

pub mod clock;
pub mod error;
pub mod schema;
pub mod store;
pub mod tables;
pub mod types;

mod asid;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{StoreError, StoreResult};
pub use schema::ComputedSchema;
pub use store::{AgentStore, CursorSnapshot};
pub use types::*;
