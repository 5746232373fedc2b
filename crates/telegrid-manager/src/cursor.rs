//! Cursor engine over the durable change feed.
//!
//! Each consumer holds an opaque cursor whose position is persisted with
//! the feed, so consumers survive restarts and advance at their own pace.
//! The first poll of a cursor synthesizes the current fleet as
//! `AgentUpdated` events plus the schema snapshot; later polls drain the
//! feed above the cursor's position in bounded batches.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;
use uuid::Uuid;

use telegrid_state::{AgentEvent, AgentStore, ComputedSchema, CursorState, StoreResult};

use crate::error::{ManagerError, ManagerResult};

/// Most feed entries returned from a single poll; a consumer that is far
/// behind resumes from where the batch ended.
const MAX_FEED_BATCH: usize = 4096;

pub(crate) struct CursorEngine {
    store: AgentStore,
    /// One mutex per cursor: a cursor's position is read-modify-written by
    /// its consumer only, but concurrent polls of the same cursor must not
    /// double-deliver.
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl CursorEngine {
    pub(crate) fn new(store: AgentStore) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, cursor_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("cursor lock map");
        locks.entry(cursor_id).or_default().clone()
    }

    /// Register a cursor positioned at the current feed head, snapshot
    /// pending.
    pub(crate) fn create(&self, now_ns: u64) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        let cursor = CursorState {
            id,
            last_seq: self.store.feed_head()?,
            schema_epoch: 0,
            snapshot_read: false,
            created_at_ns: now_ns,
            last_polled_ns: now_ns,
        };
        self.store.put_cursor(&cursor)?;
        debug!(cursor = %id, last_seq = cursor.last_seq, "cursor created");
        Ok(id)
    }

    pub(crate) fn poll(
        &self,
        cursor_id: Uuid,
        now_ns: u64,
    ) -> ManagerResult<(Vec<AgentEvent>, Option<ComputedSchema>)> {
        let lock = self.lock_for(cursor_id);
        let _guard = lock.lock().expect("cursor lock");

        let Some(mut cursor) = self.store.get_cursor(cursor_id)? else {
            return Err(ManagerError::CursorUnknown(cursor_id));
        };

        if !cursor.snapshot_read {
            let snapshot = self.store.cursor_snapshot()?;
            let events: Vec<AgentEvent> = snapshot
                .agents
                .into_iter()
                .map(AgentEvent::Updated)
                .collect();

            cursor.snapshot_read = true;
            cursor.last_seq = snapshot.feed_head;
            cursor.schema_epoch = snapshot.schema_epoch;
            cursor.last_polled_ns = now_ns;
            self.store.put_cursor(&cursor)?;
            return Ok((events, Some(snapshot.schema)));
        }

        let (entries, epoch) = self.store.read_feed_page(cursor.last_seq, MAX_FEED_BATCH)?;
        let schema = if epoch > cursor.schema_epoch {
            Some(self.store.get_computed_schema()?)
        } else {
            None
        };

        if let Some(last) = entries.last() {
            cursor.last_seq = last.seq;
        }
        cursor.schema_epoch = epoch;
        cursor.last_polled_ns = now_ns;
        self.store.put_cursor(&cursor)?;

        Ok((entries.into_iter().map(|e| e.event).collect(), schema))
    }

    /// Drop the cursor record and its lock. Idempotent.
    pub(crate) fn delete(&self, cursor_id: Uuid) -> ManagerResult<()> {
        self.locks.lock().expect("cursor lock map").remove(&cursor_id);
        self.store.delete_cursor(cursor_id)?;
        debug!(cursor = %cursor_id, "cursor deleted");
        Ok(())
    }
}
