//! telegrid-bus — subject-addressed publish/subscribe for agent commands.
//!
//! The manager pushes configuration-change requests to live agents over a
//! message bus. Only the publish contract lives here; the production
//! transport is an external collaborator. [`InProcessBus`] implements the
//! contract over per-subject broadcast channels for tests and the
//! single-process daemon.
//!
//! Agent-addressed subjects follow the `Agent/<uuid>` scheme; payloads are
//! JSON-serialized [`AgentMessage`] envelopes.

pub mod messages;

mod inprocess;

use thiserror::Error;
use uuid::Uuid;

pub use inprocess::InProcessBus;
pub use messages::{AgentMessage, ConfigUpdateRequest};

/// Result type alias for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Errors that can occur on the bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("publish to {subject} failed: {reason}")]
    Publish { subject: String, reason: String },

    #[error("encode error: {0}")]
    Encode(String),
}

/// Subject-addressed publisher. Publishing is fire-and-forget; delivery
/// acknowledgement is observed out of band (for config updates, via
/// subsequent agent updates).
pub trait MessageBus: Send + Sync {
    fn publish(&self, subject: &str, payload: &[u8]) -> BusResult<()>;
}

/// The subject a single agent listens on.
pub fn agent_subject(agent_id: Uuid) -> String {
    format!("Agent/{agent_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_subject_scheme() {
        let id = Uuid::from_u128(7);
        assert_eq!(agent_subject(id), format!("Agent/{id}"));
    }
}
