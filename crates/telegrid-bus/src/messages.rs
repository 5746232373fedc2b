//! Wire envelopes published to agents.

use serde::{Deserialize, Serialize};

use crate::{BusError, BusResult};

/// A configuration-change request for a single agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigUpdateRequest {
    pub key: String,
    pub value: String,
}

/// Framing wrapper for everything published on an agent subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    ConfigUpdate(ConfigUpdateRequest),
}

impl AgentMessage {
    pub fn config_update(key: &str, value: &str) -> Self {
        AgentMessage::ConfigUpdate(ConfigUpdateRequest {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn to_bytes(&self) -> BusResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| BusError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> BusResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| BusError::Encode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_update_round_trips() {
        let msg = AgentMessage::config_update("gprof", "true");
        let decoded = AgentMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        let AgentMessage::ConfigUpdate(req) = decoded;
        assert_eq!(req.key, "gprof");
        assert_eq!(req.value, "true");
    }
}
