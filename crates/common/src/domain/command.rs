use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::model::Timestamp;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub client_id: String,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), client_id: client_id.into() }
    }
}

/// A request to change the document. Fields default when absent so that the
/// validator, not the deserializer, reports what is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Command {
    pub id: String,
    pub project_id: String,
    pub partition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partitions: Option<Vec<String>>,
    #[serde(rename = "type")]
    pub command_type: String,
    pub payload: Value,
    pub actor: Actor,
    pub client_ts: Timestamp,
    pub command_version: u32,
}

impl Command {
    /// Partitions to publish under: the explicit list, or the routing partition alone.
    pub fn target_partitions(&self) -> Vec<String> {
        match &self.partitions {
            Some(partitions) if !partitions.is_empty() => partitions.clone(),
            _ => vec![self.partition.clone()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    pub command_id: String,
    pub project_id: String,
    pub actor: Actor,
    pub ts: Timestamp,
}

/// The fact a command produced, applied by the reducer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
    pub meta: EventMeta,
}
