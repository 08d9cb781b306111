// Mapping between domain commands and the broker's event shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::partition::project_id_from_partition;
use crate::domain::command::{Actor, Command, DomainEvent};
use crate::domain::constants::COMMAND_VERSION;
use crate::domain::mapper::command_to_event;
use crate::domain::model::Timestamp;

pub const WIRE_EVENT_TYPE: &str = "event";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WirePayload {
    pub command_id: String,
    /// Command type.
    pub schema: String,
    /// Command payload.
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_version: Option<u32>,
    pub actor: Actor,
    pub project_id: String,
    pub client_ts: Timestamp,
}

/// Event as submitted to and stored by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: WirePayload,
}

/// A broker-sequenced event as seen by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedEvent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed_id: Option<u64>,
    #[serde(default)]
    pub partitions: Vec<String>,
    pub event: WireEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_ts: Option<Timestamp>,
}

pub fn command_to_wire_event(command: &Command) -> WireEvent {
    WireEvent {
        kind: WIRE_EVENT_TYPE.to_string(),
        payload: WirePayload {
            command_id: command.id.clone(),
            schema: command.command_type.clone(),
            data: command.payload.clone(),
            command_version: Some(command.command_version),
            actor: command.actor.clone(),
            project_id: command.project_id.clone(),
            client_ts: command.client_ts,
        },
    }
}

/// Rebuilds a command from a wire event and the partitions it was filed under.
/// `fallback_id` is used when the payload carries no command id.
pub fn wire_event_to_command(event: &WireEvent, partitions: &[String], fallback_id: &str) -> Command {
    let payload = &event.payload;
    let partition = partitions.first().cloned().unwrap_or_default();
    let project_id = if payload.project_id.is_empty() {
        project_id_from_partition(&partition).unwrap_or_default().to_string()
    } else {
        payload.project_id.clone()
    };
    let id = if payload.command_id.is_empty() {
        fallback_id.to_string()
    } else {
        payload.command_id.clone()
    };

    Command {
        id,
        project_id,
        partition,
        partitions: Some(partitions.to_vec()),
        command_type: payload.schema.clone(),
        payload: payload.data.clone(),
        actor: payload.actor.clone(),
        client_ts: payload.client_ts,
        command_version: payload.command_version.unwrap_or(COMMAND_VERSION),
    }
}

pub fn committed_event_to_command(committed: &CommittedEvent) -> Command {
    wire_event_to_command(&committed.event, &committed.partitions, &committed.id)
}

pub fn committed_event_to_domain_event(committed: &CommittedEvent) -> (Command, DomainEvent) {
    let command = committed_event_to_command(committed);
    let event = command_to_event(&command);
    (command, event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn command() -> Command {
        Command {
            id: "cmd-1".into(),
            project_id: "p1".into(),
            partition: "project:p1:story".into(),
            partitions: Some(vec!["project:p1:story".into()]),
            command_type: "scene.create".into(),
            payload: json!({ "sceneId": "s1", "name": "One" }),
            actor: Actor::new("u1", "c1"),
            client_ts: 77,
            command_version: 1,
        }
    }

    #[test]
    fn wire_shape() {
        let wire = command_to_wire_event(&command());
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["payload"]["commandId"], "cmd-1");
        assert_eq!(json["payload"]["schema"], "scene.create");
        assert_eq!(json["payload"]["data"]["sceneId"], "s1");
        assert_eq!(json["payload"]["clientTs"], 77);
    }

    #[test]
    fn committed_event_reconstructs_command() {
        let committed = CommittedEvent {
            id: "evt-9".into(),
            committed_id: Some(4),
            partitions: vec!["project:p1:story".into()],
            event: command_to_wire_event(&command()),
            server_ts: Some(80),
        };
        let (rebuilt, event) = committed_event_to_domain_event(&committed);
        assert_eq!(rebuilt, command());
        assert_eq!(event.event_type, "scene.created");
        assert_eq!(event.meta.ts, 77);
    }

    #[test]
    fn missing_fields_fall_back_to_broker_metadata() {
        let committed: CommittedEvent = serde_json::from_value(json!({
            "id": "evt-3",
            "committedId": 3,
            "partitions": ["project:p7:settings", "project:p7:settings:variable:v1"],
            "event": { "type": "event", "payload": { "schema": "variable.delete", "data": { "variableId": "v1" } } }
        }))
        .unwrap();
        let rebuilt = committed_event_to_command(&committed);
        assert_eq!(rebuilt.id, "evt-3");
        assert_eq!(rebuilt.project_id, "p7");
        assert_eq!(rebuilt.partition, "project:p7:settings");
        assert_eq!(rebuilt.partitions.as_ref().map(Vec::len), Some(2));
        assert_eq!(rebuilt.command_version, COMMAND_VERSION);
    }
}
