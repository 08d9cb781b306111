// Server-side validation hook over per-project projections.
//
// Every submitted item is rebuilt into a command and run through the same
// engine the clients use. Only accepted items advance the projection.

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::{debug, warn};

use scenecraft_common::domain::errors::VALIDATION_FAILED;
use scenecraft_common::domain::{process_command, DomainError, ProjectState, LEGACY_EVENT_COMMAND};
use scenecraft_common::protocol::wire::WIRE_EVENT_TYPE;
use scenecraft_common::protocol::{wire_event_to_command, Rejection, SubmitRequest, WireEvent};

/// An event as offered to the broker, before it is committed.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedItem {
    pub partitions: Vec<String>,
    pub event: WireEvent,
}

impl From<SubmitRequest> for SubmittedItem {
    fn from(request: SubmitRequest) -> Self {
        Self { partitions: request.partitions, event: request.event }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    /// Applied to the project projection.
    Projected,
    /// Opaque legacy-bridge event, committed without projection.
    Legacy,
}

fn reject(message: impl Into<String>, command_id: Option<String>, details: Value) -> Rejection {
    Rejection {
        reason: Some(VALIDATION_FAILED.to_string()),
        command_id,
        event_id: None,
        message: Some(message.into()),
        details: Some(details),
    }
}

/// Owned by the host; one projection per project id.
#[derive(Debug, Clone, Default)]
pub struct ProjectRegistry {
    projects: HashMap<String, ProjectState>,
    auto_create: bool,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unknown project ids get an empty projection instead of a rejection.
    pub fn with_auto_create(mut self) -> Self {
        self.auto_create = true;
        self
    }

    pub fn register(&mut self, state: ProjectState) {
        self.projects.insert(state.project.id.clone(), state);
    }

    pub fn get(&self, project_id: &str) -> Option<&ProjectState> {
        self.projects.get(project_id)
    }

    pub fn project_ids(&self) -> impl Iterator<Item = &str> {
        self.projects.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    /// Validates `item` and, when accepted, advances the project projection.
    pub fn validate_item(&mut self, item: &SubmittedItem) -> Result<Accepted, Rejection> {
        if item.event.kind != WIRE_EVENT_TYPE {
            return Err(reject(
                format!("Unsupported event type: {}", item.event.kind),
                None,
                json!({ "type": item.event.kind }),
            ));
        }
        if item.partitions.is_empty() || item.partitions.iter().any(String::is_empty) {
            return Err(reject(
                "partitions must be a non-empty array of non-empty strings",
                None,
                json!({ "partitions": item.partitions }),
            ));
        }

        let command = wire_event_to_command(&item.event, &item.partitions, "");
        let command_id = (!command.id.is_empty()).then(|| command.id.clone());
        if command.project_id.is_empty() {
            return Err(reject("projectId could not be resolved", command_id, json!({ "partitions": item.partitions })));
        }

        if command.command_type == LEGACY_EVENT_COMMAND {
            return match command.payload.get("event") {
                Some(event) if event.is_object() => {
                    debug!(command_id = %command.id, project_id = %command.project_id, "legacy event accepted");
                    Ok(Accepted::Legacy)
                }
                _ => Err(reject(
                    "payload.event must be an object",
                    command_id,
                    json!({ "commandType": LEGACY_EVENT_COMMAND }),
                )),
            };
        }

        if !self.projects.contains_key(&command.project_id) {
            if !self.auto_create {
                return Err(reject(
                    "Unknown project",
                    command_id,
                    json!({ "projectId": command.project_id }),
                ));
            }
            self.projects.insert(
                command.project_id.clone(),
                ProjectState::empty_at(&command.project_id, "", "", 0),
            );
        }
        let Some(state) = self.projects.get_mut(&command.project_id) else {
            return Err(reject("Unknown project", command_id, json!({ "projectId": command.project_id })));
        };

        match process_command(state, &command) {
            Ok(processed) => {
                *state = processed.state;
                Ok(Accepted::Projected)
            }
            Err(err) => {
                warn!(
                    command_id = %command.id,
                    command_type = %command.command_type,
                    error = %err,
                    "submitted command rejected"
                );
                Err(reject(err.to_string(), command_id, rejection_details(&err)))
            }
        }
    }
}

fn rejection_details(err: &DomainError) -> Value {
    json!({ "code": err.code(), "name": err.name(), "details": err.details() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenecraft_common::domain::{Actor, Command, COMMAND_VERSION};
    use scenecraft_common::protocol::command_to_wire_event;

    fn item(id: &str, kind: &str, payload: Value) -> SubmittedItem {
        let command = Command {
            id: id.into(),
            project_id: "p1".into(),
            partition: "project:p1:story".into(),
            partitions: None,
            command_type: kind.into(),
            payload,
            actor: Actor::new("u1", "c1"),
            client_ts: 5,
            command_version: COMMAND_VERSION,
        };
        SubmittedItem { partitions: command.target_partitions(), event: command_to_wire_event(&command) }
    }

    fn registry() -> ProjectRegistry {
        let mut registry = ProjectRegistry::new();
        registry.register(ProjectState::empty("p1", "Demo", ""));
        registry
    }

    #[test]
    fn accepted_items_advance_the_projection() {
        let mut registry = registry();
        let outcome = registry
            .validate_item(&item("c1", "scene.create", json!({ "sceneId": "s1", "name": "One" })))
            .unwrap();
        assert_eq!(outcome, Accepted::Projected);
        assert!(registry.get("p1").unwrap().scenes.contains_key("s1"));
    }

    #[test]
    fn domain_failures_become_rejections() {
        let mut registry = registry();
        let rejection = registry
            .validate_item(&item("c1", "scene.delete", json!({ "sceneId": "ghost" })))
            .unwrap_err();
        assert_eq!(rejection.reason.as_deref(), Some("validation_failed"));
        assert_eq!(rejection.command_id.as_deref(), Some("c1"));
        assert_eq!(rejection.message.as_deref(), Some("scene not found"));
        assert_eq!(rejection.details.unwrap()["name"], "DomainPreconditionError");
    }

    #[test]
    fn unknown_projects_are_rejected_unless_auto_created() {
        let payload = json!({ "sceneId": "s1", "name": "One" });
        let mut strict = ProjectRegistry::new();
        let rejection = strict.validate_item(&item("c1", "scene.create", payload.clone())).unwrap_err();
        assert_eq!(rejection.message.as_deref(), Some("Unknown project"));

        let mut lenient = ProjectRegistry::new().with_auto_create();
        lenient.validate_item(&item("c1", "scene.create", payload)).unwrap();
        assert_eq!(lenient.len(), 1);
    }

    #[test]
    fn legacy_events_need_an_object_payload() {
        let mut registry = registry();
        let accepted = registry
            .validate_item(&item("c1", LEGACY_EVENT_COMMAND, json!({ "event": { "type": "addScene" } })))
            .unwrap();
        assert_eq!(accepted, Accepted::Legacy);
        assert!(registry.get("p1").unwrap().scenes.is_empty());

        let rejection = registry
            .validate_item(&item("c2", LEGACY_EVENT_COMMAND, json!({ "event": "addScene" })))
            .unwrap_err();
        assert_eq!(rejection.message.as_deref(), Some("payload.event must be an object"));
    }

    #[test]
    fn wrong_event_kind_and_empty_partitions_are_rejected() {
        let mut registry = registry();
        let mut bad_kind = item("c1", "scene.create", json!({ "sceneId": "s1", "name": "One" }));
        bad_kind.event.kind = "presence".into();
        assert!(registry.validate_item(&bad_kind).is_err());

        let mut no_partitions = item("c2", "scene.create", json!({ "sceneId": "s1", "name": "One" }));
        no_partitions.partitions.clear();
        assert!(registry.validate_item(&no_partitions).is_err());
        assert!(registry.get("p1").unwrap().scenes.is_empty());
    }
}
