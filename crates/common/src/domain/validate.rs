// Structural validation of the command envelope and payload.

use serde_json::{json, Map, Value};

use super::command::Command;
use super::constants::{CommandType, ResourceType, COMMAND_VERSION};
use super::errors::ValidationError;
use super::operation::Operation;
use super::utils::is_non_empty;

fn check_envelope(command: &Command, errors: &mut Vec<String>) {
    if !is_non_empty(&command.id) {
        errors.push("id is required".into());
    }
    if !is_non_empty(&command.project_id) {
        errors.push("projectId is required".into());
    }
    if !is_non_empty(&command.partition) {
        errors.push("partition is required".into());
    }
    if let Some(partitions) = &command.partitions {
        if partitions.is_empty() {
            errors.push("partitions must be a non-empty array when provided".into());
        } else if partitions.iter().any(|partition| !is_non_empty(partition)) {
            errors.push("partitions entries must be non-empty strings".into());
        }
    }
    if !is_non_empty(&command.command_type) {
        errors.push("type is required".into());
    }
    if command.command_version != COMMAND_VERSION {
        errors.push(format!("commandVersion must be {COMMAND_VERSION}"));
    }
    if command.client_ts < 0 {
        errors.push("clientTs must be a non-negative timestamp".into());
    }
    if !is_non_empty(&command.actor.user_id) {
        errors.push("actor.userId is required".into());
    }
    if !is_non_empty(&command.actor.client_id) {
        errors.push("actor.clientId is required".into());
    }
}

fn check_payload_shape(kind: CommandType, payload: &Map<String, Value>, errors: &mut Vec<String>) {
    for field in kind.required_fields() {
        if !payload.contains_key(*field) {
            errors.push(format!("payload.{field} is required"));
        }
    }

    if let Some(resource_type) = payload.get("resourceType") {
        let known = resource_type.as_str().and_then(ResourceType::parse).is_some();
        if !known {
            errors.push(format!("Unsupported resourceType: {resource_type}"));
        }
    }

    if let Some(index) = payload.get("index") {
        if index.as_i64().is_none() {
            errors.push("payload.index must be integer when provided".into());
        }
    }

    if kind == CommandType::LineInsertAfter {
        match payload.get("afterLineId") {
            None | Some(Value::Null) => {}
            Some(Value::String(id)) if is_non_empty(id) => {}
            Some(_) => errors.push("payload.afterLineId must be non-empty string when provided".into()),
        }
    }
}

/// Checks a command's shape and decodes its payload. Every violation is
/// collected into `details.errors` before failing.
pub fn validate_command(command: &Command) -> Result<Operation, ValidationError> {
    let mut errors = Vec::new();
    check_envelope(command, &mut errors);

    let kind = CommandType::parse(&command.command_type);
    if kind.is_none() {
        errors.push(format!("Unsupported command type: {}", command.command_type));
    }

    let Some(payload) = command.payload.as_object() else {
        errors.push("payload is required".into());
        return Err(ValidationError::new("Invalid command envelope")
            .with_details(json!({ "errors": errors })));
    };

    if let Some(kind) = kind {
        check_payload_shape(kind, payload, &mut errors);
    }

    if !errors.is_empty() {
        return Err(
            ValidationError::new("Command validation failed").with_details(json!({ "errors": errors }))
        );
    }

    let Some(kind) = kind else {
        return Err(ValidationError::new("Command validation failed")
            .with_details(json!({ "errors": ["Unsupported command type"] })));
    };
    Operation::decode(kind, &command.payload).map_err(|err| {
        ValidationError::new("Command validation failed")
            .with_details(json!({ "errors": [format!("payload is malformed: {err}")] }))
    })
}
