use serde_json::json;
use tracing::debug;

use super::command::{Command, DomainEvent};
use super::errors::{DomainError, ReducerError, ValidationError};
use super::invariants::assert_invariants;
use super::mapper::command_to_event;
use super::model::ProjectState;
use super::preconditions::check_preconditions;
use super::reducer::apply_event;
use super::validate::validate_command;

/// Result of an accepted command.
#[derive(Debug, Clone)]
pub struct Processed {
    pub state: ProjectState,
    pub event: DomainEvent,
}

/// Validates, checks, applies and re-checks one command. `state` is never
/// mutated; the returned state is a copy that shares untouched entities.
pub fn process_command(state: &ProjectState, command: &Command) -> Result<Processed, DomainError> {
    let operation = validate_command(command)?;
    check_preconditions(state, command, &operation)?;

    let mut working = state.clone();
    let event = command_to_event(command);
    apply_event(&mut working, &event).map_err(|err| match err {
        // A patch whose values do not fit the entity is a bad payload, not a peer mismatch.
        ReducerError::InvalidPatch(reason) => DomainError::from(
            ValidationError::new("Command validation failed")
                .with_details(json!({ "errors": [format!("payload.patch: {reason}")] })),
        ),
        other => DomainError::from(other),
    })?;
    assert_invariants(&working)?;

    debug!(
        command_id = %command.id,
        command_type = %command.command_type,
        event_type = %event.event_type,
        "command applied"
    );
    Ok(Processed { state: working, event })
}
