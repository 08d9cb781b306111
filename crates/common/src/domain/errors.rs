use serde_json::{json, Value};
use thiserror::Error;

/// Wire code shared by every rejection the engine raises.
pub const VALIDATION_FAILED: &str = "validation_failed";
/// Wire code for events this build cannot interpret.
pub const PROTOCOL_MISMATCH: &str = "protocol_mismatch";

macro_rules! detailed_error {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Error)]
        #[error("{message}")]
        pub struct $name {
            pub message: String,
            pub details: Value,
        }

        impl $name {
            pub fn new(message: impl Into<String>) -> Self {
                Self { message: message.into(), details: json!({}) }
            }

            pub fn with_details(mut self, details: Value) -> Self {
                self.details = details;
                self
            }
        }
    };
}

detailed_error! {
    /// Malformed command envelope or payload. `details.errors` lists every violation.
    ValidationError
}

detailed_error! {
    /// A well-formed command that does not apply to the current state.
    PreconditionError
}

detailed_error! {
    /// State that violates a structural guarantee after a reducer step.
    InvariantError
}

/// Fatal reducer failures. These indicate a protocol mismatch between peers,
/// not a user mistake, and abort processing of the event.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReducerError {
    #[error("unknown domain event type: {0}")]
    UnknownEventType(String),
    #[error("malformed payload for {event_type}: {reason}")]
    MalformedPayload { event_type: String, reason: String },
    #[error("{kind} not found: {id}")]
    MissingEntity { kind: &'static str, id: String },
    #[error("invalid patch: {0}")]
    InvalidPatch(String),
}

impl ReducerError {
    pub fn details(&self) -> Value {
        match self {
            Self::UnknownEventType(event_type) => json!({ "eventType": event_type }),
            Self::MalformedPayload { event_type, reason } => {
                json!({ "eventType": event_type, "reason": reason })
            }
            Self::MissingEntity { kind, id } => json!({ "kind": kind, "id": id }),
            Self::InvalidPatch(reason) => json!({ "reason": reason }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
    #[error(transparent)]
    Reducer(#[from] ReducerError),
}

impl DomainError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::Precondition(_) | Self::Invariant(_) => VALIDATION_FAILED,
            Self::Reducer(_) => PROTOCOL_MISMATCH,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Validation(_) => "DomainValidationError",
            Self::Precondition(_) => "DomainPreconditionError",
            Self::Invariant(_) => "DomainInvariantError",
            Self::Reducer(_) => "DomainReducerError",
        }
    }

    pub fn details(&self) -> Value {
        match self {
            Self::Validation(err) => err.details.clone(),
            Self::Precondition(err) => err.details.clone(),
            Self::Invariant(err) => err.details.clone(),
            Self::Reducer(err) => err.details(),
        }
    }
}
