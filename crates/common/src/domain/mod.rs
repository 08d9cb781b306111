// Command/event engine for the project document.

pub mod collection;
pub mod command;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod invariants;
pub mod mapper;
pub mod model;
pub mod operation;
pub mod preconditions;
pub mod reducer;
pub mod utils;
pub mod validate;

pub use collection::Collection;
pub use command::{Actor, Command, DomainEvent, EventMeta};
pub use constants::{
    CommandType, EventType, ResourceType, Scope, COMMAND_VERSION, LEGACY_EVENT_COMMAND,
    MODEL_VERSION, PROTOCOL_VERSION,
};
pub use engine::{process_command, Processed};
pub use errors::{DomainError, InvariantError, PreconditionError, ReducerError, ValidationError};
pub use invariants::assert_invariants;
pub use mapper::{command_to_event, to_event_type};
pub use model::ProjectState;
pub use operation::Operation;
pub use preconditions::check_preconditions;
pub use reducer::apply_event;
pub use validate::validate_command;
