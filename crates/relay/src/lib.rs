// scenecraft-relay: server-side validation hook and in-memory broker

pub mod config;
pub mod log;
pub mod memory;
pub mod registry;

pub use config::RelayConfig;
pub use log::{read_committed_log, replay, ReplayReport};
pub use memory::{InMemoryRelay, RelayClient, SubmitOutcome};
pub use registry::{Accepted, ProjectRegistry, SubmittedItem};
