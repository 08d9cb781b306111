// Sync protocol shared by clients and the relay.

pub mod broker;
pub mod envelope;
pub mod partition;
pub mod wire;

pub use broker::{BrokerFault, BrokerMessage, Rejection, SubmitRequest, SyncOptions, SyncPage};
pub use envelope::{build_command, CommandDraft};
pub use partition::{
    dedupe_partitions, entity_partition, partition_for, partition_matches, project_id_from_partition,
    project_partitions, scope_of,
};
pub use wire::{
    command_to_wire_event, committed_event_to_command, committed_event_to_domain_event,
    wire_event_to_command, CommittedEvent, WireEvent, WirePayload,
};
