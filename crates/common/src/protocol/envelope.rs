// Client-side construction of command envelopes.

use serde_json::Value;
use uuid::Uuid;

use super::partition::{dedupe_partitions, partition_for};
use crate::domain::command::{Actor, Command};
use crate::domain::constants::{Scope, COMMAND_VERSION};
use crate::domain::model::{now_ms, Timestamp};

/// Inputs for [`build_command`]. Unset fields are filled in.
#[derive(Debug, Clone)]
pub struct CommandDraft {
    pub id: Option<String>,
    pub project_id: String,
    pub scope: Scope,
    pub partition: Option<String>,
    pub partitions: Vec<String>,
    pub command_type: String,
    pub payload: Value,
    pub actor: Actor,
    pub client_ts: Option<Timestamp>,
    pub command_version: Option<u32>,
}

impl CommandDraft {
    pub fn new(
        project_id: impl Into<String>,
        scope: Scope,
        command_type: impl Into<String>,
        payload: Value,
        actor: Actor,
    ) -> Self {
        Self {
            id: None,
            project_id: project_id.into(),
            scope,
            partition: None,
            partitions: Vec::new(),
            command_type: command_type.into(),
            payload,
            actor,
            client_ts: None,
            command_version: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    pub fn with_extra_partition(mut self, partition: impl Into<String>) -> Self {
        self.partitions.push(partition.into());
        self
    }

    pub fn at(mut self, client_ts: Timestamp) -> Self {
        self.client_ts = Some(client_ts);
        self
    }
}

/// Fills defaults and routing. Performs no validation.
pub fn build_command(draft: CommandDraft) -> Command {
    let base = draft
        .partition
        .filter(|partition| !partition.is_empty())
        .unwrap_or_else(|| partition_for(&draft.project_id, draft.scope));
    let partitions =
        dedupe_partitions(std::iter::once(base.as_str()).chain(draft.partitions.iter().map(String::as_str)));

    Command {
        id: draft.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        project_id: draft.project_id,
        partition: base,
        partitions: Some(partitions),
        command_type: draft.command_type,
        payload: draft.payload,
        actor: draft.actor,
        client_ts: draft.client_ts.unwrap_or_else(now_ms),
        command_version: draft.command_version.unwrap_or(COMMAND_VERSION),
    }
}
