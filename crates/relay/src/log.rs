// Committed-log files (one committed event per line) and offline replay.

use std::collections::HashSet;
use std::io::BufRead;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, warn};

use scenecraft_common::protocol::{CommittedEvent, Rejection};

use crate::registry::{Accepted, ProjectRegistry, SubmittedItem};

/// Reads JSON-lines committed events. Blank lines are skipped.
pub fn read_committed_log(reader: impl BufRead) -> Result<Vec<CommittedEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read log line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: CommittedEvent = serde_json::from_str(&line)
            .with_context(|| format!("invalid committed event on line {}", index + 1))?;
        events.push(event);
    }
    Ok(events)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedEntry {
    pub event_id: String,
    pub rejection: Rejection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub applied: usize,
    pub legacy: usize,
    /// Repeated event or command ids.
    pub duplicates: usize,
    pub rejected: Vec<RejectedEntry>,
}

/// Folds `events` through the registry in log order, in committed-id order
/// when ids are present.
pub fn replay(registry: &mut ProjectRegistry, events: &[CommittedEvent]) -> ReplayReport {
    let mut ordered: Vec<&CommittedEvent> = events.iter().collect();
    ordered.sort_by_key(|event| event.committed_id.unwrap_or(u64::MAX));

    // Event ids and command ids are separate namespaces.
    let mut seen_events = HashSet::new();
    let mut seen_commands = HashSet::new();
    let mut report = ReplayReport::default();
    for event in ordered {
        let command_id = &event.event.payload.command_id;
        let fresh_event = seen_events.insert(event.id.clone());
        let fresh_command = command_id.is_empty() || seen_commands.insert(command_id.clone());
        if !fresh_event || !fresh_command {
            report.duplicates += 1;
            continue;
        }

        let item = SubmittedItem { partitions: event.partitions.clone(), event: event.event.clone() };
        match registry.validate_item(&item) {
            Ok(Accepted::Projected) => report.applied += 1,
            Ok(Accepted::Legacy) => report.legacy += 1,
            Err(mut rejection) => {
                warn!(event_id = %event.id, message = ?rejection.message, "replayed event rejected");
                rejection.event_id = Some(event.id.clone());
                report.rejected.push(RejectedEntry { event_id: event.id.clone(), rejection });
            }
        }
    }
    debug!(applied = report.applied, rejected = report.rejected.len(), "replay finished");
    report
}
