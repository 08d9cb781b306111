// Collaboration service: the client's optimistic projection of one project.
//
// Local commands run through the engine immediately and are then published.
// Committed events from the broker (live broadcasts and catch-up pages) fold
// into the same projection, skipping anything already applied.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, info_span, warn, Instrument};

use scenecraft_common::domain::{
    assert_invariants, process_command, Actor, Command, CommandType, DomainError, ProjectState,
    LEGACY_EVENT_COMMAND, PROTOCOL_VERSION,
};
use scenecraft_common::protocol::{
    command_to_wire_event, committed_event_to_command, BrokerFault, BrokerMessage, CommandDraft,
    CommittedEvent, Rejection, SubmitRequest, SyncOptions,
};

use crate::broker::{BrokerError, SessionOptions, SyncBroker};
use crate::config::CollabConfig;

const TRANSPORT_DISCONNECTED: &str = "transport_disconnected";
const SERVER_REJECTED: &str = "Server rejected command";

// ── Status and errors ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Idle,
    Starting,
    Running,
    Stopped,
}

/// Most recent failure, kept for display until cleared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl LastError {
    fn from_domain(err: &DomainError) -> Self {
        Self { code: err.code().to_string(), message: err.to_string(), details: Some(err.details()) }
    }

    fn from_broker(err: &BrokerError) -> Self {
        Self { code: err.code().to_string(), message: err.to_string(), details: None }
    }

    fn from_rejection(rejection: &Rejection) -> Self {
        Self {
            code: rejection.reason.clone().unwrap_or_else(|| "validation_failed".to_string()),
            message: SERVER_REJECTED.to_string(),
            details: serde_json::to_value(rejection).ok(),
        }
    }

    fn from_fault(fault: &BrokerFault) -> Self {
        Self { code: fault.code.clone(), message: fault.message.clone(), details: fault.details.clone() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error("collaboration service is stopped")]
    Stopped,
}

// ── Committed notifications ─────────────────────────────────────────

/// Which broker channel delivered a committed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Broadcast,
    SyncPage,
}

/// Passed to the committed hook for every newly applied broker event.
#[derive(Debug)]
pub struct CommittedNotice<'a> {
    pub command: &'a Command,
    pub committed: &'a CommittedEvent,
    pub source: SourceType,
    /// Same user and same client as this service.
    pub is_from_current_actor: bool,
}

pub type CommittedHook = Box<dyn FnMut(&CommittedNotice<'_>) + Send>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FoldOutcome {
    pub applied: usize,
    pub skipped: usize,
}

// ── Service ─────────────────────────────────────────────────────────

pub struct CollabService<B: SyncBroker> {
    config: CollabConfig,
    actor: Actor,
    broker: B,
    status: ServiceStatus,
    state: ProjectState,
    /// Command ids and broker event ids seen this session. Never shrinks.
    applied: HashSet<String>,
    /// Own command ids applied optimistically whose committed echo has not arrived.
    awaiting_echo: HashSet<String>,
    cursor: Option<u64>,
    last_error: Option<LastError>,
    on_committed: Option<CommittedHook>,
}

impl<B: SyncBroker> CollabService<B> {
    /// Starts from an empty project named after the config.
    pub fn new(config: CollabConfig, broker: B) -> Self {
        let name = config.project.name.clone().unwrap_or_default();
        let state = ProjectState::empty(&config.project.id, &name, "");
        let actor = config.actor();
        Self {
            config,
            actor,
            broker,
            status: ServiceStatus::Idle,
            state,
            applied: HashSet::new(),
            awaiting_echo: HashSet::new(),
            cursor: None,
            last_error: None,
            on_committed: None,
        }
    }

    /// Replaces the initial projection. The snapshot must pass the invariant sweep.
    pub fn with_snapshot(mut self, state: ProjectState) -> Result<Self, CollabError> {
        assert_invariants(&state).map_err(DomainError::from)?;
        self.state = state;
        Ok(self)
    }

    /// Resume catch-up after `committed_id`.
    pub fn with_cursor(mut self, committed_id: u64) -> Self {
        self.cursor = Some(committed_id);
        self
    }

    pub fn on_committed(mut self, hook: impl FnMut(&CommittedNotice<'_>) + Send + 'static) -> Self {
        self.on_committed = Some(Box::new(hook));
        self
    }

    pub fn state(&self) -> ProjectState {
        self.state.clone()
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn last_error(&self) -> Option<&LastError> {
        self.last_error.as_ref()
    }

    pub fn clear_last_error(&mut self) {
        self.last_error = None;
    }

    pub fn is_applied(&self, id: &str) -> bool {
        self.applied.contains(id)
    }

    /// Highest committed id folded so far.
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            project_id: self.config.project.id.clone(),
            partitions: self.config.subscribed_partitions(),
            actor: self.actor.clone(),
            since_committed_id: self.cursor,
            protocol_version: PROTOCOL_VERSION.to_string(),
        }
    }

    fn record(&mut self, error: LastError) {
        warn!(code = %error.code, message = %error.message, "collab error recorded");
        self.last_error = Some(error);
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    pub async fn start(&mut self) -> Result<(), CollabError> {
        if matches!(self.status, ServiceStatus::Running | ServiceStatus::Starting) {
            return Ok(());
        }
        self.status = ServiceStatus::Starting;
        let options = self.session_options();
        let span = info_span!("collab.start", project_id = %options.project_id);
        let timeout = self.config.reconnect.handshake_timeout();

        let started = match tokio::time::timeout(timeout, self.broker.start(&options).instrument(span)).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::TransportDisconnected(format!(
                "handshake timed out after {}ms",
                timeout.as_millis()
            ))),
        };
        match started {
            Ok(()) => {
                self.status = ServiceStatus::Running;
                info!(
                    project_id = %options.project_id,
                    partitions = options.partitions.len(),
                    "collaboration session started"
                );
                Ok(())
            }
            Err(err) => {
                self.status = ServiceStatus::Idle;
                self.record(LastError::from_broker(&err));
                Err(err.into())
            }
        }
    }

    /// Starts the session, retrying disconnected transports with jittered
    /// exponential backoff until the attempt budget runs out. Any other
    /// failure is returned at once.
    pub async fn reconnect(&mut self) -> Result<(), CollabError> {
        let mut attempt = 0u32;
        loop {
            match self.start().await {
                Err(CollabError::Broker(BrokerError::TransportDisconnected(reason)))
                    if self.config.reconnect.allows_retry(attempt) =>
                {
                    let delay = self.config.reconnect.delay_for(attempt, jitter_sample());
                    info!(attempt, delay_ms = delay.as_millis() as u64, %reason, "reconnecting");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    pub async fn stop(&mut self) -> Result<(), CollabError> {
        if self.status == ServiceStatus::Stopped {
            return Ok(());
        }
        self.status = ServiceStatus::Stopped;
        self.broker.stop().instrument(info_span!("collab.stop")).await?;
        info!(project_id = %self.config.project.id, "collaboration session stopped");
        Ok(())
    }

    // ── Local commands ──────────────────────────────────────────────

    /// A draft for `kind` routed under its default scope for this project and actor.
    pub fn draft(&self, kind: CommandType, payload: Value) -> CommandDraft {
        CommandDraft::new(self.config.project.id.clone(), kind.scope(), kind.as_str(), payload, self.actor.clone())
    }

    /// Applies `command` optimistically, then publishes it. Returns the command id.
    ///
    /// A disconnected transport keeps the optimistic state and is recorded as
    /// the last error. Domain errors leave the projection untouched.
    pub async fn submit_command(&mut self, command: Command) -> Result<String, CollabError> {
        if self.status == ServiceStatus::Stopped {
            return Err(CollabError::Stopped);
        }
        let processed = match process_command(&self.state, &command) {
            Ok(processed) => processed,
            Err(err) => {
                debug!(command_id = %command.id, error = %err, "local command rejected");
                return Err(err.into());
            }
        };
        self.state = processed.state;
        self.applied.insert(command.id.clone());
        self.awaiting_echo.insert(command.id.clone());

        let request =
            SubmitRequest { partitions: command.target_partitions(), event: command_to_wire_event(&command) };
        let span = info_span!("collab.submit", command_id = %command.id, command_type = %command.command_type);
        match self.broker.submit_event(request).instrument(span).await {
            Ok(()) => Ok(command.id),
            Err(BrokerError::TransportDisconnected(reason)) => {
                self.record(LastError { code: TRANSPORT_DISCONNECTED.to_string(), message: reason, details: None });
                Ok(command.id)
            }
            Err(err) => Err(err.into()),
        }
    }

    // ── Broker messages ─────────────────────────────────────────────

    pub fn handle_broker_message(&mut self, message: BrokerMessage) -> Result<FoldOutcome, CollabError> {
        if self.status == ServiceStatus::Stopped {
            return Ok(FoldOutcome::default());
        }
        match message {
            BrokerMessage::Broadcast(committed) => self.fold(vec![committed], SourceType::Broadcast),
            BrokerMessage::SyncPage(page) => {
                let outcome = self.fold(page.events, SourceType::SyncPage)?;
                if let Some(next) = page.next_cursor {
                    self.advance_cursor(next);
                }
                Ok(outcome)
            }
            BrokerMessage::Rejected(rejection) => {
                self.record(LastError::from_rejection(&rejection));
                Ok(FoldOutcome::default())
            }
            BrokerMessage::Error(fault) => {
                self.record(LastError::from_fault(&fault));
                Ok(FoldOutcome::default())
            }
        }
    }

    fn advance_cursor(&mut self, committed_id: u64) {
        self.cursor = Some(self.cursor.map_or(committed_id, |current| current.max(committed_id)));
    }

    fn fold(&mut self, items: Vec<CommittedEvent>, source: SourceType) -> Result<FoldOutcome, CollabError> {
        let mut outcome = FoldOutcome::default();
        for committed in &items {
            if let Some(committed_id) = committed.committed_id {
                self.advance_cursor(committed_id);
            }
            let command = committed_event_to_command(committed);
            if self.applied.contains(&command.id) || self.applied.contains(&committed.id) {
                self.applied.insert(committed.id.clone());
                outcome.skipped += 1;
                // The first echo of an optimistic command still announces the commit.
                if self.awaiting_echo.remove(&command.id) {
                    self.notify(&command, committed, source);
                }
                continue;
            }
            if command.command_type == LEGACY_EVENT_COMMAND {
                self.applied.insert(command.id.clone());
                self.applied.insert(committed.id.clone());
                outcome.skipped += 1;
                continue;
            }

            let processed = match process_command(&self.state, &command) {
                Ok(processed) => processed,
                Err(err) => {
                    let mut error = LastError::from_domain(&err);
                    let cause = error.details.take();
                    error.details = Some(json!({
                        "eventId": committed.id,
                        "commandId": command.id,
                        "cause": cause,
                    }));
                    self.record(error);
                    return Err(err.into());
                }
            };
            self.state = processed.state;
            self.applied.insert(command.id.clone());
            self.applied.insert(committed.id.clone());
            outcome.applied += 1;
            self.notify(&command, committed, source);
        }

        if outcome.applied > 0 {
            if let Err(err) = assert_invariants(&self.state) {
                let err = DomainError::from(err);
                self.record(LastError::from_domain(&err));
                return Err(err.into());
            }
            debug!(applied = outcome.applied, skipped = outcome.skipped, ?source, "committed events folded");
        }
        Ok(outcome)
    }

    fn notify(&mut self, command: &Command, committed: &CommittedEvent, source: SourceType) {
        let is_from_current_actor = command.actor == self.actor;
        if let Some(hook) = self.on_committed.as_mut() {
            hook(&CommittedNotice { command, committed, source, is_from_current_actor });
        }
    }

    // ── Pass-throughs ───────────────────────────────────────────────

    /// Requests catch-up. Without an explicit cursor, resumes after the last folded event.
    pub async fn sync_now(&mut self, options: SyncOptions) -> Result<(), CollabError> {
        let options = SyncOptions { since_committed_id: options.since_committed_id.or(self.cursor) };
        self.broker.sync_now(options).instrument(info_span!("collab.sync_now")).await?;
        Ok(())
    }

    pub async fn flush_drafts(&mut self) -> Result<(), CollabError> {
        self.broker.flush_drafts().instrument(info_span!("collab.flush_drafts")).await?;
        Ok(())
    }
}

/// Uniform sample in `[0, 1)` for backoff jitter.
fn jitter_sample() -> f64 {
    const MANTISSA: u32 = 53;
    let bits = uuid::Uuid::new_v4().as_u128() & ((1u128 << MANTISSA) - 1);
    bits as f64 / (1u64 << MANTISSA) as f64
}
