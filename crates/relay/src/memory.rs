// In-process relay: authoritative sequencer, committed log and fan-out.
//
// Plays the broker for embedding hosts and tests. Every accepted event gets
// the next committed id, is appended to the log and is broadcast to every
// connected client subscribed to one of its partitions, the submitter
// included.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use scenecraft_collab::{BrokerError, SessionOptions, SyncBroker};
use scenecraft_common::domain::model::now_ms;
use scenecraft_common::domain::{ProjectState, PROTOCOL_VERSION};
use scenecraft_common::protocol::{
    partition_matches, BrokerMessage, CommittedEvent, Rejection, SubmitRequest, SyncOptions, SyncPage,
};

use crate::config::RelayConfig;
use crate::registry::{ProjectRegistry, SubmittedItem};

pub const EVENT_TOO_LARGE: &str = "event_too_large";

pub type ClientId = u64;

#[derive(Debug)]
struct ClientSlot {
    sender: mpsc::UnboundedSender<BrokerMessage>,
    /// `None` until the session starts.
    subscriptions: Option<Vec<String>>,
    connected: bool,
}

impl ClientSlot {
    fn wants(&self, partitions: &[String]) -> bool {
        let Some(subscriptions) = self.subscriptions.as_ref() else {
            return false;
        };
        self.connected
            && partitions
                .iter()
                .any(|partition| subscriptions.iter().any(|sub| partition_matches(sub, partition)))
    }
}

#[derive(Debug)]
struct RelayState {
    config: RelayConfig,
    registry: ProjectRegistry,
    log: Vec<CommittedEvent>,
    /// Command ids already committed, to absorb client retries.
    committed_commands: HashSet<String>,
    next_committed_id: u64,
    clients: HashMap<ClientId, ClientSlot>,
    next_client: ClientId,
}

impl RelayState {
    fn page(&self, partitions: &[String], since: Option<u64>) -> SyncPage {
        let after = since.unwrap_or(0);
        let limit = self.config.sync_page_limit.max(1);
        let mut matching = self.log.iter().filter(|event| {
            event.committed_id.unwrap_or(0) > after
                && event
                    .partitions
                    .iter()
                    .any(|partition| partitions.iter().any(|sub| partition_matches(sub, partition)))
        });
        let events: Vec<CommittedEvent> = matching.by_ref().take(limit).cloned().collect();
        let has_more = matching.next().is_some();
        let next_cursor = events.last().and_then(|event| event.committed_id).or(since);
        SyncPage { events, next_cursor, has_more }
    }

    fn send(&self, client: ClientId, message: BrokerMessage) {
        if let Some(slot) = self.clients.get(&client) {
            // A dropped receiver only means that client went away.
            let _ = slot.sender.send(message);
        }
    }
}

/// Result of a submission as seen by the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Committed(u64),
    /// The command id was committed before; nothing new was logged.
    Duplicate,
    Rejected(Rejection),
}

/// Shared handle; clones talk to the same log.
#[derive(Debug, Clone)]
pub struct InMemoryRelay {
    inner: Arc<Mutex<RelayState>>,
}

impl InMemoryRelay {
    pub fn new(config: RelayConfig, registry: ProjectRegistry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RelayState {
                config,
                registry,
                log: Vec::new(),
                committed_commands: HashSet::new(),
                next_committed_id: 1,
                clients: HashMap::new(),
                next_client: 1,
            })),
        }
    }

    /// Registers a client and returns it with the receiving end of its channel.
    pub async fn connect(&self) -> (RelayClient, mpsc::UnboundedReceiver<BrokerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.inner.lock().await;
        let id = state.next_client;
        state.next_client += 1;
        state
            .clients
            .insert(id, ClientSlot { sender: sender.clone(), subscriptions: None, connected: true });
        debug!(client = id, "relay client connected");

        let client = RelayClient {
            relay: self.clone(),
            id,
            sender,
            online: Arc::new(AtomicBool::new(true)),
            drafts: Arc::new(Mutex::new(VecDeque::new())),
        };
        (client, receiver)
    }

    /// Sequences one submission on behalf of `client`.
    pub async fn submit(&self, client: ClientId, request: SubmitRequest) -> SubmitOutcome {
        let span = info_span!("relay.memory.submit", client, command_id = %request.event.payload.command_id);
        async move {
            let mut state = self.inner.lock().await;
            let command_id = request.event.payload.command_id.clone();

            if !command_id.is_empty() && state.committed_commands.contains(&command_id) {
                debug!(command_id = %command_id, "duplicate submission absorbed");
                return SubmitOutcome::Duplicate;
            }

            let size = serde_json::to_vec(&request.event).map(|bytes| bytes.len()).unwrap_or(usize::MAX);
            if size > state.config.max_event_bytes {
                let rejection = Rejection {
                    reason: Some(EVENT_TOO_LARGE.to_string()),
                    command_id: Some(command_id),
                    event_id: None,
                    message: Some(format!("event exceeds {} bytes", state.config.max_event_bytes)),
                    details: Some(json!({ "size": size, "limit": state.config.max_event_bytes })),
                };
                state.send(client, BrokerMessage::Rejected(rejection.clone()));
                return SubmitOutcome::Rejected(rejection);
            }

            let item = SubmittedItem::from(request);
            if let Err(rejection) = state.registry.validate_item(&item) {
                state.send(client, BrokerMessage::Rejected(rejection.clone()));
                return SubmitOutcome::Rejected(rejection);
            }

            let committed_id = state.next_committed_id;
            state.next_committed_id += 1;
            let committed = CommittedEvent {
                id: Uuid::new_v4().to_string(),
                committed_id: Some(committed_id),
                partitions: item.partitions,
                event: item.event,
                server_ts: Some(now_ms()),
            };
            if !command_id.is_empty() {
                state.committed_commands.insert(command_id);
            }

            let recipients: Vec<ClientId> = state
                .clients
                .iter()
                .filter(|(_, slot)| slot.wants(&committed.partitions))
                .map(|(id, _)| *id)
                .collect();
            for recipient in &recipients {
                state.send(*recipient, BrokerMessage::Broadcast(committed.clone()));
            }
            info!(committed_id, recipients = recipients.len(), "event committed");
            state.log.push(committed);
            SubmitOutcome::Committed(committed_id)
        }
        .instrument(span)
        .await
    }

    /// One catch-up page of events after `since` under `partitions`.
    pub async fn sync_page(&self, partitions: &[String], since: Option<u64>) -> SyncPage {
        self.inner.lock().await.page(partitions, since)
    }

    pub async fn log(&self) -> Vec<CommittedEvent> {
        self.inner.lock().await.log.clone()
    }

    pub async fn projection(&self, project_id: &str) -> Option<ProjectState> {
        self.inner.lock().await.registry.get(project_id).cloned()
    }

    async fn subscribe(&self, client: ClientId, partitions: Vec<String>) {
        if let Some(slot) = self.inner.lock().await.clients.get_mut(&client) {
            slot.subscriptions = Some(partitions);
        }
    }

    async fn unsubscribe(&self, client: ClientId) {
        if let Some(slot) = self.inner.lock().await.clients.get_mut(&client) {
            slot.subscriptions = None;
        }
    }

    async fn set_connected(&self, client: ClientId, connected: bool) {
        if let Some(slot) = self.inner.lock().await.clients.get_mut(&client) {
            slot.connected = connected;
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Broker handle for one client of an [`InMemoryRelay`].
///
/// Offline clients miss broadcasts and queue their submissions as drafts
/// until `flush_drafts`.
#[derive(Debug, Clone)]
pub struct RelayClient {
    relay: InMemoryRelay,
    id: ClientId,
    sender: mpsc::UnboundedSender<BrokerMessage>,
    online: Arc<AtomicBool>,
    drafts: Arc<Mutex<VecDeque<SubmitRequest>>>,
}

impl RelayClient {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub async fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        self.relay.set_connected(self.id, online).await;
        info!(client = self.id, online, "relay client connectivity changed");
    }

    pub async fn pending_drafts(&self) -> usize {
        self.drafts.lock().await.len()
    }

    fn offline_error(&self) -> BrokerError {
        BrokerError::TransportDisconnected(format!("relay client {} is offline", self.id))
    }

    async fn catch_up(&self, partitions: &[String], since: Option<u64>) {
        let mut cursor = since;
        loop {
            let page = self.relay.sync_page(partitions, cursor).await;
            let has_more = page.has_more;
            cursor = page.next_cursor;
            // A dropped receiver only means the client went away.
            let _ = self.sender.send(BrokerMessage::SyncPage(page));
            if !has_more {
                break;
            }
        }
    }

    async fn subscriptions(&self) -> Vec<String> {
        let state = self.relay.inner.lock().await;
        state
            .clients
            .get(&self.id)
            .and_then(|slot| slot.subscriptions.clone())
            .unwrap_or_default()
    }
}

impl SyncBroker for RelayClient {
    async fn start(&self, options: &SessionOptions) -> Result<(), BrokerError> {
        if !self.is_online() {
            return Err(self.offline_error());
        }
        if options.protocol_version != PROTOCOL_VERSION {
            return Err(BrokerError::Rejected {
                reason: "protocol_mismatch".into(),
                message: format!(
                    "client speaks protocol {}, relay speaks {PROTOCOL_VERSION}",
                    options.protocol_version
                ),
            });
        }
        self.relay.subscribe(self.id, options.partitions.clone()).await;
        self.catch_up(&options.partitions, options.since_committed_id).await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        self.relay.unsubscribe(self.id).await;
        Ok(())
    }

    async fn submit_event(&self, request: SubmitRequest) -> Result<(), BrokerError> {
        if !self.is_online() {
            self.drafts.lock().await.push_back(request);
            return Err(self.offline_error());
        }
        // Rejections reach the client as `rejected` messages.
        self.relay.submit(self.id, request).await;
        Ok(())
    }

    async fn sync_now(&self, options: SyncOptions) -> Result<(), BrokerError> {
        if !self.is_online() {
            return Err(self.offline_error());
        }
        let partitions = self.subscriptions().await;
        if partitions.is_empty() {
            return Ok(());
        }
        self.catch_up(&partitions, options.since_committed_id).await;
        Ok(())
    }

    async fn flush_drafts(&self) -> Result<(), BrokerError> {
        if !self.is_online() {
            return Err(self.offline_error());
        }
        let drafts: Vec<SubmitRequest> = self.drafts.lock().await.drain(..).collect();
        if !drafts.is_empty() {
            debug!(client = self.id, count = drafts.len(), "flushing drafts");
        }
        for request in drafts {
            self.relay.submit(self.id, request).await;
        }
        Ok(())
    }
}
