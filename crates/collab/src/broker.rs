// Client side of the sync broker.
//
// The collaboration service talks to the broker only through `SyncBroker`,
// so a socket transport and the in-memory relay client are interchangeable.

use scenecraft_common::domain::Actor;
use scenecraft_common::protocol::{SubmitRequest, SyncOptions};

/// What a session subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub project_id: String,
    pub partitions: Vec<String>,
    pub actor: Actor,
    /// Resume catch-up after this committed id.
    pub since_committed_id: Option<u64>,
    /// Wire protocol this client speaks. Brokers refuse sessions they cannot serve.
    pub protocol_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// The broker is unreachable. Submissions may be retried by the client queue.
    #[error("transport disconnected: {0}")]
    TransportDisconnected(String),
    #[error("broker rejected request: {reason}: {message}")]
    Rejected { reason: String, message: String },
    #[error("broker error: {0}")]
    Other(String),
}

impl BrokerError {
    pub fn code(&self) -> &str {
        match self {
            Self::TransportDisconnected(_) => "transport_disconnected",
            Self::Rejected { reason, .. } => reason,
            Self::Other(_) => "broker_error",
        }
    }
}

/// Abstraction over the broker connection. Trait-based for testability.
///
/// Every method is idempotent with respect to its target state: starting a
/// started session or flushing an empty queue succeeds without effect.
pub trait SyncBroker: Send + Sync + 'static {
    fn start(
        &self,
        options: &SessionOptions,
    ) -> impl std::future::Future<Output = Result<(), BrokerError>> + Send;

    fn stop(&self) -> impl std::future::Future<Output = Result<(), BrokerError>> + Send;

    /// Publish one event under its partitions.
    fn submit_event(
        &self,
        request: SubmitRequest,
    ) -> impl std::future::Future<Output = Result<(), BrokerError>> + Send;

    /// Ask for a catch-up cycle. Pages arrive as `sync_page` messages.
    fn sync_now(
        &self,
        options: SyncOptions,
    ) -> impl std::future::Future<Output = Result<(), BrokerError>> + Send;

    /// Send anything queued while offline.
    fn flush_drafts(&self) -> impl std::future::Future<Output = Result<(), BrokerError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(BrokerError::TransportDisconnected("down".into()).code(), "transport_disconnected");
        assert_eq!(
            BrokerError::Rejected { reason: "too_large".into(), message: "no".into() }.code(),
            "too_large"
        );
        assert_eq!(BrokerError::Other("x".into()).to_string(), "broker error: x");
    }
}
