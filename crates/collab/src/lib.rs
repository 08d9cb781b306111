// scenecraft-collab: client-side projection and broker session for a project

pub mod broker;
pub mod config;
pub mod service;

pub use broker::{BrokerError, SessionOptions, SyncBroker};
pub use config::{CollabConfig, ConfigError, ReconnectConfig};
pub use service::{
    CollabError, CollabService, CommittedNotice, FoldOutcome, LastError, ServiceStatus, SourceType,
};
