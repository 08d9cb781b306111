// Client collaboration settings, stored as TOML at a host-chosen path.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use scenecraft_common::domain::Actor;
use scenecraft_common::protocol::{dedupe_partitions, project_partitions};

// ── Collab config ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollabConfig {
    pub project: ProjectConfig,
    pub actor: ActorConfig,
    /// Subscribed partitions. Empty means every scope of the project.
    pub partitions: Vec<String>,
    pub reconnect: ReconnectConfig,
}

impl CollabConfig {
    pub fn new(project_id: impl Into<String>, user_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            project: ProjectConfig { id: project_id.into(), ..ProjectConfig::default() },
            actor: ActorConfig { user_id: user_id.into(), client_id: client_id.into() },
            ..Self::default()
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    pub fn actor(&self) -> Actor {
        Actor::new(&self.actor.user_id, &self.actor.client_id)
    }

    pub fn subscribed_partitions(&self) -> Vec<String> {
        if self.partitions.is_empty() {
            return project_partitions(&self.project.id);
        }
        dedupe_partitions(self.partitions.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActorConfig {
    pub user_id: String,
    pub client_id: String,
}

/// Backoff for broker reconnects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
    /// Fraction of the delay randomized in either direction (0.0..=1.0).
    pub jitter: f64,
    pub handshake_timeout_ms: u64,
    /// Session start attempts before giving up. Unset retries forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            factor: 2.0,
            jitter: 0.2,
            handshake_timeout_ms: 5_000,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Whether another start may follow failed attempt `attempt` (0-based).
    pub fn allows_retry(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt.saturating_add(1) < max,
            None => true,
        }
    }

    /// Delay before reconnect attempt `attempt` (0-based). `sample` is a
    /// uniform draw in `[0, 1)` supplied by the caller's RNG.
    pub fn delay_for(&self, attempt: u32, sample: f64) -> Duration {
        let exp = attempt.min(16) as i32;
        let base = (self.initial_delay_ms as f64 * self.factor.max(1.0).powi(exp)).min(self.max_delay_ms as f64);
        let jitter = self.jitter.clamp(0.0, 1.0);
        let spread = base * jitter * (sample.clamp(0.0, 1.0) * 2.0 - 1.0);
        let millis = (base + spread).clamp(0.0, self.max_delay_ms as f64);
        Duration::from_millis(millis.round() as u64)
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let cfg = CollabConfig::default();
        assert!(cfg.project.id.is_empty());
        assert!(cfg.partitions.is_empty());
        assert_eq!(cfg.reconnect.initial_delay_ms, 200);
        assert_eq!(cfg.reconnect.max_delay_ms, 5_000);
        assert_eq!(cfg.reconnect.factor, 2.0);
        assert_eq!(cfg.reconnect.jitter, 0.2);
        assert_eq!(cfg.reconnect.handshake_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("collab.toml");

        let mut cfg = CollabConfig::new("p1", "alice", "laptop");
        cfg.project.name = Some("Pilot".into());
        cfg.partitions = vec!["project:p1:story".into()];
        cfg.reconnect.max_delay_ms = 9_000;
        cfg.save_to(&path).unwrap();

        let loaded = CollabConfig::load_from(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn parse_partial_toml_uses_defaults() {
        let toml_str = r#"
partitions = ["project:p9:story", "project:p9:story"]

[project]
id = "p9"

[actor]
user_id = "bob"
client_id = "tablet"

[reconnect]
jitter = 0.0
"#;
        let cfg: CollabConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.actor(), Actor::new("bob", "tablet"));
        assert_eq!(cfg.subscribed_partitions(), vec!["project:p9:story"]);
        assert_eq!(cfg.reconnect.jitter, 0.0);
        assert_eq!(cfg.reconnect.initial_delay_ms, 200); // default
    }

    #[test]
    fn empty_partitions_subscribe_to_every_scope() {
        let cfg = CollabConfig::new("p1", "u", "c");
        assert_eq!(cfg.subscribed_partitions().len(), 4);
        assert!(cfg.subscribed_partitions().contains(&"project:p1:settings".to_string()));
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = CollabConfig::load_from(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("collab.toml");
        std::fs::write(&path, "partitions = 7").unwrap();
        assert!(matches!(CollabConfig::load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = ReconnectConfig { jitter: 0.0, ..ReconnectConfig::default() };
        assert_eq!(policy.delay_for(0, 0.5), Duration::from_millis(200));
        assert_eq!(policy.delay_for(1, 0.5), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3, 0.5), Duration::from_millis(1_600));
        assert_eq!(policy.delay_for(10, 0.5), Duration::from_millis(5_000));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = ReconnectConfig::default();
        assert_eq!(policy.delay_for(0, 0.0), Duration::from_millis(160));
        assert_eq!(policy.delay_for(0, 1.0), Duration::from_millis(240));
        assert_eq!(policy.delay_for(20, 1.0), Duration::from_millis(5_000));
    }

    #[test]
    fn attempt_budget() {
        let unlimited = ReconnectConfig::default();
        assert!(unlimited.allows_retry(1_000));

        let bounded = ReconnectConfig { max_attempts: Some(3), ..ReconnectConfig::default() };
        assert!(bounded.allows_retry(0));
        assert!(bounded.allows_retry(1));
        assert!(!bounded.allows_retry(2));

        let cfg: CollabConfig = toml::from_str("[reconnect]\nmax_attempts = 4\n").unwrap();
        assert_eq!(cfg.reconnect.max_attempts, Some(4));
    }
}
