// Relay configuration.
//
// Centralizes environment variable parsing with defaults for local
// development and tests.

pub const DEFAULT_SYNC_PAGE_LIMIT: usize = 500;
pub const DEFAULT_MAX_EVENT_BYTES: usize = 256 * 1024;

/// Core relay configuration.
///
/// Constructed via [`RelayConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Maximum committed events per `sync_page`.
    pub sync_page_limit: usize,
    /// Largest accepted serialized event, in bytes.
    pub max_event_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            sync_page_limit: DEFAULT_SYNC_PAGE_LIMIT,
            max_event_bytes: DEFAULT_MAX_EVENT_BYTES,
        }
    }
}

impl RelayConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `SCENECRAFT_RELAY_SYNC_PAGE_LIMIT` | `500` |
    /// | `SCENECRAFT_RELAY_MAX_EVENT_BYTES` | `262144` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let positive = |key: &str, default: usize| {
            env(key)
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };

        let sync_page_limit = positive("SCENECRAFT_RELAY_SYNC_PAGE_LIMIT", DEFAULT_SYNC_PAGE_LIMIT);
        let max_event_bytes = positive("SCENECRAFT_RELAY_MAX_EVENT_BYTES", DEFAULT_MAX_EVENT_BYTES);
        Self { sync_page_limit, max_event_bytes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from_map(
        map: HashMap<&'static str, &'static str>,
    ) -> impl Fn(&str) -> Result<String, std::env::VarError> {
        move |key: &str| map.get(key).map(|v| v.to_string()).ok_or(std::env::VarError::NotPresent)
    }

    #[test]
    fn defaults_when_no_env_vars() {
        let cfg = RelayConfig::from_env_fn(env_from_map(HashMap::new()));
        assert_eq!(cfg, RelayConfig::default());
        assert_eq!(cfg.sync_page_limit, 500);
        assert_eq!(cfg.max_event_bytes, 262_144);
    }

    #[test]
    fn overrides() {
        let mut m = HashMap::new();
        m.insert("SCENECRAFT_RELAY_SYNC_PAGE_LIMIT", "25");
        m.insert("SCENECRAFT_RELAY_MAX_EVENT_BYTES", "1024");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.sync_page_limit, 25);
        assert_eq!(cfg.max_event_bytes, 1024);
    }

    #[test]
    fn invalid_numbers_use_defaults() {
        let mut m = HashMap::new();
        m.insert("SCENECRAFT_RELAY_SYNC_PAGE_LIMIT", "lots");
        m.insert("SCENECRAFT_RELAY_MAX_EVENT_BYTES", "0");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.sync_page_limit, DEFAULT_SYNC_PAGE_LIMIT);
        assert_eq!(cfg.max_event_bytes, DEFAULT_MAX_EVENT_BYTES);
    }
}
