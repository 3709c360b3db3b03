//! Presence tuning knobs.

use serde::{Deserialize, Serialize};

/// Thresholds used to judge heartbeat records.
///
/// All values are milliseconds. The defaults assume clients heartbeat
/// every 5 seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresenceConfig {
    /// How far in the future a timestamp may be before it is rejected
    /// as clock-skewed.
    pub max_clock_skew_ms: i64,

    /// How old a timestamp may be before the connection counts as gone.
    pub stale_ms: i64,

    /// How recent a timestamp must be to count as "fresh". Fresh signals
    /// set `has_fresh` and lift a participant out of quarantine.
    pub accept_fresh_ms: i64,

    /// How long a participant who drops out of the online set is kept in
    /// the stable set before the disconnect is believed.
    pub grace_ms: i64,

    /// Return the included/considered id lists with every summary.
    pub debug: bool,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            max_clock_skew_ms: 10_000,
            stale_ms: 45_000,
            accept_fresh_ms: 20_000,
            grace_ms: 5_000,
            debug: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_config_default() {
        let config = PresenceConfig::default();
        assert_eq!(config.max_clock_skew_ms, 10_000);
        assert!(config.accept_fresh_ms < config.stale_ms);
        assert!(!config.debug);
    }

    #[test]
    fn test_presence_config_partial_json_uses_defaults() {
        let config: PresenceConfig = serde_json::from_str(r#"{"graceMs":9000}"#).unwrap();
        assert_eq!(config.grace_ms, 9_000);
        assert_eq!(config.stale_ms, PresenceConfig::default().stale_ms);
    }
}
