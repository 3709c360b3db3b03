//! Command processor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CommandConfig
// ---------------------------------------------------------------------------

/// Knobs for the mutation path.
///
/// The defaults are the values the engine is tuned for. Override single
/// fields with struct-update syntax:
///
/// ```
/// use huddle_room::CommandConfig;
///
/// let config = CommandConfig {
///     rate_limit_ms: 0,
///     ..CommandConfig::default()
/// };
/// assert_eq!(config.lock_ttl_ms, 8_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandConfig {
    /// How long a lock lease is trusted after its last write.
    ///
    /// A handler that crashes while holding the lock wedges the room for
    /// at most this long.
    pub lock_ttl_ms: i64,

    /// How many times to try the lock before answering `busy`.
    pub lock_retry_attempts: u32,

    /// Pause between lock attempts.
    pub lock_retry_delay: Duration,

    /// Minimum spacing between two rate-limited commands (`deal`,
    /// `next_round`) on the same room.
    pub rate_limit_ms: i64,

    /// Seats required to open a round.
    pub min_players: usize,

    /// Seats available in a room.
    pub max_players: usize,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            lock_ttl_ms: 8_000,
            lock_retry_attempts: 5,
            lock_retry_delay: Duration::from_millis(40),
            rate_limit_ms: 1_500,
            min_players: 2,
            max_players: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_config_default() {
        let config = CommandConfig::default();
        assert_eq!(config.lock_ttl_ms, 8_000);
        assert_eq!(config.lock_retry_attempts, 5);
        assert_eq!(config.rate_limit_ms, 1_500);
        assert_eq!(config.max_players, 20);
    }
}
