//! Coordinator timing and event-log settings.

use std::time::Duration;

/// How the coordinator schedules the automated opponent and labels the
/// events it publishes.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long a lone player waits in the queue before being paired with
    /// the automated opponent.
    pub bot_timeout: Duration,

    /// Pause before the automated opponent answers a move.
    pub bot_move_delay: Duration,

    /// Topic stamped on every published [`GameEvent`](crate::GameEvent).
    pub event_topic: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bot_timeout: Duration::from_secs(10),
            bot_move_delay: Duration::from_millis(400),
            event_topic: "game-events".to_owned(),
        }
    }
}
