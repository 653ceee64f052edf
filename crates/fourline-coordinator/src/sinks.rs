//! Outbound collaborators: the finished-game recorder and the event log.
//!
//! The coordinator never calls a collaborator directly. It drops a value
//! into a bounded channel ([`RecorderHandle::submit`],
//! [`PublisherHandle::publish`]) and a background task spawned by
//! [`spawn_recorder`] / [`spawn_publisher`] does the slow part. Failures on
//! either side are logged and swallowed.

use std::future::Future;
use std::time::Duration;

use fourline_protocol::{Identity, SessionId};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// One completed round, as handed to a [`GameRecorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedGame {
    pub session_id: SessionId,
    pub player_one: Identity,
    pub player_two: Identity,
    /// `None` for a draw.
    pub winner: Option<Identity>,
    pub moves: u32,
    pub duration: Duration,
}

impl FinishedGame {
    /// Round length in whole milliseconds, saturating at `u64::MAX`.
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}

/// A `(topic, key, payload)` record for the event log.
#[derive(Debug, Clone, PartialEq)]
pub struct GameEvent {
    pub topic: String,
    pub key: String,
    pub payload: serde_json::Value,
}

/// Errors a collaborator can report. They are only ever logged.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The backing service can't be reached.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// The backing service refused or failed the write.
    #[error("sink write failed: {0}")]
    Write(#[source] Box<dyn std::error::Error + Send + Sync>),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Persists finished games.
pub trait GameRecorder: Send + Sync + 'static {
    fn record(&self, game: &FinishedGame) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Ships game events to an external log.
pub trait EventPublisher: Send + Sync + 'static {
    fn publish(&self, event: &GameEvent) -> impl Future<Output = Result<(), SinkError>> + Send;
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Cheap, cloneable front door to a spawned recorder task.
#[derive(Debug, Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<FinishedGame>,
}

impl RecorderHandle {
    /// Queues `game` for recording. Never waits.
    pub fn submit(&self, game: FinishedGame) {
        if let Err(e) = self.tx.try_send(game) {
            tracing::warn!(error = %e, "finished game not queued for recording");
        }
    }
}

/// Cheap, cloneable front door to a spawned publisher task.
#[derive(Debug, Clone)]
pub struct PublisherHandle {
    tx: mpsc::Sender<GameEvent>,
}

impl PublisherHandle {
    /// Queues `event` for publishing. Never waits.
    pub fn publish(&self, event: GameEvent) {
        if let Err(e) = self.tx.try_send(event) {
            tracing::warn!(error = %e, "game event not queued for publishing");
        }
    }
}

/// Runs `recorder` on a background task fed by a channel of `capacity`.
///
/// The task ends once every handle has been dropped.
pub fn spawn_recorder<R: GameRecorder>(recorder: R, capacity: usize) -> RecorderHandle {
    let (tx, mut rx) = mpsc::channel::<FinishedGame>(capacity);
    tokio::spawn(async move {
        while let Some(game) = rx.recv().await {
            if let Err(e) = recorder.record(&game).await {
                tracing::warn!(
                    session_id = %game.session_id,
                    error = %e,
                    "failed to record finished game"
                );
            }
        }
        tracing::debug!("recorder stopped");
    });
    RecorderHandle { tx }
}

/// Runs `publisher` on a background task fed by a channel of `capacity`.
pub fn spawn_publisher<P: EventPublisher>(publisher: P, capacity: usize) -> PublisherHandle {
    let (tx, mut rx) = mpsc::channel::<GameEvent>(capacity);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = publisher.publish(&event).await {
                tracing::warn!(
                    topic = %event.topic,
                    key = %event.key,
                    error = %e,
                    "failed to publish game event"
                );
            }
        }
        tracing::debug!("publisher stopped");
    });
    PublisherHandle { tx }
}

// ---------------------------------------------------------------------------
// Logging implementations
// ---------------------------------------------------------------------------

/// Records finished games to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRecorder;

impl GameRecorder for LogRecorder {
    async fn record(&self, game: &FinishedGame) -> Result<(), SinkError> {
        tracing::info!(
            session_id = %game.session_id,
            player_one = %game.player_one,
            player_two = %game.player_two,
            winner = game.winner.as_ref().map_or("draw", Identity::as_str),
            moves = game.moves,
            duration_ms = game.duration_ms(),
            "game finished"
        );
        Ok(())
    }
}

/// Writes every game event to the log at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &GameEvent) -> Result<(), SinkError> {
        tracing::info!(
            topic = %event.topic,
            key = %event.key,
            payload = %event.payload,
            "game event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct Collecting(Arc<Mutex<Vec<FinishedGame>>>);

    impl GameRecorder for Collecting {
        async fn record(&self, game: &FinishedGame) -> Result<(), SinkError> {
            self.0.lock().await.push(game.clone());
            Ok(())
        }
    }

    struct Failing;

    impl EventPublisher for Failing {
        async fn publish(&self, _event: &GameEvent) -> Result<(), SinkError> {
            Err(SinkError::Unavailable("broker down".into()))
        }
    }

    fn game() -> FinishedGame {
        FinishedGame {
            session_id: SessionId::new("s1"),
            player_one: Identity::new("alice"),
            player_two: Identity::new("bob"),
            winner: Some(Identity::new("alice")),
            moves: 7,
            duration: Duration::from_secs(3),
        }
    }

    #[tokio::test]
    async fn test_spawn_recorder_delivers_submitted_games() {
        let sink = Collecting::default();
        let handle = spawn_recorder(sink.clone(), 4);

        handle.submit(game());
        drop(handle);

        // Give the background task a chance to drain.
        for _ in 0..10 {
            if !sink.0.lock().await.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(sink.0.lock().await.as_slice(), &[game()]);
    }

    #[tokio::test]
    async fn test_spawn_publisher_survives_publish_failure() {
        let handle = spawn_publisher(Failing, 4);
        let event = GameEvent {
            topic: "game-events".into(),
            key: "s1".into(),
            payload: serde_json::json!({"type": "move"}),
        };

        handle.publish(event.clone());
        tokio::task::yield_now().await;
        // Still accepting after a failure.
        handle.publish(event);
    }

    #[tokio::test]
    async fn test_log_recorder_always_succeeds() {
        assert!(LogRecorder.record(&game()).await.is_ok());
    }

    #[tokio::test]
    async fn test_log_recorder_handles_maximum_duration() {
        let mut game = game();
        game.duration = Duration::MAX;
        assert!(LogRecorder.record(&game).await.is_ok());
    }

    #[test]
    fn test_duration_ms_converts_and_saturates() {
        let mut game = game();
        game.duration = Duration::from_millis(1_500);
        assert_eq!(game.duration_ms(), 1_500);

        game.duration = Duration::MAX;
        assert_eq!(game.duration_ms(), u64::MAX);
    }
}
