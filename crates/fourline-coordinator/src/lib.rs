//! Session coordination for fourline.
//!
//! The [`Coordinator`] is the single authority over matchmaking and every
//! live session. Connection handlers hand it an identity plus a
//! [`DeliveryChannel`] and then forward requests; it answers by pushing
//! [`ServerEvent`](fourline_protocol::ServerEvent)s into the channels of
//! the affected participants.
//!
//! # Concurrency
//!
//! All coordinator state sits behind one `tokio::sync::Mutex`. Matchmaking
//! and rematches touch the queue, the indices, and a session together, so
//! there are no per-session locks. Nothing awaits while the lock is held:
//! outbound events go through `try_send`.
//!
//! Two kinds of work are deferred to spawned tasks: the wait-queue timeout
//! that pairs a lone player with the automated opponent, and the automated
//! opponent's reply move. Both sleep, then re-enter through the same locked
//! paths as a human request and re-check that the world still looks the way
//! it did when they were scheduled.
//!
//! # Collaborators
//!
//! Finished games and game events leave through [`RecorderHandle`] and
//! [`PublisherHandle`]. Both are fire-and-forget: a full or missing sink is
//! logged and never slows a move down.

mod config;
mod coordinator;
mod delivery;
mod sinks;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use delivery::{Delivery, DeliveryChannel, DeliveryReceiver, OverflowPolicy, delivery_channel};
pub use sinks::{
    EventPublisher, FinishedGame, GameEvent, GameRecorder, LogPublisher, LogRecorder,
    PublisherHandle, RecorderHandle, SinkError, spawn_publisher, spawn_recorder,
};
