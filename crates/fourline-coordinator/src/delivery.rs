//! Per-connection outbound event channels.
//!
//! The coordinator holds a [`DeliveryChannel`] for every joined identity and
//! pushes events into it with `try_send`, so a stalled client can never
//! hold the coordinator lock hostage. The connection's writer task drains
//! the matching [`DeliveryReceiver`] into the socket.
//!
//! When the buffer is full the channel's [`OverflowPolicy`] decides:
//!
//! - `Disconnect` (default): drop the event and signal the writer to close
//!   the socket. The client never sees a gap; it sees the connection end,
//!   and the normal disconnect path cleans up.
//! - `Drop`: drop the event, log it, and carry on.

use std::sync::Arc;

use fourline_protocol::ServerEvent;
use fourline_transport::ConnectionId;
use serde::Deserialize;
use tokio::sync::{Notify, mpsc};
use tokio::sync::mpsc::error::TrySendError;

/// What to do with an event that doesn't fit in a full channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    #[default]
    Disconnect,
    Drop,
}

/// Result of a single [`DeliveryChannel::deliver`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Buffered for the writer.
    Queued,
    /// Buffer full; the event was discarded under [`OverflowPolicy::Drop`].
    Dropped,
    /// Buffer full; the event was discarded and the connection told to
    /// close under [`OverflowPolicy::Disconnect`].
    Overflowed,
    /// The receiver is gone: the connection already ended.
    Closed,
}

/// Sending half, held by the coordinator (and by the connection handler for
/// its own error replies).
#[derive(Debug, Clone)]
pub struct DeliveryChannel {
    connection: ConnectionId,
    tx: mpsc::Sender<ServerEvent>,
    policy: OverflowPolicy,
    overflow: Arc<Notify>,
}

/// Receiving half, owned by the connection's writer task.
#[derive(Debug)]
pub struct DeliveryReceiver {
    rx: mpsc::Receiver<ServerEvent>,
    overflow: Arc<Notify>,
}

/// Creates a bounded delivery channel for `connection`.
///
/// # Panics
/// If `capacity` is 0 (`tokio::sync::mpsc::channel` requires a positive
/// bound). Server configuration rejects that value before it gets here.
pub fn delivery_channel(
    connection: ConnectionId,
    capacity: usize,
    policy: OverflowPolicy,
) -> (DeliveryChannel, DeliveryReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let overflow = Arc::new(Notify::new());
    (
        DeliveryChannel {
            connection,
            tx,
            policy,
            overflow: Arc::clone(&overflow),
        },
        DeliveryReceiver { rx, overflow },
    )
}

impl DeliveryChannel {
    /// The connection this channel writes to.
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Enqueues `event` without waiting.
    pub fn deliver(&self, event: ServerEvent) -> Delivery {
        match self.tx.try_send(event) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(dropped)) => match self.policy {
                OverflowPolicy::Drop => {
                    tracing::warn!(
                        connection = %self.connection,
                        event = dropped.kind(),
                        "delivery channel full, dropping event"
                    );
                    Delivery::Dropped
                }
                OverflowPolicy::Disconnect => {
                    tracing::warn!(
                        connection = %self.connection,
                        event = dropped.kind(),
                        "delivery channel full, disconnecting slow client"
                    );
                    // `notify_one` stores a permit if the writer isn't
                    // waiting yet, so the signal can't be missed.
                    self.overflow.notify_one();
                    Delivery::Overflowed
                }
            },
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(connection = %self.connection, "delivery channel closed");
                Delivery::Closed
            }
        }
    }
}

impl DeliveryReceiver {
    /// Waits for the next event.
    ///
    /// Returns `None` once every sender is gone, or as soon as an overflow
    /// under [`OverflowPolicy::Disconnect`] has been signalled. Either way
    /// the writer should close the connection.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        tokio::select! {
            biased;
            () = self.overflow.notified() => None,
            event = self.rx.recv() => event,
        }
    }

    /// Completes once an overflow under [`OverflowPolicy::Disconnect`] has
    /// been signalled. Lets a writer stuck in a socket send give up.
    pub async fn overflowed(&self) {
        self.overflow.notified().await;
    }

    /// Takes an already-buffered event, if any. Never waits.
    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        self.rx.try_recv().ok()
    }
}
