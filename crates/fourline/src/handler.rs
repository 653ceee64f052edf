//! Per-connection handler: decode requests, route them, write events back.
//!
//! Each accepted connection gets its own Tokio task running this handler,
//! plus a writer task that drains the connection's delivery channel into
//! the socket. The flow is:
//!   1. Create the delivery channel and spawn the writer
//!   2. Loop: receive frames → decode → dispatch to the coordinator
//!   3. On close (by the peer, or by the writer after an overflow) tell the
//!      coordinator the identity is gone

use std::sync::Arc;

use fourline_coordinator::{DeliveryChannel, DeliveryReceiver, delivery_channel};
use fourline_protocol::{ClientRequest, Codec, Identity, ServerEvent};
use fourline_session::RequestError;
use fourline_transport::{Connection, TransportError};

use crate::FourlineError;
use crate::server::ServerState;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<T, C>(
    conn: T,
    state: Arc<ServerState<C>>,
) -> Result<(), FourlineError>
where
    T: Connection<Error = TransportError>,
    C: Codec,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let (channel, events) = delivery_channel(conn_id, state.delivery_capacity, state.overflow);
    let mut writer = tokio::spawn(write_events(Arc::clone(&conn), events, Arc::clone(&state)));

    // Set by the first successful join; requests before that are refused.
    let mut identity: Option<Identity> = None;
    let mut result = Ok(());

    loop {
        let data = tokio::select! {
            received = conn.recv() => match received {
                Ok(Some(data)) => data,
                Ok(None) => {
                    tracing::info!(%conn_id, "connection closed cleanly");
                    break;
                }
                Err(e) => {
                    tracing::debug!(%conn_id, error = %e, "recv error");
                    result = Err(FourlineError::Transport(e));
                    break;
                }
            },
            _ = &mut writer => {
                tracing::info!(%conn_id, "writer stopped, closing connection");
                break;
            }
        };

        dispatch(&state, &channel, &mut identity, &data).await;
    }

    if let Some(identity) = &identity {
        state.coordinator.disconnect(identity, conn_id).await;
    }
    writer.abort();
    result
}

/// Decodes one frame and hands it to the coordinator. Rejections go back to
/// the sender as `error` events.
async fn dispatch<C: Codec>(
    state: &ServerState<C>,
    channel: &DeliveryChannel,
    identity: &mut Option<Identity>,
    data: &[u8],
) {
    let request: ClientRequest = match state.codec.decode(data) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(connection = %channel.connection(), error = %e, "failed to decode request");
            reject(channel, RequestError::InvalidInput);
            return;
        }
    };

    let outcome = match request {
        ClientRequest::Join { username } => {
            let requested = Identity::new(username);
            // One name per connection.
            if identity.as_ref().is_some_and(|current| *current != requested) {
                Err(RequestError::InvalidInput)
            } else {
                let joined = state.coordinator.join(requested.clone(), channel.clone()).await;
                if joined.is_ok() {
                    *identity = Some(requested);
                }
                joined
            }
        }
        ClientRequest::Drop { game_id, column } => match identity.as_ref() {
            Some(identity) => state.coordinator.play(&game_id, identity, column).await,
            None => Err(RequestError::InvalidInput),
        },
        ClientRequest::RematchRequest { game_id } => match identity.as_ref() {
            Some(identity) => state.coordinator.request_rematch(&game_id, identity).await,
            None => Err(RequestError::InvalidInput),
        },
        ClientRequest::Unknown => Err(RequestError::UnknownMessageType),
    };

    if let Err(e) = outcome {
        tracing::debug!(
            connection = %channel.connection(),
            identity = identity.as_ref().map_or("-", Identity::as_str),
            error = %e,
            "request rejected"
        );
        reject(channel, e);
    }
}

fn reject(channel: &DeliveryChannel, error: RequestError) {
    channel.deliver(ServerEvent::error(error.to_string()));
}

/// Drains `events` into the socket until the channel ends or a send fails,
/// then closes the connection.
///
/// A send that is still pending when the delivery channel overflows is
/// abandoned. The handler then drops the connection without a close
/// handshake, since the peer is not reading.
async fn write_events<T, C>(conn: Arc<T>, mut events: DeliveryReceiver, state: Arc<ServerState<C>>)
where
    T: Connection<Error = TransportError>,
    C: Codec,
{
    while let Some(event) = events.recv().await {
        let bytes = match state.codec.encode(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(event = event.kind(), error = %e, "failed to encode event");
                continue;
            }
        };
        tokio::select! {
            sent = conn.send(&bytes) => {
                if let Err(e) = sent {
                    tracing::debug!(connection = %conn.id(), error = %e, "send failed");
                    break;
                }
            }
            () = events.overflowed() => {
                tracing::warn!(connection = %conn.id(), "client stopped reading, dropping connection");
                return;
            }
        }
    }

    if let Err(e) = conn.close().await {
        tracing::debug!(connection = %conn.id(), error = %e, "close failed");
    }
}
