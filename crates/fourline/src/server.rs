//! `FourlineServer` builder and server loop.
//!
//! Ties the layers together: transport → protocol → coordinator.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use fourline_coordinator::{Coordinator, OverflowPolicy, PublisherHandle, RecorderHandle};
use fourline_protocol::{Codec, JsonCodec};
use fourline_transport::{Transport, TransportError, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{FourlineError, ServerConfig};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) coordinator: Coordinator,
    pub(crate) codec: C,
    pub(crate) delivery_capacity: usize,
    pub(crate) overflow: OverflowPolicy,
}

/// Builder for configuring and starting a fourline server.
///
/// # Example
///
/// ```rust,ignore
/// let server = FourlineServer::builder()
///     .config(config)
///     .recorder(spawn_recorder(LogRecorder, 64))
///     .build()
///     .await?;
/// server.run_until(shutdown_signal()).await
/// ```
pub struct FourlineServerBuilder {
    config: ServerConfig,
    recorder: Option<RecorderHandle>,
    publisher: Option<PublisherHandle>,
}

impl FourlineServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            recorder: None,
            publisher: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.server.listen = addr;
        self
    }

    /// Sends finished games to `recorder`.
    pub fn recorder(mut self, recorder: RecorderHandle) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Sends game events to `publisher`.
    pub fn publisher(mut self, publisher: PublisherHandle) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Validates the configuration and binds the listener.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`. Sockets that do not finish
    /// the upgrade within `server.handshake_timeout_ms` are dropped.
    pub async fn build(self) -> Result<FourlineServer<JsonCodec>, FourlineError> {
        self.config.validate()?;

        let transport = WebSocketTransport::bind_with_timeout(
            &self.config.server.listen.to_string(),
            self.config.handshake_timeout(),
        )
        .await?;

        let mut coordinator = Coordinator::builder(self.config.coordinator_config());
        if let Some(recorder) = self.recorder {
            coordinator = coordinator.recorder(recorder);
        }
        if let Some(publisher) = self.publisher {
            coordinator = coordinator.publisher(publisher);
        }

        let state = Arc::new(ServerState {
            coordinator: coordinator.build(),
            codec: JsonCodec,
            delivery_capacity: self.config.delivery.capacity,
            overflow: self.config.delivery.overflow,
        });

        Ok(FourlineServer { transport, state })
    }
}

impl Default for FourlineServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound fourline server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct FourlineServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl FourlineServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> FourlineServerBuilder {
        FourlineServerBuilder::new()
    }
}

impl<C: Codec> FourlineServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, FourlineError> {
        Ok(self.transport.local_addr()?)
    }

    /// The coordinator every connection talks to.
    pub fn coordinator(&self) -> &Coordinator {
        &self.state.coordinator
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), FourlineError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes.
    ///
    /// Each accepted connection gets its own handler task. A failed accept
    /// or handshake is logged and the loop carries on. Handlers already running are not
    /// interrupted by shutdown.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<(), FourlineError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "fourline server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(TransportError::ConnectionClosed) => {
                        tracing::error!("listener stopped, no longer accepting connections");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
            }
        }

        self.transport.shutdown().await?;
        Ok(())
    }
}
