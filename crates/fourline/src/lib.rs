//! # fourline
//!
//! Real-time connect-four session server.
//!
//! Players connect over WebSocket, send `join` with a name, and are paired
//! with whoever is already waiting, or with the automated opponent after a
//! timeout. The server validates every drop, detects wins and draws, and
//! supports rematches. All session state lives in one
//! [`Coordinator`](fourline_coordinator::Coordinator); this crate wires it
//! to the network.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fourline::prelude::*;
//!
//! # async fn start() -> Result<(), FourlineError> {
//! let server = FourlineServer::builder()
//!     .bind("127.0.0.1:8080".parse().unwrap())
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
#[cfg(feature = "postgres")]
mod recorder;
mod server;

pub use config::{
    ConfigError, ConfigLoader, DatabaseSettings, DeliverySettings, EventLogSettings, MatchmakingSettings,
    ServerConfig, ServerSettings,
};
pub use error::FourlineError;
#[cfg(feature = "postgres")]
pub use recorder::PgRecorder;
pub use server::{FourlineServer, FourlineServerBuilder};

/// Everything needed to embed a server or talk to one from tests.
pub mod prelude {
    pub use crate::{FourlineError, FourlineServer, FourlineServerBuilder, ServerConfig};

    pub use fourline_coordinator::{
        Coordinator, CoordinatorConfig, EventPublisher, FinishedGame, GameEvent, GameRecorder,
        LogPublisher, LogRecorder, OverflowPolicy, PublisherHandle, RecorderHandle, SinkError,
        spawn_publisher, spawn_recorder,
    };
    pub use fourline_engine::{Cell, Grid, Seat};
    pub use fourline_protocol::{
        BOT_IDENTITY, ClientRequest, Codec, Identity, JsonCodec, ResultKind, ServerEvent,
        SessionId,
    };
    pub use fourline_session::RequestError;
}
