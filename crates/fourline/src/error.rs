//! Unified error type for the fourline server.

use fourline_protocol::ProtocolError;
use fourline_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps the crate-specific errors a server can hit.
///
/// Request rejections are not in here: those become `error` events for the
/// client and never leave the connection handler.
#[derive(Debug, thiserror::Error)]
pub enum FourlineError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The configuration couldn't be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
