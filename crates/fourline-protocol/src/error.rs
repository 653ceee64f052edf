//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding wire messages.
///
/// A `ProtocolError` never reaches a player verbatim. The connection handler
/// maps every decode failure onto the generic `invalid input` error event.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, a missing field, or a field
    /// of the wrong type.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame decoded but can't be a message at all, e.g. a binary
    /// frame that isn't UTF-8 text.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
