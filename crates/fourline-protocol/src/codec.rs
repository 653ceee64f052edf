//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The server is generic over [`Codec`], so the connection handler never
//! names a concrete format. Today there's one implementation, [`JsonCodec`],
//! because browser clients speak JSON.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because the codec is shared (behind an `Arc`)
/// by every connection task the server spawns.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Output is always valid UTF-8, so the transport sends it as a text frame.
///
/// ## Example
///
/// ```rust
/// use fourline_protocol::{ClientRequest, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let request: ClientRequest = codec
///     .decode(br#"{"type":"join","username":"alice"}"#)
///     .unwrap();
///
/// assert_eq!(request, ClientRequest::Join { username: "alice".into() });
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClientRequest, Identity, ServerEvent};

    #[test]
    fn test_encode_server_event_produces_utf8_json() {
        let event = ServerEvent::Info {
            message: "hello".into(),
        };
        let bytes = JsonCodec.encode(&event).unwrap();

        let text = std::str::from_utf8(&bytes).expect("json is utf-8");
        assert_eq!(text, r#"{"type":"info","message":"hello"}"#);
    }

    #[test]
    fn test_decode_truncated_input_returns_decode_error() {
        let result: Result<ClientRequest, _> = JsonCodec.decode(br#"{"type":"jo"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_identity_from_plain_string() {
        let identity: Identity = JsonCodec.decode(br#""alice""#).unwrap();
        assert_eq!(identity, Identity::new("alice"));
    }
}
