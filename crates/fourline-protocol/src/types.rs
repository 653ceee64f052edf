//! Identifier newtypes shared by every layer.
//!
//! Both are thin wrappers around `String` that serialize as the bare string,
//! so `Identity::new("alice")` is `"alice"` on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The reserved identity of the automated opponent.
///
/// A human can't take this name: the coordinator rejects joins that use it.
pub const BOT_IDENTITY: &str = "BOT_AI";

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The handle a participant is known by.
///
/// Identities aren't authenticated; whatever a client sends in `join` is
/// what it's called for the rest of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The automated opponent's identity.
    pub fn bot() -> Self {
        Self(BOT_IDENTITY.to_owned())
    }

    /// Returns `true` if this is the automated opponent.
    pub fn is_bot(&self) -> bool {
        self.0 == BOT_IDENTITY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Identity {
    fn from(name: String) -> Self {
        Self(name)
    }
}

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Opaque token naming one session. Clients echo it back as `gameId`.
///
/// The coordinator mints these; this type only carries them around.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
