//! Wire protocol for fourline.
//!
//! This crate defines what clients and the server say to each other:
//!
//! - **Identifiers** ([`Identity`], [`SessionId`]): the names players and
//!   sessions go by.
//! - **Messages** ([`ClientRequest`], [`ServerEvent`]): the JSON objects
//!   that travel in WebSocket text frames, tagged by a `type` field.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages become
//!   bytes and back.
//! - **Errors** ([`ProtocolError`]): what can go wrong on the way.
//!
//! The protocol layer knows nothing about connections or sessions; it only
//! knows shapes.
//!
//! ```text
//! Transport (bytes) → Protocol (ClientRequest) → Coordinator
//! Coordinator → Protocol (ServerEvent) → Transport (bytes)
//! ```

mod codec;
mod error;
mod message;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{ClientRequest, ResultKind, ServerEvent};
pub use types::{BOT_IDENTITY, Identity, SessionId};
