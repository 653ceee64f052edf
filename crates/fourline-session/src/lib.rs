//! Session layer for fourline.
//!
//! A [`Session`] is one match between two identities: the grid, whose turn
//! it is, whether the round is over, and who has asked for a rematch. It is
//! plain data with synchronous methods; the coordinator owns every session
//! and calls these methods while holding its lock.
//!
//! [`RequestError`] is the full list of reasons a client request can be
//! turned down. Its `Display` text is exactly what the client sees in the
//! `error` event.

mod error;
mod session;

pub use error::RequestError;
pub use session::{MoveOutcome, Outcome, RematchProgress, Session, SessionStatus};
