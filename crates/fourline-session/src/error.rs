//! Error types for the session layer.

/// Why a client request was rejected.
///
/// None of these are fatal. The coordinator turns each one into an `error`
/// event for the requesting identity and leaves every other piece of state
/// as it was. The `#[error]` strings are the wire `message` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// No session with the given id.
    #[error("game not found")]
    SessionNotFound,

    /// The round has already ended.
    #[error("game is not ongoing")]
    NotOngoing,

    /// The requester isn't the turn holder.
    #[error("not your turn")]
    NotYourTurn,

    /// Column out of range or already full.
    #[error("invalid move")]
    InvalidMove,

    /// The request's `type` isn't one the server handles.
    #[error("unknown message type")]
    UnknownMessageType,

    /// The request couldn't be decoded, or came before `join`.
    #[error("invalid input")]
    InvalidInput,

    /// The identity is already waiting for an opponent.
    #[error("already in queue")]
    AlreadyQueued,

    /// The identity is already playing an unfinished round.
    #[error("already in a game")]
    AlreadyInSession,

    /// Another live connection is using this identity.
    #[error("identity already connected")]
    IdentityTaken,

    /// The requester isn't one of the session's two participants.
    #[error("not a participant")]
    NotParticipant,

    /// A rematch was asked for before the round finished.
    #[error("game still in progress")]
    GameInProgress,

    /// The other human participant has disconnected.
    #[error("opponent left")]
    OpponentLeft,
}
