//! Inbound requests and outbound events.
//!
//! Every message is a JSON object whose `type` field names the variant
//! (`#[serde(tag = "type")]`, snake_case). Field names are camelCase on the
//! wire, so `game_id` travels as `gameId`.

use fourline_engine::Grid;
use serde::{Deserialize, Serialize};

use crate::{Identity, SessionId};

// ---------------------------------------------------------------------------
// ClientRequest
// ---------------------------------------------------------------------------

/// A request sent by a client.
///
/// ```text
/// {"type":"join","username":"alice"}
/// {"type":"drop","gameId":"9f…","column":3}
/// {"type":"rematch_request","gameId":"9f…"}
/// ```
///
/// Unrecognised `type` values decode to [`ClientRequest::Unknown`] instead of
/// failing, so the server can tell "unknown message type" apart from
/// "invalid input". Extra fields (a `username` on `drop`, say) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Enter matchmaking under `username`.
    Join { username: String },

    /// Drop a piece into `column` of session `game_id`.
    ///
    /// `column` is signed so a negative value decodes and is then rejected
    /// as an invalid move rather than as unparseable input.
    #[serde(rename_all = "camelCase")]
    Drop { game_id: SessionId, column: i64 },

    /// Ask to replay the finished session `game_id`.
    #[serde(rename_all = "camelCase")]
    RematchRequest { game_id: SessionId },

    /// Any `type` this server doesn't know.
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// ServerEvent
// ---------------------------------------------------------------------------

/// How a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Win,
    Draw,
}

/// An event pushed from the server to one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Paired into a session. `you` is the seat number, 1 or 2.
    #[serde(rename_all = "camelCase")]
    Matched {
        game_id: SessionId,
        opponent: Identity,
        you: u8,
    },

    /// The grid after a move or a reset, and who moves next.
    #[serde(rename_all = "camelCase")]
    State { board: Grid, next_turn: Identity },

    /// The round is over. `winner` is only present for a win.
    #[serde(rename = "result")]
    Outcome {
        result: ResultKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner: Option<Identity>,
    },

    /// A request was rejected. Nothing changed.
    Error { message: String },

    /// Free-text notice, e.g. a pending rematch request.
    Info { message: String },

    /// The session was reset for another round.
    RematchStart { message: String },

    /// The other participant disconnected.
    OpponentLeft { opponent: Identity },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn win(winner: Identity) -> Self {
        Self::Outcome {
            result: ResultKind::Win,
            winner: Some(winner),
        }
    }

    pub fn draw() -> Self {
        Self::Outcome {
            result: ResultKind::Draw,
            winner: None,
        }
    }

    /// The `type` tag this event carries on the wire. Handy for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Matched { .. } => "matched",
            Self::State { .. } => "state",
            Self::Outcome { .. } => "result",
            Self::Error { .. } => "error",
            Self::Info { .. } => "info",
            Self::RematchStart { .. } => "rematch_start",
            Self::OpponentLeft { .. } => "opponent_left",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // =====================================================================
    // ClientRequest
    // =====================================================================

    #[test]
    fn test_client_request_join_decodes() {
        let req: ClientRequest =
            serde_json::from_value(json!({"type": "join", "username": "alice"})).unwrap();
        assert_eq!(
            req,
            ClientRequest::Join {
                username: "alice".into()
            }
        );
    }

    #[test]
    fn test_client_request_drop_uses_camel_case_and_ignores_username() {
        let req: ClientRequest = serde_json::from_value(json!({
            "type": "drop",
            "gameId": "g1",
            "username": "alice",
            "column": 4,
        }))
        .unwrap();
        assert_eq!(
            req,
            ClientRequest::Drop {
                game_id: SessionId::new("g1"),
                column: 4
            }
        );
    }

    #[test]
    fn test_client_request_drop_accepts_negative_column() {
        let req: ClientRequest =
            serde_json::from_value(json!({"type": "drop", "gameId": "g1", "column": -1})).unwrap();
        assert!(matches!(req, ClientRequest::Drop { column: -1, .. }));
    }

    #[test]
    fn test_client_request_rematch_request_decodes() {
        let req: ClientRequest =
            serde_json::from_value(json!({"type": "rematch_request", "gameId": "g7"})).unwrap();
        assert_eq!(
            req,
            ClientRequest::RematchRequest {
                game_id: SessionId::new("g7")
            }
        );
    }

    #[test]
    fn test_client_request_unknown_type_decodes_to_unknown() {
        let req: ClientRequest =
            serde_json::from_value(json!({"type": "chat", "text": "hi"})).unwrap();
        assert_eq!(req, ClientRequest::Unknown);
    }

    #[test]
    fn test_client_request_missing_field_fails() {
        let result: Result<ClientRequest, _> =
            serde_json::from_value(json!({"type": "drop", "gameId": "g1"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_client_request_missing_type_fails() {
        let result: Result<ClientRequest, _> = serde_json::from_value(json!({"username": "x"}));
        assert!(result.is_err());
    }

    // =====================================================================
    // ServerEvent
    // =====================================================================

    #[test]
    fn test_server_event_matched_json_format() {
        let event = ServerEvent::Matched {
            game_id: SessionId::new("g1"),
            opponent: Identity::new("bob"),
            you: 1,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "matched", "gameId": "g1", "opponent": "bob", "you": 1})
        );
    }

    #[test]
    fn test_server_event_state_json_format() {
        let event = ServerEvent::State {
            board: Grid::new(),
            next_turn: Identity::new("alice"),
        };
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "state");
        assert_eq!(value["nextTurn"], "alice");
        assert_eq!(value["board"][0], json!([0, 0, 0, 0, 0, 0, 0]));
        assert_eq!(value["board"].as_array().unwrap().len(), 6);
    }

    #[test]
    fn test_server_event_win_includes_winner() {
        assert_eq!(
            serde_json::to_value(ServerEvent::win(Identity::new("alice"))).unwrap(),
            json!({"type": "result", "result": "win", "winner": "alice"})
        );
    }

    #[test]
    fn test_server_event_draw_omits_winner() {
        assert_eq!(
            serde_json::to_value(ServerEvent::draw()).unwrap(),
            json!({"type": "result", "result": "draw"})
        );
    }

    #[test]
    fn test_server_event_rematch_start_and_opponent_left_tags() {
        let start = ServerEvent::RematchStart {
            message: "Rematch started!".into(),
        };
        let left = ServerEvent::OpponentLeft {
            opponent: Identity::new("bob"),
        };
        assert_eq!(serde_json::to_value(&start).unwrap()["type"], "rematch_start");
        assert_eq!(serde_json::to_value(&left).unwrap()["type"], "opponent_left");
        assert_eq!(start.kind(), "rematch_start");
        assert_eq!(left.kind(), "opponent_left");
    }

    #[test]
    fn test_server_event_decodes_what_it_encodes() {
        let event = ServerEvent::error("not your turn");
        let json = serde_json::to_string(&event).unwrap();
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
