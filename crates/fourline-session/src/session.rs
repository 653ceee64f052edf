//! The `Session` type: one match and its round-by-round lifecycle.
//!
//! ```text
//!   Ongoing ──(line or full grid)──→ Finished ──(rematch consent)──→ Ongoing
//! ```
//!
//! A reset keeps the session id and the seats, and bumps [`Session::round`]
//! so work scheduled against the previous round can recognise itself as
//! stale.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use fourline_engine::{Grid, Seat};
use fourline_protocol::{Identity, SessionId};

use crate::RequestError;

// ---------------------------------------------------------------------------
// Status and outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Ongoing,
    Finished,
}

/// How a finished round ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Winner(Identity),
    Draw,
}

/// What an accepted move did to the round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The round goes on; the turn has passed to the other seat.
    Continue,
    /// The move completed a line.
    Won(Identity),
    /// The move filled the grid without a line.
    Draw,
}

/// Where a rematch request left the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RematchProgress {
    /// Consent recorded; still waiting for the other participant.
    /// `newly_requested` is `false` when the requester had already asked.
    Waiting { newly_requested: bool },
    /// The session was reset and a new round has begun.
    Restarted,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One match between two identities.
///
/// Seat one (`players[0]`) always moves first, in the first round and after
/// every reset. Against the automated opponent the human is seat one.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    players: [Identity; 2],
    grid: Grid,
    turn: Seat,
    status: SessionStatus,
    outcome: Option<Outcome>,
    rematch_consent: HashSet<Identity>,
    round: u32,
    moves: u32,
    started_at: Instant,
}

impl Session {
    /// Creates a fresh session. `first` takes seat one and moves first.
    pub fn new(id: SessionId, first: Identity, second: Identity) -> Self {
        Self {
            id,
            players: [first, second],
            grid: Grid::new(),
            turn: Seat::First,
            status: SessionStatus::Ongoing,
            outcome: None,
            rematch_consent: HashSet::new(),
            round: 1,
            moves: 0,
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn players(&self) -> &[Identity; 2] {
        &self.players
    }

    pub fn player(&self, seat: Seat) -> &Identity {
        &self.players[seat.index()]
    }

    /// Returns the seat `identity` occupies, or `None` for an outsider.
    pub fn seat_of(&self, identity: &Identity) -> Option<Seat> {
        if self.players[0] == *identity {
            Some(Seat::First)
        } else if self.players[1] == *identity {
            Some(Seat::Second)
        } else {
            None
        }
    }

    /// The other participant, or `None` if `identity` isn't seated here.
    pub fn opponent_of(&self, identity: &Identity) -> Option<&Identity> {
        self.seat_of(identity).map(|seat| self.player(seat.other()))
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn turn(&self) -> Seat {
        self.turn
    }

    /// The identity whose move is accepted next.
    pub fn turn_holder(&self) -> &Identity {
        self.player(self.turn)
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_ongoing(&self) -> bool {
        self.status == SessionStatus::Ongoing
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// 1 for the first round, incremented by every reset.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Moves accepted in the current round.
    pub fn moves(&self) -> u32 {
        self.moves
    }

    /// Returns `true` if either seat is the automated opponent.
    pub fn is_against_bot(&self) -> bool {
        self.players.iter().any(Identity::is_bot)
    }

    pub fn has_consented(&self, identity: &Identity) -> bool {
        self.rematch_consent.contains(identity)
    }

    /// Time since the current round began.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Applies `identity`'s move into `column`.
    ///
    /// On success the turn passes to the other seat and the outcome is
    /// evaluated: a line finishes the round with a winner, a full grid
    /// finishes it as a draw.
    ///
    /// # Errors
    /// Checked in this order, and nothing changes on any of them:
    /// - [`RequestError::NotParticipant`] if `identity` has no seat here
    /// - [`RequestError::NotOngoing`] if the round is over
    /// - [`RequestError::NotYourTurn`] if `identity` isn't the turn holder
    /// - [`RequestError::InvalidMove`] if `column` is out of range or full
    pub fn play(&mut self, identity: &Identity, column: i64) -> Result<MoveOutcome, RequestError> {
        let seat = self.seat_of(identity).ok_or(RequestError::NotParticipant)?;
        if !self.is_ongoing() {
            return Err(RequestError::NotOngoing);
        }
        if seat != self.turn {
            return Err(RequestError::NotYourTurn);
        }

        let column = usize::try_from(column).map_err(|_| RequestError::InvalidMove)?;
        self.grid
            .apply_move(column, seat)
            .map_err(|_| RequestError::InvalidMove)?;

        self.moves += 1;
        self.turn = self.turn.other();

        if let Some(line) = self.grid.detect_line() {
            let winner = self.player(line.owner).clone();
            self.finish(Outcome::Winner(winner.clone()));
            return Ok(MoveOutcome::Won(winner));
        }
        if self.grid.is_full() {
            self.finish(Outcome::Draw);
            return Ok(MoveOutcome::Draw);
        }
        Ok(MoveOutcome::Continue)
    }

    /// Records `identity`'s wish to play again.
    ///
    /// Against the automated opponent one request is enough. Between two
    /// humans the session resets once both have asked; asking twice from
    /// the same side changes nothing.
    ///
    /// # Errors
    /// [`RequestError::NotParticipant`] for an outsider,
    /// [`RequestError::GameInProgress`] while the round is still ongoing.
    pub fn request_rematch(&mut self, identity: &Identity) -> Result<RematchProgress, RequestError> {
        if self.seat_of(identity).is_none() {
            return Err(RequestError::NotParticipant);
        }
        if self.is_ongoing() {
            return Err(RequestError::GameInProgress);
        }

        if self.is_against_bot() {
            self.reset();
            return Ok(RematchProgress::Restarted);
        }

        let newly_requested = self.rematch_consent.insert(identity.clone());
        if self.players.iter().all(|p| self.rematch_consent.contains(p)) {
            self.reset();
            return Ok(RematchProgress::Restarted);
        }
        Ok(RematchProgress::Waiting { newly_requested })
    }

    /// Starts a new round: empty grid, seat one to move, no outcome, no
    /// consent recorded.
    pub fn reset(&mut self) {
        self.grid = Grid::new();
        self.turn = Seat::First;
        self.status = SessionStatus::Ongoing;
        self.outcome = None;
        self.rematch_consent.clear();
        self.round += 1;
        self.moves = 0;
        self.started_at = Instant::now();
    }

    fn finish(&mut self, outcome: Outcome) {
        self.status = SessionStatus::Finished;
        self.outcome = Some(outcome);
    }
}
