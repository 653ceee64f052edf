//! The session coordinator: matchmaking queue, indices, and every state
//! transition a session goes through.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use fourline_engine::choose_column;
use fourline_protocol::{Identity, ServerEvent, SessionId};
use fourline_session::{MoveOutcome, Outcome, RematchProgress, RequestError, Session};
use fourline_transport::ConnectionId;
use rand::Rng;
use serde_json::json;
use tokio::sync::Mutex;

use crate::{
    CoordinatorConfig, DeliveryChannel, FinishedGame, GameEvent, PublisherHandle, RecorderHandle,
};

const REMATCH_STARTED: &str = "Rematch started!";

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// A queued identity and the ticket its wait timer was armed with.
#[derive(Debug)]
struct Waiting {
    identity: Identity,
    ticket: u64,
}

/// Everything the coordinator lock protects.
#[derive(Default)]
struct CoordinatorState {
    /// Oldest first. An identity appears at most once.
    queue: VecDeque<Waiting>,
    next_ticket: u64,
    /// Identity → its connection's outbound channel.
    channels: HashMap<Identity, DeliveryChannel>,
    /// Human identity → the session it is bound to.
    player_sessions: HashMap<Identity, SessionId>,
    sessions: HashMap<SessionId, Session>,
}

impl CoordinatorState {
    fn is_queued(&self, identity: &Identity) -> bool {
        self.queue.iter().any(|w| w.identity == *identity)
    }

    /// `true` if `identity` is still bound to `session_id`. The automated
    /// opponent never leaves.
    fn is_bound(&self, identity: &Identity, session_id: &SessionId) -> bool {
        identity.is_bot() || self.player_sessions.get(identity) == Some(session_id)
    }

    /// 128 random bits as 32 hex characters, re-drawn on collision.
    fn mint_session_id(&self) -> SessionId {
        let mut rng = rand::rng();
        loop {
            let bits: u128 = rng.random();
            let id = SessionId::new(format!("{bits:032x}"));
            if !self.sessions.contains_key(&id) {
                return id;
            }
        }
    }
}

/// Sends `event` to `identity` if it has a channel. A missing channel
/// (the bot, or a participant who left) is skipped.
fn send_to(channels: &HashMap<Identity, DeliveryChannel>, identity: &Identity, event: ServerEvent) {
    if let Some(channel) = channels.get(identity) {
        channel.deliver(event);
    }
}

/// Sends `event` to both participants of `session`.
fn broadcast(channels: &HashMap<Identity, DeliveryChannel>, session: &Session, event: &ServerEvent) {
    for player in session.players() {
        send_to(channels, player, event.clone());
    }
}

fn state_event(session: &Session) -> ServerEvent {
    ServerEvent::State {
        board: *session.grid(),
        next_turn: session.turn_holder().clone(),
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

struct Inner {
    state: Mutex<CoordinatorState>,
    config: CoordinatorConfig,
    recorder: Option<RecorderHandle>,
    publisher: Option<PublisherHandle>,
}

/// Shared handle to the coordinator. Clones refer to the same state.
///
/// Every public method takes the coordinator lock for its whole duration
/// and never awaits while holding it, so the operations are linearized:
/// two joins can't both pair with the same waiting identity, and a bot
/// move can't interleave with a human one.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

/// Builder for [`Coordinator`]; attaches the optional collaborators.
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    recorder: Option<RecorderHandle>,
    publisher: Option<PublisherHandle>,
}

impl CoordinatorBuilder {
    pub fn recorder(mut self, recorder: RecorderHandle) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn publisher(mut self, publisher: PublisherHandle) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn build(self) -> Coordinator {
        Coordinator {
            inner: Arc::new(Inner {
                state: Mutex::new(CoordinatorState::default()),
                config: self.config,
                recorder: self.recorder,
                publisher: self.publisher,
            }),
        }
    }
}

impl Coordinator {
    /// A coordinator with no recorder and no publisher.
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: CoordinatorConfig) -> CoordinatorBuilder {
        CoordinatorBuilder {
            config,
            recorder: None,
            publisher: None,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    // -----------------------------------------------------------------------
    // Join
    // -----------------------------------------------------------------------

    /// Puts `identity` into matchmaking and binds `channel` as its outbound
    /// channel.
    ///
    /// If someone is already waiting, the two are paired at once (the
    /// waiting identity takes seat one). Otherwise `identity` is queued and
    /// a timer is armed; if it is still queued with the same ticket when
    /// the timer fires, it is paired with the automated opponent.
    ///
    /// An identity whose previous session is over (finished, or the
    /// opponent left) may join again; it is unbound from that session
    /// first.
    ///
    /// # Errors
    /// - [`RequestError::InvalidInput`] for an empty or reserved name
    /// - [`RequestError::IdentityTaken`] if another connection holds it
    /// - [`RequestError::AlreadyQueued`] if it's already waiting
    /// - [`RequestError::AlreadyInSession`] if its current round is still
    ///   being played
    pub async fn join(&self, identity: Identity, channel: DeliveryChannel) -> Result<(), RequestError> {
        if identity.is_bot() || identity.as_str().trim().is_empty() {
            return Err(RequestError::InvalidInput);
        }

        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        if let Some(bound) = state.channels.get(&identity) {
            if bound.connection() != channel.connection() {
                return Err(RequestError::IdentityTaken);
            }
        }
        if state.is_queued(&identity) {
            return Err(RequestError::AlreadyQueued);
        }
        if let Some(session_id) = state.player_sessions.get(&identity).cloned() {
            let still_playing = state.sessions.get(&session_id).is_some_and(|session| {
                session.is_ongoing()
                    && session
                        .opponent_of(&identity)
                        .is_some_and(|opponent| state.is_bound(opponent, &session_id))
            });
            if still_playing {
                return Err(RequestError::AlreadyInSession);
            }
            self.leave_session(state, &identity);
        }

        state.channels.insert(identity.clone(), channel);

        match state.queue.pop_front() {
            Some(waiting) => {
                self.start_session(state, waiting.identity, identity);
            }
            None => {
                let ticket = state.next_ticket;
                state.next_ticket += 1;
                state.queue.push_back(Waiting {
                    identity: identity.clone(),
                    ticket,
                });
                tracing::info!(%identity, ticket, "waiting for opponent");
                self.schedule_bot_match(identity, ticket);
            }
        }
        Ok(())
    }

    fn schedule_bot_match(&self, identity: Identity, ticket: u64) {
        let this = self.clone();
        let delay = self.inner.config.bot_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.match_with_bot(identity, ticket).await;
        });
    }

    /// Fires when a wait timer expires. Does nothing unless the same queue
    /// entry is still there.
    async fn match_with_bot(&self, identity: Identity, ticket: u64) {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let Some(pos) = state
            .queue
            .iter()
            .position(|w| w.identity == identity && w.ticket == ticket)
        else {
            tracing::debug!(%identity, ticket, "wait timer expired after pairing, ignoring");
            return;
        };
        state.queue.remove(pos);
        tracing::info!(%identity, "no human opponent, pairing with bot");
        self.start_session(state, identity, Identity::bot());
    }

    /// Creates a session, binds the humans to it, and tells them.
    fn start_session(&self, state: &mut CoordinatorState, first: Identity, second: Identity) {
        let session_id = state.mint_session_id();
        let session = Session::new(session_id.clone(), first.clone(), second.clone());

        for (me, opponent, seat) in [(&first, &second, 1u8), (&second, &first, 2u8)] {
            if me.is_bot() {
                continue;
            }
            state.player_sessions.insert(me.clone(), session_id.clone());
            send_to(
                &state.channels,
                me,
                ServerEvent::Matched {
                    game_id: session_id.clone(),
                    opponent: opponent.clone(),
                    you: seat,
                },
            );
        }
        broadcast(&state.channels, &session, &state_event(&session));

        tracing::info!(%session_id, player_one = %first, player_two = %second, "session created");
        self.publish(
            &session_id,
            json!({
                "type": "session_started",
                "gameId": session_id,
                "player1": first,
                "player2": second,
                "round": session.round(),
            }),
        );
        state.sessions.insert(session_id, session);
    }

    // -----------------------------------------------------------------------
    // Move
    // -----------------------------------------------------------------------

    /// Drops `identity`'s piece into `column` of `session_id`.
    ///
    /// On success both participants get the new `state`, followed by a
    /// `result` if the move ended the round. If the automated opponent is
    /// now to move, its reply is scheduled.
    ///
    /// # Errors
    /// [`RequestError::SessionNotFound`], [`RequestError::NotParticipant`],
    /// [`RequestError::NotOngoing`], [`RequestError::OpponentLeft`],
    /// [`RequestError::NotYourTurn`], [`RequestError::InvalidMove`]. None of
    /// them change any state.
    pub async fn play(
        &self,
        session_id: &SessionId,
        identity: &Identity,
        column: i64,
    ) -> Result<(), RequestError> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let session = state
            .sessions
            .get(session_id)
            .ok_or(RequestError::SessionNotFound)?;
        if identity.is_bot() || !state.is_bound(identity, session_id) {
            return Err(RequestError::NotParticipant);
        }
        if !session.is_ongoing() {
            return Err(RequestError::NotOngoing);
        }
        if let Some(opponent) = session.opponent_of(identity) {
            if !state.is_bound(opponent, session_id) {
                return Err(RequestError::OpponentLeft);
            }
        }

        self.apply_move(state, session_id, identity, column)
    }

    /// The move pipeline shared by human requests and the automated
    /// opponent. Runs under the coordinator lock.
    fn apply_move(
        &self,
        state: &mut CoordinatorState,
        session_id: &SessionId,
        identity: &Identity,
        column: i64,
    ) -> Result<(), RequestError> {
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or(RequestError::SessionNotFound)?;

        let outcome = match session.play(identity, column) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::debug!(%session_id, %identity, column, error = %e, "move rejected");
                return Err(e);
            }
        };

        broadcast(&state.channels, session, &state_event(session));
        self.publish(
            session_id,
            json!({
                "type": "move",
                "gameId": session_id,
                "player": identity,
                "column": column,
                "moveNumber": session.moves(),
            }),
        );

        match outcome {
            MoveOutcome::Won(winner) => {
                tracing::info!(%session_id, %winner, "session won");
                broadcast(&state.channels, session, &ServerEvent::win(winner));
                self.finish(session);
            }
            MoveOutcome::Draw => {
                tracing::info!(%session_id, "session drawn");
                broadcast(&state.channels, session, &ServerEvent::draw());
                self.finish(session);
            }
            MoveOutcome::Continue => {
                if session.turn_holder().is_bot() {
                    self.schedule_bot_move(session_id.clone(), session.round(), session.moves());
                }
            }
        }
        Ok(())
    }

    /// Reports a just-finished round to the recorder and the event log.
    fn finish(&self, session: &Session) {
        let winner = match session.outcome() {
            Some(Outcome::Winner(winner)) => Some(winner.clone()),
            _ => None,
        };
        let [player_one, player_two] = session.players().clone();
        let game = FinishedGame {
            session_id: session.id().clone(),
            player_one,
            player_two,
            winner,
            moves: session.moves(),
            duration: session.elapsed(),
        };

        let result = if game.winner.is_some() { "win" } else { "draw" };
        let duration_ms = game.duration_ms();
        self.publish(
            &game.session_id,
            json!({
                "type": "session_finished",
                "gameId": game.session_id,
                "winner": game.winner,
                "result": result,
                "durationMs": duration_ms,
            }),
        );
        if let Some(recorder) = &self.inner.recorder {
            recorder.submit(game);
        }
    }

    fn schedule_bot_move(&self, session_id: SessionId, round: u32, moves: u32) {
        let this = self.clone();
        let delay = self.inner.config.bot_move_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.play_bot_turn(session_id, round, moves).await;
        });
    }

    /// The automated opponent's scheduled reply.
    ///
    /// Skipped if the session is gone or has moved on (another move was
    /// applied, or a rematch reset it) since the reply was scheduled. The
    /// column is chosen here, from the live grid.
    async fn play_bot_turn(&self, session_id: SessionId, round: u32, moves: u32) {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let Some(session) = state.sessions.get(&session_id) else {
            tracing::debug!(%session_id, "session gone before bot move");
            return;
        };
        if session.round() != round
            || session.moves() != moves
            || !session.is_ongoing()
            || !session.turn_holder().is_bot()
        {
            tracing::debug!(%session_id, "session moved on, skipping bot move");
            return;
        }

        let me = session.turn();
        let column = choose_column(session.grid(), me, me.other());
        let bot = Identity::bot();
        tracing::debug!(%session_id, column, "bot moving");
        if let Err(e) = self.apply_move(state, &session_id, &bot, column as i64) {
            tracing::warn!(%session_id, column, error = %e, "bot move rejected");
        }
    }

    // -----------------------------------------------------------------------
    // Rematch
    // -----------------------------------------------------------------------

    /// Asks to replay the finished session `session_id`.
    ///
    /// Against the automated opponent the session resets at once. Between
    /// humans the other participant gets an `info` notice, and the session
    /// resets when both have asked. A reset sends `rematch_start` and then
    /// the fresh `state` to both.
    ///
    /// # Errors
    /// [`RequestError::SessionNotFound`], [`RequestError::NotParticipant`],
    /// [`RequestError::OpponentLeft`], [`RequestError::GameInProgress`].
    pub async fn request_rematch(
        &self,
        session_id: &SessionId,
        identity: &Identity,
    ) -> Result<(), RequestError> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        if !state.sessions.contains_key(session_id) {
            return Err(RequestError::SessionNotFound);
        }
        if identity.is_bot() || !state.is_bound(identity, session_id) {
            return Err(RequestError::NotParticipant);
        }

        let CoordinatorState {
            sessions,
            channels,
            player_sessions,
            ..
        } = state;
        let session = sessions
            .get_mut(session_id)
            .ok_or(RequestError::SessionNotFound)?;
        let Some(opponent) = session.opponent_of(identity).cloned() else {
            return Err(RequestError::NotParticipant);
        };
        if !opponent.is_bot() && player_sessions.get(&opponent) != Some(session_id) {
            return Err(RequestError::OpponentLeft);
        }

        match session.request_rematch(identity)? {
            RematchProgress::Waiting {
                newly_requested: true,
            } => {
                tracing::info!(%session_id, %identity, "rematch requested");
                send_to(
                    channels,
                    &opponent,
                    ServerEvent::Info {
                        message: format!("{identity} requested a rematch. Click Rematch to accept."),
                    },
                );
            }
            RematchProgress::Waiting {
                newly_requested: false,
            } => {
                tracing::debug!(%session_id, %identity, "duplicate rematch request");
            }
            RematchProgress::Restarted => {
                tracing::info!(%session_id, round = session.round(), "rematch started");
                broadcast(
                    channels,
                    session,
                    &ServerEvent::RematchStart {
                        message: REMATCH_STARTED.to_owned(),
                    },
                );
                broadcast(channels, session, &state_event(session));
                self.publish(
                    session_id,
                    json!({
                        "type": "rematch_started",
                        "gameId": session_id,
                        "round": session.round(),
                    }),
                );
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Disconnect
    // -----------------------------------------------------------------------

    /// Forgets `identity`'s connection.
    ///
    /// Removes it from the queue and unbinds its channel and session. If it
    /// was in a session with another human who is still bound, that human
    /// gets `opponent_left`. A session with no human left is evicted.
    ///
    /// Idempotent, and ignores a `connection` that isn't the one currently
    /// bound to `identity`.
    pub async fn disconnect(&self, identity: &Identity, connection: ConnectionId) {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        match state.channels.get(identity) {
            Some(channel) if channel.connection() == connection => {}
            _ => {
                tracing::debug!(%identity, %connection, "disconnect for unbound connection, ignoring");
                return;
            }
        }

        state.channels.remove(identity);
        state.queue.retain(|w| w.identity != *identity);
        self.leave_session(state, identity);
        tracing::info!(%identity, %connection, "player disconnected");
    }

    /// Unbinds `identity` from its session, notifying a still-bound human
    /// opponent or evicting the session if nobody is left.
    fn leave_session(&self, state: &mut CoordinatorState, identity: &Identity) {
        let Some(session_id) = state.player_sessions.remove(identity) else {
            return;
        };
        let Some(session) = state.sessions.get(&session_id) else {
            return;
        };

        let remaining = session
            .opponent_of(identity)
            .filter(|opponent| !opponent.is_bot())
            .filter(|opponent| state.player_sessions.get(*opponent) == Some(&session_id))
            .cloned();

        match remaining {
            Some(opponent) => {
                tracing::info!(%session_id, %identity, %opponent, "participant left session");
                send_to(
                    &state.channels,
                    &opponent,
                    ServerEvent::OpponentLeft {
                        opponent: identity.clone(),
                    },
                );
            }
            None => {
                state.sessions.remove(&session_id);
                tracing::info!(%session_id, "session evicted");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Event log
    // -----------------------------------------------------------------------

    fn publish(&self, session_id: &SessionId, payload: serde_json::Value) {
        if let Some(publisher) = &self.inner.publisher {
            publisher.publish(GameEvent {
                topic: self.inner.config.event_topic.clone(),
                key: session_id.to_string(),
                payload,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Number of identities waiting for an opponent.
    pub async fn queue_len(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    /// The session `identity` is bound to, if any.
    pub async fn session_of(&self, identity: &Identity) -> Option<SessionId> {
        self.inner.state.lock().await.player_sessions.get(identity).cloned()
    }

    /// A copy of session `session_id` as it is right now.
    pub async fn snapshot(&self, session_id: &SessionId) -> Option<Session> {
        self.inner.state.lock().await.sessions.get(session_id).cloned()
    }

    /// Number of sessions in the index.
    pub async fn session_count(&self) -> usize {
        self.inner.state.lock().await.sessions.len()
    }
}
