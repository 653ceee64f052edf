//! End-to-end tests: real WebSocket clients against a running server.

use std::time::Duration;

use fourline::prelude::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// No bot interference unless a test asks for it.
fn humans_only() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.matchmaking.bot_timeout_ms = 60_000;
    config
}

/// Starts a server on a random port and returns its address and coordinator.
async fn start_server(config: ServerConfig) -> (String, Coordinator) {
    let server = FourlineServer::builder()
        .config(config)
        .bind("127.0.0.1:0".parse().unwrap())
        .build()
        .await
        .expect("server should build");

    let addr = server.local_addr().expect("should have local addr").to_string();
    let coordinator = server.coordinator().clone();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, coordinator)
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, value: Value) {
    ws.send(Message::text(value.to_string())).await.expect("send");
}

async fn recv(ws: &mut ClientWs) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("event should arrive in time")
        .expect("stream should be open")
        .expect("frame should be valid");
    serde_json::from_slice(&msg.into_data()).expect("event should be json")
}

/// Waits until the coordinator reports `expected` queued identities.
async fn wait_for_queue(coordinator: &Coordinator, expected: usize) {
    for _ in 0..200 {
        if coordinator.queue_len().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("queue never reached {expected}");
}

fn empty_board() -> Value {
    serde_json::to_value([[0u8; 7]; 6]).expect("board should serialize")
}

async fn join(ws: &mut ClientWs, name: &str) {
    send(ws, json!({"type": "join", "username": name})).await;
}

/// Connects alice then bob, pairs them, and returns the session id. Both
/// clients have consumed their `matched` and initial `state`.
async fn pair(addr: &str, coordinator: &Coordinator) -> (ClientWs, ClientWs, String) {
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    join(&mut alice, "alice").await;
    wait_for_queue(coordinator, 1).await;
    join(&mut bob, "bob").await;

    let matched = recv(&mut alice).await;
    let game_id = matched["gameId"].as_str().expect("gameId").to_owned();
    recv(&mut alice).await;
    recv(&mut bob).await;
    recv(&mut bob).await;
    (alice, bob, game_id)
}

async fn drop_piece(ws: &mut ClientWs, game_id: &str, column: i64) {
    send(ws, json!({"type": "drop", "gameId": game_id, "column": column})).await;
}

/// Plays alice: 3, bob: 4 until alice completes column 3. Leaves the final
/// `result` unread on both clients.
async fn play_alice_win(alice: &mut ClientWs, bob: &mut ClientWs, game_id: &str) {
    for turn in 0..7 {
        let (mover, column) = if turn % 2 == 0 { (&mut *alice, 3) } else { (&mut *bob, 4) };
        drop_piece(mover, game_id, column).await;
        assert_eq!(recv(alice).await["type"], "state");
        assert_eq!(recv(bob).await["type"], "state");
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_join_two_players_receive_matched_and_empty_state() {
    let (addr, coordinator) = start_server(humans_only()).await;
    let mut alice = connect(&addr).await;
    let mut bob = connect(&addr).await;

    join(&mut alice, "alice").await;
    wait_for_queue(&coordinator, 1).await;
    join(&mut bob, "bob").await;

    let matched = recv(&mut alice).await;
    assert_eq!(matched["type"], "matched");
    assert_eq!(matched["opponent"], "bob");
    assert_eq!(matched["you"], 1);
    assert_eq!(matched["gameId"].as_str().map(str::len), Some(32));

    let state = recv(&mut alice).await;
    assert_eq!(state["type"], "state");
    assert_eq!(state["nextTurn"], "alice");
    assert_eq!(state["board"], empty_board());

    let matched = recv(&mut bob).await;
    assert_eq!(matched["opponent"], "alice");
    assert_eq!(matched["you"], 2);
    assert_eq!(recv(&mut bob).await["type"], "state");
}

#[tokio::test]
async fn test_drop_four_in_a_column_sends_win_result() {
    let (addr, coordinator) = start_server(humans_only()).await;
    let (mut alice, mut bob, game_id) = pair(&addr, &coordinator).await;

    play_alice_win(&mut alice, &mut bob, &game_id).await;

    let expected = json!({"type": "result", "result": "win", "winner": "alice"});
    assert_eq!(recv(&mut alice).await, expected);
    assert_eq!(recv(&mut bob).await, expected);
}

#[tokio::test]
async fn test_drop_state_reports_pieces_and_next_turn() {
    let (addr, coordinator) = start_server(humans_only()).await;
    let (mut alice, mut bob, game_id) = pair(&addr, &coordinator).await;

    drop_piece(&mut alice, &game_id, 3).await;

    let state = recv(&mut bob).await;
    assert_eq!(state["nextTurn"], "bob");
    assert_eq!(state["board"][5][3], 1);
    assert_eq!(state["board"][4][3], 0);
    assert_eq!(recv(&mut alice).await, state);
}

#[tokio::test]
async fn test_drop_out_of_turn_returns_not_your_turn() {
    let (addr, coordinator) = start_server(humans_only()).await;
    let (_alice, mut bob, game_id) = pair(&addr, &coordinator).await;

    drop_piece(&mut bob, &game_id, 0).await;

    assert_eq!(
        recv(&mut bob).await,
        json!({"type": "error", "message": "not your turn"})
    );
}

#[tokio::test]
async fn test_drop_out_of_range_column_returns_invalid_move() {
    let (addr, coordinator) = start_server(humans_only()).await;
    let (mut alice, _bob, game_id) = pair(&addr, &coordinator).await;

    drop_piece(&mut alice, &game_id, 7).await;
    assert_eq!(recv(&mut alice).await["message"], "invalid move");

    drop_piece(&mut alice, &game_id, -1).await;
    assert_eq!(recv(&mut alice).await["message"], "invalid move");
}

#[tokio::test]
async fn test_drop_unknown_game_returns_game_not_found() {
    let (addr, coordinator) = start_server(humans_only()).await;
    let (mut alice, _bob, _game_id) = pair(&addr, &coordinator).await;

    drop_piece(&mut alice, "missing", 0).await;

    assert_eq!(recv(&mut alice).await["message"], "game not found");
}

#[tokio::test]
async fn test_unknown_message_type_returns_error() {
    let (addr, _coordinator) = start_server(humans_only()).await;
    let mut ws = connect(&addr).await;

    send(&mut ws, json!({"type": "chat", "text": "hi"})).await;

    assert_eq!(
        recv(&mut ws).await,
        json!({"type": "error", "message": "unknown message type"})
    );
}

#[tokio::test]
async fn test_malformed_json_returns_invalid_input() {
    let (addr, _coordinator) = start_server(humans_only()).await;
    let mut ws = connect(&addr).await;

    ws.send(Message::text("{not json")).await.expect("send");
    assert_eq!(recv(&mut ws).await["message"], "invalid input");

    // Known type, missing field.
    send(&mut ws, json!({"type": "drop", "column": 3})).await;
    assert_eq!(recv(&mut ws).await["message"], "invalid input");
}

#[tokio::test]
async fn test_drop_before_join_returns_invalid_input() {
    let (addr, _coordinator) = start_server(humans_only()).await;
    let mut ws = connect(&addr).await;

    drop_piece(&mut ws, "whatever", 3).await;
    assert_eq!(recv(&mut ws).await["message"], "invalid input");

    send(&mut ws, json!({"type": "rematch_request", "gameId": "whatever"})).await;
    assert_eq!(recv(&mut ws).await["message"], "invalid input");
}

#[tokio::test]
async fn test_join_with_second_name_on_same_connection_returns_invalid_input() {
    let (addr, coordinator) = start_server(humans_only()).await;
    let mut ws = connect(&addr).await;

    join(&mut ws, "alice").await;
    wait_for_queue(&coordinator, 1).await;
    join(&mut ws, "mallory").await;

    assert_eq!(recv(&mut ws).await["message"], "invalid input");
    assert_eq!(coordinator.queue_len().await, 1);
}

#[tokio::test]
async fn test_join_identity_held_by_other_connection_returns_error() {
    let (addr, coordinator) = start_server(humans_only()).await;
    let mut first = connect(&addr).await;
    let mut second = connect(&addr).await;

    join(&mut first, "alice").await;
    wait_for_queue(&coordinator, 1).await;
    join(&mut second, "alice").await;

    assert_eq!(
        recv(&mut second).await["message"],
        "identity already connected"
    );
}

#[tokio::test]
async fn test_disconnect_notifies_opponent() {
    let (addr, coordinator) = start_server(humans_only()).await;
    let (alice, mut bob, _game_id) = pair(&addr, &coordinator).await;

    drop(alice);

    assert_eq!(
        recv(&mut bob).await,
        json!({"type": "opponent_left", "opponent": "alice"})
    );
}

#[tokio::test]
async fn test_disconnect_while_queued_empties_queue() {
    let (addr, coordinator) = start_server(humans_only()).await;
    let mut alice = connect(&addr).await;

    join(&mut alice, "alice").await;
    wait_for_queue(&coordinator, 1).await;
    alice.close(None).await.expect("close");

    wait_for_queue(&coordinator, 0).await;
}

#[tokio::test]
async fn test_rematch_both_players_restarts_round() {
    let (addr, coordinator) = start_server(humans_only()).await;
    let (mut alice, mut bob, game_id) = pair(&addr, &coordinator).await;
    play_alice_win(&mut alice, &mut bob, &game_id).await;
    recv(&mut alice).await;
    recv(&mut bob).await;

    send(&mut bob, json!({"type": "rematch_request", "gameId": game_id})).await;
    let info = recv(&mut alice).await;
    assert_eq!(info["type"], "info");
    assert_eq!(
        info["message"],
        "bob requested a rematch. Click Rematch to accept."
    );

    send(&mut alice, json!({"type": "rematch_request", "gameId": game_id})).await;
    for ws in [&mut alice, &mut bob] {
        assert_eq!(
            recv(ws).await,
            json!({"type": "rematch_start", "message": "Rematch started!"})
        );
        let state = recv(ws).await;
        assert_eq!(state["nextTurn"], "alice");
        assert_eq!(state["board"], empty_board());
    }
}

#[tokio::test]
async fn test_rematch_during_play_returns_error() {
    let (addr, coordinator) = start_server(humans_only()).await;
    let (mut alice, _bob, game_id) = pair(&addr, &coordinator).await;

    send(&mut alice, json!({"type": "rematch_request", "gameId": game_id})).await;

    assert_eq!(recv(&mut alice).await["message"], "game still in progress");
}

#[tokio::test]
async fn test_lone_player_is_matched_with_bot_which_replies() {
    let mut config = ServerConfig::default();
    config.matchmaking.bot_timeout_ms = 50;
    config.matchmaking.bot_move_delay_ms = 10;
    let (addr, _coordinator) = start_server(config).await;
    let mut alice = connect(&addr).await;

    join(&mut alice, "alice").await;

    let matched = recv(&mut alice).await;
    assert_eq!(matched["type"], "matched");
    assert_eq!(matched["opponent"], BOT_IDENTITY);
    assert_eq!(matched["you"], 1);
    let game_id = matched["gameId"].as_str().expect("gameId").to_owned();
    assert_eq!(recv(&mut alice).await["nextTurn"], "alice");

    drop_piece(&mut alice, &game_id, 0).await;
    assert_eq!(recv(&mut alice).await["nextTurn"], BOT_IDENTITY);

    let reply = recv(&mut alice).await;
    assert_eq!(reply["type"], "state");
    assert_eq!(reply["nextTurn"], "alice");
    // Nothing to win or block yet, so the bot takes the center.
    assert_eq!(reply["board"][5][3], 2);
}

#[tokio::test]
async fn test_run_until_returns_when_shutdown_completes() {
    let server = FourlineServer::builder()
        .config(humans_only())
        .bind("127.0.0.1:0".parse().unwrap())
        .build()
        .await
        .expect("server should build");
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let running = tokio::spawn(server.run_until(async {
        let _ = rx.await;
    }));
    tx.send(()).expect("server should be waiting");

    let result = tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("server should stop")
        .expect("task should not panic");
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_build_zero_capacity_returns_config_error() {
    let mut config = humans_only();
    config.delivery.capacity = 0;

    let result = FourlineServer::builder()
        .config(config)
        .bind("127.0.0.1:0".parse().unwrap())
        .build()
        .await;

    assert!(matches!(result, Err(FourlineError::Config(_))));
}

#[tokio::test]
async fn test_silent_socket_does_not_delay_other_clients() {
    let (addr, coordinator) = start_server(humans_only()).await;

    // Connects at the TCP level and never sends the upgrade request.
    let _silent = tokio::net::TcpStream::connect(&addr).await.expect("tcp connect");
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut alice = tokio::time::timeout(Duration::from_secs(2), connect(&addr))
        .await
        .expect("handshake should not wait on the silent socket");
    join(&mut alice, "alice").await;
    wait_for_queue(&coordinator, 1).await;
}

#[tokio::test]
async fn test_silent_socket_is_closed_after_handshake_timeout() {
    use tokio::io::AsyncReadExt;

    let mut config = humans_only();
    config.server.handshake_timeout_ms = 100;
    let (addr, _coordinator) = start_server(config).await;

    let mut silent = tokio::net::TcpStream::connect(&addr).await.expect("tcp connect");
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), silent.read(&mut buf))
        .await
        .expect("server should hang up on the silent socket");
    assert!(matches!(read, Ok(0) | Err(_)));

    // The listener is still serving.
    let mut alice = connect(&addr).await;
    join(&mut alice, "alice").await;
    send(&mut alice, json!({"type": "drop", "gameId": "missing", "column": 0})).await;
    assert_eq!(recv(&mut alice).await["type"], "error");
}
