use std::time::Duration;

use axum::{
    body::Bytes,
    extract::ws::{Message, WebSocket},
};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{debug, info, warn};

use crate::{
    dao::models::UserId,
    dto::ws::{ClientAction, ServerMessage},
    error::ServiceError,
    services::{
        broadcast::send_to,
        session_events,
        session_service::AnswerSubmission,
    },
    state::{ConnectionHandle, ConnectionId, SharedState},
};

/// The connection's writer is gone; the read loop should stop.
#[derive(Debug, Error)]
#[error("connection closed")]
pub struct ConnectionClosed;

#[derive(Debug, Error)]
enum GatewayError {
    #[error(transparent)]
    Closed(#[from] ConnectionClosed),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Per-connection dispatcher between decoded client actions and the coordinator.
///
/// Dropping the gateway unregisters its connection, whatever the reason the
/// read loop ended.
pub struct Gateway {
    state: SharedState,
    connection: ConnectionHandle,
    identity: Option<UserId>,
}

impl Gateway {
    /// `identity` is the user authenticated on the upgrade request, if any.
    pub fn new(state: SharedState, connection: ConnectionHandle, identity: Option<UserId>) -> Self {
        Self {
            state,
            connection,
            identity,
        }
    }

    /// Identifier of the underlying connection.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id
    }

    /// Decode and run one text frame.
    ///
    /// Domain failures are answered with an `error` event to this connection
    /// only; they never end the connection.
    pub async fn handle_text(&self, text: &str) -> Result<(), ConnectionClosed> {
        let action = match ClientAction::from_json_str(text) {
            Ok(action) => action,
            Err(err) => {
                debug!(
                    connection_id = %self.connection.id,
                    error = %err,
                    "rejected client message"
                );
                return self.reply_error(&err);
            }
        };

        let name = action.name();
        match self.dispatch(action).await {
            Ok(()) => Ok(()),
            Err(GatewayError::Closed(closed)) => Err(closed),
            Err(GatewayError::Service(err)) => {
                match &err {
                    ServiceError::Persistence(_) | ServiceError::Degraded => warn!(
                        connection_id = %self.connection.id,
                        action = name,
                        error = %err,
                        "action failed on storage"
                    ),
                    _ => debug!(
                        connection_id = %self.connection.id,
                        action = name,
                        error = %err,
                        "action rejected"
                    ),
                }
                self.reply_error(&err)
            }
        }
    }

    /// Send an `error` event to this connection.
    pub fn reply_error(&self, err: &ServiceError) -> Result<(), ConnectionClosed> {
        self.reply(&ServerMessage::from_error(err))
    }

    fn reply(&self, message: &ServerMessage) -> Result<(), ConnectionClosed> {
        if send_to(&self.connection.tx, message) {
            Ok(())
        } else {
            Err(ConnectionClosed)
        }
    }

    fn authorize(&self, action: &ClientAction) -> Result<(), ServiceError> {
        let claimed = action.user_id();
        if self.identity.is_some_and(|identity| identity != claimed) {
            return Err(ServiceError::Forbidden(format!(
                "connection is authenticated as another user than {claimed}"
            )));
        }
        if let Some(membership) = self.state.registry().membership(self.connection.id) {
            if membership.user_id != claimed {
                return Err(ServiceError::Forbidden(format!(
                    "connection joined as user {}",
                    membership.user_id
                )));
            }
        }
        Ok(())
    }

    async fn dispatch(&self, action: ClientAction) -> Result<(), GatewayError> {
        self.authorize(&action)?;
        let coordinator = self.state.coordinator();
        let origin = Some(&self.connection);

        match action {
            ClientAction::JoinSession(payload) => {
                let outcome = coordinator
                    .join_session(&payload.session_id, payload.user_id, &payload.nickname)
                    .await?;
                // Registered before the ack so no later event is missed.
                self.state.registry().register(
                    self.connection.clone(),
                    &outcome.session.id,
                    outcome.player.user_id,
                );
                self.reply(&ServerMessage::Joined {
                    session: outcome.session.into(),
                    player: outcome.player.clone().into(),
                })?;
                if outcome.newly_joined {
                    session_events::broadcast_player_joined(&self.state, &outcome.player, origin);
                }
            }
            ClientAction::StartGame(payload) => {
                let session = coordinator
                    .start_session(&payload.session_id, payload.user_id)
                    .await?;
                session_events::broadcast_game_started(&self.state, &session, origin);
            }
            ClientAction::SubmitAnswer(payload) => {
                let receipt = coordinator
                    .submit_answer(AnswerSubmission {
                        session_id: payload.session_id,
                        user_id: payload.user_id,
                        question_id: payload.question_id,
                        choice_id: payload.choice_id,
                        elapsed_secs: payload.time_spent,
                    })
                    .await?;
                self.reply(&ServerMessage::AnswerRecorded {
                    answer: receipt.answer.clone().into(),
                    player_score: receipt.player_score,
                })?;
                session_events::broadcast_answer_submitted(&self.state, &receipt.answer, origin);
            }
            ClientAction::EndGame(payload) => {
                let session = coordinator
                    .end_session(&payload.session_id, payload.user_id)
                    .await?;
                let ranking = match coordinator.session_results(&session.id).await {
                    Ok(results) => results.ranking,
                    Err(err) => {
                        warn!(
                            session_id = %session.id,
                            error = %err,
                            "failed to load final standings"
                        );
                        Vec::new()
                    }
                };
                session_events::broadcast_game_ended(&self.state, &session, ranking, origin);
            }
            ClientAction::ChatMessage(payload) => {
                let line = coordinator
                    .post_chat(&payload.session_id, payload.user_id, &payload.message)
                    .await?;
                session_events::broadcast_chat(&self.state, line, origin);
            }
        }
        Ok(())
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        if let Some(membership) = self.state.registry().unregister(self.connection.id) {
            info!(
                connection_id = %self.connection.id,
                session_id = %membership.session_id,
                user_id = membership.user_id,
                "connection left session"
            );
        }
    }
}

/// Handle the full lifecycle of one player WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket, identity: Option<UserId>) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sender.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    let gateway = Gateway::new(
        state.clone(),
        ConnectionHandle::new(outbound_tx.clone()),
        identity,
    );
    let connection_id = gateway.connection_id();
    info!(%connection_id, ?identity, "websocket connected");

    let heartbeat_every = state.config().heartbeat_interval;
    let idle_timeout = state.config().idle_timeout;
    let mut heartbeat = interval_at(Instant::now() + heartbeat_every, heartbeat_every);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            inbound = receiver.next() => {
                let Some(inbound) = inbound else {
                    break;
                };
                last_seen = Instant::now();
                match inbound {
                    Ok(Message::Text(text)) => {
                        if gateway.handle_text(text.as_str()).await.is_err() {
                            info!(%connection_id, "writer closed; terminating");
                            break;
                        }
                    }
                    Ok(Message::Binary(_)) => {
                        let err =
                            ServiceError::Validation("binary frames are not supported".into());
                        if gateway.reply_error(&err).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        let _ = outbound_tx.send(Message::Pong(payload));
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(frame)) => {
                        let _ = outbound_tx.send(Message::Close(frame));
                        break;
                    }
                    Err(err) => {
                        warn!(%connection_id, error = %err, "websocket error");
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if idle_expired(last_seen.elapsed(), idle_timeout) {
                    info!(%connection_id, "closing idle websocket");
                    let _ = outbound_tx.send(Message::Close(None));
                    break;
                }
                if outbound_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
            }
        }
    }

    drop(gateway);
    info!(%connection_id, "websocket disconnected");
    finalize(writer_task, outbound_tx).await;
}

fn idle_expired(silent_for: Duration, idle_timeout: Duration) -> bool {
    silent_for >= idle_timeout
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            game_store::memory::{CatalogSeed, MemoryGameStore, MemoryQuizCatalog},
            models::SessionStatus,
        },
        state::{AppState, Backend},
    };

    const HOST: UserId = 1;
    const ALICE: UserId = 2;
    const BOB: UserId = 3;

    fn state() -> SharedState {
        let seed: CatalogSeed = serde_json::from_value(json!({
            "quizzes": [{
                "id": 1,
                "title": "Capitals",
                "questions": [
                    {
                        "id": 1,
                        "choices": [{"id": 10, "is_correct": true}, {"id": 11, "is_correct": false}]
                    },
                    {"id": 2, "choices": [{"id": 20, "is_correct": true}]}
                ]
            }]
        }))
        .unwrap();
        AppState::with_backend(
            AppConfig::default(),
            Backend::new(
                Arc::new(MemoryGameStore::new()),
                Arc::new(MemoryQuizCatalog::from_seed(seed)),
            ),
        )
    }

    fn connect(
        state: &SharedState,
        identity: Option<UserId>,
    ) -> (Gateway, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gateway = Gateway::new(state.clone(), ConnectionHandle::new(tx), identity);
        (gateway, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Value> {
        let mut events = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let Message::Text(text) = message {
                events.push(serde_json::from_str(text.as_str()).unwrap());
            }
        }
        events
    }

    fn types(events: &[Value]) -> Vec<&str> {
        events
            .iter()
            .map(|event| event["type"].as_str().unwrap())
            .collect()
    }

    async fn join(gateway: &Gateway, session_id: &str, user_id: UserId) {
        let frame = json!({
            "action": "join_session",
            "payload": {
                "sessionId": session_id,
                "userId": user_id,
                "nickname": format!("user{user_id}")
            }
        });
        gateway.handle_text(&frame.to_string()).await.unwrap();
    }

    async fn host_action(gateway: &Gateway, action: &str, session_id: &str) {
        let frame = json!({"action": action, "payload": {"sessionId": session_id, "userId": HOST}});
        gateway.handle_text(&frame.to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn join_registers_before_acknowledging() {
        let state = state();
        let session = state.coordinator().create_session(HOST, 1).await.unwrap();
        let (host, mut host_rx) = connect(&state, Some(HOST));
        let (alice, mut alice_rx) = connect(&state, Some(ALICE));

        join(&host, &session.id, HOST).await;
        let events = drain(&mut host_rx);
        assert_eq!(types(&events), ["joined"]);
        assert_eq!(events[0]["payload"]["player"]["nickname"], "Host");
        assert_eq!(state.registry().connection_count(&session.id), 1);

        join(&alice, &session.id, ALICE).await;
        assert_eq!(types(&drain(&mut alice_rx)), ["joined"]);
        let events = drain(&mut host_rx);
        assert_eq!(types(&events), ["player_joined"]);
        assert_eq!(events[0]["payload"]["player"]["userId"], ALICE);

        // Joining again acknowledges without a second announcement.
        join(&alice, &session.id, ALICE).await;
        assert_eq!(types(&drain(&mut alice_rx)), ["joined"]);
        assert!(drain(&mut host_rx).is_empty());
        assert_eq!(state.registry().connection_count(&session.id), 2);
    }

    #[tokio::test]
    async fn game_events_reach_every_connection() {
        let state = state();
        let session = state.coordinator().create_session(HOST, 1).await.unwrap();
        let (host, mut host_rx) = connect(&state, None);
        let (alice, mut alice_rx) = connect(&state, None);
        let (bob, mut bob_rx) = connect(&state, None);
        join(&host, &session.id, HOST).await;
        join(&alice, &session.id, ALICE).await;
        join(&bob, &session.id, BOB).await;
        for rx in [&mut host_rx, &mut alice_rx, &mut bob_rx] {
            drain(rx);
        }

        host_action(&host, "start_game", &session.id).await;
        for rx in [&mut host_rx, &mut alice_rx, &mut bob_rx] {
            let events = drain(rx);
            assert_eq!(types(&events), ["game_started"]);
            assert_eq!(events[0]["payload"]["session"]["status"], "in_progress");
        }

        drop(bob);
        assert_eq!(state.registry().connection_count(&session.id), 2);

        host_action(&host, "end_game", &session.id).await;
        for rx in [&mut host_rx, &mut alice_rx] {
            let events = drain(rx);
            assert_eq!(types(&events), ["game_ended"]);
            assert_eq!(events[0]["payload"]["players"].as_array().unwrap().len(), 3);
        }
        assert!(drain(&mut bob_rx).is_empty());
        assert_eq!(
            state.coordinator().get_session(&session.id).await.unwrap().status,
            SessionStatus::Completed
        );
    }

    #[tokio::test]
    async fn answers_are_acknowledged_and_announced_without_the_choice() {
        let state = state();
        let session = state.coordinator().create_session(HOST, 1).await.unwrap();
        let (host, mut host_rx) = connect(&state, None);
        let (alice, mut alice_rx) = connect(&state, None);
        join(&host, &session.id, HOST).await;
        join(&alice, &session.id, ALICE).await;
        host_action(&host, "start_game", &session.id).await;
        drain(&mut host_rx);
        drain(&mut alice_rx);

        let frame = json!({
            "action": "submit_answer",
            "payload": {
                "sessionId": session.id,
                "userId": ALICE,
                "questionId": 1,
                "choiceId": 10,
                "timeSpent": 4.0
            }
        });
        alice.handle_text(&frame.to_string()).await.unwrap();

        let events = drain(&mut alice_rx);
        assert_eq!(types(&events), ["answer_recorded"]);
        assert_eq!(events[0]["payload"]["playerScore"], 100);
        assert_eq!(events[0]["payload"]["answer"]["choiceId"], 10);

        let events = drain(&mut host_rx);
        assert_eq!(types(&events), ["answer_submitted"]);
        assert_eq!(events[0]["payload"]["playerId"], ALICE);
        assert!(events[0]["payload"].get("choiceId").is_none());

        alice.handle_text(&frame.to_string()).await.unwrap();
        let events = drain(&mut alice_rx);
        assert_eq!(types(&events), ["error"]);
        assert_eq!(events[0]["payload"]["code"], "duplicate");
        assert!(drain(&mut host_rx).is_empty());
    }

    #[tokio::test]
    async fn errors_go_to_the_sender_only() {
        let state = state();
        let session = state.coordinator().create_session(HOST, 1).await.unwrap();
        let (host, mut host_rx) = connect(&state, None);
        let (alice, mut alice_rx) = connect(&state, None);
        join(&host, &session.id, HOST).await;
        join(&alice, &session.id, ALICE).await;
        drain(&mut host_rx);
        drain(&mut alice_rx);

        let frame = json!({
            "action": "start_game",
            "payload": {"sessionId": session.id, "userId": ALICE}
        });
        alice.handle_text(&frame.to_string()).await.unwrap();
        let events = drain(&mut alice_rx);
        assert_eq!(events[0]["payload"]["code"], "forbidden");

        alice.handle_text("{not json").await.unwrap();
        let events = drain(&mut alice_rx);
        assert_eq!(events[0]["payload"]["code"], "validation");

        join(&alice, "missing", ALICE).await;
        let events = drain(&mut alice_rx);
        assert_eq!(events[0]["payload"]["code"], "not_found");

        assert!(drain(&mut host_rx).is_empty());
    }

    #[tokio::test]
    async fn actions_must_match_the_connection_identity() {
        let state = state();
        let session = state.coordinator().create_session(HOST, 1).await.unwrap();

        let (authenticated, mut rx) = connect(&state, Some(ALICE));
        join(&authenticated, &session.id, BOB).await;
        assert_eq!(drain(&mut rx)[0]["payload"]["code"], "forbidden");
        assert_eq!(state.registry().connection_count(&session.id), 0);

        let (anonymous, mut rx) = connect(&state, None);
        join(&anonymous, &session.id, ALICE).await;
        drain(&mut rx);
        let frame = json!({
            "action": "chat_message",
            "payload": {"sessionId": session.id, "userId": BOB, "message": "hi"}
        });
        anonymous.handle_text(&frame.to_string()).await.unwrap();
        assert_eq!(drain(&mut rx)[0]["payload"]["code"], "forbidden");
    }

    #[tokio::test]
    async fn chat_is_echoed_to_the_whole_session() {
        let state = state();
        let session = state.coordinator().create_session(HOST, 1).await.unwrap();
        let (host, mut host_rx) = connect(&state, None);
        let (alice, mut alice_rx) = connect(&state, None);
        join(&host, &session.id, HOST).await;
        join(&alice, &session.id, ALICE).await;
        drain(&mut host_rx);
        drain(&mut alice_rx);

        let frame = json!({
            "action": "chat_message",
            "payload": {"sessionId": session.id, "userId": ALICE, "message": "good luck"}
        });
        alice.handle_text(&frame.to_string()).await.unwrap();
        for rx in [&mut host_rx, &mut alice_rx] {
            let events = drain(rx);
            assert_eq!(types(&events), ["chat_message"]);
            assert_eq!(events[0]["payload"]["nickname"], "user2");
            assert_eq!(events[0]["payload"]["message"], "good luck");
        }
    }

    #[tokio::test]
    async fn closed_writer_stops_the_gateway() {
        let state = state();
        let (gateway, rx) = connect(&state, None);
        drop(rx);
        assert!(gateway.handle_text("{}").await.is_err());
    }

    #[test]
    fn idle_timeout_boundary() {
        let idle = Duration::from_secs(60);
        assert!(!idle_expired(Duration::from_secs(59), idle));
        assert!(idle_expired(Duration::from_secs(60), idle));
    }
}
