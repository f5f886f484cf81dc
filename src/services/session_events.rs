//! Session events fanned out after a successful coordinator operation.
//!
//! `origin` is the connection that triggered the operation, if any. Events
//! acknowledged separately skip it; the others are delivered to it exactly
//! once even when it is not registered in the session.

use crate::{
    dao::models::{GamePlayerEntity, GameSessionEntity, PlayerAnswerEntity},
    dto::{format_system_time, ws::ServerMessage},
    services::{broadcast::send_to, session_service::ChatLine},
    state::{ConnectionHandle, SharedState},
};

/// Announce a new player to the rest of the session.
pub fn broadcast_player_joined(
    state: &SharedState,
    player: &GamePlayerEntity,
    origin: Option<&ConnectionHandle>,
) -> usize {
    let message = ServerMessage::PlayerJoined {
        session_id: player.session_id.clone(),
        player: player.clone().into(),
    };
    to_others(state, &player.session_id, &message, origin)
}

/// Tell everyone, the host included, that the game is running.
pub fn broadcast_game_started(
    state: &SharedState,
    session: &GameSessionEntity,
    origin: Option<&ConnectionHandle>,
) -> usize {
    let message = ServerMessage::GameStarted {
        session_id: session.id.clone(),
        session: session.clone().into(),
    };
    to_everyone(state, &session.id, &message, origin)
}

/// Tell the other players someone answered, without revealing the choice.
pub fn broadcast_answer_submitted(
    state: &SharedState,
    answer: &PlayerAnswerEntity,
    origin: Option<&ConnectionHandle>,
) -> usize {
    let message = ServerMessage::AnswerSubmitted {
        session_id: answer.session_id.clone(),
        player_id: answer.player_id,
        question_id: answer.question_id,
    };
    to_others(state, &answer.session_id, &message, origin)
}

/// Final standings; `ranking` is expected in rank order.
pub fn broadcast_game_ended(
    state: &SharedState,
    session: &GameSessionEntity,
    ranking: Vec<GamePlayerEntity>,
    origin: Option<&ConnectionHandle>,
) -> usize {
    let message = ServerMessage::GameEnded {
        session_id: session.id.clone(),
        session: session.clone().into(),
        players: ranking.into_iter().map(Into::into).collect(),
    };
    to_everyone(state, &session.id, &message, origin)
}

/// Relay a chat line to the whole session, sender included.
pub fn broadcast_chat(
    state: &SharedState,
    line: ChatLine,
    origin: Option<&ConnectionHandle>,
) -> usize {
    let session_id = line.session_id.clone();
    let message = ServerMessage::ChatMessage {
        session_id: line.session_id,
        user_id: line.user_id,
        nickname: line.nickname,
        message: line.message,
        sent_at: format_system_time(line.sent_at),
    };
    to_everyone(state, &session_id, &message, origin)
}

fn to_others(
    state: &SharedState,
    session_id: &str,
    message: &ServerMessage,
    origin: Option<&ConnectionHandle>,
) -> usize {
    state
        .dispatcher()
        .broadcast(session_id, message, origin.map(|handle| handle.id))
}

fn to_everyone(
    state: &SharedState,
    session_id: &str,
    message: &ServerMessage,
    origin: Option<&ConnectionHandle>,
) -> usize {
    let mut delivered = to_others(state, session_id, message, origin);
    if let Some(origin) = origin {
        if send_to(&origin.tx, message) {
            delivered += 1;
        }
    }
    delivered
}
