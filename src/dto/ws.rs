//! Live session protocol.
//!
//! Clients send `{"action": ..., "payload": {...}}`; the server answers with
//! `{"type": ..., "payload": {...}}`. Payload fields are camelCase.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{ChoiceId, QuestionId, UserId},
    dto::{
        game::{AnswerSummary, PlayerSummary, SessionSummary},
        validation::{validate_chat_message, validate_nickname, validate_time_spent},
    },
    error::ServiceError,
};

/// Actions accepted from WebSocket clients.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum ClientAction {
    /// Register the connection in a session, creating the player if needed.
    JoinSession(JoinSessionPayload),
    /// Host moves the session from the lobby to in progress.
    StartGame(HostActionPayload),
    /// Answer the given question.
    SubmitAnswer(SubmitAnswerPayload),
    /// Host completes the session.
    EndGame(HostActionPayload),
    /// Chat line relayed to the whole session.
    ChatMessage(ChatPayload),
}

/// Payload of [`ClientAction::JoinSession`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionPayload {
    /// Session to join.
    #[validate(length(min = 1, max = 64))]
    pub session_id: String,
    /// User joining.
    pub user_id: UserId,
    /// Display name; blank means a generated `Player_<n>`.
    #[serde(default)]
    pub nickname: String,
}

/// Payload of the host-only actions.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct HostActionPayload {
    /// Target session.
    #[validate(length(min = 1, max = 64))]
    pub session_id: String,
    /// Must be the session host.
    pub user_id: UserId,
}

/// Payload of [`ClientAction::SubmitAnswer`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerPayload {
    /// Session being played.
    #[validate(length(min = 1, max = 64))]
    pub session_id: String,
    /// Answering player.
    pub user_id: UserId,
    /// Question answered.
    pub question_id: QuestionId,
    /// Selected choice.
    pub choice_id: ChoiceId,
    /// Seconds the player took to answer.
    pub time_spent: f64,
}

/// Payload of [`ClientAction::ChatMessage`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    /// Session to post in.
    #[validate(length(min = 1, max = 64))]
    pub session_id: String,
    /// Sender, who must be a player of the session.
    pub user_id: UserId,
    /// Message text, 1 to 500 characters.
    pub message: String,
}

impl ClientAction {
    /// Decode and validate a text frame.
    pub fn from_json_str(text: &str) -> Result<Self, ServiceError> {
        let action: Self = serde_json::from_str(text)
            .map_err(|err| ServiceError::Validation(format!("malformed message: {err}")))?;
        action.validate()?;
        Ok(action)
    }

    /// Wire name of the action, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ClientAction::JoinSession(_) => "join_session",
            ClientAction::StartGame(_) => "start_game",
            ClientAction::SubmitAnswer(_) => "submit_answer",
            ClientAction::EndGame(_) => "end_game",
            ClientAction::ChatMessage(_) => "chat_message",
        }
    }

    /// Session the action targets.
    pub fn session_id(&self) -> &str {
        match self {
            ClientAction::JoinSession(payload) => &payload.session_id,
            ClientAction::StartGame(payload) | ClientAction::EndGame(payload) => {
                &payload.session_id
            }
            ClientAction::SubmitAnswer(payload) => &payload.session_id,
            ClientAction::ChatMessage(payload) => &payload.session_id,
        }
    }

    /// User the action claims to act for.
    pub fn user_id(&self) -> UserId {
        match self {
            ClientAction::JoinSession(payload) => payload.user_id,
            ClientAction::StartGame(payload) | ClientAction::EndGame(payload) => payload.user_id,
            ClientAction::SubmitAnswer(payload) => payload.user_id,
            ClientAction::ChatMessage(payload) => payload.user_id,
        }
    }
}

impl Validate for ClientAction {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = match self {
            ClientAction::JoinSession(payload) => payload.validate().err(),
            ClientAction::StartGame(payload) | ClientAction::EndGame(payload) => {
                payload.validate().err()
            }
            ClientAction::SubmitAnswer(payload) => payload.validate().err(),
            ClientAction::ChatMessage(payload) => payload.validate().err(),
        }
        .unwrap_or_else(ValidationErrors::new);

        match self {
            ClientAction::JoinSession(payload) => {
                if let Err(e) = validate_nickname(&payload.nickname) {
                    errors.add("nickname", e);
                }
            }
            ClientAction::SubmitAnswer(payload) => {
                if let Err(e) = validate_time_spent(payload.time_spent) {
                    errors.add("timeSpent", e);
                }
            }
            ClientAction::ChatMessage(payload) => {
                if let Err(e) = validate_chat_message(&payload.message) {
                    errors.add("message", e);
                }
            }
            ClientAction::StartGame(_) | ClientAction::EndGame(_) => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Events pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Acknowledges a join to the joining connection only.
    Joined {
        /// Session joined.
        session: SessionSummary,
        /// Player row of the joining user.
        player: PlayerSummary,
    },
    /// A new player entered the lobby.
    PlayerJoined {
        /// Session joined.
        session_id: String,
        /// The new player.
        player: PlayerSummary,
    },
    /// The host started the game.
    GameStarted {
        /// Started session.
        session_id: String,
        /// Session with its start timestamp.
        session: SessionSummary,
    },
    /// Full answer and updated score, sent to the submitter only.
    AnswerRecorded {
        /// Stored answer with correctness and points.
        answer: AnswerSummary,
        /// Score after the answer; `None` when the score update could not be confirmed.
        player_score: Option<u32>,
    },
    /// Notice for the rest of the session; the chosen choice is withheld.
    AnswerSubmitted {
        /// Session being played.
        session_id: String,
        /// Player who answered.
        player_id: UserId,
        /// Question answered.
        question_id: QuestionId,
    },
    /// The host ended the game.
    GameEnded {
        /// Completed session.
        session_id: String,
        /// Session with its finish timestamp.
        session: SessionSummary,
        /// Final standings, highest score first.
        players: Vec<PlayerSummary>,
    },
    /// Chat line from a player.
    ChatMessage {
        /// Session the line was posted in.
        session_id: String,
        /// Sender.
        user_id: UserId,
        /// Sender's nickname in this session.
        nickname: String,
        /// Message text.
        message: String,
        /// RFC 3339 timestamp.
        sent_at: String,
    },
    /// Rejected action, sent only to the connection that issued it.
    Error {
        /// Stable error code such as `forbidden` or `invalid_state`.
        code: String,
        /// Human readable detail.
        message: String,
    },
}

impl ServerMessage {
    /// Error event for a failed action.
    pub fn from_error(err: &ServiceError) -> Self {
        ServerMessage::Error {
            code: err.code().to_owned(),
            message: err.to_string(),
        }
    }
}
