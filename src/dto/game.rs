//! REST payloads for the game session API.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{
        ChoiceId, GamePlayerEntity, GameSessionEntity, PlayerAnswerEntity, QuestionId, QuizId,
        SessionStatus, UserId,
    },
    dto::{
        format_system_time,
        validation::{validate_nickname, validate_time_spent},
    },
    services::session_service::SessionResults,
};

/// Session as exposed to clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Short shareable session code.
    pub id: String,
    /// Quiz being played.
    pub quiz_id: QuizId,
    /// User who created the session.
    pub host_id: UserId,
    /// Lifecycle state.
    pub status: SessionStatus,
    /// RFC 3339 timestamp, set once the game started.
    pub started_at: Option<String>,
    /// RFC 3339 timestamp, set once the game ended.
    pub finished_at: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl From<GameSessionEntity> for SessionSummary {
    fn from(value: GameSessionEntity) -> Self {
        Self {
            id: value.id,
            quiz_id: value.quiz_id,
            host_id: value.host_id,
            status: value.status,
            started_at: value.started_at.map(format_system_time),
            finished_at: value.finished_at.map(format_system_time),
            created_at: format_system_time(value.created_at),
        }
    }
}

/// Player of a session with its running score.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    /// Player row identifier.
    pub id: Uuid,
    /// Session the player belongs to.
    pub session_id: String,
    /// Underlying user.
    pub user_id: UserId,
    /// Display name within the session.
    pub nickname: String,
    /// Points accumulated so far.
    pub score: u32,
    /// RFC 3339 join timestamp.
    pub joined_at: String,
}

impl From<GamePlayerEntity> for PlayerSummary {
    fn from(value: GamePlayerEntity) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            user_id: value.user_id,
            nickname: value.nickname,
            score: value.score,
            joined_at: format_system_time(value.joined_at),
        }
    }
}

/// Recorded answer with its scoring outcome.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSummary {
    /// Answer identifier.
    pub id: Uuid,
    /// Session the answer was given in.
    pub session_id: String,
    /// Quiz owning the question.
    pub quiz_id: QuizId,
    /// Question answered.
    pub question_id: QuestionId,
    /// Answering user.
    pub player_id: UserId,
    /// Selected choice.
    pub choice_id: ChoiceId,
    /// Seconds taken to answer.
    pub time_spent: f64,
    /// Whether the selected choice is correct.
    pub is_correct: bool,
    /// Points awarded.
    pub points: u32,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

impl From<PlayerAnswerEntity> for AnswerSummary {
    fn from(value: PlayerAnswerEntity) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            quiz_id: value.quiz_id,
            question_id: value.question_id,
            player_id: value.player_id,
            choice_id: value.choice_id,
            time_spent: value.elapsed_secs,
            is_correct: value.is_correct,
            points: value.points,
            created_at: format_system_time(value.created_at),
        }
    }
}

/// Session with its players in join order.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionDetail {
    /// The session.
    pub session: SessionSummary,
    /// Players in join order.
    pub players: Vec<PlayerSummary>,
}

/// Final standings: players ranked by score and every recorded answer.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResultsResponse {
    /// The session.
    pub session: SessionSummary,
    /// Players, highest score first.
    pub players: Vec<PlayerSummary>,
    /// Every answer recorded in the session.
    pub answers: Vec<AnswerSummary>,
}

impl From<SessionResults> for SessionResultsResponse {
    fn from(value: SessionResults) -> Self {
        Self {
            session: value.session.into(),
            players: value.ranking.into_iter().map(Into::into).collect(),
            answers: value.answers.into_iter().map(Into::into).collect(),
        }
    }
}

/// Outcome of an answer submission.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    /// Stored answer.
    pub answer: AnswerSummary,
    /// Player score after this answer; absent when the increment could not be applied.
    pub player_score: Option<u32>,
}

/// Body of `POST /api/v1/games/sessions`.
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Quiz to play.
    #[validate(range(min = 1))]
    pub quiz_id: QuizId,
}

/// Body of the join endpoint.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct JoinSessionRequest {
    /// Display name; a `Player_<n>` name is generated when blank.
    #[serde(default)]
    pub nickname: String,
}

impl Validate for JoinSessionRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_nickname(&self.nickname) {
            errors.add("nickname", e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Body of the answer endpoint; the player is the caller.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    /// Question answered.
    pub question_id: QuestionId,
    /// Selected choice.
    pub choice_id: ChoiceId,
    /// Non-negative seconds taken to answer.
    pub time_spent: f64,
}

impl Validate for SubmitAnswerRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_time_spent(self.time_spent) {
            errors.add("timeSpent", e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Query string of `GET /api/v1/games/sessions`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct SessionListQuery {
    /// List the caller's own sessions instead of open lobbies.
    #[serde(default)]
    pub host_only: bool,
}
