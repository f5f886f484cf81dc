use serde::{Deserialize, Serialize};
use std::{fmt, time::SystemTime};
use utoipa::ToSchema;
use uuid::Uuid;

/// Numeric user identifier supplied by the identity collaborator.
pub type UserId = u64;
/// Identifier of a quiz owned by the quiz-authoring collaborator.
pub type QuizId = u64;
/// Identifier of a question owned by the quiz-authoring collaborator.
pub type QuestionId = u64;
/// Identifier of a choice owned by the quiz-authoring collaborator.
pub type ChoiceId = u64;

/// Lifecycle status of a live game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Players may join, answers are refused.
    Lobby,
    /// The host started the game; answers are accepted.
    InProgress,
    /// The host ended the game. Terminal.
    Completed,
}

impl SessionStatus {
    /// Storage representation, identical to the serde one.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Lobby => "lobby",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One trivia round instance as persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSessionEntity {
    /// Opaque identifier generated at creation, never reused.
    pub id: String,
    /// Quiz played during this session.
    pub quiz_id: QuizId,
    /// User who created the session and alone may start or end it.
    pub host_id: UserId,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Set when the session enters [`SessionStatus::InProgress`].
    pub started_at: Option<SystemTime>,
    /// Set when the session enters [`SessionStatus::Completed`].
    pub finished_at: Option<SystemTime>,
    /// Creation timestamp.
    pub created_at: SystemTime,
}

impl GameSessionEntity {
    /// Build a fresh lobby session with a newly generated identifier.
    pub fn new_lobby(quiz_id: QuizId, host_id: UserId, created_at: SystemTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            quiz_id,
            host_id,
            status: SessionStatus::Lobby,
            started_at: None,
            finished_at: None,
            created_at,
        }
    }
}

/// Status change requested from the storage layer as a compare-and-swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTransition {
    /// Status the session must still be in for the change to apply.
    pub from: SessionStatus,
    /// Status written on success.
    pub to: SessionStatus,
    /// Timestamp recorded alongside the new status.
    pub at: SystemTime,
}

impl SessionTransition {
    /// Apply the transition to an in-memory record, returning `false` when the
    /// record is no longer in the expected status.
    pub fn apply_to(&self, session: &mut GameSessionEntity) -> bool {
        if session.status != self.from {
            return false;
        }
        session.status = self.to;
        match self.to {
            SessionStatus::InProgress => session.started_at = Some(self.at),
            SessionStatus::Completed => session.finished_at = Some(self.at),
            SessionStatus::Lobby => {}
        }
        true
    }
}

/// Membership of one user in one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GamePlayerEntity {
    /// Stable identifier of the membership row.
    pub id: Uuid,
    /// Session the player belongs to.
    pub session_id: String,
    /// Member user.
    pub user_id: UserId,
    /// Display nickname.
    pub nickname: String,
    /// Accumulated score.
    pub score: u32,
    /// Join timestamp.
    pub joined_at: SystemTime,
}

impl GamePlayerEntity {
    /// Build a new membership row with a zero score.
    pub fn new(
        session_id: String,
        user_id: UserId,
        nickname: String,
        joined_at: SystemTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            user_id,
            nickname,
            score: 0,
            joined_at,
        }
    }
}

/// One scored response. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerAnswerEntity {
    /// Stable identifier of the answer.
    pub id: Uuid,
    /// Session the answer was submitted in.
    pub session_id: String,
    /// Quiz the session is bound to.
    pub quiz_id: QuizId,
    /// Question being answered.
    pub question_id: QuestionId,
    /// Answering user.
    pub player_id: UserId,
    /// Choice picked by the player.
    pub choice_id: ChoiceId,
    /// Seconds the player took to answer.
    pub elapsed_secs: f64,
    /// Whether the choice is flagged correct.
    pub is_correct: bool,
    /// Points awarded by the scoring policy.
    pub points: u32,
    /// Submission timestamp.
    pub created_at: SystemTime,
}

/// Outcome of an answer write.
///
/// `player_score` is `None` when the answer was recorded but the score
/// increment could not be applied (non-transactional backends only).
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerReceipt {
    /// The stored answer.
    pub answer: PlayerAnswerEntity,
    /// Player score after the increment, when it was applied.
    pub player_score: Option<u32>,
}

/// Question reference served by the quiz catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Question identifier.
    pub id: QuestionId,
    /// Quiz owning the question.
    pub quiz_id: QuizId,
}

/// Choice reference served by the quiz catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChoiceEntity {
    /// Choice identifier.
    pub id: ChoiceId,
    /// Question owning the choice.
    pub question_id: QuestionId,
    /// Whether picking this choice is correct.
    pub is_correct: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_sets_matching_timestamp() {
        let created = SystemTime::UNIX_EPOCH;
        let mut session = GameSessionEntity::new_lobby(1, 7, created);
        let at = SystemTime::now();

        let start = SessionTransition {
            from: SessionStatus::Lobby,
            to: SessionStatus::InProgress,
            at,
        };
        assert!(start.apply_to(&mut session));
        assert_eq!(session.status, SessionStatus::InProgress);
        assert_eq!(session.started_at, Some(at));
        assert_eq!(session.finished_at, None);

        let end = SessionTransition {
            from: SessionStatus::InProgress,
            to: SessionStatus::Completed,
            at,
        };
        assert!(end.apply_to(&mut session));
        assert_eq!(session.finished_at, Some(at));
    }

    #[test]
    fn transition_refuses_stale_status() {
        let mut session = GameSessionEntity::new_lobby(1, 7, SystemTime::now());
        let end = SessionTransition {
            from: SessionStatus::InProgress,
            to: SessionStatus::Completed,
            at: SystemTime::now(),
        };
        assert!(!end.apply_to(&mut session));
        assert_eq!(session.status, SessionStatus::Lobby);
        assert!(session.finished_at.is_none());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&SessionStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!(SessionStatus::InProgress.to_string(), "in_progress");
    }
}
