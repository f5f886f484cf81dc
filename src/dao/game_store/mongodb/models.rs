//! BSON document shapes. Numeric identifiers are stored as `i64` since BSON
//! has no unsigned integers; the cast round-trips losslessly.

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    ChoiceEntity, GamePlayerEntity, GameSessionEntity, PlayerAnswerEntity, QuestionEntity,
    SessionStatus,
};

pub fn to_bson_id(id: u64) -> i64 {
    id as i64
}

pub fn from_bson_id(id: i64) -> u64 {
    id as u64
}

pub fn to_points(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub quiz_id: i64,
    pub host_id: i64,
    pub status: SessionStatus,
    pub started_at: Option<DateTime>,
    pub finished_at: Option<DateTime>,
    pub created_at: DateTime,
}

impl From<GameSessionEntity> for MongoSessionDocument {
    fn from(value: GameSessionEntity) -> Self {
        Self {
            id: value.id,
            quiz_id: to_bson_id(value.quiz_id),
            host_id: to_bson_id(value.host_id),
            status: value.status,
            started_at: value.started_at.map(DateTime::from_system_time),
            finished_at: value.finished_at.map(DateTime::from_system_time),
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<MongoSessionDocument> for GameSessionEntity {
    fn from(value: MongoSessionDocument) -> Self {
        Self {
            id: value.id,
            quiz_id: from_bson_id(value.quiz_id),
            host_id: from_bson_id(value.host_id),
            status: value.status,
            started_at: value.started_at.map(DateTime::to_system_time),
            finished_at: value.finished_at.map(DateTime::to_system_time),
            created_at: value.created_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub session_id: String,
    pub user_id: i64,
    pub nickname: String,
    pub score: i64,
    pub joined_at: DateTime,
}

impl From<GamePlayerEntity> for MongoPlayerDocument {
    fn from(value: GamePlayerEntity) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            user_id: to_bson_id(value.user_id),
            nickname: value.nickname,
            score: i64::from(value.score),
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl From<MongoPlayerDocument> for GamePlayerEntity {
    fn from(value: MongoPlayerDocument) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            user_id: from_bson_id(value.user_id),
            nickname: value.nickname,
            score: to_points(value.score),
            joined_at: value.joined_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnswerDocument {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub session_id: String,
    pub quiz_id: i64,
    pub question_id: i64,
    pub player_id: i64,
    pub choice_id: i64,
    pub time_spent: f64,
    pub is_correct: bool,
    pub points: i64,
    pub created_at: DateTime,
}

impl From<PlayerAnswerEntity> for MongoAnswerDocument {
    fn from(value: PlayerAnswerEntity) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            quiz_id: to_bson_id(value.quiz_id),
            question_id: to_bson_id(value.question_id),
            player_id: to_bson_id(value.player_id),
            choice_id: to_bson_id(value.choice_id),
            time_spent: value.elapsed_secs,
            is_correct: value.is_correct,
            points: i64::from(value.points),
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<MongoAnswerDocument> for PlayerAnswerEntity {
    fn from(value: MongoAnswerDocument) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            quiz_id: from_bson_id(value.quiz_id),
            question_id: from_bson_id(value.question_id),
            player_id: from_bson_id(value.player_id),
            choice_id: from_bson_id(value.choice_id),
            elapsed_secs: value.time_spent,
            is_correct: value.is_correct,
            points: to_points(value.points),
            created_at: value.created_at.to_system_time(),
        }
    }
}

/// Question row owned by the quiz-authoring service; only the fields read here.
#[derive(Debug, Clone, Deserialize)]
pub struct MongoQuestionDocument {
    #[serde(rename = "_id")]
    pub id: i64,
    pub quiz_id: i64,
}

impl From<MongoQuestionDocument> for QuestionEntity {
    fn from(value: MongoQuestionDocument) -> Self {
        Self {
            id: from_bson_id(value.id),
            quiz_id: from_bson_id(value.quiz_id),
        }
    }
}

/// Choice row owned by the quiz-authoring service.
#[derive(Debug, Clone, Deserialize)]
pub struct MongoChoiceDocument {
    #[serde(rename = "_id")]
    pub id: i64,
    pub question_id: i64,
    #[serde(default)]
    pub is_correct: bool,
}

impl From<MongoChoiceDocument> for ChoiceEntity {
    fn from(value: MongoChoiceDocument) -> Self {
        Self {
            id: from_bson_id(value.id),
            question_id: from_bson_id(value.question_id),
            is_correct: value.is_correct,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    #[test]
    fn large_ids_survive_the_signed_cast() {
        let id = u64::MAX - 3;
        assert_eq!(from_bson_id(to_bson_id(id)), id);
    }

    #[test]
    fn negative_scores_clamp_to_zero() {
        assert_eq!(to_points(-5), 0);
        assert_eq!(to_points(i64::MAX), u32::MAX);
        assert_eq!(to_points(75), 75);
    }

    #[test]
    fn session_document_keeps_timestamps() {
        let created = SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_000);
        let mut session = GameSessionEntity::new_lobby(4, 9, created);
        session.status = SessionStatus::InProgress;
        session.started_at = Some(created + Duration::from_secs(3));

        let restored: GameSessionEntity = MongoSessionDocument::from(session.clone()).into();
        assert_eq!(restored, session);
    }
}
