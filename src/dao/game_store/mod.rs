//! Storage traits for live sessions and the quiz catalog.

pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{
    AnswerReceipt, ChoiceEntity, ChoiceId, GamePlayerEntity, GameSessionEntity,
    PlayerAnswerEntity, QuestionEntity, QuestionId, QuizId, SessionStatus, SessionTransition,
    UserId,
};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

/// Durable storage for live game sessions, their players and their answers.
///
/// Implementations own the uniqueness guarantees: one player per
/// `(session, user)` and one answer per `(session, question, player)`, both
/// reported as [`StorageError::Conflict`](crate::dao::storage::StorageError::Conflict).
pub trait GameStore: Send + Sync {
    /// Persist a new session.
    fn insert_session(&self, session: GameSessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Remove a session and its players. Returns whether anything was deleted.
    fn delete_session(&self, id: String) -> BoxFuture<'static, StorageResult<bool>>;
    /// Look a session up by code.
    fn find_session(
        &self,
        id: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>>;
    /// Atomically move a session from `transition.from` to `transition.to`.
    ///
    /// Returns the updated record, or `None` when the session is missing or no
    /// longer in the expected status.
    fn transition_session(
        &self,
        id: String,
        transition: SessionTransition,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>>;
    /// Sessions currently in `status`.
    fn list_sessions_by_status(
        &self,
        status: SessionStatus,
    ) -> BoxFuture<'static, StorageResult<Vec<GameSessionEntity>>>;
    /// Sessions created by `host_id`, any status.
    fn list_sessions_by_host(
        &self,
        host_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Vec<GameSessionEntity>>>;
    /// Add a player; a second row for the same user is a conflict.
    fn insert_player(&self, player: GamePlayerEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Player row of `user_id` in the session, if any.
    fn find_player(
        &self,
        session_id: String,
        user_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Option<GamePlayerEntity>>>;
    /// Players of a session in join order.
    fn list_players(
        &self,
        session_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<GamePlayerEntity>>>;
    /// Answer already given by a player to a question, if any.
    fn find_answer(
        &self,
        session_id: String,
        question_id: QuestionId,
        player_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerAnswerEntity>>>;
    /// Insert the answer and add its points to the player's score as one unit.
    fn record_answer(
        &self,
        answer: PlayerAnswerEntity,
    ) -> BoxFuture<'static, StorageResult<AnswerReceipt>>;
    /// Every answer of a session.
    fn list_answers(
        &self,
        session_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerAnswerEntity>>>;
    /// Cheap round-trip proving the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the underlying connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Read-only view over the quiz-authoring collaborator's data.
pub trait QuizCatalog: Send + Sync {
    /// Whether a quiz with this id exists.
    fn quiz_exists(&self, id: QuizId) -> BoxFuture<'static, StorageResult<bool>>;
    /// Question with its owning quiz.
    fn find_question(
        &self,
        id: QuestionId,
    ) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>>;
    /// Choice with its owning question and correctness.
    fn find_choice(
        &self,
        id: ChoiceId,
    ) -> BoxFuture<'static, StorageResult<Option<ChoiceEntity>>>;
}
