//! Business rules of live game sessions, independent of any transport.

use std::{sync::Arc, time::SystemTime};

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::models::{
        AnswerReceipt, ChoiceId, GamePlayerEntity, GameSessionEntity, PlayerAnswerEntity,
        QuestionId, QuizId, SessionStatus, UserId,
    },
    dto::validation::validate_chat_message,
    error::ServiceError,
    state::{
        Backend, StorageSlot,
        session_machine::{SessionActivity, SessionEvent, ensure_permitted, plan_transition},
    },
};

/// Answer submitted by a player.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerSubmission {
    /// Session being played.
    pub session_id: String,
    /// Answering user.
    pub user_id: UserId,
    /// Question answered.
    pub question_id: QuestionId,
    /// Selected choice.
    pub choice_id: ChoiceId,
    /// Seconds between question display and answer, as reported by the client.
    pub elapsed_secs: f64,
}

/// Result of a join: the session as read and the player's membership.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// Session joined.
    pub session: GameSessionEntity,
    /// New or existing player row.
    pub player: GamePlayerEntity,
    /// `false` when the user was already a member and the existing row was returned.
    pub newly_joined: bool,
}

/// Chat line accepted for fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatLine {
    /// Session the line belongs to.
    pub session_id: String,
    /// Sender.
    pub user_id: UserId,
    /// Sender's nickname in the session.
    pub nickname: String,
    /// Trimmed message text.
    pub message: String,
    /// Acceptance time.
    pub sent_at: SystemTime,
}

/// Standings of a session.
#[derive(Debug, Clone)]
pub struct SessionResults {
    /// The session.
    pub session: GameSessionEntity,
    /// Players by descending score, ties broken by join order.
    pub ranking: Vec<GamePlayerEntity>,
    /// Every recorded answer.
    pub answers: Vec<PlayerAnswerEntity>,
}

/// Owns the session lifecycle: create, join, start, answer, end.
///
/// Nothing is cached between calls; every operation re-reads the records it
/// needs from storage.
#[derive(Clone)]
pub struct SessionCoordinator {
    storage: Arc<StorageSlot>,
    config: Arc<AppConfig>,
}

fn session_not_found(id: &str) -> ServiceError {
    ServiceError::NotFound(format!("game session `{id}`"))
}

impl SessionCoordinator {
    /// Coordinator reading storage through `storage` on every call.
    pub fn new(storage: Arc<StorageSlot>, config: Arc<AppConfig>) -> Self {
        Self { storage, config }
    }

    async fn backend(&self) -> Result<Backend, ServiceError> {
        self.storage.require().await
    }

    async fn load_session(
        &self,
        backend: &Backend,
        id: &str,
    ) -> Result<GameSessionEntity, ServiceError> {
        backend
            .store
            .find_session(id.to_owned())
            .await?
            .ok_or_else(|| session_not_found(id))
    }

    /// Create a lobby session for `quiz_id` and register the host as its first player.
    ///
    /// When the host row cannot be written the session is deleted again.
    pub async fn create_session(
        &self,
        host_id: UserId,
        quiz_id: QuizId,
    ) -> Result<GameSessionEntity, ServiceError> {
        let backend = self.backend().await?;
        if !backend.catalog.quiz_exists(quiz_id).await? {
            return Err(ServiceError::NotFound(format!("quiz {quiz_id}")));
        }

        let now = SystemTime::now();
        let session = GameSessionEntity::new_lobby(quiz_id, host_id, now);
        backend.store.insert_session(session.clone()).await?;

        let host = GamePlayerEntity::new(
            session.id.clone(),
            host_id,
            self.config.host_nickname.clone(),
            now,
        );
        if let Err(err) = backend.store.insert_player(host).await {
            match backend.store.delete_session(session.id.clone()).await {
                Ok(_) => warn!(
                    session_id = %session.id,
                    error = %err,
                    "failed to register host player; session rolled back"
                ),
                Err(rollback_err) => error!(
                    session_id = %session.id,
                    error = %err,
                    rollback_error = %rollback_err,
                    "host registration and session rollback both failed; session has no host"
                ),
            }
            return Err(err.into());
        }

        info!(session_id = %session.id, host_id, quiz_id, "game session created");
        Ok(session)
    }

    /// Add `user_id` to a lobby. Joining again returns the existing membership.
    ///
    /// A blank nickname is replaced by `Player_<user id>`.
    pub async fn join_session(
        &self,
        session_id: &str,
        user_id: UserId,
        nickname: &str,
    ) -> Result<JoinOutcome, ServiceError> {
        let backend = self.backend().await?;
        let session = self.load_session(&backend, session_id).await?;
        ensure_permitted(session.status, SessionActivity::Join)?;

        if let Some(player) = backend
            .store
            .find_player(session_id.to_owned(), user_id)
            .await?
        {
            return Ok(JoinOutcome {
                session,
                player,
                newly_joined: false,
            });
        }

        let nickname = match nickname.trim() {
            "" => format!("Player_{user_id}"),
            name => name.to_owned(),
        };
        let player =
            GamePlayerEntity::new(session_id.to_owned(), user_id, nickname, SystemTime::now());

        match backend.store.insert_player(player.clone()).await {
            Ok(()) => {
                info!(session_id, user_id, nickname = %player.nickname, "player joined");
                Ok(JoinOutcome {
                    session,
                    player,
                    newly_joined: true,
                })
            }
            // A concurrent join of the same user won the race.
            Err(err) if err.is_conflict() => {
                let player = backend
                    .store
                    .find_player(session_id.to_owned(), user_id)
                    .await?
                    .ok_or(ServiceError::Persistence(err))?;
                Ok(JoinOutcome {
                    session,
                    player,
                    newly_joined: false,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Move a lobby to `in_progress`. Host only.
    pub async fn start_session(
        &self,
        session_id: &str,
        caller: UserId,
    ) -> Result<GameSessionEntity, ServiceError> {
        self.transition(session_id, caller, SessionEvent::Start).await
    }

    /// Move a running game to `completed`. Host only.
    pub async fn end_session(
        &self,
        session_id: &str,
        caller: UserId,
    ) -> Result<GameSessionEntity, ServiceError> {
        self.transition(session_id, caller, SessionEvent::End).await
    }

    async fn transition(
        &self,
        session_id: &str,
        caller: UserId,
        event: SessionEvent,
    ) -> Result<GameSessionEntity, ServiceError> {
        let backend = self.backend().await?;
        let session = self.load_session(&backend, session_id).await?;
        if session.host_id != caller {
            return Err(ServiceError::Forbidden(format!(
                "only the host may {event} the session"
            )));
        }

        let plan = plan_transition(session.status, event, SystemTime::now())?;
        let updated = backend
            .store
            .transition_session(session_id.to_owned(), plan)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidState(format!(
                    "session `{session_id}` is no longer {}",
                    plan.from
                ))
            })?;

        info!(session_id, status = %updated.status, "game session transitioned");
        Ok(updated)
    }

    /// Score and record an answer, adding its points to the player's total.
    pub async fn submit_answer(
        &self,
        submission: AnswerSubmission,
    ) -> Result<AnswerReceipt, ServiceError> {
        let AnswerSubmission {
            session_id,
            user_id,
            question_id,
            choice_id,
            elapsed_secs,
        } = submission;
        if !elapsed_secs.is_finite() || elapsed_secs < 0.0 {
            return Err(ServiceError::Validation(
                "time spent must be a finite, non-negative number of seconds".into(),
            ));
        }

        let backend = self.backend().await?;
        let session = self.load_session(&backend, &session_id).await?;
        ensure_permitted(session.status, SessionActivity::Answer)?;

        if backend
            .store
            .find_player(session_id.clone(), user_id)
            .await?
            .is_none()
        {
            return Err(ServiceError::NotFound(format!(
                "player {user_id} in session `{session_id}`"
            )));
        }
        if session.host_id == user_id && !self.config.host_may_answer {
            return Err(ServiceError::Forbidden(
                "the host may not answer in this session".into(),
            ));
        }

        if backend
            .store
            .find_answer(session_id.clone(), question_id, user_id)
            .await?
            .is_some()
        {
            return Err(duplicate_answer(question_id));
        }

        let choice = backend
            .catalog
            .find_choice(choice_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("choice {choice_id}")))?;
        if choice.question_id != question_id {
            return Err(ServiceError::Validation(format!(
                "choice {choice_id} does not belong to question {question_id}"
            )));
        }
        let question = backend
            .catalog
            .find_question(question_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("question {question_id}")))?;
        if question.quiz_id != session.quiz_id {
            return Err(ServiceError::Validation(format!(
                "question {question_id} is not part of quiz {}",
                session.quiz_id
            )));
        }

        let points = self.config.scoring.score(choice.is_correct, elapsed_secs);
        let answer = PlayerAnswerEntity {
            id: Uuid::new_v4(),
            session_id: session_id.clone(),
            quiz_id: session.quiz_id,
            question_id,
            player_id: user_id,
            choice_id,
            elapsed_secs,
            is_correct: choice.is_correct,
            points,
            created_at: SystemTime::now(),
        };

        let receipt = match backend.store.record_answer(answer).await {
            Ok(receipt) => receipt,
            // The pre-check raced with a concurrent submission.
            Err(err) if err.is_conflict() => return Err(duplicate_answer(question_id)),
            Err(err) => return Err(err.into()),
        };

        if receipt.player_score.is_none() {
            error!(
                session_id = %session_id,
                user_id,
                question_id,
                points,
                "answer recorded but the score increment failed; player score is stale"
            );
        }
        Ok(receipt)
    }

    /// Validate a chat line from a member of a session that has not ended.
    pub async fn post_chat(
        &self,
        session_id: &str,
        user_id: UserId,
        message: &str,
    ) -> Result<ChatLine, ServiceError> {
        let message = message.trim();
        validate_chat_message(message)
            .map_err(|err| ServiceError::Validation(err.to_string()))?;

        let backend = self.backend().await?;
        let session = self.load_session(&backend, session_id).await?;
        ensure_permitted(session.status, SessionActivity::Chat)?;
        let player = backend
            .store
            .find_player(session_id.to_owned(), user_id)
            .await?
            .ok_or_else(|| {
                ServiceError::Forbidden("only players of the session may chat".into())
            })?;

        Ok(ChatLine {
            session_id: session.id,
            user_id,
            nickname: player.nickname,
            message: message.to_owned(),
            sent_at: SystemTime::now(),
        })
    }

    /// Session by code.
    pub async fn get_session(&self, session_id: &str) -> Result<GameSessionEntity, ServiceError> {
        let backend = self.backend().await?;
        self.load_session(&backend, session_id).await
    }

    /// Players of an existing session, in join order.
    pub async fn list_players(
        &self,
        session_id: &str,
    ) -> Result<Vec<GamePlayerEntity>, ServiceError> {
        let backend = self.backend().await?;
        self.load_session(&backend, session_id).await?;
        Ok(backend.store.list_players(session_id.to_owned()).await?)
    }

    /// Sessions still accepting players.
    pub async fn list_active_sessions(&self) -> Result<Vec<GameSessionEntity>, ServiceError> {
        let backend = self.backend().await?;
        Ok(backend
            .store
            .list_sessions_by_status(SessionStatus::Lobby)
            .await?)
    }

    /// Sessions created by `host_id`, whatever their status.
    pub async fn list_sessions_hosted_by(
        &self,
        host_id: UserId,
    ) -> Result<Vec<GameSessionEntity>, ServiceError> {
        let backend = self.backend().await?;
        Ok(backend.store.list_sessions_by_host(host_id).await?)
    }

    /// Answers recorded in an existing session.
    pub async fn list_answers(
        &self,
        session_id: &str,
    ) -> Result<Vec<PlayerAnswerEntity>, ServiceError> {
        let backend = self.backend().await?;
        self.load_session(&backend, session_id).await?;
        Ok(backend.store.list_answers(session_id.to_owned()).await?)
    }

    /// Session, ranking and answers in one read.
    pub async fn session_results(&self, session_id: &str) -> Result<SessionResults, ServiceError> {
        let backend = self.backend().await?;
        let session = self.load_session(&backend, session_id).await?;
        let mut ranking = backend.store.list_players(session_id.to_owned()).await?;
        // Stable sort keeps join order among equal scores.
        ranking.sort_by(|a, b| b.score.cmp(&a.score));
        let answers = backend.store.list_answers(session_id.to_owned()).await?;
        Ok(SessionResults {
            session,
            ranking,
            answers,
        })
    }
}

fn duplicate_answer(question_id: QuestionId) -> ServiceError {
    ServiceError::Duplicate(format!("question {question_id} was already answered"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use futures::future::{BoxFuture, join_all};

    use super::*;
    use crate::dao::{
        game_store::{
            GameStore,
            memory::{MemoryGameStore, MemoryQuizCatalog},
        },
        models::{ChoiceEntity, QuestionEntity, SessionTransition},
        storage::{StorageError, StorageResult},
    };

    const HOST: UserId = 1;
    const ALICE: UserId = 2;
    const BOB: UserId = 3;
    const QUIZ: QuizId = 1;

    fn catalog() -> MemoryQuizCatalog {
        let catalog = MemoryQuizCatalog::new();
        catalog.insert_quiz(QUIZ, "General knowledge");
        catalog.insert_quiz(2, "Other quiz");
        for (question, quiz) in [(1, QUIZ), (2, QUIZ), (3, 2)] {
            catalog.insert_question(QuestionEntity {
                id: question,
                quiz_id: quiz,
            });
        }
        for (choice, question, is_correct) in
            [(10, 1, true), (11, 1, false), (20, 2, true), (30, 3, true)]
        {
            catalog.insert_choice(ChoiceEntity {
                id: choice,
                question_id: question,
                is_correct,
            });
        }
        catalog
    }

    fn coordinator_with(store: Arc<dyn GameStore>, config: AppConfig) -> SessionCoordinator {
        let backend = Backend::new(store, Arc::new(catalog()));
        SessionCoordinator::new(
            Arc::new(StorageSlot::with_backend(backend)),
            Arc::new(config),
        )
    }

    fn coordinator() -> SessionCoordinator {
        coordinator_with(Arc::new(MemoryGameStore::new()), AppConfig::default())
    }

    fn answer(
        session_id: &str,
        user_id: UserId,
        question_id: QuestionId,
        choice_id: ChoiceId,
        elapsed_secs: f64,
    ) -> AnswerSubmission {
        AnswerSubmission {
            session_id: session_id.to_owned(),
            user_id,
            question_id,
            choice_id,
            elapsed_secs,
        }
    }

    async fn running_session(coordinator: &SessionCoordinator) -> GameSessionEntity {
        let session = coordinator.create_session(HOST, QUIZ).await.unwrap();
        coordinator
            .join_session(&session.id, ALICE, "Alice")
            .await
            .unwrap();
        coordinator.start_session(&session.id, HOST).await.unwrap()
    }

    #[tokio::test]
    async fn full_game_scenario() {
        let coordinator = coordinator();

        let session = coordinator.create_session(HOST, QUIZ).await.unwrap();
        assert_eq!(session.status, SessionStatus::Lobby);
        let players = coordinator.list_players(&session.id).await.unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].user_id, HOST);
        assert_eq!(players[0].nickname, "Host");

        let joined = coordinator
            .join_session(&session.id, ALICE, "Alice")
            .await
            .unwrap();
        assert!(joined.newly_joined);
        assert_eq!(joined.player.nickname, "Alice");

        let started = coordinator.start_session(&session.id, HOST).await.unwrap();
        assert_eq!(started.status, SessionStatus::InProgress);
        assert!(started.started_at.is_some());

        let receipt = coordinator
            .submit_answer(answer(&session.id, ALICE, 1, 10, 3.0))
            .await
            .unwrap();
        assert_eq!(receipt.answer.points, 100);
        assert!(receipt.answer.is_correct);
        assert_eq!(receipt.player_score, Some(100));

        let err = coordinator
            .submit_answer(answer(&session.id, ALICE, 1, 11, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Duplicate(_)));

        let ended = coordinator.end_session(&session.id, HOST).await.unwrap();
        assert_eq!(ended.status, SessionStatus::Completed);
        assert!(ended.finished_at.is_some());

        let results = coordinator.session_results(&session.id).await.unwrap();
        assert_eq!(results.ranking[0].user_id, ALICE);
        assert_eq!(results.ranking[0].score, 100);
        assert_eq!(results.answers.len(), 1);
    }

    #[tokio::test]
    async fn non_host_cannot_start_or_end() {
        let coordinator = coordinator();
        let session = coordinator.create_session(HOST, QUIZ).await.unwrap();
        coordinator.join_session(&session.id, BOB, "Bob").await.unwrap();

        let err = coordinator.start_session(&session.id, BOB).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
        let current = coordinator.get_session(&session.id).await.unwrap();
        assert_eq!(current.status, SessionStatus::Lobby);

        coordinator.start_session(&session.id, HOST).await.unwrap();
        let err = coordinator.end_session(&session.id, BOB).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn illegal_transitions_leave_state_unchanged() {
        let coordinator = coordinator();
        let session = coordinator.create_session(HOST, QUIZ).await.unwrap();

        let err = coordinator.end_session(&session.id, HOST).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        let err = coordinator
            .submit_answer(answer(&session.id, HOST, 1, 10, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        coordinator.start_session(&session.id, HOST).await.unwrap();
        let err = coordinator.start_session(&session.id, HOST).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        coordinator.end_session(&session.id, HOST).await.unwrap();
        for result in [
            coordinator.start_session(&session.id, HOST).await,
            coordinator.end_session(&session.id, HOST).await,
        ] {
            assert!(matches!(result, Err(ServiceError::InvalidState(_))));
        }
        let err = coordinator
            .submit_answer(answer(&session.id, HOST, 2, 20, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(
            coordinator.get_session(&session.id).await.unwrap().status,
            SessionStatus::Completed
        );
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let coordinator = coordinator();
        let session = coordinator.create_session(HOST, QUIZ).await.unwrap();

        let first = coordinator
            .join_session(&session.id, ALICE, "Alice")
            .await
            .unwrap();
        let second = coordinator
            .join_session(&session.id, ALICE, "Alice")
            .await
            .unwrap();
        assert_eq!(first.player.id, second.player.id);
        assert!(!second.newly_joined);
        let players = coordinator.list_players(&session.id).await.unwrap();
        assert_eq!(players.len(), 2);
    }

    #[tokio::test]
    async fn join_rules() {
        let coordinator = coordinator();
        let err = coordinator
            .join_session("missing", ALICE, "Alice")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let session = coordinator.create_session(HOST, QUIZ).await.unwrap();
        let joined = coordinator.join_session(&session.id, BOB, "  ").await.unwrap();
        assert_eq!(joined.player.nickname, "Player_3");

        coordinator.start_session(&session.id, HOST).await.unwrap();
        let err = coordinator
            .join_session(&session.id, ALICE, "Alice")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn create_requires_known_quiz() {
        let coordinator = coordinator();
        let err = coordinator.create_session(HOST, 99).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(coordinator.list_active_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn answer_reference_checks() {
        let coordinator = coordinator();
        let session = running_session(&coordinator).await;

        let err = coordinator
            .submit_answer(answer(&session.id, ALICE, 1, 20, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = coordinator
            .submit_answer(answer(&session.id, ALICE, 1, 999, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = coordinator
            .submit_answer(answer(&session.id, ALICE, 3, 30, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = coordinator
            .submit_answer(answer(&session.id, BOB, 1, 10, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = coordinator
            .submit_answer(answer(&session.id, ALICE, 1, 10, f64::NAN))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let players = coordinator.list_players(&session.id).await.unwrap();
        assert!(players.iter().all(|player| player.score == 0));
        assert!(coordinator.list_answers(&session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn wrong_answers_score_zero_and_are_recorded() {
        let coordinator = coordinator();
        let session = running_session(&coordinator).await;
        let receipt = coordinator
            .submit_answer(answer(&session.id, ALICE, 1, 11, 2.0))
            .await
            .unwrap();
        assert!(!receipt.answer.is_correct);
        assert_eq!(receipt.answer.points, 0);
        assert_eq!(receipt.player_score, Some(0));
    }

    #[tokio::test]
    async fn host_answering_follows_configuration() {
        let coordinator = coordinator();
        let session = running_session(&coordinator).await;
        assert!(coordinator
            .submit_answer(answer(&session.id, HOST, 1, 10, 1.0))
            .await
            .is_ok());

        let strict = coordinator_with(
            Arc::new(MemoryGameStore::new()),
            AppConfig {
                host_may_answer: false,
                ..AppConfig::default()
            },
        );
        let session = running_session(&strict).await;
        let err = strict
            .submit_answer(answer(&session.id, HOST, 1, 10, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn concurrent_duplicate_submissions_score_once() {
        let coordinator = coordinator();
        let session = running_session(&coordinator).await;

        let attempts = (0..8).map(|_| {
            let coordinator = coordinator.clone();
            let submission = answer(&session.id, ALICE, 2, 20, 7.0);
            tokio::spawn(async move { coordinator.submit_answer(submission).await })
        });
        let outcomes: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .filter_map(|outcome| outcome.as_ref().err())
                .all(|err| matches!(err, ServiceError::Duplicate(_)))
        );
        let players = coordinator.list_players(&session.id).await.unwrap();
        let alice = players.iter().find(|p| p.user_id == ALICE).unwrap();
        assert_eq!(alice.score, 75);
    }

    #[tokio::test]
    async fn chat_requires_membership() {
        let coordinator = coordinator();
        let session = coordinator.create_session(HOST, QUIZ).await.unwrap();
        coordinator.join_session(&session.id, ALICE, "Alice").await.unwrap();

        let line = coordinator
            .post_chat(&session.id, ALICE, "  hello  ")
            .await
            .unwrap();
        assert_eq!(line.message, "hello");
        assert_eq!(line.nickname, "Alice");

        let err = coordinator.post_chat(&session.id, BOB, "hi").await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
        let err = coordinator
            .post_chat(&session.id, ALICE, " ")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        let err = coordinator
            .post_chat(&session.id, ALICE, &"a".repeat(501))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(
            coordinator
                .post_chat(&session.id, ALICE, &"a".repeat(500))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn listings() {
        let coordinator = coordinator();
        let first = coordinator.create_session(HOST, QUIZ).await.unwrap();
        let second = coordinator.create_session(HOST, 2).await.unwrap();
        coordinator.create_session(ALICE, QUIZ).await.unwrap();
        coordinator.start_session(&second.id, HOST).await.unwrap();

        let active = coordinator.list_active_sessions().await.unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|s| s.status == SessionStatus::Lobby));

        let hosted = coordinator.list_sessions_hosted_by(HOST).await.unwrap();
        let mut ids: Vec<_> = hosted.into_iter().map(|s| s.id).collect();
        ids.sort();
        let mut expected = vec![first.id, second.id];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn degraded_storage_is_reported() {
        let coordinator = SessionCoordinator::new(
            Arc::new(StorageSlot::new()),
            Arc::new(AppConfig::default()),
        );
        let err = coordinator.create_session(HOST, QUIZ).await.unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
        assert_eq!(err.code(), "persistence");
    }

    /// Delegates to memory storage while injecting failures.
    #[derive(Clone, Default)]
    struct FaultyStore {
        inner: MemoryGameStore,
        fail_player_insert: Arc<AtomicBool>,
        drop_score: Arc<AtomicBool>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("injected failure")]
    struct Injected;

    impl GameStore for FaultyStore {
        fn insert_session(
            &self,
            session: GameSessionEntity,
        ) -> BoxFuture<'static, StorageResult<()>> {
            GameStore::insert_session(&self.inner, session)
        }
        fn delete_session(&self, id: String) -> BoxFuture<'static, StorageResult<bool>> {
            GameStore::delete_session(&self.inner, id)
        }
        fn find_session(
            &self,
            id: String,
        ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>> {
            GameStore::find_session(&self.inner, id)
        }
        fn transition_session(
            &self,
            id: String,
            transition: SessionTransition,
        ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>> {
            GameStore::transition_session(&self.inner, id, transition)
        }
        fn list_sessions_by_status(
            &self,
            status: SessionStatus,
        ) -> BoxFuture<'static, StorageResult<Vec<GameSessionEntity>>> {
            GameStore::list_sessions_by_status(&self.inner, status)
        }
        fn list_sessions_by_host(
            &self,
            host_id: UserId,
        ) -> BoxFuture<'static, StorageResult<Vec<GameSessionEntity>>> {
            GameStore::list_sessions_by_host(&self.inner, host_id)
        }
        fn insert_player(&self, player: GamePlayerEntity) -> BoxFuture<'static, StorageResult<()>> {
            if self.fail_player_insert.load(Ordering::SeqCst) {
                return Box::pin(async {
                    Err(StorageError::unavailable("player insert".into(), Injected))
                });
            }
            GameStore::insert_player(&self.inner, player)
        }
        fn find_player(
            &self,
            session_id: String,
            user_id: UserId,
        ) -> BoxFuture<'static, StorageResult<Option<GamePlayerEntity>>> {
            GameStore::find_player(&self.inner, session_id, user_id)
        }
        fn list_players(
            &self,
            session_id: String,
        ) -> BoxFuture<'static, StorageResult<Vec<GamePlayerEntity>>> {
            GameStore::list_players(&self.inner, session_id)
        }
        fn find_answer(
            &self,
            session_id: String,
            question_id: QuestionId,
            player_id: UserId,
        ) -> BoxFuture<'static, StorageResult<Option<PlayerAnswerEntity>>> {
            GameStore::find_answer(&self.inner, session_id, question_id, player_id)
        }
        fn record_answer(
            &self,
            answer: PlayerAnswerEntity,
        ) -> BoxFuture<'static, StorageResult<AnswerReceipt>> {
            let recorded = GameStore::record_answer(&self.inner, answer);
            let drop_score = self.drop_score.load(Ordering::SeqCst);
            Box::pin(async move {
                let mut receipt = recorded.await?;
                if drop_score {
                    receipt.player_score = None;
                }
                Ok(receipt)
            })
        }
        fn list_answers(
            &self,
            session_id: String,
        ) -> BoxFuture<'static, StorageResult<Vec<PlayerAnswerEntity>>> {
            GameStore::list_answers(&self.inner, session_id)
        }
        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            GameStore::health_check(&self.inner)
        }
        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            GameStore::try_reconnect(&self.inner)
        }
    }

    #[tokio::test]
    async fn failed_host_registration_rolls_back_session() {
        let store = FaultyStore::default();
        store.fail_player_insert.store(true, Ordering::SeqCst);
        let coordinator = coordinator_with(Arc::new(store.clone()), AppConfig::default());

        let err = coordinator.create_session(HOST, QUIZ).await.unwrap_err();
        assert!(matches!(err, ServiceError::Persistence(_)));
        assert!(
            GameStore::list_sessions_by_host(&store.inner, HOST)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn stale_score_is_not_fatal() {
        let store = FaultyStore::default();
        let coordinator = coordinator_with(Arc::new(store.clone()), AppConfig::default());
        let session = running_session(&coordinator).await;

        store.drop_score.store(true, Ordering::SeqCst);
        let receipt = coordinator
            .submit_answer(answer(&session.id, ALICE, 1, 10, 1.0))
            .await
            .unwrap();
        assert_eq!(receipt.player_score, None);
        assert_eq!(receipt.answer.points, 100);
    }
}
