//! In-process storage backend used by tests and by deployments without MongoDB.
//!
//! Every table lives behind one lock so the compound writes required by
//! [`GameStore`] (conflict check + insert + score increment) are atomic.

use std::{collections::HashMap, sync::Arc};

use dashmap::DashMap;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::dao::{
    game_store::{GameStore, QuizCatalog},
    models::{
        AnswerReceipt, ChoiceEntity, ChoiceId, GamePlayerEntity, GameSessionEntity,
        PlayerAnswerEntity, QuestionEntity, QuestionId, QuizId, SessionStatus, SessionTransition,
        UserId,
    },
    storage::{StorageError, StorageResult},
};

type PlayerKey = (String, UserId);
type AnswerKey = (String, QuestionId, UserId);

#[derive(Default)]
struct Tables {
    sessions: HashMap<String, GameSessionEntity>,
    players: IndexMap<PlayerKey, GamePlayerEntity>,
    answers: IndexMap<AnswerKey, PlayerAnswerEntity>,
}

/// [`GameStore`] keeping everything in memory.
#[derive(Clone, Default)]
pub struct MemoryGameStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryGameStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn insert_session(&self, session: GameSessionEntity) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if tables.sessions.contains_key(&session.id) {
            return Err(StorageError::conflict("game session", session.id));
        }
        tables.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn delete_session(&self, id: String) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;
        let removed = tables.sessions.remove(&id).is_some();
        tables.players.retain(|(session_id, _), _| *session_id != id);
        Ok(removed)
    }

    async fn transition_session(
        &self,
        id: String,
        transition: SessionTransition,
    ) -> StorageResult<Option<GameSessionEntity>> {
        let mut tables = self.tables.write().await;
        let Some(session) = tables.sessions.get_mut(&id) else {
            return Ok(None);
        };
        if transition.apply_to(session) {
            Ok(Some(session.clone()))
        } else {
            Ok(None)
        }
    }

    async fn list_sessions_where(
        &self,
        predicate: impl Fn(&GameSessionEntity) -> bool,
    ) -> Vec<GameSessionEntity> {
        let tables = self.tables.read().await;
        let mut sessions: Vec<_> = tables
            .sessions
            .values()
            .filter(|session| predicate(session))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    async fn insert_player(&self, player: GamePlayerEntity) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let key = (player.session_id.clone(), player.user_id);
        if tables.players.contains_key(&key) {
            return Err(StorageError::conflict(
                "game player",
                format!("{}/{}", key.0, key.1),
            ));
        }
        tables.players.insert(key, player);
        Ok(())
    }

    async fn list_players(&self, session_id: String) -> Vec<GamePlayerEntity> {
        let tables = self.tables.read().await;
        let mut players: Vec<_> = tables
            .players
            .values()
            .filter(|player| player.session_id == session_id)
            .cloned()
            .collect();
        // Insertion order already follows joins; the stable sort only matters
        // for rows written with explicit timestamps.
        players.sort_by_key(|player| player.joined_at);
        players
    }

    async fn record_answer(&self, answer: PlayerAnswerEntity) -> StorageResult<AnswerReceipt> {
        let mut tables = self.tables.write().await;
        let key = (
            answer.session_id.clone(),
            answer.question_id,
            answer.player_id,
        );
        if tables.answers.contains_key(&key) {
            return Err(StorageError::conflict(
                "player answer",
                format!("{}/{}/{}", key.0, key.1, key.2),
            ));
        }

        let player_key = (answer.session_id.clone(), answer.player_id);
        let Some(player) = tables.players.get_mut(&player_key) else {
            return Err(StorageError::unavailable(
                format!(
                    "player {} missing from session `{}`",
                    answer.player_id, answer.session_id
                ),
                MissingRow,
            ));
        };
        player.score = player.score.saturating_add(answer.points);
        let player_score = player.score;

        tables.answers.insert(key, answer.clone());
        Ok(AnswerReceipt {
            answer,
            player_score: Some(player_score),
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("referenced row does not exist")]
struct MissingRow;

impl GameStore for MemoryGameStore {
    fn insert_session(&self, session: GameSessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_session(session).await })
    }

    fn delete_session(&self, id: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_session(id).await })
    }

    fn find_session(
        &self,
        id: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.tables.read().await.sessions.get(&id).cloned()) })
    }

    fn transition_session(
        &self,
        id: String,
        transition: SessionTransition,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.transition_session(id, transition).await })
    }

    fn list_sessions_by_status(
        &self,
        status: SessionStatus,
    ) -> BoxFuture<'static, StorageResult<Vec<GameSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .list_sessions_where(|session| session.status == status)
                .await)
        })
    }

    fn list_sessions_by_host(
        &self,
        host_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Vec<GameSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .list_sessions_where(|session| session.host_id == host_id)
                .await)
        })
    }

    fn insert_player(&self, player: GamePlayerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_player(player).await })
    }

    fn find_player(
        &self,
        session_id: String,
        user_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Option<GamePlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.tables.read().await;
            Ok(tables.players.get(&(session_id, user_id)).cloned())
        })
    }

    fn list_players(
        &self,
        session_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<GamePlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.list_players(session_id).await) })
    }

    fn find_answer(
        &self,
        session_id: String,
        question_id: QuestionId,
        player_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerAnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.tables.read().await;
            Ok(tables
                .answers
                .get(&(session_id, question_id, player_id))
                .cloned())
        })
    }

    fn record_answer(
        &self,
        answer: PlayerAnswerEntity,
    ) -> BoxFuture<'static, StorageResult<AnswerReceipt>> {
        let store = self.clone();
        Box::pin(async move { store.record_answer(answer).await })
    }

    fn list_answers(
        &self,
        session_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerAnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.tables.read().await;
            Ok(tables
                .answers
                .values()
                .filter(|answer| answer.session_id == session_id)
                .cloned()
                .collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// [`QuizCatalog`] backed by concurrent maps, optionally seeded from JSON.
#[derive(Clone, Default)]
pub struct MemoryQuizCatalog {
    quizzes: Arc<DashMap<QuizId, String>>,
    questions: Arc<DashMap<QuestionId, QuestionEntity>>,
    choices: Arc<DashMap<ChoiceId, ChoiceEntity>>,
}

impl MemoryQuizCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a seed document.
    pub fn from_seed(seed: CatalogSeed) -> Self {
        let catalog = Self::new();
        for quiz in seed.quizzes {
            catalog.insert_quiz(quiz.id, quiz.title);
            for question in quiz.questions {
                catalog.insert_question(QuestionEntity {
                    id: question.id,
                    quiz_id: quiz.id,
                });
                for choice in question.choices {
                    catalog.insert_choice(ChoiceEntity {
                        id: choice.id,
                        question_id: question.id,
                        is_correct: choice.is_correct,
                    });
                }
            }
        }
        catalog
    }

    /// Register a quiz, replacing any previous title.
    pub fn insert_quiz(&self, id: QuizId, title: impl Into<String>) {
        self.quizzes.insert(id, title.into());
    }

    /// Register a question under its quiz.
    pub fn insert_question(&self, question: QuestionEntity) {
        self.questions.insert(question.id, question);
    }

    /// Register a choice under its question.
    pub fn insert_choice(&self, choice: ChoiceEntity) {
        self.choices.insert(choice.id, choice);
    }

    /// Number of quizzes known to the catalog.
    pub fn quiz_count(&self) -> usize {
        self.quizzes.len()
    }
}

impl QuizCatalog for MemoryQuizCatalog {
    fn quiz_exists(&self, id: QuizId) -> BoxFuture<'static, StorageResult<bool>> {
        let exists = self.quizzes.contains_key(&id);
        Box::pin(async move { Ok(exists) })
    }

    fn find_question(
        &self,
        id: QuestionId,
    ) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let question = self.questions.get(&id).map(|entry| *entry.value());
        Box::pin(async move { Ok(question) })
    }

    fn find_choice(
        &self,
        id: ChoiceId,
    ) -> BoxFuture<'static, StorageResult<Option<ChoiceEntity>>> {
        let choice = self.choices.get(&id).map(|entry| *entry.value());
        Box::pin(async move { Ok(choice) })
    }
}

/// JSON document used to seed [`MemoryQuizCatalog`].
#[derive(Debug, Default, Deserialize)]
pub struct CatalogSeed {
    /// Quizzes with their questions and choices.
    #[serde(default)]
    pub quizzes: Vec<SeedQuiz>,
}

/// Quiz entry of a [`CatalogSeed`].
#[derive(Debug, Deserialize)]
pub struct SeedQuiz {
    /// Quiz identifier.
    pub id: QuizId,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Questions of the quiz.
    #[serde(default)]
    pub questions: Vec<SeedQuestion>,
}

/// Question entry of a [`SeedQuiz`].
#[derive(Debug, Deserialize)]
pub struct SeedQuestion {
    /// Question identifier, unique across quizzes.
    pub id: QuestionId,
    /// Choices of the question.
    #[serde(default)]
    pub choices: Vec<SeedChoice>,
}

/// Choice entry of a [`SeedQuestion`].
#[derive(Debug, Deserialize)]
pub struct SeedChoice {
    /// Choice identifier, unique across questions.
    pub id: ChoiceId,
    /// Whether picking this choice scores.
    #[serde(default)]
    pub is_correct: bool,
}
