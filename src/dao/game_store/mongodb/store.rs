//! Session, player and answer collections.

use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, ClientSession, Collection, Database, IndexModel,
    bson::{DateTime, doc},
    error::{TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoAnswerDocument, MongoPlayerDocument, MongoSessionDocument, to_bson_id, to_points,
    },
};
use crate::dao::{
    game_store::GameStore,
    models::{
        AnswerReceipt, GamePlayerEntity, GameSessionEntity, PlayerAnswerEntity, QuestionId,
        SessionStatus, SessionTransition, UserId,
    },
    storage::StorageResult,
};

pub(super) const SESSION_COLLECTION: &str = "game_sessions";
pub(super) const PLAYER_COLLECTION: &str = "game_players";
pub(super) const ANSWER_COLLECTION: &str = "player_answers";

const TRANSACTION_ATTEMPTS: u32 = 3;
const COMMIT_ATTEMPTS: u32 = 3;

/// [`GameStore`] persisting sessions, players and answers in MongoDB.
#[derive(Clone)]
pub struct MongoGameStore {
    pub(super) inner: Arc<MongoInner>,
}

pub(super) struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database().await;
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = establish_connection(&self.config).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }

    pub(super) async fn database(&self) -> Database {
        self.state.read().await.database.clone()
    }

    async fn client(&self) -> Client {
        self.state.read().await.client.clone()
    }
}

impl MongoGameStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = establish_connection(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.inner.database().await;
        let specs: [(&'static str, &'static str, _, bool); 4] = [
            (
                PLAYER_COLLECTION,
                "session_user_unique",
                doc! {"session_id": 1, "user_id": 1},
                true,
            ),
            (
                ANSWER_COLLECTION,
                "session_question_player_unique",
                doc! {"session_id": 1, "question_id": 1, "player_id": 1},
                true,
            ),
            (
                SESSION_COLLECTION,
                "status_created_idx",
                doc! {"status": 1, "created_at": -1},
                false,
            ),
            (
                SESSION_COLLECTION,
                "host_created_idx",
                doc! {"host_id": 1, "created_at": -1},
                false,
            ),
        ];

        for (collection, name, keys, unique) in specs {
            let index = IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(name.to_owned()))
                        .unique(Some(unique))
                        .build(),
                )
                .build();
            database
                .collection::<mongodb::bson::Document>(collection)
                .create_index(index)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index: name,
                    source,
                })?;
        }

        Ok(())
    }

    async fn sessions(&self) -> Collection<MongoSessionDocument> {
        self.inner.database().await.collection(SESSION_COLLECTION)
    }

    async fn players(&self) -> Collection<MongoPlayerDocument> {
        self.inner.database().await.collection(PLAYER_COLLECTION)
    }

    async fn answers(&self) -> Collection<MongoAnswerDocument> {
        self.inner.database().await.collection(ANSWER_COLLECTION)
    }

    async fn insert_session(&self, session: GameSessionEntity) -> MongoResult<()> {
        let id = session.id.clone();
        let document: MongoSessionDocument = session.into();
        self.sessions()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| {
                MongoDaoError::from_insert(SESSION_COLLECTION, "game session", id, source)
            })?;
        Ok(())
    }

    async fn delete_session(&self, id: String) -> MongoResult<bool> {
        let result = self
            .sessions()
            .await
            .delete_one(doc! {"_id": id.as_str()})
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: SESSION_COLLECTION,
                source,
            })?;
        self.players()
            .await
            .delete_many(doc! {"session_id": id.as_str()})
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: PLAYER_COLLECTION,
                source,
            })?;
        Ok(result.deleted_count > 0)
    }

    async fn find_session(&self, id: String) -> MongoResult<Option<GameSessionEntity>> {
        let document = self
            .sessions()
            .await
            .find_one(doc! {"_id": id})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: SESSION_COLLECTION,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn transition_session(
        &self,
        id: String,
        transition: SessionTransition,
    ) -> MongoResult<Option<GameSessionEntity>> {
        let at = DateTime::from_system_time(transition.at);
        let mut set = doc! {"status": transition.to.as_str()};
        match transition.to {
            SessionStatus::InProgress => {
                set.insert("started_at", at);
            }
            SessionStatus::Completed => {
                set.insert("finished_at", at);
            }
            SessionStatus::Lobby => {}
        }

        let document = self
            .sessions()
            .await
            .find_one_and_update(
                doc! {"_id": id, "status": transition.from.as_str()},
                doc! {"$set": set},
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: SESSION_COLLECTION,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn list_sessions(
        &self,
        filter: mongodb::bson::Document,
    ) -> MongoResult<Vec<GameSessionEntity>> {
        let documents: Vec<MongoSessionDocument> = self
            .sessions()
            .await
            .find(filter)
            .sort(doc! {"created_at": -1})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: SESSION_COLLECTION,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: SESSION_COLLECTION,
                source,
            })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn insert_player(&self, player: GamePlayerEntity) -> MongoResult<()> {
        let key = format!("{}/{}", player.session_id, player.user_id);
        let document: MongoPlayerDocument = player.into();
        self.players()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| {
                MongoDaoError::from_insert(PLAYER_COLLECTION, "game player", key, source)
            })?;
        Ok(())
    }

    async fn find_player(
        &self,
        session_id: String,
        user_id: UserId,
    ) -> MongoResult<Option<GamePlayerEntity>> {
        let document = self
            .players()
            .await
            .find_one(doc! {"session_id": session_id, "user_id": to_bson_id(user_id)})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: PLAYER_COLLECTION,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn list_players(&self, session_id: String) -> MongoResult<Vec<GamePlayerEntity>> {
        let documents: Vec<MongoPlayerDocument> = self
            .players()
            .await
            .find(doc! {"session_id": session_id})
            .sort(doc! {"joined_at": 1, "_id": 1})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: PLAYER_COLLECTION,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: PLAYER_COLLECTION,
                source,
            })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn find_answer(
        &self,
        session_id: String,
        question_id: QuestionId,
        player_id: UserId,
    ) -> MongoResult<Option<PlayerAnswerEntity>> {
        let document = self
            .answers()
            .await
            .find_one(doc! {
                "session_id": session_id,
                "question_id": to_bson_id(question_id),
                "player_id": to_bson_id(player_id),
            })
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: ANSWER_COLLECTION,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn list_answers(&self, session_id: String) -> MongoResult<Vec<PlayerAnswerEntity>> {
        let documents: Vec<MongoAnswerDocument> = self
            .answers()
            .await
            .find(doc! {"session_id": session_id})
            .sort(doc! {"created_at": 1})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: ANSWER_COLLECTION,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: ANSWER_COLLECTION,
                source,
            })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn record_answer(&self, answer: PlayerAnswerEntity) -> MongoResult<AnswerReceipt> {
        if !self.inner.config.use_transactions {
            return self.record_answer_sequential(answer).await;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.record_answer_in_transaction(&answer).await {
                Err(MongoDaoError::Transaction { source })
                    if should_retry(
                        attempt,
                        TRANSACTION_ATTEMPTS,
                        source.contains_label(TRANSIENT_TRANSACTION_ERROR),
                    ) =>
                {
                    debug!(attempt, error = %source, "transient transaction error; retrying");
                }
                outcome => return outcome,
            }
        }
    }

    async fn record_answer_in_transaction(
        &self,
        answer: &PlayerAnswerEntity,
    ) -> MongoResult<AnswerReceipt> {
        let client = self.inner.client().await;
        let mut session = client
            .start_session()
            .await
            .map_err(|source| MongoDaoError::Transaction { source })?;
        session
            .start_transaction()
            .await
            .map_err(|source| MongoDaoError::Transaction { source })?;

        match self.write_answer(&mut session, answer).await {
            Ok(score) => {
                commit_with_retry(&mut session)
                    .await
                    .map_err(|source| MongoDaoError::Transaction { source })?;
                Ok(AnswerReceipt {
                    answer: answer.clone(),
                    player_score: Some(score),
                })
            }
            Err(err) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!(error = %abort_err, "failed to abort answer transaction");
                }
                Err(err)
            }
        }
    }

    async fn write_answer(
        &self,
        session: &mut ClientSession,
        answer: &PlayerAnswerEntity,
    ) -> MongoResult<u32> {
        let document: MongoAnswerDocument = answer.clone().into();
        self.answers()
            .await
            .insert_one(&document)
            .session(&mut *session)
            .await
            .map_err(|source| classify_answer_insert(answer, source))?;

        let player = self
            .players()
            .await
            .find_one_and_update(
                player_filter(answer),
                doc! {"$inc": {"score": i64::from(answer.points)}},
            )
            .return_document(ReturnDocument::After)
            .session(&mut *session)
            .await
            .map_err(|source| MongoDaoError::Transaction { source })?;

        match player {
            Some(player) => Ok(to_points(player.score)),
            None => Err(MongoDaoError::MissingPlayer {
                session_id: answer.session_id.clone(),
                player_id: answer.player_id,
            }),
        }
    }

    async fn record_answer_sequential(
        &self,
        answer: PlayerAnswerEntity,
    ) -> MongoResult<AnswerReceipt> {
        let document: MongoAnswerDocument = answer.clone().into();
        self.answers()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| classify_answer_insert(&answer, source))?;

        let updated = self
            .players()
            .await
            .find_one_and_update(
                player_filter(&answer),
                doc! {"$inc": {"score": i64::from(answer.points)}},
            )
            .return_document(ReturnDocument::After)
            .await;

        let player_score = match updated {
            Ok(Some(player)) => Some(to_points(player.score)),
            Ok(None) => {
                warn!(
                    session_id = %answer.session_id,
                    player_id = answer.player_id,
                    "answer recorded for a player row that no longer exists"
                );
                None
            }
            Err(err) => {
                warn!(
                    session_id = %answer.session_id,
                    player_id = answer.player_id,
                    error = %err,
                    "score increment failed after answer insert"
                );
                None
            }
        };

        Ok(AnswerReceipt {
            answer,
            player_score,
        })
    }
}

fn player_filter(answer: &PlayerAnswerEntity) -> mongodb::bson::Document {
    doc! {
        "session_id": answer.session_id.as_str(),
        "user_id": to_bson_id(answer.player_id),
    }
}

/// Commit, retrying while the server labels the outcome `UnknownTransactionCommitResult`.
async fn commit_with_retry(session: &mut ClientSession) -> Result<(), mongodb::error::Error> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match session.commit_transaction().await {
            Err(err)
                if should_retry(
                    attempt,
                    COMMIT_ATTEMPTS,
                    err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT),
                ) =>
            {
                debug!(attempt, error = %err, "unknown commit result; retrying commit");
            }
            outcome => return outcome,
        }
    }
}

fn should_retry(attempt: u32, limit: u32, labelled: bool) -> bool {
    labelled && attempt < limit
}

fn classify_answer_insert(
    answer: &PlayerAnswerEntity,
    source: mongodb::error::Error,
) -> MongoDaoError {
    // Inside a transaction a concurrent duplicate may surface as a transient
    // write conflict; keep it retryable instead of reporting a plain write failure.
    if source.contains_label(TRANSIENT_TRANSACTION_ERROR) {
        return MongoDaoError::Transaction { source };
    }
    MongoDaoError::from_insert(
        ANSWER_COLLECTION,
        "player answer",
        format!(
            "{}/{}/{}",
            answer.session_id, answer.question_id, answer.player_id
        ),
        source,
    )
}

impl GameStore for MongoGameStore {
    fn insert_session(&self, session: GameSessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_session(session).await.map_err(Into::into) })
    }

    fn delete_session(&self, id: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_session(id).await.map_err(Into::into) })
    }

    fn find_session(
        &self,
        id: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session(id).await.map_err(Into::into) })
    }

    fn transition_session(
        &self,
        id: String,
        transition: SessionTransition,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .transition_session(id, transition)
                .await
                .map_err(Into::into)
        })
    }

    fn list_sessions_by_status(
        &self,
        status: SessionStatus,
    ) -> BoxFuture<'static, StorageResult<Vec<GameSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_sessions(doc! {"status": status.as_str()})
                .await
                .map_err(Into::into)
        })
    }

    fn list_sessions_by_host(
        &self,
        host_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Vec<GameSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_sessions(doc! {"host_id": to_bson_id(host_id)})
                .await
                .map_err(Into::into)
        })
    }

    fn insert_player(&self, player: GamePlayerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_player(player).await.map_err(Into::into) })
    }

    fn find_player(
        &self,
        session_id: String,
        user_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Option<GamePlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_player(session_id, user_id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_players(
        &self,
        session_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<GamePlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_players(session_id).await.map_err(Into::into) })
    }

    fn find_answer(
        &self,
        session_id: String,
        question_id: QuestionId,
        player_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerAnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_answer(session_id, question_id, player_id)
                .await
                .map_err(Into::into)
        })
    }

    fn record_answer(
        &self,
        answer: PlayerAnswerEntity,
    ) -> BoxFuture<'static, StorageResult<AnswerReceipt>> {
        let store = self.clone();
        Box::pin(async move { store.record_answer(answer).await.map_err(Into::into) })
    }

    fn list_answers(
        &self,
        session_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerAnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_answers(session_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_only_labelled_errors_within_the_limit() {
        assert!(should_retry(1, COMMIT_ATTEMPTS, true));
        assert!(should_retry(COMMIT_ATTEMPTS - 1, COMMIT_ATTEMPTS, true));
        assert!(!should_retry(COMMIT_ATTEMPTS, COMMIT_ATTEMPTS, true));
        assert!(!should_retry(1, COMMIT_ATTEMPTS, false));
    }
}
