use futures::future::BoxFuture;
use mongodb::{Collection, bson::doc};

use super::{
    error::{MongoDaoError, MongoResult},
    models::{MongoChoiceDocument, MongoQuestionDocument, to_bson_id},
    store::MongoGameStore,
};
use crate::dao::{
    game_store::QuizCatalog,
    models::{ChoiceEntity, ChoiceId, QuestionEntity, QuestionId, QuizId},
    storage::StorageResult,
};

const QUIZ_COLLECTION: &str = "quizzes";
const QUESTION_COLLECTION: &str = "questions";
const CHOICE_COLLECTION: &str = "choices";

/// Read-only [`QuizCatalog`] over the collections written by the quiz-authoring service.
///
/// Shares the connection of the [`MongoGameStore`] it was created from, so
/// reconnects performed by the store apply here as well.
#[derive(Clone)]
pub struct MongoQuizCatalog {
    store: MongoGameStore,
}

impl MongoGameStore {
    /// Catalog reading from the same database as this store.
    pub fn catalog(&self) -> MongoQuizCatalog {
        MongoQuizCatalog {
            store: self.clone(),
        }
    }
}

impl MongoQuizCatalog {
    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.store.inner.database().await.collection(name)
    }

    async fn quiz_exists(&self, id: QuizId) -> MongoResult<bool> {
        let count = self
            .collection::<mongodb::bson::Document>(QUIZ_COLLECTION)
            .await
            .count_documents(doc! {"_id": to_bson_id(id)})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: QUIZ_COLLECTION,
                source,
            })?;
        Ok(count > 0)
    }

    async fn find_question(&self, id: QuestionId) -> MongoResult<Option<QuestionEntity>> {
        let document = self
            .collection::<MongoQuestionDocument>(QUESTION_COLLECTION)
            .await
            .find_one(doc! {"_id": to_bson_id(id)})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: QUESTION_COLLECTION,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn find_choice(&self, id: ChoiceId) -> MongoResult<Option<ChoiceEntity>> {
        let document = self
            .collection::<MongoChoiceDocument>(CHOICE_COLLECTION)
            .await
            .find_one(doc! {"_id": to_bson_id(id)})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: CHOICE_COLLECTION,
                source,
            })?;
        Ok(document.map(Into::into))
    }
}

impl QuizCatalog for MongoQuizCatalog {
    fn quiz_exists(&self, id: QuizId) -> BoxFuture<'static, StorageResult<bool>> {
        let catalog = self.clone();
        Box::pin(async move { catalog.quiz_exists(id).await.map_err(Into::into) })
    }

    fn find_question(
        &self,
        id: QuestionId,
    ) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let catalog = self.clone();
        Box::pin(async move { catalog.find_question(id).await.map_err(Into::into) })
    }

    fn find_choice(&self, id: ChoiceId) -> BoxFuture<'static, StorageResult<Option<ChoiceEntity>>> {
        let catalog = self.clone();
        Box::pin(async move { catalog.find_choice(id).await.map_err(Into::into) })
    }
}
