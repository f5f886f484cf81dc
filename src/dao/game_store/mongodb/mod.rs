//! MongoDB-backed game store and quiz catalog.

mod catalog;
pub mod config;
mod connection;
mod error;
mod models;
pub mod store;

pub use catalog::MongoQuizCatalog;
pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoGameStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::Duplicate { entity, key } => StorageError::conflict(entity, key),
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
