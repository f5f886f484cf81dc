//! Errors raised by the MongoDB backend.

use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;

/// Result alias for MongoDB operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Server error code reported when a unique index rejects a write.
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Failures of the MongoDB game store and quiz catalog.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// `MONGO_URI` could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// The rejected URI.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A required environment variable is absent.
    #[error("environment variable `{var}` is not set")]
    MissingEnvVar {
        /// Variable name.
        var: &'static str,
    },
    /// The driver refused the client options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The server never answered the startup ping.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Pings tried before giving up.
        attempts: u32,
        /// Last driver error.
        #[source]
        source: MongoError,
    },
    /// Periodic ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Creating a startup index failed.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection being indexed.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A unique index rejected the write.
    #[error("{entity} `{key}` already exists")]
    Duplicate {
        /// Kind of record, e.g. `player answer`.
        entity: &'static str,
        /// Natural key of the duplicate.
        key: String,
    },
    #[error("failed to write to `{collection}`")]
    Write {
        /// Target collection.
        collection: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    #[error("failed to read from `{collection}`")]
    Read {
        /// Source collection.
        collection: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Starting, committing or aborting the answer transaction failed.
    #[error("transaction failed while recording an answer")]
    Transaction {
        /// Driver error, possibly labelled as transient.
        #[source]
        source: MongoError,
    },
    /// The score increment matched no player row.
    #[error("player {player_id} is not part of session `{session_id}`")]
    MissingPlayer {
        /// Session of the answer.
        session_id: String,
        /// Player whose score was to be updated.
        player_id: u64,
    },
}

impl MongoDaoError {
    /// Classify a failed insert, turning unique index violations into [`MongoDaoError::Duplicate`].
    pub fn from_insert(
        collection: &'static str,
        entity: &'static str,
        key: impl Into<String>,
        source: MongoError,
    ) -> Self {
        if is_duplicate_key(&source) {
            MongoDaoError::Duplicate {
                entity,
                key: key.into(),
            }
        } else {
            MongoDaoError::Write { collection, source }
        }
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY_CODE
        }
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}
