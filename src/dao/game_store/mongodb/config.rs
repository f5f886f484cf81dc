//! MongoDB connection settings read from the environment.

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DATABASE: &str = "quiz_live";

/// Connection settings for [`MongoGameStore`](super::MongoGameStore).
#[derive(Clone)]
pub struct MongoConfig {
    /// Parsed driver options.
    pub options: ClientOptions,
    /// Database holding both the session collections and the quiz catalog.
    pub database_name: String,
    /// Record answers inside multi-document transactions (requires a replica set).
    pub use_transactions: bool,
}

impl MongoConfig {
    /// Parse `uri`, defaulting the database name to `quiz_live`.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or(DEFAULT_DATABASE).to_owned();
        let options = ClientOptions::parse(uri)
            .await
            .map_err(|source| MongoDaoError::InvalidUri {
                uri: uri.to_owned(),
                source,
            })?;

        Ok(Self {
            options,
            database_name,
            use_transactions: true,
        })
    }

    /// Read `MONGO_URI`, `MONGO_DB` and `MONGO_TRANSACTIONS` from the environment.
    pub async fn from_env() -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI")
            .map_err(|_| MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let db = std::env::var("MONGO_DB").ok();
        let mut config = Self::from_uri(&uri, db.as_deref()).await?;
        config.use_transactions = std::env::var("MONGO_TRANSACTIONS")
            .ok()
            .and_then(|value| parse_flag(&value))
            .unwrap_or(true);
        Ok(config)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::parse_flag;

    #[test]
    fn parses_common_flag_spellings() {
        assert_eq!(parse_flag("FALSE"), Some(false));
        assert_eq!(parse_flag(" on "), Some(true));
        assert_eq!(parse_flag("maybe"), None);
    }
}
