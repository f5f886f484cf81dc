//! Persistence layer: entities, storage traits and backends.

/// Session, player and answer storage plus quiz catalog lookups.
pub mod game_store;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
