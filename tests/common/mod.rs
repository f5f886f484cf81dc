use std::sync::Arc;

use quiz_live_back::{
    config::AppConfig,
    dao::game_store::memory::{CatalogSeed, MemoryGameStore, MemoryQuizCatalog},
    state::{AppState, Backend, SharedState},
};
use serde_json::json;

pub const HOST: u64 = 1;
pub const ALICE: u64 = 2;

/// Quiz 1 with question 1 (choice 10 correct, 11 wrong) and question 2 (choice 20 correct).
pub fn seeded_state() -> SharedState {
    seeded_state_with(AppConfig::default())
}

pub fn seeded_state_with(config: AppConfig) -> SharedState {
    let seed: CatalogSeed = serde_json::from_value(json!({
        "quizzes": [{
            "id": 1,
            "title": "Capitals",
            "questions": [
                {
                    "id": 1,
                    "choices": [{"id": 10, "is_correct": true}, {"id": 11, "is_correct": false}]
                },
                {"id": 2, "choices": [{"id": 20, "is_correct": true}]}
            ]
        }]
    }))
    .unwrap();
    AppState::with_backend(
        config,
        Backend::new(
            Arc::new(MemoryGameStore::new()),
            Arc::new(MemoryQuizCatalog::from_seed(seed)),
        ),
    )
}
