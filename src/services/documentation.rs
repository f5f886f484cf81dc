use utoipa::OpenApi;

/// OpenAPI document covering the REST routes and the WebSocket upgrade.
#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the quiz live backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
        crate::routes::sessions::create_session,
        crate::routes::sessions::list_sessions,
        crate::routes::sessions::get_session,
        crate::routes::sessions::join_session,
        crate::routes::sessions::start_session,
        crate::routes::sessions::end_session,
        crate::routes::sessions::submit_answer,
        crate::routes::sessions::session_results,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::SessionSummary,
            crate::dto::game::PlayerSummary,
            crate::dto::game::AnswerSummary,
            crate::dto::game::SessionDetail,
            crate::dto::game::SessionResultsResponse,
            crate::dto::game::AnswerResponse,
            crate::dto::game::CreateSessionRequest,
            crate::dto::game::JoinSessionRequest,
            crate::dto::game::SubmitAnswerRequest,
            crate::dao::models::SessionStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Game session lifecycle"),
        (name = "live", description = "WebSocket channel for live sessions"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_session_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/games/sessions/{id}/answers"));
        assert!(doc.paths.paths.contains_key("/ws"));
    }
}
