//! REST endpoints for game sessions.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use tracing::warn;

use crate::{
    dto::game::{
        AnswerResponse, CreateSessionRequest, JoinSessionRequest, PlayerSummary, SessionDetail,
        SessionListQuery, SessionResultsResponse, SessionSummary, SubmitAnswerRequest,
    },
    error::AppError,
    routes::identity::CallerIdentity,
    services::{session_events, session_service::AnswerSubmission},
    state::SharedState,
};

/// REST surface over the session coordinator. Mutations broadcast the same
/// events as their WebSocket counterparts.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/v1/games/sessions",
            post(create_session).get(list_sessions),
        )
        .route("/api/v1/games/sessions/{id}", get(get_session))
        .route("/api/v1/games/sessions/{id}/join", post(join_session))
        .route("/api/v1/games/sessions/{id}/start", post(start_session))
        .route("/api/v1/games/sessions/{id}/end", post(end_session))
        .route("/api/v1/games/sessions/{id}/answers", post(submit_answer))
        .route("/api/v1/games/sessions/{id}/results", get(session_results))
}

/// Create a lobby for a quiz; the caller becomes its host and first player.
#[utoipa::path(
    post,
    path = "/api/v1/games/sessions",
    tag = "sessions",
    params(("x-user-id" = u64, Header, description = "Authenticated user identifier")),
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = SessionSummary),
        (status = 404, description = "Unknown quiz")
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
    Valid(Json(payload)): Valid<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<SessionSummary>), AppError> {
    let session = state
        .coordinator()
        .create_session(caller, payload.quiz_id)
        .await?;
    Ok((StatusCode::CREATED, Json(session.into())))
}

/// Lobbies open for joining, or the caller's own sessions with `hostOnly=true`.
#[utoipa::path(
    get,
    path = "/api/v1/games/sessions",
    tag = "sessions",
    params(SessionListQuery),
    responses((status = 200, description = "Sessions", body = [SessionSummary]))
)]
pub async fn list_sessions(
    State(state): State<SharedState>,
    caller: Option<CallerIdentity>,
    Query(query): Query<SessionListQuery>,
) -> Result<Json<Vec<SessionSummary>>, AppError> {
    let sessions = if query.host_only {
        let CallerIdentity(caller) = caller.ok_or_else(|| {
            AppError::Unauthorized("listing hosted sessions requires `x-user-id`".into())
        })?;
        state.coordinator().list_sessions_hosted_by(caller).await?
    } else {
        state.coordinator().list_active_sessions().await?
    };
    Ok(Json(sessions.into_iter().map(Into::into).collect()))
}

/// Session with its players in join order.
#[utoipa::path(
    get,
    path = "/api/v1/games/sessions/{id}",
    tag = "sessions",
    params(("id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session and its players", body = SessionDetail),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionDetail>, AppError> {
    let coordinator = state.coordinator();
    let session = coordinator.get_session(&id).await?;
    let players = coordinator.list_players(&id).await?;
    Ok(Json(SessionDetail {
        session: session.into(),
        players: players.into_iter().map(Into::into).collect(),
    }))
}

/// Join a lobby; joining twice returns the existing player.
#[utoipa::path(
    post,
    path = "/api/v1/games/sessions/{id}/join",
    tag = "sessions",
    params(
        ("id" = String, Path, description = "Session identifier"),
        ("x-user-id" = u64, Header, description = "Authenticated user identifier")
    ),
    request_body = JoinSessionRequest,
    responses(
        (status = 200, description = "Player in the session", body = PlayerSummary),
        (status = 409, description = "Session already started or ended")
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    CallerIdentity(caller): CallerIdentity,
    Valid(Json(payload)): Valid<Json<JoinSessionRequest>>,
) -> Result<Json<PlayerSummary>, AppError> {
    let outcome = state
        .coordinator()
        .join_session(&id, caller, &payload.nickname)
        .await?;
    if outcome.newly_joined {
        session_events::broadcast_player_joined(&state, &outcome.player, None);
    }
    Ok(Json(outcome.player.into()))
}

/// Start the game. Host only.
#[utoipa::path(
    post,
    path = "/api/v1/games/sessions/{id}/start",
    tag = "sessions",
    params(
        ("id" = String, Path, description = "Session identifier"),
        ("x-user-id" = u64, Header, description = "Authenticated user identifier")
    ),
    responses(
        (status = 200, description = "Game started", body = SessionSummary),
        (status = 403, description = "Caller is not the host"),
        (status = 409, description = "Session is not in the lobby")
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    CallerIdentity(caller): CallerIdentity,
) -> Result<Json<SessionSummary>, AppError> {
    let session = state.coordinator().start_session(&id, caller).await?;
    session_events::broadcast_game_started(&state, &session, None);
    Ok(Json(session.into()))
}

/// End the game and broadcast the final standings. Host only.
#[utoipa::path(
    post,
    path = "/api/v1/games/sessions/{id}/end",
    tag = "sessions",
    params(
        ("id" = String, Path, description = "Session identifier"),
        ("x-user-id" = u64, Header, description = "Authenticated user identifier")
    ),
    responses(
        (status = 200, description = "Game ended", body = SessionSummary),
        (status = 403, description = "Caller is not the host"),
        (status = 409, description = "Session is not in progress")
    )
)]
pub async fn end_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    CallerIdentity(caller): CallerIdentity,
) -> Result<Json<SessionSummary>, AppError> {
    let coordinator = state.coordinator();
    let session = coordinator.end_session(&id, caller).await?;
    let ranking = match coordinator.session_results(&id).await {
        Ok(results) => results.ranking,
        Err(err) => {
            warn!(session_id = %id, error = %err, "failed to load final standings");
            Vec::new()
        }
    };
    session_events::broadcast_game_ended(&state, &session, ranking, None);
    Ok(Json(session.into()))
}

/// Record the caller's answer and broadcast a notice to the other players.
#[utoipa::path(
    post,
    path = "/api/v1/games/sessions/{id}/answers",
    tag = "sessions",
    params(
        ("id" = String, Path, description = "Session identifier"),
        ("x-user-id" = u64, Header, description = "Authenticated user identifier")
    ),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer recorded", body = AnswerResponse),
        (status = 409, description = "Already answered or game not in progress")
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    CallerIdentity(caller): CallerIdentity,
    Valid(Json(payload)): Valid<Json<SubmitAnswerRequest>>,
) -> Result<Json<AnswerResponse>, AppError> {
    let receipt = state
        .coordinator()
        .submit_answer(AnswerSubmission {
            session_id: id,
            user_id: caller,
            question_id: payload.question_id,
            choice_id: payload.choice_id,
            elapsed_secs: payload.time_spent,
        })
        .await?;
    session_events::broadcast_answer_submitted(&state, &receipt.answer, None);
    Ok(Json(AnswerResponse {
        answer: receipt.answer.into(),
        player_score: receipt.player_score,
    }))
}

/// Players ranked by score together with every recorded answer.
#[utoipa::path(
    get,
    path = "/api/v1/games/sessions/{id}/results",
    tag = "sessions",
    params(("id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Standings", body = SessionResultsResponse),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn session_results(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResultsResponse>, AppError> {
    let results = state.coordinator().session_results(&id).await?;
    Ok(Json(results.into()))
}
