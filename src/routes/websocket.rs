//! Live session WebSocket endpoint.

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{
    config::AppConfig,
    dao::models::UserId,
    error::AppError,
    routes::identity::{CallerIdentity, USER_ID_HEADER},
    services::websocket_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/ws",
    tag = "live",
    params(
        (
            "x-user-id" = u64,
            Header,
            description = "Authenticated user. Required when `require_ws_identity` is set; \
                           when present every action must carry it"
        )
    ),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 401, description = "Identity header required but missing")
    )
)]
/// Upgrade the HTTP connection into a live session WebSocket.
pub async fn ws_handler(
    State(state): State<SharedState>,
    caller: Option<CallerIdentity>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let identity = connection_identity(state.config(), caller)?;
    let max_bytes = state.config().max_message_bytes;
    Ok(ws
        .max_message_size(max_bytes)
        .max_frame_size(max_bytes)
        .on_upgrade(move |socket| websocket_service::handle_socket(state, socket, identity))
        .into_response())
}

fn connection_identity(
    config: &AppConfig,
    caller: Option<CallerIdentity>,
) -> Result<Option<UserId>, AppError> {
    match caller {
        Some(CallerIdentity(id)) => Ok(Some(id)),
        None if config.require_ws_identity => Err(AppError::Unauthorized(format!(
            "missing `{USER_ID_HEADER}` header"
        ))),
        None => Ok(None),
    }
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_upgrade_follows_config() {
        let mut config = AppConfig::default();
        assert_eq!(connection_identity(&config, None).unwrap(), None);

        config.require_ws_identity = true;
        assert!(matches!(
            connection_identity(&config, None),
            Err(AppError::Unauthorized(_))
        ));
        assert_eq!(
            connection_identity(&config, Some(CallerIdentity(7))).unwrap(),
            Some(7)
        );
    }
}
