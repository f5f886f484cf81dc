//! Caller identity handed over by the upstream authentication layer.

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};

use crate::{dao::models::UserId, error::AppError};

/// Header carrying the authenticated numeric user identifier.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated user making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity(pub UserId);

fn parse_identity(parts: &Parts) -> Result<Option<UserId>, AppError> {
    let Some(value) = parts.headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<UserId>().ok())
        .map(Some)
        .ok_or_else(|| AppError::BadRequest(format!("malformed `{USER_ID_HEADER}` header")))
}

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parse_identity(parts)?
            .map(CallerIdentity)
            .ok_or_else(|| AppError::Unauthorized(format!("missing `{USER_ID_HEADER}` header")))
    }
}

impl<S> OptionalFromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parse_identity(parts)?.map(CallerIdentity))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn parses_numeric_header() {
        assert_eq!(parse_identity(&parts(Some(" 42 "))).unwrap(), Some(42));
        assert_eq!(parse_identity(&parts(None)).unwrap(), None);
        assert!(matches!(
            parse_identity(&parts(Some("alice"))),
            Err(AppError::BadRequest(_))
        ));
    }
}
