use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::Response;

use super::errors::json_error;
use crate::domain::value_objects::UserId;

/// Header set by the authenticating gateway in front of this service.
pub const USER_HEADER: &str = "x-user-id";

/// The authenticated caller. Credentials are checked upstream; the id is trusted.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "missing X-User-Id header"))?;
        raw.trim()
            .parse::<UserId>()
            .map(CurrentUser)
            .map_err(|_| json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "X-User-Id is not a valid id"))
    }
}
