use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};

use super::handlers::{reject, ApiError};

/// Session token taken from `Authorization: Bearer <token>`.
pub struct SessionToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Missing Authorization header"))?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Invalid Authorization header"))?;

        Ok(SessionToken(token.to_string()))
    }
}
