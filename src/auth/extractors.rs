use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::{cookie, jwt::TokenError};
use crate::{
    error::AppError,
    state::AppState,
    users::repo_types::{Role, User},
};

/// Bearer token from `Authorization: Bearer <token>`, falling back to the
/// session cookie.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    from_header.or_else(|| cookie::get_cookie(headers, cookie::SESSION_COOKIE_NAME))
}

/// True when the password changed after the token was issued. Compared in
/// whole seconds, the resolution of `iat`, so a token issued earlier within
/// the same second as the change is still accepted.
pub fn changed_password_after(password_changed_at: Option<OffsetDateTime>, iat: i64) -> bool {
    match password_changed_at {
        Some(changed) => changed.unix_timestamp() > iat,
        None => false,
    }
}

/// Resolves the caller behind a request's bearer token.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let token = bearer_token(headers).ok_or(AppError::Unauthenticated)?;

    let claims = state.jwt.verify(&token).map_err(|e| {
        match e {
            TokenError::Expired => debug!("expired token presented"),
            TokenError::InvalidSignature => warn!("token with invalid signature presented"),
        }
        AppError::InvalidToken
    })?;

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %claims.sub, "token subject no longer exists");
            AppError::SessionUserGone
        })?;

    if changed_password_after(user.password_changed_at, claims.iat) {
        debug!(user_id = %user.id, "token predates password change");
        return Err(AppError::StalePassword);
    }

    Ok(user)
}

/// Rejects with `Forbidden` unless `role` is allowed.
pub fn restrict_to(role: Role, allowed: &[Role]) -> Result<(), AppError> {
    if allowed.contains(&role) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// Authenticated, fresh user. Rejects the request otherwise.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(state, &parts.headers).await.map(CurrentUser)
    }
}

/// Same checks as [`CurrentUser`], but any failure just means "anonymous".
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(authenticate(state, &parts.headers).await.ok()))
    }
}
