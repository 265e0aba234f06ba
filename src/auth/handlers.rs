use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use tracing::instrument;

use super::{
    cookie,
    dto::{
        AuthResponse, ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, SignupRequest,
        UpdatePasswordRequest,
    },
    extractors::{CurrentUser, MaybeUser},
    services,
};
use crate::{error::AppError, extract::AppJson, state::AppState, users::repo_types::User};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup/user", post(signup))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/forgotPassword", post(forgot_password))
        .route("/resetPassword/:token", patch(reset_password))
        .route("/updateMyPassword", patch(update_my_password))
        .route("/session", get(session))
}

/// Token in the body and in an http-only cookie.
fn send_token(state: &AppState, status: StatusCode, user: User, token: String) -> Response {
    let cookie = cookie::session_cookie(
        &token,
        state.jwt.ttl(),
        state.config.env.secure_cookies(),
    );
    (
        status,
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(AuthResponse::with_token(token, user)),
    )
        .into_response()
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignupRequest>,
) -> Result<Response, AppError> {
    let (user, token) = services::signup(&state, payload).await?;
    Ok(send_token(&state, StatusCode::CREATED, user, token))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Response, AppError> {
    let (user, token) = services::login(&state, payload).await?;
    Ok(send_token(&state, StatusCode::OK, user, token))
}

#[instrument(skip(state))]
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let cookie = cookie::logout_cookie(state.config.env.secure_cookies());
    (
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(AuthResponse::message("Logged out")),
    )
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ForgotPasswordRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    services::forgot_password(&state, payload).await?;
    Ok(Json(AuthResponse::message("Token sent to email!")))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> Result<Response, AppError> {
    let (user, token) = services::reset_password(&state, &token, payload).await?;
    Ok(send_token(&state, StatusCode::OK, user, token))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_my_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(payload): AppJson<UpdatePasswordRequest>,
) -> Result<Response, AppError> {
    let (user, token) = services::update_password(&state, &user, payload).await?;
    Ok(send_token(&state, StatusCode::OK, user, token))
}

/// Lets clients render logged-in and anonymous views from one call.
#[instrument(skip_all)]
pub async fn session(MaybeUser(user): MaybeUser) -> Json<serde_json::Value> {
    Json(json!({
        "status": "success",
        "data": {
            "loggedIn": user.is_some(),
            "user": user,
        }
    }))
}
