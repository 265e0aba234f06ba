use axum::{
    extract::{Query, State},
    routing::{get, patch},
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{Pagination, UpdateMeRequest, UserListResponse, UserResponse, UsersData},
    repo_types::{ProfileUpdate, Role},
};
use crate::{
    auth::{
        extractors::{restrict_to, CurrentUser},
        validation::{check_email, check_name, check_phone, collect, non_blank, normalize_email},
    },
    error::AppError,
    extract::AppJson,
    state::AppState,
};

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/updateMe", patch(update_me))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/users", get(list_users))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::new(user))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(payload): AppJson<UpdateMeRequest>,
) -> Result<Json<UserResponse>, AppError> {
    if payload.carries_password() {
        return Err(AppError::Validation(
            "This route is not for password updates. Please use /updateMyPassword.".into(),
        ));
    }

    let update = ProfileUpdate {
        name: payload.name.map(|n| n.trim().to_string()),
        email: payload.email.as_deref().map(normalize_email),
        phone: non_blank(payload.phone),
    };
    collect([
        update.name.as_deref().map_or(Ok(()), check_name),
        update.email.as_deref().map_or(Ok(()), check_email),
        check_phone(update.phone.as_deref()),
    ])?;

    let updated = state.users.update_profile(user.id, update).await?;
    info!(user_id = %updated.id, "profile updated");
    Ok(Json(UserResponse::new(updated)))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(p): Query<Pagination>,
) -> Result<Json<UserListResponse>, AppError> {
    restrict_to(user.role, &[Role::Admin])?;
    let (limit, offset) = p.clamped();
    let users = state.users.list(limit, offset).await?;
    Ok(Json(UserListResponse {
        status: "success",
        results: users.len(),
        data: UsersData { users },
    }))
}
