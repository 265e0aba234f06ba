use serde::{Deserialize, Serialize};

use crate::users::repo_types::User;

// Request bodies carrying secrets deliberately do not derive Debug.

/// Request body for `POST /signup/user`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
    pub phone: Option<String>,
    pub role: Option<String>,
}

/// Request body for login.
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    #[serde(default)]
    pub password_current: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

#[derive(Debug, Serialize)]
pub struct UserData {
    pub user: User,
}

/// Success envelope returned by every auth route.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<UserData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl AuthResponse {
    pub fn with_token(token: String, user: User) -> Self {
        Self {
            status: "success",
            token: Some(token),
            data: Some(UserData { user }),
            message: None,
        }
    }

    pub fn message(message: &'static str) -> Self {
        Self {
            status: "success",
            token: None,
            data: None,
            message: Some(message),
        }
    }
}
