use serde::{Deserialize, Serialize};

use super::repo_types::User;

/// Body of `PATCH /updateMe`. Only `name`, `email` and `phone` are applied;
/// any other field is dropped. Password fields are captured to reject them.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    password: Option<serde_json::Value>,
    password_confirm: Option<serde_json::Value>,
    password_current: Option<serde_json::Value>,
}

impl UpdateMeRequest {
    pub fn carries_password(&self) -> bool {
        self.password.is_some() || self.password_confirm.is_some() || self.password_current.is_some()
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}
fn default_limit() -> i64 { 20 }

impl Pagination {
    pub fn clamped(&self) -> (i64, i64) {
        (self.limit.clamp(1, 100), self.offset.max(0))
    }
}

#[derive(Debug, Serialize)]
pub struct UserData {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub status: &'static str,
    pub data: UserData,
}

impl UserResponse {
    pub fn new(user: User) -> Self {
        Self {
            status: "success",
            data: UserData { user },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UsersData {
    pub users: Vec<User>,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub status: &'static str,
    pub results: usize,
    pub data: UsersData,
}
