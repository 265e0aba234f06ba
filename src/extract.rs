use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// `Json<T>` whose rejection goes through [`AppError`], so a malformed body
/// gets the same envelope as every other failure.
pub struct AppJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(AppJson(value))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        // serde's detail can echo submitted values, passwords included
        tracing::debug!(status = %rejection.status(), "request body rejected");
        let reason = match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                "Expected a request body with Content-Type: application/json"
            }
            JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON",
            JsonRejection::JsonDataError(_) => "Request body has missing or mistyped fields",
            _ => "Request body could not be read",
        };
        AppError::Validation(reason.into())
    }
}
