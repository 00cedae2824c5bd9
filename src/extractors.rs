use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::response::AppError;

/// `axum::Json<T>` whose rejections use the API error envelope.
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        axum::Json::<T>::from_request(req, state)
            .await
            .map(|axum::Json(value)| JsonBody(value))
            .map_err(rejection_to_app_error)
    }
}

fn rejection_to_app_error(rejection: JsonRejection) -> AppError {
    tracing::warn!(error = %rejection, "Rejected JSON body");
    match rejection {
        // Field-level errors name the offending setting; operators need that.
        JsonRejection::JsonDataError(e) => AppError::bad_request(
            "INVALID_REQUEST_BODY",
            &format!("Invalid request body: {}", e.body_text()),
        ),
        JsonRejection::MissingJsonContentType(_) => AppError::bad_request(
            "INVALID_REQUEST_BODY",
            "Expected a JSON body with Content-Type: application/json",
        ),
        _ => AppError::bad_request("INVALID_REQUEST_BODY", "Invalid request body"),
    }
}
