//! JSON extractor with automatic validation using the validator crate.

use crate::errors::AppError;
use axum::extract::{FromRequest, Json, Request};
use serde::de::DeserializeOwned;
use validator::Validate;

/// JSON extractor with automatic validation.
///
/// Rejects malformed bodies with the JSON rejection status and invalid
/// ones with `400 VALIDATION_ERROR` plus per-field details.
///
/// # Example
/// ```ignore
/// use axum_helpers::extractors::ValidatedJson;
/// use serde::Deserialize;
/// use validator::Validate;
///
/// #[derive(Deserialize, Validate)]
/// struct AnalyzeRequest {
///     #[validate(length(min = 1))]
///     image: String,
/// }
///
/// async fn analyze(ValidatedJson(payload): ValidatedJson<AnalyzeRequest>) -> String {
///     format!("{} bytes", payload.image.len())
/// }
/// ```
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(data) = Json::<T>::from_request(req, state).await?;
        data.validate()?;
        Ok(ValidatedJson(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::StatusCode, routing::post};
    use serde::Deserialize;
    use tower::ServiceExt;

    #[derive(Deserialize, Validate)]
    struct Input {
        #[validate(length(min = 3))]
        name: String,
    }

    async fn handler(ValidatedJson(input): ValidatedJson<Input>) -> String {
        input.name
    }

    async fn send(body: &'static str) -> StatusCode {
        let app = Router::new().route("/", post(handler));
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_valid_body_passes() {
        assert_eq!(send(r#"{"name":"abc"}"#).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_body_is_400() {
        assert_eq!(send(r#"{"name":"ab"}"#).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_json_keeps_rejection_status() {
        assert_eq!(send(r#"{"name":"#).await, StatusCode::BAD_REQUEST);
        assert_eq!(send(r#"{"other":1}"#).await, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
