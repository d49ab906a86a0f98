use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use thiserror::Error;

use crate::models::ProviderKind;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Provider is not configured: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Ranking is not supported by the {0} provider")]
    RankingUnsupported(ProviderKind),

    #[error("Provider rejected credentials: {0}")]
    ProviderAuth(String),

    #[error("Provider rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Provider request timed out")]
    Timeout,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type VisionResult<T> = Result<T, VisionError>;

impl VisionError {
    /// Machine-readable code carried by `error` events
    pub fn code(&self) -> &'static str {
        match self {
            VisionError::Config(_) => "CONFIG_ERROR",
            VisionError::Validation(_) => "VALIDATION_ERROR",
            VisionError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            VisionError::RankingUnsupported(_) => "RANKING_UNSUPPORTED",
            VisionError::ProviderAuth(_) => "AUTH_ERROR",
            VisionError::RateLimited(_) => "RATE_LIMITED",
            VisionError::Timeout => "TIMEOUT",
            VisionError::Provider(_) => "PROVIDER_ERROR",
            VisionError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, VisionError::RateLimited(_) | VisionError::Timeout)
    }

    /// Classify a non-success provider HTTP status
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => VisionError::ProviderAuth(body),
            429 => VisionError::RateLimited(body),
            408 | 504 => VisionError::Timeout,
            _ => VisionError::Provider(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<reqwest::Error> for VisionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VisionError::Timeout
        } else if let Some(status) = err.status() {
            VisionError::from_status(status, err.to_string())
        } else {
            VisionError::Provider(err.to_string())
        }
    }
}

/// Convert VisionError to AppError for errors raised before a stream opens
impl From<VisionError> for AppError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::Config(msg) => AppError::ServiceUnavailable(msg),
            VisionError::Validation(msg) => AppError::BadRequest(msg),
            VisionError::SessionNotFound(id) => {
                AppError::NotFound(format!("Session {} not found", id))
            }
            err @ VisionError::RankingUnsupported(_) => {
                AppError::UnprocessableEntity(err.to_string())
            }
            err @ VisionError::ProviderAuth(_) => AppError::BadGateway(err.to_string()),
            err @ VisionError::RateLimited(_) => AppError::TooManyRequests(err.to_string()),
            err @ VisionError::Timeout => AppError::GatewayTimeout(err.to_string()),
            err @ VisionError::Provider(_) => AppError::BadGateway(err.to_string()),
            VisionError::Internal(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl IntoResponse for VisionError {
    fn into_response(self) -> Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            VisionError::from_status(StatusCode::UNAUTHORIZED, String::new()),
            VisionError::ProviderAuth(_)
        ));
        assert!(matches!(
            VisionError::from_status(StatusCode::FORBIDDEN, String::new()),
            VisionError::ProviderAuth(_)
        ));
        assert!(matches!(
            VisionError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            VisionError::RateLimited(_)
        ));
        assert!(matches!(
            VisionError::from_status(StatusCode::GATEWAY_TIMEOUT, String::new()),
            VisionError::Timeout
        ));
        assert!(matches!(
            VisionError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "boom".into()),
            VisionError::Provider(msg) if msg.contains("boom")
        ));
    }

    #[test]
    fn test_codes_are_distinct_per_provider_failure() {
        let codes = [
            VisionError::ProviderAuth(String::new()).code(),
            VisionError::RateLimited(String::new()).code(),
            VisionError::Timeout.code(),
            VisionError::Provider(String::new()).code(),
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_retryable() {
        assert!(VisionError::Timeout.is_retryable());
        assert!(VisionError::RateLimited(String::new()).is_retryable());
        assert!(!VisionError::ProviderAuth(String::new()).is_retryable());
        assert!(!VisionError::RankingUnsupported(ProviderKind::OpenAi).is_retryable());
    }

    #[test]
    fn test_http_status_mapping() {
        let response = VisionError::SessionNotFound("abc".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = VisionError::RankingUnsupported(ProviderKind::OpenAi).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = VisionError::Config("GEMINI_API_KEY not set".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
