use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::store::StoreError;

/// Every failure the gateway can surface to a caller.
///
/// Variants carrying a `String` hold internal detail that is logged when the
/// response is rendered and never copied into the response body, except for
/// `InvalidRequest` and `InvalidBody`, whose text describes the caller's input.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing or malformed Authorization header")]
    MissingCredential,

    #[error("API key not recognised")]
    InvalidCredential,

    #[error("API key is deactivated")]
    DeactivatedCredential,

    #[error("insufficient credits")]
    InsufficientCredits,

    #[error("upstream master credential is not configured")]
    UpstreamConfigurationMissing,

    #[error("route not found")]
    NotFound,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("upstream timed out")]
    UpstreamTimeout,

    #[error("upstream response too large: {0}")]
    UpstreamTooLarge(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::MissingCredential => "missing_credential",
            GatewayError::InvalidCredential => "invalid_credential",
            GatewayError::DeactivatedCredential => "deactivated_credential",
            GatewayError::InsufficientCredits => "insufficient_credits",
            GatewayError::UpstreamConfigurationMissing => "upstream_configuration_missing",
            GatewayError::NotFound => "not_found",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::InvalidBody(_) => "invalid_body",
            GatewayError::PayloadTooLarge(_) => "payload_too_large",
            GatewayError::UpstreamTimeout => "upstream_timeout",
            GatewayError::UpstreamTooLarge(_) => "upstream_too_large",
            GatewayError::Upstream(_) => "upstream_failure",
            GatewayError::Store(_) => "store_failure",
            GatewayError::Internal(_) => "internal",
        }
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingCredential | GatewayError::InvalidCredential => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::DeactivatedCredential => StatusCode::FORBIDDEN,
            GatewayError::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::InvalidRequest(_) | GatewayError::InvalidBody(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamTooLarge(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamConfigurationMissing
            | GatewayError::Upstream(_)
            | GatewayError::Store(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error, message): (&str, String) = match self {
            GatewayError::MissingCredential => (
                "Missing or invalid Authorization header",
                "Send your API key as 'Authorization: Bearer <key>'".to_string(),
            ),
            GatewayError::InvalidCredential => (
                "Invalid DocuNexu API Key",
                "The API key was not recognised".to_string(),
            ),
            GatewayError::DeactivatedCredential => (
                "This API Key has been deactivated",
                "Contact support or create a new key".to_string(),
            ),
            GatewayError::InsufficientCredits => (
                "Insufficient credits",
                "Top up your account to continue using the API".to_string(),
            ),
            GatewayError::UpstreamConfigurationMissing => {
                tracing::error!("upstream master credential is not configured");
                (
                    "Internal Server Error: Missing upstream configuration",
                    "The service is misconfigured".to_string(),
                )
            }
            GatewayError::NotFound => ("Not found", "Unknown API route".to_string()),
            GatewayError::InvalidRequest(msg) => ("Invalid request", msg.clone()),
            GatewayError::InvalidBody(msg) => ("Invalid multipart body", msg.clone()),
            GatewayError::PayloadTooLarge(max) => (
                "Request body too large",
                format!("Request bodies are limited to {max} bytes"),
            ),
            GatewayError::UpstreamTimeout => (
                "Upstream timed out",
                "The document service did not respond in time".to_string(),
            ),
            GatewayError::UpstreamTooLarge(msg) => {
                tracing::error!("Upstream response too large: {}", msg);
                (
                    "Upstream response too large",
                    "The document service returned more data than allowed".to_string(),
                )
            }
            GatewayError::Upstream(msg) => {
                tracing::error!("Proxy error: {}", msg);
                (
                    "Failed to process request",
                    "An internal error occurred".to_string(),
                )
            }
            GatewayError::Store(e) => {
                tracing::error!("Store error: {}", e);
                (
                    "Failed to process request",
                    "An internal error occurred".to_string(),
                )
            }
            GatewayError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    "Failed to process request",
                    "An internal error occurred".to_string(),
                )
            }
        };

        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": error,
            "message": message,
        }))
    }
}
