/// Error handling for the API server
///
/// This module provides a unified error type that maps to HTTP responses.
/// All handlers return `Result<T, ApiError>`.
///
/// Most errors render as `{ "error", "message", "details"? }`. Errors on the
/// detection and registration endpoints render as the result envelope
/// (`is_success: false`) that clients of those endpoints already parse.
///
/// # Example
///
/// ```
/// use mildew_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler(found: bool) -> ApiResult<Json<serde_json::Value>> {
///     if !found {
///         return Err(ApiError::NotFound("Record not found".to_string()));
///     }
///     Ok(Json(json!({ "ok": true })))
/// }
/// ```

use crate::envelope::Envelope;
use axum::{
    extract::multipart::MultipartError,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mildew_engine::detector::DetectorError;
use mildew_engine::imaging::ImageError;
use mildew_engine::predictor::PredictError;
use mildew_shared::auth::jwt::JwtError;
use mildew_shared::auth::password::PasswordError;
use serde::{Deserialize, Serialize};

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unauthorized (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict (409), e.g. duplicate username
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Payload too large (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Unprocessable entity (422), validation errors
    #[error("Validation failed: {} errors", .0.len())]
    ValidationError(Vec<ValidationErrorDetail>),

    /// Too many requests (429)
    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded { retry_after: u64, message: String },

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    InternalError(String),

    /// Service unavailable (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Failure rendered as an `is_success: false` envelope
    #[error("{message}")]
    Envelope { status: StatusCode, message: String },
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "bad_request", "unauthorized")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    /// "识别失败, 由于<reason>" envelope
    pub fn detection_failed(status: StatusCode, reason: impl std::fmt::Display) -> Self {
        ApiError::Envelope {
            status,
            message: format!("识别失败, 由于{}", reason),
        }
    }

    /// "注册失败, 由于<reason>" envelope
    pub fn registration_failed(status: StatusCode, reason: impl std::fmt::Display) -> Self {
        ApiError::Envelope {
            status,
            message: format!("注册失败, 由于{}", reason),
        }
    }

    /// "用户不存在" envelope
    pub fn user_not_found() -> Self {
        ApiError::Envelope {
            status: StatusCode::NOT_FOUND,
            message: "用户不存在".to_string(),
        }
    }

    /// Collects `validator` failures into a 422
    pub fn from_validation(errors: validator::ValidationErrors) -> Self {
        let details = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        ApiError::ValidationError(details)
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Envelope { status, .. } => *status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (error_code, message, details) = match self {
            ApiError::Envelope { message, .. } => {
                if status.is_server_error() {
                    tracing::error!(status = %status, "{}", message);
                }
                return (status, Json(Envelope::failure(message))).into_response();
            }
            ApiError::RateLimitExceeded { retry_after, message } => {
                let body = Json(ErrorResponse {
                    error: "rate_limit_exceeded".to_string(),
                    message,
                    details: None,
                });
                let mut response = (status, body).into_response();
                response
                    .headers_mut()
                    .insert("Retry-After", HeaderValue::from(retry_after));
                return response;
            }
            ApiError::BadRequest(msg) => ("bad_request", msg, None),
            ApiError::Unauthorized(msg) => ("unauthorized", msg, None),
            ApiError::NotFound(msg) => ("not_found", msg, None),
            ApiError::Conflict(msg) => ("conflict", msg, None),
            ApiError::PayloadTooLarge(msg) => ("payload_too_large", msg, None),
            ApiError::ValidationError(errors) => (
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                ("internal_error", "An internal error occurred".to_string(), None)
            }
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg, None),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return ApiError::Conflict("Username already exists".to_string());
            }
            if db_err.is_foreign_key_violation() {
                return ApiError::NotFound("Referenced user not found".to_string());
            }
        }

        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

/// Convert password errors to API errors
impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

/// Convert JWT errors to API errors
impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::CreateError(msg) => ApiError::InternalError(format!("Token creation failed: {}", msg)),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

/// Convert image errors to detection envelopes
impl From<ImageError> for ApiError {
    fn from(err: ImageError) -> Self {
        let status = match err {
            ImageError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::detection_failed(status, err)
    }
}

/// Convert detector errors to detection envelopes
impl From<DetectorError> for ApiError {
    fn from(err: DetectorError) -> Self {
        let status = match err {
            DetectorError::ModelUnavailable(_) | DetectorError::Remote(_) | DetectorError::Unsupported(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::detection_failed(status, err)
    }
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::Image(e) => e.into(),
            PredictError::Detector(e) => e.into(),
            PredictError::Join(msg) => ApiError::detection_failed(StatusCode::INTERNAL_SERVER_ERROR, msg),
        }
    }
}

/// Multipart failures; a body over the upload limit becomes 413
impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}
