use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

/// Uniform body for every response the API produces.
///
/// Built once through [`ServiceResponse::success`] or [`ServiceResponse::failure`]
/// and never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse<T> {
    success: bool,
    message: String,
    response_object: Option<T>,
    status_code: u16,
}

impl<T: Serialize> ServiceResponse<T> {
    pub fn success(message: impl Into<String>, response_object: T, status: StatusCode) -> Self {
        Self {
            success: true,
            message: message.into(),
            response_object: Some(response_object),
            status_code: status.as_u16(),
        }
    }

    pub fn failure(
        message: impl Into<String>,
        response_object: Option<T>,
        status: StatusCode,
    ) -> Self {
        Self {
            success: false,
            message: message.into(),
            response_object,
            status_code: status.as_u16(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn response_object(&self) -> Option<&T> {
        self.response_object.as_ref()
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl<T: Serialize> IntoResponse for ServiceResponse<T> {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// A single failed input constraint, addressed by its field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub path: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Flattens nested `validator` errors into path/message pairs, sorted by path.
pub fn field_violations(errors: &ValidationErrors) -> Vec<FieldViolation> {
    let mut out = Vec::new();
    collect_violations(errors, None, &mut out);
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

fn collect_violations(errors: &ValidationErrors, prefix: Option<&str>, out: &mut Vec<FieldViolation>) {
    for (field, kind) in errors.errors() {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{field}"),
            None => field.to_string(),
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| error.code.to_string());
                    out.push(FieldViolation::new(path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_violations(nested, Some(&path), out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_violations(nested, Some(&format!("{path}[{index}]")), out);
                }
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed")]
    ValidationError(Vec<FieldViolation>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    TooManyRequests(String, Option<u64>),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error(transparent)]
    InternalError(#[from] anyhow::Error),
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::ValidationError(field_violations(&err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

/// How much of an unexpected failure is shown to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorExposure {
    /// Real message plus error chain (non-production).
    Full,
    /// Generic message only (production).
    Redacted,
}

/// Normalized view of an [`AppError`], independent of who renders it.
///
/// `AppError::into_response` stores one of these in the response extensions so
/// that `error_envelope_middleware` can re-render the body with the request id
/// and the exposure level of the running environment.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    status: StatusCode,
    message: String,
    internal_message: Option<String>,
    details: Option<Vec<FieldViolation>>,
    stack: Option<String>,
    retry_after: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<FieldViolation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

impl ErrorReport {
    fn operational(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            internal_message: None,
            details: None,
            stack: None,
            retry_after: None,
        }
    }

    fn unexpected(message: String, chain: &anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error".to_string(),
            internal_message: Some(message),
            details: None,
            stack: Some(format!("{chain:?}")),
            retry_after: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Message the client sees under the given exposure.
    pub fn message(&self, exposure: ErrorExposure) -> &str {
        match (exposure, &self.internal_message) {
            (ErrorExposure::Full, Some(internal)) => internal,
            _ => &self.message,
        }
    }

    pub fn render(&self, exposure: ErrorExposure, request_id: Option<&str>) -> Response {
        let object = ErrorObject {
            details: self.details.clone(),
            stack: match exposure {
                ErrorExposure::Full => self.stack.clone(),
                ErrorExposure::Redacted => None,
            },
            request_id: request_id.map(str::to_owned),
        };
        let object = if object.details.is_none() && object.stack.is_none() && object.request_id.is_none() {
            None
        } else {
            Some(object)
        };

        let mut res =
            ServiceResponse::failure(self.message(exposure), object, self.status).into_response();

        if let Some(retry) = self.retry_after {
            res.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry));
        }

        res
    }
}

impl AppError {
    pub fn report(&self) -> ErrorReport {
        match self {
            AppError::ValidationError(violations) => ErrorReport {
                details: Some(violations.clone()),
                ..ErrorReport::operational(StatusCode::UNPROCESSABLE_ENTITY, "Validation failed")
            },
            AppError::BadRequest(msg) => ErrorReport::operational(StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => ErrorReport::operational(StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => ErrorReport::operational(StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => ErrorReport::operational(StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => ErrorReport::operational(StatusCode::CONFLICT, msg),
            AppError::TooManyRequests(msg, retry) => ErrorReport {
                retry_after: *retry,
                ..ErrorReport::operational(StatusCode::TOO_MANY_REQUESTS, msg)
            },
            AppError::InvalidToken(_) => {
                ErrorReport::operational(StatusCode::UNAUTHORIZED, "Invalid or expired token")
            }
            AppError::ServiceUnavailable(_) => ErrorReport::operational(
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable",
            ),
            // Clients see the underlying message; the variant prefix stays in the logs.
            AppError::DatabaseError(err) | AppError::ConfigError(err) | AppError::InternalError(err) => {
                ErrorReport::unexpected(err.to_string(), err)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let report = self.report();

        if report.status().is_server_error() {
            tracing::error!(
                error = %self,
                chain = ?self,
                status = report.status().as_u16(),
                "Request failed"
            );
        } else {
            tracing::debug!(
                error = %self,
                status = report.status().as_u16(),
                "Request rejected"
            );
        }

        let mut res = report.render(ErrorExposure::Redacted, None);
        res.extensions_mut().insert(report);
        res
    }
}
