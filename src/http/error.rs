use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::error::DiError;

use super::HttpResponse;

/// Category of an [`HttpError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 400
    BadRequest,
    /// 400, with field details
    Validation,
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 408
    RequestTimeout,
    /// 409
    Conflict,
    /// 499, the client went away
    Cancelled,
    /// 500
    Internal,
    /// 503
    ServiceUnavailable,
    /// Any other status
    Other,
}

impl ErrorKind {
    /// Default status code.
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::BadRequest | ErrorKind::Validation => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::RequestTimeout => 408,
            ErrorKind::Conflict => 409,
            ErrorKind::Cancelled => 499,
            ErrorKind::Internal | ErrorKind::Other => 500,
            ErrorKind::ServiceUnavailable => 503,
        }
    }

    /// Machine-readable code used in error bodies.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::RequestTimeout => "REQUEST_TIMEOUT",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Cancelled => "CLIENT_CLOSED_REQUEST",
            ErrorKind::Internal => "INTERNAL_SERVER_ERROR",
            ErrorKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorKind::Other => "HTTP_ERROR",
        }
    }

    fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorKind::BadRequest,
            401 => ErrorKind::Unauthorized,
            403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            408 => ErrorKind::RequestTimeout,
            409 => ErrorKind::Conflict,
            499 => ErrorKind::Cancelled,
            500 => ErrorKind::Internal,
            503 => ErrorKind::ServiceUnavailable,
            _ => ErrorKind::Other,
        }
    }
}

/// One failed field check, reported in validation error bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Field path, e.g. `address.city`
    pub field: String,
    /// What went wrong
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error raised anywhere in the request pipeline.
///
/// Exception filters receive these; whatever no filter handles is rendered
/// by [`to_response`](Self::to_response).
#[derive(Debug, Clone, Error)]
#[error("{status} {}: {message}", .kind.code())]
pub struct HttpError {
    status: u16,
    kind: ErrorKind,
    message: String,
    details: Vec<FieldError>,
    cause: Option<String>,
}

impl HttpError {
    /// Error with an explicit status.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::from_status(status), message).with_status(status)
    }

    /// Error of `kind` with its default status.
    pub fn of_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: kind.status(),
            kind,
            message: message.into(),
            details: Vec::new(),
            cause: None,
        }
    }

    /// 400 Bad Request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::BadRequest, message)
    }

    /// 400 with per-field details.
    pub fn validation(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        let mut err = Self::of_kind(ErrorKind::Validation, message);
        err.details = details;
        err
    }

    /// 401 Unauthorized.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::Unauthorized, message)
    }

    /// 403 Forbidden.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::Forbidden, message)
    }

    /// 404 Not Found.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::NotFound, message)
    }

    /// 408 Request Timeout.
    pub fn request_timeout(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::RequestTimeout, message)
    }

    /// 409 Conflict.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::Conflict, message)
    }

    /// 499, the request was cancelled by the client.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::Cancelled, message)
    }

    /// 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::Internal, message)
    }

    /// 503 Service Unavailable.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::ServiceUnavailable, message)
    }

    /// Overrides the status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Attaches an underlying cause, shown only in development mode.
    pub fn with_cause(mut self, cause: impl std::fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    /// Status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Error category.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Field details of a validation error.
    pub fn details(&self) -> &[FieldError] {
        &self.details
    }

    /// Underlying cause, if any.
    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }

    /// True for 5xx statuses.
    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    /// Default rendering of an unhandled error.
    ///
    /// Server errors hide their message and cause unless `development`.
    pub fn to_response(&self, development: bool) -> HttpResponse {
        let message = if self.is_server_error() && !development {
            "Internal server error".to_string()
        } else {
            self.message.clone()
        };
        let mut body = json!({
            "statusCode": self.status,
            "error": self.kind.code(),
            "message": message,
        });
        if !self.details.is_empty() {
            body["details"] = serde_json::to_value(&self.details).unwrap_or(Value::Null);
        }
        if development {
            if let Some(cause) = &self.cause {
                body["cause"] = Value::String(cause.clone());
            }
        }
        HttpResponse::new(self.status, body)
    }
}

impl From<DiError> for HttpError {
    fn from(err: DiError) -> Self {
        HttpError::internal(err.to_string()).with_cause(err)
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        HttpError::bad_request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Token;

    #[test]
    fn server_errors_are_masked_outside_development() {
        let err = HttpError::internal("db password wrong").with_cause("pg: auth failed");

        let masked = err.to_response(false);
        assert_eq!(masked.status, 500);
        assert_eq!(masked.body["message"], "Internal server error");
        assert!(masked.body.get("cause").is_none());

        let verbose = err.to_response(true);
        assert_eq!(verbose.body["message"], "db password wrong");
        assert_eq!(verbose.body["cause"], "pg: auth failed");
    }

    #[test]
    fn client_errors_keep_their_message() {
        let response = HttpError::forbidden("Forbidden resource").to_response(false);
        assert_eq!(response.status, 403);
        assert_eq!(response.body["error"], "FORBIDDEN");
        assert_eq!(response.body["message"], "Forbidden resource");
    }

    #[test]
    fn validation_details_are_rendered() {
        let err = HttpError::validation(
            "Validation failed",
            vec![FieldError::new("age", "must be a positive integer")],
        );
        let response = err.to_response(false);
        assert_eq!(response.status, 400);
        assert_eq!(response.body["details"][0]["field"], "age");
    }

    #[test]
    fn explicit_status_picks_kind() {
        assert_eq!(HttpError::new(404, "gone").kind(), ErrorKind::NotFound);
        let teapot = HttpError::new(418, "short and stout");
        assert_eq!(teapot.kind(), ErrorKind::Other);
        assert_eq!(teapot.status(), 418);
    }

    #[test]
    fn di_errors_become_internal() {
        let err: HttpError = DiError::not_found(&Token::symbol("CONFIG"), "AppModule").into();
        assert_eq!(err.status(), 500);
        assert!(err.cause().is_some());
    }
}
