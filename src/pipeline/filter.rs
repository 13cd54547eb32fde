use async_trait::async_trait;

use crate::http::{HttpError, HttpResponse};

use super::ExecutionContext;

/// Turns an error into a client response.
///
/// Filters are tried handler-level first, then controller-level, then
/// global. A filter is only asked when [`catches`](Self::catches) accepts
/// the error. Returning `Err` declines: the returned error (usually the one
/// received) goes to the next filter, and the default renderer answers when
/// every filter declined.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::json;
/// use ferrous_nest::http::{ErrorKind, HttpError, HttpResponse};
/// use ferrous_nest::pipeline::{ExceptionFilter, ExecutionContext};
///
/// struct NotFoundPage;
///
/// #[async_trait]
/// impl ExceptionFilter for NotFoundPage {
///     fn catches(&self, error: &HttpError) -> bool {
///         error.kind() == ErrorKind::NotFound
///     }
///
///     async fn catch(&self, error: HttpError, ctx: &ExecutionContext) -> Result<HttpResponse, HttpError> {
///         Ok(HttpResponse::new(404, json!({ "path": ctx.request().path, "reason": error.message() })))
///     }
/// }
/// ```
#[async_trait]
pub trait ExceptionFilter: Send + Sync + 'static {
    /// True when this filter handles `error`.
    fn catches(&self, error: &HttpError) -> bool {
        let _ = error;
        true
    }

    /// Produces a response, or declines by returning an error.
    async fn catch(&self, error: HttpError, context: &ExecutionContext) -> Result<HttpResponse, HttpError>;
}
