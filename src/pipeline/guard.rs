use std::future::Future;

use async_trait::async_trait;

use crate::http::HttpError;

use super::ExecutionContext;

/// Decides whether a request may reach its handler.
///
/// Guards run in order: global, controller, then handler. The first one
/// returning `false` stops the request with `403 Forbidden resource`; an
/// error returned by a guard is used as is (e.g. a 401).
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use ferrous_nest::http::HttpError;
/// use ferrous_nest::pipeline::{ExecutionContext, Guard};
///
/// struct RolesGuard;
///
/// #[async_trait]
/// impl Guard for RolesGuard {
///     async fn can_activate(&self, context: &ExecutionContext) -> Result<bool, HttpError> {
///         let Some(required) = context.metadata_override::<Vec<String>>("roles") else {
///             return Ok(true);
///         };
///         let role = context.request().header("x-role").unwrap_or_default();
///         Ok(required.iter().any(|r| r == role))
///     }
/// }
/// ```
#[async_trait]
pub trait Guard: Send + Sync + 'static {
    /// `Ok(true)` lets the request through.
    async fn can_activate(&self, context: &ExecutionContext) -> Result<bool, HttpError>;
}

struct FnGuard<F>(F);

#[async_trait]
impl<F, Fut> Guard for FnGuard<F>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, HttpError>> + Send + 'static,
{
    async fn can_activate(&self, context: &ExecutionContext) -> Result<bool, HttpError> {
        (self.0)(context.clone()).await
    }
}

/// Guard from an async closure over a clone of the context.
pub fn guard_fn<F, Fut>(f: F) -> impl Guard
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, HttpError>> + Send + 'static,
{
    FnGuard(f)
}
