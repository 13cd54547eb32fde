use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::http::HttpError;
use crate::internal::BoxFuture;

use super::ExecutionContext;

pub(crate) type Handle = Box<dyn FnOnce() -> BoxFuture<'static, Result<Value, HttpError>> + Send>;

/// Wraps the handler call.
///
/// Interceptor `i` wraps interceptor `i + 1`; code before `next.handle()`
/// runs in registration order, code after it in reverse. An interceptor may
/// transform the value, map the error, or answer without calling `next`.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use ferrous_nest::http::HttpError;
/// use ferrous_nest::pipeline::{CallHandler, ExecutionContext, Interceptor};
///
/// struct Envelope;
///
/// #[async_trait]
/// impl Interceptor for Envelope {
///     async fn intercept(&self, _: &ExecutionContext, next: CallHandler) -> Result<Value, HttpError> {
///         let data = next.handle().await?;
///         Ok(json!({ "data": data }))
///     }
/// }
/// ```
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    /// Runs around `next.handle()`.
    async fn intercept(&self, context: &ExecutionContext, next: CallHandler) -> Result<Value, HttpError>;
}

/// The rest of the interceptor chain, ending in pipes and the handler.
pub struct CallHandler {
    chain: Arc<[Arc<dyn Interceptor>]>,
    index: usize,
    context: Arc<ExecutionContext>,
    handle: Handle,
}

impl CallHandler {
    pub(crate) fn new(chain: Arc<[Arc<dyn Interceptor>]>, context: Arc<ExecutionContext>, handle: Handle) -> Self {
        Self {
            chain,
            index: 0,
            context,
            handle,
        }
    }

    /// Runs the next interceptor, or the handler once the chain is exhausted.
    pub async fn handle(self) -> Result<Value, HttpError> {
        match self.chain.get(self.index).cloned() {
            Some(interceptor) => {
                let context = self.context.clone();
                let next = CallHandler {
                    chain: self.chain,
                    index: self.index + 1,
                    context: self.context,
                    handle: self.handle,
                };
                interceptor.intercept(&context, next).await
            }
            None => (self.handle)().await,
        }
    }
}

impl std::fmt::Debug for CallHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallHandler")
            .field("remaining", &(self.chain.len() - self.index))
            .finish()
    }
}
