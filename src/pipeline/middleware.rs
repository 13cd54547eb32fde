use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::http::{HttpError, HttpRequest, HttpResponse};
use crate::internal::BoxFuture;

pub(crate) type Endpoint =
    Box<dyn FnOnce(HttpRequest) -> BoxFuture<'static, Result<HttpResponse, HttpError>> + Send>;

/// Runs before routing reaches guards, with access to the raw request.
///
/// A middleware either passes the (possibly rewritten) request on with
/// [`Next::run`] or answers the request itself by returning a response.
/// `Next` is consumed by `run`, so it can be called at most once.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use ferrous_nest::http::{HttpError, HttpRequest, HttpResponse};
/// use ferrous_nest::pipeline::{Middleware, Next};
///
/// struct RequestId;
///
/// #[async_trait]
/// impl Middleware for RequestId {
///     async fn handle(&self, request: HttpRequest, next: Next) -> Result<HttpResponse, HttpError> {
///         let request = request.with_header("x-request-id", "generated");
///         let response = next.run(request).await?;
///         Ok(response.with_header("x-request-id", "generated"))
///     }
/// }
/// ```
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Handles the request, usually by calling `next.run(request)`.
    async fn handle(&self, request: HttpRequest, next: Next) -> Result<HttpResponse, HttpError>;
}

/// Continuation of the middleware chain.
pub struct Next {
    chain: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    endpoint: Endpoint,
}

impl Next {
    pub(crate) fn new(chain: Arc<[Arc<dyn Middleware>]>, endpoint: Endpoint) -> Self {
        Self {
            chain,
            index: 0,
            endpoint,
        }
    }

    /// Passes `request` to the next middleware, or to the route once the
    /// chain is exhausted.
    pub async fn run(self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        match self.chain.get(self.index).cloned() {
            Some(middleware) => {
                let next = Next {
                    chain: self.chain,
                    index: self.index + 1,
                    endpoint: self.endpoint,
                };
                middleware.handle(request, next).await
            }
            None => (self.endpoint)(request).await,
        }
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &(self.chain.len() - self.index))
            .finish()
    }
}

struct FnMiddleware<F>(F);

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(HttpRequest, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, HttpError>> + Send + 'static,
{
    async fn handle(&self, request: HttpRequest, next: Next) -> Result<HttpResponse, HttpError> {
        (self.0)(request, next).await
    }
}

/// Middleware from an async closure.
///
/// ```rust
/// use ferrous_nest::pipeline::middleware_fn;
///
/// let logger = middleware_fn(|request, next| async move {
///     tracing::info!(path = %request.path, "incoming");
///     next.run(request).await
/// });
/// # let _ = logger;
/// ```
pub fn middleware_fn<F, Fut>(f: F) -> impl Middleware
where
    F: Fn(HttpRequest, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, HttpError>> + Send + 'static,
{
    FnMiddleware(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use parking_lot::Mutex;
    use serde_json::json;

    struct Tag(&'static str, Arc<Mutex<Vec<&'static str>>>);

    #[async_trait]
    impl Middleware for Tag {
        async fn handle(&self, request: HttpRequest, next: Next) -> Result<HttpResponse, HttpError> {
            self.1.lock().push(self.0);
            next.run(request.with_header(self.0, "1")).await
        }
    }

    fn endpoint() -> Endpoint {
        Box::new(|request: HttpRequest| -> BoxFuture<'static, Result<HttpResponse, HttpError>> {
            Box::pin(async move {
                let mut seen: Vec<&String> = request.headers.keys().collect();
                seen.sort();
                Ok(HttpResponse::ok(json!(seen)))
            })
        })
    }

    #[tokio::test]
    async fn chain_runs_in_order_and_reaches_endpoint() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Arc<[Arc<dyn Middleware>]> = Arc::from(vec![
            Arc::new(Tag("a", log.clone())) as Arc<dyn Middleware>,
            Arc::new(Tag("b", log.clone())),
        ]);
        let response = Next::new(chain, endpoint())
            .run(HttpRequest::new(HttpMethod::Get, "/"))
            .await
            .unwrap();

        assert_eq!(*log.lock(), ["a", "b"]);
        assert_eq!(response.body, json!(["a", "b"]));
    }

    #[tokio::test]
    async fn middleware_can_answer_without_next() {
        let short = middleware_fn(|_request, _next| async move {
            Ok(HttpResponse::new(204, serde_json::Value::Null))
        });
        let chain: Arc<[Arc<dyn Middleware>]> = Arc::from(vec![Arc::new(short) as Arc<dyn Middleware>]);
        let response = Next::new(chain, endpoint())
            .run(HttpRequest::new(HttpMethod::Get, "/"))
            .await
            .unwrap();
        assert_eq!(response.status, 204);
    }
}
