//! The seam between the route table and an HTTP listener.
//!
//! The application does not bind sockets or parse HTTP. It hands every route
//! to an [`HttpTransport`] as `(method, path, handler)`; the transport calls
//! the handler with each matching request. [`InMemoryTransport`] is the
//! in-process implementation used by tests and embedding code.

use std::sync::Arc;

use crate::error::DiResult;
use crate::http::{HttpError, HttpMethod, HttpRequest, HttpResponse};
use crate::internal::BoxFuture;
use crate::router::RoutePattern;

/// Callback a transport invokes for a request matching a registered route.
pub type RouteHandler = Arc<dyn Fn(HttpRequest) -> BoxFuture<'static, HttpResponse> + Send + Sync>;

/// An HTTP listener the application mounts its routes on.
pub trait HttpTransport {
    /// Registers `handler` for `method` requests matching the `path` template.
    ///
    /// Templates use `:name` parameters and a trailing `*` wildcard.
    fn register_route(&mut self, method: HttpMethod, path: &str, handler: RouteHandler) -> DiResult<()>;
}

struct MountedRoute {
    method: HttpMethod,
    pattern: RoutePattern,
    handler: RouteHandler,
}

/// Transport answering requests in-process.
///
/// Routes are tried in registration order; the first whose method and
/// template match handles the request. Unmatched requests get a 404.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use ferrous_nest::http::{HttpMethod, HttpRequest, HttpResponse};
/// use ferrous_nest::transport::{HttpTransport, InMemoryTransport, RouteHandler};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pong: RouteHandler = Arc::new(|_request: HttpRequest| -> ferrous_nest::BoxFuture<'static, HttpResponse> {
///     Box::pin(async { HttpResponse::ok(json!("pong")) })
/// });
/// let mut transport = InMemoryTransport::new();
/// transport.register_route(HttpMethod::Get, "/ping", pong).unwrap();
///
/// let response = transport.handle(HttpRequest::new(HttpMethod::Get, "/ping")).await;
/// assert_eq!(response.body, json!("pong"));
///
/// let missing = transport.handle(HttpRequest::new(HttpMethod::Get, "/nope")).await;
/// assert_eq!(missing.status, 404);
/// # }
/// ```
#[derive(Default)]
pub struct InMemoryTransport {
    routes: Vec<MountedRoute>,
}

impl InMemoryTransport {
    /// Creates an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mounted routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True when nothing is mounted.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Routes `request` to the first matching handler.
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let route = self.routes.iter().find(|route| {
            route.method.matches(request.method) && route.pattern.matches(&request.path).is_some()
        });
        match route {
            Some(route) => (route.handler)(request).await,
            None => {
                HttpError::not_found(format!("Cannot {} {}", request.method, request.path)).to_response(false)
            }
        }
    }
}

impl HttpTransport for InMemoryTransport {
    fn register_route(&mut self, method: HttpMethod, path: &str, handler: RouteHandler) -> DiResult<()> {
        self.routes.push(MountedRoute {
            method,
            pattern: RoutePattern::parse(path)?,
            handler,
        });
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.routes.iter().map(|r| format!("{} {}", r.method, r.pattern)))
            .finish()
    }
}
