use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

use crate::controller::HandlerArgs;
use crate::http::{HttpError, HttpRequest, HttpResponse};
use crate::internal::{BoxFuture, ResolutionPath};
use crate::lifecycle::LifecycleState;
use crate::pipeline::{resolve_all, ArgType, CallHandler, Endpoint, ExecutionContext, Handle, Next};
use crate::provider::{Container, RequestContext};

use super::RouteEntry;

/// Runs requests through the pipeline of a matched route.
///
/// Stages run in a fixed order: middleware, guards, interceptors (before),
/// pipes, the handler, interceptors (after), then exception filters for
/// whatever failed. Every request gets its own [`RequestContext`], released
/// once the response is produced.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    container: Container,
    state: Arc<Mutex<LifecycleState>>,
    development: bool,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub(crate) fn new(
        container: Container,
        state: Arc<Mutex<LifecycleState>>,
        development: bool,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                container,
                state,
                development,
                timeout,
            }),
        }
    }

    /// The container requests are resolved from.
    pub fn container(&self) -> &Container {
        &self.inner.container
    }

    /// Handles `request` with `route`.
    ///
    /// Never fails: errors that no filter turns into a response are rendered
    /// with [`HttpError::to_response`]. Once the application starts shutting
    /// down every request is answered with 503.
    pub async fn dispatch(&self, route: &Arc<RouteEntry>, mut request: HttpRequest) -> HttpResponse {
        let state = *self.inner.state.lock();
        if state.is_shutting_down() {
            tracing::debug!(method = %request.method, path = %request.path, ?state, "request refused");
            return HttpError::service_unavailable("Application is shutting down").to_response(self.inner.development);
        }
        if let Some(params) = route.pattern().matches(&request.path) {
            request.params = params;
        }
        let started = Instant::now();
        let method = request.method;
        let path = request.path.clone();
        let cancellation = request.cancellation.clone();
        let original = Arc::new(request);
        let scope = RequestContext::new(Some(original.clone()));

        let pipeline = run_pipeline(
            self.inner.container.clone(),
            route.clone(),
            scope.clone(),
            original.as_ref().clone(),
        );
        let timeout = self.inner.timeout;
        let deadline = async move {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancellation.cancelled() => Err(HttpError::cancelled("Request was cancelled")),
            _ = deadline => {
                cancellation.cancel();
                Err(HttpError::request_timeout("Request timed out"))
            }
            result = pipeline => result,
        };

        let response = match outcome {
            Ok(response) => response,
            Err(error) => self.handle_error(route, &scope, original, error).await,
        };
        scope.release();

        tracing::debug!(
            request_id = scope.id(),
            method = %method,
            path = %path,
            status = response.status,
            elapsed_us = started.elapsed().as_micros() as u64,
            "request handled"
        );
        response
    }

    async fn handle_error(
        &self,
        route: &Arc<RouteEntry>,
        scope: &RequestContext,
        original: Arc<HttpRequest>,
        mut error: HttpError,
    ) -> HttpResponse {
        if error.is_server_error() {
            tracing::error!(
                request_id = scope.id(),
                route = route.pattern().template(),
                handler = route.handler_name(),
                cause = error.cause().unwrap_or(""),
                "{}",
                error
            );
        } else {
            tracing::debug!(request_id = scope.id(), "{}", error);
        }

        if !route.filters.is_empty() && !scope.is_released() {
            let container = &self.inner.container;
            match resolve_all(&route.filters, container, scope).await {
                Ok(filters) => {
                    let request = scope.request().unwrap_or(original);
                    let context = route.context(request, scope.clone(), container.clone());
                    for filter in filters {
                        if !filter.catches(&error) {
                            continue;
                        }
                        match filter.catch(error, &context).await {
                            Ok(response) => return response,
                            Err(rethrown) => error = rethrown,
                        }
                    }
                }
                Err(resolve_error) => {
                    tracing::warn!(error = %resolve_error, "exception filters could not be resolved");
                }
            }
        }
        error.to_response(self.inner.development)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("development", &self.inner.development)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

async fn run_pipeline(
    container: Container,
    route: Arc<RouteEntry>,
    scope: RequestContext,
    request: HttpRequest,
) -> Result<HttpResponse, HttpError> {
    let middleware = resolve_all(&route.middleware, &container, &scope).await?;
    let endpoint: Endpoint = Box::new(
        move |request: HttpRequest| -> BoxFuture<'static, Result<HttpResponse, HttpError>> {
            Box::pin(run_route(container, route, scope, request))
        },
    );
    Next::new(Arc::from(middleware), endpoint).run(request).await
}

async fn run_route(
    container: Container,
    route: Arc<RouteEntry>,
    scope: RequestContext,
    request: HttpRequest,
) -> Result<HttpResponse, HttpError> {
    let request = Arc::new(request);
    scope.bind_request(request.clone());
    let context = Arc::new(route.context(request, scope.clone(), container.clone()));

    for guard in &route.guards {
        let guard = guard.get(&container, &scope).await?;
        if !guard.can_activate(&context).await? {
            return Err(HttpError::forbidden("Forbidden resource"));
        }
    }

    let interceptors = resolve_all(&route.interceptors, &container, &scope).await?;
    let handle: Handle = {
        let route = route.clone();
        let context = context.clone();
        Box::new(move || -> BoxFuture<'static, Result<Value, HttpError>> {
            Box::pin(invoke(container, route, scope, context))
        })
    };
    let value = CallHandler::new(Arc::from(interceptors), context, handle)
        .handle()
        .await?;
    Ok(route.respond(value))
}

async fn invoke(
    container: Container,
    route: Arc<RouteEntry>,
    scope: RequestContext,
    context: Arc<ExecutionContext>,
) -> Result<Value, HttpError> {
    let route_pipes = resolve_all(&route.pipes, &container, &scope).await?;
    let mut values = Vec::with_capacity(route.params.len());
    for bound in &route.params {
        let mut value = bound.param.extract(&context)?;
        // the raw request is never piped
        if bound.metadata.arg_type != ArgType::Request {
            for pipe in &route_pipes {
                value = pipe.transform(value, &bound.metadata).await?;
            }
        }
        for pipe in &bound.pipes {
            let pipe = pipe.get(&container, &scope).await?;
            value = pipe.transform(value, &bound.metadata).await?;
        }
        values.push(value);
    }

    let controller = container
        .resolve_any(route.module(), route.controller(), Some(&scope), &ResolutionPath::new())
        .await?;
    (route.handler)(controller, HandlerArgs::new(values, context)).await
}
