use std::any::Any;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use crate::error::DiResult;
use crate::http::{HttpMethod, HttpRequest};
use crate::module::ModuleId;
use crate::provider::{Container, RequestContext};
use crate::token::Token;

/// What guards, interceptors, filters and custom extractors see of the
/// request being handled.
///
/// Also acts as the reflector over route metadata: handler-level values are
/// stored on (controller, handler), class-level ones on the controller.
#[derive(Clone)]
pub struct ExecutionContext {
    request: Arc<HttpRequest>,
    scope: RequestContext,
    container: Container,
    module: ModuleId,
    controller: Token,
    handler: Arc<str>,
    route: Arc<str>,
}

impl ExecutionContext {
    pub(crate) fn new(
        request: Arc<HttpRequest>,
        scope: RequestContext,
        container: Container,
        module: ModuleId,
        controller: Token,
        handler: Arc<str>,
        route: Arc<str>,
    ) -> Self {
        Self {
            request,
            scope,
            container,
            module,
            controller,
            handler,
            route,
        }
    }

    /// The request.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Shared handle to the request.
    pub fn request_arc(&self) -> &Arc<HttpRequest> {
        &self.request
    }

    /// Request-scoped resolution context.
    pub fn request_context(&self) -> &RequestContext {
        &self.scope
    }

    /// Id of the request context.
    pub fn request_id(&self) -> u64 {
        self.scope.id()
    }

    /// Cancellation token of the request.
    pub fn cancellation(&self) -> &CancellationToken {
        self.scope.cancellation()
    }

    /// The container.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Module declaring the controller.
    pub fn module(&self) -> ModuleId {
        self.module
    }

    /// Controller token.
    pub fn controller(&self) -> &Token {
        &self.controller
    }

    /// Handler name.
    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Route template, e.g. `/users/:id`.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Request method.
    pub fn method(&self) -> HttpMethod {
        self.request.method
    }

    /// Metadata set on the handler.
    pub fn handler_metadata<V: Any + Send + Sync>(&self, key: &str) -> Option<Arc<V>> {
        self.container
            .metadata()
            .get_metadata(key, &self.controller, Some(&*self.handler))
    }

    /// Metadata set on the controller.
    pub fn class_metadata<V: Any + Send + Sync>(&self, key: &str) -> Option<Arc<V>> {
        self.container.metadata().get_metadata(key, &self.controller, None)
    }

    /// Handler metadata, falling back to the controller's.
    pub fn metadata_override<V: Any + Send + Sync>(&self, key: &str) -> Option<Arc<V>> {
        self.container.metadata().get_all_and_override(
            key,
            &[(&self.controller, Some(&*self.handler)), (&self.controller, None)],
        )
    }

    /// Controller list metadata followed by the handler's.
    pub fn metadata_merge<V: Any + Send + Sync>(&self, key: &str) -> Vec<Arc<V>> {
        self.container.metadata().get_all_and_merge(
            key,
            &[(&self.controller, None), (&self.controller, Some(&*self.handler))],
        )
    }

    /// Resolves `T` from the controller's module within this request.
    pub async fn resolve<T: Any + Send + Sync>(&self) -> DiResult<Arc<T>> {
        self.resolve_token(&Token::of::<T>()).await
    }

    /// Resolves `token` from the controller's module within this request.
    pub async fn resolve_token<T: Any + Send + Sync>(&self, token: &Token) -> DiResult<Arc<T>> {
        self.container
            .resolve_token(self.module, token, Some(&self.scope))
            .await
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("method", &self.request.method)
            .field("route", &self.route)
            .field("controller", &self.controller)
            .field("handler", &self.handler)
            .field("request_id", &self.scope.id())
            .finish()
    }
}
