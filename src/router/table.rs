use std::borrow::Borrow;
use std::sync::Arc;

use serde_json::Value;

use crate::controller::{HandlerFn, Param, RouteHandlerFn};
use crate::error::{DiError, DiResult};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::metadata::{keys, MetadataStore};
use crate::module::ModuleId;
use crate::pipeline::{
    ArgumentMetadata, Bound, Enhancer, ExceptionFilter, ExecutionContext, GlobalEnhancers, Guard,
    Interceptor, Middleware, PipeTransform,
};
use crate::provider::{Container, RequestContext};
use crate::token::Token;

use super::{join_paths, RoutePattern};

pub(crate) struct BoundParam {
    pub(crate) param: Param,
    pub(crate) metadata: ArgumentMetadata,
    pub(crate) pipes: Vec<Bound<dyn PipeTransform>>,
}

/// One entry of the route table, with its pipeline precomputed.
pub struct RouteEntry {
    method: HttpMethod,
    pattern: RoutePattern,
    template: Arc<str>,
    path: String,
    module: ModuleId,
    controller: Token,
    handler_name: Arc<str>,
    status: u16,
    headers: Vec<(String, String)>,
    pub(crate) handler: HandlerFn,
    pub(crate) params: Vec<BoundParam>,
    pub(crate) middleware: Vec<Bound<dyn Middleware>>,
    pub(crate) guards: Vec<Bound<dyn Guard>>,
    pub(crate) interceptors: Vec<Bound<dyn Interceptor>>,
    pub(crate) pipes: Vec<Bound<dyn PipeTransform>>,
    pub(crate) filters: Vec<Bound<dyn ExceptionFilter>>,
}

impl RouteEntry {
    /// Route method.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Parsed template, global prefix included.
    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    /// Template without the global prefix.
    pub fn path(&self) -> &str {
        &self.path
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
    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    /// Status of a successful response.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Number of guards, all levels included.
    pub fn guard_count(&self) -> usize {
        self.guards.len()
    }

    /// Number of middleware applied to this route.
    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }

    pub(crate) fn context(&self, request: Arc<HttpRequest>, scope: RequestContext, container: Container) -> ExecutionContext {
        ExecutionContext::new(
            request,
            scope,
            container,
            self.module,
            self.controller.clone(),
            self.handler_name.clone(),
            self.template.clone(),
        )
    }

    pub(crate) fn respond(&self, body: Value) -> HttpResponse {
        HttpResponse {
            status: self.status,
            headers: self.headers.clone(),
            body,
        }
    }
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("method", &self.method)
            .field("template", &self.template)
            .field("controller", &self.controller)
            .field("handler", &self.handler_name)
            .finish()
    }
}

async fn bind_all<T, I>(enhancers: I, container: &Container, module: ModuleId) -> DiResult<Vec<Bound<T>>>
where
    T: ?Sized + Send + Sync + 'static,
    I: IntoIterator,
    I::Item: Borrow<Enhancer<T>>,
{
    let mut bound = Vec::new();
    for enhancer in enhancers {
        bound.push(enhancer.borrow().bind(container, module).await?);
    }
    Ok(bound)
}

struct GlobalStages {
    middleware: Vec<Bound<dyn Middleware>>,
    guards: Vec<Bound<dyn Guard>>,
    interceptors: Vec<Bound<dyn Interceptor>>,
    pipes: Vec<Bound<dyn PipeTransform>>,
    filters: Vec<Bound<dyn ExceptionFilter>>,
}

fn member_value<V: std::any::Any + Send + Sync>(
    metadata: &MetadataStore,
    key: &str,
    controller: &Token,
    handler: &str,
) -> DiResult<Arc<V>> {
    metadata
        .get_metadata::<V>(key, controller, Some(handler))
        .ok_or_else(|| DiError::InvalidRoute {
            path: format!("{}::{}", controller.short_name(), handler),
            reason: format!("missing {} metadata", key),
        })
}

/// Builds the route table from controller metadata.
///
/// Routes are listed module by module in dependency-first order, and in
/// declaration order within a controller. Pipeline lists are ordered
/// global, controller, handler; filters the other way round.
pub(crate) async fn build_routes(
    container: &Container,
    globals: &GlobalEnhancers,
    prefix: Option<&str>,
) -> DiResult<Vec<Arc<RouteEntry>>> {
    let graph = container.graph();
    let metadata = container.metadata();
    let root = graph.root();

    let global = GlobalStages {
        middleware: bind_all::<dyn Middleware, _>(globals.middleware.iter(), container, root).await?,
        guards: bind_all::<dyn Guard, _>(globals.guards.iter(), container, root).await?,
        interceptors: bind_all::<dyn Interceptor, _>(globals.interceptors.iter(), container, root).await?,
        pipes: bind_all::<dyn PipeTransform, _>(globals.pipes.iter(), container, root).await?,
        filters: bind_all::<dyn ExceptionFilter, _>(globals.filters.iter(), container, root).await?,
    };

    let mut routes = Vec::new();
    for module in graph.modules() {
        for controller in module.controllers() {
            let base = metadata
                .get_metadata::<String>(keys::PATH, controller, None)
                .map(|p| p.as_ref().clone())
                .unwrap_or_default();
            let handlers = metadata
                .get_metadata::<Vec<String>>(keys::HANDLERS, controller, None)
                .unwrap_or_default();
            tracing::info!(
                module = module.name(),
                "{} {{{}}}",
                controller.short_name(),
                join_paths(&[base.as_str()])
            );

            for name in handlers.iter() {
                let member = Some(name.as_str());
                let route_path = member_value::<String>(metadata, keys::PATH, controller, name)?;
                let method = *member_value::<HttpMethod>(metadata, keys::METHOD, controller, name)?;
                let handler = member_value::<RouteHandlerFn>(metadata, keys::HANDLER, controller, name)?;
                let status = metadata
                    .get_metadata::<u16>(keys::HTTP_CODE, controller, member)
                    .map_or(200, |s| *s);
                let headers = metadata
                    .get_metadata::<Vec<(String, String)>>(keys::HEADERS, controller, member)
                    .map(|h| h.as_ref().clone())
                    .unwrap_or_default();
                let params = metadata
                    .get_metadata::<Vec<Param>>(keys::ROUTE_ARGS, controller, member)
                    .map(|p| p.as_ref().clone())
                    .unwrap_or_default();

                let path = join_paths(&[base.as_str(), route_path.as_str()]);
                let pattern = RoutePattern::parse(&join_paths(&[prefix.unwrap_or(""), path.as_str()]))?;

                let levels = [(controller, None), (controller, member)];
                let mut guards = global.guards.clone();
                guards.extend(
                    bind_all::<dyn Guard, _>(
                        metadata.get_all_and_merge::<Enhancer<dyn Guard>>(keys::GUARDS, &levels),
                        container,
                        module.id(),
                    )
                    .await?,
                );
                let mut interceptors = global.interceptors.clone();
                interceptors.extend(
                    bind_all::<dyn Interceptor, _>(
                        metadata.get_all_and_merge::<Enhancer<dyn Interceptor>>(keys::INTERCEPTORS, &levels),
                        container,
                        module.id(),
                    )
                    .await?,
                );
                let mut pipes = global.pipes.clone();
                pipes.extend(
                    bind_all::<dyn PipeTransform, _>(
                        metadata.get_all_and_merge::<Enhancer<dyn PipeTransform>>(keys::PIPES, &levels),
                        container,
                        module.id(),
                    )
                    .await?,
                );
                let mut filters = bind_all::<dyn ExceptionFilter, _>(
                    metadata.get_all_and_merge::<Enhancer<dyn ExceptionFilter>>(
                        keys::FILTERS,
                        &[(controller, member), (controller, None)],
                    ),
                    container,
                    module.id(),
                )
                .await?;
                filters.extend(global.filters.iter().cloned());

                let mut middleware = global.middleware.clone();
                for owner in graph.modules() {
                    for binding in &owner.middleware {
                        if binding.filter.matches(&path, method, controller) {
                            middleware.push(binding.middleware.bind(container, owner.id()).await?);
                        }
                    }
                }

                let mut bound_params = Vec::with_capacity(params.len());
                for (index, param) in params.into_iter().enumerate() {
                    let pipes = bind_all::<dyn PipeTransform, _>(param.pipes.iter(), container, module.id()).await?;
                    bound_params.push(BoundParam {
                        metadata: param.metadata(index),
                        param,
                        pipes,
                    });
                }

                tracing::info!("Mapped {{{}, {}}} route", pattern.template(), method);
                routes.push(Arc::new(RouteEntry {
                    method,
                    template: Arc::from(pattern.template()),
                    pattern,
                    path,
                    module: module.id(),
                    controller: controller.clone(),
                    handler_name: Arc::from(name.as_str()),
                    status,
                    headers,
                    handler: handler.0.clone(),
                    params: bound_params,
                    middleware,
                    guards,
                    interceptors,
                    pipes,
                    filters,
                }));
            }
        }
    }
    Ok(routes)
}
