//! Controller and route declarations.
//!
//! [`ControllerDef`] and [`RouteDef`] are the declarative surface for HTTP
//! handlers. Scanning writes them into the [`MetadataStore`] (path, method,
//! parameter bindings, attached pipeline components, status, headers and
//! custom metadata); the router reads them back when the route table is
//! built.

use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::DuplicatePolicy;
use crate::descriptors::{Injectable, ProviderDescriptor};
use crate::error::{DiError, DiResult};
use crate::http::{HttpError, HttpMethod, HttpRequest};
use crate::internal::{AnyArc, BoxFuture};
use crate::lifetime::Lifetime;
use crate::metadata::{keys, MetadataStore};
use crate::module::apply_provider_metadata;
use crate::pipeline::{
    ArgType, ArgumentMetadata, Enhancer, ExceptionFilter, ExecutionContext, Guard, Interceptor,
    PipeTransform,
};
use crate::registration::ProviderRegistry;
use crate::router::RoutePattern;
use crate::token::Token;

pub(crate) type HandlerFn =
    Arc<dyn Fn(AnyArc, HandlerArgs) -> BoxFuture<'static, Result<Value, HttpError>> + Send + Sync>;

/// Handler stored under the `HANDLER` metadata key.
#[derive(Clone)]
pub(crate) struct RouteHandlerFn(pub(crate) HandlerFn);

/// Extractor for a custom parameter binding.
pub type CustomExtractor = Arc<dyn Fn(&ExecutionContext) -> Result<Value, HttpError> + Send + Sync>;

/// Source of one handler argument.
#[derive(Clone)]
pub enum ParamSource {
    /// One path parameter
    Path(String),
    /// All path parameters as an object
    AllPath,
    /// One query parameter
    Query(String),
    /// The whole query as an object
    AllQuery,
    /// The request body
    Body,
    /// One top-level body field
    BodyField(String),
    /// One header
    Header(String),
    /// Snapshot of the request as JSON
    Request,
    /// Value computed from the execution context
    Custom(CustomExtractor),
}

impl std::fmt::Debug for ParamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamSource::Path(name) => write!(f, "Path({})", name),
            ParamSource::AllPath => f.write_str("AllPath"),
            ParamSource::Query(name) => write!(f, "Query({})", name),
            ParamSource::AllQuery => f.write_str("AllQuery"),
            ParamSource::Body => f.write_str("Body"),
            ParamSource::BodyField(name) => write!(f, "BodyField({})", name),
            ParamSource::Header(name) => write!(f, "Header({})", name),
            ParamSource::Request => f.write_str("Request"),
            ParamSource::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// A handler parameter binding with its own pipes.
#[derive(Clone, Debug)]
pub struct Param {
    pub(crate) source: ParamSource,
    pub(crate) pipes: Vec<Enhancer<dyn PipeTransform>>,
}

impl Param {
    fn from_source(source: ParamSource) -> Self {
        Self {
            source,
            pipes: Vec::new(),
        }
    }

    /// Path parameter `name`.
    pub fn path(name: impl Into<String>) -> Self {
        Self::from_source(ParamSource::Path(name.into()))
    }

    /// All path parameters.
    pub fn params() -> Self {
        Self::from_source(ParamSource::AllPath)
    }

    /// Query parameter `name`.
    pub fn query(name: impl Into<String>) -> Self {
        Self::from_source(ParamSource::Query(name.into()))
    }

    /// The whole query.
    pub fn queries() -> Self {
        Self::from_source(ParamSource::AllQuery)
    }

    /// The body.
    pub fn body() -> Self {
        Self::from_source(ParamSource::Body)
    }

    /// Body field `name`.
    pub fn body_field(name: impl Into<String>) -> Self {
        Self::from_source(ParamSource::BodyField(name.into()))
    }

    /// Header `name`.
    pub fn header(name: impl Into<String>) -> Self {
        Self::from_source(ParamSource::Header(name.into()))
    }

    /// The request as JSON (method, path, params, query, headers, body).
    pub fn request() -> Self {
        Self::from_source(ParamSource::Request)
    }

    /// Value computed by `extract`.
    pub fn custom<F>(extract: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Result<Value, HttpError> + Send + Sync + 'static,
    {
        Self::from_source(ParamSource::Custom(Arc::new(extract)))
    }

    /// Adds a pipe for this parameter.
    pub fn pipe(mut self, pipe: impl PipeTransform) -> Self {
        self.pipes
            .push(Enhancer::instance(Arc::new(pipe) as Arc<dyn PipeTransform>));
        self
    }

    /// Adds an injectable pipe class for this parameter.
    pub fn pipe_class<P: Injectable + PipeTransform>(mut self) -> Self {
        self.pipes.push(Enhancer::<dyn PipeTransform>::class::<P>());
        self
    }

    pub(crate) fn metadata(&self, index: usize) -> ArgumentMetadata {
        let (arg_type, data) = match &self.source {
            ParamSource::Path(name) => (ArgType::Param, Some(name.clone())),
            ParamSource::AllPath => (ArgType::Param, None),
            ParamSource::Query(name) => (ArgType::Query, Some(name.clone())),
            ParamSource::AllQuery => (ArgType::Query, None),
            ParamSource::Body => (ArgType::Body, None),
            ParamSource::BodyField(name) => (ArgType::Body, Some(name.clone())),
            ParamSource::Header(name) => (ArgType::Header, Some(name.clone())),
            ParamSource::Request => (ArgType::Request, None),
            ParamSource::Custom(_) => (ArgType::Custom, None),
        };
        ArgumentMetadata {
            index,
            arg_type,
            data,
        }
    }

    /// Raw value before pipes; absent values are `null`.
    pub(crate) fn extract(&self, context: &ExecutionContext) -> Result<Value, HttpError> {
        let request = context.request();
        let text = |value: Option<&str>| value.map_or(Value::Null, |v| Value::String(v.to_string()));
        Ok(match &self.source {
            ParamSource::Path(name) => text(request.param(name)),
            ParamSource::AllPath => string_map(request.params.iter()),
            ParamSource::Query(name) => text(request.query_param(name)),
            ParamSource::AllQuery => string_map(request.query.iter()),
            ParamSource::Body => request.body.clone(),
            ParamSource::BodyField(name) => request.body.get(name).cloned().unwrap_or(Value::Null),
            ParamSource::Header(name) => text(request.header(name)),
            ParamSource::Request => request_snapshot(request),
            ParamSource::Custom(extract) => extract(context)?,
        })
    }
}

fn string_map<'a>(entries: impl Iterator<Item = (&'a String, &'a String)>) -> Value {
    Value::Object(
        entries
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect::<Map<String, Value>>(),
    )
}

fn request_snapshot(request: &HttpRequest) -> Value {
    json!({
        "method": request.method.as_str(),
        "path": request.path,
        "params": string_map(request.params.iter()),
        "query": string_map(request.query.iter()),
        "headers": string_map(request.headers.iter()),
        "body": request.body,
    })
}

/// Arguments handed to a route handler, after pipes.
pub struct HandlerArgs {
    values: Vec<Value>,
    context: Arc<ExecutionContext>,
}

impl HandlerArgs {
    pub(crate) fn new(values: Vec<Value>, context: Arc<ExecutionContext>) -> Self {
        Self { values, context }
    }

    /// Deserializes argument `index`.
    ///
    /// A value that does not deserialize into `T` is a `400 Bad Request`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, HttpError> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| HttpError::internal(format!("handler argument {} is not bound", index)))?;
        T::deserialize(value)
            .map_err(|err| HttpError::bad_request(format!("Invalid argument {}: {}", index, err)))
    }

    /// Raw argument `index`.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Takes argument `index`, leaving `null`.
    pub fn take(&mut self, index: usize) -> Value {
        self.values
            .get_mut(index)
            .map(std::mem::take)
            .unwrap_or(Value::Null)
    }

    /// Number of bound arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the route binds no argument.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The request.
    pub fn request(&self) -> &HttpRequest {
        self.context.request()
    }

    /// The execution context.
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }
}

impl std::fmt::Debug for HandlerArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerArgs").field("values", &self.values).finish()
    }
}

/// Pipeline components attached to a controller or a route.
#[derive(Clone, Default)]
struct Attached {
    guards: Vec<Enhancer<dyn Guard>>,
    interceptors: Vec<Enhancer<dyn Interceptor>>,
    pipes: Vec<Enhancer<dyn PipeTransform>>,
    filters: Vec<Enhancer<dyn ExceptionFilter>>,
    metadata: Vec<(String, AnyArc)>,
}

impl Attached {
    fn write(
        self,
        registry: &mut ProviderRegistry,
        metadata: &mut MetadataStore,
        target: &Token,
        member: Option<&str>,
    ) {
        let providers = self
            .guards
            .iter()
            .filter_map(Enhancer::provider)
            .chain(self.interceptors.iter().filter_map(Enhancer::provider))
            .chain(self.pipes.iter().filter_map(Enhancer::provider))
            .chain(self.filters.iter().filter_map(Enhancer::provider));
        for descriptor in providers.collect::<Vec<_>>() {
            apply_provider_metadata(&descriptor, metadata);
            registry.register_if_absent(descriptor);
        }

        if !self.guards.is_empty() {
            metadata.merge_metadata(keys::GUARDS, self.guards, target, member);
        }
        if !self.interceptors.is_empty() {
            metadata.merge_metadata(keys::INTERCEPTORS, self.interceptors, target, member);
        }
        if !self.pipes.is_empty() {
            metadata.merge_metadata(keys::PIPES, self.pipes, target, member);
        }
        if !self.filters.is_empty() {
            metadata.merge_metadata(keys::FILTERS, self.filters, target, member);
        }
        for (key, value) in self.metadata {
            metadata.set_metadata_arc(&key, value, target, member);
        }
    }
}

macro_rules! attach_methods {
    () => {
        /// Attaches a guard.
        pub fn use_guard(mut self, guard: impl Guard) -> Self {
            self.attached
                .guards
                .push(Enhancer::instance(Arc::new(guard) as Arc<dyn Guard>));
            self
        }

        /// Attaches an injectable guard class.
        pub fn use_guard_class<G: Injectable + Guard>(mut self) -> Self {
            self.attached.guards.push(Enhancer::<dyn Guard>::class::<G>());
            self
        }

        /// Attaches an interceptor.
        pub fn use_interceptor(mut self, interceptor: impl Interceptor) -> Self {
            self.attached
                .interceptors
                .push(Enhancer::instance(Arc::new(interceptor) as Arc<dyn Interceptor>));
            self
        }

        /// Attaches an injectable interceptor class.
        pub fn use_interceptor_class<I: Injectable + Interceptor>(mut self) -> Self {
            self.attached
                .interceptors
                .push(Enhancer::<dyn Interceptor>::class::<I>());
            self
        }

        /// Attaches a pipe applied to every argument.
        pub fn use_pipe(mut self, pipe: impl PipeTransform) -> Self {
            self.attached
                .pipes
                .push(Enhancer::instance(Arc::new(pipe) as Arc<dyn PipeTransform>));
            self
        }

        /// Attaches an injectable pipe class applied to every argument.
        pub fn use_pipe_class<P: Injectable + PipeTransform>(mut self) -> Self {
            self.attached
                .pipes
                .push(Enhancer::<dyn PipeTransform>::class::<P>());
            self
        }

        /// Attaches an exception filter.
        pub fn use_filter(mut self, filter: impl ExceptionFilter) -> Self {
            self.attached
                .filters
                .push(Enhancer::instance(Arc::new(filter) as Arc<dyn ExceptionFilter>));
            self
        }

        /// Attaches an injectable exception filter class.
        pub fn use_filter_class<F: Injectable + ExceptionFilter>(mut self) -> Self {
            self.attached
                .filters
                .push(Enhancer::<dyn ExceptionFilter>::class::<F>());
            self
        }

        /// Sets custom metadata, readable through the execution context.
        pub fn set_metadata<V: Any + Send + Sync>(mut self, key: impl Into<String>, value: V) -> Self {
            self.attached.metadata.push((key.into(), Arc::new(value)));
            self
        }
    };
}

/// One route of a controller.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use ferrous_nest::controller::{Param, RouteDef};
/// use ferrous_nest::pipeline::ParseIntPipe;
///
/// struct CatsController;
///
/// let route = RouteDef::get("/:id")
///     .param(Param::path("id").pipe(ParseIntPipe::default()))
///     .handle("find_one", |_: Arc<CatsController>, args| async move {
///         let id: i64 = args.arg(0)?;
///         Ok(serde_json::json!({ "id": id }))
///     });
/// assert_eq!(route.name(), Some("find_one"));
/// ```
pub struct RouteDef {
    method: HttpMethod,
    path: String,
    name: Option<String>,
    handler: Option<HandlerFn>,
    params: Vec<Param>,
    status: Option<u16>,
    headers: Vec<(String, String)>,
    attached: Attached,
}

impl RouteDef {
    /// Route for `method` at `path`, relative to the controller path.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            name: None,
            handler: None,
            params: Vec::new(),
            status: None,
            headers: Vec::new(),
            attached: Attached::default(),
        }
    }

    /// GET route.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// POST route; answers 201 unless another status is set.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    /// PUT route.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    /// PATCH route.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    /// DELETE route.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// OPTIONS route.
    pub fn options(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Options, path)
    }

    /// HEAD route.
    pub fn head(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Head, path)
    }

    /// Route answering every method.
    pub fn all(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::All, path)
    }

    /// Sets the handler, a method of controller `C` named `name`.
    ///
    /// The returned value is serialized as the response body.
    pub fn handle<C, F, Fut, R>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn(Arc<C>, HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, HttpError>> + Send + 'static,
        R: Serialize,
    {
        let handler: HandlerFn = Arc::new(
            move |controller: AnyArc, args: HandlerArgs| -> BoxFuture<'static, Result<Value, HttpError>> {
                match controller.downcast::<C>() {
                    Ok(controller) => {
                        let fut = handler(controller, args);
                        Box::pin(async move {
                            let output = fut.await?;
                            serde_json::to_value(output).map_err(|err| {
                                HttpError::internal("response serialization failed").with_cause(err)
                            })
                        })
                    }
                    Err(_) => Box::pin(async move {
                        Err(DiError::TypeMismatch(std::any::type_name::<C>().to_string()).into())
                    }),
                }
            },
        );
        self.name = Some(name.into());
        self.handler = Some(handler);
        self
    }

    /// Binds the next handler argument.
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Overrides the response status.
    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Adds a response header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Handler name, once set.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    attach_methods!();

    fn default_status(&self) -> u16 {
        match self.method {
            HttpMethod::Post => 201,
            _ => 200,
        }
    }
}

/// A controller: base path, routes and controller-level pipeline components.
///
/// The controller type is registered as a provider of the declaring module,
/// transient by default, so every request gets a fresh instance while its
/// dependencies follow their own lifetimes.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use ferrous_nest::controller::{ControllerDef, Param, RouteDef};
/// use ferrous_nest::{DiResult, Injectable, Injected, Module, ModuleDef};
///
/// struct HealthController;
///
/// #[async_trait]
/// impl Injectable for HealthController {
///     async fn construct(_: Injected) -> DiResult<Self> {
///         Ok(HealthController)
///     }
/// }
///
/// struct AppModule;
///
/// impl Module for AppModule {
///     fn define() -> ModuleDef {
///         ModuleDef::new::<Self>().controller(
///             ControllerDef::new::<HealthController>("health").route(
///                 RouteDef::get("/").handle("check", |_: Arc<HealthController>, _| async {
///                     Ok("ok")
///                 }),
///             ),
///         )
///     }
/// }
/// ```
pub struct ControllerDef {
    token: Token,
    path: String,
    descriptor: ProviderDescriptor,
    routes: Vec<RouteDef>,
    attached: Attached,
}

impl ControllerDef {
    /// Controller `C` mounted at `path`.
    pub fn new<C: Injectable>(path: impl Into<String>) -> Self {
        Self {
            token: Token::of::<C>(),
            path: path.into(),
            descriptor: ProviderDescriptor::class::<C>().with_lifetime(Lifetime::Transient),
            routes: Vec::new(),
            attached: Attached::default(),
        }
    }

    /// Overrides the controller's lifetime.
    pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
        self.descriptor = self.descriptor.with_lifetime(lifetime);
        self
    }

    /// Adds a route.
    pub fn route(mut self, route: RouteDef) -> Self {
        self.routes.push(route);
        self
    }

    attach_methods!();

    /// Controller token.
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Registers the controller in `registry` and writes its declarations
    /// to `metadata`.
    pub(crate) fn apply(
        self,
        registry: &mut ProviderRegistry,
        metadata: &mut MetadataStore,
        policy: DuplicatePolicy,
    ) -> DiResult<Token> {
        let token = self.token;
        apply_provider_metadata(&self.descriptor, metadata);
        registry.register(self.descriptor, policy)?;

        metadata.set_metadata(keys::PATH, self.path.clone(), &token, None);
        self.attached.write(registry, metadata, &token, None);

        let mut handlers = Vec::with_capacity(self.routes.len());
        let mut seen = HashSet::new();
        for route in self.routes {
            let template = crate::router::join_paths(&[self.path.as_str(), route.path.as_str()]);
            let (Some(name), Some(handler)) = (route.name.clone(), route.handler.clone()) else {
                return Err(DiError::InvalidRoute {
                    path: template,
                    reason: "route has no handler".to_string(),
                });
            };
            if !seen.insert(name.clone()) {
                return Err(DiError::InvalidRoute {
                    path: template,
                    reason: format!("handler {} declared twice on {}", name, token.short_name()),
                });
            }
            RoutePattern::parse(&template)?;

            let member = Some(name.as_str());
            let status = route.status.unwrap_or_else(|| route.default_status());
            metadata.set_metadata(keys::PATH, route.path.clone(), &token, member);
            metadata.set_metadata(keys::METHOD, route.method, &token, member);
            metadata.set_metadata(keys::ROUTE_ARGS, route.params.clone(), &token, member);
            metadata.set_metadata(keys::HANDLER, RouteHandlerFn(handler), &token, member);
            metadata.set_metadata(keys::HTTP_CODE, status, &token, member);
            metadata.set_metadata(keys::HEADERS, route.headers.clone(), &token, member);
            for param in &route.params {
                for descriptor in param.pipes.iter().filter_map(Enhancer::provider) {
                    apply_provider_metadata(&descriptor, metadata);
                    registry.register_if_absent(descriptor);
                }
            }
            route.attached.write(registry, metadata, &token, member);
            handlers.push(name);
        }
        metadata.set_metadata(keys::HANDLERS, handlers, &token, None);
        Ok(token)
    }
}

impl std::fmt::Debug for ControllerDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerDef")
            .field("token", &self.token)
            .field("path", &self.path)
            .field("routes", &self.routes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Injected;
    use async_trait::async_trait;

    struct Cats;

    #[async_trait]
    impl Injectable for Cats {
        async fn construct(_: Injected) -> DiResult<Self> {
            Ok(Cats)
        }
    }

    struct Allow;

    #[async_trait]
    impl Guard for Allow {
        async fn can_activate(&self, _: &ExecutionContext) -> Result<bool, HttpError> {
            Ok(true)
        }
    }

    fn noop(_: Arc<Cats>, _: HandlerArgs) -> impl Future<Output = Result<Value, HttpError>> {
        async { Ok(Value::Null) }
    }

    #[test]
    fn apply_writes_route_metadata() {
        let mut registry = ProviderRegistry::new("CatsModule");
        let mut metadata = MetadataStore::new();
        let controller = ControllerDef::new::<Cats>("cats")
            .use_guard(Allow)
            .set_metadata("roles", vec!["admin".to_string()])
            .route(RouteDef::post("/").handle("create", noop))
            .route(RouteDef::get("/:id").use_guard(Allow).handle("find_one", noop));

        let token = controller.apply(&mut registry, &mut metadata, DuplicatePolicy::Warn).unwrap();

        assert_eq!(registry.lifetime_of(&token), Some(Lifetime::Transient));
        let handlers = metadata.get_metadata::<Vec<String>>(keys::HANDLERS, &token, None).unwrap();
        assert_eq!(*handlers, ["create", "find_one"]);
        assert_eq!(
            metadata.get_metadata::<u16>(keys::HTTP_CODE, &token, Some("create")).as_deref(),
            Some(&201)
        );
        assert_eq!(
            metadata
                .get_list::<Enhancer<dyn Guard>>(keys::GUARDS, &token, Some("find_one"))
                .len(),
            1
        );
        assert!(metadata.has_metadata("roles", &token, None));
    }

    #[test]
    fn route_without_handler_is_rejected() {
        let mut registry = ProviderRegistry::new("CatsModule");
        let mut metadata = MetadataStore::new();
        let err = ControllerDef::new::<Cats>("cats")
            .route(RouteDef::get("/"))
            .apply(&mut registry, &mut metadata, DuplicatePolicy::Warn)
            .unwrap_err();
        assert!(matches!(err, DiError::InvalidRoute { .. }));
    }

    #[test]
    fn duplicate_handler_names_are_rejected() {
        let mut registry = ProviderRegistry::new("CatsModule");
        let mut metadata = MetadataStore::new();
        let err = ControllerDef::new::<Cats>("cats")
            .route(RouteDef::get("/a").handle("same", noop))
            .route(RouteDef::get("/b").handle("same", noop))
            .apply(&mut registry, &mut metadata, DuplicatePolicy::Warn)
            .unwrap_err();
        assert!(matches!(err, DiError::InvalidRoute { .. }));
    }
}
