//! Application bootstrap, route mounting and graceful shutdown.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::AppConfig;
use crate::descriptors::Injectable;
use crate::error::{DiError, DiResult};
use crate::http::{HttpRequest, HttpResponse};
use crate::internal::BoxFuture;
use crate::lifecycle::{hook, LifecycleState};
use crate::module::{Module, ModuleDef, ModuleGraph, ModuleId};
use crate::observer::{DiObserver, Observers};
use crate::pipeline::{
    Enhancer, ExceptionFilter, GlobalEnhancers, Guard, Interceptor, Middleware, PipeTransform,
};
use crate::provider::Container;
use crate::router::{build_routes, Dispatcher, RouteEntry};
use crate::token::Token;
use crate::transport::{HttpTransport, InMemoryTransport, RouteHandler};
use crate::validation::validate_graph;

#[derive(Debug, Clone, Copy)]
enum Phase {
    ModuleInit,
    Bootstrap,
    ModuleDestroy,
    BeforeShutdown,
    Shutdown,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::ModuleInit => hook::ON_MODULE_INIT,
            Phase::Bootstrap => hook::ON_APPLICATION_BOOTSTRAP,
            Phase::ModuleDestroy => hook::ON_MODULE_DESTROY,
            Phase::BeforeShutdown => hook::BEFORE_APPLICATION_SHUTDOWN,
            Phase::Shutdown => hook::ON_APPLICATION_SHUTDOWN,
        }
    }
}

/// Builder for an [`Application`].
///
/// Global pipeline components registered here apply to every route, ahead
/// of controller- and handler-level ones. Class components are provided by
/// the root module unless it already declares them.
pub struct ApplicationBuilder {
    root: ModuleDef,
    config: AppConfig,
    globals: GlobalEnhancers,
    observers: Observers,
}

impl ApplicationBuilder {
    /// Builder for the graph rooted at `root`.
    pub fn new(root: ModuleDef) -> Self {
        Self {
            root,
            config: AppConfig::default(),
            globals: GlobalEnhancers::default(),
            observers: Observers::default(),
        }
    }

    /// Replaces the configuration.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Prefixes every route path, e.g. `api/v1`.
    pub fn global_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.global_prefix = Some(prefix.into());
        self
    }

    /// Adds global middleware.
    pub fn use_global_middleware(mut self, middleware: impl Middleware) -> Self {
        self.globals
            .middleware
            .push(Enhancer::instance(Arc::new(middleware) as Arc<dyn Middleware>));
        self
    }

    /// Adds global middleware resolved from the root module.
    pub fn use_global_middleware_class<T: Injectable + Middleware>(mut self) -> Self {
        self.globals.middleware.push(Enhancer::<dyn Middleware>::class::<T>());
        self
    }

    /// Adds a global guard.
    pub fn use_global_guard(mut self, guard: impl Guard) -> Self {
        self.globals
            .guards
            .push(Enhancer::instance(Arc::new(guard) as Arc<dyn Guard>));
        self
    }

    /// Adds a global guard resolved from the root module.
    pub fn use_global_guard_class<T: Injectable + Guard>(mut self) -> Self {
        self.globals.guards.push(Enhancer::<dyn Guard>::class::<T>());
        self
    }

    /// Adds a global interceptor.
    pub fn use_global_interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.globals
            .interceptors
            .push(Enhancer::instance(Arc::new(interceptor) as Arc<dyn Interceptor>));
        self
    }

    /// Adds a global interceptor resolved from the root module.
    pub fn use_global_interceptor_class<T: Injectable + Interceptor>(mut self) -> Self {
        self.globals
            .interceptors
            .push(Enhancer::<dyn Interceptor>::class::<T>());
        self
    }

    /// Adds a global pipe.
    pub fn use_global_pipe(mut self, pipe: impl PipeTransform) -> Self {
        self.globals
            .pipes
            .push(Enhancer::instance(Arc::new(pipe) as Arc<dyn PipeTransform>));
        self
    }

    /// Adds a global pipe resolved from the root module.
    pub fn use_global_pipe_class<T: Injectable + PipeTransform>(mut self) -> Self {
        self.globals.pipes.push(Enhancer::<dyn PipeTransform>::class::<T>());
        self
    }

    /// Adds a global exception filter, tried after route-level filters.
    pub fn use_global_filter(mut self, filter: impl ExceptionFilter) -> Self {
        self.globals
            .filters
            .push(Enhancer::instance(Arc::new(filter) as Arc<dyn ExceptionFilter>));
        self
    }

    /// Adds a global exception filter resolved from the root module.
    pub fn use_global_filter_class<T: Injectable + ExceptionFilter>(mut self) -> Self {
        self.globals
            .filters
            .push(Enhancer::<dyn ExceptionFilter>::class::<T>());
        self
    }

    /// Adds a resolution observer.
    pub fn observer(mut self, observer: impl DiObserver + 'static) -> Self {
        self.observers.add(Arc::new(observer));
        self
    }

    /// Scans, validates and instantiates the graph, runs init hooks and
    /// builds the route table.
    ///
    /// Missing providers, dependency cycles and scope violations fail here,
    /// before any request can be served.
    pub async fn build(self) -> DiResult<Application> {
        let config = self.config;
        let (mut graph, mut metadata) = ModuleGraph::scan(self.root, config.duplicate_providers)?;
        let root = graph.root();
        for descriptor in self.globals.providers() {
            graph.register_if_absent(root, descriptor, &mut metadata);
        }

        let report = validate_graph(&mut graph, &metadata, config.scope_violations).into_result()?;
        tracing::debug!(
            providers = report.providers,
            warnings = report.warnings.len(),
            "dependency graph validated"
        );

        let container = Container::new(graph, metadata, self.observers);
        if config.eager_singletons {
            let count = container.instantiate_singletons().await?;
            tracing::debug!(singletons = count, "singletons instantiated");
        }
        container.bind_pending_deferred().await?;

        let state = Arc::new(Mutex::new(LifecycleState::Initializing));
        let dispatcher = Dispatcher::new(
            container.clone(),
            state.clone(),
            config.development,
            config.request_timeout(),
        );
        let mut app = Application {
            container,
            config,
            routes: Vec::new(),
            dispatcher,
            state,
        };

        let order: Vec<ModuleId> = app.container.graph().modules().map(|m| m.id()).collect();
        app.run_phase(Phase::ModuleInit, &order, None).await?;
        app.routes = build_routes(&app.container, &self.globals, app.config.global_prefix.as_deref()).await?;
        app.run_phase(Phase::Bootstrap, &order, None).await?;

        *app.state.lock() = LifecycleState::Running;
        tracing::info!(
            modules = app.container.graph().len(),
            routes = app.routes.len(),
            "application successfully started"
        );
        Ok(app)
    }
}

impl std::fmt::Debug for ApplicationBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationBuilder")
            .field("root", &self.root)
            .field("config", &self.config)
            .finish()
    }
}

/// A bootstrapped application: container, route table and lifecycle.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use ferrous_nest::controller::{ControllerDef, Param, RouteDef};
/// use ferrous_nest::http::{HttpError, HttpMethod, HttpRequest};
/// use ferrous_nest::{Application, DiResult, Injectable, Injected, Module, ModuleDef};
/// use serde_json::json;
///
/// struct Greeter;
///
/// #[async_trait]
/// impl Injectable for Greeter {
///     async fn construct(_: Injected) -> DiResult<Self> {
///         Ok(Greeter)
///     }
/// }
///
/// struct HelloController {
///     greeter: Arc<Greeter>,
/// }
///
/// #[async_trait]
/// impl Injectable for HelloController {
///     fn inject() -> Vec<ferrous_nest::Dependency> {
///         vec![ferrous_nest::Dependency::of::<Greeter>()]
///     }
///
///     async fn construct(mut deps: Injected) -> DiResult<Self> {
///         Ok(HelloController { greeter: deps.get()? })
///     }
/// }
///
/// struct AppModule;
///
/// impl Module for AppModule {
///     fn define() -> ModuleDef {
///         ModuleDef::new::<Self>()
///             .provider_class::<Greeter>()
///             .controller(
///                 ControllerDef::new::<HelloController>("hello").route(
///                     RouteDef::get(":name")
///                         .param(Param::path("name"))
///                         .handle("greet", |_c: Arc<HelloController>, args| async move {
///                             let name: String = args.arg(0)?;
///                             Ok::<_, HttpError>(json!({ "hello": name }))
///                         }),
///                 ),
///             )
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> DiResult<()> {
/// let app = Application::builder::<AppModule>().build().await?;
/// let transport = app.in_memory()?;
///
/// let response = transport.handle(HttpRequest::new(HttpMethod::Get, "/hello/ada")).await;
/// assert_eq!(response.status, 200);
/// assert_eq!(response.body, json!({ "hello": "ada" }));
///
/// app.shutdown(None).await?;
/// # Ok(())
/// # }
/// ```
pub struct Application {
    container: Container,
    config: AppConfig,
    routes: Vec<Arc<RouteEntry>>,
    dispatcher: Dispatcher,
    // shared with the dispatcher, which refuses requests once shutdown starts
    state: Arc<Mutex<LifecycleState>>,
}

impl Application {
    /// Builder for the application rooted at module `M`.
    pub fn builder<M: Module>() -> ApplicationBuilder {
        ApplicationBuilder::new(M::define())
    }

    /// Builds the application rooted at `M` with default settings.
    pub async fn create<M: Module>() -> DiResult<Self> {
        Self::builder::<M>().build().await
    }

    /// Resolves `T` from the root module.
    pub async fn get<T: Any + Send + Sync>(&self) -> DiResult<Arc<T>> {
        self.get_token(&Token::of::<T>()).await
    }

    /// Resolves `token` from the root module.
    pub async fn get_token<T: Any + Send + Sync>(&self, token: &Token) -> DiResult<Arc<T>> {
        self.ensure_running()?;
        self.container
            .resolve_token(self.container.graph().root(), token, None)
            .await
    }

    /// Resolves `T` from module `M`, seeing what `M` sees.
    pub async fn get_from<M: Module, T: Any + Send + Sync>(&self) -> DiResult<Arc<T>> {
        self.ensure_running()?;
        self.container.resolve_from::<M, T>(None).await
    }

    /// The container.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Effective configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The route table, in mapping order.
    pub fn routes(&self) -> &[Arc<RouteEntry>] {
        &self.routes
    }

    /// Dispatcher shared by every mounted route.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    fn ensure_running(&self) -> DiResult<()> {
        if self.state().is_shutting_down() {
            return Err(DiError::ShutDown);
        }
        Ok(())
    }

    /// Registers every route with `transport`.
    pub fn mount(&self, transport: &mut impl HttpTransport) -> DiResult<()> {
        for route in &self.routes {
            let dispatcher = self.dispatcher.clone();
            let entry = route.clone();
            let handler: RouteHandler = Arc::new(move |request: HttpRequest| -> BoxFuture<'static, HttpResponse> {
                let dispatcher = dispatcher.clone();
                let entry = entry.clone();
                Box::pin(async move { dispatcher.dispatch(&entry, request).await })
            });
            transport.register_route(route.method(), route.pattern().template(), handler)?;
        }
        Ok(())
    }

    /// An [`InMemoryTransport`] with every route mounted.
    pub fn in_memory(&self) -> DiResult<InMemoryTransport> {
        let mut transport = InMemoryTransport::new();
        self.mount(&mut transport)?;
        Ok(transport)
    }

    /// Runs the shutdown hooks once, modules in reverse order.
    ///
    /// Every hook runs even if an earlier one fails; the first failure is
    /// returned. Later calls are no-ops.
    pub async fn shutdown(&self, signal: Option<&str>) -> DiResult<()> {
        {
            let mut state = self.state.lock();
            if state.is_shutting_down() {
                return Ok(());
            }
            *state = LifecycleState::ShuttingDown;
        }
        tracing::info!(signal = signal.unwrap_or("none"), "application shutting down");

        let order: Vec<ModuleId> = self.container.graph().modules().rev().map(|m| m.id()).collect();
        let mut first_error = None;
        for phase in [Phase::ModuleDestroy, Phase::BeforeShutdown, Phase::Shutdown] {
            if let Err(err) = self.run_phase(phase, &order, signal).await {
                first_error.get_or_insert(err);
            }
        }

        *self.state.lock() = LifecycleState::Stopped;
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Waits for Ctrl-C, then shuts down with signal `"SIGINT"`.
    pub async fn run_until_signal(&self) -> DiResult<()> {
        tokio::signal::ctrl_c()
            .await
            .map_err(|err| DiError::Config(format!("cannot listen for shutdown signal: {}", err)))?;
        self.shutdown(Some("SIGINT")).await
    }

    async fn run_phase(&self, phase: Phase, order: &[ModuleId], signal: Option<&str>) -> DiResult<()> {
        let stops_early = matches!(phase, Phase::ModuleInit | Phase::Bootstrap);
        let mut first_error = None;
        let teardown = matches!(phase, Phase::ModuleDestroy | Phase::BeforeShutdown | Phase::Shutdown);
        for module in order {
            let mut instances = self.container.singleton_instances(*module);
            if teardown {
                // registration order within the module, reversed
                instances.reverse();
            }
            for (descriptor, instance) in instances {
                let Some(hooks) = descriptor.lifecycle_hooks(&instance) else {
                    continue;
                };
                let result = match phase {
                    Phase::ModuleInit => hooks.on_module_init().await,
                    Phase::Bootstrap => hooks.on_application_bootstrap().await,
                    Phase::ModuleDestroy => hooks.on_module_destroy().await,
                    Phase::BeforeShutdown => hooks.before_application_shutdown(signal).await,
                    Phase::Shutdown => hooks.on_application_shutdown(signal).await,
                };
                tracing::trace!(hook = phase.name(), token = %descriptor.token, "lifecycle hook ran");
                if let Err(err) = result {
                    let err = DiError::Lifecycle {
                        hook: phase.name(),
                        token: descriptor.token.to_string(),
                        message: err.to_string(),
                    };
                    if stops_early {
                        return Err(err);
                    }
                    tracing::error!("{}", err);
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("state", &self.state())
            .field("routes", &self.routes.len())
            .field("container", &self.container)
            .finish()
    }
}
