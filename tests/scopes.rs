use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ferrous_nest::{
    AppConfig, Application, Deferred, Dependency, DiError, DiResult, Injectable, Injected, Lifetime,
    Module, ModuleDef, ProviderDescriptor, RequestContext, ScopePolicy, Token,
};

static BUILT: AtomicUsize = AtomicUsize::new(0);

struct RequestState {
    id: usize,
}

#[async_trait]
impl Injectable for RequestState {
    fn lifetime() -> Lifetime {
        Lifetime::Request
    }

    async fn construct(_: Injected) -> DiResult<Self> {
        Ok(RequestState {
            id: BUILT.fetch_add(1, Ordering::SeqCst),
        })
    }
}

struct Clock;

#[async_trait]
impl Injectable for Clock {
    async fn construct(_: Injected) -> DiResult<Self> {
        Ok(Clock)
    }
}

struct Handler {
    state: Arc<RequestState>,
}

#[async_trait]
impl Injectable for Handler {
    fn lifetime() -> Lifetime {
        Lifetime::Transient
    }

    fn inject() -> Vec<Dependency> {
        vec![Dependency::of::<RequestState>()]
    }

    async fn construct(mut deps: Injected) -> DiResult<Self> {
        Ok(Handler { state: deps.get()? })
    }
}

struct ScopedModule;

impl Module for ScopedModule {
    fn define() -> ModuleDef {
        ModuleDef::new::<Self>()
            .provider_class::<RequestState>()
            .provider_class::<Clock>()
            .provider_class::<Handler>()
    }
}

async fn resolve<T: Send + Sync + 'static>(app: &Application, ctx: Option<&RequestContext>) -> DiResult<Arc<T>> {
    let root = app.container().graph().root();
    app.container().resolve_token(root, &Token::of::<T>(), ctx).await
}

#[tokio::test]
async fn request_scope_is_shared_within_a_request_only() {
    let app = Application::create::<ScopedModule>().await.unwrap();

    let first = RequestContext::new(None);
    let second = RequestContext::new(None);

    let a1 = resolve::<RequestState>(&app, Some(&first)).await.unwrap();
    let a2 = resolve::<RequestState>(&app, Some(&first)).await.unwrap();
    let b = resolve::<RequestState>(&app, Some(&second)).await.unwrap();

    assert!(Arc::ptr_eq(&a1, &a2));
    assert!(!Arc::ptr_eq(&a1, &b));
    assert_ne!(a1.id, b.id);
    assert_eq!(first.instance_count(), 1);
}

#[tokio::test]
async fn transient_gets_a_new_instance_with_the_request_dependency() {
    let app = Application::create::<ScopedModule>().await.unwrap();
    let ctx = RequestContext::new(None);

    let h1 = resolve::<Handler>(&app, Some(&ctx)).await.unwrap();
    let h2 = resolve::<Handler>(&app, Some(&ctx)).await.unwrap();

    assert!(!Arc::ptr_eq(&h1, &h2));
    assert!(Arc::ptr_eq(&h1.state, &h2.state));
}

#[tokio::test]
async fn singleton_is_constructed_once() {
    let app = Application::create::<ScopedModule>().await.unwrap();
    let ctx = RequestContext::new(None);

    let outside = app.get::<Clock>().await.unwrap();
    let inside = resolve::<Clock>(&app, Some(&ctx)).await.unwrap();
    assert!(Arc::ptr_eq(&outside, &inside));
}

#[tokio::test]
async fn request_scoped_outside_a_request_fails() {
    let app = Application::create::<ScopedModule>().await.unwrap();
    let err = app.get::<RequestState>().await.err().unwrap();
    assert!(matches!(err, DiError::RequestContextRequired(_)));
}

#[tokio::test]
async fn released_context_refuses_new_resolutions() {
    let app = Application::create::<ScopedModule>().await.unwrap();
    let ctx = RequestContext::new(None);
    resolve::<RequestState>(&app, Some(&ctx)).await.unwrap();

    ctx.release();
    assert!(ctx.is_released());
    assert_eq!(ctx.instance_count(), 0);
    let err = resolve::<RequestState>(&app, Some(&ctx)).await.err().unwrap();
    assert!(matches!(err, DiError::RequestContextRequired(_)));
}

struct Cache {
    state: Arc<RequestState>,
}

#[async_trait]
impl Injectable for Cache {
    fn inject() -> Vec<Dependency> {
        vec![Dependency::of::<RequestState>()]
    }

    async fn construct(mut deps: Injected) -> DiResult<Self> {
        Ok(Cache { state: deps.get()? })
    }
}

struct LeakyModule;

impl Module for LeakyModule {
    fn define() -> ModuleDef {
        ModuleDef::new::<Self>()
            .provider_class::<RequestState>()
            .provider_class::<Cache>()
    }
}

#[tokio::test]
async fn singleton_capturing_request_state_is_rejected() {
    let err = Application::create::<LeakyModule>().await.unwrap_err();
    match err {
        DiError::AmbiguousScope { singleton, dependency } => {
            assert_eq!(singleton, "Cache");
            assert_eq!(dependency, "RequestState");
        }
        other => panic!("expected AmbiguousScope, got {other}"),
    }
}

#[tokio::test]
async fn warn_policy_promotes_the_singleton() {
    let config = AppConfig {
        scope_violations: ScopePolicy::Warn,
        ..AppConfig::default()
    };
    let app = Application::builder::<LeakyModule>()
        .config(config)
        .build()
        .await
        .unwrap();

    let first = RequestContext::new(None);
    let second = RequestContext::new(None);
    let c1 = resolve::<Cache>(&app, Some(&first)).await.unwrap();
    let c2 = resolve::<Cache>(&app, Some(&second)).await.unwrap();
    assert!(!Arc::ptr_eq(&c1, &c2));
    assert!(!Arc::ptr_eq(&c1.state, &c2.state));
}

struct AcknowledgedModule;

impl Module for AcknowledgedModule {
    fn define() -> ModuleDef {
        ModuleDef::new::<Self>()
            .provider_class::<RequestState>()
            .provider(ProviderDescriptor::factory(
                "audit",
                vec![Dependency::of::<RequestState>().acknowledge_request_scope()],
                |mut deps| async move {
                    let state = deps.get::<RequestState>()?;
                    Ok(format!("audit-{}", state.id))
                },
            ))
    }
}

#[tokio::test]
async fn acknowledged_edge_promotes_without_failing() {
    let app = Application::create::<AcknowledgedModule>().await.unwrap();
    let root = app.container().graph().root();

    let ctx = RequestContext::new(None);
    let state = resolve::<RequestState>(&app, Some(&ctx)).await.unwrap();
    let audit: Arc<String> = app
        .container()
        .resolve_token(root, &Token::symbol("audit"), Some(&ctx))
        .await
        .unwrap();
    assert_eq!(*audit, format!("audit-{}", state.id));
}

struct RequestAware {
    path: String,
}

#[async_trait]
impl Injectable for RequestAware {
    fn lifetime() -> Lifetime {
        Lifetime::Request
    }

    fn inject() -> Vec<Dependency> {
        vec![Dependency::request()]
    }

    async fn construct(mut deps: Injected) -> DiResult<Self> {
        let request = deps.get::<ferrous_nest::http::HttpRequest>()?;
        Ok(RequestAware {
            path: request.path.clone(),
        })
    }
}

struct RequestTokenModule;

impl Module for RequestTokenModule {
    fn define() -> ModuleDef {
        ModuleDef::new::<Self>().provider_class::<RequestAware>()
    }
}

#[tokio::test]
async fn request_token_injects_the_current_request() {
    use ferrous_nest::http::{HttpMethod, HttpRequest};

    let app = Application::create::<RequestTokenModule>().await.unwrap();
    let request = Arc::new(HttpRequest::new(HttpMethod::Get, "/users/7"));
    let ctx = RequestContext::new(Some(request));

    let aware = resolve::<RequestAware>(&app, Some(&ctx)).await.unwrap();
    assert_eq!(aware.path, "/users/7");
}

struct LazyAudit {
    state: Deferred<RequestState>,
}

#[async_trait]
impl Injectable for LazyAudit {
    fn inject() -> Vec<Dependency> {
        vec![Dependency::deferred::<RequestState>()]
    }

    async fn construct(mut deps: Injected) -> DiResult<Self> {
        Ok(LazyAudit { state: deps.deferred()? })
    }
}

struct LazyLeakModule;

impl Module for LazyLeakModule {
    fn define() -> ModuleDef {
        ModuleDef::new::<Self>()
            .provider_class::<RequestState>()
            .provider_class::<LazyAudit>()
    }
}

#[tokio::test]
async fn deferred_edge_into_request_scope_is_rejected() {
    let err = Application::create::<LazyLeakModule>().await.unwrap_err();
    match err {
        DiError::AmbiguousScope { singleton, dependency } => {
            assert_eq!(singleton, "LazyAudit");
            assert_eq!(dependency, "RequestState");
        }
        other => panic!("expected AmbiguousScope, got {other}"),
    }
}

#[tokio::test]
async fn promoted_deferred_edge_resolves_inside_the_request() {
    let config = AppConfig {
        scope_violations: ScopePolicy::Warn,
        ..AppConfig::default()
    };
    let app = Application::builder::<LazyLeakModule>()
        .config(config)
        .build()
        .await
        .unwrap();

    let ctx = RequestContext::new(None);
    let audit = resolve::<LazyAudit>(&app, Some(&ctx)).await.unwrap();
    let state = resolve::<RequestState>(&app, Some(&ctx)).await.unwrap();
    assert!(Arc::ptr_eq(&audit.state.get().await.unwrap(), &state));

    let other = RequestContext::new(None);
    let other_audit = resolve::<LazyAudit>(&app, Some(&other)).await.unwrap();
    assert!(!Arc::ptr_eq(&other_audit.state.get().await.unwrap(), &state));
}

struct AcknowledgedLazyAudit {
    state: Deferred<RequestState>,
}

#[async_trait]
impl Injectable for AcknowledgedLazyAudit {
    fn inject() -> Vec<Dependency> {
        vec![Dependency::deferred::<RequestState>().acknowledge_request_scope()]
    }

    async fn construct(mut deps: Injected) -> DiResult<Self> {
        Ok(AcknowledgedLazyAudit { state: deps.deferred()? })
    }
}

struct AcknowledgedLazyModule;

impl Module for AcknowledgedLazyModule {
    fn define() -> ModuleDef {
        ModuleDef::new::<Self>()
            .provider_class::<RequestState>()
            .provider_class::<AcknowledgedLazyAudit>()
    }
}

#[tokio::test]
async fn acknowledged_deferred_edge_promotes_under_deny_policy() {
    let app = Application::create::<AcknowledgedLazyModule>().await.unwrap();
    assert!(app.get::<AcknowledgedLazyAudit>().await.is_err());

    let ctx = RequestContext::new(None);
    let audit = resolve::<AcknowledgedLazyAudit>(&app, Some(&ctx)).await.unwrap();
    let state = resolve::<RequestState>(&app, Some(&ctx)).await.unwrap();
    assert!(Arc::ptr_eq(&audit.state.get().await.unwrap(), &state));
}

// Session and Cart reference each other within one request
struct Session {
    cart: Deferred<Cart>,
}

struct Cart {
    session: Arc<Session>,
}

#[async_trait]
impl Injectable for Session {
    fn lifetime() -> Lifetime {
        Lifetime::Request
    }

    fn inject() -> Vec<Dependency> {
        vec![Dependency::deferred::<Cart>()]
    }

    async fn construct(mut deps: Injected) -> DiResult<Self> {
        Ok(Session { cart: deps.deferred()? })
    }
}

#[async_trait]
impl Injectable for Cart {
    fn lifetime() -> Lifetime {
        Lifetime::Request
    }

    fn inject() -> Vec<Dependency> {
        vec![Dependency::of::<Session>()]
    }

    async fn construct(mut deps: Injected) -> DiResult<Self> {
        Ok(Cart { session: deps.get()? })
    }
}

struct CheckoutModule;

impl Module for CheckoutModule {
    fn define() -> ModuleDef {
        ModuleDef::new::<Self>()
            .provider_class::<Session>()
            .provider_class::<Cart>()
    }
}

#[tokio::test]
async fn request_scoped_cycle_binds_on_first_use() {
    let app = Application::create::<CheckoutModule>().await.unwrap();
    let ctx = RequestContext::new(None);

    let session = resolve::<Session>(&app, Some(&ctx)).await.unwrap();
    assert!(!session.cart.is_bound());

    let cart = session.cart.get().await.unwrap();
    assert!(session.cart.is_bound());
    assert!(Arc::ptr_eq(&cart.session, &session));
    assert!(Arc::ptr_eq(&resolve::<Cart>(&app, Some(&ctx)).await.unwrap(), &cart));
    assert_eq!(ctx.instance_count(), 2);
}

#[tokio::test]
async fn request_scoped_cycle_from_the_other_side() {
    let app = Application::create::<CheckoutModule>().await.unwrap();
    let ctx = RequestContext::new(None);

    let cart = resolve::<Cart>(&app, Some(&ctx)).await.unwrap();
    let via_session = cart.session.cart.get().await.unwrap();
    assert!(Arc::ptr_eq(&via_session, &cart));

    let other = RequestContext::new(None);
    let other_cart = resolve::<Cart>(&app, Some(&other)).await.unwrap();
    assert!(!Arc::ptr_eq(&other_cart, &cart));
    assert!(!Arc::ptr_eq(&other_cart.session, &cart.session));
}

#[tokio::test]
async fn releasing_the_request_unbinds_its_deferred_cells() {
    let app = Application::create::<CheckoutModule>().await.unwrap();
    let ctx = RequestContext::new(None);

    let session = resolve::<Session>(&app, Some(&ctx)).await.unwrap();
    session.cart.get().await.unwrap();
    assert!(session.cart.is_bound());

    ctx.release();
    assert!(!session.cart.is_bound());
    assert!(session.cart.try_get().is_none());
    let err = session.cart.get().await.err().unwrap();
    assert!(matches!(err, DiError::RequestContextRequired(_)));
}
