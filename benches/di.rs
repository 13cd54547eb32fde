use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ferrous_nest::controller::{ControllerDef, Param, RouteDef};
use ferrous_nest::http::{HttpError, HttpMethod, HttpRequest};
use ferrous_nest::pipeline::{guard_fn, ParseIntPipe};
use ferrous_nest::router::RoutePattern;
use ferrous_nest::*;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::runtime::Runtime;

// ===== Fixtures =====

struct Config {
    name: String,
}

#[async_trait]
impl Injectable for Config {
    async fn construct(_: Injected) -> DiResult<Self> {
        Ok(Config { name: "bench".into() })
    }
}

struct Repository {
    config: Arc<Config>,
}

#[async_trait]
impl Injectable for Repository {
    fn inject() -> Vec<Dependency> {
        vec![Dependency::of::<Config>()]
    }

    async fn construct(mut deps: Injected) -> DiResult<Self> {
        Ok(Repository { config: deps.get()? })
    }
}

struct PerRequest {
    repository: Arc<Repository>,
}

#[async_trait]
impl Injectable for PerRequest {
    fn lifetime() -> Lifetime {
        Lifetime::Request
    }

    fn inject() -> Vec<Dependency> {
        vec![Dependency::of::<Repository>()]
    }

    async fn construct(mut deps: Injected) -> DiResult<Self> {
        Ok(PerRequest { repository: deps.get()? })
    }
}

struct Transient;

#[async_trait]
impl Injectable for Transient {
    fn lifetime() -> Lifetime {
        Lifetime::Transient
    }

    async fn construct(_: Injected) -> DiResult<Self> {
        Ok(Transient)
    }
}

struct ItemsController {
    repository: Arc<Repository>,
}

#[async_trait]
impl Injectable for ItemsController {
    fn inject() -> Vec<Dependency> {
        vec![Dependency::of::<Repository>()]
    }

    async fn construct(mut deps: Injected) -> DiResult<Self> {
        Ok(ItemsController { repository: deps.get()? })
    }
}

struct BenchModule;

impl Module for BenchModule {
    fn define() -> ModuleDef {
        ModuleDef::new::<Self>()
            .provider_class::<Config>()
            .provider_class::<Repository>()
            .provider_class::<PerRequest>()
            .provider_class::<Transient>()
            .controller(
                ControllerDef::new::<ItemsController>("items")
                    .route(RouteDef::get("").handle("list", |c: Arc<ItemsController>, _| async move {
                        Ok::<_, HttpError>(c.repository.config.name.clone())
                    }))
                    .route(
                        RouteDef::get(":id")
                            .param(Param::path("id").pipe(ParseIntPipe::default()))
                            .handle("find", |_: Arc<ItemsController>, args| async move {
                                let id: i64 = args.arg(0)?;
                                Ok::<_, HttpError>(id)
                            }),
                    ),
            )
    }
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

async fn resolve<T: Send + Sync + 'static>(app: &Application, ctx: Option<&RequestContext>) -> Arc<T> {
    let root = app.container().graph().root();
    app.container()
        .resolve_token(root, &Token::of::<T>(), ctx)
        .await
        .unwrap()
}

// ===== Resolution =====

fn bench_resolution(c: &mut Criterion) {
    let rt = runtime();
    let app = rt.block_on(Application::create::<BenchModule>()).unwrap();

    let mut group = c.benchmark_group("resolution");

    group.bench_function("singleton_hit", |b| {
        b.iter(|| black_box(rt.block_on(resolve::<Repository>(&app, None))))
    });

    group.bench_function("transient", |b| {
        b.iter(|| black_box(rt.block_on(resolve::<Transient>(&app, None))))
    });

    group.bench_function("request_scoped_fresh_context", |b| {
        b.iter(|| {
            let ctx = RequestContext::new(None);
            let instance = rt.block_on(resolve::<PerRequest>(&app, Some(&ctx)));
            ctx.release();
            black_box(instance.repository.config.name.len())
        })
    });

    group.bench_function("request_scoped_cached", |b| {
        let ctx = RequestContext::new(None);
        rt.block_on(resolve::<PerRequest>(&app, Some(&ctx)));
        b.iter(|| black_box(rt.block_on(resolve::<PerRequest>(&app, Some(&ctx)))))
    });

    group.finish();
}

// ===== Bootstrap =====

fn bench_bootstrap(c: &mut Criterion) {
    let rt = runtime();

    c.bench_function("bootstrap_application", |b| {
        b.iter(|| {
            let app = rt.block_on(Application::create::<BenchModule>()).unwrap();
            black_box(app.routes().len())
        })
    });

    c.bench_function("scan_and_validate", |b| {
        b.iter(|| {
            let (mut graph, metadata) = ModuleGraph::scan_module::<BenchModule>(DuplicatePolicy::Warn).unwrap();
            let report = validate_graph(&mut graph, &metadata, ScopePolicy::Deny);
            black_box(report);
        })
    });
}

// ===== Dispatch =====

fn bench_dispatch(c: &mut Criterion) {
    let rt = runtime();
    let app = rt.block_on(Application::create::<BenchModule>()).unwrap();
    let transport = app.in_memory().unwrap();

    let mut group = c.benchmark_group("dispatch");

    group.bench_function("static_route", |b| {
        b.iter(|| {
            let response = rt.block_on(transport.handle(HttpRequest::new(HttpMethod::Get, "/items")));
            black_box(response.status)
        })
    });

    group.bench_function("param_route_with_pipe", |b| {
        b.iter(|| {
            let response = rt.block_on(transport.handle(HttpRequest::new(HttpMethod::Get, "/items/42")));
            black_box(response.status)
        })
    });

    group.bench_function("not_found", |b| {
        b.iter(|| {
            let response = rt.block_on(transport.handle(HttpRequest::new(HttpMethod::Get, "/missing")));
            black_box(response.status)
        })
    });

    group.finish();
}

fn bench_guard_depth(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("guard_depth");

    for depth in [0usize, 1, 4, 16] {
        let mut builder = Application::builder::<BenchModule>();
        for _ in 0..depth {
            builder = builder.use_global_guard(guard_fn(|_ctx| async { Ok::<_, HttpError>(true) }));
        }
        let app = rt.block_on(builder.build()).unwrap();
        let transport = app.in_memory().unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                let response = rt.block_on(transport.handle(HttpRequest::new(HttpMethod::Get, "/items")));
                black_box(response.status)
            })
        });
    }

    group.finish();
}

// ===== Routing =====

fn bench_route_matching(c: &mut Criterion) {
    let pattern = RoutePattern::parse("/api/v1/users/:id/files/*").unwrap();

    c.bench_function("route_pattern_match", |b| {
        b.iter(|| black_box(pattern.matches(black_box("/api/v1/users/42/files/docs/report.pdf"))))
    });
}

criterion_group!(
    benches,
    bench_resolution,
    bench_bootstrap,
    bench_dispatch,
    bench_guard_depth,
    bench_route_matching
);
criterion_main!(benches);
