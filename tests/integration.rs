//! End-to-end: a users API assembled from several modules, served through
//! the in-memory transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ferrous_nest::controller::{ControllerDef, Param, RouteDef};
use ferrous_nest::http::{HttpError, HttpMethod, HttpRequest};
use ferrous_nest::pipeline::{CallHandler, ExecutionContext, Interceptor, ParseIntPipe};
use ferrous_nest::{
    AppConfig, Application, Dependency, DiResult, Injectable, Injected, Lifetime, Module, ModuleDef,
    ProviderDescriptor, Token,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct User {
    id: i64,
    name: String,
}

struct Database {
    users: RwLock<HashMap<i64, User>>,
}

#[async_trait]
impl Injectable for Database {
    async fn construct(_: Injected) -> DiResult<Self> {
        let mut users = HashMap::new();
        users.insert(42, User { id: 42, name: "Ada".into() });
        Ok(Database {
            users: RwLock::new(users),
        })
    }
}

struct DatabaseModule;

impl Module for DatabaseModule {
    fn define() -> ModuleDef {
        ModuleDef::new::<Self>()
            .global()
            .provider_class::<Database>()
            .export::<Database>()
    }
}

struct UserService {
    db: Arc<Database>,
}

impl UserService {
    fn find(&self, id: i64) -> Result<User, HttpError> {
        self.db
            .users
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| HttpError::not_found(format!("User {} not found", id)))
    }

    fn create(&self, name: String) -> User {
        let mut users = self.db.users.write();
        let id = users.keys().max().copied().unwrap_or(0) + 1;
        let user = User { id, name };
        users.insert(id, user.clone());
        user
    }
}

#[async_trait]
impl Injectable for UserService {
    fn inject() -> Vec<Dependency> {
        vec![Dependency::of::<Database>()]
    }

    async fn construct(mut deps: Injected) -> DiResult<Self> {
        Ok(UserService { db: deps.get()? })
    }
}

/// Per-request trace id read from the incoming request.
struct TraceId(String);

#[async_trait]
impl Injectable for TraceId {
    fn lifetime() -> Lifetime {
        Lifetime::Request
    }

    fn inject() -> Vec<Dependency> {
        vec![Dependency::request()]
    }

    async fn construct(mut deps: Injected) -> DiResult<Self> {
        let request = deps.get::<HttpRequest>()?;
        Ok(TraceId(request.header("x-trace-id").unwrap_or("none").to_string()))
    }
}

struct UsersController {
    users: Arc<UserService>,
    trace: Arc<TraceId>,
}

#[async_trait]
impl Injectable for UsersController {
    fn inject() -> Vec<Dependency> {
        vec![Dependency::of::<UserService>(), Dependency::of::<TraceId>()]
    }

    async fn construct(mut deps: Injected) -> DiResult<Self> {
        Ok(UsersController {
            users: deps.get()?,
            trace: deps.get()?,
        })
    }
}

struct Envelope;

#[async_trait]
impl Interceptor for Envelope {
    async fn intercept(&self, ctx: &ExecutionContext, next: CallHandler) -> Result<Value, HttpError> {
        let data = next.handle().await?;
        let trace: Arc<TraceId> = ctx.resolve().await?;
        Ok(json!({ "data": data, "trace": trace.0 }))
    }
}

#[async_trait]
impl Injectable for Envelope {
    async fn construct(_: Injected) -> DiResult<Self> {
        Ok(Envelope)
    }
}

#[derive(Deserialize)]
struct CreateUser {
    name: String,
}

struct UsersModule;

impl Module for UsersModule {
    fn define() -> ModuleDef {
        ModuleDef::new::<Self>()
            .provider_class::<UserService>()
            .provider_class::<TraceId>()
            .export::<UserService>()
            .controller(
                ControllerDef::new::<UsersController>("users")
                    .use_interceptor_class::<Envelope>()
                    // static segment first: routes match in declaration order
                    .route(RouteDef::get("trace").handle(
                        "trace",
                        |c: Arc<UsersController>, _| async move { Ok::<_, HttpError>(c.trace.0.clone()) },
                    ))
                    .route(
                        RouteDef::get(":id")
                            .param(Param::path("id").pipe(ParseIntPipe::default()))
                            .handle("find_one", |c: Arc<UsersController>, args| async move {
                                let id: i64 = args.arg(0)?;
                                c.users.find(id)
                            }),
                    )
                    .route(
                        RouteDef::post("")
                            .param(Param::body())
                            .handle("create", |c: Arc<UsersController>, args| async move {
                                let body: CreateUser = args.arg(0)?;
                                Ok::<_, HttpError>(c.users.create(body.name))
                            }),
                    )
            )
    }
}

struct AppModule;

impl Module for AppModule {
    fn define() -> ModuleDef {
        ModuleDef::new::<Self>()
            .import::<DatabaseModule>()
            .import::<UsersModule>()
            .provider(ProviderDescriptor::value("APP_NAME", "users-api".to_string()))
    }
}

async fn boot() -> Application {
    let config = AppConfig {
        global_prefix: Some("api".into()),
        ..Default::default()
    };
    Application::builder::<AppModule>()
        .config(config)
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn get_user_by_id() {
    let app = boot().await;
    let transport = app.in_memory().unwrap();

    let response = transport
        .handle(HttpRequest::new(HttpMethod::Get, "/api/users/42").with_header("x-trace-id", "t-1"))
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(
        response.body,
        json!({ "data": { "id": 42, "name": "Ada" }, "trace": "t-1" })
    );

    let missing = transport.handle(HttpRequest::new(HttpMethod::Get, "/api/users/7")).await;
    assert_eq!(missing.status, 404);
    assert_eq!(missing.body["message"], "User 7 not found");
}

#[tokio::test]
async fn created_user_is_visible_to_later_requests() {
    let app = boot().await;
    let transport = app.in_memory().unwrap();

    let created = transport
        .handle(HttpRequest::new(HttpMethod::Post, "/api/users").with_body(json!({ "name": "Grace" })))
        .await;
    assert_eq!(created.status, 201);
    let id = created.body["data"]["id"].as_i64().unwrap();

    let fetched = transport
        .handle(HttpRequest::new(HttpMethod::Get, format!("/api/users/{}", id)))
        .await;
    assert_eq!(fetched.body["data"]["name"], "Grace");

    let bad = transport
        .handle(HttpRequest::new(HttpMethod::Post, "/api/users").with_body(json!({ "title": "x" })))
        .await;
    assert_eq!(bad.status, 400);
}

#[tokio::test]
async fn route_table_lists_every_route() {
    let app = boot().await;
    let routes: Vec<(HttpMethod, &str, &str)> = app
        .routes()
        .iter()
        .map(|r| (r.method(), r.pattern().template(), r.handler_name()))
        .collect();
    assert_eq!(
        routes,
        [
            (HttpMethod::Get, "/api/users/trace", "trace"),
            (HttpMethod::Get, "/api/users/:id", "find_one"),
            (HttpMethod::Post, "/api/users", "create"),
        ]
    );

    let name: Arc<String> = app.get_token(&Token::symbol("APP_NAME")).await.unwrap();
    assert_eq!(name.as_str(), "users-api");
}

#[tokio::test]
async fn concurrent_requests_get_their_own_request_scope() {
    let app = boot().await;
    let transport = Arc::new(app.in_memory().unwrap());

    let mut handles = Vec::new();
    for i in 0..16 {
        let transport = transport.clone();
        handles.push(tokio::spawn(async move {
            let trace = format!("t-{}", i);
            let response = transport
                .handle(HttpRequest::new(HttpMethod::Get, "/api/users/trace").with_header("x-trace-id", &trace))
                .await;
            (trace, response)
        }));
    }
    for handle in handles {
        let (trace, response) = handle.await.unwrap();
        // both the controller and the interceptor saw this request's trace id
        assert_eq!(response.body, json!({ "data": trace, "trace": trace }));
    }
}

static POOLS_OPENED: AtomicUsize = AtomicUsize::new(0);

struct Pool;

#[async_trait]
impl Injectable for Pool {
    async fn construct(_: Injected) -> DiResult<Self> {
        POOLS_OPENED.fetch_add(1, Ordering::SeqCst);
        // slow enough for concurrent first resolutions to overlap
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(Pool)
    }
}

struct PoolModule;

impl Module for PoolModule {
    fn define() -> ModuleDef {
        ModuleDef::new::<Self>().provider_class::<Pool>()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_resolution_builds_one_singleton() {
    let config = AppConfig {
        eager_singletons: false,
        ..Default::default()
    };
    let app = Arc::new(
        Application::builder::<PoolModule>()
            .config(config)
            .build()
            .await
            .unwrap(),
    );
    let mut handles = Vec::new();
    for _ in 0..8 {
        let app = app.clone();
        handles.push(tokio::spawn(async move { app.get::<Pool>().await.map(|pool| Arc::as_ptr(&pool) as usize) }));
    }
    let mut pointers = Vec::new();
    for handle in handles {
        pointers.push(handle.await.unwrap().unwrap());
    }

    pointers.dedup();
    assert_eq!(pointers.len(), 1);
    assert_eq!(POOLS_OPENED.load(Ordering::SeqCst), 1);
}
