//! # ferrous-nest
//!
//! Module-based dependency injection with a declarative HTTP request
//! pipeline, in the style of NestJS.
//!
//! ## Features
//!
//! - **Modules**: providers, controllers, imports and exports, with global,
//!   dynamic and re-exporting modules
//! - **Lifetimes**: singleton, request-scoped and transient providers
//! - **Graph validation at bootstrap**: missing providers, dependency cycles
//!   and singletons capturing request-scoped state are reported before any
//!   request is served
//! - **Deferred references** to break provider cycles
//! - **Request pipeline**: middleware, guards, interceptors, pipes and
//!   exception filters, attached globally, per controller or per handler
//! - **Lifecycle hooks** on init and graceful shutdown
//! - **Transport-neutral**: routes are mounted on any [`transport::HttpTransport`];
//!   an in-memory transport and an axum adapter are included
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use ferrous_nest::controller::{ControllerDef, Param, RouteDef};
//! use ferrous_nest::http::{HttpError, HttpMethod, HttpRequest};
//! use ferrous_nest::pipeline::ParseIntPipe;
//! use ferrous_nest::{Application, Dependency, DiResult, Injectable, Injected, Module, ModuleDef};
//! use serde_json::json;
//!
//! struct UserService;
//!
//! impl UserService {
//!     fn find(&self, id: i64) -> serde_json::Value {
//!         json!({ "id": id, "name": "Ada" })
//!     }
//! }
//!
//! #[async_trait]
//! impl Injectable for UserService {
//!     async fn construct(_: Injected) -> DiResult<Self> {
//!         Ok(UserService)
//!     }
//! }
//!
//! struct UserController {
//!     users: Arc<UserService>,
//! }
//!
//! #[async_trait]
//! impl Injectable for UserController {
//!     fn inject() -> Vec<Dependency> {
//!         vec![Dependency::of::<UserService>()]
//!     }
//!
//!     async fn construct(mut deps: Injected) -> DiResult<Self> {
//!         Ok(UserController { users: deps.get()? })
//!     }
//! }
//!
//! struct UsersModule;
//!
//! impl Module for UsersModule {
//!     fn define() -> ModuleDef {
//!         ModuleDef::new::<Self>()
//!             .provider_class::<UserService>()
//!             .export::<UserService>()
//!     }
//! }
//!
//! struct AppModule;
//!
//! impl Module for AppModule {
//!     fn define() -> ModuleDef {
//!         ModuleDef::new::<Self>()
//!             .import::<UsersModule>()
//!             .controller(ControllerDef::new::<UserController>("users").route(
//!                 RouteDef::get(":id")
//!                     .param(Param::path("id").pipe(ParseIntPipe::default()))
//!                     .handle("find_one", |c: Arc<UserController>, args| async move {
//!                         let id: i64 = args.arg(0)?;
//!                         Ok::<_, HttpError>(c.users.find(id))
//!                     }),
//!             ))
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> DiResult<()> {
//! let app = Application::create::<AppModule>().await?;
//! let transport = app.in_memory()?;
//!
//! let response = transport.handle(HttpRequest::new(HttpMethod::Get, "/users/42")).await;
//! assert_eq!(response.status, 200);
//! assert_eq!(response.body["id"], 42);
//!
//! let response = transport.handle(HttpRequest::new(HttpMethod::Get, "/users/abc")).await;
//! assert_eq!(response.status, 400);
//!
//! app.shutdown(None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Lifetimes
//!
//! - **Singleton**: one instance per providing module, constructed at most
//!   once even under concurrent first resolution
//! - **Request**: one instance per inbound request, released when the
//!   request ends
//! - **Transient**: a new instance on every resolution
//!
//! A singleton depending on a request-scoped provider fails bootstrap with
//! [`DiError::AmbiguousScope`] unless the edge is acknowledged with
//! [`Dependency::acknowledge_request_scope`] or scope violations are set to
//! warn, in which case the singleton is promoted to request scope.

pub mod application;
pub mod config;
pub mod controller;
pub mod descriptors;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod lifetime;
pub mod logging;
pub mod metadata;
pub mod module;
pub mod observer;
pub mod pipeline;
pub mod provider;
pub mod router;
pub mod token;
pub mod transport;
pub mod validation;

#[cfg(feature = "axum-integration")]
pub mod axum_integration;

mod internal;
mod registration;

pub use application::{Application, ApplicationBuilder};
pub use config::{AppConfig, DuplicatePolicy, ScopePolicy};
pub use descriptors::{Dependency, Injectable, InjectionKind, ProviderDescriptor, Recipe};
pub use error::{DiError, DiResult};
pub use internal::BoxFuture;
pub use lifecycle::{LifecycleHooks, LifecycleState};
pub use lifetime::Lifetime;
pub use metadata::MetadataStore;
pub use module::{Module, ModuleDef, ModuleGraph, ModuleId, ModuleKey, ModuleRef};
pub use observer::{DiObserver, ObservationContext, TracingObserver};
pub use provider::{Container, Deferred, Injected, RequestContext};
pub use registration::ProviderRegistry;
pub use token::Token;
pub use tokio_util::sync::CancellationToken;
pub use validation::{validate_graph, ValidationReport, ValidationWarning};
