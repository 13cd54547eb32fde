//! Provider descriptors: token, construction recipe and lifetime.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DiError, DiResult};
use crate::internal::{AnyArc, BoxFuture};
use crate::lifecycle::LifecycleHooks;
use crate::lifetime::Lifetime;
use crate::provider::Injected;
use crate::token::Token;

pub(crate) type ConstructFn =
    Arc<dyn Fn(Injected) -> BoxFuture<'static, DiResult<AnyArc>> + Send + Sync>;

pub(crate) type HooksCaster = fn(&AnyArc) -> Option<Arc<dyn LifecycleHooks>>;

/// A type the container can construct.
///
/// `inject` lists the constructor parameters in order; the resolved values
/// are handed to `construct` as an [`Injected`] queue in the same order.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use ferrous_nest::{Dependency, DiResult, Injectable, Injected};
///
/// struct Database;
///
/// #[async_trait]
/// impl Injectable for Database {
///     async fn construct(_: Injected) -> DiResult<Self> {
///         Ok(Database)
///     }
/// }
///
/// struct UserRepository {
///     db: Arc<Database>,
/// }
///
/// #[async_trait]
/// impl Injectable for UserRepository {
///     fn inject() -> Vec<Dependency> {
///         vec![Dependency::of::<Database>()]
///     }
///
///     async fn construct(mut deps: Injected) -> DiResult<Self> {
///         Ok(UserRepository { db: deps.get()? })
///     }
/// }
/// ```
#[async_trait]
pub trait Injectable: Send + Sync + Sized + 'static {
    /// Constructor parameter metadata, in parameter order.
    fn inject() -> Vec<Dependency> {
        Vec::new()
    }

    /// Default lifetime when registered as a provider.
    fn lifetime() -> Lifetime {
        Lifetime::Singleton
    }

    /// Builds the instance from its resolved dependencies.
    async fn construct(deps: Injected) -> DiResult<Self>;
}

/// How a constructor parameter is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjectionKind {
    /// Resolved before construction
    Direct,
    /// Injected as a [`Deferred`](crate::Deferred) cell bound after construction
    Deferred,
    /// `None` when no provider is reachable
    Optional,
}

/// One constructor parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    /// Token to resolve
    pub token: Token,
    /// Injection flavour
    pub kind: InjectionKind,
    /// The dependent accepts a request-scoped dependency and is itself
    /// promoted to request scope
    pub allow_request_scope: bool,
}

impl Dependency {
    fn new(token: Token, kind: InjectionKind) -> Self {
        Self {
            token,
            kind,
            allow_request_scope: false,
        }
    }

    /// Direct dependency on the type `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(Token::of::<T>(), InjectionKind::Direct)
    }

    /// Direct dependency on an arbitrary token.
    pub fn on(token: impl Into<Token>) -> Self {
        Self::new(token.into(), InjectionKind::Direct)
    }

    /// Deferred dependency on the type `T`, breaking a construction cycle.
    pub fn deferred<T: ?Sized + 'static>() -> Self {
        Self::new(Token::of::<T>(), InjectionKind::Deferred)
    }

    /// Deferred dependency on an arbitrary token.
    pub fn deferred_on(token: impl Into<Token>) -> Self {
        Self::new(token.into(), InjectionKind::Deferred)
    }

    /// Optional dependency on the type `T`.
    pub fn optional<T: ?Sized + 'static>() -> Self {
        Self::new(Token::of::<T>(), InjectionKind::Optional)
    }

    /// Optional dependency on an arbitrary token.
    pub fn optional_on(token: impl Into<Token>) -> Self {
        Self::new(token.into(), InjectionKind::Optional)
    }

    /// Dependency on the current [`HttpRequest`](crate::http::HttpRequest).
    ///
    /// The dependent becomes request-bound.
    pub fn request() -> Self {
        Self::new(Token::request(), InjectionKind::Direct).acknowledge_request_scope()
    }

    /// Accepts a request-scoped dependency on this edge.
    pub fn acknowledge_request_scope(mut self) -> Self {
        self.allow_request_scope = true;
        self
    }

    /// True for deferred edges, which do not take part in cycle detection.
    pub fn is_deferred(&self) -> bool {
        self.kind == InjectionKind::Deferred
    }
}

/// Construction recipe of a provider.
#[derive(Clone)]
pub enum Recipe {
    /// Construct a class; parameters come from its `PARAM_TYPES` metadata
    Class {
        /// Class whose metadata describes the constructor
        target: Token,
        #[doc(hidden)]
        construct: ConstructFn,
    },
    /// Return a prebuilt value
    Value(AnyArc),
    /// Call a factory with the resolved `inject` list
    Factory {
        /// Factory arguments in order
        inject: Vec<Dependency>,
        #[doc(hidden)]
        factory: ConstructFn,
    },
    /// Alias of another token visible from the declaring module
    Existing(Token),
}

impl Recipe {
    /// Short recipe name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Recipe::Class { .. } => "class",
            Recipe::Value(_) => "value",
            Recipe::Factory { .. } => "factory",
            Recipe::Existing(_) => "existing",
        }
    }
}

impl std::fmt::Debug for Recipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recipe::Class { target, .. } => write!(f, "Class({})", target),
            Recipe::Value(_) => f.write_str("Value"),
            Recipe::Factory { inject, .. } => write!(f, "Factory({} args)", inject.len()),
            Recipe::Existing(token) => write!(f, "Existing({})", token),
        }
    }
}

/// Provider declaration: token, recipe and lifetime
///
/// Descriptors are owned by the module that declares them. Importers see the
/// same descriptor (and the same singleton) through the module's exports.
///
/// # Examples
///
/// ```rust
/// use ferrous_nest::{Dependency, Lifetime, ProviderDescriptor, Token};
///
/// #[derive(Clone)]
/// struct Settings { url: String }
///
/// let settings = ProviderDescriptor::instance(Settings { url: "postgres://db".into() });
/// assert_eq!(settings.token(), &Token::of::<Settings>());
///
/// let url = ProviderDescriptor::factory(
///     "DATABASE_URL",
///     vec![Dependency::of::<Settings>()],
///     |mut deps| async move {
///         let settings = deps.get::<Settings>()?;
///         Ok(settings.url.clone())
///     },
/// )
/// .with_lifetime(Lifetime::Transient);
/// assert_eq!(url.lifetime(), Lifetime::Transient);
/// assert_eq!(url.recipe().kind(), "factory");
/// ```
#[derive(Clone)]
pub struct ProviderDescriptor {
    pub(crate) token: Token,
    pub(crate) recipe: Recipe,
    pub(crate) lifetime: Lifetime,
    pub(crate) hooks: Option<HooksCaster>,
    pub(crate) class_dependencies: Option<fn() -> Vec<Dependency>>,
}

impl ProviderDescriptor {
    fn new(token: Token, recipe: Recipe, lifetime: Lifetime) -> Self {
        Self {
            token,
            recipe,
            lifetime,
            hooks: None,
            class_dependencies: None,
        }
    }

    /// Registers `T` under its own type token.
    pub fn class<T: Injectable>() -> Self {
        Self::class_as::<T>(Token::of::<T>())
    }

    /// Registers `T` under another token.
    pub fn class_as<T: Injectable>(token: impl Into<Token>) -> Self {
        let construct: ConstructFn = Arc::new(|deps: Injected| -> BoxFuture<'static, DiResult<AnyArc>> {
            Box::pin(async move {
                let instance = T::construct(deps).await?;
                Ok(Arc::new(instance) as AnyArc)
            })
        });
        let mut descriptor = Self::new(
            token.into(),
            Recipe::Class {
                target: Token::of::<T>(),
                construct,
            },
            T::lifetime(),
        );
        descriptor.class_dependencies = Some(T::inject);
        descriptor
    }

    /// Registers a prebuilt value under `token`.
    pub fn value<T: Any + Send + Sync>(token: impl Into<Token>, value: T) -> Self {
        Self::new(token.into(), Recipe::Value(Arc::new(value)), Lifetime::Singleton)
    }

    /// Registers a prebuilt value under its own type token.
    pub fn instance<T: Any + Send + Sync>(value: T) -> Self {
        Self::value(Token::of::<T>(), value)
    }

    /// Registers an async factory called with the resolved `inject` list.
    pub fn factory<T, F, Fut>(token: impl Into<Token>, inject: Vec<Dependency>, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Injected) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DiResult<T>> + Send + 'static,
    {
        let factory: ConstructFn = Arc::new(move |deps: Injected| -> BoxFuture<'static, DiResult<AnyArc>> {
            let fut = factory(deps);
            Box::pin(async move { fut.await.map(|v| Arc::new(v) as AnyArc) })
        });
        Self::new(
            token.into(),
            Recipe::Factory { inject, factory },
            Lifetime::Singleton,
        )
    }

    /// Registers `token` as an alias of `target`.
    pub fn existing(token: impl Into<Token>, target: impl Into<Token>) -> Self {
        // aliases share the target's instance; the alias itself is never cached
        Self::new(token.into(), Recipe::Existing(target.into()), Lifetime::Transient)
    }

    /// Overrides the lifetime.
    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Runs the [`LifecycleHooks`] of `T` for the instance of this provider.
    ///
    /// The instance must be a `T`; hooks run for singleton providers only.
    pub fn with_hooks<T: LifecycleHooks + 'static>(mut self) -> Self {
        self.hooks = Some(cast_hooks::<T>);
        self
    }

    /// Provider token.
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Construction recipe.
    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    /// Declared lifetime.
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// Parameters declared by the recipe itself.
    ///
    /// For classes this is the `Injectable::inject` list that scanning
    /// records as `PARAM_TYPES` metadata.
    pub fn dependencies(&self) -> Vec<Dependency> {
        match &self.recipe {
            Recipe::Class { .. } => self.class_dependencies.map(|f| f()).unwrap_or_default(),
            Recipe::Value(_) => Vec::new(),
            Recipe::Factory { inject, .. } => inject.clone(),
            Recipe::Existing(target) => vec![Dependency::on(target.clone())],
        }
    }

    pub(crate) fn lifecycle_hooks(&self, instance: &AnyArc) -> Option<Arc<dyn LifecycleHooks>> {
        self.hooks.and_then(|cast| cast(instance))
    }
}

fn cast_hooks<T: LifecycleHooks + 'static>(instance: &AnyArc) -> Option<Arc<dyn LifecycleHooks>> {
    instance
        .clone()
        .downcast::<T>()
        .ok()
        .map(|t| t as Arc<dyn LifecycleHooks>)
}

impl std::fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("token", &self.token)
            .field("recipe", &self.recipe)
            .field("lifetime", &self.lifetime)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

/// Downcasts a resolved instance, reporting the token on mismatch.
pub(crate) fn downcast<T: Any + Send + Sync>(token: &Token, value: AnyArc) -> DiResult<Arc<T>> {
    value
        .downcast::<T>()
        .map_err(|_| DiError::TypeMismatch(token.to_string()))
}
