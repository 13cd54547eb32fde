//! Request pipeline stages.
//!
//! Each stage is a small capability trait: [`Middleware`], [`Guard`],
//! [`Interceptor`], [`PipeTransform`] and [`ExceptionFilter`]. Stages are
//! attached globally, per controller or per handler, either as ready
//! instances or as injectable classes resolved through the container.
//! The applicable lists are computed once, when the route table is built.

mod context;
mod filter;
mod guard;
mod interceptor;
mod middleware;
mod pipe;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::descriptors::{Injectable, ProviderDescriptor};
use crate::error::{DiError, DiResult};
use crate::http::HttpError;
use crate::internal::{AnyArc, ResolutionPath};
use crate::lifetime::Lifetime;
use crate::module::ModuleId;
use crate::provider::{Container, RequestContext};
use crate::router::RouteFilter;
use crate::token::Token;

pub use context::ExecutionContext;
pub use filter::ExceptionFilter;
pub use guard::{guard_fn, Guard};
pub use interceptor::{CallHandler, Interceptor};
pub(crate) use interceptor::Handle;
pub use middleware::{middleware_fn, Middleware, Next};
pub(crate) use middleware::Endpoint;
pub use pipe::{
    ArgType, ArgumentMetadata, DefaultValuePipe, ParseBoolPipe, ParseIntPipe, PipeTransform, Rule,
    ValidationPipe,
};

type Cast<T> = fn(Arc<dyn Any + Send + Sync>) -> Option<Arc<T>>;

/// A pipeline component given either as an instance or as an injectable class.
///
/// Classes are registered as providers of the declaring module (unless the
/// module already provides them) and resolved from it, so they can inject
/// anything that module sees.
pub struct Enhancer<T: ?Sized> {
    source: Source<T>,
}

enum Source<T: ?Sized> {
    Instance(Arc<T>),
    Class {
        token: Token,
        cast: Cast<T>,
        provider: fn() -> ProviderDescriptor,
    },
}

impl<T: ?Sized + Send + Sync + 'static> Enhancer<T> {
    /// Wraps a ready instance.
    pub fn instance(component: Arc<T>) -> Self {
        Self {
            source: Source::Instance(component),
        }
    }

    fn class_of<C: Injectable>(cast: Cast<T>) -> Self {
        Self {
            source: Source::Class {
                token: Token::of::<C>(),
                cast,
                provider: ProviderDescriptor::class::<C>,
            },
        }
    }

    /// Provider to register for a class enhancer.
    pub(crate) fn provider(&self) -> Option<ProviderDescriptor> {
        match &self.source {
            Source::Instance(_) => None,
            Source::Class { provider, .. } => Some(provider()),
        }
    }

    /// Token of a class enhancer.
    pub fn token(&self) -> Option<&Token> {
        match &self.source {
            Source::Instance(_) => None,
            Source::Class { token, .. } => Some(token),
        }
    }

    /// Prepares the component for dispatch from `module`.
    ///
    /// Instances and singleton classes are resolved now; request-scoped and
    /// transient classes are resolved per request.
    pub(crate) async fn bind(&self, container: &Container, module: ModuleId) -> DiResult<Bound<T>> {
        match &self.source {
            Source::Instance(component) => Ok(Bound::Ready(component.clone())),
            Source::Class { token, cast, .. } => {
                let lifetime = container
                    .graph()
                    .locate(module, token)
                    .map(|(_, entry)| entry.lifetime)
                    .ok_or_else(|| DiError::not_found(token, container.graph().module(module).name()))?;
                if lifetime == Lifetime::Singleton {
                    let value = container
                        .resolve_any(module, token, None, &ResolutionPath::new())
                        .await?;
                    let component = cast(value).ok_or_else(|| DiError::TypeMismatch(token.to_string()))?;
                    Ok(Bound::Ready(component))
                } else {
                    Ok(Bound::PerRequest {
                        module,
                        token: token.clone(),
                        cast: *cast,
                    })
                }
            }
        }
    }
}

impl<T: ?Sized> Clone for Enhancer<T> {
    fn clone(&self) -> Self {
        let source = match &self.source {
            Source::Instance(component) => Source::Instance(component.clone()),
            Source::Class { token, cast, provider } => Source::Class {
                token: token.clone(),
                cast: *cast,
                provider: *provider,
            },
        };
        Self { source }
    }
}

impl<T: ?Sized> fmt::Debug for Enhancer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Instance(_) => f.write_str("Enhancer(instance)"),
            Source::Class { token, .. } => write!(f, "Enhancer({})", token),
        }
    }
}

macro_rules! class_constructor {
    ($trait:ident, $doc:literal) => {
        impl Enhancer<dyn $trait> {
            #[doc = $doc]
            pub fn class<C: Injectable + $trait>() -> Self {
                Self::class_of::<C>(|value: AnyArc| {
                    value.downcast::<C>().ok().map(|c| c as Arc<dyn $trait>)
                })
            }
        }
    };
}

class_constructor!(Middleware, "Injectable middleware class.");
class_constructor!(Guard, "Injectable guard class.");
class_constructor!(Interceptor, "Injectable interceptor class.");
class_constructor!(PipeTransform, "Injectable pipe class.");
class_constructor!(ExceptionFilter, "Injectable exception filter class.");

/// A pipeline component ready for dispatch.
pub(crate) enum Bound<T: ?Sized> {
    Ready(Arc<T>),
    PerRequest {
        module: ModuleId,
        token: Token,
        cast: Cast<T>,
    },
}

impl<T: ?Sized> Clone for Bound<T> {
    fn clone(&self) -> Self {
        match self {
            Bound::Ready(component) => Bound::Ready(component.clone()),
            Bound::PerRequest { module, token, cast } => Bound::PerRequest {
                module: *module,
                token: token.clone(),
                cast: *cast,
            },
        }
    }
}

impl<T: ?Sized> Bound<T> {
    pub(crate) async fn get(&self, container: &Container, request: &RequestContext) -> Result<Arc<T>, HttpError> {
        match self {
            Bound::Ready(component) => Ok(component.clone()),
            Bound::PerRequest { module, token, cast } => {
                let value = container
                    .resolve_any(*module, token, Some(request), &ResolutionPath::new())
                    .await?;
                cast(value).ok_or_else(|| DiError::TypeMismatch(token.to_string()).into())
            }
        }
    }
}

/// Resolves every component of `stages` for one request, keeping order.
pub(crate) async fn resolve_all<T: ?Sized>(
    stages: &[Bound<T>],
    container: &Container,
    request: &RequestContext,
) -> Result<Vec<Arc<T>>, HttpError> {
    let mut resolved = Vec::with_capacity(stages.len());
    for stage in stages {
        resolved.push(stage.get(container, request).await?);
    }
    Ok(resolved)
}

/// Middleware applied by a module to the routes its filter selects.
#[derive(Clone, Debug)]
pub struct MiddlewareBinding {
    pub(crate) middleware: Enhancer<dyn Middleware>,
    pub(crate) filter: RouteFilter,
}

/// Pipeline components applied to every route.
#[derive(Clone, Default)]
pub(crate) struct GlobalEnhancers {
    pub(crate) middleware: Vec<Enhancer<dyn Middleware>>,
    pub(crate) guards: Vec<Enhancer<dyn Guard>>,
    pub(crate) interceptors: Vec<Enhancer<dyn Interceptor>>,
    pub(crate) pipes: Vec<Enhancer<dyn PipeTransform>>,
    pub(crate) filters: Vec<Enhancer<dyn ExceptionFilter>>,
}

impl GlobalEnhancers {
    pub(crate) fn providers(&self) -> Vec<ProviderDescriptor> {
        let middleware = self.middleware.iter().filter_map(Enhancer::provider);
        let guards = self.guards.iter().filter_map(Enhancer::provider);
        let interceptors = self.interceptors.iter().filter_map(Enhancer::provider);
        let pipes = self.pipes.iter().filter_map(Enhancer::provider);
        let filters = self.filters.iter().filter_map(Enhancer::provider);
        middleware
            .chain(guards)
            .chain(interceptors)
            .chain(pipes)
            .chain(filters)
            .collect()
    }
}
