//! Constructor arguments and deferred references.

use std::any::Any;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::descriptors::downcast;
use crate::error::{DiError, DiResult};
use crate::internal::{AnyArc, ResolutionPath};
use crate::module::ModuleId;
use crate::token::Token;

use super::request::{RequestContext, RequestInner};
use super::{Container, ContainerInner};

pub(crate) enum Resolved {
    Instance(Token, AnyArc),
    Missing(Token),
    Deferred(Arc<DeferredCell>),
}

/// Resolved constructor arguments, consumed in declaration order.
///
/// Each accessor takes the next argument; use the one matching the
/// [`InjectionKind`](crate::InjectionKind) of the declared dependency.
pub struct Injected {
    target: Token,
    module: String,
    values: VecDeque<Resolved>,
}

impl Injected {
    pub(crate) fn new(target: Token, module: String, values: VecDeque<Resolved>) -> Self {
        Self { target, module, values }
    }

    fn next(&mut self) -> DiResult<Resolved> {
        self.values.pop_front().ok_or_else(|| {
            DiError::construction(&self.target, "more arguments taken than declared by inject()")
        })
    }

    /// Takes the next argument as a direct dependency.
    pub fn get<T: Any + Send + Sync>(&mut self) -> DiResult<Arc<T>> {
        match self.next()? {
            Resolved::Instance(token, value) => downcast(&token, value),
            Resolved::Missing(token) => Err(DiError::not_found(&token, &self.module)),
            Resolved::Deferred(cell) => Err(DiError::TypeMismatch(format!(
                "{} is deferred; take it with Injected::deferred",
                cell.token
            ))),
        }
    }

    /// Takes the next argument as an optional dependency.
    pub fn optional<T: Any + Send + Sync>(&mut self) -> DiResult<Option<Arc<T>>> {
        match self.next()? {
            Resolved::Instance(token, value) => downcast(&token, value).map(Some),
            Resolved::Missing(_) => Ok(None),
            Resolved::Deferred(cell) => Err(DiError::TypeMismatch(format!(
                "{} is deferred; take it with Injected::deferred",
                cell.token
            ))),
        }
    }

    /// Takes the next argument as a deferred reference.
    pub fn deferred<T: Any + Send + Sync>(&mut self) -> DiResult<Deferred<T>> {
        match self.next()? {
            Resolved::Deferred(cell) => Ok(Deferred {
                cell,
                _marker: PhantomData,
            }),
            Resolved::Instance(token, _) | Resolved::Missing(token) => Err(DiError::TypeMismatch(
                format!("{} was not declared deferred", token),
            )),
        }
    }

    /// Arguments not taken yet.
    pub fn remaining(&self) -> usize {
        self.values.len()
    }

    /// Token of the provider being constructed.
    pub fn target(&self) -> &Token {
        &self.target
    }
}

impl std::fmt::Debug for Injected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injected")
            .field("target", &self.target)
            .field("remaining", &self.values.len())
            .finish()
    }
}

/// Indirection cell for a dependency resolved after construction.
pub(crate) struct DeferredCell {
    pub(crate) token: Token,
    module: ModuleId,
    container: Weak<ContainerInner>,
    request: Option<Weak<RequestInner>>,
    // resolution path of the dependent while it is still being constructed
    path: Mutex<Option<ResolutionPath>>,
    value: Mutex<Option<AnyArc>>,
}

impl DeferredCell {
    pub(crate) fn new(
        token: Token,
        module: ModuleId,
        container: Weak<ContainerInner>,
        request: Option<&RequestContext>,
        path: ResolutionPath,
    ) -> Self {
        Self {
            token,
            module,
            container,
            request: request.map(RequestContext::downgrade),
            path: Mutex::new(Some(path)),
            value: Mutex::new(None),
        }
    }

    /// Called once the dependent is constructed.
    pub(crate) fn arm(&self) {
        self.path.lock().take();
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.value.lock().is_some()
    }

    pub(crate) fn bound(&self) -> Option<AnyArc> {
        self.value.lock().clone()
    }

    /// Drops the bound instance; used when the owning request ends.
    pub(crate) fn unbind(&self) {
        self.value.lock().take();
    }

    pub(crate) async fn resolve(&self) -> DiResult<AnyArc> {
        if let Some(value) = self.bound() {
            return Ok(value);
        }

        let container = self
            .container
            .upgrade()
            .map(Container::from_inner)
            .ok_or(DiError::ShutDown)?;
        let request = match &self.request {
            Some(weak) => Some(
                RequestContext::upgrade(weak)
                    .ok_or_else(|| DiError::RequestContextRequired(self.token.to_string()))?,
            ),
            None => None,
        };
        // dereferencing during the dependent's own construction must hit
        // the cycle check instead of waiting on the dependent's cell
        let path = self.path.lock().clone().unwrap_or_default();

        let value = container
            .resolve_any(self.module, &self.token, request.as_ref(), &path)
            .await?;
        // concurrent first uses may race; the first binding is kept
        Ok(self.value.lock().get_or_insert(value).clone())
    }
}

/// Deferred reference to a provider, breaking a construction cycle.
///
/// The target is bound after the dependent is constructed and resolved at the
/// latest on first use. Dereferencing it from within the dependent's own
/// constructor fails with `CircularDependency`.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use ferrous_nest::{Deferred, Dependency, DiResult, Injectable, Injected};
///
/// struct Orders {
///     customers: Deferred<Customers>,
/// }
///
/// struct Customers {
///     orders: Arc<Orders>,
/// }
///
/// #[async_trait]
/// impl Injectable for Orders {
///     fn inject() -> Vec<Dependency> {
///         vec![Dependency::deferred::<Customers>()]
///     }
///     async fn construct(mut deps: Injected) -> DiResult<Self> {
///         Ok(Orders { customers: deps.deferred()? })
///     }
/// }
///
/// #[async_trait]
/// impl Injectable for Customers {
///     fn inject() -> Vec<Dependency> {
///         vec![Dependency::of::<Orders>()]
///     }
///     async fn construct(mut deps: Injected) -> DiResult<Self> {
///         Ok(Customers { orders: deps.get()? })
///     }
/// }
/// ```
pub struct Deferred<T> {
    cell: Arc<DeferredCell>,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: Any + Send + Sync> Deferred<T> {
    /// Resolves (or returns the bound) instance.
    pub async fn get(&self) -> DiResult<Arc<T>> {
        let value = self.cell.resolve().await?;
        downcast(&self.cell.token, value)
    }

    /// The bound instance, without resolving.
    pub fn try_get(&self) -> Option<Arc<T>> {
        self.cell.bound().and_then(|v| v.downcast::<T>().ok())
    }

    /// True once the target has been bound.
    pub fn is_bound(&self) -> bool {
        self.cell.is_bound()
    }

    /// Token of the target.
    pub fn token(&self) -> &Token {
        &self.cell.token
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("token", &self.cell.token)
            .field("bound", &self.cell.is_bound())
            .finish()
    }
}
