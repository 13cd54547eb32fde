//! Provider resolution.
//!
//! [`Container`] turns tokens into live instances, honouring module
//! visibility, provider lifetimes and deferred edges.

mod injected;
mod request;

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::descriptors::{downcast, Dependency, InjectionKind, ProviderDescriptor, Recipe};
use crate::error::{DiError, DiResult};
use crate::internal::{AnyArc, BoxFuture, ResolutionPath};
use crate::lifetime::Lifetime;
use crate::metadata::{keys, MetadataStore};
use crate::module::{Module, ModuleGraph, ModuleId};
use crate::observer::{ObservationContext, Observers};
use crate::registration::RegistryEntry;
use crate::token::Token;

pub use injected::{Deferred, Injected};
pub use request::RequestContext;

use injected::{DeferredCell, Resolved};

/// The resolver over a scanned module graph.
///
/// Cloning is cheap; clones share the singleton caches.
///
/// Singletons are cached per (owning module, token) and constructed at most
/// once, even when first resolved concurrently. Request-scoped providers are
/// cached in the [`RequestContext`] passed to the call. Transient providers
/// are constructed on every resolution.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

pub(crate) struct ContainerInner {
    graph: ModuleGraph,
    metadata: MetadataStore,
    // indexed by module id; only singleton tokens have a cell
    singletons: Vec<HashMap<Token, OnceCell<AnyArc>>>,
    observers: Observers,
    pending: Mutex<Vec<Weak<DeferredCell>>>,
    bootstrapped: AtomicBool,
}

impl Container {
    pub(crate) fn new(graph: ModuleGraph, metadata: MetadataStore, observers: Observers) -> Self {
        let mut singletons: Vec<HashMap<Token, OnceCell<AnyArc>>> =
            (0..graph.len()).map(|_| HashMap::new()).collect();
        for module in graph.modules() {
            for (token, entry) in module.registry.entries() {
                if entry.lifetime == Lifetime::Singleton {
                    singletons[module.id.0].insert(token.clone(), OnceCell::new());
                }
            }
        }

        Self {
            inner: Arc::new(ContainerInner {
                graph,
                metadata,
                singletons,
                observers,
                pending: Mutex::new(Vec::new()),
                bootstrapped: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ContainerInner>) -> Self {
        Self { inner }
    }

    /// The scanned module graph.
    pub fn graph(&self) -> &ModuleGraph {
        &self.inner.graph
    }

    /// The frozen metadata table.
    pub fn metadata(&self) -> &MetadataStore {
        &self.inner.metadata
    }

    /// Resolves `T` as seen from `module`, outside of any request.
    pub async fn resolve<T: Any + Send + Sync>(&self, module: ModuleId) -> DiResult<Arc<T>> {
        self.resolve_token(module, &Token::of::<T>(), None).await
    }

    /// Resolves `token` as seen from `module`, optionally inside a request.
    pub async fn resolve_token<T: Any + Send + Sync>(
        &self,
        module: ModuleId,
        token: &Token,
        request: Option<&RequestContext>,
    ) -> DiResult<Arc<T>> {
        let value = self
            .resolve_any(module, token, request, &ResolutionPath::new())
            .await?;
        downcast(token, value)
    }

    /// Resolves `T` from the module `M`.
    pub async fn resolve_from<M: Module, T: Any + Send + Sync>(
        &self,
        request: Option<&RequestContext>,
    ) -> DiResult<Arc<T>> {
        let module = self
            .graph()
            .find::<M>()
            .ok_or_else(|| DiError::UnknownModule(std::any::type_name::<M>().to_string()))?;
        self.resolve_token(module, &Token::of::<T>(), request).await
    }

    /// Resolution entry point.
    ///
    /// Looks the token up (own providers, imports' exports, global modules),
    /// then serves it from the cache matching its effective lifetime.
    pub(crate) fn resolve_any<'a>(
        &'a self,
        module: ModuleId,
        token: &'a Token,
        request: Option<&'a RequestContext>,
        path: &'a ResolutionPath,
    ) -> BoxFuture<'a, DiResult<AnyArc>> {
        Box::pin(async move {
            if token.is_request() {
                return request
                    .and_then(RequestContext::request)
                    .map(|r| r as AnyArc)
                    .ok_or_else(|| DiError::RequestContextRequired(token.to_string()));
            }

            let graph = &self.inner.graph;
            let (owner, entry) = graph
                .locate(module, token)
                .ok_or_else(|| DiError::not_found(token, graph.module(module).name()))?;

            match entry.lifetime {
                Lifetime::Singleton => {
                    let cell = self.singleton_cell(owner, token)?;
                    if let Some(value) = cell.get() {
                        return Ok(value.clone());
                    }
                    let path = path.enter(owner, token)?;
                    // singletons never see the request that triggered them
                    let value = cell
                        .get_or_try_init(|| self.construct(owner, entry, None, &path))
                        .await?;
                    Ok(value.clone())
                }
                Lifetime::Request => {
                    let request = request
                        .ok_or_else(|| DiError::RequestContextRequired(token.to_string()))?;
                    let cell = request.slot(owner, token)?;
                    if let Some(value) = cell.get() {
                        return Ok(value.clone());
                    }
                    let path = path.enter(owner, token)?;
                    let value = cell
                        .get_or_try_init(|| self.construct(owner, entry, Some(request), &path))
                        .await?;
                    Ok(value.clone())
                }
                Lifetime::Transient => {
                    let path = path.enter(owner, token)?;
                    self.construct(owner, entry, request, &path).await
                }
            }
        })
    }

    fn singleton_cell(&self, module: ModuleId, token: &Token) -> DiResult<&OnceCell<AnyArc>> {
        self.inner.singletons[module.0]
            .get(token)
            .ok_or_else(|| DiError::not_found(token, self.inner.graph.module(module).name()))
    }

    async fn construct(
        &self,
        owner: ModuleId,
        entry: &RegistryEntry,
        request: Option<&RequestContext>,
        path: &ResolutionPath,
    ) -> DiResult<AnyArc> {
        let descriptor = &entry.descriptor;
        let observers = &self.inner.observers;
        let context = observers.has_observers().then(|| ObservationContext {
            module: self.inner.graph.module(owner).name().to_string(),
            request_id: request.map(RequestContext::id),
            depth: path.depth(),
        });

        if let Some(context) = &context {
            observers.resolving(&descriptor.token, context);
        }
        let started = Instant::now();
        let result = self.run_recipe(owner, descriptor, request, path).await;
        if let Some(context) = &context {
            match &result {
                Ok(_) => observers.resolved(&descriptor.token, started.elapsed(), context),
                Err(err) => observers.failed(&descriptor.token, err, context),
            }
        }
        result
    }

    async fn run_recipe(
        &self,
        owner: ModuleId,
        descriptor: &ProviderDescriptor,
        request: Option<&RequestContext>,
        path: &ResolutionPath,
    ) -> DiResult<AnyArc> {
        match &descriptor.recipe {
            Recipe::Value(value) => Ok(value.clone()),
            Recipe::Existing(target) => self.resolve_any(owner, target, request, path).await,
            Recipe::Class { target, construct } => {
                let params = self
                    .inner
                    .metadata
                    .get_metadata::<Vec<Dependency>>(keys::PARAM_TYPES, target, None);
                let params = params.as_deref().map(Vec::as_slice).unwrap_or(&[]);
                let (injected, cells) = self
                    .resolve_dependencies(owner, &descriptor.token, params, request, path)
                    .await?;
                let instance = construct(injected).await;
                cells.iter().for_each(|cell| cell.arm());
                instance
            }
            Recipe::Factory { inject, factory } => {
                let (injected, cells) = self
                    .resolve_dependencies(owner, &descriptor.token, inject, request, path)
                    .await?;
                let instance = factory(injected).await;
                cells.iter().for_each(|cell| cell.arm());
                instance
            }
        }
    }

    async fn resolve_dependencies(
        &self,
        owner: ModuleId,
        target: &Token,
        params: &[Dependency],
        request: Option<&RequestContext>,
        path: &ResolutionPath,
    ) -> DiResult<(Injected, Vec<Arc<DeferredCell>>)> {
        let mut values = VecDeque::with_capacity(params.len());
        let mut cells = Vec::new();

        for param in params {
            let resolved = match param.kind {
                InjectionKind::Direct => {
                    let value = self.resolve_any(owner, &param.token, request, path).await?;
                    Resolved::Instance(param.token.clone(), value)
                }
                InjectionKind::Optional => {
                    let reachable = if param.token.is_request() {
                        request.and_then(RequestContext::request).is_some()
                    } else {
                        self.inner.graph.is_visible(owner, &param.token)
                    };
                    if reachable {
                        let value = self.resolve_any(owner, &param.token, request, path).await?;
                        Resolved::Instance(param.token.clone(), value)
                    } else {
                        Resolved::Missing(param.token.clone())
                    }
                }
                InjectionKind::Deferred => {
                    let cell = Arc::new(DeferredCell::new(
                        param.token.clone(),
                        owner,
                        Arc::downgrade(&self.inner),
                        request,
                        path.clone(),
                    ));
                    match request {
                        Some(request) => request.track_deferred(&cell),
                        None if !self.inner.bootstrapped.load(Ordering::Acquire) => {
                            self.inner.pending.lock().push(Arc::downgrade(&cell));
                        }
                        None => {}
                    }
                    cells.push(cell.clone());
                    Resolved::Deferred(cell)
                }
            };
            values.push_back(resolved);
        }

        let module = self.inner.graph.module(owner).name().to_string();
        Ok((Injected::new(target.clone(), module, values), cells))
    }

    /// Constructs every singleton, modules in dependency-first order.
    pub(crate) async fn instantiate_singletons(&self) -> DiResult<usize> {
        let mut count = 0;
        for module in self.inner.graph.modules() {
            for (token, entry) in module.registry.entries() {
                if entry.lifetime != Lifetime::Singleton {
                    continue;
                }
                self.resolve_any(module.id, token, None, &ResolutionPath::new())
                    .await?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Binds every deferred cell created so far outside of a request.
    ///
    /// Cells whose target needs a request stay unbound and resolve on first
    /// use inside one.
    pub(crate) async fn bind_pending_deferred(&self) -> DiResult<usize> {
        let pending = std::mem::take(&mut *self.inner.pending.lock());
        let mut bound = 0;
        for cell in pending.iter().filter_map(Weak::upgrade) {
            match cell.resolve().await {
                Ok(_) => bound += 1,
                Err(DiError::RequestContextRequired(token)) => {
                    tracing::debug!(token = %token, "deferred reference needs a request scope and stays unbound outside one");
                }
                Err(err) => return Err(err),
            }
        }
        self.inner.bootstrapped.store(true, Ordering::Release);
        Ok(bound)
    }

    /// Constructed singletons of `module` with their descriptors, in
    /// registration order.
    pub(crate) fn singleton_instances(&self, module: ModuleId) -> Vec<(Arc<ProviderDescriptor>, AnyArc)> {
        let cells = &self.inner.singletons[module.0];
        self.inner
            .graph
            .module(module)
            .registry
            .entries()
            .filter_map(|(token, entry)| {
                let value = cells.get(token)?.get()?;
                Some((entry.descriptor.clone(), value.clone()))
            })
            .collect()
    }

    /// Number of constructed singletons across all modules.
    pub fn singleton_count(&self) -> usize {
        self.inner
            .singletons
            .iter()
            .flat_map(|cells| cells.values())
            .filter(|cell| cell.initialized())
            .count()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("modules", &self.inner.graph.len())
            .field("singletons", &self.singleton_count())
            .finish()
    }
}
