//! Per-request resolution context.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;

use tokio_util::sync::CancellationToken;
use crate::error::{DiError, DiResult};
use crate::http::HttpRequest;
use crate::internal::AnyArc;
use crate::module::ModuleId;
use crate::token::Token;

use super::injected::DeferredCell;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

type Slot = Arc<OnceCell<AnyArc>>;

/// Cache of request-scoped instances for one inbound request.
///
/// Cloning is cheap and yields a handle to the same context. Instances are
/// dropped by [`release`](Self::release), which the dispatcher calls when the
/// request ends, whether it completed, failed, timed out or was cancelled.
///
/// # Examples
///
/// ```rust
/// use ferrous_nest::RequestContext;
///
/// let a = RequestContext::new(None);
/// let b = RequestContext::new(None);
/// assert_ne!(a.id(), b.id());
///
/// a.release();
/// assert!(a.is_released());
/// ```
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<RequestInner>,
}

pub(crate) struct RequestInner {
    id: u64,
    request: RwLock<Option<Arc<HttpRequest>>>,
    cancellation: CancellationToken,
    instances: Mutex<HashMap<(ModuleId, Token), Slot>>,
    deferred: Mutex<Vec<Weak<DeferredCell>>>,
    released: AtomicBool,
}

impl RequestContext {
    /// Creates a context, optionally bound to an HTTP request.
    ///
    /// The context shares the request's cancellation token.
    pub fn new(request: Option<Arc<HttpRequest>>) -> Self {
        let cancellation = request
            .as_ref()
            .map(|r| r.cancellation.clone())
            .unwrap_or_default();
        Self {
            inner: Arc::new(RequestInner {
                id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
                request: RwLock::new(request),
                cancellation,
                instances: Mutex::new(HashMap::new()),
                deferred: Mutex::new(Vec::new()),
                released: AtomicBool::new(false),
            }),
        }
    }

    /// Process-unique context id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The request this context serves, if any.
    pub fn request(&self) -> Option<Arc<HttpRequest>> {
        self.inner.request.read().clone()
    }

    // middleware may hand a rewritten request downstream
    pub(crate) fn bind_request(&self, request: Arc<HttpRequest>) {
        *self.inner.request.write() = Some(request);
    }

    /// Cancellation token of the request.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancellation
    }

    /// Number of request-scoped instances constructed so far.
    pub fn instance_count(&self) -> usize {
        self.inner
            .instances
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// Drops every request-scoped instance; later resolutions fail.
    pub fn release(&self) {
        self.inner.released.store(true, Ordering::Release);
        let instances = std::mem::take(&mut *self.inner.instances.lock());
        // deferred cells may close reference cycles between request instances
        for cell in std::mem::take(&mut *self.inner.deferred.lock()) {
            if let Some(cell) = cell.upgrade() {
                cell.unbind();
            }
        }
        tracing::trace!(request_id = self.inner.id, released = instances.len(), "request context released");
    }

    /// True once released.
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    pub(crate) fn slot(&self, module: ModuleId, token: &Token) -> DiResult<Slot> {
        if self.is_released() {
            return Err(DiError::RequestContextRequired(token.to_string()));
        }
        let mut instances = self.inner.instances.lock();
        Ok(instances
            .entry((module, token.clone()))
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone())
    }

    pub(crate) fn track_deferred(&self, cell: &Arc<DeferredCell>) {
        self.inner.deferred.lock().push(Arc::downgrade(cell));
    }

    pub(crate) fn downgrade(&self) -> Weak<RequestInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<RequestInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.inner.id)
            .field("released", &self.is_released())
            .finish()
    }
}
