//! Observation hooks for provider resolution.

use std::sync::Arc;
use std::time::Duration;

use crate::error::DiError;
use crate::token::Token;

/// Where a resolution happens.
#[derive(Debug, Clone)]
pub struct ObservationContext {
    /// Module the provider is owned by
    pub module: String,
    /// Request context id, `None` outside of a request
    pub request_id: Option<u64>,
    /// Nesting depth in the current resolution chain
    pub depth: usize,
}

/// Observer for provider construction.
///
/// Called around every construction (cache hits are not reported). Calls are
/// synchronous on the resolving task, so keep implementations cheap.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::time::Duration;
/// use ferrous_nest::{DiError, DiObserver, ObservationContext, Token};
///
/// #[derive(Default)]
/// struct CountingObserver {
///     constructed: AtomicUsize,
/// }
///
/// impl DiObserver for CountingObserver {
///     fn resolving(&self, _: &Token, _: &ObservationContext) {}
///
///     fn resolved(&self, _: &Token, _: Duration, _: &ObservationContext) {
///         self.constructed.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait DiObserver: Send + Sync {
    /// A provider is about to be constructed.
    fn resolving(&self, token: &Token, context: &ObservationContext);

    /// A provider was constructed in `duration`.
    fn resolved(&self, token: &Token, duration: Duration, context: &ObservationContext);

    /// Construction failed.
    fn failed(&self, token: &Token, error: &DiError, context: &ObservationContext) {
        let _ = (token, error, context);
    }
}

#[derive(Default, Clone)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn DiObserver>>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Arc<dyn DiObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    pub(crate) fn resolving(&self, token: &Token, context: &ObservationContext) {
        for observer in &self.observers {
            observer.resolving(token, context);
        }
    }

    pub(crate) fn resolved(&self, token: &Token, duration: Duration, context: &ObservationContext) {
        for observer in &self.observers {
            observer.resolved(token, duration, context);
        }
    }

    pub(crate) fn failed(&self, token: &Token, error: &DiError, context: &ObservationContext) {
        for observer in &self.observers {
            observer.failed(token, error, context);
        }
    }
}

/// Observer that forwards construction events to `tracing`.
///
/// Events are emitted at `TRACE` level under the `ferrous_nest::resolve`
/// target; failures at `WARN`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl DiObserver for TracingObserver {
    fn resolving(&self, token: &Token, context: &ObservationContext) {
        tracing::trace!(
            target: "ferrous_nest::resolve",
            token = %token,
            module = %context.module,
            request_id = ?context.request_id,
            depth = context.depth,
            "constructing provider"
        );
    }

    fn resolved(&self, token: &Token, duration: Duration, context: &ObservationContext) {
        tracing::trace!(
            target: "ferrous_nest::resolve",
            token = %token,
            module = %context.module,
            elapsed_us = duration.as_micros() as u64,
            "provider constructed"
        );
    }

    fn failed(&self, token: &Token, error: &DiError, context: &ObservationContext) {
        tracing::warn!(
            target: "ferrous_nest::resolve",
            token = %token,
            module = %context.module,
            error = %error,
            "provider construction failed"
        );
    }
}
