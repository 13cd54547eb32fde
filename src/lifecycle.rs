//! Application lifecycle hooks.

use async_trait::async_trait;

use crate::error::DiResult;

/// Lifecycle hooks a provider may opt into with
/// [`ProviderDescriptor::with_hooks`](crate::ProviderDescriptor::with_hooks).
///
/// Init hooks run once after every module is scanned and before the
/// application serves traffic: `on_module_init` for all providers, then
/// `on_application_bootstrap` for all providers, modules visited
/// dependency-first. Shutdown hooks run in reverse module order:
/// `on_module_destroy`, then `before_application_shutdown`, then
/// `on_application_shutdown`, the last two receiving the triggering signal.
///
/// # Examples
///
/// ```rust
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use async_trait::async_trait;
/// use ferrous_nest::{DiResult, LifecycleHooks};
///
/// struct Pool {
///     open: AtomicBool,
/// }
///
/// #[async_trait]
/// impl LifecycleHooks for Pool {
///     async fn on_module_init(&self) -> DiResult<()> {
///         self.open.store(true, Ordering::SeqCst);
///         Ok(())
///     }
///
///     async fn on_application_shutdown(&self, _signal: Option<&str>) -> DiResult<()> {
///         self.open.store(false, Ordering::SeqCst);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// The declaring module's providers are resolved.
    async fn on_module_init(&self) -> DiResult<()> {
        Ok(())
    }

    /// Every module is initialized.
    async fn on_application_bootstrap(&self) -> DiResult<()> {
        Ok(())
    }

    /// Shutdown started.
    async fn on_module_destroy(&self) -> DiResult<()> {
        Ok(())
    }

    /// Every `on_module_destroy` hook completed.
    async fn before_application_shutdown(&self, signal: Option<&str>) -> DiResult<()> {
        let _ = signal;
        Ok(())
    }

    /// Last hook before the container is dropped.
    async fn on_application_shutdown(&self, signal: Option<&str>) -> DiResult<()> {
        let _ = signal;
        Ok(())
    }
}

/// Application lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Built, init hooks not yet run
    Created,
    /// Init hooks running
    Initializing,
    /// Serving
    Running,
    /// Shutdown hooks running
    ShuttingDown,
    /// Shutdown complete
    Stopped,
}

impl LifecycleState {
    /// True once shutdown has started.
    pub fn is_shutting_down(self) -> bool {
        matches!(self, LifecycleState::ShuttingDown | LifecycleState::Stopped)
    }
}

/// Hook names used in errors and logs.
pub(crate) mod hook {
    pub const ON_MODULE_INIT: &str = "on_module_init";
    pub const ON_APPLICATION_BOOTSTRAP: &str = "on_application_bootstrap";
    pub const ON_MODULE_DESTROY: &str = "on_module_destroy";
    pub const BEFORE_APPLICATION_SHUTDOWN: &str = "before_application_shutdown";
    pub const ON_APPLICATION_SHUTDOWN: &str = "on_application_shutdown";
}
