//! Provider lifetime definitions.

use serde::{Deserialize, Serialize};

/// Provider lifetimes controlling instance caching behavior
///
/// # Lifetime Characteristics
///
/// - **Singleton**: one instance per declaring module, created at most once
/// - **Request**: one instance per request context, released when it ends
/// - **Transient**: a new instance for every resolution
///
/// Controllers default to `Transient`; every other provider defaults to
/// `Singleton` unless its descriptor says otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifetime {
    /// Single instance per (module, token), cached for the application lifetime
    ///
    /// Construction is serialized per token, so concurrent first resolutions
    /// from simultaneous requests observe the same instance.
    #[default]
    Singleton,
    /// Single instance per (token, request context)
    ///
    /// Resolving a request-scoped provider outside of a request fails with
    /// [`DiError::RequestContextRequired`](crate::DiError::RequestContextRequired).
    Request,
    /// New instance per resolution, never cached
    Transient,
}

impl Lifetime {
    /// True when instances of this lifetime may hold per-request state.
    pub fn is_request_bound(self) -> bool {
        matches!(self, Lifetime::Request)
    }

    /// Lower-case name used in log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Lifetime::Singleton => "singleton",
            Lifetime::Request => "request",
            Lifetime::Transient => "transient",
        }
    }
}

impl std::fmt::Display for Lifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
