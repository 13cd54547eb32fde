//! Error types for the container, module graph and bootstrap.

use thiserror::Error;

use crate::token::Token;

/// Container errors
///
/// Raised while scanning modules, validating the provider graph, resolving
/// providers or running lifecycle hooks. Request-time failures are expressed
/// as [`HttpError`](crate::http::HttpError); a `DiError` escaping into the
/// request pipeline is converted into a 500 response.
///
/// # Examples
///
/// ```rust
/// use ferrous_nest::DiError;
///
/// let err = DiError::CircularDependency {
///     path: vec!["ServiceA".into(), "ServiceB".into(), "ServiceA".into()],
/// };
/// assert_eq!(err.to_string(), "Circular dependency: ServiceA -> ServiceB -> ServiceA");
/// ```
#[derive(Debug, Clone, Error)]
pub enum DiError {
    /// No descriptor for the token is reachable from the resolving module
    #[error("Provider not found: {token} (resolving from module {module})")]
    ProviderNotFound {
        /// Token that was requested
        token: String,
        /// Module the resolution started from
        module: String,
    },
    /// A resolution path revisits a token without a deferred edge
    #[error("Circular dependency: {}", .path.join(" -> "))]
    CircularDependency {
        /// Tokens on the cycle, first and last entry identical
        path: Vec<String>,
    },
    /// Singleton depends on a request-bound provider without acknowledgment
    #[error("Ambiguous scope: singleton {singleton} depends on request-scoped {dependency}")]
    AmbiguousScope {
        /// The singleton provider
        singleton: String,
        /// The request-bound dependency
        dependency: String,
    },
    /// Request-scoped provider resolved outside of a request
    #[error("Request context required to resolve {0}")]
    RequestContextRequired(String),
    /// Type downcast failed
    #[error("Type mismatch for: {0}")]
    TypeMismatch(String),
    /// Same token registered twice in one module under the strict policy
    #[error("Duplicate provider {token} in module {module}")]
    DuplicateProvider {
        /// Token registered twice
        token: String,
        /// Module holding both registrations
        module: String,
    },
    /// Module exports a token it neither provides nor imports
    #[error("Module {module} cannot export {token}: it is neither provided nor imported")]
    UnknownExport {
        /// Exporting module
        module: String,
        /// Offending export
        token: String,
    },
    /// Module is not part of the scanned graph
    #[error("Unknown module: {0}")]
    UnknownModule(String),
    /// Constructor or factory returned an error
    #[error("Failed to construct {token}: {message}")]
    Construction {
        /// Provider being constructed
        token: String,
        /// Cause reported by the constructor
        message: String,
    },
    /// A lifecycle hook failed
    #[error("Lifecycle hook {hook} failed for {token}: {message}")]
    Lifecycle {
        /// Hook name
        hook: &'static str,
        /// Provider whose hook failed
        token: String,
        /// Cause reported by the hook
        message: String,
    },
    /// Route declaration cannot be mapped
    #[error("Invalid route {path}: {reason}")]
    InvalidRoute {
        /// Offending path template
        path: String,
        /// Why it was rejected
        reason: String,
    },
    /// Maximum recursion depth exceeded
    #[error("Max depth {0} exceeded")]
    DepthExceeded(usize),
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
    /// Application already shut down
    #[error("Application has been shut down")]
    ShutDown,
}

impl DiError {
    pub(crate) fn not_found(token: &Token, module: &str) -> Self {
        DiError::ProviderNotFound {
            token: token.to_string(),
            module: module.to_string(),
        }
    }

    /// Wraps an arbitrary constructor failure for `token`.
    pub fn construction(token: &Token, error: impl std::fmt::Display) -> Self {
        DiError::Construction {
            token: token.to_string(),
            message: error.to_string(),
        }
    }

    /// True for errors that describe an unsatisfiable graph rather than a
    /// failing constructor.
    pub fn is_graph_error(&self) -> bool {
        matches!(
            self,
            DiError::ProviderNotFound { .. }
                | DiError::CircularDependency { .. }
                | DiError::AmbiguousScope { .. }
                | DiError::UnknownExport { .. }
                | DiError::DuplicateProvider { .. }
        )
    }
}

/// Result type for container operations
pub type DiResult<T> = Result<T, DiError>;
