//! Error types for dependency injection

use crate::{Identifier, Trace};
use thiserror::Error;

/// Boxed error returned by user constructors, factories and injectors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during dependency injection operations
///
/// Resolution errors carry the [`Trace`] captured where the failure happened.
#[derive(Error, Debug)]
pub enum DiError {
    /// No binding exists and the identifier is not a declared constructable
    #[error("Service not found: `{id}` (resolving {trace})")]
    NotFound { id: Identifier, trace: Trace },

    /// A required parameter has no explicit value, binding, default or null fallback
    #[error("Unable to resolve parameter `{parameter}` of `{target}` (resolving {trace})")]
    UnresolvableParameter {
        target: Identifier,
        parameter: String,
        trace: Trace,
        #[source]
        source: Option<Box<DiError>>,
    },

    /// An explicit argument does not fit the declared parameter
    #[error("Invalid argument `{parameter}` for `{target}`: {reason} (resolving {trace})")]
    InvalidArgument {
        target: Identifier,
        parameter: String,
        reason: String,
        trace: Trace,
    },

    /// The identifier is already being resolved further up the chain
    #[error("Recursive resolution of `{id}`: {trace}")]
    RecursiveResolution { id: Identifier, trace: Trace },

    /// A proxy was dereferenced while its own target is being resolved
    #[error("Recursive proxy dereference of `{id}` (resolving {trace})")]
    RecursiveProxy { id: Identifier, trace: Trace },

    /// The alias chain starting at `id` loops back on itself
    #[error("Circular alias detected for `{id}` (resolving {trace})")]
    CircularAlias { id: Identifier, trace: Trace },

    /// The alias chain starting at `id` exceeds the configured hop limit
    #[error("Too many alias redirects for `{id}` (limit {limit}, resolving {trace})")]
    TooManyRedirects {
        id: Identifier,
        limit: usize,
        trace: Trace,
    },

    /// `leave()` called with a handle that is not the innermost scope
    #[error("Scope mismatch: tried to leave {attempted} while {current} is the innermost scope")]
    ScopeMismatch { attempted: String, current: String },

    /// A type constrained to a named scope was resolved outside of it
    #[error("Type `{id}` must be resolved inside scope `{scope}` (resolving {trace})")]
    BadScope {
        id: Identifier,
        scope: String,
        trace: Trace,
    },

    /// The scope a proxy was created in has been left
    #[error("Proxy for `{id}` outlived its scope {scope}")]
    ProxyExpired { id: Identifier, scope: String },

    /// A custom injector failed or returned an instance of the wrong type
    #[error("Injector for `{id}` failed: {source} (resolving {trace})")]
    InjectorFailure {
        id: Identifier,
        trace: Trace,
        #[source]
        source: BoxError,
    },

    /// A constructor or factory returned an error
    #[error("Failed to create `{id}`: {source} (resolving {trace})")]
    CreationFailed {
        id: Identifier,
        trace: Trace,
        #[source]
        source: BoxError,
    },

    /// A resolved instance is not of the requested Rust type
    #[error("Instance bound to `{id}` is not a `{expected}`")]
    TypeMismatch {
        id: Identifier,
        expected: &'static str,
    },
}

impl DiError {
    /// Trace captured at the point of failure, if the error came from a resolution.
    pub fn trace(&self) -> Option<&Trace> {
        match self {
            Self::NotFound { trace, .. }
            | Self::UnresolvableParameter { trace, .. }
            | Self::InvalidArgument { trace, .. }
            | Self::RecursiveResolution { trace, .. }
            | Self::RecursiveProxy { trace, .. }
            | Self::CircularAlias { trace, .. }
            | Self::TooManyRedirects { trace, .. }
            | Self::BadScope { trace, .. }
            | Self::InjectorFailure { trace, .. }
            | Self::CreationFailed { trace, .. } => Some(trace),
            Self::ScopeMismatch { .. } | Self::ProxyExpired { .. } | Self::TypeMismatch { .. } => {
                None
            }
        }
    }

    /// Whether this is a `NotFound` error.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this is a `NotFound` error for exactly `id`.
    ///
    /// Optional parameters only fall back when their own type is missing, not when
    /// something deeper in the graph is.
    #[inline]
    pub(crate) fn is_not_found_for(&self, id: &Identifier) -> bool {
        matches!(self, Self::NotFound { id: missing, .. } if missing == id)
    }

    /// Create a TypeMismatch error for a typed lookup
    #[inline]
    pub fn type_mismatch<T: 'static>(id: &Identifier) -> Self {
        Self::TypeMismatch {
            id: id.clone(),
            expected: std::any::type_name::<T>(),
        }
    }

    /// Recover a `DiError` that user code passed back through a `BoxError`.
    pub(crate) fn from_boxed(
        error: BoxError,
        wrap: impl FnOnce(BoxError) -> DiError,
    ) -> DiError {
        match error.downcast::<DiError>() {
            Ok(inner) => *inner,
            Err(other) => wrap(other),
        }
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;
