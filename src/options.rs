//! Container configuration

/// Default bound on alias chains.
pub const DEFAULT_MAX_ALIAS_HOPS: usize = 16;

/// Settings fixed when a container is created and shared by every handle forked from it.
///
/// # Examples
///
/// ```rust
/// use contextual_di::{Container, Options};
///
/// let container = Container::with_options(
///     Options::new()
///         .max_alias_hops(4)
///         .validate_arguments(false),
/// );
/// assert_eq!(container.options().max_alias_hops, 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Redirects allowed when following an alias chain.
    pub max_alias_hops: usize,
    /// Enforce the scope constraints declared by constructables.
    pub check_scope: bool,
    /// Type-check explicit arguments against declared parameter types.
    pub validate_arguments: bool,
}

impl Options {
    #[inline]
    pub const fn new() -> Self {
        Self {
            max_alias_hops: DEFAULT_MAX_ALIAS_HOPS,
            check_scope: true,
            validate_arguments: true,
        }
    }

    #[inline]
    pub const fn max_alias_hops(mut self, hops: usize) -> Self {
        self.max_alias_hops = hops;
        self
    }

    #[inline]
    pub const fn check_scope(mut self, enabled: bool) -> Self {
        self.check_scope = enabled;
        self
    }

    #[inline]
    pub const fn validate_arguments(mut self, enabled: bool) -> Self {
        self.validate_arguments = enabled;
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}
