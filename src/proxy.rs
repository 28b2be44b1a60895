//! Deferred handles
//!
//! A proxy captures an identifier and the scope that was current when it was
//! made. Creating one never resolves anything; each [`Proxy::resolve`] resolves
//! the identifier against the scope that is current *at that call*. Two things
//! short-circuit that:
//!
//! - a singleton already cached in the creation scope is reused;
//! - once the creation scope has been left the proxy is dead and every call
//!   fails with [`DiError::ProxyExpired`].
//!
//! Dereferencing a proxy while its own target is still being built fails with
//! [`DiError::RecursiveProxy`] instead of recursing.

use crate::scope::Scope;
use crate::{Container, DiError, Identifier, Injectable, Instance, Result};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

/// Type-erased proxy, as handed to proxy parameters.
#[derive(Clone)]
pub struct ProxyHandle {
    id: Identifier,
    scope: Weak<Scope>,
    scope_label: Arc<str>,
}

impl ProxyHandle {
    pub(crate) fn new(id: Identifier, scope: &Arc<Scope>) -> Self {
        Self {
            id,
            scope: Arc::downgrade(scope),
            scope_label: Arc::from(scope.to_string()),
        }
    }

    #[inline]
    pub fn identifier(&self) -> &Identifier {
        &self.id
    }

    /// Whether the creation scope is still active.
    pub fn is_valid(&self) -> bool {
        self.scope.upgrade().is_some_and(|s| s.is_active())
    }

    /// Resolve through `container`.
    pub fn resolve(&self, container: &Container) -> Result<Instance> {
        container.deref_proxy(self)
    }

    /// The creation scope, or `ProxyExpired` if it has been left.
    pub(crate) fn creation_scope(&self) -> Result<Arc<Scope>> {
        self.scope
            .upgrade()
            .filter(|s| s.is_active())
            .ok_or_else(|| DiError::ProxyExpired {
                id: self.id.clone(),
                scope: self.scope_label.to_string(),
            })
    }
}

impl fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProxyHandle({} in {})", self.id, self.scope_label)
    }
}

/// Typed deferred handle.
///
/// # Examples
///
/// ```rust
/// use contextual_di::{Container, Identifier, Resolver};
///
/// let container = Container::new();
/// let later = container.proxy_of::<String>();
///
/// container.bind(Identifier::of::<String>(), Resolver::instance(String::from("ready")));
/// assert_eq!(*later.resolve(&container).unwrap(), "ready");
/// ```
pub struct Proxy<T> {
    handle: ProxyHandle,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Injectable> Proxy<T> {
    pub(crate) fn from_handle(handle: ProxyHandle) -> Self {
        Self {
            handle,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn identifier(&self) -> &Identifier {
        self.handle.identifier()
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.handle.is_valid()
    }

    #[inline]
    pub fn handle(&self) -> &ProxyHandle {
        &self.handle
    }

    /// Resolve the target through `container`.
    pub fn resolve(&self, container: &Container) -> Result<Arc<T>> {
        self.handle
            .resolve(container)?
            .downcast::<T>()
            .map_err(|_| DiError::type_mismatch::<T>(self.handle.identifier()))
    }
}

impl<T> Clone for Proxy<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Proxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Proxy").field(&self.handle).finish()
    }
}
