//! Injector protocol
//!
//! An injector fully owns construction of an identifier: the container hands it
//! the requested identifier and the call-site context (a parameter name, or a
//! token passed to `get_with_context`) and takes whatever it returns. Injectors
//! win over bindings and autowiring for the identifiers they are registered for.

use crate::{BoxError, Container, Identifier, Injectable, Instance};
use std::sync::Arc;

/// Factory delegate for context-sensitive instances.
///
/// # Examples
///
/// ```rust
/// use contextual_di::{BoxError, Container, Identifier, Injector, Instance};
/// use std::sync::Arc;
///
/// struct Logger { channel: String }
///
/// struct LoggerInjector;
///
/// impl Injector for LoggerInjector {
///     fn create_injection(
///         &self,
///         _container: &Container,
///         _requested: &Identifier,
///         context: Option<&str>,
///     ) -> Result<Instance, BoxError> {
///         let channel = context.unwrap_or("default").to_string();
///         Ok(Arc::new(Logger { channel }))
///     }
/// }
///
/// let container = Container::new();
/// container.register_injector(Identifier::of::<Logger>(), LoggerInjector);
///
/// let audit = container
///     .get_with_context(Identifier::of::<Logger>(), "audit")
///     .unwrap();
/// assert_eq!(audit.downcast_ref::<Logger>().unwrap().channel, "audit");
/// ```
pub trait Injector: Send + Sync + 'static {
    /// Build an instance for `requested` at the call site described by `context`.
    fn create_injection(
        &self,
        container: &Container,
        requested: &Identifier,
        context: Option<&str>,
    ) -> Result<Instance, BoxError>;
}

impl<F> Injector for F
where
    F: Fn(&Container, &Identifier, Option<&str>) -> Result<Instance, BoxError>
        + Send
        + Sync
        + 'static,
{
    fn create_injection(
        &self,
        container: &Container,
        requested: &Identifier,
        context: Option<&str>,
    ) -> Result<Instance, BoxError> {
        self(container, requested, context)
    }
}

/// Where an injector comes from.
#[derive(Clone)]
pub enum InjectorSource {
    /// A ready injector.
    Instance(Arc<dyn Injector>),
    /// An identifier resolved through the container; the instance must be an
    /// `Arc<dyn Injector>` (see [`injector_instance`]).
    Binding(Identifier),
}

impl InjectorSource {
    /// Wrap a ready injector.
    pub fn instance<I: Injector>(injector: I) -> Self {
        InjectorSource::Instance(Arc::new(injector))
    }
}

impl<I: Injector> From<I> for InjectorSource {
    fn from(injector: I) -> Self {
        InjectorSource::instance(injector)
    }
}

impl From<Identifier> for InjectorSource {
    fn from(id: Identifier) -> Self {
        InjectorSource::Binding(id)
    }
}

impl std::fmt::Debug for InjectorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InjectorSource::Instance(_) => f.write_str("InjectorSource::Instance(..)"),
            InjectorSource::Binding(id) => write!(f, "InjectorSource::Binding({id})"),
        }
    }
}

/// Erase an injector so it can be bound and resolved like any other service.
///
/// Used with [`InjectorSource::Binding`] when the injector itself is managed by
/// the container (for example bound as a singleton).
pub fn injector_instance<I: Injector>(injector: I) -> Instance {
    Arc::new(Arc::new(injector) as Arc<dyn Injector>)
}

/// Recover an injector from a resolved instance.
pub(crate) fn as_injector(instance: Instance) -> Option<Arc<dyn Injector>> {
    instance
        .downcast::<Arc<dyn Injector>>()
        .ok()
        .map(|inner| Arc::clone(&*inner))
}

/// Whether an injector result fits the identifier it was asked for.
pub(crate) fn accepts(requested: &Identifier, instance: &Instance) -> bool {
    requested.accepts(instance)
}

/// Helper for injectors that always build the same kind of value.
pub fn injector_fn<T, F>(build: F) -> impl Injector
where
    T: Injectable,
    F: Fn(Option<&str>) -> T + Send + Sync + 'static,
{
    move |_: &Container, _: &Identifier, context: Option<&str>| -> Result<Instance, BoxError> {
        Ok(Arc::new(build(context)))
    }
}
