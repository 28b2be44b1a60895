//! Constructors: how instances are built
//!
//! A [`Constructor`] pairs a parameter list with a type-erased build function.
//! It is what the container calls once every parameter has been resolved,
//! whether the recipe came from an [`Autowire`] type, a factory closure or an
//! invoked callable.

use crate::reflect::ParameterRequest;
use crate::{Arguments, Autowire, BoxError, Identifier, Injectable, Instance};
use std::sync::Arc;

/// Type-erased build function
type BuildFn = Arc<dyn Fn(&Arguments) -> Result<Instance, BoxError> + Send + Sync>;

/// Type-erased finalizer
pub(crate) type FinalizeFn = Arc<dyn Fn(&Instance) + Send + Sync>;

/// Recipe for building one identifier.
///
/// # Examples
///
/// ```rust
/// use contextual_di::{Constructor, Container, Identifier, ParameterRequest, Resolver};
///
/// #[derive(Debug)]
/// struct Pool { size: usize }
///
/// let pool = Constructor::factory(
///     Identifier::of::<Pool>(),
///     vec![ParameterRequest::new("size").with_default(4usize)],
///     |args| Ok::<_, contextual_di::DiError>(Pool { size: args.value("size")? }),
/// );
///
/// let container = Container::new();
/// container.bind_singleton(Identifier::of::<Pool>(), Resolver::factory(pool));
/// assert_eq!(container.resolve::<Pool>().unwrap().size, 4);
/// ```
#[derive(Clone)]
pub struct Constructor {
    target: Identifier,
    parameters: Arc<[ParameterRequest]>,
    build: BuildFn,
    singleton: bool,
    scope: Option<Arc<str>>,
    finalizer: Option<FinalizeFn>,
}

impl Constructor {
    /// Constructor of an [`Autowire`] type; the parameter list is computed here, once.
    pub fn of<T: Autowire>() -> Self {
        let mut constructor = Self::factory(Identifier::of::<T>(), T::parameters(), T::construct);
        constructor.singleton = T::SINGLETON;
        constructor.scope = T::SCOPE.map(Arc::from);
        if T::FINALIZE {
            constructor = constructor.on_finalize(|instance: &T| instance.finalize());
        }
        constructor
    }

    /// Constructor from a closure receiving resolved arguments.
    pub fn factory<T, E, F>(target: Identifier, parameters: Vec<ParameterRequest>, build: F) -> Self
    where
        T: Injectable,
        E: Into<BoxError>,
        F: Fn(&Arguments) -> Result<T, E> + Send + Sync + 'static,
    {
        Self {
            target,
            parameters: parameters.into(),
            build: Arc::new(move |args| {
                build(args)
                    .map(|v| Arc::new(v) as Instance)
                    .map_err(Into::into)
            }),
            singleton: false,
            scope: None,
            finalizer: None,
        }
    }

    /// Constructor from a closure returning an already erased instance.
    pub fn erased<F>(target: Identifier, parameters: Vec<ParameterRequest>, build: F) -> Self
    where
        F: Fn(&Arguments) -> Result<Instance, BoxError> + Send + Sync + 'static,
    {
        Self {
            target,
            parameters: parameters.into(),
            build: Arc::new(build),
            singleton: false,
            scope: None,
            finalizer: None,
        }
    }

    /// Parameterless constructor for `T`.
    pub fn from_fn<T, F>(build: F) -> Self
    where
        T: Injectable,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::factory(Identifier::of::<T>(), Vec::new(), move |_| {
            Ok::<_, BoxError>(build())
        })
    }

    /// Declare the constructed value a singleton.
    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    /// Require resolution inside a scope with this name.
    pub fn in_scope(mut self, name: impl Into<Arc<str>>) -> Self {
        self.scope = Some(name.into());
        self
    }

    /// Run `finalize` on each built instance when its scope is left.
    pub fn on_finalize<T, F>(mut self, finalize: F) -> Self
    where
        T: Injectable,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.finalizer = Some(Arc::new(move |instance: &Instance| {
            if let Some(value) = instance.downcast_ref::<T>() {
                finalize(value);
            }
        }));
        self
    }

    #[inline]
    pub fn target(&self) -> &Identifier {
        &self.target
    }

    #[inline]
    pub fn parameters(&self) -> &[ParameterRequest] {
        &self.parameters
    }

    #[inline]
    pub(crate) fn parameters_shared(&self) -> Arc<[ParameterRequest]> {
        Arc::clone(&self.parameters)
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    #[inline]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    #[inline]
    pub(crate) fn finalizer(&self) -> Option<&FinalizeFn> {
        self.finalizer.as_ref()
    }

    #[inline]
    pub(crate) fn build(&self, args: &Arguments) -> Result<Instance, BoxError> {
        (self.build)(args)
    }
}

impl std::fmt::Debug for Constructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Constructor")
            .field("target", &self.target)
            .field("parameters", &self.parameters)
            .field("singleton", &self.singleton)
            .field("scope", &self.scope)
            .field("finalizer", &self.finalizer.is_some())
            .finish()
    }
}
