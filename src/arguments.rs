//! Explicit call-site arguments and resolved constructor arguments

use crate::proxy::{Proxy, ProxyHandle};
use crate::{DiError, Identifier, Injectable, Instance, Result, Trace};
use ahash::RandomState;
use std::collections::HashMap;
use std::sync::Arc;

/// An explicit argument supplied to `make()`.
#[derive(Clone)]
pub enum Argument {
    /// A ready value.
    Value(Instance),
    /// Explicit null; only accepted by nullable parameters.
    Null,
    /// Resolve this identifier through the container when consumed.
    Reference(Identifier),
    /// Several values, for variadic parameters.
    List(Vec<Argument>),
}

impl Argument {
    /// Wrap a value.
    #[inline]
    pub fn value<T: Injectable>(value: T) -> Self {
        Argument::Value(Arc::new(value))
    }
}

impl std::fmt::Debug for Argument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Argument::Value(_) => f.write_str("Value(..)"),
            Argument::Null => f.write_str("Null"),
            Argument::Reference(id) => write!(f, "Reference({id})"),
            Argument::List(items) => f.debug_tuple("List").field(items).finish(),
        }
    }
}

/// Explicit arguments for a single `make()` call.
///
/// Keys are parameter names. An entry keyed by the name of a parameter's declared
/// type identifier applies to every parameter of that type.
///
/// # Examples
///
/// ```rust
/// use contextual_di::{Identifier, Parameters};
///
/// let params = Parameters::new()
///     .with_value("retries", 5u32)
///     .with_reference("store", Identifier::alias("cache.redis"))
///     .with_null("fallback");
///
/// assert_eq!(params.len(), 3);
/// ```
#[derive(Clone, Default, Debug)]
pub struct Parameters {
    entries: HashMap<String, Argument, RandomState>,
}

impl Parameters {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an argument.
    pub fn with(mut self, name: impl Into<String>, argument: Argument) -> Self {
        self.entries.insert(name.into(), argument);
        self
    }

    /// Set a value argument.
    pub fn with_value<T: Injectable>(self, name: impl Into<String>, value: T) -> Self {
        self.with(name, Argument::value(value))
    }

    /// Set an argument for every parameter declared as `T`.
    pub fn with_typed<T: Injectable>(self, value: T) -> Self {
        self.with(Identifier::of::<T>().name(), Argument::value(value))
    }

    /// Set a late-bound reference.
    pub fn with_reference(self, name: impl Into<String>, id: Identifier) -> Self {
        self.with(name, Argument::Reference(id))
    }

    /// Set an explicit null.
    pub fn with_null(self, name: impl Into<String>) -> Self {
        self.with(name, Argument::Null)
    }

    /// Set a list of values for a variadic parameter.
    pub fn with_list(self, name: impl Into<String>, items: Vec<Argument>) -> Self {
        self.with(name, Argument::List(items))
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Argument> {
        self.entries.get(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A resolved parameter value.
#[derive(Clone)]
pub(crate) enum Slot {
    Value(Instance),
    Null,
    Many(Vec<Instance>),
}

/// Resolved arguments handed to a constructor, in declaration order.
pub struct Arguments {
    target: Identifier,
    slots: Vec<(Arc<str>, Slot)>,
}

impl Arguments {
    pub(crate) fn new(target: Identifier, capacity: usize) -> Self {
        Self {
            target,
            slots: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, name: Arc<str>, slot: Slot) {
        self.slots.push((name, slot));
    }

    fn slot(&self, name: &str) -> Result<&Slot> {
        self.slots
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, slot)| slot)
            .ok_or_else(|| self.invalid(name, "no such parameter"))
    }

    fn invalid(&self, name: &str, reason: impl Into<String>) -> DiError {
        DiError::InvalidArgument {
            target: self.target.clone(),
            parameter: name.to_string(),
            reason: reason.into(),
            trace: Trace::empty(),
        }
    }

    fn downcast<T: Injectable>(&self, name: &str, value: &Instance) -> Result<Arc<T>> {
        Arc::clone(value)
            .downcast::<T>()
            .map_err(|_| self.invalid(name, format!("expected `{}`", std::any::type_name::<T>())))
    }

    /// The constructable these arguments were resolved for.
    #[inline]
    pub fn target(&self) -> &Identifier {
        &self.target
    }

    /// A required value.
    pub fn get<T: Injectable>(&self, name: &str) -> Result<Arc<T>> {
        match self.slot(name)? {
            Slot::Value(value) => self.downcast(name, value),
            Slot::Null => Err(self.invalid(name, "resolved to null")),
            Slot::Many(_) => Err(self.invalid(name, "variadic parameter")),
        }
    }

    /// A value that may have resolved to null.
    pub fn optional<T: Injectable>(&self, name: &str) -> Result<Option<Arc<T>>> {
        match self.slot(name)? {
            Slot::Value(value) => self.downcast(name, value).map(Some),
            Slot::Null => Ok(None),
            Slot::Many(_) => Err(self.invalid(name, "variadic parameter")),
        }
    }

    /// A cloned plain value (defaults, scalars).
    pub fn value<T: Injectable + Clone>(&self, name: &str) -> Result<T> {
        self.get::<T>(name).map(|v| (*v).clone())
    }

    /// All values collected by a variadic parameter.
    pub fn variadic<T: Injectable>(&self, name: &str) -> Result<Vec<Arc<T>>> {
        match self.slot(name)? {
            Slot::Many(values) => values.iter().map(|v| self.downcast(name, v)).collect(),
            Slot::Value(value) => Ok(vec![self.downcast(name, value)?]),
            Slot::Null => Ok(Vec::new()),
        }
    }

    /// A deferred handle for a proxy parameter.
    pub fn proxy<T: Injectable>(&self, name: &str) -> Result<Proxy<T>> {
        let handle = self.get::<ProxyHandle>(name)?;
        Ok(Proxy::from_handle((*handle).clone()))
    }

    /// The raw type-erased value.
    pub fn raw(&self, name: &str) -> Option<&Instance> {
        match self.slot(name).ok()? {
            Slot::Value(value) => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl std::fmt::Debug for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arguments")
            .field("target", &self.target)
            .field(
                "names",
                &self.slots.iter().map(|(n, _)| &**n).collect::<Vec<_>>(),
            )
            .finish()
    }
}
