//! Constructor metadata
//!
//! Rust has no runtime reflection, so constructables describe their formal
//! parameters as data: an ordered list of [`ParameterRequest`]s, computed once
//! when the type is declared and shared by every later resolution. The
//! [`Catalog`] maps identifiers of declared types to their constructors and is
//! what "autowiring a concrete type" consults.

use crate::factory::Constructor;
use crate::{Identifier, Injectable, Instance};
use ahash::RandomState;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Declared type of a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    /// No declared type: only explicit arguments and defaults can satisfy it.
    Any,
    /// A single type or alias.
    Named(Identifier),
    /// Several alternatives, tried in order.
    Union(Vec<Identifier>),
}

impl ParamType {
    /// Identifiers the container may resolve for this type, in order.
    pub fn candidates(&self) -> &[Identifier] {
        match self {
            ParamType::Any => &[],
            ParamType::Named(id) => std::slice::from_ref(id),
            ParamType::Union(ids) => ids,
        }
    }
}

/// One formal parameter of a constructor or factory.
///
/// # Examples
///
/// ```rust
/// use contextual_di::{Identifier, ParameterRequest};
///
/// struct Database;
///
/// let db = ParameterRequest::of::<Database>("db");
/// let retries = ParameterRequest::new("retries").with_default(3u32);
/// let replica = ParameterRequest::of::<Database>("replica")
///     .hint(Identifier::alias("db.replica"))
///     .nullable();
///
/// assert_eq!(db.declared_type(), Some(&Identifier::of::<Database>()));
/// assert!(retries.has_default());
/// assert!(replica.is_nullable());
/// ```
#[derive(Clone)]
pub struct ParameterRequest {
    name: Arc<str>,
    param_type: ParamType,
    default: Option<Instance>,
    nullable: bool,
    variadic: bool,
    proxy: bool,
    hint: Option<Identifier>,
}

impl ParameterRequest {
    /// Untyped parameter.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            param_type: ParamType::Any,
            default: None,
            nullable: false,
            variadic: false,
            proxy: false,
            hint: None,
        }
    }

    /// Parameter declared as the Rust type `T`.
    pub fn of<T: Injectable>(name: impl Into<Arc<str>>) -> Self {
        Self::typed(name, Identifier::of::<T>())
    }

    /// Parameter declared with an arbitrary identifier.
    pub fn typed(name: impl Into<Arc<str>>, id: Identifier) -> Self {
        Self {
            param_type: ParamType::Named(id),
            ..Self::new(name)
        }
    }

    /// Parameter accepting any of several identifiers.
    pub fn union(name: impl Into<Arc<str>>, ids: impl IntoIterator<Item = Identifier>) -> Self {
        Self {
            param_type: ParamType::Union(ids.into_iter().collect()),
            ..Self::new(name)
        }
    }

    /// Value used when nothing else resolves.
    pub fn with_default<T: Injectable>(mut self, value: T) -> Self {
        self.default = Some(Arc::new(value));
        self
    }

    /// Pre-erased default value.
    pub fn with_default_instance(mut self, value: Instance) -> Self {
        self.default = Some(value);
        self
    }

    /// Yield null instead of failing when the type is missing.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Collects explicit arguments only; never autowired.
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Receive a deferred [`Proxy`](crate::Proxy) instead of a resolved instance.
    pub fn proxy(mut self) -> Self {
        self.proxy = true;
        self
    }

    /// Resolve this identifier instead of the declared type.
    pub fn hint(mut self, id: Identifier) -> Self {
        self.hint = Some(id);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn param_type(&self) -> &ParamType {
        &self.param_type
    }

    /// The single declared type, if the parameter has one.
    pub fn declared_type(&self) -> Option<&Identifier> {
        match &self.param_type {
            ParamType::Named(id) => Some(id),
            _ => None,
        }
    }

    #[inline]
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    #[inline]
    pub fn default_value(&self) -> Option<&Instance> {
        self.default.as_ref()
    }

    #[inline]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[inline]
    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    #[inline]
    pub fn is_proxy(&self) -> bool {
        self.proxy
    }

    #[inline]
    pub fn contextual_hint(&self) -> Option<&Identifier> {
        self.hint.as_ref()
    }

    /// Identifiers to try, honouring the contextual hint.
    pub fn lookup_order(&self) -> &[Identifier] {
        match &self.hint {
            Some(hint) => std::slice::from_ref(hint),
            None => self.param_type.candidates(),
        }
    }

    /// Whether an explicit value fits the declared type.
    ///
    /// Types without a recorded `TypeId` (aliases, untyped parameters) accept anything.
    pub fn accepts(&self, value: &Instance) -> bool {
        let candidates = self.param_type.candidates();
        candidates.is_empty() || candidates.iter().any(|id| id.accepts(value))
    }
}

impl fmt::Debug for ParameterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterRequest")
            .field("name", &self.name)
            .field("param_type", &self.param_type)
            .field("has_default", &self.default.is_some())
            .field("nullable", &self.nullable)
            .field("variadic", &self.variadic)
            .field("proxy", &self.proxy)
            .field("hint", &self.hint)
            .finish()
    }
}

/// Declared constructables, keyed by identifier.
pub(crate) struct Catalog {
    constructors: DashMap<Identifier, Arc<Constructor>, RandomState>,
}

impl Catalog {
    pub(crate) fn new() -> Self {
        Self {
            constructors: DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                RandomState::new(),
                8,
            ),
        }
    }

    pub(crate) fn declare(&self, constructor: Constructor) {
        #[cfg(feature = "logging")]
        debug!(
            target: "contextual_di",
            constructable = constructor.target().name(),
            parameters = constructor.parameters().len(),
            "Declaring constructable"
        );

        self.constructors
            .insert(constructor.target().clone(), Arc::new(constructor));
    }

    pub(crate) fn get(&self, id: &Identifier) -> Option<Arc<Constructor>> {
        self.constructors.get(id).map(|c| Arc::clone(c.value()))
    }

    pub(crate) fn contains(&self, id: &Identifier) -> bool {
        self.constructors.contains_key(id)
    }

    /// Parameter list of a declared constructable.
    pub(crate) fn describe(&self, id: &Identifier) -> Option<Arc<[ParameterRequest]>> {
        self.constructors.get(id).map(|c| c.parameters_shared())
    }
}
