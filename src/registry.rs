//! Binding registry
//!
//! Each scope owns one [`Registry`]: identifier → [`Binding`] plus the injectors
//! registered in that scope. Uses DashMap with ahash so resolutions never block
//! each other; nothing here holds a map guard while user code runs.

use crate::factory::Constructor;
use crate::injector::InjectorSource;
use crate::{DiError, Identifier, Injectable, Instance, Result, Trace};
use ahash::RandomState;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// How a bound identifier is satisfied.
#[derive(Clone)]
pub enum Resolver {
    /// Autowire a declared constructable.
    Concrete(Identifier),
    /// Call a constructor with resolved arguments.
    Factory(Arc<Constructor>),
    /// Hand out a ready instance.
    Instance(Instance),
    /// Resolve another identifier instead.
    Alias(Identifier),
    /// Delegate construction to an injector.
    Injector(InjectorSource),
}

impl Resolver {
    /// Autowire `T`, which must be declared with the container.
    #[inline]
    pub fn concrete<T: 'static>() -> Self {
        Resolver::Concrete(Identifier::of::<T>())
    }

    #[inline]
    pub fn factory(constructor: Constructor) -> Self {
        Resolver::Factory(Arc::new(constructor))
    }

    /// Parameterless factory closure.
    pub fn from_fn<T, F>(build: F) -> Self
    where
        T: Injectable,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Resolver::factory(Constructor::from_fn(build))
    }

    #[inline]
    pub fn instance<T: Injectable>(value: T) -> Self {
        Resolver::Instance(Arc::new(value))
    }

    #[inline]
    pub fn alias(target: impl Into<Identifier>) -> Self {
        Resolver::Alias(target.into())
    }

    #[inline]
    pub fn injector(source: impl Into<InjectorSource>) -> Self {
        Resolver::Injector(source.into())
    }

    #[cfg(feature = "logging")]
    fn kind(&self) -> &'static str {
        match self {
            Resolver::Concrete(_) => "concrete",
            Resolver::Factory(_) => "factory",
            Resolver::Instance(_) => "instance",
            Resolver::Alias(_) => "alias",
            Resolver::Injector(_) => "injector",
        }
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolver::Concrete(id) => write!(f, "Concrete({id})"),
            Resolver::Factory(ctor) => write!(f, "Factory({})", ctor.target()),
            Resolver::Instance(_) => f.write_str("Instance(..)"),
            Resolver::Alias(id) => write!(f, "Alias({id})"),
            Resolver::Injector(source) => write!(f, "Injector({source:?})"),
        }
    }
}

/// A registered recipe plus its lifetime flag.
#[derive(Clone, Debug)]
pub struct Binding {
    resolver: Resolver,
    singleton: bool,
}

impl Binding {
    #[inline]
    pub fn new(resolver: Resolver, singleton: bool) -> Self {
        Self { resolver, singleton }
    }

    #[inline]
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.singleton
    }
}

/// Local bindings and injectors of one scope.
pub struct Registry {
    bindings: DashMap<Identifier, Binding, RandomState>,
    injectors: DashMap<Identifier, InjectorSource, RandomState>,
}

impl Registry {
    /// Create an empty registry with 8 shards.
    ///
    /// Scopes are created per request, so creation cost matters more than
    /// write concurrency here.
    #[inline]
    pub fn new() -> Self {
        Self {
            bindings: DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                RandomState::new(),
                8,
            ),
            injectors: DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                RandomState::new(),
                8,
            ),
        }
    }

    /// Register or overwrite a binding (last write wins).
    pub fn bind(&self, id: Identifier, resolver: Resolver, singleton: bool) {
        #[cfg(feature = "logging")]
        {
            debug!(
                target: "contextual_di",
                id = id.name(),
                kind = resolver.kind(),
                singleton = singleton,
                "Registering binding"
            );

            if let Resolver::Alias(target) = &resolver {
                if self.loops_back(&id, target) {
                    warn!(
                        target: "contextual_di",
                        id = id.name(),
                        alias = target.name(),
                        "Alias chain loops back to itself; resolving it will fail"
                    );
                }
            }
        }

        self.bindings.insert(id, Binding::new(resolver, singleton));
    }

    /// Whether following `target` inside this registry reaches `id` again.
    #[cfg(feature = "logging")]
    fn loops_back(&self, id: &Identifier, target: &Identifier) -> bool {
        if target == id {
            return false;
        }
        let mut seen = HashSet::with_hasher(RandomState::new());
        let mut current = target.clone();
        while seen.insert(current.clone()) {
            match self.bindings.get(&current).map(|b| b.resolver.clone()) {
                Some(Resolver::Alias(next)) if &next == id => return true,
                Some(Resolver::Alias(next)) => current = next,
                _ => return false,
            }
        }
        false
    }

    /// Whether `id` has a binding here. Does not look at parent scopes.
    #[inline]
    pub fn has(&self, id: &Identifier) -> bool {
        self.bindings.contains_key(id)
    }

    /// Clone of the binding for `id`.
    #[inline]
    pub fn binding(&self, id: &Identifier) -> Option<Binding> {
        self.bindings.get(id).map(|b| b.value().clone())
    }

    /// Follow aliases inside this registry until a non-alias binding is found.
    ///
    /// Returns `None` when the chain ends at an identifier with no binding here.
    pub fn resolve_binding(&self, id: &Identifier, max_hops: usize) -> Result<Option<Binding>> {
        follow_aliases(id, max_hops, |next| self.binding(next).map(|b| ((), b)))
            .map(|redirect| redirect.binding.map(|(_, terminal)| terminal.into_binding()))
            .map_err(|fault| fault.into_error(id, max_hops, Trace::empty()))
    }

    /// Remove a binding, returning it.
    pub fn unbind(&self, id: &Identifier) -> Option<Binding> {
        #[cfg(feature = "logging")]
        debug!(target: "contextual_di", id = id.name(), "Removing binding");

        self.bindings.remove(id).map(|(_, b)| b)
    }

    /// Register or replace the injector for `id`.
    pub fn set_injector(&self, id: Identifier, source: InjectorSource) {
        #[cfg(feature = "logging")]
        debug!(
            target: "contextual_di",
            id = id.name(),
            source = ?source,
            "Registering injector"
        );

        self.injectors.insert(id, source);
    }

    #[inline]
    pub fn injector(&self, id: &Identifier) -> Option<InjectorSource> {
        self.injectors.get(id).map(|s| s.value().clone())
    }

    #[inline]
    pub fn has_injector(&self, id: &Identifier) -> bool {
        self.injectors.contains_key(id)
    }

    pub fn remove_injector(&self, id: &Identifier) -> Option<InjectorSource> {
        self.injectors.remove(id).map(|(_, s)| s)
    }

    /// Copy every binding and injector of `other` that is not already present here.
    pub fn extend_from(&self, other: &Registry) {
        for entry in other.bindings.iter() {
            self.bindings
                .entry(entry.key().clone())
                .or_insert_with(|| entry.value().clone());
        }
        for entry in other.injectors.iter() {
            self.injectors
                .entry(entry.key().clone())
                .or_insert_with(|| entry.value().clone());
        }
    }

    /// Number of bindings.
    #[inline]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bound identifiers, in no particular order.
    pub fn ids(&self) -> Vec<Identifier> {
        self.bindings.iter().map(|e| e.key().clone()).collect()
    }

    pub fn clear(&self) {
        self.bindings.clear();
        self.injectors.clear();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("bindings", &self.bindings.len())
            .field("injectors", &self.injectors.len())
            .finish()
    }
}

/// Why an alias chain could not be followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AliasFault {
    Circular,
    TooManyRedirects,
}

impl AliasFault {
    pub(crate) fn into_error(self, id: &Identifier, limit: usize, trace: Trace) -> DiError {
        match self {
            AliasFault::Circular => DiError::CircularAlias {
                id: id.clone(),
                trace,
            },
            AliasFault::TooManyRedirects => DiError::TooManyRedirects {
                id: id.clone(),
                limit,
                trace,
            },
        }
    }
}

/// Any resolver except an alias: what an alias chain can end at.
#[derive(Clone)]
pub(crate) enum Recipe {
    Concrete(Identifier),
    Factory(Arc<Constructor>),
    Instance(Instance),
    Injector(InjectorSource),
}

impl Resolver {
    /// The recipe behind this resolver, or the identifier it redirects to.
    fn recipe(&self) -> std::result::Result<Recipe, &Identifier> {
        match self {
            Resolver::Concrete(id) => Ok(Recipe::Concrete(id.clone())),
            Resolver::Factory(ctor) => Ok(Recipe::Factory(Arc::clone(ctor))),
            Resolver::Instance(value) => Ok(Recipe::Instance(Arc::clone(value))),
            Resolver::Injector(source) => Ok(Recipe::Injector(source.clone())),
            Resolver::Alias(next) => Err(next),
        }
    }
}

impl From<Recipe> for Resolver {
    fn from(recipe: Recipe) -> Self {
        match recipe {
            Recipe::Concrete(id) => Resolver::Concrete(id),
            Recipe::Factory(ctor) => Resolver::Factory(ctor),
            Recipe::Instance(value) => Resolver::Instance(value),
            Recipe::Injector(source) => Resolver::Injector(source),
        }
    }
}

/// Non-alias binding an alias chain ended at.
#[derive(Clone)]
pub(crate) struct Terminal {
    pub(crate) recipe: Recipe,
    pub(crate) singleton: bool,
}

impl Terminal {
    pub(crate) fn into_binding(self) -> Binding {
        Binding::new(self.recipe.into(), self.singleton)
    }
}

/// Outcome of following an alias chain.
///
/// `O` tags where a binding was found (a scope, or `()` for a lone registry).
pub(crate) struct Redirect<O> {
    /// Identifier the chain ended at.
    pub(crate) target: Identifier,
    /// First non-alias binding on the chain and its owner.
    pub(crate) binding: Option<(O, Terminal)>,
    /// Owner and singleton flag of the binding for the starting identifier,
    /// when that binding was an alias.
    pub(crate) first_alias: Option<(O, bool)>,
}

/// Follow `Alias` bindings from `start` using `lookup`.
///
/// An alias that points at its own identifier is read as "autowire this
/// identifier". A repeated identifier is `Circular`; more than `max_hops`
/// redirects is `TooManyRedirects`.
pub(crate) fn follow_aliases<O>(
    start: &Identifier,
    max_hops: usize,
    mut lookup: impl FnMut(&Identifier) -> Option<(O, Binding)>,
) -> std::result::Result<Redirect<O>, AliasFault> {
    let mut visited = HashSet::with_hasher(RandomState::new());
    visited.insert(start.clone());

    let mut current = start.clone();
    let mut first_alias = None;
    let mut hops = 0usize;

    loop {
        let Some((owner, binding)) = lookup(&current) else {
            return Ok(Redirect {
                target: current,
                binding: None,
                first_alias,
            });
        };

        let singleton = binding.singleton;
        let next = match binding.resolver.recipe() {
            Ok(recipe) => {
                return Ok(Redirect {
                    target: current,
                    binding: Some((owner, Terminal { recipe, singleton })),
                    first_alias,
                });
            }
            Err(next) => next.clone(),
        };
        if next == current {
            let recipe = Recipe::Concrete(current.clone());
            return Ok(Redirect {
                target: current,
                binding: Some((owner, Terminal { recipe, singleton })),
                first_alias,
            });
        }

        if hops == 0 {
            first_alias = Some((owner, singleton));
        }
        if !visited.insert(next.clone()) {
            return Err(AliasFault::Circular);
        }
        hops += 1;
        if hops > max_hops {
            return Err(AliasFault::TooManyRedirects);
        }
        current = next;
    }
}
