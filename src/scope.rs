//! Scopes and the scope stack
//!
//! A [`Scope`] is one named execution context: its own registry of local
//! bindings, its own singleton cache and the finalizers of instances that belong
//! to it. Every container handle owns its own active path from the root scope to
//! the innermost one; lookups walk that path innermost first, so sibling scopes
//! never see each other.

use crate::factory::FinalizeFn;
use crate::injector::{Injector, InjectorSource};
use crate::registry::{Binding, Registry, Resolver};
use crate::{Container, Identifier, Injectable, Instance, Result};
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

#[cfg(feature = "logging")]
use tracing::{debug, error};

/// Name given to the root scope of every container.
pub const ROOT_SCOPE: &str = "root";

/// A named execution context.
pub struct Scope {
    id: u64,
    name: Arc<str>,
    depth: usize,
    parent: Option<Weak<Scope>>,
    registry: Registry,
    singletons: DashMap<Identifier, Arc<OnceCell<Instance>>, RandomState>,
    injectors: DashMap<Identifier, Arc<dyn Injector>, RandomState>,
    finalizers: Mutex<Vec<(FinalizeFn, Instance)>>,
    active: AtomicBool,
}

impl Scope {
    fn next_id() -> u64 {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }

    fn build(name: Arc<str>, depth: usize, parent: Option<Weak<Scope>>) -> Self {
        Self {
            id: Self::next_id(),
            name,
            depth,
            parent,
            registry: Registry::new(),
            singletons: DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                RandomState::new(),
                8,
            ),
            injectors: DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                RandomState::new(),
                8,
            ),
            finalizers: Mutex::new(Vec::new()),
            active: AtomicBool::new(true),
        }
    }

    pub(crate) fn root() -> Arc<Self> {
        Arc::new(Self::build(Arc::from(ROOT_SCOPE), 0, None))
    }

    pub(crate) fn child(parent: &Arc<Scope>, name: Arc<str>) -> Arc<Self> {
        Arc::new(Self::build(
            name,
            parent.depth + 1,
            Some(Arc::downgrade(parent)),
        ))
    }

    /// Process-unique scope id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Distance from the root scope.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The enclosing scope, while it is alive.
    pub fn parent(&self) -> Option<Arc<Scope>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Local bindings of this scope.
    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// False once the scope has been left.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// The singleton cached here for `id`, if it has been created.
    pub fn cached(&self, id: &Identifier) -> Option<Instance> {
        self.singletons
            .get(id)
            .and_then(|cell| cell.get().cloned())
    }

    /// Number of singletons materialised in this scope.
    pub fn cached_len(&self) -> usize {
        self.singletons.iter().filter(|c| c.get().is_some()).count()
    }

    /// Cell holding the singleton for `id`. The map guard is released before
    /// the caller initialises the cell.
    pub(crate) fn singleton_cell(&self, id: &Identifier) -> Arc<OnceCell<Instance>> {
        if let Some(cell) = self.singletons.get(id) {
            return Arc::clone(cell.value());
        }
        Arc::clone(
            self.singletons
                .entry(id.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        )
    }

    pub(crate) fn cached_injector(&self, id: &Identifier) -> Option<Arc<dyn Injector>> {
        self.injectors.get(id).map(|i| Arc::clone(i.value()))
    }

    pub(crate) fn cache_injector(&self, id: Identifier, injector: Arc<dyn Injector>) {
        self.injectors.insert(id, injector);
    }

    pub(crate) fn forget_injector(&self, id: &Identifier) {
        self.injectors.remove(id);
    }

    /// Drop whatever this scope materialised for `id`: its singleton and the
    /// injector resolved for it. Returns whether a singleton was evicted.
    pub(crate) fn forget(&self, id: &Identifier) -> bool {
        self.forget_injector(id);
        let evicted = self
            .singletons
            .remove(id)
            .is_some_and(|(_, cell)| cell.get().is_some());

        #[cfg(feature = "logging")]
        {
            if evicted {
                debug!(
                    target: "contextual_di",
                    id = id.name(),
                    scope = %self,
                    "Evicting cached singleton"
                );
            }
        }

        evicted
    }

    fn finalizers(&self) -> MutexGuard<'_, Vec<(FinalizeFn, Instance)>> {
        self.finalizers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push_finalizer(&self, finalizer: FinalizeFn, instance: Instance) {
        self.finalizers().push((finalizer, instance));
    }

    /// Deactivate the scope, run finalizers newest first and drop cached instances.
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }

        let pending = std::mem::take(&mut *self.finalizers());

        #[cfg(feature = "logging")]
        debug!(
            target: "contextual_di",
            scope = %self,
            finalizers = pending.len(),
            singletons = self.singletons.len(),
            "Closing scope"
        );

        for (finalize, instance) in pending.into_iter().rev() {
            finalize(&instance);
        }
        self.singletons.clear();
        self.injectors.clear();
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("depth", &self.depth)
            .field("bindings", &self.registry.len())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Name and seed bindings of a scope about to be entered.
///
/// # Examples
///
/// ```rust
/// use contextual_di::{Container, Identifier, Resolver, ScopeConfig};
///
/// let container = Container::new();
/// let config = ScopeConfig::new("request")
///     .instance(Identifier::alias("request.id"), 42u64)
///     .bind(Identifier::alias("id"), Resolver::alias("request.id"));
///
/// let id = container
///     .run_scope(config, |c| c.get_as::<u64>(Identifier::alias("id")))
///     .unwrap();
/// assert_eq!(*id, 42);
/// ```
#[derive(Debug, Clone)]
pub struct ScopeConfig {
    name: Arc<str>,
    bindings: Vec<(Identifier, Binding)>,
    injectors: Vec<(Identifier, InjectorSource)>,
}

impl ScopeConfig {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            bindings: Vec::new(),
            injectors: Vec::new(),
        }
    }

    /// Seed a local binding.
    pub fn bind(mut self, id: impl Into<Identifier>, resolver: Resolver) -> Self {
        self.bindings.push((id.into(), Binding::new(resolver, false)));
        self
    }

    /// Seed a local singleton binding, cached in the new scope.
    pub fn bind_singleton(mut self, id: impl Into<Identifier>, resolver: Resolver) -> Self {
        self.bindings.push((id.into(), Binding::new(resolver, true)));
        self
    }

    /// Seed a ready instance.
    pub fn instance<T: Injectable>(self, id: impl Into<Identifier>, value: T) -> Self {
        self.bind(id, Resolver::instance(value))
    }

    /// Seed an injector.
    pub fn injector(mut self, id: impl Into<Identifier>, source: impl Into<InjectorSource>) -> Self {
        self.injectors.push((id.into(), source.into()));
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn install(self, scope: &Scope) {
        for (id, binding) in self.bindings {
            let singleton = binding.is_singleton();
            scope
                .registry()
                .bind(id, binding.resolver().clone(), singleton);
        }
        for (id, source) in self.injectors {
            scope.registry().set_injector(id, source);
        }
    }

    pub(crate) fn scope_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }
}

impl From<&str> for ScopeConfig {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ScopeConfig {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Proof of a scope entry, passed to [`Container::leave`].
#[must_use = "a scope stays on the stack until its handle is passed to `leave`"]
pub struct ScopeHandle {
    scope: Arc<Scope>,
}

impl ScopeHandle {
    pub(crate) fn new(scope: Arc<Scope>) -> Self {
        Self { scope }
    }

    #[inline]
    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.scope.id()
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.scope.name()
    }
}

impl fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeHandle({})", self.scope)
    }
}

/// Active path of one container handle, root first.
///
/// Scopes below `floor` were inherited from the handle this one was forked from
/// and cannot be left here.
pub(crate) struct ScopeStack {
    path: Mutex<Vec<Arc<Scope>>>,
    floor: usize,
}

impl ScopeStack {
    pub(crate) fn new(root: Arc<Scope>) -> Self {
        Self {
            path: Mutex::new(vec![root]),
            floor: 1,
        }
    }

    /// Stack inheriting a snapshot of another handle's path.
    pub(crate) fn inherit(path: Vec<Arc<Scope>>) -> Self {
        let floor = path.len();
        Self {
            path: Mutex::new(path),
            floor,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Scope>>> {
        self.path.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the active path.
    pub(crate) fn path(&self) -> ActivePath {
        ActivePath(self.lock().clone())
    }

    pub(crate) fn current(&self) -> Arc<Scope> {
        let path = self.lock();
        Arc::clone(&path[path.len() - 1])
    }

    pub(crate) fn depth(&self) -> usize {
        self.lock().len() - 1
    }

    pub(crate) fn push(&self, scope: Arc<Scope>) {
        self.lock().push(scope);
    }

    /// Pop `handle`'s scope if it is the innermost one this stack may leave.
    pub(crate) fn pop(&self, handle: &ScopeHandle) -> Result<Arc<Scope>> {
        let mut path = self.lock();
        let top = &path[path.len() - 1];
        if path.len() <= self.floor || top.id() != handle.id() {
            let err = crate::DiError::ScopeMismatch {
                attempted: handle.scope.to_string(),
                current: top.to_string(),
            };

            #[cfg(feature = "logging")]
            error!(
                target: "contextual_di",
                attempted = %handle.scope,
                current = %top,
                "Scope left out of order"
            );

            return Err(err);
        }
        Ok(path.pop().unwrap_or_else(|| Arc::clone(&handle.scope)))
    }
}

impl Drop for ScopeStack {
    fn drop(&mut self) {
        let path = self.path.get_mut().unwrap_or_else(PoisonError::into_inner);
        while path.len() > self.floor {
            if let Some(scope) = path.pop() {
                #[cfg(feature = "logging")]
                debug!(
                    target: "contextual_di",
                    scope = %scope,
                    "Closing scope abandoned by a dropped handle"
                );
                scope.close();
            }
        }
    }
}

/// Snapshot of an active path taken at the start of one resolution.
pub(crate) struct ActivePath(Vec<Arc<Scope>>);

impl ActivePath {
    pub(crate) fn scopes(&self) -> &[Arc<Scope>] {
        &self.0
    }

    pub(crate) fn root(&self) -> &Arc<Scope> {
        &self.0[0]
    }

    pub(crate) fn current(&self) -> &Arc<Scope> {
        &self.0[self.0.len() - 1]
    }

    /// Innermost binding for `id` and the scope holding it.
    pub(crate) fn lookup(&self, id: &Identifier) -> Option<(Arc<Scope>, Binding)> {
        self.0
            .iter()
            .rev()
            .find_map(|scope| scope.registry().binding(id).map(|b| (Arc::clone(scope), b)))
    }

    /// Innermost injector for `id` and the scope holding it.
    pub(crate) fn find_injector(&self, id: &Identifier) -> Option<(Arc<Scope>, InjectorSource)> {
        self.0
            .iter()
            .rev()
            .find_map(|scope| scope.registry().injector(id).map(|s| (Arc::clone(scope), s)))
    }

    /// Nearest scope called `name`.
    pub(crate) fn nearest_named(&self, name: &str) -> Option<&Arc<Scope>> {
        self.0.iter().rev().find(|scope| scope.name() == name)
    }

    /// Singleton for `id` already cached anywhere on the path.
    pub(crate) fn cached(&self, id: &Identifier) -> Option<Instance> {
        self.0.iter().rev().find_map(|scope| scope.cached(id))
    }
}

/// Leaves its scope when dropped, including during unwinding.
///
/// Derefs to the container it was created from, so resolution inside the
/// guarded block reads naturally.
///
/// # Examples
///
/// ```rust
/// use contextual_di::{Container, Identifier, ScopeConfig};
///
/// let container = Container::new();
/// {
///     let request = container.scoped(ScopeConfig::new("request").instance(Identifier::alias("user"), 7u32));
///     assert_eq!(*request.get_as::<u32>(Identifier::alias("user")).unwrap(), 7);
/// }
/// assert!(!container.has(&Identifier::alias("user")));
/// ```
#[must_use = "the scope is left as soon as the guard is dropped"]
pub struct ScopeGuard<'a> {
    container: &'a Container,
    handle: Option<ScopeHandle>,
}

impl<'a> ScopeGuard<'a> {
    pub(crate) fn new(container: &'a Container, handle: ScopeHandle) -> Self {
        Self {
            container,
            handle: Some(handle),
        }
    }

    /// The guarded scope.
    pub fn scope(&self) -> Option<&Arc<Scope>> {
        self.handle.as_ref().map(ScopeHandle::scope)
    }

    /// Leave now and report nesting violations instead of only logging them.
    pub fn leave(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => self.container.leave(&handle),
            None => Ok(()),
        }
    }
}

impl Deref for ScopeGuard<'_> {
    type Target = Container;

    fn deref(&self) -> &Container {
        self.container
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            // Already logged by the stack; nothing else to do while dropping.
            let _ = self.container.leave(&handle);
        }
    }
}
