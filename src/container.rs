//! Contextual dependency injection container
//!
//! A `Container` is a handle onto shared state (the root scope, the catalog of
//! declared constructables, named scope binders and options) plus its own
//! active scope path and resolution tracer. Cloning a handle is a
//! [`Container::fork`]: the clone starts from the same path but enters and
//! leaves scopes independently, so it can be handed to another thread or task.

use crate::factory::Constructor;
use crate::injector::InjectorSource;
use crate::proxy::{Proxy, ProxyHandle};
use crate::reflect::{Catalog, ParameterRequest};
use crate::registry::{Binding, Registry, Resolver, follow_aliases};
use crate::scope::{Scope, ScopeConfig, ScopeGuard, ScopeHandle, ScopeStack};
use crate::tracer::Tracer;
use crate::{Autowire, DiError, Identifier, Injectable, Instance, Options, Parameters, Result, Trace};
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// State shared by every handle of one container.
pub(crate) struct Shared {
    pub(crate) root: Arc<Scope>,
    pub(crate) catalog: Catalog,
    pub(crate) binders: DashMap<Arc<str>, Arc<Registry>, RandomState>,
    pub(crate) options: Options,
}

/// Dependency injection container.
///
/// # Examples
///
/// ```rust
/// use contextual_di::{Container, Identifier, Resolver, ScopeConfig};
///
/// #[derive(Debug)]
/// struct Config { name: &'static str }
///
/// let container = Container::new();
/// container.bind_singleton(Identifier::of::<Config>(), Resolver::from_fn(|| Config { name: "app" }));
///
/// let a = container.resolve::<Config>().unwrap();
/// let b = container.resolve::<Config>().unwrap();
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
///
/// let user = container.run_scope(
///     ScopeConfig::new("request").instance(Identifier::alias("user"), "alice"),
///     |c| c.get_as::<&str>(Identifier::alias("user")),
/// );
/// assert_eq!(*user.unwrap(), "alice");
/// assert!(!container.has(Identifier::alias("user")));
/// ```
pub struct Container {
    pub(crate) shared: Arc<Shared>,
    pub(crate) stack: ScopeStack,
    pub(crate) tracer: Tracer,
}

impl Container {
    /// Create a container with default options.
    #[inline]
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    /// Create a container with custom options.
    pub fn with_options(options: Options) -> Self {
        let root = Scope::root();

        #[cfg(feature = "logging")]
        debug!(
            target: "contextual_di",
            root = %root,
            max_alias_hops = options.max_alias_hops,
            "Creating new DI container"
        );

        Self {
            stack: ScopeStack::new(Arc::clone(&root)),
            shared: Arc::new(Shared {
                root,
                catalog: Catalog::new(),
                binders: DashMap::with_capacity_and_hasher_and_shard_amount(
                    0,
                    RandomState::new(),
                    8,
                ),
                options,
            }),
            tracer: Tracer::new(),
        }
    }

    #[inline]
    pub fn options(&self) -> Options {
        self.shared.options
    }

    // =========================================================================
    // Constructables
    // =========================================================================

    /// Make an [`Autowire`] type constructable.
    pub fn declare<T: Autowire>(&self) {
        self.shared.catalog.declare(Constructor::of::<T>());
    }

    /// Make a constructor available for autowiring its target.
    pub fn declare_constructor(&self, constructor: Constructor) {
        self.shared.catalog.declare(constructor);
    }

    /// Parameters of a declared constructable, in declaration order.
    pub fn describe(&self, id: impl Into<Identifier>) -> Option<Arc<[ParameterRequest]>> {
        self.shared.catalog.describe(&id.into())
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    /// Bind `id` in the current scope (last write wins).
    ///
    /// A singleton or injector the scope already materialised for `id` is
    /// evicted, so the next resolution uses the new resolver.
    pub fn bind(&self, id: impl Into<Identifier>, resolver: Resolver) {
        self.rebind(id.into(), resolver, false);
    }

    /// Bind `id` as a singleton cached in the current scope.
    pub fn bind_singleton(&self, id: impl Into<Identifier>, resolver: Resolver) {
        self.rebind(id.into(), resolver, true);
    }

    fn rebind(&self, id: Identifier, resolver: Resolver, singleton: bool) {
        let scope = self.current_scope();
        scope.registry().bind(id.clone(), resolver, singleton);
        scope.forget(&id);
    }

    /// Bind a ready instance under its own type.
    pub fn bind_instance<T: Injectable>(&self, value: T) {
        self.bind(Identifier::of::<T>(), Resolver::instance(value));
    }

    /// Remove the binding of `id` from the current scope, together with the
    /// singleton it produced there.
    pub fn unbind(&self, id: impl Into<Identifier>) -> Option<Binding> {
        let id = id.into();
        let scope = self.current_scope();
        let removed = scope.registry().unbind(&id);
        scope.forget(&id);
        removed
    }

    /// Whether `id` can be resolved without autowiring failing outright: it is
    /// bound on the active path, has an injector, or is a declared constructable.
    pub fn has(&self, id: impl Into<Identifier>) -> bool {
        let id = id.into();
        let path = self.stack.path();
        path.lookup(&id).is_some()
            || path.find_injector(&id).is_some()
            || self.shared.catalog.contains(&id)
    }

    /// Whether an instance for `id` already exists on the active path: a cached
    /// singleton or an instance binding.
    pub fn has_instance(&self, id: impl Into<Identifier>) -> bool {
        let id = id.into();
        let path = self.stack.path();
        path.cached(&id).is_some()
            || path
                .lookup(&id)
                .is_some_and(|(_, b)| matches!(b.resolver(), Resolver::Instance(_)))
    }

    /// Innermost binding of `id` on the active path, aliases not followed.
    pub fn lookup(&self, id: impl Into<Identifier>) -> Option<Binding> {
        self.stack.path().lookup(&id.into()).map(|(_, b)| b)
    }

    /// Binding `id` ends at after following aliases along the active path.
    pub fn resolve_binding(&self, id: impl Into<Identifier>) -> Result<Option<Binding>> {
        let id = id.into();
        let path = self.stack.path();
        let hops = self.shared.options.max_alias_hops;
        follow_aliases(&id, hops, |next| path.lookup(next))
            .map(|redirect| redirect.binding.map(|(_, terminal)| terminal.into_binding()))
            .map_err(|fault| fault.into_error(&id, hops, Trace::empty()))
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve `id`.
    #[inline]
    pub fn get(&self, id: impl Into<Identifier>) -> Result<Instance> {
        self.make_inner(&id.into(), &Parameters::new(), None, None)
    }

    /// Resolve `id`, handing `context` to its injector.
    pub fn get_with_context(&self, id: impl Into<Identifier>, context: &str) -> Result<Instance> {
        self.make_inner(&id.into(), &Parameters::new(), Some(context), None)
    }

    /// Resolve `id` with explicit arguments.
    ///
    /// Explicit arguments apply to the constructor of `id` only. Singletons are
    /// bypassed: the result is fresh and not cached.
    pub fn make(&self, id: impl Into<Identifier>, params: Parameters) -> Result<Instance> {
        self.make_inner(&id.into(), &params, None, None)
    }

    /// Resolve `id` and downcast to `T`.
    pub fn get_as<T: Injectable>(&self, id: impl Into<Identifier>) -> Result<Arc<T>> {
        let id = id.into();
        self.get(&id)?
            .downcast::<T>()
            .map_err(|_| DiError::type_mismatch::<T>(&id))
    }

    /// Resolve with explicit arguments and downcast to `T`.
    pub fn make_as<T: Injectable>(&self, id: impl Into<Identifier>, params: Parameters) -> Result<Arc<T>> {
        let id = id.into();
        self.make(&id, params)?
            .downcast::<T>()
            .map_err(|_| DiError::type_mismatch::<T>(&id))
    }

    /// Resolve the type `T`.
    #[inline]
    pub fn resolve<T: Injectable>(&self) -> Result<Arc<T>> {
        self.get_as::<T>(Identifier::of::<T>())
    }

    /// Resolve `T`, treating only its own absence as `None`.
    pub fn try_resolve<T: Injectable>(&self) -> Result<Option<Arc<T>>> {
        let id = Identifier::of::<T>();
        match self.get_as::<T>(&id) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found_for(&id) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Call a constructor with container-resolved arguments; the result is never cached.
    pub fn invoke(&self, constructor: &Constructor, params: Parameters) -> Result<Instance> {
        self.invoke_inner(constructor, &params)
    }

    /// Deferred handle to `id`, bound to the current scope. Never fails.
    pub fn proxy(&self, id: impl Into<Identifier>) -> ProxyHandle {
        ProxyHandle::new(id.into(), &self.current_scope())
    }

    /// Typed deferred handle to `id`.
    pub fn proxy_as<T: Injectable>(&self, id: impl Into<Identifier>) -> Proxy<T> {
        Proxy::from_handle(self.proxy(id))
    }

    /// Typed deferred handle to `T`.
    pub fn proxy_of<T: Injectable>(&self) -> Proxy<T> {
        self.proxy_as(Identifier::of::<T>())
    }

    // =========================================================================
    // Injectors
    // =========================================================================

    /// Register an injector for `id` in the current scope, replacing any
    /// injector the scope already resolved for it.
    pub fn register_injector(&self, id: impl Into<Identifier>, injector: impl Into<InjectorSource>) {
        let id = id.into();
        let scope = self.current_scope();
        scope.registry().set_injector(id.clone(), injector.into());
        scope.forget_injector(&id);
    }

    /// Remove the innermost injector for `id` on the active path.
    pub fn remove_injector(&self, id: impl Into<Identifier>) -> bool {
        let id = id.into();
        match self.stack.path().find_injector(&id) {
            Some((scope, _)) => {
                scope.forget_injector(&id);
                scope.registry().remove_injector(&id).is_some()
            }
            None => false,
        }
    }

    /// Whether an injector for `id` is registered on the active path.
    pub fn has_injector(&self, id: impl Into<Identifier>) -> bool {
        self.stack.path().find_injector(&id.into()).is_some()
    }

    // =========================================================================
    // Scopes
    // =========================================================================

    /// Push a new scope onto this handle's active path.
    ///
    /// Seed bindings of `config` are installed first; bindings of the scope
    /// binder with the same name fill in whatever the seeds left out.
    pub fn enter(&self, config: impl Into<ScopeConfig>) -> ScopeHandle {
        let config = config.into();
        let parent = self.stack.current();
        let scope = Scope::child(&parent, config.scope_name());
        config.install(&scope);

        let binder = self
            .shared
            .binders
            .get(scope.name())
            .map(|b| Arc::clone(b.value()));
        if let Some(binder) = binder {
            scope.registry().extend_from(&binder);
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "contextual_di",
            scope = %scope,
            parent = %parent,
            depth = scope.depth(),
            bindings = scope.registry().len(),
            "Entering scope"
        );

        self.stack.push(Arc::clone(&scope));
        ScopeHandle::new(scope)
    }

    /// Pop the innermost scope, which must be `handle`'s, and close it.
    pub fn leave(&self, handle: &ScopeHandle) -> Result<()> {
        let scope = self.stack.pop(handle)?;

        #[cfg(feature = "logging")]
        debug!(
            target: "contextual_di",
            scope = %scope,
            singletons = scope.cached_len(),
            "Leaving scope"
        );

        scope.close();
        Ok(())
    }

    /// Enter a scope that is left when the returned guard drops.
    pub fn scoped(&self, config: impl Into<ScopeConfig>) -> ScopeGuard<'_> {
        ScopeGuard::new(self, self.enter(config))
    }

    /// Run `f` inside a fresh scope; the scope is left on every exit path,
    /// unwinding included.
    pub fn run_scope<R>(&self, config: impl Into<ScopeConfig>, f: impl FnOnce(&Container) -> R) -> R {
        let guard = self.scoped(config);
        f(&guard)
    }

    /// Bindings installed into every scope entered under `name`.
    pub fn scope_binder(&self, name: impl Into<Arc<str>>) -> ScopeBinder {
        let registry = self
            .shared
            .binders
            .entry(name.into())
            .or_insert_with(|| Arc::new(Registry::new()))
            .value()
            .clone();
        ScopeBinder { registry }
    }

    /// Innermost scope of this handle.
    #[inline]
    pub fn current_scope(&self) -> Arc<Scope> {
        self.stack.current()
    }

    /// The root scope; bindings made here are visible to every handle.
    #[inline]
    pub fn root(&self) -> Arc<Scope> {
        Arc::clone(&self.shared.root)
    }

    /// Number of scopes entered above the root.
    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    /// Independent handle starting from this handle's active path.
    ///
    /// Scopes entered on the fork are invisible here and vice versa; the
    /// inherited scopes cannot be left from the fork. Scopes the fork entered
    /// and never left are closed when it is dropped.
    pub fn fork(&self) -> Container {
        let path = self.stack.path();

        #[cfg(feature = "logging")]
        debug!(
            target: "contextual_di",
            current = %path.current(),
            depth = path.scopes().len() - 1,
            "Forking container handle"
        );

        Container {
            shared: Arc::clone(&self.shared),
            stack: ScopeStack::inherit(path.scopes().to_vec()),
            tracer: Tracer::new(),
        }
    }

    /// Spawn `task` on a forked handle inside a fresh scope.
    ///
    /// The scope is closed when the task finishes or is aborted, since the
    /// forked handle is owned by the task's future. Must be called from within
    /// a Tokio runtime.
    #[cfg(feature = "async")]
    pub fn spawn_scoped<F, Fut, T>(
        &self,
        config: impl Into<ScopeConfig>,
        task: F,
    ) -> tokio::task::JoinHandle<T>
    where
        F: FnOnce(Container) -> Fut,
        Fut: std::future::Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let forked = self.fork();
        let _entered = forked.enter(config);
        tokio::spawn(task(forked))
    }
}

impl Clone for Container {
    #[inline]
    fn clone(&self) -> Self {
        self.fork()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("current", &self.current_scope())
            .field("depth", &self.depth())
            .field("root_bindings", &self.shared.root.registry().len())
            .field("options", &self.shared.options)
            .finish()
    }
}

/// Registration handle for a named scope binder.
///
/// # Examples
///
/// ```rust
/// use contextual_di::{Container, Identifier, Resolver};
///
/// let container = Container::new();
/// container
///     .scope_binder("request")
///     .bind_singleton(Identifier::alias("session"), Resolver::from_fn(|| vec![0u8; 4]));
///
/// assert!(!container.has(Identifier::alias("session")));
/// container.run_scope("request", |c| assert!(c.has(Identifier::alias("session"))));
/// ```
#[derive(Clone)]
pub struct ScopeBinder {
    registry: Arc<Registry>,
}

impl ScopeBinder {
    pub fn bind(&self, id: impl Into<Identifier>, resolver: Resolver) -> &Self {
        self.registry.bind(id.into(), resolver, false);
        self
    }

    /// Singletons bound here are cached once per entered scope.
    pub fn bind_singleton(&self, id: impl Into<Identifier>, resolver: Resolver) -> &Self {
        self.registry.bind(id.into(), resolver, true);
        self
    }

    pub fn injector(&self, id: impl Into<Identifier>, source: impl Into<InjectorSource>) -> &Self {
        self.registry.set_injector(id.into(), source.into());
        self
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for ScopeBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ScopeBinder").field(&self.registry).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Arguments, BoxError, Injector};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn alias(name: &str) -> Identifier {
        Identifier::alias(name)
    }

    /// Factory for alias `name` depending on the aliases in `deps`.
    fn node(name: &'static str, deps: &[&'static str]) -> Constructor {
        let params = deps
            .iter()
            .map(|d| ParameterRequest::typed(*d, alias(d)))
            .collect();
        Constructor::factory(alias(name), params, move |_: &Arguments| {
            Ok::<_, BoxError>(name)
        })
    }

    #[derive(Debug)]
    struct Counter(usize);

    fn counting(counter: &'static AtomicUsize) -> Resolver {
        Resolver::from_fn(move || Counter(counter.fetch_add(1, Ordering::SeqCst)))
    }

    #[test]
    fn test_singleton_idempotence() {
        static MADE: AtomicUsize = AtomicUsize::new(0);
        let container = Container::new();
        container.bind_singleton(Identifier::of::<Counter>(), counting(&MADE));

        let a = container.resolve::<Counter>().unwrap();
        let b = container.resolve::<Counter>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(MADE.load(Ordering::SeqCst), 1);
        assert!(container.has_instance(Identifier::of::<Counter>()));
    }

    #[test]
    fn test_unbind_evicts_materialised_singleton() {
        let container = Container::new();
        container.bind_singleton(alias("cfg"), Resolver::from_fn(|| 1u32));
        assert_eq!(*container.get_as::<u32>(alias("cfg")).unwrap(), 1);
        assert!(container.has_instance(alias("cfg")));

        assert!(container.unbind(alias("cfg")).is_some());
        assert!(!container.has_instance(alias("cfg")));

        container.bind_singleton(alias("cfg"), Resolver::from_fn(|| 2u32));
        assert_eq!(*container.get_as::<u32>(alias("cfg")).unwrap(), 2);
    }

    #[test]
    fn test_rebinding_replaces_materialised_singleton() {
        let container = Container::new();
        container.bind_singleton(alias("cfg"), Resolver::from_fn(|| 1u32));
        assert_eq!(*container.get_as::<u32>(alias("cfg")).unwrap(), 1);

        container.run_scope("request", |c| {
            c.bind_singleton(alias("cfg"), Resolver::from_fn(|| 3u32));
            assert_eq!(*c.get_as::<u32>(alias("cfg")).unwrap(), 3);
        });
        assert_eq!(*container.get_as::<u32>(alias("cfg")).unwrap(), 1);

        container.bind_singleton(alias("cfg"), Resolver::from_fn(|| 2u32));
        assert_eq!(*container.get_as::<u32>(alias("cfg")).unwrap(), 2);
        container.bind(alias("cfg"), Resolver::instance(4u32));
        assert_eq!(*container.get_as::<u32>(alias("cfg")).unwrap(), 4);
    }

    #[test]
    fn test_transient_is_fresh() {
        static MADE: AtomicUsize = AtomicUsize::new(0);
        let container = Container::new();
        container.bind(Identifier::of::<Counter>(), counting(&MADE));

        let a = container.resolve::<Counter>().unwrap();
        let b = container.resolve::<Counter>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!container.has_instance(Identifier::of::<Counter>()));
    }

    #[test]
    fn test_scope_isolation() {
        let container = Container::new();
        container.bind(alias("db"), Resolver::instance("root"));

        let inside = container.run_scope(
            ScopeConfig::new("A").instance(alias("db"), "scoped"),
            |c| c.get_as::<&str>(alias("db")),
        );
        assert_eq!(*inside.unwrap(), "scoped");
        assert_eq!(*container.get_as::<&str>(alias("db")).unwrap(), "root");

        container.run_scope(ScopeConfig::new("A").instance(alias("local"), 1u8), |_| ());
        assert!(container.get(alias("local")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_sibling_scopes_do_not_share_singletons() {
        static MADE: AtomicUsize = AtomicUsize::new(0);
        let container = Container::new();
        container
            .scope_binder("request")
            .bind_singleton(alias("session"), counting(&MADE));

        let first = container.run_scope("request", |c| {
            let a = c.get(alias("session")).unwrap();
            let b = c.get(alias("session")).unwrap();
            assert!(Arc::ptr_eq(&a, &b));
            a
        });
        let second = container.run_scope("request", |c| c.get(alias("session")).unwrap());

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!container.has(alias("session")));
    }

    #[test]
    fn test_root_singleton_is_global() {
        static MADE: AtomicUsize = AtomicUsize::new(0);
        let container = Container::new();
        container.bind_singleton(alias("config"), counting(&MADE));

        let a = container.run_scope("A", |c| c.get(alias("config")).unwrap());
        let b = container.run_scope("B", |c| c.get(alias("config")).unwrap());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_seed_bindings_win_over_binder() {
        let container = Container::new();
        container
            .scope_binder("request")
            .bind(alias("user"), Resolver::instance("guest"));

        let user = container.run_scope(
            ScopeConfig::new("request").instance(alias("user"), "alice"),
            |c| c.get_as::<&str>(alias("user")).unwrap(),
        );
        assert_eq!(*user, "alice");
    }

    #[test]
    fn test_cycle_is_recursive_resolution() {
        let container = Container::new();
        container.declare_constructor(node("A", &["B"]));
        container.declare_constructor(node("B", &["A"]));

        let err = container.get(alias("A")).unwrap_err();
        assert!(matches!(err, DiError::RecursiveResolution { ref id, .. } if id.name() == "A"));
        assert_eq!(err.trace().unwrap().to_string(), "A -> B -> A");
        assert_eq!(container.tracer.depth(), 0);
    }

    #[test]
    fn test_proxy_breaks_cycle() {
        let container = Container::new();
        container.declare_constructor(
            Constructor::factory(
                alias("A"),
                vec![ParameterRequest::typed("b", alias("B"))],
                |args: &Arguments| args.get::<String>("b").map(|b| format!("A({b})")),
            )
            .singleton(),
        );
        container.declare_constructor(Constructor::factory(
            alias("B"),
            vec![ParameterRequest::typed("a", alias("A")).proxy()],
            |args: &Arguments| {
                args.proxy::<String>("a")?;
                Ok::<_, DiError>(String::from("B"))
            },
        ));
        container.declare_constructor(Constructor::factory(
            alias("B.holder"),
            vec![ParameterRequest::typed("a", alias("A")).proxy()],
            |args: &Arguments| args.proxy::<String>("a"),
        ));

        let a = container.get_as::<String>(alias("A")).unwrap();
        assert_eq!(*a, "A(B)");

        let holder = container.get_as::<Proxy<String>>(alias("B.holder")).unwrap();
        let deferred = holder.resolve(&container).unwrap();
        assert!(Arc::ptr_eq(&a, &deferred));
    }

    #[test]
    fn test_circular_alias() {
        let container = Container::new();
        container.bind(alias("x"), Resolver::alias("y"));
        container.bind(alias("y"), Resolver::alias("x"));

        let err = container.get(alias("x")).unwrap_err();
        assert!(matches!(err, DiError::CircularAlias { .. }));
    }

    #[test]
    fn test_alias_hop_limit() {
        let container = Container::with_options(Options::new().max_alias_hops(2));
        container.bind(alias("a"), Resolver::alias("b"));
        container.bind(alias("b"), Resolver::alias("c"));
        container.bind(alias("c"), Resolver::alias("d"));
        container.bind(alias("d"), Resolver::instance(4u8));

        let err = container.get(alias("a")).unwrap_err();
        assert!(matches!(err, DiError::TooManyRedirects { limit: 2, .. }));
        assert_eq!(*container.get_as::<u8>(alias("b")).unwrap(), 4);
    }

    #[test]
    fn test_alias_across_scopes() {
        let container = Container::new();
        container.bind(alias("db"), Resolver::alias("db.primary"));
        container.bind(alias("db.primary"), Resolver::instance("primary"));

        let inner = container.run_scope(
            ScopeConfig::new("test").instance(alias("db.primary"), "fake"),
            |c| c.get_as::<&str>(alias("db")).unwrap(),
        );
        assert_eq!(*inner, "fake");
    }

    #[test]
    fn test_singleton_alias_caches_under_alias() {
        static MADE: AtomicUsize = AtomicUsize::new(0);
        let container = Container::new();
        container.bind(alias("impl"), counting(&MADE));
        container.bind_singleton(alias("service"), Resolver::alias("impl"));

        let a = container.get(alias("service")).unwrap();
        let b = container.get(alias("service")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let c = container.get(alias("impl")).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_default_value_fallback() {
        let container = Container::new();
        container.declare_constructor(Constructor::factory(
            alias("answer"),
            vec![ParameterRequest::of::<u64>("value").with_default(42u64)],
            |args: &Arguments| args.value::<u64>("value"),
        ));

        assert_eq!(*container.get_as::<u64>(alias("answer")).unwrap(), 42);
    }

    #[test]
    fn test_explicit_argument_override() {
        #[derive(Debug, PartialEq)]
        struct Port(u16);

        let container = Container::new();
        container.bind(Identifier::of::<Port>(), Resolver::instance(Port(80)));
        container.declare_constructor(Constructor::factory(
            alias("server"),
            vec![ParameterRequest::of::<Port>("port")],
            |args: &Arguments| args.get::<Port>("port").map(|p| p.0),
        ));

        assert_eq!(*container.get_as::<u16>(alias("server")).unwrap(), 80);
        let custom = container
            .make_as::<u16>(alias("server"), Parameters::new().with_value("port", Port(8080)))
            .unwrap();
        assert_eq!(*custom, 8080);
    }

    #[test]
    fn test_explicit_argument_wrong_type() {
        let container = Container::new();
        container.declare_constructor(Constructor::factory(
            alias("server"),
            vec![ParameterRequest::of::<u16>("port")],
            |args: &Arguments| args.value::<u16>("port"),
        ));

        let err = container
            .make(alias("server"), Parameters::new().with_value("port", "80"))
            .unwrap_err();
        assert!(matches!(err, DiError::InvalidArgument { ref parameter, .. } if parameter == "port"));

        let lenient = Container::with_options(Options::new().validate_arguments(false));
        lenient.declare_constructor(Constructor::factory(
            alias("server"),
            vec![ParameterRequest::of::<u16>("port")],
            |args: &Arguments| Ok::<_, DiError>(args.raw("port").is_some()),
        ));
        assert!(
            *lenient
                .make_as::<bool>(alias("server"), Parameters::new().with_value("port", "80"))
                .unwrap()
        );
    }

    struct ConsoleLoggerInjector {
        built: AtomicUsize,
    }

    #[derive(Debug)]
    struct Logger {
        channel: String,
    }

    impl Injector for ConsoleLoggerInjector {
        fn create_injection(
            &self,
            _container: &Container,
            _requested: &Identifier,
            context: Option<&str>,
        ) -> std::result::Result<Instance, BoxError> {
            self.built.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Logger {
                channel: context.unwrap_or("default").to_string(),
            }))
        }
    }

    #[test]
    fn test_injector_bootstrap_scenario() {
        let injector = Arc::new(ConsoleLoggerInjector {
            built: AtomicUsize::new(0),
        });
        let container = Container::new();
        container.bind(
            Identifier::of::<Logger>(),
            Resolver::Injector(InjectorSource::Instance(injector.clone())),
        );

        let a = container.resolve::<Logger>().unwrap();
        let b = container.resolve::<Logger>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(injector.built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_injector_receives_parameter_name() {
        let container = Container::new();
        container.register_injector(
            Identifier::of::<Logger>(),
            ConsoleLoggerInjector {
                built: AtomicUsize::new(0),
            },
        );
        container.declare_constructor(Constructor::factory(
            alias("mailer"),
            vec![ParameterRequest::of::<Logger>("mail")],
            |args: &Arguments| args.get::<Logger>("mail").map(|l| l.channel.clone()),
        ));

        assert_eq!(*container.get_as::<String>(alias("mailer")).unwrap(), "mail");
        let audit = container
            .get_with_context(Identifier::of::<Logger>(), "audit")
            .unwrap();
        assert_eq!(audit.downcast_ref::<Logger>().unwrap().channel, "audit");
    }

    #[test]
    fn test_injector_wins_over_binding() {
        let container = Container::new();
        container.bind(
            Identifier::of::<Logger>(),
            Resolver::instance(Logger {
                channel: "bound".into(),
            }),
        );
        container.register_injector(
            Identifier::of::<Logger>(),
            crate::injector::injector_fn(|ctx| Logger {
                channel: ctx.unwrap_or("injected").into(),
            }),
        );
        assert!(container.has_injector(Identifier::of::<Logger>()));
        assert_eq!(container.resolve::<Logger>().unwrap().channel, "injected");

        assert!(container.remove_injector(Identifier::of::<Logger>()));
        assert!(!container.has_injector(Identifier::of::<Logger>()));
        assert_eq!(container.resolve::<Logger>().unwrap().channel, "bound");
    }

    #[test]
    fn test_injector_failure_preserves_cause() {
        let container = Container::new();
        container.register_injector(
            alias("flaky"),
            |_: &Container, _: &Identifier, _: Option<&str>| -> std::result::Result<Instance, BoxError> {
                Err("backend down".into())
            },
        );

        let err = container.get(alias("flaky")).unwrap_err();
        assert!(matches!(err, DiError::InjectorFailure { .. }));
        let cause = std::error::Error::source(&err).unwrap();
        assert_eq!(cause.to_string(), "backend down");
    }

    #[test]
    fn test_injector_result_type_is_checked() {
        let container = Container::new();
        container.register_injector(
            Identifier::of::<Logger>(),
            crate::injector::injector_fn(|_| 5u8),
        );
        let err = container.resolve::<Logger>().unwrap_err();
        assert!(matches!(err, DiError::InjectorFailure { .. }));
    }

    #[test]
    fn test_injector_from_binding_is_cached() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);
        let container = Container::new();
        container.bind(
            alias("logger.injector"),
            Resolver::factory(Constructor::erased(alias("logger.injector"), Vec::new(), |_| {
                BUILT.fetch_add(1, Ordering::SeqCst);
                Ok(crate::injector::injector_instance(crate::injector::injector_fn(
                    |ctx| Logger {
                        channel: ctx.unwrap_or("-").into(),
                    },
                )))
            })),
        );
        container.register_injector(
            Identifier::of::<Logger>(),
            InjectorSource::Binding(alias("logger.injector")),
        );

        container.resolve::<Logger>().unwrap();
        container.resolve::<Logger>().unwrap();
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reregistered_injector_replaces_cached_one() {
        let channel = |name: &'static str| {
            Resolver::Instance(crate::injector::injector_instance(
                crate::injector::injector_fn(move |_| Logger {
                    channel: name.into(),
                }),
            ))
        };
        let container = Container::new();
        container.bind(alias("inj.a"), channel("A"));
        container.bind(alias("inj.b"), channel("B"));

        container.register_injector(
            Identifier::of::<Logger>(),
            InjectorSource::Binding(alias("inj.a")),
        );
        assert_eq!(container.resolve::<Logger>().unwrap().channel, "A");

        container.register_injector(
            Identifier::of::<Logger>(),
            InjectorSource::Binding(alias("inj.b")),
        );
        assert_eq!(container.resolve::<Logger>().unwrap().channel, "B");

        container.bind(alias("log"), Resolver::injector(InjectorSource::Binding(alias("inj.a"))));
        assert_eq!(container.get_as::<Logger>(alias("log")).unwrap().channel, "A");
        container.bind(alias("log"), Resolver::injector(InjectorSource::Binding(alias("inj.b"))));
        assert_eq!(container.get_as::<Logger>(alias("log")).unwrap().channel, "B");
    }

    #[test]
    fn test_diagnostic_chain() {
        let container = Container::new();
        container.declare_constructor(node("A", &["B"]));
        container.declare_constructor(node("B", &["C"]));

        let err = container.get(alias("A")).unwrap_err();
        assert!(matches!(
            err,
            DiError::UnresolvableParameter { ref target, ref parameter, .. }
                if target.name() == "B" && parameter == "C"
        ));
        assert_eq!(err.trace().unwrap().to_string(), "A -> B -> C");
        assert!(err.to_string().contains("A -> B -> C"));
    }

    #[test]
    fn test_nullable_only_falls_back_on_own_absence() {
        let container = Container::new();
        container.declare_constructor(Constructor::factory(
            alias("report"),
            vec![ParameterRequest::typed("cache", alias("cache")).nullable()],
            |args: &Arguments| args.optional::<u8>("cache").map(|c| c.is_some()),
        ));
        assert!(!*container.get_as::<bool>(alias("report")).unwrap());

        // `cache` exists but cannot be built: that is an error, not a null
        container.declare_constructor(node("cache", &["missing"]));
        let err = container.get(alias("report")).unwrap_err();
        assert!(matches!(err, DiError::UnresolvableParameter { ref target, .. } if target.name() == "cache"));
    }

    #[test]
    fn test_union_and_hint() {
        let container = Container::new();
        container.bind(alias("redis"), Resolver::instance("redis"));
        container.bind(alias("memory"), Resolver::instance("memory"));
        container.declare_constructor(Constructor::factory(
            alias("store"),
            vec![
                ParameterRequest::union("first", [alias("file"), alias("memory")]),
                ParameterRequest::typed("hinted", alias("memory")).hint(alias("redis")),
            ],
            |args: &Arguments| {
                Ok::<_, DiError>(format!(
                    "{}+{}",
                    args.value::<&str>("first")?,
                    args.value::<&str>("hinted")?
                ))
            },
        ));

        assert_eq!(*container.get_as::<String>(alias("store")).unwrap(), "memory+redis");
    }

    #[test]
    fn test_variadic_and_reference_arguments() {
        let container = Container::new();
        container.bind(alias("third"), Resolver::instance(3u32));
        container.declare_constructor(Constructor::factory(
            alias("sum"),
            vec![ParameterRequest::of::<u32>("items").variadic()],
            |args: &Arguments| {
                args.variadic::<u32>("items")
                    .map(|items| items.iter().map(|i| **i).sum::<u32>())
            },
        ));

        assert_eq!(*container.get_as::<u32>(alias("sum")).unwrap(), 0);
        let sum = container
            .make_as::<u32>(
                alias("sum"),
                Parameters::new().with_list(
                    "items",
                    vec![
                        crate::Argument::value(1u32),
                        crate::Argument::value(2u32),
                        crate::Argument::Reference(alias("third")),
                    ],
                ),
            )
            .unwrap();
        assert_eq!(*sum, 6);
    }

    #[test]
    fn test_explicit_null_requires_nullable() {
        let container = Container::new();
        container.declare_constructor(Constructor::factory(
            alias("svc"),
            vec![ParameterRequest::new("dep")],
            |_: &Arguments| Ok::<_, DiError>(()),
        ));
        let err = container
            .make(alias("svc"), Parameters::new().with_null("dep"))
            .unwrap_err();
        assert!(matches!(err, DiError::InvalidArgument { .. }));
    }

    #[test]
    fn test_make_bypasses_singleton_cache() {
        static MADE: AtomicUsize = AtomicUsize::new(0);
        let container = Container::new();
        container.bind_singleton(
            alias("conn"),
            Resolver::factory(Constructor::factory(
                alias("conn"),
                vec![ParameterRequest::new("dsn").with_default("default")],
                |args: &Arguments| {
                    MADE.fetch_add(1, Ordering::SeqCst);
                    args.value::<&str>("dsn")
                },
            )),
        );

        let shared = container.get(alias("conn")).unwrap();
        let custom = container
            .make_as::<&str>(alias("conn"), Parameters::new().with_value("dsn", "custom"))
            .unwrap();
        assert_eq!(*custom, "custom");
        assert!(Arc::ptr_eq(&shared, &container.get(alias("conn")).unwrap()));
        assert_eq!(MADE.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_creation_error_is_wrapped() {
        let container = Container::new();
        container.declare_constructor(Constructor::factory(alias("broken"), Vec::new(), |_: &Arguments| {
            Err::<u8, _>("disk full")
        }));

        let err = container.get(alias("broken")).unwrap_err();
        assert!(matches!(err, DiError::CreationFailed { ref id, .. } if id.name() == "broken"));
        assert_eq!(err.trace().unwrap().to_string(), "broken");
    }

    #[test]
    fn test_proxy_resolves_against_current_scope() {
        let container = Container::new();
        let user = container.proxy_as::<&str>(alias("request.user"));

        let resolved = container.run_scope(
            ScopeConfig::new("request").instance(alias("request.user"), "alice"),
            |c| user.resolve(c),
        );
        assert_eq!(*resolved.unwrap(), "alice");

        // Resolving against the creation scope instead would find nothing here.
        assert!(user.resolve(&container).unwrap_err().is_not_found());
    }

    #[test]
    fn test_proxy_reuses_singleton_cached_in_creation_scope() {
        let container = Container::new();
        let session = container.scoped(
            ScopeConfig::new("session").bind_singleton(alias("cart"), Resolver::from_fn(|| 1u8)),
        );
        let late = session.proxy_as::<u8>(alias("cart"));
        let cart = session.get_as::<u8>(alias("cart")).unwrap();
        let cached = session.proxy_as::<u8>(alias("cart"));

        let nested = session.scoped(
            ScopeConfig::new("nested").bind_singleton(alias("cart"), Resolver::from_fn(|| 2u8)),
        );
        let via_proxy = cached.resolve(&nested).unwrap();
        assert!(Arc::ptr_eq(&cart, &via_proxy));

        // Still cached, so even the earlier proxy reuses it instead of the nested binding.
        assert_eq!(*late.resolve(&nested).unwrap(), 1);
        assert_eq!(*nested.get_as::<u8>(alias("cart")).unwrap(), 2);
    }

    #[test]
    fn test_proxy_without_cached_singleton_follows_current_scope() {
        let container = Container::new();
        let session = container.scoped(
            ScopeConfig::new("session").bind_singleton(alias("cart"), Resolver::from_fn(|| 1u8)),
        );
        let cart = session.proxy_as::<u8>(alias("cart"));

        let nested = session.scoped(
            ScopeConfig::new("nested").bind_singleton(alias("cart"), Resolver::from_fn(|| 2u8)),
        );
        assert_eq!(*cart.resolve(&nested).unwrap(), 2);
    }

    #[test]
    fn test_proxy_expires_with_creation_scope() {
        let container = Container::new();
        container.bind(alias("x"), Resolver::instance(1u8));

        let proxy = container.run_scope("job", |c| c.proxy(alias("x")));
        assert!(!proxy.is_valid());
        let err = proxy.resolve(&container).unwrap_err();
        assert!(matches!(err, DiError::ProxyExpired { .. }));
    }

    #[test]
    fn test_recursive_proxy() {
        let container = Container::new();
        container.register_injector(
            alias("node"),
            |c: &Container, id: &Identifier, _: Option<&str>| -> std::result::Result<Instance, BoxError> {
                Ok(c.proxy(id.clone()).resolve(c)?)
            },
        );

        let err = container.get(alias("node")).unwrap_err();
        assert!(matches!(err, DiError::RecursiveProxy { .. }));
    }

    #[test]
    fn test_leave_out_of_order() {
        let container = Container::new();
        let outer = container.enter("outer");
        let inner = container.enter("inner");

        let err = container.leave(&outer).unwrap_err();
        assert!(matches!(err, DiError::ScopeMismatch { .. }));
        assert_eq!(container.depth(), 2);

        container.leave(&inner).unwrap();
        container.leave(&outer).unwrap();
        assert_eq!(container.depth(), 0);
        assert!(container.leave(&outer).is_err());
    }

    #[test]
    fn test_run_scope_leaves_on_panic() {
        let container = Container::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            container.run_scope("doomed", |_| panic!("handler failed"));
        }));
        assert!(result.is_err());
        assert_eq!(container.depth(), 0);
    }

    #[test]
    fn test_finalizers_run_on_leave() {
        static CLOSED: AtomicUsize = AtomicUsize::new(0);
        let container = Container::new();
        container.declare_constructor(
            Constructor::factory(alias("conn"), Vec::new(), |_: &Arguments| Ok::<_, DiError>(7usize))
                .on_finalize(|n: &usize| {
                    CLOSED.fetch_add(*n, Ordering::SeqCst);
                }),
        );

        container.run_scope("request", |c| {
            c.get(alias("conn")).unwrap();
            c.get(alias("conn")).unwrap();
            assert_eq!(CLOSED.load(Ordering::SeqCst), 0);
        });
        assert_eq!(CLOSED.load(Ordering::SeqCst), 14);
    }

    #[test]
    fn test_scope_constraint() {
        let container = Container::new();
        container.declare_constructor(
            Constructor::from_fn(|| String::from("session"))
                .in_scope("request")
                .singleton(),
        );

        let err = container.resolve::<String>().unwrap_err();
        assert!(matches!(err, DiError::BadScope { ref scope, .. } if scope == "request"));

        container.run_scope("request", |c| {
            let a = c.resolve::<String>().unwrap();
            let nested = c.run_scope("inner", |c| c.resolve::<String>().unwrap());
            assert!(Arc::ptr_eq(&a, &nested));
        });

        let relaxed = Container::with_options(Options::new().check_scope(false));
        relaxed.declare_constructor(Constructor::from_fn(|| 1u8).in_scope("request"));
        assert!(relaxed.resolve::<u8>().is_ok());
    }

    #[test]
    fn test_fork_is_isolated() {
        let container = Container::new();
        let request = container.enter("request");

        let forked = container.fork();
        assert_eq!(forked.depth(), 1);
        assert!(forked.leave(&request).is_err());

        let job = forked.enter(ScopeConfig::new("job").instance(alias("job.id"), 9u32));
        assert!(forked.has(alias("job.id")));
        assert!(!container.has(alias("job.id")));

        forked.leave(&job).unwrap();
        container.leave(&request).unwrap();
    }

    #[test]
    fn test_forks_on_threads() {
        let container = Container::new();
        container
            .scope_binder("worker")
            .bind_singleton(alias("state"), Resolver::from_fn(|| std::sync::Mutex::new(0u32)));

        let states: Vec<Instance> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let forked = container.fork();
                    s.spawn(move || forked.run_scope("worker", |c| c.get(alias("state")).unwrap()))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for (i, a) in states.iter().enumerate() {
            for b in &states[i + 1..] {
                assert!(!Arc::ptr_eq(a, b));
            }
        }
    }

    #[test]
    fn test_clones_resolve_concurrently() {
        let container = Container::new();
        container.bind(
            alias("slow"),
            Resolver::from_fn(|| {
                std::thread::sleep(std::time::Duration::from_millis(50));
                1u8
            }),
        );

        let results: Vec<Result<Instance>> = std::thread::scope(|s| {
            let cloned: Vec<_> = (0..4)
                .map(|_| {
                    let handle = container.clone();
                    s.spawn(move || handle.get(alias("slow")))
                })
                .collect();
            let shared: Vec<_> = (0..4)
                .map(|_| s.spawn(|| container.get(alias("slow"))))
                .collect();
            cloned
                .into_iter()
                .chain(shared)
                .map(|h| h.join().unwrap())
                .collect()
        });

        for result in results {
            assert!(result.is_ok(), "{result:?}");
        }
        assert_eq!(container.tracer.depth(), 0);
    }

    #[test]
    fn test_clone_enters_scopes_independently() {
        let container = Container::new();
        let other = container.clone();

        let request = container.enter(ScopeConfig::new("request").instance(alias("user"), "alice"));
        assert!(container.has(alias("user")));
        assert!(!other.has(alias("user")));
        assert_eq!(other.depth(), 0);

        let inherited = container.clone();
        assert!(inherited.has(alias("user")));
        assert!(inherited.leave(&request).is_err());

        container.leave(&request).unwrap();
        assert!(!container.has(alias("user")));
    }

    #[test]
    fn test_has_and_lookup() {
        struct Widget;

        let container = Container::new();
        assert!(!container.has(Identifier::of::<Widget>()));

        container.declare_constructor(Constructor::from_fn(|| Widget));
        assert!(container.has(Identifier::of::<Widget>()));
        assert!(container.lookup(Identifier::of::<Widget>()).is_none());
        assert_eq!(container.describe(Identifier::of::<Widget>()).unwrap().len(), 0);

        container.bind(alias("w"), Resolver::concrete::<Widget>());
        assert!(container.lookup(alias("w")).is_some());
        assert!(container.resolve_binding(alias("w")).unwrap().is_some());
        assert!(container.get_as::<Widget>(alias("w")).is_ok());

        assert!(container.unbind(alias("w")).is_some());
        assert!(!container.has(alias("w")));
    }

    #[test]
    fn test_type_mismatch() {
        let container = Container::new();
        container.bind(alias("n"), Resolver::instance(1u8));
        let err = container.get_as::<u16>(alias("n")).unwrap_err();
        assert!(matches!(err, DiError::TypeMismatch { .. }));
    }

    #[test]
    fn test_try_resolve() {
        let container = Container::new();
        assert!(container.try_resolve::<Counter>().unwrap().is_none());
        container.bind_instance(Counter(3));
        assert_eq!(container.try_resolve::<Counter>().unwrap().unwrap().0, 3);
    }

    #[test]
    fn test_invoke_is_never_cached() {
        let container = Container::new();
        container.bind(alias("greeting"), Resolver::instance("hello"));
        let greet = Constructor::factory(
            alias("greet"),
            vec![ParameterRequest::typed("greeting", alias("greeting"))],
            |args: &Arguments| {
                args.value::<&str>("greeting")
                    .map(|g| format!("{g}, world"))
            },
        )
        .singleton();

        let a = container.invoke(&greet, Parameters::new()).unwrap();
        let b = container.invoke(&greet, Parameters::new()).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.downcast_ref::<String>().unwrap(), "hello, world");
    }
}
