//! Resolution engine
//!
//! Every public entry point funnels into [`Container::make_inner`]. One call:
//!
//! 1. pushes a tracer frame (a repeat is a recursive resolution);
//! 2. follows aliases along the active path;
//! 3. hands off to an injector when one is registered;
//! 4. otherwise returns an instance, builds from a factory, or autowires a
//!    declared constructable, consulting the owning scope's singleton cache.
//!
//! No lock or map guard is held while a constructor, factory or injector runs,
//! so nested resolutions can freely re-enter the container.

use crate::arguments::{Argument, Slot};
use crate::factory::Constructor;
use crate::injector::{InjectorSource, accepts, as_injector};
use crate::proxy::ProxyHandle;
use crate::reflect::ParameterRequest;
use crate::registry::{Recipe, Redirect, Terminal, follow_aliases};
use crate::scope::{ActivePath, Scope};
use crate::{Arguments, BoxError, Container, DiError, Identifier, Instance, Parameters, Result};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace, warn};

impl Container {
    /// Resolve `id`.
    ///
    /// `context` is handed to injectors; `parameter` names the parameter this
    /// resolution fills, for the trace.
    pub(crate) fn make_inner(
        &self,
        id: &Identifier,
        params: &Parameters,
        context: Option<&str>,
        parameter: Option<&str>,
    ) -> Result<Instance> {
        let _frame = self
            .tracer
            .push(id, parameter)
            .map_err(|trace| DiError::RecursiveResolution {
                id: id.clone(),
                trace,
            })?;

        #[cfg(feature = "logging")]
        trace!(
            target: "contextual_di",
            id = id.name(),
            parameter = parameter,
            depth = self.tracer.depth(),
            "Resolving"
        );

        if let Some(Argument::Value(value)) = params.get(id.name()) {
            return Ok(Arc::clone(value));
        }

        let path = self.stack.path();
        let hops = self.shared.options.max_alias_hops;
        let Redirect {
            target,
            binding,
            first_alias,
        } = follow_aliases(id, hops, |next| path.lookup(next))
            .map_err(|fault| fault.into_error(id, hops, self.tracer.snapshot()))?;

        // The alias target gets its own frame, so reaching it again is a cycle too.
        let _target_frame = if target != *id {
            Some(self.tracer.push(&target, parameter).map_err(|trace| {
                DiError::RecursiveResolution {
                    id: target.clone(),
                    trace,
                }
            })?)
        } else {
            None
        };

        match first_alias {
            Some((owner, true)) if params.is_empty() => owner
                .singleton_cell(id)
                .get_or_try_init(|| self.resolve_target(&path, id, &target, binding, params, context))
                .cloned(),
            _ => self.resolve_target(&path, id, &target, binding, params, context),
        }
    }

    fn resolve_target(
        &self,
        path: &ActivePath,
        requested: &Identifier,
        target: &Identifier,
        binding: Option<(Arc<Scope>, Terminal)>,
        params: &Parameters,
        context: Option<&str>,
    ) -> Result<Instance> {
        let injector = path
            .find_injector(requested)
            .map(|(owner, source)| (owner, source, requested))
            .or_else(|| {
                (target != requested)
                    .then(|| path.find_injector(target))
                    .flatten()
                    .map(|(owner, source)| (owner, source, target))
            });
        if let Some((owner, source, injected)) = injector {
            return self.inject(&owner, injected, source, context);
        }

        let Some((owner, Terminal { recipe, singleton })) = binding else {
            let Some(constructor) = self.shared.catalog.get(target) else {
                return Err(DiError::NotFound {
                    id: requested.clone(),
                    trace: self.tracer.snapshot(),
                });
            };
            let home = constructor
                .is_singleton()
                .then(|| Arc::clone(path.root()));
            return self.instantiate(path, &constructor, target, home, params);
        };

        match recipe {
            Recipe::Instance(value) => Ok(value),
            Recipe::Injector(source) => {
                #[cfg(feature = "logging")]
                {
                    if singleton {
                        warn!(
                            target: "contextual_di",
                            id = target.name(),
                            "Singleton flag ignored for injector binding"
                        );
                    }
                }
                self.inject(&owner, target, source, context)
            }
            Recipe::Concrete(concrete) => {
                let constructor =
                    self.shared
                        .catalog
                        .get(&concrete)
                        .ok_or_else(|| DiError::NotFound {
                            id: concrete.clone(),
                            trace: self.tracer.snapshot(),
                        })?;
                let home = if singleton {
                    Some(owner)
                } else {
                    constructor
                        .is_singleton()
                        .then(|| Arc::clone(path.root()))
                };
                self.instantiate(path, &constructor, target, home, params)
            }
            Recipe::Factory(constructor) => {
                let home = (singleton || constructor.is_singleton()).then_some(owner);
                self.instantiate(path, &constructor, target, home, params)
            }
        }
    }

    /// Build `constructor`, through the singleton cell of `home` when given.
    ///
    /// Explicit parameters always produce a fresh, uncached instance.
    pub(crate) fn instantiate(
        &self,
        path: &ActivePath,
        constructor: &Constructor,
        key: &Identifier,
        home: Option<Arc<Scope>>,
        params: &Parameters,
    ) -> Result<Instance> {
        let constrained = match constructor.scope() {
            Some(name) if self.shared.options.check_scope => {
                let scope = path.nearest_named(name).cloned().ok_or_else(|| {
                    DiError::BadScope {
                        id: key.clone(),
                        scope: name.to_string(),
                        trace: self.tracer.snapshot(),
                    }
                })?;
                Some(scope)
            }
            _ => None,
        };

        match home {
            Some(home) if params.is_empty() => {
                let home = constrained.unwrap_or(home);
                home.singleton_cell(key)
                    .get_or_try_init(|| {
                        #[cfg(feature = "logging")]
                        debug!(
                            target: "contextual_di",
                            id = key.name(),
                            scope = %home,
                            "Creating singleton"
                        );

                        self.construct(path, constructor, params, &home)
                    })
                    .cloned()
            }
            _ => {
                let owner = constrained.unwrap_or_else(|| Arc::clone(path.current()));
                self.construct(path, constructor, params, &owner)
            }
        }
    }

    /// Resolve arguments, call the build function and register the finalizer with `owner`.
    fn construct(
        &self,
        path: &ActivePath,
        constructor: &Constructor,
        params: &Parameters,
        owner: &Arc<Scope>,
    ) -> Result<Instance> {
        let parameters = constructor.parameters();
        let mut args = Arguments::new(constructor.target().clone(), parameters.len());
        for parameter in parameters {
            let slot = self.resolve_parameter(path, constructor.target(), parameter, params)?;
            args.push(Arc::from(parameter.name()), slot);
        }

        let instance = constructor.build(&args).map_err(|err| {
            DiError::from_boxed(err, |source| DiError::CreationFailed {
                id: constructor.target().clone(),
                trace: self.tracer.snapshot(),
                source,
            })
        })?;

        if let Some(finalize) = constructor.finalizer() {
            owner.push_finalizer(Arc::clone(finalize), Arc::clone(&instance));
        }
        Ok(instance)
    }

    /// Resolve one parameter.
    ///
    /// Order: explicit argument by name, explicit argument by declared type,
    /// variadic (empty), proxy, container resolution of each candidate, default,
    /// null. Only a `NotFound` for the candidate itself falls through to the
    /// default or null; any deeper failure propagates unchanged.
    fn resolve_parameter(
        &self,
        path: &ActivePath,
        target: &Identifier,
        parameter: &ParameterRequest,
        params: &Parameters,
    ) -> Result<Slot> {
        let explicit = params.get(parameter.name()).or_else(|| {
            parameter
                .param_type()
                .candidates()
                .iter()
                .find_map(|ty| params.get(ty.name()))
        });
        if let Some(argument) = explicit {
            return self.explicit_argument(target, parameter, argument);
        }

        if parameter.is_variadic() {
            return Ok(Slot::Many(Vec::new()));
        }

        if parameter.is_proxy() {
            if let Some(id) = parameter.lookup_order().first() {
                let handle = ProxyHandle::new(id.clone(), path.current());
                return Ok(Slot::Value(Arc::new(handle)));
            }
        }

        let mut missing = None;
        if !parameter.is_proxy() {
            for candidate in parameter.lookup_order() {
                match self.make_inner(
                    candidate,
                    &Parameters::new(),
                    Some(parameter.name()),
                    Some(parameter.name()),
                ) {
                    Ok(instance) => return Ok(Slot::Value(instance)),
                    Err(err) if err.is_not_found_for(candidate) => missing = Some(err),
                    Err(err) => return Err(err),
                }
            }
        }

        if let Some(default) = parameter.default_value() {
            return Ok(Slot::Value(Arc::clone(default)));
        }
        if parameter.is_nullable() {
            return Ok(Slot::Null);
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "contextual_di",
            target_id = target.name(),
            parameter = parameter.name(),
            "Parameter cannot be resolved"
        );

        let trace = missing
            .as_ref()
            .and_then(DiError::trace)
            .cloned()
            .unwrap_or_else(|| self.tracer.snapshot());
        Err(DiError::UnresolvableParameter {
            target: target.clone(),
            parameter: parameter.name().to_string(),
            trace,
            source: missing.map(Box::new),
        })
    }

    fn explicit_argument(
        &self,
        target: &Identifier,
        parameter: &ParameterRequest,
        argument: &Argument,
    ) -> Result<Slot> {
        let invalid = |reason: String| DiError::InvalidArgument {
            target: target.clone(),
            parameter: parameter.name().to_string(),
            reason,
            trace: self.tracer.snapshot(),
        };

        match argument {
            Argument::Null if parameter.is_nullable() || parameter.is_variadic() => Ok(Slot::Null),
            Argument::Null if self.shared.options.validate_arguments => {
                Err(invalid("null given for a non-nullable parameter".into()))
            }
            Argument::Null => Ok(Slot::Null),
            Argument::List(items) if parameter.is_variadic() => items
                .iter()
                .map(|item| self.explicit_value(parameter, item, &invalid))
                .collect::<Result<Vec<_>>>()
                .map(Slot::Many),
            Argument::List(_) => Err(invalid("list given for a single-valued parameter".into())),
            single => {
                let value = self.explicit_value(parameter, single, &invalid)?;
                if parameter.is_variadic() {
                    Ok(Slot::Many(vec![value]))
                } else {
                    Ok(Slot::Value(value))
                }
            }
        }
    }

    /// One explicit value, resolving references and checking the declared type.
    fn explicit_value(
        &self,
        parameter: &ParameterRequest,
        argument: &Argument,
        invalid: &dyn Fn(String) -> DiError,
    ) -> Result<Instance> {
        let value = match argument {
            Argument::Value(value) => Arc::clone(value),
            Argument::Reference(id) => self.make_inner(
                id,
                &Parameters::new(),
                Some(parameter.name()),
                Some(parameter.name()),
            )?,
            Argument::Null => return Err(invalid("null inside an argument list".into())),
            Argument::List(_) => return Err(invalid("nested argument list".into())),
        };

        if self.shared.options.validate_arguments
            && !parameter.is_proxy()
            && !parameter.accepts(&value)
        {
            let expected = parameter
                .param_type()
                .candidates()
                .iter()
                .map(Identifier::name)
                .collect::<Vec<_>>()
                .join(" | ");
            return Err(invalid(format!("expected `{expected}`")));
        }
        Ok(value)
    }

    /// Delegate construction of `id` to an injector owned by `owner`.
    fn inject(
        &self,
        owner: &Arc<Scope>,
        id: &Identifier,
        source: InjectorSource,
        context: Option<&str>,
    ) -> Result<Instance> {
        let injector = match source {
            InjectorSource::Instance(injector) => injector,
            InjectorSource::Binding(binding) => match owner.cached_injector(id) {
                Some(injector) => injector,
                None => {
                    let instance = self.make_inner(&binding, &Parameters::new(), None, None)?;
                    let injector = as_injector(instance).ok_or_else(|| {
                        self.injector_failure(
                            id,
                            format!("`{binding}` does not resolve to an injector").into(),
                        )
                    })?;
                    owner.cache_injector(id.clone(), Arc::clone(&injector));
                    injector
                }
            },
        };

        #[cfg(feature = "logging")]
        trace!(
            target: "contextual_di",
            id = id.name(),
            context = context,
            "Delegating to injector"
        );

        let instance = injector
            .create_injection(self, id, context)
            .map_err(|err| DiError::from_boxed(err, |source| self.injector_failure(id, source)))?;

        if !accepts(id, &instance) {
            return Err(self.injector_failure(
                id,
                format!("injector returned a value that is not a `{id}`").into(),
            ));
        }
        Ok(instance)
    }

    fn injector_failure(&self, id: &Identifier, source: BoxError) -> DiError {
        DiError::InjectorFailure {
            id: id.clone(),
            trace: self.tracer.snapshot(),
            source,
        }
    }

    /// Dereference a proxy against the current active path.
    pub(crate) fn deref_proxy(&self, handle: &ProxyHandle) -> Result<Instance> {
        let creation = handle.creation_scope()?;
        let id = handle.identifier();

        if self.tracer.contains(id) {
            return Err(DiError::RecursiveProxy {
                id: id.clone(),
                trace: self.tracer.snapshot_with(id, None),
            });
        }

        if let Some(cached) = creation.cached(id) {
            #[cfg(feature = "logging")]
            trace!(
                target: "contextual_di",
                id = id.name(),
                scope = %creation,
                "Proxy reused singleton of its creation scope"
            );
            return Ok(cached);
        }

        self.make_inner(id, &Parameters::new(), None, None)
    }

    /// Build with container-resolved arguments, bypassing every cache.
    pub(crate) fn invoke_inner(&self, constructor: &Constructor, params: &Parameters) -> Result<Instance> {
        let _frame = self
            .tracer
            .push(constructor.target(), None)
            .map_err(|trace| DiError::RecursiveResolution {
                id: constructor.target().clone(),
                trace,
            })?;
        let path = self.stack.path();
        self.instantiate(&path, constructor, constructor.target(), None, params)
    }
}
