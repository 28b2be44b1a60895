//! # Contextual DI - Scoped, Context-Aware Dependency Injection for Rust
//!
//! A dependency injection container that resolves through a stack of named
//! scopes, lets injectors build instances for the call site asking for them,
//! and reports failures with the full resolution chain.
//!
//! ## Features
//!
//! - **Autowiring** - constructables declare their parameters as data and the
//!   container fills them from bindings, explicit arguments, defaults or null
//! - **Scopes** - bindings and singletons live in the scope they were made in
//!   and disappear when it is left
//! - **Injectors** - per-identifier delegates that receive the requesting
//!   parameter name as context
//! - **Proxies** - deferred handles that break construction cycles
//! - **Traced errors** - every resolution error carries `A -> B -> C`
//! - **Concurrent** - `DashMap` registries and per-handle scope stacks; fork a
//!   handle per thread or task
//! - **Observable** - optional `tracing` events under the `contextual_di` target
//!
//! ## Quick Start
//!
//! ```rust
//! use contextual_di::{Arguments, BoxError, Container, Identifier, ParameterRequest, Resolver};
//! use contextual_di::{Autowire, ScopeConfig};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//!     user: Arc<String>,
//! }
//!
//! impl Autowire for UserService {
//!     fn parameters() -> Vec<ParameterRequest> {
//!         vec![
//!             ParameterRequest::of::<Database>("db"),
//!             ParameterRequest::typed("user", Identifier::alias("request.user")),
//!         ]
//!     }
//!
//!     fn construct(args: &Arguments) -> Result<Self, BoxError> {
//!         Ok(UserService { db: args.get("db")?, user: args.get("user")? })
//!     }
//! }
//!
//! let container = Container::new();
//! container.bind_singleton(
//!     Identifier::of::<Database>(),
//!     Resolver::from_fn(|| Database { url: "postgres://localhost".into() }),
//! );
//! container.declare::<UserService>();
//!
//! let request = ScopeConfig::new("request")
//!     .instance(Identifier::alias("request.user"), String::from("alice"));
//!
//! let users = container.run_scope(request, |c| c.resolve::<UserService>()).unwrap();
//! assert_eq!(*users.user, "alice");
//! assert_eq!(users.db.url, "postgres://localhost");
//!
//! // Outside the request scope the user is gone again.
//! let Err(err) = container.resolve::<UserService>() else {
//!     panic!("resolved without a request scope");
//! };
//! assert_eq!(
//!     err.trace().unwrap().to_string(),
//!     format!("{} -> request.user", std::any::type_name::<UserService>()),
//! );
//! ```
//!
//! ## Resolution order
//!
//! For each requested identifier the container tries, in order: an injector
//! registered for it, its innermost binding (following aliases), and finally
//! autowiring a declared constructable. For each constructor parameter:
//! an explicit argument, the container, the declared default, then null.

extern crate self as contextual_di;

mod arguments;
mod container;
mod error;
mod factory;
mod identifier;
mod injector;
#[cfg(feature = "logging")]
pub mod logging;
mod options;
mod provider;
mod proxy;
mod reflect;
mod registry;
mod resolve;
mod scope;
mod tracer;

pub use arguments::{Argument, Arguments, Parameters};
pub use container::{Container, ScopeBinder};
pub use error::{BoxError, DiError, Result};
pub use factory::Constructor;
pub use identifier::{Identifier, Instance};
pub use injector::{Injector, InjectorSource, injector_fn, injector_instance};
pub use options::{DEFAULT_MAX_ALIAS_HOPS, Options};
pub use provider::{Autowire, Injectable};
pub use proxy::{Proxy, ProxyHandle};
pub use reflect::{ParamType, ParameterRequest};
pub use registry::{Binding, Registry, Resolver};
pub use scope::{ROOT_SCOPE, Scope, ScopeConfig, ScopeGuard, ScopeHandle};
pub use tracer::{Frame, Trace};

#[cfg(feature = "derive")]
pub use contextual_di_derive::Autowire;

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Argument, Arguments, Autowire, BoxError, Constructor, Container, DiError, Identifier,
        Injectable, Injector, Instance, ParameterRequest, Parameters, Proxy, Resolver, Result,
        ScopeConfig,
    };
    pub use std::sync::Arc;
}
