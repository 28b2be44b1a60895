//! Provider traits for dependency injection
//!
//! These traits define what types can be injected and how constructable types
//! describe themselves to the container.

use crate::{Arguments, BoxError, ParameterRequest};

/// Marker trait for types that can be stored in the container.
///
/// This is automatically implemented for all types that are `Send + Sync + 'static`.
/// You never need to implement this manually.
pub trait Injectable: Send + Sync + 'static {}

// Blanket implementation - everything that's Send + Sync + 'static is Injectable
impl<T: Send + Sync + 'static> Injectable for T {}

/// A type the container can construct by resolving its parameters.
///
/// This is the declared counterpart of constructor reflection: `parameters()`
/// lists the formal parameters in declaration order and `construct()` receives
/// them resolved.
///
/// # Examples
///
/// ```rust
/// use contextual_di::{Arguments, Autowire, BoxError, Container, ParameterRequest};
/// use std::sync::Arc;
///
/// struct Database {
///     url: String,
/// }
///
/// impl Autowire for Database {
///     fn parameters() -> Vec<ParameterRequest> {
///         vec![ParameterRequest::new("url").with_default(String::from("postgres://localhost"))]
///     }
///
///     fn construct(args: &Arguments) -> Result<Self, BoxError> {
///         Ok(Database { url: args.value("url")? })
///     }
/// }
///
/// struct UserService {
///     db: Arc<Database>,
/// }
///
/// impl Autowire for UserService {
///     fn parameters() -> Vec<ParameterRequest> {
///         vec![ParameterRequest::of::<Database>("db")]
///     }
///
///     fn construct(args: &Arguments) -> Result<Self, BoxError> {
///         Ok(UserService { db: args.get("db")? })
///     }
/// }
///
/// let container = Container::new();
/// container.declare::<Database>();
/// container.declare::<UserService>();
///
/// let users = container.resolve::<UserService>().unwrap();
/// assert_eq!(users.db.url, "postgres://localhost");
/// ```
pub trait Autowire: Injectable + Sized {
    /// Cache one instance per owning scope even without a singleton binding.
    const SINGLETON: bool = false;

    /// Name of the scope this type must be resolved in.
    const SCOPE: Option<&'static str> = None;

    /// Call [`Autowire::finalize`] when the owning scope is left.
    const FINALIZE: bool = false;

    /// Formal parameters in declaration order.
    fn parameters() -> Vec<ParameterRequest>;

    /// Build the instance from resolved arguments.
    fn construct(args: &Arguments) -> Result<Self, BoxError>;

    /// Release resources when the owning scope is left.
    fn finalize(&self) {}
}
