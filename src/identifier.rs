//! Identifiers naming requested dependencies
//!
//! An identifier is either a type name (derived from a Rust type) or a free-form
//! string alias. Both kinds share one key space: equality and hashing only look
//! at the name.
//!
//! Type identifiers are keyed by [`std::any::type_name`], which is not
//! guaranteed unique. Two distinct types whose names collide (the same path
//! compiled into two versions of one crate, for instance) share a key; give
//! one of them an alias when that happens. Typed accessors still downcast
//! against the recorded `TypeId`, so a collision surfaces as a type mismatch
//! rather than a wrongly typed value.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Type-erased instance handed out by the container.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Key used to request a dependency.
///
/// # Examples
///
/// ```rust
/// use contextual_di::Identifier;
///
/// struct Database;
///
/// let by_type = Identifier::of::<Database>();
/// let by_alias = Identifier::alias("db.primary");
///
/// assert!(by_type.is_type());
/// assert!(!by_alias.is_type());
/// assert_eq!(by_alias.name(), "db.primary");
/// ```
#[derive(Clone)]
pub struct Identifier {
    name: Arc<str>,
    type_id: Option<TypeId>,
}

impl Identifier {
    /// Identifier for a concrete Rust type.
    #[inline]
    pub fn of<T: 'static>() -> Self {
        Self {
            name: Arc::from(std::any::type_name::<T>()),
            type_id: Some(TypeId::of::<T>()),
        }
    }

    /// Identifier for a string alias.
    #[inline]
    pub fn alias(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            type_id: None,
        }
    }

    /// The name used as key.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `TypeId` recorded when the identifier was derived from a type.
    #[inline]
    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    /// Whether the identifier was derived from a Rust type.
    #[inline]
    pub fn is_type(&self) -> bool {
        self.type_id.is_some()
    }

    /// Check whether an instance carries the type this identifier was derived from.
    ///
    /// Aliases accept anything.
    pub fn accepts(&self, instance: &Instance) -> bool {
        match self.type_id {
            Some(expected) => Any::type_id(&**instance) == expected,
            None => true,
        }
    }
}

impl PartialEq for Identifier {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_type() {
            write!(f, "Identifier(type {})", self.name)
        } else {
            write!(f, "Identifier(alias {:?})", &*self.name)
        }
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Self::alias(name)
    }
}

impl From<String> for Identifier {
    fn from(name: String) -> Self {
        Self::alias(name)
    }
}

impl From<&Identifier> for Identifier {
    fn from(id: &Identifier) -> Self {
        id.clone()
    }
}
