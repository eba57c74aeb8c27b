//! Artifact naming, type-erased artifact values, and shape declarations.
//!
//! Raw and derived values share one `ArtifactId` namespace. Every value is
//! constructed exactly once per run, so pointer identity of the backing
//! `Arc` is a correct cache identity for the derivation cache.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Opaque, unique name for one kind of raw or derived value.
///
/// Uniqueness within a run is enforced by the dependency resolver;
/// redefinition is a fatal configuration error.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Create an artifact id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArtifactId({})", self.0)
    }
}

impl From<&str> for ArtifactId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ArtifactId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Declared shape of an artifact value.
///
/// Producers declare the shape of what they publish and consumers declare
/// the shape they demand; the resolver checks both sides against the closed
/// registry before any session work starts, so shape bugs never surface at
/// consumption time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeId {
    type_id: TypeId,
    name: &'static str,
}

impl ShapeId {
    /// The shape of the Rust type `T`.
    pub fn of<T: Any + Send + Sync>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Human-readable type name, for diagnostics and reports.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A type-erased, immutable artifact value.
///
/// Cloning clones the `Arc`, never the payload. The wrapped value is
/// immutable after publication; nothing in the engine hands out mutable
/// access.
#[derive(Clone)]
pub struct ArtifactValue {
    inner: Arc<dyn Any + Send + Sync>,
    shape: ShapeId,
}

impl ArtifactValue {
    /// Wrap a value produced by a collector or derivation.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            shape: ShapeId::of::<T>(),
        }
    }

    /// Borrow the payload as `T`, if the shape matches.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Shape declared by the producer.
    pub fn shape(&self) -> ShapeId {
        self.shape
    }

    /// Pointer identity of the backing allocation.
    ///
    /// Correct as a cache identity only because each raw and derived value
    /// is produced exactly once per run, and the store/cache keep the `Arc`
    /// alive for the whole run. Never reuse these identities across runs.
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

impl fmt::Debug for ArtifactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArtifactValue({})", self.shape.name)
    }
}

/// Producer-side declaration: the id an artifact is published under and the
/// shape of its value.
#[derive(Debug, Clone)]
pub struct ArtifactDescriptor {
    pub id: ArtifactId,
    pub shape: ShapeId,
}

impl ArtifactDescriptor {
    /// Declare an artifact of shape `T` under `id`.
    pub fn of<T: Any + Send + Sync>(id: impl Into<ArtifactId>) -> Self {
        Self {
            id: id.into(),
            shape: ShapeId::of::<T>(),
        }
    }
}
