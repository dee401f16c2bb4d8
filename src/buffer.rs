//! Buffer abstraction for pipeline edges.
//!
//! A buffer is any value that is safe to hand off between concurrent tasks,
//! either because it is a deep copy or because it is reference-counted and
//! immutable (the concrete media buffers in this crate are [`bytes::Bytes`]
//! backed). The pipeline moves buffers along edges without inspecting them;
//! type agreement between the two ends of an edge is checked once, when the
//! edge is created, via [`BufferType`].

use futures::stream::BoxStream;
use std::any::{Any, TypeId};
use std::fmt;

/// A value that can travel along a pipeline edge.
///
/// Blanket-implemented for every `Send + 'static` type. Buffers with shared
/// payloads should be reference-counted and immutable (e.g. `Bytes`) so
/// fan-out clones stay cheap.
pub trait Buffer: Send + 'static {}

impl<T: Send + 'static> Buffer for T {}

/// A lazy asynchronous sequence of buffers produced by an output pad.
///
/// Finite or infinite, single-consumer, and not necessarily restartable.
pub type BufferStream<B> = BoxStream<'static, B>;

/// A type-erased buffer travelling through the dynamic pipeline core.
pub type DynBuffer = Box<dyn Any + Send>;

/// A type-erased buffer stream, as driven by an edge worker.
pub type DynStream = BoxStream<'static, DynBuffer>;

/// Runtime tag identifying the buffer type carried by a pad.
///
/// Equality is by [`TypeId`]; the type name is kept for diagnostics only.
#[derive(Clone, Copy, Debug, Eq)]
pub struct BufferType {
    id: TypeId,
    name: &'static str,
}

impl BufferType {
    /// Get the tag for a concrete buffer type.
    pub fn of<B: Buffer>() -> Self {
        Self {
            id: TypeId::of::<B>(),
            name: std::any::type_name::<B>(),
        }
    }

    /// Human-readable name of the buffer type.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for BufferType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl std::hash::Hash for BufferType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for BufferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
