//! Core element traits.

use crate::buffer::{Buffer, BufferStream};
use crate::element::PadRef;
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::schema::EdgeId;
use futures::future::BoxFuture;
use smallvec::{smallvec, SmallVec};

/// Handler attached to an input pad, invoked once per buffer.
///
/// The handler receives a handle to the owning pipeline and the buffer, and
/// returns when it has accepted the buffer. Back-pressure is implicit: the
/// edge worker does not pull the next buffer until the handler completes.
pub type BufferHandler<B> = Box<dyn FnMut(Pipeline, B) -> BoxFuture<'static, Result<()>> + Send>;

/// An identified processing element.
///
/// Elements are constructed by the embedder, shared as `Arc`s, and borrowed
/// by the pipeline through the schema. Element state lives behind interior
/// mutability; the handlers and streams an element hands out serialize
/// access to it, so each element behaves as a single-threaded actor.
pub trait Element: Send + Sync + 'static {
    /// Stable identifier, unique across the whole pipeline.
    fn id(&self) -> &str;
}

/// An element that produces buffers on output pads.
pub trait Source: Element {
    /// The buffer type produced on every output pad.
    type Output: Buffer;

    /// The output pads this element exposes.
    fn output_pads(&self) -> SmallVec<[PadRef; 2]> {
        smallvec![PadRef::OutputDefault]
    }

    /// Open the buffer stream for a pad.
    ///
    /// Returns `None` for unknown pads. Streams are single-consumer and not
    /// necessarily restartable; fan-out from one pad needs a multicast
    /// element (see `elements::Tee`) so each consumer gets its own stream.
    fn stream(&self, pad: &PadRef) -> Option<BufferStream<Self::Output>>;

    /// Called when an edge fed by this element is cancelled, so producer
    /// resources (capture sessions, sockets) can be released.
    fn on_cancel(&self, _edge: &EdgeId) {}
}

/// An element that consumes buffers on input pads.
pub trait Sink: Element {
    /// The buffer type accepted on every input pad.
    type Input: Buffer;

    /// The input pads this element exposes.
    fn input_pads(&self) -> SmallVec<[PadRef; 2]> {
        smallvec![PadRef::InputDefault]
    }

    /// Bind a handler for a pad.
    ///
    /// Returns `None` for unknown pads. Called once per edge; elements that
    /// accept fan-in hand out one handler per upstream edge, all feeding the
    /// same serialized state.
    fn handler(&self, pad: &PadRef) -> Option<BufferHandler<Self::Input>>;
}

/// An element that both consumes and produces buffers.
///
/// Blanket-implemented for anything that is both a [`Source`] and a
/// [`Sink`].
pub trait Filter: Source + Sink {}

impl<T: Source + Sink> Filter for T {}
