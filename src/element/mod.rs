//! Element system for Sluice pipelines.
//!
//! This module defines the traits and types pipeline elements are built
//! from:
//!
//! - [`Source`]: produces buffers on output pads
//! - [`Sink`]: consumes buffers on input pads
//! - [`Filter`]: both (blanket-implemented)
//! - [`PadRef`]: identifies one pad on an element
//!
//! # Design
//!
//! An output pad exposes a lazy asynchronous sequence of one buffer type; an
//! input pad exposes a handler invoked once per buffer with a pipeline
//! handle. The pipeline runtime drives one worker task per connected edge,
//! awaiting the handler before pulling the next buffer, so back-pressure
//! needs no extra machinery.
//!
//! # Example
//!
//! ```rust,ignore
//! use sluice::element::{Element, Sink, BufferHandler, PadRef};
//!
//! struct ByteCounter { id: String, total: Arc<Mutex<usize>> }
//!
//! impl Element for ByteCounter {
//!     fn id(&self) -> &str { &self.id }
//! }
//!
//! impl Sink for ByteCounter {
//!     type Input = Bytes;
//!     fn handler(&self, pad: &PadRef) -> Option<BufferHandler<Bytes>> {
//!         (*pad == PadRef::InputDefault).then(|| {
//!             let total = self.total.clone();
//!             Box::new(move |_pipeline, buf: Bytes| {
//!                 let total = total.clone();
//!                 async move { *total.lock().unwrap() += buf.len(); Ok(()) }.boxed()
//!             }) as BufferHandler<Bytes>
//!         })
//!     }
//! }
//! ```

mod pad;
mod traits;

pub use pad::PadRef;
pub use traits::{BufferHandler, Element, Filter, Sink, Source};
