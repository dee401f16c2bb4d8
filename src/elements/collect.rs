//! CollectSink element accumulating buffers for inspection.

use crate::buffer::Buffer;
use crate::element::{BufferHandler, Element, PadRef, Sink};
use crate::pipeline::Pipeline;
use futures::FutureExt;
use std::sync::{Arc, Mutex};

/// A sink that stores every received buffer.
///
/// Intended for tests and diagnostics: wire it at the end of a pipeline and
/// inspect what arrived with [`CollectSink::collected`].
pub struct CollectSink<B> {
    id: String,
    collected: Arc<Mutex<Vec<B>>>,
}

impl<B: Buffer> CollectSink<B> {
    /// Create a collecting sink.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            collected: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of buffers received so far.
    pub fn len(&self) -> usize {
        self.collected.lock().unwrap().len()
    }

    /// Whether nothing has been received yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take all received buffers, leaving the sink empty.
    pub fn take(&self) -> Vec<B> {
        std::mem::take(&mut *self.collected.lock().unwrap())
    }
}

impl<B: Buffer + Clone> CollectSink<B> {
    /// Snapshot of the received buffers, in arrival order.
    pub fn collected(&self) -> Vec<B> {
        self.collected.lock().unwrap().clone()
    }
}

impl<B: Buffer> Element for CollectSink<B> {
    fn id(&self) -> &str {
        &self.id
    }
}

impl<B: Buffer> Sink for CollectSink<B> {
    type Input = B;

    fn handler(&self, pad: &PadRef) -> Option<BufferHandler<B>> {
        if *pad != PadRef::InputDefault {
            return None;
        }
        let collected = self.collected.clone();
        Some(Box::new(move |_pipeline: Pipeline, buffer: B| {
            let collected = collected.clone();
            async move {
                collected.lock().unwrap().push(buffer);
                Ok(())
            }
            .boxed()
        }))
    }
}
