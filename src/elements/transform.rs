//! MapFilter element applying a function to each buffer.

use crate::buffer::{Buffer, BufferStream};
use crate::element::{BufferHandler, Element, PadRef, Sink, Source};
use crate::error::Error;
use crate::pipeline::Pipeline;
use futures::stream;
use futures::FutureExt;
use std::sync::{Arc, Mutex};

const DEFAULT_CAPACITY: usize = 16;

/// A filter that applies a function to every buffer passing through.
///
/// The input handler pushes transformed buffers into a bounded internal
/// channel and the output pad drains it, so a slow downstream back-pressures
/// the upstream edge through the channel.
///
/// The output stream ends once [`MapFilter::finish`] has been called and
/// every upstream edge feeding this filter has completed (their handlers
/// hold the channel open until then).
///
/// # Example
///
/// ```rust,ignore
/// use sluice::elements::MapFilter;
///
/// let double = MapFilter::new("double", |n: u64| n * 2);
/// ```
pub struct MapFilter<I, O> {
    id: String,
    f: Arc<dyn Fn(I) -> O + Send + Sync>,
    tx: Mutex<Option<kanal::AsyncSender<O>>>,
    rx: kanal::AsyncReceiver<O>,
}

impl<I: Buffer, O: Buffer> MapFilter<I, O> {
    /// Create a map filter from a function.
    pub fn new(id: impl Into<String>, f: impl Fn(I) -> O + Send + Sync + 'static) -> Self {
        let (tx, rx) = kanal::bounded_async(DEFAULT_CAPACITY);
        Self {
            id: id.into(),
            f: Arc::new(f),
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Set the internal channel capacity. Only meaningful before wiring.
    pub fn with_capacity(self, capacity: usize) -> Self {
        let (tx, rx) = kanal::bounded_async(capacity.max(1));
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            ..self
        }
    }

    /// Release the filter's hold on its output; the stream ends after the
    /// remaining buffers drain.
    pub fn finish(&self) {
        self.tx.lock().unwrap().take();
    }
}

impl<I: Buffer, O: Buffer> Element for MapFilter<I, O> {
    fn id(&self) -> &str {
        &self.id
    }
}

impl<I: Buffer, O: Buffer> Sink for MapFilter<I, O> {
    type Input = I;

    fn handler(&self, pad: &PadRef) -> Option<BufferHandler<I>> {
        if *pad != PadRef::InputDefault {
            return None;
        }
        let tx = self.tx.lock().unwrap().clone();
        let f = self.f.clone();
        Some(Box::new(move |_pipeline: Pipeline, buffer: I| {
            let tx = tx.clone();
            let f = f.clone();
            async move {
                match tx {
                    Some(tx) => tx
                        .send(f(buffer))
                        .await
                        .map_err(|_| Error::Element("map filter output closed".into())),
                    None => Err(Error::Element("map filter already finished".into())),
                }
            }
            .boxed()
        }))
    }
}

impl<I: Buffer, O: Buffer> Source for MapFilter<I, O> {
    type Output = O;

    fn stream(&self, pad: &PadRef) -> Option<BufferStream<O>> {
        if *pad != PadRef::OutputDefault {
            return None;
        }
        let rx = self.rx.clone();
        Some(Box::pin(stream::unfold(rx, |rx| async move {
            rx.recv().await.ok().map(|buffer| (buffer, rx))
        })))
    }
}
