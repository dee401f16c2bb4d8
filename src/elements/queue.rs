//! Queue element for asynchronous buffering between pipeline stages.

use crate::buffer::{Buffer, BufferStream};
use crate::element::{BufferHandler, Element, PadRef, Sink, Source};
use crate::error::Error;
use crate::pipeline::Pipeline;
use futures::stream;
use futures::FutureExt;
use std::sync::Mutex;

const DEFAULT_CAPACITY: usize = 64;

/// A buffering filter that decouples producer and consumer rates.
///
/// Buffers pass through unchanged; up to `capacity` of them are held in a
/// bounded channel, after which the input handler blocks and back-pressure
/// propagates upstream.
///
/// The output stream drains the remaining buffers and ends once
/// [`Queue::finish`] has been called and the upstream edges have completed.
///
/// # Example
///
/// ```rust,ignore
/// use sluice::elements::Queue;
///
/// // Absorb bursts of up to 128 packets
/// let queue: Queue<RtpPacket> = Queue::new("q").with_capacity(128);
/// ```
pub struct Queue<B> {
    id: String,
    tx: Mutex<Option<kanal::AsyncSender<B>>>,
    rx: kanal::AsyncReceiver<B>,
}

impl<B: Buffer> Queue<B> {
    /// Create a queue with the default capacity (64 buffers).
    pub fn new(id: impl Into<String>) -> Self {
        let (tx, rx) = kanal::bounded_async(DEFAULT_CAPACITY);
        Self {
            id: id.into(),
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Set the buffer capacity. Only meaningful before wiring.
    pub fn with_capacity(self, capacity: usize) -> Self {
        let (tx, rx) = kanal::bounded_async(capacity.max(1));
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            ..self
        }
    }

    /// Number of buffers currently held.
    pub fn depth(&self) -> usize {
        self.rx.len()
    }

    /// Release the queue's hold on its output; the stream ends after the
    /// remaining buffers drain.
    pub fn finish(&self) {
        self.tx.lock().unwrap().take();
    }
}

impl<B: Buffer> Element for Queue<B> {
    fn id(&self) -> &str {
        &self.id
    }
}

impl<B: Buffer> Sink for Queue<B> {
    type Input = B;

    fn handler(&self, pad: &PadRef) -> Option<BufferHandler<B>> {
        if *pad != PadRef::InputDefault {
            return None;
        }
        let tx = self.tx.lock().unwrap().clone();
        Some(Box::new(move |_pipeline: Pipeline, buffer: B| {
            let tx = tx.clone();
            async move {
                match tx {
                    Some(tx) => tx
                        .send(buffer)
                        .await
                        .map_err(|_| Error::Element("queue output closed".into())),
                    None => Err(Error::Element("queue already finished".into())),
                }
            }
            .boxed()
        }))
    }
}

impl<B: Buffer> Source for Queue<B> {
    type Output = B;

    fn stream(&self, pad: &PadRef) -> Option<BufferStream<B>> {
        if *pad != PadRef::OutputDefault {
            return None;
        }
        let rx = self.rx.clone();
        Some(Box::pin(stream::unfold(rx, |rx| async move {
            rx.recv().await.ok().map(|buffer| (buffer, rx))
        })))
    }
}
