//! Tee element for fan-out to multiple consumers.

use crate::buffer::{Buffer, BufferStream};
use crate::element::{BufferHandler, Element, PadRef, Sink, Source};
use crate::pipeline::Pipeline;
use futures::stream;
use futures::FutureExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const DEFAULT_CAPACITY: usize = 16;

/// A multicast filter duplicating every buffer to all subscribed consumers.
///
/// Output-pad streams are single-consumer, so fan-out from one pad needs an
/// element that clones buffers into one channel per consumer. Every call to
/// `stream()` registers a fresh subscriber; a subscriber whose stream is
/// dropped is pruned on the next delivery without disturbing its peers.
///
/// # Example
///
/// ```rust,ignore
/// use sluice::elements::Tee;
///
/// let tee: Arc<Tee<Bytes>> = Arc::new(Tee::new("split"));
/// // groups: src -> tee, then tee (by reference) -> each consumer
/// ```
pub struct Tee<B> {
    id: String,
    capacity: usize,
    next_subscriber: AtomicU64,
    subscribers: Arc<Mutex<Vec<(u64, kanal::AsyncSender<B>)>>>,
}

impl<B: Buffer + Clone> Tee<B> {
    /// Create a tee with the default per-subscriber capacity.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capacity: DEFAULT_CAPACITY,
            next_subscriber: AtomicU64::new(0),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the per-subscriber channel capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Drop every subscriber sender; their streams end after the buffered
    /// items drain.
    pub fn finish(&self) {
        self.subscribers.lock().unwrap().clear();
    }
}

impl<B: Buffer + Clone> Element for Tee<B> {
    fn id(&self) -> &str {
        &self.id
    }
}

impl<B: Buffer + Clone> Sink for Tee<B> {
    type Input = B;

    fn handler(&self, pad: &PadRef) -> Option<BufferHandler<B>> {
        if *pad != PadRef::InputDefault {
            return None;
        }
        let subscribers = self.subscribers.clone();
        Some(Box::new(move |_pipeline: Pipeline, buffer: B| {
            let subscribers = subscribers.clone();
            async move {
                // Snapshot so no lock is held across the sends.
                let targets: Vec<(u64, kanal::AsyncSender<B>)> =
                    subscribers.lock().unwrap().clone();
                let mut gone = Vec::new();
                for (subscriber, tx) in &targets {
                    if tx.send(buffer.clone()).await.is_err() {
                        gone.push(*subscriber);
                    }
                }
                if !gone.is_empty() {
                    subscribers
                        .lock()
                        .unwrap()
                        .retain(|(subscriber, _)| !gone.contains(subscriber));
                }
                Ok(())
            }
            .boxed()
        }))
    }
}

impl<B: Buffer + Clone> Source for Tee<B> {
    type Output = B;

    fn stream(&self, pad: &PadRef) -> Option<BufferStream<B>> {
        if *pad != PadRef::OutputDefault {
            return None;
        }
        let (tx, rx) = kanal::bounded_async(self.capacity);
        let subscriber = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().unwrap().push((subscriber, tx));
        Some(Box::pin(stream::unfold(rx, |rx| async move {
            rx.recv().await.ok().map(|buffer| (buffer, rx))
        })))
    }
}
