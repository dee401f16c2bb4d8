//! TestSrc element for generating timed test payloads.

use crate::buffer::BufferStream;
use crate::element::{Element, PadRef, Source};
use crate::schema::EdgeId;
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A source that emits counter-stamped payloads on a fixed interval.
///
/// Useful for exercising pipelines in tests and benchmarks. Every call to
/// `stream()` yields an independent generator starting at sequence zero, so
/// the element can feed several edges (each sees the same emissions).
///
/// # Example
///
/// ```rust,ignore
/// use sluice::elements::TestSrc;
/// use std::time::Duration;
///
/// // 10 buffers of 32 bytes, one every 10 ms
/// let src = TestSrc::new("src")
///     .with_interval(Duration::from_millis(10))
///     .with_num_buffers(10);
/// ```
pub struct TestSrc {
    id: String,
    interval: Duration,
    num_buffers: u64,
    buffer_size: usize,
    cancelled: Arc<Mutex<Vec<EdgeId>>>,
}

impl TestSrc {
    /// Create a test source with default settings (10 buffers of 32 bytes
    /// at 10 ms intervals).
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            interval: Duration::from_millis(10),
            num_buffers: 10,
            buffer_size: 32,
            cancelled: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the emission interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the number of buffers to produce.
    pub fn with_num_buffers(mut self, count: u64) -> Self {
        self.num_buffers = count;
        self
    }

    /// Set the payload size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(8);
        self
    }

    /// Produce for roughly the given wall-clock duration instead of a fixed
    /// buffer count.
    pub fn run_for(mut self, total: Duration) -> Self {
        let ticks = total.as_nanos() / self.interval.as_nanos().max(1);
        self.num_buffers = ticks as u64;
        self
    }

    /// Edges whose cancellation was delivered to this source.
    pub fn cancelled_edges(&self) -> Vec<EdgeId> {
        self.cancelled.lock().unwrap().clone()
    }
}

/// Fill a payload with the sequence number repeated little-endian.
fn counter_payload(seq: u64, size: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(size);
    let pattern = seq.to_le_bytes();
    while buf.len() < size {
        let take = (size - buf.len()).min(pattern.len());
        buf.put_slice(&pattern[..take]);
    }
    buf.freeze()
}

impl Element for TestSrc {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Source for TestSrc {
    type Output = Bytes;

    fn stream(&self, pad: &PadRef) -> Option<BufferStream<Bytes>> {
        if *pad != PadRef::OutputDefault {
            return None;
        }
        let interval = self.interval;
        let limit = self.num_buffers;
        let size = self.buffer_size;
        Some(Box::pin(stream::unfold(0u64, move |seq| async move {
            if seq >= limit {
                return None;
            }
            tokio::time::sleep(interval).await;
            Some((counter_payload(seq, size), seq + 1))
        })))
    }

    fn on_cancel(&self, edge: &EdgeId) {
        self.cancelled.lock().unwrap().push(edge.clone());
    }
}
