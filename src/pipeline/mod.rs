//! Pipeline runtime: edge workers, lifecycle, dynamic mutation.
//!
//! The [`Pipeline`] owns the schema groups handed to [`Pipeline::spec`] and
//! one background worker task per resolved edge. A worker pulls buffers from
//! the source pad's stream and awaits the sink pad's handler for each one,
//! so upstream throughput is gated by downstream latency with no internal
//! queueing.
//!
//! # Example
//!
//! ```rust,ignore
//! use sluice::pipeline::Pipeline;
//! use sluice::schema::{Child, Group};
//!
//! let pipeline = Pipeline::new();
//! pipeline.build_linear(vec![
//!     Child::source(src),
//!     Child::filter(pay),
//!     Child::sink(net),
//! ]).await?;
//!
//! pipeline.wait_for_completion().await;
//! pipeline.stop().await;
//! ```

use crate::buffer::DynStream;
use crate::error::Result;
use crate::schema::{self, DynHandler, EdgeId, Group, PendingEdge};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// A snapshot of pipeline state, as reported by [`Pipeline::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStatus {
    /// Number of distinct owning element ids in the schema.
    pub child_count: usize,
    /// Number of edges whose worker task is still live.
    pub active_connections: usize,
    /// Ids of the schema groups, in declaration order.
    pub groups: Vec<String>,
}

/// An edge with a live (or finished) worker task.
struct ActiveEdge {
    id: EdgeId,
    cancel: CancellationToken,
    notify_cancel: Arc<dyn Fn(&EdgeId) + Send + Sync>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    groups: Vec<Group>,
    edges: Vec<ActiveEdge>,
}

/// A graph-structured media pipeline.
///
/// Cheap to clone; all clones share the same schema and edges. The shared
/// state is guarded by a single async mutex, so schema mutation is
/// serialized, and worker completion is tracked so `stop` and
/// `wait_for_completion` can await it without holding that lock (handlers
/// may re-enter the pipeline).
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Mutex<Inner>>,
    tracker: TaskTracker,
}

impl Pipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            tracker: TaskTracker::new(),
        }
    }

    /// Append schema groups and spawn workers for the new edges.
    ///
    /// Re-resolves the whole schema; edges already live (same identity) are
    /// left untouched, so the call is idempotent with respect to running
    /// connections. A fatal schema error leaves the pipeline unchanged. An
    /// edge whose pads carry different buffer types is rejected with a
    /// warning; its siblings still start.
    pub async fn spec(&self, items: Vec<Group>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let base = inner.groups.len();
        inner.groups.extend(items);

        let pending = match schema::resolve(&inner.groups) {
            Ok(pending) => pending,
            Err(e) => {
                inner.groups.truncate(base);
                return Err(e);
            }
        };

        let live: HashSet<EdgeId> = inner.edges.iter().map(|e| e.id.clone()).collect();
        for edge in pending {
            if live.contains(&edge.id) {
                continue;
            }
            self.spawn_edge(&mut inner, edge);
        }
        Ok(())
    }

    /// Replace the schema with a single linear group named `"main"`.
    ///
    /// Live edges are stopped first; see [`Pipeline::build_groups`].
    pub async fn build_linear(&self, children: Vec<schema::Child>) -> Result<()> {
        self.build_groups(vec![Group::new("main", children)]).await
    }

    /// Replace the whole schema with the given groups.
    ///
    /// Stops every live edge (delivering source cancellations), clears the
    /// previous groups, then runs [`Pipeline::spec`] on the new ones.
    pub async fn build_groups(&self, groups: Vec<Group>) -> Result<()> {
        self.stop().await;
        self.inner.lock().await.groups.clear();
        self.spec(groups).await
    }

    /// Ensure workers are running.
    ///
    /// Workers start at `spec` time, so this is a no-op kept for lifecycle
    /// symmetry with [`Pipeline::stop`].
    pub async fn start(&self) {
        let inner = self.inner.lock().await;
        tracing::debug!(edges = inner.edges.len(), "pipeline started");
    }

    /// Cancel every worker, notify sources, and drain the edge list.
    ///
    /// In-flight handler calls are allowed to finish; this returns once all
    /// workers have exited. Infallible.
    pub async fn stop(&self) {
        let edges: Vec<ActiveEdge> = {
            let mut inner = self.inner.lock().await;
            inner.edges.drain(..).collect()
        };
        for edge in &edges {
            edge.cancel.cancel();
            (edge.notify_cancel)(&edge.id);
        }
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancel and drop every edge that has the given element as source or
    /// sink, remove the element's schema entries, and drop groups left
    /// empty. Affected sources are notified. Infallible.
    pub async fn remove_child(&self, id: &str) {
        let removed: Vec<ActiveEdge> = {
            let mut inner = self.inner.lock().await;
            let (removed, kept): (Vec<ActiveEdge>, Vec<ActiveEdge>) = inner
                .edges
                .drain(..)
                .partition(|e| e.id.source == id || e.id.sink == id);
            inner.edges = kept;
            for group in &mut inner.groups {
                group.children.retain(|c| c.id() != id);
            }
            inner.groups.retain(|g| !g.children.is_empty());
            removed
        };
        for edge in &removed {
            tracing::debug!(edge = %edge.id, "removing edge");
            edge.cancel.cancel();
            (edge.notify_cancel)(&edge.id);
        }
    }

    /// Report child count, live connections, and group ids.
    pub async fn status(&self) -> PipelineStatus {
        let inner = self.inner.lock().await;
        let mut ids = HashSet::new();
        for group in &inner.groups {
            for child in &group.children {
                if child.is_owned() {
                    ids.insert(child.id());
                }
            }
        }
        PipelineStatus {
            child_count: ids.len(),
            active_connections: inner.edges.iter().filter(|e| !e.task.is_finished()).count(),
            groups: inner.groups.iter().map(|g| g.id.clone()).collect(),
        }
    }

    /// Wait until every worker task has finished (sources exhausted their
    /// streams, or edges were cancelled).
    pub async fn wait_for_completion(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Type-check and spawn one edge worker. Non-fatal failures (type
    /// mismatch, unavailable stream or handler) log and skip the edge.
    fn spawn_edge(&self, inner: &mut Inner, pending: PendingEdge) {
        let opened = {
            let source_port = match inner.groups[pending.source.0].children[pending.source.1]
                .output_port()
            {
                Some(port) => port,
                None => return,
            };
            let sink_port =
                match inner.groups[pending.sink.0].children[pending.sink.1].input_port() {
                    Some(port) => port,
                    None => return,
                };

            if source_port.ty != sink_port.ty {
                let err = crate::Error::PadTypeMismatch {
                    edge: pending.id.to_string(),
                    source_ty: source_port.ty.name().to_string(),
                    sink: sink_port.ty.name().to_string(),
                };
                tracing::warn!(error = %err, "rejecting edge");
                return;
            }

            let stream = (source_port.open)(&pending.source_pad);
            let handler = (sink_port.bind)(&pending.sink_pad);
            (stream, handler, source_port.cancel.clone())
        };

        let (Some(stream), Some(handler), notify_cancel) = opened else {
            tracing::warn!(edge = %pending.id, "rejecting edge: pad unavailable");
            return;
        };

        let cancel = CancellationToken::new();
        let task = self.tracker.spawn(run_edge(
            self.clone(),
            pending.id.clone(),
            stream,
            handler,
            cancel.clone(),
        ));
        inner.edges.push(ActiveEdge {
            id: pending.id,
            cancel,
            notify_cancel,
            task,
        });
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

/// Worker body for one edge: pull, deliver, repeat.
///
/// Cancellation is observed between buffers, so an in-flight handler call
/// always runs to completion. A failing handler closes only this edge.
async fn run_edge(
    pipeline: Pipeline,
    id: EdgeId,
    mut stream: DynStream,
    mut handler: DynHandler,
    cancel: CancellationToken,
) {
    tracing::debug!(edge = %id, "edge worker started");
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            item = stream.next() => item,
        };
        let Some(buffer) = next else {
            break;
        };
        if let Err(e) = handler(pipeline.clone(), buffer).await {
            tracing::warn!(edge = %id, error = %e, "handler failed; closing edge");
            break;
        }
    }
    tracing::debug!(edge = %id, "edge worker finished");
}
