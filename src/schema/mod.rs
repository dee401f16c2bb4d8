//! Pipeline schema: groups of children resolved into edges.
//!
//! A schema is a sequence of [`Group`]s. Each group holds an ordered list of
//! [`Child`]ren which are connected linearly inside the group
//! (`child[i].out -> child[i+1].in`). A child either *owns* an element
//! (source, filter, or sink) or *references* an element owned in another
//! group by id, which is how fan-out and cross-group wiring are expressed.
//!
//! Resolution checks the schema invariants (unique owning ids, resolvable
//! references of the right kind, existing pads, sources/filters on the left
//! of an edge and sinks/filters on the right) and yields the list of pending
//! edges the runtime spawns workers for.
//!
//! # Example
//!
//! ```rust,ignore
//! use sluice::schema::{Child, Group};
//!
//! let groups = vec![
//!     Group::new("capture", vec![Child::source(src), Child::filter(pay), Child::sink(net)]),
//!     // a second consumer of the same filter output, via a reference
//!     Group::new("record", vec![Child::filter_ref("pay"), Child::sink(file)]),
//! ];
//! pipeline.spec(groups).await?;
//! ```

use crate::buffer::{BufferType, DynBuffer, DynStream};
use crate::element::{PadRef, Sink, Source};
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identity of one edge: the group it was declared in plus the resolved
/// source and sink element ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeId {
    /// Id of the group the edge was declared in.
    pub group: String,
    /// Id of the source-side element.
    pub source: String,
    /// Id of the sink-side element.
    pub sink: String,
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}->{}", self.group, self.source, self.sink)
    }
}

/// The kind of element a child holds or references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    /// Produces buffers only.
    Source,
    /// Consumes and produces buffers.
    Filter,
    /// Consumes buffers only.
    Sink,
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Filter => f.write_str("filter"),
            Self::Sink => f.write_str("sink"),
        }
    }
}

/// Type-erased handler bound to a sink pad, as driven by an edge worker.
pub(crate) type DynHandler =
    Box<dyn FnMut(Pipeline, DynBuffer) -> BoxFuture<'static, Result<()>> + Send>;

/// Erased source side of an owned child.
pub(crate) struct OutputPort {
    pub(crate) pads: SmallVec<[PadRef; 2]>,
    pub(crate) selected: PadRef,
    pub(crate) ty: BufferType,
    pub(crate) open: Box<dyn Fn(&PadRef) -> Option<DynStream> + Send + Sync>,
    pub(crate) cancel: Arc<dyn Fn(&EdgeId) + Send + Sync>,
}

/// Erased sink side of an owned child.
pub(crate) struct InputPort {
    pub(crate) pads: SmallVec<[PadRef; 2]>,
    pub(crate) selected: PadRef,
    pub(crate) ty: BufferType,
    pub(crate) bind: Box<dyn Fn(&PadRef) -> Option<DynHandler> + Send + Sync>,
}

enum Entry {
    Owned {
        output: Option<OutputPort>,
        input: Option<InputPort>,
    },
    Ref {
        out_pad: Option<PadRef>,
        in_pad: Option<PadRef>,
    },
}

/// One entry in a group: an owned element with chosen pads, or a reference
/// to an element owned elsewhere.
pub struct Child {
    id: String,
    kind: ChildKind,
    entry: Entry,
}

impl Child {
    /// An owned source, using its default output pad.
    pub fn source<S: Source>(element: Arc<S>) -> Self {
        Self::source_pad(element, PadRef::OutputDefault)
    }

    /// An owned source with a chosen output pad.
    pub fn source_pad<S: Source>(element: Arc<S>, pad: PadRef) -> Self {
        Self {
            id: element.id().to_string(),
            kind: ChildKind::Source,
            entry: Entry::Owned {
                output: Some(output_port(element, pad)),
                input: None,
            },
        }
    }

    /// An owned sink, using its default input pad.
    pub fn sink<S: Sink>(element: Arc<S>) -> Self {
        Self::sink_pad(element, PadRef::InputDefault)
    }

    /// An owned sink with a chosen input pad.
    pub fn sink_pad<S: Sink>(element: Arc<S>, pad: PadRef) -> Self {
        Self {
            id: element.id().to_string(),
            kind: ChildKind::Sink,
            entry: Entry::Owned {
                output: None,
                input: Some(input_port(element, pad)),
            },
        }
    }

    /// An owned filter, using its default pads.
    pub fn filter<F: Source + Sink>(element: Arc<F>) -> Self {
        Self::filter_pads(element, PadRef::InputDefault, PadRef::OutputDefault)
    }

    /// An owned filter with chosen input and output pads.
    pub fn filter_pads<F: Source + Sink>(element: Arc<F>, in_pad: PadRef, out_pad: PadRef) -> Self {
        Self {
            id: element.id().to_string(),
            kind: ChildKind::Filter,
            entry: Entry::Owned {
                output: Some(output_port(element.clone(), out_pad)),
                input: Some(input_port(element, in_pad)),
            },
        }
    }

    /// A reference to a source owned in another group.
    pub fn source_ref(id: impl Into<String>) -> Self {
        Self::reference(id, ChildKind::Source, None, None)
    }

    /// A reference to a source, selecting one of its output pads.
    pub fn source_ref_pad(id: impl Into<String>, pad: PadRef) -> Self {
        Self::reference(id, ChildKind::Source, Some(pad), None)
    }

    /// A reference to a filter owned in another group.
    pub fn filter_ref(id: impl Into<String>) -> Self {
        Self::reference(id, ChildKind::Filter, None, None)
    }

    /// A reference to a filter, selecting its pads.
    pub fn filter_ref_pads(id: impl Into<String>, in_pad: PadRef, out_pad: PadRef) -> Self {
        Self::reference(id, ChildKind::Filter, Some(out_pad), Some(in_pad))
    }

    /// A reference to a sink owned in another group.
    pub fn sink_ref(id: impl Into<String>) -> Self {
        Self::reference(id, ChildKind::Sink, None, None)
    }

    /// A reference to a sink, selecting one of its input pads.
    pub fn sink_ref_pad(id: impl Into<String>, pad: PadRef) -> Self {
        Self::reference(id, ChildKind::Sink, None, Some(pad))
    }

    fn reference(
        id: impl Into<String>,
        kind: ChildKind,
        out_pad: Option<PadRef>,
        in_pad: Option<PadRef>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            entry: Entry::Ref { out_pad, in_pad },
        }
    }

    /// The element id this child owns or references.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The element kind this child owns or references.
    pub fn kind(&self) -> ChildKind {
        self.kind
    }

    /// Whether this child owns its element (as opposed to referencing one).
    pub fn is_owned(&self) -> bool {
        matches!(self.entry, Entry::Owned { .. })
    }

    pub(crate) fn output_port(&self) -> Option<&OutputPort> {
        match &self.entry {
            Entry::Owned { output, .. } => output.as_ref(),
            Entry::Ref { .. } => None,
        }
    }

    pub(crate) fn input_port(&self) -> Option<&InputPort> {
        match &self.entry {
            Entry::Owned { input, .. } => input.as_ref(),
            Entry::Ref { .. } => None,
        }
    }

    fn ref_out_pad(&self) -> Option<&PadRef> {
        match &self.entry {
            Entry::Ref { out_pad, .. } => out_pad.as_ref(),
            Entry::Owned { .. } => None,
        }
    }

    fn ref_in_pad(&self) -> Option<&PadRef> {
        match &self.entry {
            Entry::Ref { in_pad, .. } => in_pad.as_ref(),
            Entry::Owned { .. } => None,
        }
    }
}

impl fmt::Debug for Child {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Child")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("owned", &self.is_owned())
            .finish()
    }
}

fn output_port<S: Source>(element: Arc<S>, selected: PadRef) -> OutputPort {
    let pads = element.output_pads();
    let stream_element = element.clone();
    OutputPort {
        pads,
        selected,
        ty: BufferType::of::<S::Output>(),
        open: Box::new(move |pad| {
            stream_element
                .stream(pad)
                .map(|s| s.map(|b| Box::new(b) as DynBuffer).boxed())
        }),
        cancel: Arc::new(move |edge| element.on_cancel(edge)),
    }
}

fn input_port<S: Sink>(element: Arc<S>, selected: PadRef) -> InputPort {
    let pads = element.input_pads();
    let ty = BufferType::of::<S::Input>();
    InputPort {
        pads,
        selected,
        ty,
        bind: Box::new(move |pad| {
            let mut inner = element.handler(pad)?;
            Some(Box::new(move |pipeline: Pipeline, buffer: DynBuffer| {
                match buffer.downcast::<S::Input>() {
                    Ok(b) => inner(pipeline, *b),
                    Err(_) => {
                        let expected = ty.name();
                        async move {
                            Err(Error::Element(format!(
                                "unexpected buffer type on sink pad (expected {expected})"
                            )))
                        }
                        .boxed()
                    }
                }
            }) as DynHandler)
        }),
    }
}

/// A named group of children, connected linearly inside itself.
pub struct Group {
    /// Group id, used in edge identities.
    pub id: String,
    /// Ordered children; adjacent pairs become edges.
    pub children: Vec<Child>,
}

impl Group {
    /// Create a group.
    pub fn new(id: impl Into<String>, children: Vec<Child>) -> Self {
        Self {
            id: id.into(),
            children,
        }
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("id", &self.id)
            .field("children", &self.children)
            .finish()
    }
}

/// Location of an owned child: (group index, child index).
pub(crate) type ChildLoc = (usize, usize);

/// A resolved edge awaiting a worker.
pub(crate) struct PendingEdge {
    pub(crate) id: EdgeId,
    pub(crate) source: ChildLoc,
    pub(crate) source_pad: PadRef,
    pub(crate) sink: ChildLoc,
    pub(crate) sink_pad: PadRef,
}

/// Resolve a full schema into its ordered list of pending edges.
///
/// Fatal schema errors (duplicate owning ids, unresolvable or mismatched
/// references, missing pads, an element kind on the wrong side of an edge)
/// surface here; buffer-type compatibility is checked later, when the edge
/// is spawned, because a mismatch only rejects that one edge.
pub(crate) fn resolve(groups: &[Group]) -> Result<Vec<PendingEdge>> {
    // Owning children, by id. Duplicates are fatal.
    let mut owned: HashMap<&str, (ChildLoc, ChildKind)> = HashMap::new();
    for (gi, group) in groups.iter().enumerate() {
        for (ci, child) in group.children.iter().enumerate() {
            if child.is_owned()
                && owned
                    .insert(child.id(), ((gi, ci), child.kind()))
                    .is_some()
            {
                return Err(Error::DuplicateId(child.id().to_string()));
            }
        }
    }

    let mut edges = Vec::new();
    for (gi, group) in groups.iter().enumerate() {
        for ci in 0..group.children.len().saturating_sub(1) {
            let left = &group.children[ci];
            let right = &group.children[ci + 1];

            let (src_loc, src_pad) = resolve_source_side(groups, &owned, (gi, ci), left)?;
            let (sink_loc, sink_pad) = resolve_sink_side(groups, &owned, (gi, ci + 1), right)?;

            edges.push(PendingEdge {
                id: EdgeId {
                    group: group.id.clone(),
                    source: left.id().to_string(),
                    sink: right.id().to_string(),
                },
                source: src_loc,
                source_pad: src_pad,
                sink: sink_loc,
                sink_pad,
            });
        }
    }
    Ok(edges)
}

fn resolve_source_side(
    groups: &[Group],
    owned: &HashMap<&str, (ChildLoc, ChildKind)>,
    loc: ChildLoc,
    child: &Child,
) -> Result<(ChildLoc, PadRef)> {
    if child.kind() == ChildKind::Sink {
        return Err(Error::KindMismatch {
            id: child.id().to_string(),
            expected: "source or filter".into(),
            actual: child.kind().to_string(),
        });
    }
    let owner_loc = deref(owned, loc, child)?;
    let owner = &groups[owner_loc.0].children[owner_loc.1];
    let port = owner.output_port().ok_or_else(|| Error::KindMismatch {
        id: child.id().to_string(),
        expected: "source or filter".into(),
        actual: owner.kind().to_string(),
    })?;
    let pad = child
        .ref_out_pad()
        .cloned()
        .unwrap_or_else(|| port.selected.clone());
    if !port.pads.contains(&pad) {
        return Err(Error::PadNotFound {
            element: child.id().to_string(),
            pad: pad.to_string(),
        });
    }
    Ok((owner_loc, pad))
}

fn resolve_sink_side(
    groups: &[Group],
    owned: &HashMap<&str, (ChildLoc, ChildKind)>,
    loc: ChildLoc,
    child: &Child,
) -> Result<(ChildLoc, PadRef)> {
    if child.kind() == ChildKind::Source {
        return Err(Error::KindMismatch {
            id: child.id().to_string(),
            expected: "sink or filter".into(),
            actual: child.kind().to_string(),
        });
    }
    let owner_loc = deref(owned, loc, child)?;
    let owner = &groups[owner_loc.0].children[owner_loc.1];
    let port = owner.input_port().ok_or_else(|| Error::KindMismatch {
        id: child.id().to_string(),
        expected: "sink or filter".into(),
        actual: owner.kind().to_string(),
    })?;
    let pad = child
        .ref_in_pad()
        .cloned()
        .unwrap_or_else(|| port.selected.clone());
    if !port.pads.contains(&pad) {
        return Err(Error::PadNotFound {
            element: child.id().to_string(),
            pad: pad.to_string(),
        });
    }
    Ok((owner_loc, pad))
}

/// Dereference a child to the location of its owning entry.
///
/// Owned children resolve to themselves; references resolve through the
/// owned map and must match the owner's kind.
fn deref(
    owned: &HashMap<&str, (ChildLoc, ChildKind)>,
    loc: ChildLoc,
    child: &Child,
) -> Result<ChildLoc> {
    if child.is_owned() {
        return Ok(loc);
    }
    let (owner_loc, owner_kind) = owned
        .get(child.id())
        .copied()
        .ok_or_else(|| Error::UnknownRef(child.id().to_string()))?;
    if owner_kind != child.kind() {
        return Err(Error::KindMismatch {
            id: child.id().to_string(),
            expected: child.kind().to_string(),
            actual: owner_kind.to_string(),
        });
    }
    Ok(owner_loc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{CollectSink, TestSrc};

    fn src(id: &str) -> Arc<TestSrc> {
        Arc::new(TestSrc::new(id))
    }

    fn sink(id: &str) -> Arc<CollectSink<bytes::Bytes>> {
        Arc::new(CollectSink::new(id))
    }

    #[test]
    fn test_resolve_linear_group() {
        let groups = vec![Group::new(
            "main",
            vec![Child::source(src("a")), Child::sink(sink("b"))],
        )];
        let edges = resolve(&groups).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].id.group, "main");
        assert_eq!(edges[0].id.source, "a");
        assert_eq!(edges[0].id.sink, "b");
        assert_eq!(edges[0].source_pad, PadRef::OutputDefault);
        assert_eq!(edges[0].sink_pad, PadRef::InputDefault);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let groups = vec![Group::new(
            "main",
            vec![Child::source(src("a")), Child::sink(sink("b"))],
        )];
        let dup = vec![
            Group::new("g1", vec![Child::source(src("x")), Child::sink(sink("y"))]),
            Group::new("g2", vec![Child::source(src("x")), Child::sink(sink("z"))]),
        ];
        assert!(resolve(&groups).is_ok());
        assert!(matches!(resolve(&dup), Err(Error::DuplicateId(id)) if id == "x"));
    }

    #[test]
    fn test_unknown_ref_rejected() {
        let groups = vec![Group::new(
            "main",
            vec![Child::source_ref("ghost"), Child::sink(sink("b"))],
        )];
        assert!(matches!(resolve(&groups), Err(Error::UnknownRef(id)) if id == "ghost"));
    }

    #[test]
    fn test_ref_kind_mismatch_rejected() {
        // "a" owns a source, but the second group references it as a filter.
        let groups = vec![
            Group::new("g1", vec![Child::source(src("a")), Child::sink(sink("b"))]),
            Group::new("g2", vec![Child::filter_ref("a"), Child::sink(sink("c"))]),
        ];
        assert!(matches!(resolve(&groups), Err(Error::KindMismatch { .. })));
    }

    #[test]
    fn test_sink_on_left_rejected() {
        let groups = vec![Group::new(
            "main",
            vec![Child::sink(sink("b")), Child::source(src("a"))],
        )];
        assert!(matches!(resolve(&groups), Err(Error::KindMismatch { .. })));
    }

    #[test]
    fn test_pad_not_found_rejected() {
        let groups = vec![Group::new(
            "main",
            vec![
                Child::source_pad(src("a"), PadRef::custom("missing")),
                Child::sink(sink("b")),
            ],
        )];
        assert!(matches!(
            resolve(&groups),
            Err(Error::PadNotFound { element, .. }) if element == "a"
        ));
    }

    #[test]
    fn test_fan_out_by_reference() {
        let groups = vec![
            Group::new("g1", vec![Child::source(src("a")), Child::sink(sink("b"))]),
            Group::new("g2", vec![Child::source_ref("a"), Child::sink(sink("c"))]),
        ];
        let edges = resolve(&groups).unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].id.sink, "b");
        assert_eq!(edges[1].id.sink, "c");
        // Both edges resolve to the same owning child.
        assert_eq!(edges[0].source, edges[1].source);
    }
}
