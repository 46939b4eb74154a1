//! Filter graph structure using daggy.
//!
//! A [`FilterGraph`] owns every node in an arena (a `daggy::Dag`); nodes
//! refer to each other only through [`NodeId`] / [`PadRef`] handles. The
//! graph has two distinguished endpoints: the buffer source (`in`), where
//! raw frames are injected, and the buffer sink (`out`), where filtered
//! frames are collected.
//!
//! # Lifecycle
//!
//! ```text
//! create_source / create_sink / add_filter / link / parse_and_link
//!        -> configure()            (negotiation, once)
//!        -> push() / pull() ...    (streaming)
//!        -> flush()                (drain, once)
//!        -> Closed
//! ```
//!
//! Any failure while streaming closes the graph.

use crate::element::{
    Filter, FilterContext, FilterKind, NodeState, Output, Pad, PadDirection, PadRef,
};
use crate::error::{Error, Result};
use crate::format::{FormatCaps, Framerate, PixelFormat, VideoFormat};
use crate::frame::{PlanarFrame, validate_geometry};
use crate::metadata::Metadata;
use crate::pipeline::factory::FilterFactory;
use crate::pipeline::parser::{FilterOptions, parse_descriptor};
use crate::pipeline::pool::{FramePool, PoolStats};
use daggy::petgraph::Direction;
use daggy::petgraph::algo::{has_path_connecting, toposort};
use daggy::petgraph::visit::EdgeRef;
use daggy::{Dag, NodeIndex};
use smallvec::SmallVec;
use std::collections::{HashMap, VecDeque};
use std::iter::FusedIterator;
use tracing::{debug, error, info, trace, warn};

/// Name of the buffer source node.
pub const SOURCE_NAME: &str = "in";

/// Name of the buffer sink node.
pub const SINK_NAME: &str = "out";

/// Unique identifier for a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) NodeIndex);

impl NodeId {
    /// Get the underlying index.
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

enum NodeBody {
    Source,
    Sink { queue: VecDeque<PlanarFrame> },
    Filter(Box<dyn Filter>),
}

/// A node in the filter graph.
pub struct Node {
    name: String,
    kind: FilterKind,
    /// Registered filter name (`buffer` / `buffersink` for the endpoints).
    filter_name: String,
    options: FilterOptions,
    input_pads: Vec<Pad>,
    output_pads: Vec<Pad>,
    body: NodeBody,
    state: NodeState,
    input_format: Option<VideoFormat>,
    output_format: Option<VideoFormat>,
}

impl Node {
    fn new(
        name: String,
        kind: FilterKind,
        filter_name: impl Into<String>,
        options: FilterOptions,
        body: NodeBody,
    ) -> Self {
        Self {
            name,
            kind,
            filter_name: filter_name.into(),
            options,
            input_pads: Vec::new(),
            output_pads: Vec::new(),
            body,
            state: NodeState::Unconfigured,
            input_format: None,
            output_format: None,
        }
    }

    /// Get the node's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Role of the node.
    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    /// Name the node's filter is registered under.
    pub fn filter_name(&self) -> &str {
        &self.filter_name
    }

    /// Options the node was created with.
    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// Get input pads.
    pub fn input_pads(&self) -> &[Pad] {
        &self.input_pads
    }

    /// Get output pads.
    pub fn output_pads(&self) -> &[Pad] {
        &self.output_pads
    }

    /// Lifecycle state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Negotiated input format, once configured.
    pub fn input_format(&self) -> Option<&VideoFormat> {
        self.input_format.as_ref()
    }

    /// Negotiated output format, once configured.
    pub fn output_format(&self) -> Option<&VideoFormat> {
        self.output_format.as_ref()
    }

    /// The processing filter, for filter nodes.
    pub fn filter(&self) -> Option<&dyn Filter> {
        match &self.body {
            NodeBody::Filter(filter) => Some(filter.as_ref()),
            _ => None,
        }
    }

    /// Frames waiting at the sink (always 0 for other nodes).
    pub fn queued(&self) -> usize {
        match &self.body {
            NodeBody::Sink { queue } => queue.len(),
            _ => 0,
        }
    }

    fn pads(&self, direction: PadDirection) -> &[Pad] {
        match direction {
            PadDirection::Input => &self.input_pads,
            PadDirection::Output => &self.output_pads,
        }
    }

    fn pads_mut(&mut self, direction: PadDirection) -> &mut Vec<Pad> {
        match direction {
            PadDirection::Input => &mut self.input_pads,
            PadDirection::Output => &mut self.output_pads,
        }
    }

    fn refresh_state(&mut self) {
        let linked = self
            .input_pads
            .iter()
            .chain(self.output_pads.iter())
            .all(Pad::is_linked);
        if self.state == NodeState::Unconfigured && linked {
            self.state = NodeState::Linked;
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("filter", &self.filter_name)
            .field("input_pads", &self.input_pads.len())
            .field("output_pads", &self.output_pads.len())
            .field("state", &self.state)
            .finish()
    }
}

/// A link between two nodes: output pad index to input pad index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    /// Output pad index on the upstream node.
    pub src_pad: usize,
    /// Input pad index on the downstream node.
    pub sink_pad: usize,
}

/// A filter graph: an owned arena of nodes linked through pads.
///
/// # Example
///
/// ```rust
/// use planefilter::element::PadRef;
/// use planefilter::format::{Framerate, PixelFormat};
/// use planefilter::frame::PlanarFrame;
/// use planefilter::pipeline::FilterGraph;
///
/// let mut graph = FilterGraph::new();
/// let src = graph.create_source(PixelFormat::Yuv420p, 4, 2, Framerate::FPS_25).unwrap();
/// let sink = graph.create_sink(PixelFormat::Yuv420p).unwrap();
/// graph
///     .parse_and_link("negate", PadRef::output(src, 0), PadRef::input(sink, 0))
///     .unwrap();
/// graph.configure().unwrap();
///
/// let frame = PlanarFrame::allocate(4, 2, PixelFormat::Yuv420p).unwrap();
/// graph.push(&frame).unwrap();
/// let out = graph.pull().unwrap().unwrap();
/// assert!(out.to_bytes().iter().all(|&v| v == 255));
/// ```
pub struct FilterGraph {
    graph: Dag<Node, Link>,
    nodes_by_name: HashMap<String, NodeId>,
    factory: FilterFactory,
    source: Option<NodeId>,
    sink: Option<NodeId>,
    format: Option<VideoFormat>,
    /// Nodes in topological order, fixed by `configure()`.
    order: Vec<NodeIndex>,
    /// Position of each node index in `order`.
    rank: Vec<usize>,
    /// Frames waiting to be processed, per position in `order`.
    inboxes: Vec<VecDeque<PlanarFrame>>,
    pool: FramePool,
    sequence: u64,
    parsed_count: usize,
    state: NodeState,
}

impl FilterGraph {
    /// Create an empty graph using the built-in filters.
    pub fn new() -> Self {
        Self::with_factory(FilterFactory::new())
    }

    /// Create an empty graph resolving filter names through `factory`.
    pub fn with_factory(factory: FilterFactory) -> Self {
        Self {
            graph: Dag::new(),
            nodes_by_name: HashMap::new(),
            factory,
            source: None,
            sink: None,
            format: None,
            order: Vec::new(),
            rank: Vec::new(),
            inboxes: Vec::new(),
            pool: FramePool::new(),
            sequence: 0,
            parsed_count: 0,
            state: NodeState::Unconfigured,
        }
    }

    /// The filter registry used by `add_filter` and `parse_and_link`.
    pub fn factory(&self) -> &FilterFactory {
        &self.factory
    }

    /// Mutable access to the filter registry.
    pub fn factory_mut(&mut self) -> &mut FilterFactory {
        &mut self.factory
    }

    /// Graph lifecycle state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Get a node by ID.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node_weight(id.0)
    }

    /// Get a node ID by name.
    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes_by_name.get(name).copied()
    }

    /// Iterate all nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.graph
            .graph()
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx).map(|node| (NodeId(idx), node)))
    }

    /// All links as (output pad, input pad) pairs.
    pub fn links(&self) -> Vec<(PadRef, PadRef)> {
        self.graph
            .graph()
            .edge_references()
            .map(|edge| {
                let link = edge.weight();
                (
                    PadRef::output(NodeId(edge.source()), link.src_pad),
                    PadRef::input(NodeId(edge.target()), link.sink_pad),
                )
            })
            .collect()
    }

    /// Get the number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of links in the graph.
    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// The buffer source node, if created.
    pub fn source(&self) -> Option<NodeId> {
        self.source
    }

    /// The buffer sink node, if created.
    pub fn sink(&self) -> Option<NodeId> {
        self.sink
    }

    /// Format frames must have when pushed.
    pub fn input_format(&self) -> Option<&VideoFormat> {
        self.format.as_ref()
    }

    /// Format of frames arriving at the sink, once configured.
    pub fn output_format(&self) -> Option<&VideoFormat> {
        self.sink
            .and_then(|id| self.node(id))
            .and_then(|node| node.input_format())
    }

    /// Number of frames pushed so far.
    pub fn frames_pushed(&self) -> u64 {
        self.sequence
    }

    /// Frame pool statistics.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create the buffer source.
    ///
    /// Its single output pad advertises exactly `format` at the given
    /// geometry; every pushed frame must match it.
    pub fn create_source(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
        framerate: Framerate,
    ) -> Result<NodeId> {
        self.ensure_building(SOURCE_NAME, "create source")?;
        if self.source.is_some() {
            return Err(Error::link("graph already has a buffer source"));
        }
        validate_geometry(width, height, format)?;

        let mut node = Node::new(
            SOURCE_NAME.to_string(),
            FilterKind::Source,
            "buffer",
            FilterOptions::new(),
            NodeBody::Source,
        );
        node.output_pads.push(Pad::output(0, FormatCaps::Fixed(format)));

        let id = self.add_node(node)?;
        self.source = Some(id);
        self.format = Some(VideoFormat::new(width, height, format, framerate));
        debug!(node = SOURCE_NAME, %format, width, height, %framerate, "created buffer source");
        Ok(id)
    }

    /// Create the buffer sink, accepting any format in `accepted`.
    pub fn create_sink(&mut self, accepted: impl Into<FormatCaps>) -> Result<NodeId> {
        self.ensure_building(SINK_NAME, "create sink")?;
        if self.sink.is_some() {
            return Err(Error::link("graph already has a buffer sink"));
        }
        let accepted = accepted.into();

        let mut node = Node::new(
            SINK_NAME.to_string(),
            FilterKind::Sink,
            "buffersink",
            FilterOptions::new(),
            NodeBody::Sink {
                queue: VecDeque::new(),
            },
        );
        node.input_pads.push(Pad::input(0, accepted.clone()));

        let id = self.add_node(node)?;
        self.sink = Some(id);
        debug!(node = SINK_NAME, %accepted, "created buffer sink");
        Ok(id)
    }

    /// Create a filter of registered kind `kind` and add it as node `name`.
    pub fn add_filter(
        &mut self,
        name: impl Into<String>,
        kind: &str,
        options: FilterOptions,
    ) -> Result<NodeId> {
        let name = name.into();
        self.ensure_building(&name, "add filter")?;
        let filter = self.factory.create_named(kind, &options)?;
        self.insert_filter(name, kind, options, filter)
    }

    /// Add an already constructed filter as node `name`.
    pub fn add_filter_instance(
        &mut self,
        name: impl Into<String>,
        filter: Box<dyn Filter>,
    ) -> Result<NodeId> {
        let name = name.into();
        self.ensure_building(&name, "add filter")?;
        let kind = filter.name().to_string();
        self.insert_filter(name, &kind, FilterOptions::new(), filter)
    }

    fn insert_filter(
        &mut self,
        name: String,
        kind: &str,
        options: FilterOptions,
        filter: Box<dyn Filter>,
    ) -> Result<NodeId> {
        let (inputs, outputs) = (filter.input_count(), filter.output_count());
        if inputs == 0 || outputs == 0 {
            return Err(Error::link(format!(
                "filter '{kind}' has {inputs} inputs and {outputs} outputs; \
                 graph filters need at least one of each"
            )));
        }
        let caps = filter.input_caps();

        let mut node = Node::new(name, FilterKind::Filter, kind, options, NodeBody::Filter(filter));
        node.input_pads = (0..inputs).map(|i| Pad::input(i, caps.clone())).collect();
        node.output_pads = (0..outputs).map(|i| Pad::output(i, FormatCaps::Any)).collect();

        let id = self.add_node(node)?;
        debug!(node = %self.graph[id.0].name, filter = kind, inputs, outputs, "created filter");
        Ok(id)
    }

    fn add_node(&mut self, node: Node) -> Result<NodeId> {
        if self.nodes_by_name.contains_key(&node.name) {
            return Err(Error::link(format!(
                "node name '{}' is already in use",
                node.name
            )));
        }
        let name = node.name.clone();
        let id = NodeId(self.graph.add_node(node));
        self.nodes_by_name.insert(name, id);
        Ok(id)
    }

    /// Link an output pad to an input pad.
    ///
    /// Fails with [`Error::LinkError`] if the pads have the wrong direction,
    /// do not exist, are already linked, or if the link would close a cycle.
    pub fn link(&mut self, src: PadRef, dst: PadRef) -> Result<()> {
        self.ensure_building("graph", "link")?;
        self.check_link(src, dst)?;

        // check_link already ruled out cycles
        self.graph
            .add_edge(
                src.node.0,
                dst.node.0,
                Link {
                    src_pad: src.index,
                    sink_pad: dst.index,
                },
            )
            .map_err(|_| Error::link("linking would create a cycle"))?;

        for (pad, peer) in [(src, dst), (dst, src)] {
            if let Some(node) = self.graph.node_weight_mut(pad.node.0) {
                if let Some(p) = node.pads_mut(pad.direction).get_mut(pad.index) {
                    p.set_peer(peer);
                }
                node.refresh_state();
            }
        }

        debug!(
            src = %self.describe_pad(src),
            dst = %self.describe_pad(dst),
            "linked pads"
        );
        Ok(())
    }

    fn check_link(&self, src: PadRef, dst: PadRef) -> Result<()> {
        if src.direction != PadDirection::Output {
            return Err(Error::link(format!("{src} is not an output pad")));
        }
        if dst.direction != PadDirection::Input {
            return Err(Error::link(format!("{dst} is not an input pad")));
        }
        for pad in [src, dst] {
            let node = self
                .node(pad.node)
                .ok_or_else(|| Error::link(format!("{pad}: no such node")))?;
            let existing = node.pads(pad.direction).get(pad.index).ok_or_else(|| {
                Error::link(format!("node '{}' has no pad {}", node.name, pad_label(pad)))
            })?;
            if let Some(peer) = existing.peer() {
                return Err(Error::link(format!(
                    "pad {} is already linked to {}",
                    self.describe_pad(pad),
                    self.describe_pad(peer)
                )));
            }
        }
        if src.node == dst.node
            || has_path_connecting(self.graph.graph(), dst.node.0, src.node.0, None)
        {
            return Err(Error::link(format!(
                "linking {} to {} would create a cycle",
                self.describe_pad(src),
                self.describe_pad(dst)
            )));
        }
        Ok(())
    }

    /// Parse `descriptor` and link the resulting chain between two pads.
    ///
    /// Filters are named `Parsed_<kind>_<n>` and linked in sequence:
    /// `source_pad -> first -> ... -> last -> sink_pad`. Every filter in a
    /// linear chain must have exactly one input and one output pad.
    pub fn parse_and_link(
        &mut self,
        descriptor: &str,
        source_pad: PadRef,
        sink_pad: PadRef,
    ) -> Result<()> {
        self.ensure_building("graph", "parse and link")?;
        let specs = parse_descriptor(descriptor)?;

        // Build every filter before touching the graph, so a bad descriptor
        // leaves it unchanged.
        let mut filters = Vec::with_capacity(specs.len());
        for (i, spec) in specs.into_iter().enumerate() {
            let filter = self.factory.create(&spec)?;
            if filter.input_count() != 1 || filter.output_count() != 1 {
                return Err(Error::link(format!(
                    "filter '{}' has {} inputs and {} outputs; \
                     a linear chain needs exactly one of each",
                    spec.name,
                    filter.input_count(),
                    filter.output_count()
                )));
            }
            let name = format!("Parsed_{}_{}", spec.name, self.parsed_count + i);
            if self.nodes_by_name.contains_key(&name) {
                return Err(Error::link(format!("node name '{name}' is already in use")));
            }
            filters.push((name, spec, filter));
        }
        self.check_link(source_pad, sink_pad)?;

        let count = filters.len();
        let mut upstream = source_pad;
        for (name, spec, filter) in filters {
            let id = self.insert_filter(name, &spec.name, spec.options, filter)?;
            self.link(upstream, PadRef::input(id, 0))?;
            upstream = PadRef::output(id, 0);
        }
        self.link(upstream, sink_pad)?;
        self.parsed_count += count;

        if !has_path_connecting(self.graph.graph(), source_pad.node.0, sink_pad.node.0, None) {
            return Err(Error::link(format!(
                "no path from {} to {}",
                self.describe_pad(source_pad),
                self.describe_pad(sink_pad)
            )));
        }
        info!(descriptor, filters = count, "parsed filter chain");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Negotiation
    // ------------------------------------------------------------------

    /// Validate the topology and negotiate formats on every link.
    ///
    /// Every pad must be linked and the sink must be reachable from the
    /// source. Each filter either inherits its upstream format or picks its
    /// own output; every input pad must accept what arrives on it, otherwise
    /// this fails with [`Error::FormatMismatch`].
    pub fn configure(&mut self) -> Result<()> {
        self.ensure_building("graph", "configure")?;
        let source = self
            .source
            .ok_or_else(|| Error::link("graph has no buffer source"))?;
        let sink = self
            .sink
            .ok_or_else(|| Error::link("graph has no buffer sink"))?;

        for (_, node) in self.nodes() {
            for pad in node.input_pads.iter().chain(node.output_pads.iter()) {
                if !pad.is_linked() {
                    return Err(Error::link(format!(
                        "pad '{}' of '{}' is not linked",
                        pad.name(),
                        node.name
                    )));
                }
            }
        }
        if !has_path_connecting(self.graph.graph(), source.0, sink.0, None) {
            return Err(Error::link(format!(
                "no path from '{SOURCE_NAME}' to '{SINK_NAME}'"
            )));
        }

        let order = toposort(self.graph.graph(), None)
            .map_err(|_| Error::link("graph contains a cycle"))?;
        let format = self
            .format
            .ok_or_else(|| Error::link("graph has no buffer source"))?;

        for &idx in &order {
            let input = match self.graph[idx].kind {
                FilterKind::Source => format,
                _ => self.negotiate_inputs(idx)?,
            };
            let node = &mut self.graph[idx];
            let output = match &mut node.body {
                NodeBody::Source => Some(format),
                NodeBody::Sink { .. } => None,
                NodeBody::Filter(filter) => Some(filter.negotiate(&input)?),
            };
            if let Some(output) = output {
                for pad in &mut node.output_pads {
                    pad.set_caps(FormatCaps::Fixed(output.pixel_format));
                }
            }
            node.input_format = Some(input);
            node.output_format = output;
            node.state = NodeState::Negotiated;
            match output {
                Some(output) => debug!(node = %node.name, %input, %output, "negotiated"),
                None => debug!(node = %node.name, %input, "negotiated"),
            }
        }

        self.rank = vec![0; self.graph.node_count()];
        for (position, idx) in order.iter().enumerate() {
            self.rank[idx.index()] = position;
        }
        self.inboxes = order.iter().map(|_| VecDeque::new()).collect();
        self.order = order;
        self.state = NodeState::Negotiated;
        info!(
            nodes = self.node_count(),
            input = %format,
            output = %self.output_format().copied().unwrap_or(format),
            "filter graph configured"
        );
        Ok(())
    }

    /// Check what arrives on every input pad of `idx` and return the
    /// node's input format.
    fn negotiate_inputs(&self, idx: NodeIndex) -> Result<VideoFormat> {
        let node = &self.graph[idx];
        let mut incoming: SmallVec<[(usize, VideoFormat); 2]> = SmallVec::new();
        for edge in self.graph.graph().edges_directed(idx, Direction::Incoming) {
            let parent = &self.graph[edge.source()];
            let upstream = parent.output_format.ok_or_else(|| {
                Error::link(format!(
                    "'{}' was not negotiated before '{}'",
                    parent.name, node.name
                ))
            })?;
            incoming.push((edge.weight().sink_pad, upstream));
        }
        incoming.sort_by_key(|(pad, _)| *pad);

        let mismatch = |expected: String, got: PixelFormat| Error::FormatMismatch {
            node: node.name.clone(),
            expected,
            got,
        };
        let Some(&(_, first)) = incoming.first() else {
            return Err(Error::link(format!("'{}' has no inputs", node.name)));
        };
        for &(pad, format) in &incoming {
            let caps = node.input_pads.get(pad).map(Pad::caps).cloned().unwrap_or_default();
            if !caps.accepts(format.pixel_format) {
                return Err(mismatch(caps.to_string(), format.pixel_format));
            }
            if !format.same_layout(&first) {
                return Err(mismatch(
                    FormatCaps::Fixed(first.pixel_format).to_string(),
                    format.pixel_format,
                ));
            }
        }
        Ok(first)
    }

    // ------------------------------------------------------------------
    // Streaming
    // ------------------------------------------------------------------

    /// Push one frame into the buffer source and run the chain.
    ///
    /// The frame is copied into a pooled frame, stamped with the next
    /// sequence number and timestamp, and processed by every node before
    /// this returns. It is not an error if nothing reaches the sink.
    pub fn push(&mut self, frame: &PlanarFrame) -> Result<()> {
        self.ensure_streaming(SOURCE_NAME, "push")?;
        let (Some(format), Some(source)) = (self.format, self.source) else {
            return Err(Error::link("graph has no buffer source"));
        };
        if frame.format() != format.pixel_format {
            return Err(Error::FormatMismatch {
                node: SOURCE_NAME.to_string(),
                expected: FormatCaps::Fixed(format.pixel_format).to_string(),
                got: frame.format(),
            });
        }
        if !frame.matches(&format) {
            return Err(Error::InvalidGeometry {
                width: frame.width(),
                height: frame.height(),
                format: frame.format(),
                reason: format!(
                    "source '{SOURCE_NAME}' expects {}x{}",
                    format.width, format.height
                ),
            });
        }

        let mut pooled = self.pool.acquire(&format)?;
        pooled.copy_from(frame);
        *pooled.metadata_mut() = Metadata::with_sequence(self.sequence)
            .with_pts(format.framerate.timestamp(self.sequence));
        trace!(sequence = self.sequence, "push");
        self.sequence += 1;

        if self.state == NodeState::Negotiated {
            self.set_all_states(NodeState::Streaming);
        }

        let origin = self.rank[source.index()];
        self.propagate(origin, Output::single(pooled))
            .map_err(|e| self.fail(e))
    }

    /// Take the next filtered frame from the sink, if one is ready.
    pub fn pull(&mut self) -> Result<Option<PlanarFrame>> {
        self.ensure_streaming(SINK_NAME, "pull")?;
        let frame = self.pop_sink();
        if let Some(ref frame) = frame {
            trace!(sequence = frame.metadata().sequence, "pull");
        }
        Ok(frame)
    }

    /// Copy the next filtered frame into `out`, recycling the graph's frame.
    ///
    /// Returns `false` if no frame was ready (`out` is left untouched).
    pub fn pull_into(&mut self, out: &mut PlanarFrame) -> Result<bool> {
        match self.pull()? {
            Some(frame) => {
                out.copy_from(&frame);
                self.pool.release(frame);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Signal end of input and drain every buffering node.
    ///
    /// Nodes are flushed in topological order; the returned iterator yields
    /// the frames reaching the sink. The drain happens once: when the
    /// iterator is exhausted (or dropped) the graph is closed.
    pub fn flush(&mut self) -> Result<Flush<'_>> {
        self.ensure_streaming(SOURCE_NAME, "flush")?;
        info!(frames_pushed = self.sequence, "flushing filter graph");
        self.set_all_states(NodeState::Flushing);
        self.state = NodeState::Flushing;
        Ok(Flush {
            graph: self,
            position: 0,
            done: false,
        })
    }

    /// Close the graph. Every later call fails with [`Error::GraphClosed`].
    pub fn close(&mut self) {
        if self.state != NodeState::Closed {
            info!(frames_pushed = self.sequence, "closing filter graph");
            self.shutdown();
        }
    }

    /// Run `output` (produced at topological position `origin`) through
    /// every downstream node.
    fn propagate(&mut self, origin: usize, output: Output) -> Result<()> {
        self.dispatch(origin, output)?;
        for position in origin + 1..self.order.len() {
            let idx = self.order[position];
            while let Some(frame) = self.inboxes[position].pop_front() {
                let node = &mut self.graph[idx];
                if let NodeBody::Sink { queue } = &mut node.body {
                    queue.push_back(frame);
                    continue;
                }
                let output = run_node(node, Some(frame), &mut self.pool)?;
                self.dispatch(position, output)?;
            }
        }
        Ok(())
    }

    /// Queue a node's output on every downstream input.
    fn dispatch(&mut self, position: usize, output: Output) -> Result<()> {
        if output.is_empty() {
            return Ok(());
        }
        let idx = self.order[position];
        let node = &self.graph[idx];
        let mut targets: SmallVec<[(usize, usize); 2]> = self
            .graph
            .graph()
            .edges_directed(idx, Direction::Outgoing)
            .map(|edge| (edge.weight().src_pad, self.rank[edge.target().index()]))
            .collect();
        targets.sort_unstable();

        for frame in output {
            if let Some(expected) = node.output_format {
                if !frame.matches(&expected) {
                    return Err(Error::FormatMismatch {
                        node: node.name.clone(),
                        expected: expected.to_string(),
                        got: frame.format(),
                    });
                }
            }
            match targets.split_last() {
                Some((&(_, last), rest)) => {
                    for &(_, target) in rest {
                        self.inboxes[target].push_back(frame.clone());
                    }
                    self.inboxes[last].push_back(frame);
                }
                None => self.pool.release(frame),
            }
        }
        Ok(())
    }

    /// Flush the node at topological `position` and propagate its output.
    fn flush_node(&mut self, position: usize) -> Result<()> {
        let idx = self.order[position];
        let node = &mut self.graph[idx];
        if !matches!(node.body, NodeBody::Filter(_)) {
            node.state = NodeState::Closed;
            return Ok(());
        }
        let output = run_node(node, None, &mut self.pool)?;
        if !output.is_empty() {
            debug!(node = %node.name, frames = output.len(), "drained buffered frames");
        }
        node.state = NodeState::Closed;
        self.propagate(position, output)
    }

    fn pop_sink(&mut self) -> Option<PlanarFrame> {
        let sink = self.sink?;
        match &mut self.graph.node_weight_mut(sink.0)?.body {
            NodeBody::Sink { queue } => queue.pop_front(),
            _ => None,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == NodeState::Closed {
            return Err(Error::GraphClosed);
        }
        Ok(())
    }

    fn ensure_building(&self, node: &str, operation: &'static str) -> Result<()> {
        self.ensure_open()?;
        if self.state >= NodeState::Negotiated {
            return Err(Error::InvalidState {
                node: node.to_string(),
                state: self.state,
                operation,
            });
        }
        Ok(())
    }

    fn ensure_streaming(&self, node: &str, operation: &'static str) -> Result<()> {
        self.ensure_open()?;
        if !matches!(self.state, NodeState::Negotiated | NodeState::Streaming) {
            return Err(Error::InvalidState {
                node: node.to_string(),
                state: self.state,
                operation,
            });
        }
        Ok(())
    }

    fn set_all_states(&mut self, state: NodeState) {
        for index in 0..self.graph.node_count() {
            self.graph[NodeIndex::new(index)].state = state;
        }
        self.state = state;
    }

    /// Close the graph after a streaming failure and hand the error back.
    fn fail(&mut self, err: Error) -> Error {
        error!(error = %err, "filter graph failed, closing");
        self.shutdown();
        err
    }

    fn shutdown(&mut self) {
        self.set_all_states(NodeState::Closed);
        if let Some(sink) = self.sink {
            if let NodeBody::Sink { queue } = &mut self.graph[sink.0].body {
                queue.clear();
            }
        }
        self.inboxes.iter_mut().for_each(VecDeque::clear);
        self.pool.clear();
    }

    fn describe_pad(&self, pad: PadRef) -> String {
        match self.node(pad.node) {
            Some(node) => format!("{}:{}", node.name, pad_label(pad)),
            None => pad.to_string(),
        }
    }
}

fn pad_label(pad: PadRef) -> String {
    Pad::new(pad.direction, pad.index, FormatCaps::Any).name()
}

/// Run a filter node on one frame, or flush it when `frame` is `None`.
fn run_node(node: &mut Node, frame: Option<PlanarFrame>, pool: &mut FramePool) -> Result<Output> {
    let ready = node.state.accepts_traffic();
    let (true, Some(input), Some(output)) = (ready, node.input_format, node.output_format) else {
        return Err(Error::InvalidState {
            node: node.name.clone(),
            state: node.state,
            operation: "process",
        });
    };
    let NodeBody::Filter(filter) = &mut node.body else {
        return Ok(frame.into());
    };
    let mut ctx = FilterContext::new(&node.name, input, output, pool);
    match frame {
        Some(frame) => filter.process(frame, &mut ctx),
        None => filter.flush(&mut ctx),
    }
}

impl Default for FilterGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FilterGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterGraph")
            .field("nodes", &self.node_count())
            .field("links", &self.link_count())
            .field("state", &self.state)
            .field("frames_pushed", &self.sequence)
            .finish()
    }
}

/// Lazy drain of a graph at end of stream. See [`FilterGraph::flush`].
///
/// Yields each frame reaching the sink; an error closes the graph and ends
/// the sequence. Dropping the iterator early discards the remaining frames.
pub struct Flush<'a> {
    graph: &'a mut FilterGraph,
    position: usize,
    done: bool,
}

impl Iterator for Flush<'_> {
    type Item = Result<PlanarFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if let Some(frame) = self.graph.pop_sink() {
                trace!(sequence = frame.metadata().sequence, "flush");
                return Some(Ok(frame));
            }
            if self.position >= self.graph.order.len() {
                self.done = true;
                info!(frames_pushed = self.graph.sequence, "filter graph drained");
                self.graph.shutdown();
                return None;
            }
            let position = self.position;
            self.position += 1;
            if let Err(e) = self.graph.flush_node(position) {
                self.done = true;
                return Some(Err(self.graph.fail(e)));
            }
        }
    }
}

impl FusedIterator for Flush<'_> {}

impl Drop for Flush<'_> {
    fn drop(&mut self) {
        if !self.done {
            warn!("flush dropped before the graph was drained, discarding frames");
            self.graph.shutdown();
        }
    }
}

impl std::fmt::Debug for Flush<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flush")
            .field("position", &self.position)
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::Identity;

    const FORMAT: PixelFormat = PixelFormat::Yuv420p;

    fn endpoints(graph: &mut FilterGraph) -> (NodeId, NodeId) {
        let src = graph.create_source(FORMAT, 4, 2, Framerate::FPS_25).unwrap();
        let sink = graph.create_sink(FORMAT).unwrap();
        (src, sink)
    }

    fn chain(descriptor: &str) -> FilterGraph {
        let mut graph = FilterGraph::new();
        let (src, sink) = endpoints(&mut graph);
        graph
            .parse_and_link(descriptor, PadRef::output(src, 0), PadRef::input(sink, 0))
            .unwrap();
        graph.configure().unwrap();
        graph
    }

    fn frame(value: u8) -> PlanarFrame {
        let mut frame = PlanarFrame::allocate(4, 2, FORMAT).unwrap();
        frame.fill_from(&[value; 12]).unwrap();
        frame
    }

    #[test]
    fn test_graph_creation() {
        let graph = FilterGraph::new();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.state(), NodeState::Unconfigured);
        assert!(graph.source().is_none());
    }

    #[test]
    fn test_parse_and_link_names_nodes() {
        let graph = chain("negate,delay=frames=2");
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.link_count(), 3);

        let id = graph.node_by_name("Parsed_delay_1").unwrap();
        let node = graph.node(id).unwrap();
        assert_eq!(node.filter_name(), "delay");
        assert_eq!(node.options().get("frames"), Some("2"));
        assert_eq!(node.state(), NodeState::Negotiated);
        assert!(graph.node_by_name("Parsed_negate_0").is_some());
        assert_eq!(graph.state(), NodeState::Negotiated);
    }

    #[test]
    fn test_link_rejects_wrong_direction() {
        let mut graph = FilterGraph::new();
        let (src, sink) = endpoints(&mut graph);
        let err = graph
            .link(PadRef::input(sink, 0), PadRef::output(src, 0))
            .unwrap_err();
        assert!(matches!(err, Error::LinkError { .. }));
    }

    #[test]
    fn test_link_rejects_missing_pad() {
        let mut graph = FilterGraph::new();
        let (src, sink) = endpoints(&mut graph);
        assert!(
            graph
                .link(PadRef::output(src, 1), PadRef::input(sink, 0))
                .is_err()
        );
    }

    #[test]
    fn test_link_rejects_double_link() {
        let mut graph = FilterGraph::new();
        let (src, sink) = endpoints(&mut graph);
        let id = graph
            .add_filter("extra", "identity", FilterOptions::new())
            .unwrap();
        graph
            .link(PadRef::output(src, 0), PadRef::input(sink, 0))
            .unwrap();
        let err = graph
            .link(PadRef::output(src, 0), PadRef::input(id, 0))
            .unwrap_err();
        assert!(err.to_string().contains("already linked"));
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = FilterGraph::new();
        let a = graph.add_filter("a", "identity", FilterOptions::new()).unwrap();
        let b = graph.add_filter("b", "identity", FilterOptions::new()).unwrap();
        graph
            .link(PadRef::output(a, 0), PadRef::input(b, 0))
            .unwrap();
        let err = graph
            .link(PadRef::output(b, 0), PadRef::input(a, 0))
            .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_duplicate_node_name() {
        let mut graph = FilterGraph::new();
        graph.add_filter("x", "identity", FilterOptions::new()).unwrap();
        assert!(graph.add_filter("x", "negate", FilterOptions::new()).is_err());
        assert!(graph.create_source(FORMAT, 4, 2, Framerate::FPS_25).is_ok());
        assert!(graph.create_source(FORMAT, 4, 2, Framerate::FPS_25).is_err());
    }

    #[test]
    fn test_unknown_filter_leaves_graph_unchanged() {
        let mut graph = FilterGraph::new();
        let (src, sink) = endpoints(&mut graph);
        let err = graph
            .parse_and_link(
                "identity,boxblur",
                PadRef::output(src, 0),
                PadRef::input(sink, 0),
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnknownFilter(_)));
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.link_count(), 0);
    }

    #[test]
    fn test_configure_requires_links() {
        let mut graph = FilterGraph::new();
        endpoints(&mut graph);
        assert!(matches!(graph.configure(), Err(Error::LinkError { .. })));
    }

    #[test]
    fn test_configure_dangling_filter() {
        let mut graph = FilterGraph::new();
        let (src, sink) = endpoints(&mut graph);
        graph
            .link(PadRef::output(src, 0), PadRef::input(sink, 0))
            .unwrap();
        graph
            .add_filter("orphan", "identity", FilterOptions::new())
            .unwrap();
        let err = graph.configure().unwrap_err();
        assert!(err.to_string().contains("orphan"));
    }

    #[test]
    fn test_configure_format_mismatch_names_node() {
        let mut graph = FilterGraph::new();
        let (src, sink) = endpoints(&mut graph);
        graph
            .parse_and_link(
                "format=pix_fmts=nv12",
                PadRef::output(src, 0),
                PadRef::input(sink, 0),
            )
            .unwrap();
        match graph.configure() {
            Err(Error::FormatMismatch { node, expected, got }) => {
                assert_eq!(node, "Parsed_format_0");
                assert_eq!(expected, "[nv12]");
                assert_eq!(got, FORMAT);
            }
            other => panic!("expected FormatMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_push_before_configure() {
        let mut graph = FilterGraph::new();
        endpoints(&mut graph);
        assert!(matches!(
            graph.push(&frame(0)),
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(graph.pull(), Err(Error::InvalidState { .. })));
    }

    #[test]
    fn test_push_pull_stamps_metadata() {
        let mut graph = chain("identity");
        graph.push(&frame(1)).unwrap();
        graph.push(&frame(2)).unwrap();
        assert_eq!(graph.state(), NodeState::Streaming);

        let first = graph.pull().unwrap().unwrap();
        let second = graph.pull().unwrap().unwrap();
        assert!(graph.pull().unwrap().is_none());

        assert_eq!(first, frame(1));
        assert_eq!(first.metadata().sequence, 0);
        assert_eq!(second.metadata().sequence, 1);
        assert_eq!(
            second.metadata().pts,
            Some(std::time::Duration::from_millis(40))
        );
    }

    #[test]
    fn test_push_rejects_wrong_geometry() {
        let mut graph = chain("null");
        let wrong = PlanarFrame::allocate(8, 2, FORMAT).unwrap();
        assert!(matches!(
            graph.push(&wrong),
            Err(Error::InvalidGeometry { .. })
        ));
        let nv12 = PlanarFrame::allocate(4, 2, PixelFormat::Nv12).unwrap();
        assert!(matches!(
            graph.push(&nv12),
            Err(Error::FormatMismatch { .. })
        ));
        // Rejected input does not close the graph.
        assert!(graph.push(&frame(0)).is_ok());
    }

    #[test]
    fn test_pull_into_recycles() {
        let mut graph = chain("negate");
        let mut out = PlanarFrame::allocate(4, 2, FORMAT).unwrap();
        for v in 0..4 {
            graph.push(&frame(v)).unwrap();
            assert!(graph.pull_into(&mut out).unwrap());
            assert_eq!(out, frame(255 - v));
        }
        assert!(!graph.pull_into(&mut out).unwrap());
        let stats = graph.pool_stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.reuses, 3);
    }

    #[test]
    fn test_flush_drains_in_order_then_closes() {
        let mut graph = chain("delay=frames=2");
        for v in 1..=3 {
            graph.push(&frame(v)).unwrap();
        }
        assert_eq!(graph.pull().unwrap().unwrap(), frame(1));
        assert!(graph.pull().unwrap().is_none());

        let drained: Vec<_> = graph.flush().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(drained, vec![frame(2), frame(3)]);
        assert_eq!(graph.state(), NodeState::Closed);
        assert!(matches!(graph.flush(), Err(Error::GraphClosed)));
        assert!(matches!(graph.push(&frame(0)), Err(Error::GraphClosed)));
        assert!(matches!(graph.pull(), Err(Error::GraphClosed)));
    }

    #[test]
    fn test_flush_cascades_through_buffering_nodes() {
        let mut graph = chain("delay=frames=1,tblend=frames=2");
        graph.push(&frame(10)).unwrap();
        graph.push(&frame(20)).unwrap();
        assert!(graph.pull().unwrap().is_none());

        // delay releases 20 into tblend, which then averages the pair
        let drained: Vec<_> = graph.flush().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(drained, vec![frame(15)]);
    }

    #[test]
    fn test_dropped_flush_closes_graph() {
        let mut graph = chain("delay=frames=3");
        graph.push(&frame(1)).unwrap();
        graph.push(&frame(2)).unwrap();
        {
            let mut flush = graph.flush().unwrap();
            assert!(flush.next().is_some());
        }
        assert_eq!(graph.state(), NodeState::Closed);
    }

    #[test]
    fn test_close() {
        let mut graph = chain("identity");
        graph.push(&frame(1)).unwrap();
        graph.close();
        assert_eq!(graph.state(), NodeState::Closed);
        assert!(matches!(graph.pull(), Err(Error::GraphClosed)));
        assert!(matches!(graph.configure(), Err(Error::GraphClosed)));
        let id = graph.node_by_name("Parsed_identity_0").unwrap();
        assert_eq!(graph.node(id).unwrap().state(), NodeState::Closed);
    }

    #[test]
    fn test_run_node_requires_negotiated_state() {
        let format = VideoFormat::new(4, 2, FORMAT, Framerate::FPS_25);
        let mut pool = FramePool::new();
        let mut node = Node::new(
            "idle".to_string(),
            FilterKind::Filter,
            "identity",
            FilterOptions::new(),
            NodeBody::Filter(Box::new(Identity::new())),
        );
        node.input_format = Some(format);
        node.output_format = Some(format);

        let err = run_node(&mut node, Some(frame(1)), &mut pool).unwrap_err();
        assert!(matches!(err, Error::InvalidState { operation: "process", .. }));

        node.state = NodeState::Streaming;
        assert_eq!(run_node(&mut node, Some(frame(1)), &mut pool).unwrap().len(), 1);

        node.state = NodeState::Closed;
        assert!(run_node(&mut node, None, &mut pool).is_err());
    }

    #[test]
    fn test_add_filter_instance() {
        let mut graph = FilterGraph::new();
        let (src, sink) = endpoints(&mut graph);
        let observed = Identity::new().with_name("observer");
        let counters = observed.counters();
        let id = graph.add_filter_instance("observer", Box::new(observed)).unwrap();
        graph
            .link(PadRef::output(src, 0), PadRef::input(id, 0))
            .unwrap();
        graph
            .link(PadRef::output(id, 0), PadRef::input(sink, 0))
            .unwrap();
        graph.configure().unwrap();

        graph.push(&frame(3)).unwrap();
        assert_eq!(counters.stats().frame_count, 1);
        assert_eq!(graph.links().len(), 2);
        assert_eq!(graph.output_format().unwrap().pixel_format, FORMAT);
    }
}
