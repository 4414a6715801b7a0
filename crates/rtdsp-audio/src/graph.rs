//! Signal graph: the compiled DSP program.
//!
//! A program is assembled with a [`GraphBuilder`] (named processor nodes
//! plus connections), then frozen by [`GraphBuilder::build`] into a
//! [`SignalGraph`] and the [`ParamRegistry`] holding every node's
//! parameters. After that the structure never changes: `prepare` sizes all
//! buffers once, and `process` runs without allocating.
//!
//! # Audio Flow
//! 1. Nodes without incoming connections read the system input
//! 2. Connected nodes receive the sum of their sources' outputs
//! 3. Nodes without outgoing connections are summed into the system output
//!
//! # Mixing Strategy
//! Uses **additive mixing** (sum all sources) without gain compensation.
//! Several loud sources feeding one node can exceed ±1.0; put a gain node
//! in front of the output if that matters.

use rtdsp_core::{Error, Frames, MAX_CHANNELS, Result, Sample, SampleRate};
use rtdsp_processor::{
    AudioBuffer, Metadata, ParamRegistry, ParamSnapshot, Processor, ProcessorError,
};
use smallvec::SmallVec;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::ops::Range;

/// Node index within a builder (insertion order)
pub type NodeId = usize;

/// Parameter address of a node parameter: `/{graph}/{node}/{param}`.
pub fn param_path(graph: &str, node: &str, param: &str) -> String {
    format!("/{graph}/{node}/{param}")
}

struct Node {
    name: String,
    processor: Box<dyn Processor>,
    inputs: usize,
    outputs: usize,
    /// Slice of the parameter snapshot owned by this node
    params: Range<usize>,
}

/// Connection between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub from: NodeId,
    pub to: NodeId,
}

/// Mutable description of a program under construction
pub struct GraphBuilder {
    name: String,
    nodes: Vec<Node>,
    connections: HashSet<Connection>,
    metadata: Metadata,
}

impl GraphBuilder {
    /// Start an empty program. `name` becomes the first path segment of
    /// every parameter id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            connections: HashSet::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a named node.
    ///
    /// Names must be unique, non-empty and free of `/`. Channel counts are
    /// capped at `MAX_CHANNELS`.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        processor: Box<dyn Processor>,
    ) -> Result<NodeId> {
        let name = name.into();
        if name.is_empty() || name.contains('/') {
            return Err(Error::Graph(format!("invalid node name {name:?}")));
        }
        if self.node_id(&name).is_some() {
            return Err(Error::Graph(format!("duplicate node name {name:?}")));
        }

        let inputs = processor.input_channels();
        let outputs = processor.output_channels();
        if inputs > MAX_CHANNELS || outputs > MAX_CHANNELS {
            return Err(Error::Graph(format!(
                "node {name:?} has {inputs} inputs / {outputs} outputs, maximum is {MAX_CHANNELS}"
            )));
        }

        let id = self.nodes.len();
        tracing::debug!("Added node {} '{}' ({} inputs, {} outputs)", id, name, inputs, outputs);
        self.nodes.push(Node {
            name,
            processor,
            inputs,
            outputs,
            params: 0..0,
        });
        Ok(id)
    }

    /// Look up a node by name.
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|node| node.name == name)
    }

    /// Connect two nodes
    ///
    /// Channel counts need not match: channels are paired up by index,
    /// extra source channels are dropped and missing ones read as silence.
    /// Several sources connected to one node are summed.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        if from >= self.nodes.len() {
            return Err(Error::Graph(format!("Source node {from} not found")));
        }
        if to >= self.nodes.len() {
            return Err(Error::Graph(format!("Destination node {to} not found")));
        }

        if self.connections.insert(Connection { from, to }) {
            tracing::debug!("Connected {} -> {}", from, to);
        }
        Ok(())
    }

    /// Disconnect two nodes
    pub fn disconnect(&mut self, from: NodeId, to: NodeId) {
        if self.connections.remove(&Connection { from, to }) {
            tracing::debug!("Disconnected {} -> {}", from, to);
        }
    }

    /// Attach a program-level metadata entry.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key, value);
    }

    /// Perform topological sort using Kahn's algorithm
    ///
    /// Complexity: O((V + E) log V). Ties are broken by lowest node id so
    /// the order is deterministic.
    ///
    /// Returns Ok(order) if graph is acyclic, `Err(remaining_nodes)` if cycles exist.
    fn topological_sort(&self) -> std::result::Result<Vec<NodeId>, Vec<NodeId>> {
        let mut in_degree = vec![0_usize; self.nodes.len()];
        let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::with_capacity(self.nodes.len());
        for conn in &self.connections {
            in_degree[conn.to] += 1;
            adjacency.entry(conn.from).or_default().push(conn.to);
        }

        // Min-heap keeps the ready set sorted
        let mut queue: BinaryHeap<Reverse<NodeId>> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(id, _)| Reverse(id))
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(node_id)) = queue.pop() {
            result.push(node_id);
            if let Some(outgoing) = adjacency.get(&node_id) {
                for &to_id in outgoing {
                    in_degree[to_id] -= 1;
                    if in_degree[to_id] == 0 {
                        queue.push(Reverse(to_id));
                    }
                }
            }
        }

        if result.len() == self.nodes.len() {
            Ok(result)
        } else {
            let processed: HashSet<NodeId> = result.into_iter().collect();
            Err((0..self.nodes.len())
                .filter(|id| !processed.contains(id))
                .collect())
        }
    }

    /// Processing order; cycles fall back to insertion order.
    ///
    /// Within a cycle, edges that point backwards in that order read the
    /// source's output from the previous block.
    fn processing_order(&self) -> Vec<NodeId> {
        match self.topological_sort() {
            Ok(order) => order,
            Err(cycle_nodes) => {
                tracing::warn!(
                    "Graph '{}' contains cycle involving nodes: {:?}. Using insertion order instead.",
                    self.name,
                    cycle_nodes
                );
                (0..self.nodes.len()).collect()
            }
        }
    }

    /// Freeze the program.
    ///
    /// Registers every node parameter under `/{graph}/{node}/{param}`
    /// (grouped by node name) and fixes the processing order.
    pub fn build(self) -> Result<CompiledGraph> {
        let order = self.processing_order();
        let Self {
            name,
            nodes,
            connections,
            mut metadata,
        } = self;

        let mut registry = ParamRegistry::new();
        let mut nodes: Vec<Option<Node>> = nodes.into_iter().map(Some).collect();
        let mut ordered = Vec::with_capacity(nodes.len());
        // Builder id -> position in processing order
        let mut position = vec![0_usize; nodes.len()];

        for (pos, &id) in order.iter().enumerate() {
            position[id] = pos;
            let Some(mut node) = nodes[id].take() else {
                continue;
            };

            let start = registry.len();
            for mut descriptor in node.processor.parameters() {
                descriptor.id = param_path(&name, &node.name, &descriptor.id);
                descriptor.group.clone_from(&node.name);
                registry.register_descriptor(descriptor)?;
            }
            node.params = start..registry.len();

            let info = node.processor.info();
            metadata.insert(format!("{}.processor", node.name), info.unique_id.clone());
            for (key, value) in node.processor.metadata() {
                metadata.insert(format!("{}.{key}", node.name), value);
            }
            ordered.push(node);
        }

        let mut sources = vec![Vec::new(); ordered.len()];
        let mut is_sink = vec![true; ordered.len()];
        for conn in &connections {
            let (from, to) = (position[conn.from], position[conn.to]);
            sources[to].push(from);
            // A backward edge only exists in a cycle; it carries the previous
            // block and does not stop `from` from reaching the output.
            if to > from {
                is_sink[from] = false;
            }
        }
        for list in &mut sources {
            list.sort_unstable();
        }
        metadata.insert("name", name.clone());

        tracing::debug!(
            "Built graph '{}': {} nodes, {} parameters, order {:?}",
            name,
            ordered.len(),
            registry.len(),
            order
        );

        Ok(CompiledGraph {
            graph: SignalGraph {
                name,
                nodes: ordered,
                sources,
                is_sink,
                input_buffers: Vec::new(),
                output_buffers: Vec::new(),
                sample_rate: 0,
                block_size: 0,
                prepared: false,
                metadata,
            },
            params: registry,
        })
    }
}

/// A built program: the graph plus the registry of its parameters
pub struct CompiledGraph {
    pub graph: SignalGraph,
    pub params: ParamRegistry,
}

/// Why a block could not be processed cleanly
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockFailure {
    /// `process` was called before `prepare`
    NotPrepared,
    /// A node failed; `index` is its position in processing order
    Node { index: usize, error: ProcessorError },
}

/// The frozen processing graph
pub struct SignalGraph {
    name: String,
    /// Nodes in processing order
    nodes: Vec<Node>,
    /// Incoming connections per node (positions in `nodes`)
    sources: Vec<Vec<usize>>,
    /// Nodes without outgoing forward connections feed the system output
    is_sink: Vec<bool>,
    input_buffers: Vec<Vec<Vec<Sample>>>,
    output_buffers: Vec<Vec<Vec<Sample>>>,
    sample_rate: SampleRate,
    block_size: Frames,
    prepared: bool,
    metadata: Metadata,
}

impl SignalGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Node names in processing order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.name.as_str())
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    pub fn block_size(&self) -> Frames {
        self.block_size
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Initialize every processor and allocate every buffer.
    ///
    /// Control-thread only. Processors are reset as part of initialization.
    pub fn prepare(&mut self, sample_rate: SampleRate, block_size: Frames) -> Result<()> {
        for node in &mut self.nodes {
            node.processor
                .initialize(sample_rate, block_size)
                .map_err(|e| Error::Graph(format!("node '{}': {e}", node.name)))?;
            node.processor.reset();
        }

        self.input_buffers = self
            .nodes
            .iter()
            .map(|node| vec![vec![0.0; block_size]; node.inputs])
            .collect();
        self.output_buffers = self
            .nodes
            .iter()
            .map(|node| vec![vec![0.0; block_size]; node.outputs])
            .collect();

        self.sample_rate = sample_rate;
        self.block_size = block_size;
        self.prepared = true;
        tracing::debug!(
            "Prepared graph '{}' at {} Hz, {} frames",
            self.name,
            sample_rate,
            block_size
        );
        Ok(())
    }

    /// Clear all processor state (filter memories, phases).
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.processor.reset();
        }
        for buffer in self.output_buffers.iter_mut().flatten() {
            buffer.fill(0.0);
        }
    }

    /// Process one block.
    ///
    /// Every system output channel is fully overwritten. A failing node has
    /// its outputs silenced and the rest of the graph still runs; the first
    /// failure is returned. Real-time safe once prepared.
    pub fn process(
        &mut self,
        params: &ParamSnapshot,
        system_input: &[&[Sample]],
        system_output: &mut [&mut [Sample]],
    ) -> std::result::Result<(), BlockFailure> {
        for channel in system_output.iter_mut() {
            channel.fill(0.0);
        }
        if !self.prepared {
            return Err(BlockFailure::NotPrepared);
        }

        let Self {
            nodes,
            sources,
            is_sink,
            input_buffers,
            output_buffers,
            block_size,
            ..
        } = self;
        let frames = *block_size;
        let mut failure = None;

        for (index, node) in nodes.iter_mut().enumerate() {
            // Route inputs for this node
            let inputs = &mut input_buffers[index];
            for channel in inputs.iter_mut() {
                channel.fill(0.0);
            }
            if sources[index].is_empty() {
                for (input_ch, system_ch) in inputs.iter_mut().zip(system_input) {
                    let len = input_ch.len().min(system_ch.len());
                    input_ch[..len].copy_from_slice(&system_ch[..len]);
                }
            } else {
                for &source in &sources[index] {
                    for (input_ch, source_ch) in inputs.iter_mut().zip(&output_buffers[source]) {
                        for (input_sample, &source_sample) in input_ch.iter_mut().zip(source_ch) {
                            *input_sample += source_sample;
                        }
                    }
                }
            }

            // Channel tables live on the stack; capped by MAX_CHANNELS at add_node
            let result = {
                let input_refs: SmallVec<[&[Sample]; MAX_CHANNELS]> =
                    input_buffers[index].iter().map(Vec::as_slice).collect();
                let mut output_refs: SmallVec<[&mut [Sample]; MAX_CHANNELS]> = output_buffers
                    [index]
                    .iter_mut()
                    .map(Vec::as_mut_slice)
                    .collect();
                let mut audio = AudioBuffer {
                    inputs: &input_refs,
                    outputs: &mut output_refs,
                    frames,
                };
                node.processor
                    .process(params.range(node.params.clone()), &mut audio)
            };

            if let Err(error) = result {
                for channel in &mut output_buffers[index] {
                    channel.fill(0.0);
                }
                if failure.is_none() {
                    failure = Some(BlockFailure::Node { index, error });
                }
            }
        }

        // Mix every sink node into the system output
        for (index, node_output) in output_buffers.iter().enumerate() {
            if !is_sink[index] {
                continue;
            }
            for (system_ch, node_ch) in system_output.iter_mut().zip(node_output) {
                let len = system_ch.len().min(node_ch.len());
                for (out, &sample) in system_ch[..len].iter_mut().zip(&node_ch[..len]) {
                    *out += sample;
                }
            }
        }

        failure.map_or(Ok(()), Err)
    }
}
