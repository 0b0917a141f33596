//! Control-side frontend of the fundsp audio network.
//!
//! [`AudioGraph`] owns a [`fundsp::net::Net`] plus a mirror of its wiring.
//! Edits land in the frontend only; [`AudioGraph::commit`] ships them to the
//! [`GraphRenderer`], which owns the matching [`NetBackend`] on the render
//! side. The two halves never share a lock: the backend swaps in a committed
//! network between blocks and keeps the running state of nodes that survived
//! the edit.
//!
//! Connections are `(from, channel) → (to, channel)` edges. An input channel
//! has at most one source: connecting to an occupied input replaces its edge.
//! An output channel may feed any number of inputs.
//!
//! # Example
//!
//! ```
//! use halo_core::{AudioGraph, GainNode};
//!
//! let (mut graph, mut renderer) = AudioGraph::new(48000.0, 2);
//! let gain = graph.add(GainNode::new(2, 0.5));
//! graph.connect_all(gain, graph.destination()).unwrap();
//! graph.commit();
//!
//! let mut out = vec![vec![1.0; 128]; 2];
//! renderer.render_planar(&mut out);
//! assert!(out[0].iter().all(|s| *s == 0.0));
//! ```

use crate::nodes::ChannelMerger;
use crate::{Error, Result};
use fundsp::buffer::{BufferRef, BufferVec};
use fundsp::net::{Net, NodeId};
use fundsp::prelude::AudioUnit;
use fundsp::realnet::NetBackend;
use fundsp::MAX_BUFFER_SIZE;

/// Frames pulled from the backend per render step. Control changes reach the
/// audio at the next quantum boundary.
pub const RENDER_QUANTUM: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub from: NodeId,
    pub from_channel: usize,
    pub to: NodeId,
    pub to_channel: usize,
}

/// Counts of structural graph operations since creation.
///
/// Every `connect*` / `disconnect*` call counts once, whether or not it changed
/// anything, so callers can assert that an operation left the wiring alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub connect_calls: u64,
    pub disconnect_calls: u64,
    pub nodes_added: u64,
    pub nodes_removed: u64,
    pub commits: u64,
}

pub struct AudioGraph {
    net: Net,
    sample_rate: f64,
    output_channels: usize,
    destination: NodeId,
    nodes: Vec<NodeId>,
    connections: Vec<Connection>,
    stats: GraphStats,
    /// Frontend edits not yet committed.
    dirty: bool,
}

impl AudioGraph {
    /// Create a graph whose destination node has `output_channels` channels,
    /// plus the renderer that plays it.
    pub fn new(sample_rate: f64, output_channels: usize) -> (Self, GraphRenderer) {
        let mut net = Net::new(0, output_channels);
        net.set_sample_rate(sample_rate);
        let destination = net.push(Box::new(ChannelMerger::new(output_channels)));
        net.pipe_output(destination);
        let backend = net.backend();

        let graph = Self {
            net,
            sample_rate,
            output_channels,
            destination,
            nodes: vec![destination],
            connections: Vec::new(),
            stats: GraphStats::default(),
            dirty: false,
        };
        (graph, GraphRenderer::new(backend, output_channels))
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Final node of the graph. Whatever reaches it is what the device plays.
    pub fn destination(&self) -> NodeId {
        self.destination
    }

    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    pub fn add(&mut self, unit: impl AudioUnit + 'static) -> NodeId {
        self.add_boxed(Box::new(unit))
    }

    pub fn add_boxed(&mut self, mut unit: Box<dyn AudioUnit>) -> NodeId {
        unit.set_sample_rate(self.sample_rate);
        let id = self.net.push(unit);
        self.nodes.push(id);
        self.stats.nodes_added += 1;
        self.dirty = true;
        id
    }

    /// Remove a node and every edge touching it. Inputs it fed fall silent.
    pub fn remove(&mut self, node: NodeId) -> Result<Box<dyn AudioUnit>> {
        if node == self.destination {
            return Err(Error::DestinationRemoval);
        }
        if !self.contains(node) {
            return Err(Error::NodeNotFound(node));
        }
        let unit = self.net.remove(node);
        self.nodes.retain(|id| *id != node);
        self.connections.retain(|c| c.from != node && c.to != node);
        self.stats.nodes_removed += 1;
        self.dirty = true;
        Ok(unit)
    }

    /// Swap the unit behind `node` for `unit`, keeping its edges.
    ///
    /// The renderer drops the old unit's state and starts the new one fresh.
    pub fn replace(&mut self, node: NodeId, mut unit: Box<dyn AudioUnit>) -> Result<()> {
        let expected = (self.node_inputs(node)?, self.node_outputs(node)?);
        let found = (unit.inputs(), unit.outputs());
        if expected != found {
            return Err(Error::PortMismatch {
                node,
                expected,
                found,
            });
        }
        unit.set_sample_rate(self.sample_rate);
        // The old unit drops here, on the control thread.
        drop(self.net.replace(node, unit));
        self.dirty = true;
        Ok(())
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.net.contains(node)
    }

    /// Number of nodes, destination included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when only the destination is left.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node_inputs(&self, node: NodeId) -> Result<usize> {
        self.checked(node).map(|id| self.net.node(id).inputs())
    }

    pub fn node_outputs(&self, node: NodeId) -> Result<usize> {
        self.checked(node).map(|id| self.net.node(id).outputs())
    }

    fn checked(&self, node: NodeId) -> Result<NodeId> {
        if self.contains(node) {
            Ok(node)
        } else {
            Err(Error::NodeNotFound(node))
        }
    }

    /// Connect output channel `from_channel` of `from` to input channel
    /// `to_channel` of `to`, replacing whatever fed that input before.
    pub fn connect(
        &mut self,
        from: NodeId,
        from_channel: usize,
        to: NodeId,
        to_channel: usize,
    ) -> Result<()> {
        self.stats.connect_calls += 1;
        let available = self.node_outputs(from)?;
        if from_channel >= available {
            return Err(Error::ChannelOutOfRange {
                node: from,
                direction: "output",
                channel: from_channel,
                available,
            });
        }
        let available = self.node_inputs(to)?;
        if to_channel >= available {
            return Err(Error::ChannelOutOfRange {
                node: to,
                direction: "input",
                channel: to_channel,
                available,
            });
        }
        let edge = Connection {
            from,
            from_channel,
            to,
            to_channel,
        };
        if self.connections.contains(&edge) {
            return Ok(());
        }
        if from == to || self.reaches(to, from) {
            return Err(Error::Cycle { from, to });
        }

        self.connections
            .retain(|c| !(c.to == to && c.to_channel == to_channel));
        self.connections.push(edge);
        self.net.connect(from, from_channel, to, to_channel);
        self.dirty = true;
        Ok(())
    }

    /// Connect channel `i` of `from` to channel `i` of `to` for every channel
    /// both nodes have.
    pub fn connect_all(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        let channels = self.node_outputs(from)?.min(self.node_inputs(to)?);
        for channel in 0..channels {
            self.connect(from, channel, to, channel)?;
        }
        Ok(())
    }

    /// Whether any edge leads from `from` to `node`, directly or through other nodes.
    fn reaches(&self, from: NodeId, node: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = Vec::new();
        while let Some(current) = stack.pop() {
            if current == node {
                return true;
            }
            if seen.contains(&current) {
                continue;
            }
            seen.push(current);
            stack.extend(
                self.connections
                    .iter()
                    .filter(|c| c.from == current)
                    .map(|c| c.to),
            );
        }
        false
    }

    /// Drop every outgoing edge of `from`. Returns how many were removed.
    pub fn disconnect(&mut self, from: NodeId) -> usize {
        self.disconnect_where(|c| c.from == from)
    }

    /// Drop every edge from `from` to `to`.
    pub fn disconnect_to(&mut self, from: NodeId, to: NodeId) -> usize {
        self.disconnect_where(|c| c.from == from && c.to == to)
    }

    /// Drop every edge into `to`.
    pub fn disconnect_inputs(&mut self, to: NodeId) -> usize {
        self.disconnect_where(|c| c.to == to)
    }

    fn disconnect_where(&mut self, selected: impl Fn(&Connection) -> bool) -> usize {
        self.stats.disconnect_calls += 1;
        let (dropped, kept): (Vec<_>, Vec<_>) =
            self.connections.drain(..).partition(|c| selected(c));
        self.connections = kept;
        for edge in &dropped {
            self.net.disconnect(edge.to, edge.to_channel);
        }
        if !dropped.is_empty() {
            self.dirty = true;
        }
        dropped.len()
    }

    pub fn is_connected(&self, from: NodeId, to: NodeId) -> bool {
        self.connections.iter().any(|c| c.from == from && c.to == to)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn stats(&self) -> GraphStats {
        self.stats
    }

    /// Whether there are edits the renderer has not seen.
    pub fn has_pending_edits(&self) -> bool {
        self.dirty
    }

    /// Send pending edits to the renderer. Does nothing when nothing changed.
    pub fn commit(&mut self) {
        if !self.dirty {
            return;
        }
        self.net.commit();
        self.dirty = false;
        self.stats.commits += 1;
        if let Some(error) = self.net.error() {
            tracing::warn!("Audio network reported an error after commit: {:?}", error);
        }
    }
}

impl std::fmt::Debug for AudioGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioGraph")
            .field("sample_rate", &self.sample_rate)
            .field("nodes", &self.nodes.len())
            .field("connections", &self.connections.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// Render-side half of an [`AudioGraph`].
///
/// Owned by whoever pulls audio: the device callback, or the
/// [`AudioContext`](crate::AudioContext) for offline devices. Rendering never
/// takes a lock; committed edits are picked up at the next quantum.
pub struct GraphRenderer {
    backend: NetBackend,
    block: BufferVec,
    quantum: Vec<Vec<f32>>,
    /// Frames of the last quantum already handed out.
    cursor: usize,
}

impl GraphRenderer {
    fn new(backend: NetBackend, channels: usize) -> Self {
        Self {
            backend,
            block: BufferVec::new(channels),
            quantum: vec![vec![0.0; RENDER_QUANTUM]; channels],
            cursor: RENDER_QUANTUM,
        }
    }

    pub fn channels(&self) -> usize {
        self.quantum.len()
    }

    fn process_quantum(&mut self) {
        let silence = BufferRef::new(&[]);
        let mut start = 0;
        while start < RENDER_QUANTUM {
            let size = MAX_BUFFER_SIZE.min(RENDER_QUANTUM - start);
            let mut block = self.block.buffer_mut();
            self.backend.process(size, &silence, &mut block);
            for (channel, quantum) in self.quantum.iter_mut().enumerate() {
                for (i, sample) in quantum[start..start + size].iter_mut().enumerate() {
                    *sample = block.at_f32(channel, i);
                }
            }
            start += size;
        }
    }

    /// Frames left in the current quantum, pulling a new one if it is used up.
    fn next_run(&mut self, wanted: usize) -> usize {
        if self.cursor == RENDER_QUANTUM {
            self.process_quantum();
            self.cursor = 0;
        }
        (RENDER_QUANTUM - self.cursor).min(wanted)
    }

    /// Render into planar buffers, one per output channel.
    ///
    /// Any buffer length works: whole quanta are pulled as needed and the
    /// remainder of a quantum carries over to the next call.
    pub fn render_planar(&mut self, output: &mut [Vec<f32>]) {
        let total = output.first().map_or(0, Vec::len);
        let mut offset = 0;
        while offset < total {
            let run = self.next_run(total - offset);
            let cursor = self.cursor;
            for (channel, out) in output.iter_mut().enumerate() {
                let target = &mut out[offset..offset + run];
                match self.quantum.get(channel) {
                    Some(rendered) => target.copy_from_slice(&rendered[cursor..cursor + run]),
                    None => target.fill(0.0),
                }
            }
            self.cursor += run;
            offset += run;
        }
    }

    /// Render into an interleaved device buffer with `channels` channels per frame.
    pub fn render_interleaved(&mut self, data: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let total = data.len() / channels;
        let mut offset = 0;
        while offset < total {
            let run = self.next_run(total - offset);
            let cursor = self.cursor;
            let block = &mut data[offset * channels..(offset + run) * channels];
            for (frame, samples) in block.chunks_exact_mut(channels).enumerate() {
                for (channel, sample) in samples.iter_mut().enumerate() {
                    *sample = self
                        .quantum
                        .get(channel)
                        .map_or(0.0, |rendered| rendered[cursor + frame]);
                }
            }
            self.cursor += run;
            offset += run;
        }
    }
}
