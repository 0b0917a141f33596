//! Channel-order remapping onto ACN.

use crate::{Error, Result};
use halo_core::{AudioGraph, ChannelMerger, NodeId};
use std::fmt;

/// Permutation from physical channel order to ACN.
///
/// Entry `i` names the ACN slot that physical channel `i` is routed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelMap(Vec<usize>);

impl ChannelMap {
    /// ACN order as-is.
    pub const DEFAULT: [usize; 4] = [0, 1, 2, 3];

    /// Safari's decoding of 4-channel AAC.
    pub const SAFARI: [usize; 4] = [2, 0, 1, 3];

    /// Furse-Malham (W, X, Y, Z) to ACN.
    pub const FUMA: [usize; 4] = [0, 3, 1, 2];

    /// Validate that `indices` is a permutation of `0..indices.len()`.
    pub fn new(indices: impl Into<Vec<usize>>) -> Result<Self> {
        let indices = indices.into();
        if indices.is_empty() {
            return Err(Error::InvalidChannelMap("channel map is empty".into()));
        }
        let mut seen = vec![false; indices.len()];
        for &index in &indices {
            match seen.get_mut(index) {
                None => {
                    return Err(Error::InvalidChannelMap(format!(
                        "index {index} out of range for {} channels",
                        indices.len()
                    )))
                }
                Some(true) => {
                    return Err(Error::InvalidChannelMap(format!(
                        "index {index} appears more than once"
                    )))
                }
                Some(slot) => *slot = true,
            }
        }
        Ok(Self(indices))
    }

    /// Identity map over `channels`.
    pub fn identity(channels: usize) -> Self {
        Self((0..channels).collect())
    }

    pub fn safari() -> Self {
        Self(Self::SAFARI.to_vec())
    }

    pub fn fuma() -> Self {
        Self(Self::FUMA.to_vec())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Fails unless the map covers exactly `channels` channels.
    pub fn check_len(&self, channels: usize) -> Result<()> {
        if self.0.len() != channels {
            return Err(Error::InvalidChannelMap(format!(
                "expected {channels} entries, got {}",
                self.0.len()
            )));
        }
        Ok(())
    }
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self(Self::DEFAULT.to_vec())
    }
}

impl TryFrom<Vec<usize>> for ChannelMap {
    type Error = Error;

    fn try_from(indices: Vec<usize>) -> Result<Self> {
        Self::new(indices)
    }
}

impl TryFrom<&[usize]> for ChannelMap {
    type Error = Error;

    fn try_from(indices: &[usize]) -> Result<Self> {
        Self::new(indices.to_vec())
    }
}

impl fmt::Display for ChannelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Two pass-through junctions wired port-to-port by a [`ChannelMap`].
///
/// Remapping drops every edge between the junctions and rewires, so the
/// router is always a clean permutation. The new wiring plays from the
/// commit that follows.
#[derive(Debug)]
pub struct Router {
    input: NodeId,
    output: NodeId,
    map: ChannelMap,
}

impl Router {
    pub fn new(graph: &mut AudioGraph, map: ChannelMap) -> Result<Self> {
        let channels = map.len();
        let input = graph.add(ChannelMerger::new(channels));
        let output = graph.add(ChannelMerger::new(channels));
        let router = Self { input, output, map };
        router.wire(graph)?;
        Ok(router)
    }

    pub fn input(&self) -> NodeId {
        self.input
    }

    pub fn output(&self) -> NodeId {
        self.output
    }

    pub fn channel_map(&self) -> &ChannelMap {
        &self.map
    }

    /// Rewire to `map`. An unchanged map touches nothing.
    pub fn set_channel_map(&mut self, graph: &mut AudioGraph, map: ChannelMap) -> Result<()> {
        map.check_len(self.map.len())?;
        if map == self.map {
            return Ok(());
        }
        tracing::debug!("Channel map {} -> {}", self.map, map);

        self.map = map;
        graph.disconnect_to(self.input, self.output);
        self.wire(graph)
    }

    fn wire(&self, graph: &mut AudioGraph) -> Result<()> {
        for (channel, &target) in self.map.as_slice().iter().enumerate() {
            graph.connect(self.input, channel, self.output, target)?;
        }
        Ok(())
    }
}
