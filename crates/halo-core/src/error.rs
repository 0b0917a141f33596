//! Error types for halo-core.

use fundsp::net::NodeId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid output config: {0}")]
    InvalidConfig(String),

    #[error("Output device: {0}")]
    InvalidDevice(String),

    #[error("Node {0:?} not found in graph")]
    NodeNotFound(NodeId),

    #[error("Node {node:?} has no {direction} channel {channel} ({available} available)")]
    ChannelOutOfRange {
        node: NodeId,
        direction: &'static str,
        channel: usize,
        available: usize,
    },

    #[error("The destination node cannot be removed")]
    DestinationRemoval,

    #[error("Connecting {from:?} to {to:?} would close a cycle")]
    Cycle { from: NodeId, to: NodeId },

    #[error("Replacement for node {node:?} has {found:?} ports, expected {expected:?}")]
    PortMismatch {
        node: NodeId,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// Hardware devices render on their own callback and cannot be pulled.
    #[error("Output device renders on its own thread")]
    DeviceNotPullable,

    #[error("Invalid content buffer: {0}")]
    InvalidBuffer(String),

    /// Every call on a closed [`AudioContext`](crate::AudioContext) fails with this.
    #[error("Audio context is closed")]
    ContextClosed,

    #[cfg(feature = "cpal")]
    #[error("Output device has no usable default config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[cfg(feature = "cpal")]
    #[error("Cannot open output stream: {0}")]
    OpenStream(#[from] cpal::BuildStreamError),

    #[cfg(feature = "cpal")]
    #[error("Cannot start output stream: {0}")]
    StartStream(#[from] cpal::PlayStreamError),

    #[cfg(feature = "cpal")]
    #[error("Cannot suspend output stream: {0}")]
    SuspendStream(#[from] cpal::PauseStreamError),

    #[cfg(feature = "cpal")]
    #[error("Cannot enumerate output devices: {0}")]
    EnumerateDevices(#[from] cpal::DevicesError),

    #[cfg(feature = "cpal")]
    #[error("Cannot read device name: {0}")]
    DeviceName(#[from] cpal::DeviceNameError),
}

pub type Result<T> = std::result::Result<T, Error>;
