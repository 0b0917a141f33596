//! Audio graph runtime for halo.
//!
//! # Primary API
//!
//! - [`AudioContext`]: lazily created output device plus its [`AudioGraph`]
//! - [`AudioGraph`]: control-side frontend of a fundsp network, with
//!   per-channel connections; [`GraphRenderer`] pulls the committed network
//!   one [`RENDER_QUANTUM`] at a time
//! - [`AudioUnit`]: the processing contract; built-in units live in [`nodes`]
//! - [`ContentBuffer`]: decoded planar PCM shared between loader and sources
//! - [`tap`]: visualization tap feeding a callback thread
//!
//! # Feature-gated APIs
//!
//! - `"cpal"`: [`CpalOutput`] and [`AudioContext::default_output`] for hardware output
//!
//! # Example
//!
//! ```
//! use halo_core::{AudioContext, GainNode};
//!
//! let context = AudioContext::offline(48000.0);
//! context
//!     .graph(|g| {
//!         let gain = g.add(GainNode::new(2, 0.5));
//!         g.connect_all(gain, g.destination())
//!     })
//!     .unwrap()
//!     .unwrap();
//!
//! let block = context.render(128).unwrap();
//! assert!(block[0].iter().all(|s| *s == 0.0));
//! ```

pub mod error;
pub use error::{Error, Result};

mod buffer;
pub use buffer::ContentBuffer;

mod config;
pub use config::OutputConfig;

mod context;
pub use context::{AudioContext, DeviceState, OfflineDevice, OutputDevice, SharedGraph};

mod graph;
pub use graph::{AudioGraph, Connection, GraphRenderer, GraphStats, RENDER_QUANTUM};

mod lockfree;
pub use lockfree::{AtomicFlag, AtomicFloat};

pub mod nodes;
pub use nodes::{
    BufferSourceNode, ChannelMerger, GainHandle, GainNode, MatrixHandle, MatrixMixer, SourceEvent,
};

pub use fundsp::net::NodeId;
pub use fundsp::buffer::BufferVec;
pub use fundsp::prelude::{AudioUnit, BufferMut, BufferRef};
pub use fundsp::signal::SignalFrame;
pub use fundsp::MAX_BUFFER_SIZE;

mod smooth;
pub use smooth::SmoothedValue;

pub mod tap;

#[cfg(feature = "cpal")]
mod output;
#[cfg(feature = "cpal")]
pub use output::CpalOutput;
