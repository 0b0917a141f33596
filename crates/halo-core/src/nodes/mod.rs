//! Built-in graph primitives. Each is a fundsp [`AudioUnit`](fundsp::prelude::AudioUnit)
//! whose clones share their control state, so the handle kept by the control
//! side steers the copy the renderer runs.

mod gain;
mod mixer;
mod source;

pub use gain::{GainHandle, GainNode};
pub use mixer::{ChannelMerger, MatrixHandle, MatrixMixer};
pub use source::{BufferSourceNode, SourceEvent};
