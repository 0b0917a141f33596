//! # Halo - Ambisonic to binaural rendering engine
//!
//! Plays first- to third-order ambisonic content over headphones, rotating
//! the sound field with the listener's head.
//!
//! ## Architecture
//!
//! Halo is an umbrella crate that coordinates:
//! - **halo-core** - Audio graph runtime (fundsp network frontend/backend, nodes, audio context, tap)
//! - **halo-dsp** - Rotation, channel routing, HRIR convolution, renderer façade, orientation adapters
//! - **halo-loader** - Parallel chunk loading, WAV decode, channel merge
//!
//! [`HaloEngine`] wires them together: it owns one renderer, feeds it from
//! decoded content or from a live node, and handles gain, orientation,
//! transport and teardown.
//!
//! ## Quick Start
//!
//! ```
//! use halo::prelude::*;
//!
//! let context = AudioContext::offline(48000.0);
//! let mut engine = HaloEngine::builder()
//!     .order(AmbisonicOrder::First)
//!     .context(context.clone())
//!     .build()?;
//! engine.initialize()?;
//!
//! // Two seconds of first-order silence
//! engine.load_from_buffer(ContentBuffer::silent(4, 96000, 48000.0)?)?;
//! engine.play(0.0)?;
//! engine.rotate_with_azimuth_elevation(90.0, 0.0)?;
//!
//! let block = context.render(128)?;
//! assert_eq!(block.len(), 2);
//! # Ok::<(), halo::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `cpal` - Hardware output on the system default device

/// Re-export of halo-core for direct access
pub use halo_core as core;

/// Re-export of halo-dsp for direct access
pub use halo_dsp as dsp;

/// Re-export of halo-loader for direct access
pub use halo_loader as loader;

// Graph runtime
pub use halo_core::{AudioContext, AudioGraph, ContentBuffer, DeviceState, NodeId, RENDER_QUANTUM};

// Rendering
pub use halo_dsp::{
    AmbisonicOrder, ChannelMap, EngineQuaternion, HrirSet, HrirSource, Quaternion,
    RenderingMode, RotationQuaternion,
};

// Loading
pub use halo_loader::{AbortSignal, ChunkFetcher, ChunkSource, FileFetcher, LoadHandle, LoadProgress};

mod error;
pub use error::{Error, Result};

mod builder;
mod engine;
mod transport;

pub use builder::HaloEngineBuilder;
pub use engine::{
    db_to_linear, linear_to_db, sample_rate_compensation, volume_to_gain, EngineEvent,
    EngineState, HaloEngine, GAIN_RAMP_SECONDS, MAX_DB, MIN_DB, REFERENCE_HRIR_SAMPLE_RATE,
};
pub use transport::PlaybackClock;

/// Convenience prelude for common imports
pub mod prelude {
    // Main engine
    pub use crate::{EngineEvent, EngineState, HaloEngine, HaloEngineBuilder};

    // Essential types
    pub use crate::{AudioContext, ContentBuffer, DeviceState, NodeId};

    // Rendering
    pub use crate::{AmbisonicOrder, ChannelMap, HrirSource, RenderingMode};

    // Orientation
    pub use crate::dsp::orientation::{
        engine_quaternion_from_azimuth_elevation, to_engine_quaternion,
    };
    pub use crate::{Quaternion, RotationQuaternion};

    // Loading
    pub use crate::{ChunkSource, LoadProgress};
}
