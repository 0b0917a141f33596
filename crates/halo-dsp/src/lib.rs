//! Ambisonic DSP for halo.
//!
//! Rotation of first- to third-order sound fields, channel-order routing,
//! HRIR convolution and the renderer that ties them into an
//! [`AudioGraph`](halo_core::AudioGraph).
//!
//! ```no_run
//! use halo_core::AudioGraph;
//! use halo_dsp::{AmbisonicOrder, AmbisonicRenderer, RendererConfig};
//!
//! let (mut graph, _output) = AudioGraph::new(48000.0, 2);
//! let mut renderer = AmbisonicRenderer::new(
//!     &mut graph,
//!     RendererConfig::new(AmbisonicOrder::Third),
//! )?;
//! renderer.initialize(&mut graph)?;
//! graph.connect_all(renderer.output(), graph.destination())?;
//! graph.commit();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
pub use error::{Error, Result};

mod order;
pub use order::{acn_degree_index, AmbisonicOrder};

pub mod harmonics;
pub mod orientation;

mod rotation;
pub use rotation::{
    invert_matrix4, rotation_from_camera_matrix, BandRotation, RotationMatrix3, RotationMatrix4,
    IDENTITY_MATRIX3,
};

mod rotator;
pub use rotator::Rotator;

mod router;
pub use router::{ChannelMap, Router};

mod convolver;
pub use convolver::{BinauralConvolver, ConvolverKernels, ConvolverNode};

mod hrir;
pub use hrir::{HrirSet, HrirSource, PendingHrirs};

mod renderer;
pub use renderer::{AmbisonicRenderer, FoaRenderer, HoaRenderer, RendererConfig, RenderingMode};

pub use orientation::{EngineQuaternion, Quaternion, RotationQuaternion};
