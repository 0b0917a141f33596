//! Integration test modules for halo
//!
//! - engine: lifecycle state machine, initialization, disposal
//! - transport: play/pause/prepare/stop, loading, stream binding, events
//! - rendering: audio through the full engine graph

pub mod engine;
pub mod rendering;
pub mod transport;
