//! Error types for halo-dsp

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid ambisonic order: {0} (supported: 1, 2, 3)")]
    InvalidOrder(u32),

    #[error("Invalid channel map: {0}")]
    InvalidChannelMap(String),

    #[error("Invalid HRIR set: {0}")]
    InvalidHrirSet(String),

    #[error("Invalid rendering mode: {0:?}")]
    InvalidRenderingMode(String),

    #[error("Invalid quaternion: {0}")]
    InvalidQuaternion(String),

    #[error("Renderer is already initialized")]
    AlreadyInitialized,

    #[error("Matrix is not invertible")]
    SingularMatrix,

    #[error("HRIR loading failed: {0}")]
    Loader(#[from] halo_loader::Error),

    #[error(transparent)]
    Core(#[from] halo_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
