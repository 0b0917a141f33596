//! Centralized error type for the halo umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// An operation was called out of order or in the wrong content mode.
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// Decoded content does not fit the engine's ambisonic order.
    #[error("Content mismatch: {0}")]
    ContentMismatch(String),

    #[error(transparent)]
    Core(#[from] halo_core::Error),

    #[error("DSP: {0}")]
    Dsp(#[from] halo_dsp::Error),

    #[error("Loader: {0}")]
    Loader(#[from] halo_loader::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Error::ContractViolation(_))
    }

    /// Whether the failure was a cancelled load, either direct or while
    /// fetching HRIRs.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Loader(e) => e.is_cancelled(),
            Error::Dsp(halo_dsp::Error::Loader(e)) => e.is_cancelled(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
