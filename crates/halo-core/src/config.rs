//! Output configuration.

use crate::{Error, Result};

/// Format of the device the graph renders into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputConfig {
    pub sample_rate: f64,
    pub channels: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            channels: 2,
        }
    }
}

impl OutputConfig {
    pub fn validate(&self) -> Result<()> {
        if !(8000.0..=384000.0).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "{} Hz is outside the supported 8-384 kHz range",
                self.sample_rate
            )));
        }
        if self.channels == 0 {
            return Err(Error::InvalidConfig(
                "output needs at least one channel".into(),
            ));
        }
        Ok(())
    }
}
