//! Decoded planar PCM.

use crate::{Error, Result};

/// Immutable decoded audio: one `Vec<f32>` per channel, all the same length.
///
/// Shared between the control thread and buffer source nodes as `Arc<ContentBuffer>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: f64,
}

impl ContentBuffer {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: f64) -> Result<Self> {
        if channels.is_empty() {
            return Err(Error::InvalidBuffer("buffer has no channels".into()));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(Error::InvalidBuffer(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        let frames = channels[0].len();
        if let Some((index, channel)) = channels
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != frames)
        {
            return Err(Error::InvalidBuffer(format!(
                "channel {index} has {} frames, channel 0 has {frames}",
                channel.len()
            )));
        }

        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// All-zero buffer.
    pub fn silent(channels: usize, frames: usize, sample_rate: f64) -> Result<Self> {
        Self::new(vec![vec![0.0; frames]; channels], sample_rate)
    }

    pub fn from_interleaved(samples: &[f32], channels: usize, sample_rate: f64) -> Result<Self> {
        if channels == 0 || samples.len() % channels != 0 {
            return Err(Error::InvalidBuffer(format!(
                "{} interleaved samples do not divide into {channels} channels",
                samples.len()
            )));
        }
        let frames = samples.len() / channels;
        let mut planar = vec![Vec::with_capacity(frames); channels];
        for frame in samples.chunks_exact(channels) {
            for (channel, sample) in planar.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        Self::new(planar, sample_rate)
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate
    }

    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }
}
