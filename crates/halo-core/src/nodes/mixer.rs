use crate::{Error, Result};
use arc_swap::ArcSwap;
use fundsp::prelude::{AudioUnit, BufferMut, BufferRef};
use fundsp::signal::SignalFrame;
use std::sync::Arc;

/// Pass-through junction. Output channel `i` carries whatever the graph
/// connected into input channel `i`, so the connections decide the layout.
#[derive(Debug, Clone)]
pub struct ChannelMerger {
    channels: usize,
}

impl ChannelMerger {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl AudioUnit for ChannelMerger {
    fn inputs(&self) -> usize {
        self.channels
    }

    fn outputs(&self) -> usize {
        self.channels
    }

    fn reset(&mut self) {}

    fn set_sample_rate(&mut self, _sample_rate: f64) {}

    fn tick(&mut self, input: &[f32], output: &mut [f32]) {
        output.copy_from_slice(&input[..output.len()]);
    }

    fn process(&mut self, size: usize, input: &BufferRef, output: &mut BufferMut) {
        for channel in 0..self.channels {
            for i in 0..size {
                output.set_f32(channel, i, input.at_f32(channel, i));
            }
        }
    }

    fn get_id(&self) -> u64 {
        0x4D45_5247_4552
    }

    fn route(&mut self, input: &SignalFrame, _frequency: f64) -> SignalFrame {
        input.clone()
    }

    fn footprint(&self) -> usize {
        core::mem::size_of::<Self>()
    }
}

/// Control side of a [`MatrixMixer`].
///
/// The matrix is swapped whole, so a block is mixed with either the old or
/// the new coefficients, never a blend of both.
#[derive(Debug, Clone)]
pub struct MatrixHandle {
    inputs: usize,
    outputs: usize,
    coefficients: Arc<ArcSwap<Vec<f32>>>,
}

impl MatrixHandle {
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    pub fn coefficient(&self, output: usize, input: usize) -> f32 {
        self.coefficients.load()[output * self.inputs + input]
    }

    pub fn coefficients(&self) -> Vec<f32> {
        self.coefficients.load().as_ref().clone()
    }

    /// Replace the row-major `outputs × inputs` matrix.
    pub fn set(&self, coefficients: &[f32]) -> Result<()> {
        check_shape(self.inputs, self.outputs, coefficients)?;
        self.coefficients.store(Arc::new(coefficients.to_vec()));
        Ok(())
    }
}

fn check_shape(inputs: usize, outputs: usize, coefficients: &[f32]) -> Result<()> {
    if coefficients.len() != inputs * outputs {
        return Err(Error::InvalidConfig(format!(
            "matrix is {}x{}, got {} coefficients",
            outputs,
            inputs,
            coefficients.len()
        )));
    }
    Ok(())
}

/// Gain matrix: `out[o] = Σᵢ c[o][i] · in[i]`.
///
/// Coefficients are row-major (`outputs × inputs`) and live behind a
/// [`MatrixHandle`]; clones share them.
#[derive(Debug, Clone)]
pub struct MatrixMixer {
    inputs: usize,
    outputs: usize,
    coefficients: Arc<ArcSwap<Vec<f32>>>,
}

impl MatrixMixer {
    /// All-zero matrix.
    pub fn new(inputs: usize, outputs: usize) -> Self {
        Self {
            inputs,
            outputs,
            coefficients: Arc::new(ArcSwap::from_pointee(vec![0.0; inputs * outputs])),
        }
    }

    pub fn identity(channels: usize) -> Self {
        let mut coefficients = vec![0.0; channels * channels];
        for i in 0..channels {
            coefficients[i * channels + i] = 1.0;
        }
        Self {
            inputs: channels,
            outputs: channels,
            coefficients: Arc::new(ArcSwap::from_pointee(coefficients)),
        }
    }

    pub fn with_coefficients(inputs: usize, outputs: usize, coefficients: &[f32]) -> Result<Self> {
        check_shape(inputs, outputs, coefficients)?;
        Ok(Self {
            inputs,
            outputs,
            coefficients: Arc::new(ArcSwap::from_pointee(coefficients.to_vec())),
        })
    }

    pub fn handle(&self) -> MatrixHandle {
        MatrixHandle {
            inputs: self.inputs,
            outputs: self.outputs,
            coefficients: Arc::clone(&self.coefficients),
        }
    }
}

impl AudioUnit for MatrixMixer {
    fn inputs(&self) -> usize {
        self.inputs
    }

    fn outputs(&self) -> usize {
        self.outputs
    }

    fn reset(&mut self) {}

    fn set_sample_rate(&mut self, _sample_rate: f64) {}

    fn tick(&mut self, input: &[f32], output: &mut [f32]) {
        let coefficients = self.coefficients.load();
        for (o, out) in output.iter_mut().enumerate() {
            let row = &coefficients[o * self.inputs..(o + 1) * self.inputs];
            *out = row.iter().zip(input).map(|(c, x)| c * x).sum();
        }
    }

    fn process(&mut self, size: usize, input: &BufferRef, output: &mut BufferMut) {
        let coefficients = self.coefficients.load();
        for o in 0..self.outputs {
            for i in 0..size {
                output.set_f32(o, i, 0.0);
            }
            let row = &coefficients[o * self.inputs..(o + 1) * self.inputs];
            for (channel, c) in row.iter().enumerate() {
                if *c == 0.0 {
                    continue;
                }
                for i in 0..size {
                    let mixed = output.at_f32(o, i) + c * input.at_f32(channel, i);
                    output.set_f32(o, i, mixed);
                }
            }
        }
    }

    fn get_id(&self) -> u64 {
        0x4D41_5452_4958
    }

    fn route(&mut self, _input: &SignalFrame, _frequency: f64) -> SignalFrame {
        SignalFrame::new(self.outputs)
    }

    fn footprint(&self) -> usize {
        core::mem::size_of::<Self>() + self.inputs * self.outputs * core::mem::size_of::<f32>()
    }
}
