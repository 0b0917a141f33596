//! HRIR convolution and binaural fold-down.

use crate::hrir::HrirSet;
use crate::order::{acn_degree_index, AmbisonicOrder};
use crate::{Error, Result};
use halo_core::{
    AudioGraph, AudioUnit, BufferMut, BufferRef, GainNode, MatrixMixer, NodeId, SignalFrame,
    MAX_BUFFER_SIZE,
};
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Partition length. Matches the network block size so every call is one block.
const BLOCK: usize = MAX_BUFFER_SIZE;
const FFT_SIZE: usize = 2 * BLOCK;
const ZERO: Complex32 = Complex32::new(0.0, 0.0);

/// Frequency-domain partitions of one impulse response.
#[derive(Clone)]
pub struct PartitionedIr {
    partitions: Arc<Vec<Vec<Complex32>>>,
}

impl PartitionedIr {
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }
}

/// Spectra for every channel of a [`ConvolverNode`], built off the render thread.
#[derive(Clone)]
pub struct ConvolverKernels {
    channels: Vec<PartitionedIr>,
}

impl ConvolverKernels {
    /// Partition and transform one impulse response per channel.
    pub fn new(impulse_responses: &[&[f32]]) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let mut scratch = vec![ZERO; fft.get_inplace_scratch_len()];

        let channels = impulse_responses
            .iter()
            .map(|ir| {
                let partitions = ir
                    .chunks(BLOCK)
                    .map(|segment| {
                        let mut spectrum = vec![ZERO; FFT_SIZE];
                        for (bin, sample) in spectrum.iter_mut().zip(segment) {
                            bin.re = *sample;
                        }
                        fft.process_with_scratch(&mut spectrum, &mut scratch);
                        spectrum
                    })
                    .collect();
                PartitionedIr {
                    partitions: Arc::new(partitions),
                }
            })
            .collect();

        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Per-channel overlap-save state.
#[derive(Clone)]
struct ChannelState {
    ir: PartitionedIr,
    /// Input spectra, newest at `head`.
    delay_line: Vec<Vec<Complex32>>,
    head: usize,
    previous_block: Vec<f32>,
}

impl ChannelState {
    fn new(ir: PartitionedIr) -> Self {
        let depth = ir.partition_count().max(1);
        Self {
            ir,
            delay_line: vec![vec![ZERO; FFT_SIZE]; depth],
            head: 0,
            previous_block: vec![0.0; BLOCK],
        }
    }

    fn clear(&mut self) {
        for spectrum in &mut self.delay_line {
            spectrum.fill(ZERO);
        }
        self.previous_block.fill(0.0);
        self.head = 0;
    }
}

/// `N` independent uniformly-partitioned FFT convolutions (overlap-save).
///
/// Outputs silence until kernels are installed. No normalization is applied
/// to the impulse responses. Works in whole `BLOCK`-frame blocks; a shorter
/// call is zero-padded, so it belongs in a network pulled at full block size.
#[derive(Clone)]
pub struct ConvolverNode {
    channels: usize,
    states: Vec<ChannelState>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    work: Vec<Complex32>,
    accumulator: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl ConvolverNode {
    pub fn new(channels: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(FFT_SIZE);
        let inverse = planner.plan_fft_inverse(FFT_SIZE);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        Self {
            channels,
            states: Vec::new(),
            forward,
            inverse,
            work: vec![ZERO; FFT_SIZE],
            accumulator: vec![ZERO; FFT_SIZE],
            scratch: vec![ZERO; scratch_len],
        }
    }

    pub fn is_loaded(&self) -> bool {
        !self.states.is_empty()
    }

    /// Install one kernel per channel. Delay lines start empty.
    ///
    /// Done on the control side, before the node joins a graph or as part of
    /// [`AudioGraph::replace`].
    pub fn install(&mut self, kernels: ConvolverKernels) -> Result<()> {
        if kernels.channel_count() != self.channels {
            return Err(Error::InvalidHrirSet(format!(
                "{} kernels for a {}-channel convolver",
                kernels.channel_count(),
                self.channels
            )));
        }
        self.states = kernels.channels.into_iter().map(ChannelState::new).collect();
        Ok(())
    }

    fn convolve_block(&mut self, channel: usize, input: &[f32], output: &mut [f32]) {
        let state = &mut self.states[channel];

        for (bin, sample) in self.work.iter_mut().zip(&state.previous_block) {
            *bin = Complex32::new(*sample, 0.0);
        }
        for (bin, sample) in self.work[BLOCK..].iter_mut().zip(input) {
            *bin = Complex32::new(*sample, 0.0);
        }
        state.previous_block.copy_from_slice(input);

        self.forward.process_with_scratch(&mut self.work, &mut self.scratch);
        state.delay_line[state.head].copy_from_slice(&self.work);

        self.accumulator.fill(ZERO);
        let depth = state.delay_line.len();
        for (p, partition) in state.ir.partitions.iter().enumerate() {
            let spectrum = &state.delay_line[(state.head + depth - p) % depth];
            for ((acc, x), h) in self.accumulator.iter_mut().zip(spectrum).zip(partition) {
                *acc += x * h;
            }
        }
        state.head = (state.head + 1) % depth;

        self.inverse
            .process_with_scratch(&mut self.accumulator, &mut self.scratch);
        let scale = 1.0 / FFT_SIZE as f32;
        for (y, bin) in output.iter_mut().zip(&self.accumulator[BLOCK..]) {
            *y = bin.re * scale;
        }
    }
}

impl ConvolverNode {
    /// Convolve `size` frames per channel, read and written through the closures.
    fn render(
        &mut self,
        size: usize,
        read: impl Fn(usize, usize) -> f32,
        mut write: impl FnMut(usize, usize, f32),
    ) {
        let len = size.min(BLOCK);
        if !self.is_loaded() {
            for channel in 0..self.channels {
                for i in 0..len {
                    write(channel, i, 0.0);
                }
            }
            return;
        }

        let mut block = [0.0f32; BLOCK];
        let mut rendered = [0.0f32; BLOCK];
        for channel in 0..self.channels {
            for (i, sample) in block.iter_mut().enumerate() {
                *sample = if i < len { read(channel, i) } else { 0.0 };
            }
            self.convolve_block(channel, &block, &mut rendered);
            for (i, sample) in rendered[..len].iter().enumerate() {
                write(channel, i, *sample);
            }
        }
    }
}

impl AudioUnit for ConvolverNode {
    fn inputs(&self) -> usize {
        self.channels
    }

    fn outputs(&self) -> usize {
        self.channels
    }

    fn reset(&mut self) {
        for state in &mut self.states {
            state.clear();
        }
    }

    fn set_sample_rate(&mut self, _sample_rate: f64) {}

    fn tick(&mut self, input: &[f32], output: &mut [f32]) {
        self.render(1, |channel, _| input[channel], |channel, _, sample| {
            output[channel] = sample
        });
    }

    fn process(&mut self, size: usize, input: &BufferRef, output: &mut BufferMut) {
        self.render(
            size,
            |channel, i| input.at_f32(channel, i),
            |channel, i, sample| output.set_f32(channel, i, sample),
        );
    }

    fn get_id(&self) -> u64 {
        0x4852_4952_434F_4E56
    }

    fn route(&mut self, _input: &SignalFrame, _frequency: f64) -> SignalFrame {
        SignalFrame::new(self.channels)
    }

    fn footprint(&self) -> usize {
        let partitions: usize = self.states.iter().map(|s| s.delay_line.len()).sum();
        core::mem::size_of::<Self>()
            + partitions * FFT_SIZE * core::mem::size_of::<Complex32>()
    }
}

/// Binaural fold-down coefficients (2 × channels, row-major).
///
/// Left sums every convolved channel. Right adds channels with `m >= 0` and
/// subtracts those with `m < 0`, mirroring the left-right antisymmetric
/// harmonics.
fn binaural_mix(channels: usize) -> Vec<f32> {
    let mut coefficients = vec![1.0; 2 * channels];
    for acn in 0..channels {
        let (_, m) = acn_degree_index(acn);
        if m < 0 {
            coefficients[channels + acn] = -1.0;
        }
    }
    coefficients
}

/// Stereo-packed HRIR convolution for any order.
///
/// ACN `c` is filtered by channel `c % 2` of HRIR pair `c / 2` and then
/// folded to L/R. The fold-down reaches the output gain only while enabled.
///
/// Loading is split so the FFT work runs without the graph:
/// [`prepare_kernels`](Self::prepare_kernels) builds the spectra, and
/// [`install_kernels`](Self::install_kernels) swaps a loaded convolver in.
#[derive(Debug)]
pub struct BinauralConvolver {
    order: AmbisonicOrder,
    convolver: NodeId,
    mixer: NodeId,
    output: NodeId,
    active: bool,
    loaded: bool,
}

impl BinauralConvolver {
    pub fn new(graph: &mut AudioGraph, order: AmbisonicOrder) -> Result<Self> {
        let channels = order.channel_count();
        let convolver = graph.add(ConvolverNode::new(channels));

        let fold = MatrixMixer::with_coefficients(channels, 2, &binaural_mix(channels))?;
        let mixer = graph.add(fold);
        let output = graph.add(GainNode::new(2, 1.0));

        graph.connect_all(convolver, mixer)?;

        let mut binaural = Self {
            order,
            convolver,
            mixer,
            output,
            active: false,
            loaded: false,
        };
        binaural.enable(graph)?;
        Ok(binaural)
    }

    pub fn input(&self) -> NodeId {
        self.convolver
    }

    pub fn output(&self) -> NodeId {
        self.output
    }

    pub(crate) fn mixer(&self) -> NodeId {
        self.mixer
    }

    pub fn is_enabled(&self) -> bool {
        self.active
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Validate `hrirs` against the order and build the convolution kernels.
    pub fn prepare_kernels(&self, hrirs: &HrirSet) -> Result<ConvolverKernels> {
        let expected = self.order.stereo_pair_count();
        if hrirs.pair_count() != expected {
            return Err(Error::InvalidHrirSet(format!(
                "order {} needs {expected} stereo pairs, got {}",
                self.order,
                hrirs.pair_count()
            )));
        }

        let channels = self.order.channel_count();
        let responses: Vec<&[f32]> = (0..channels)
            .map(|acn| {
                let pair = &hrirs.pairs()[acn / 2];
                let channel = (acn % 2).min(pair.channel_count() - 1);
                pair.channel(channel)
            })
            .collect();
        Ok(ConvolverKernels::new(&responses))
    }

    /// Put a convolver loaded with `kernels` in place. Once a set is in place
    /// further calls are ignored.
    pub fn install_kernels(&mut self, graph: &mut AudioGraph, kernels: ConvolverKernels) -> Result<()> {
        if self.loaded {
            tracing::debug!("HRIR set already loaded; ignoring replacement");
            return Ok(());
        }
        let mut node = ConvolverNode::new(self.order.channel_count());
        node.install(kernels)?;
        graph.replace(self.convolver, Box::new(node))?;
        self.loaded = true;
        Ok(())
    }

    /// Load the HRIRs in one step. Once a set is in place further calls are ignored.
    pub fn set_hrir_set(&mut self, graph: &mut AudioGraph, hrirs: &HrirSet) -> Result<()> {
        if self.loaded {
            tracing::debug!("HRIR set already loaded; ignoring replacement");
            return Ok(());
        }
        let kernels = self.prepare_kernels(hrirs)?;
        self.install_kernels(graph, kernels)?;
        tracing::debug!(
            "Loaded {} HRIR pair(s), {} frames",
            hrirs.pair_count(),
            hrirs.frames()
        );
        Ok(())
    }

    /// Route the fold-down to the output. Idempotent.
    pub fn enable(&mut self, graph: &mut AudioGraph) -> Result<()> {
        if !self.active {
            graph.connect_all(self.mixer, self.output)?;
            self.active = true;
        }
        Ok(())
    }

    /// Cut the fold-down from the output. Idempotent.
    pub fn disable(&mut self, graph: &mut AudioGraph) {
        if self.active {
            graph.disconnect_to(self.mixer, self.output);
            self.active = false;
        }
    }
}
