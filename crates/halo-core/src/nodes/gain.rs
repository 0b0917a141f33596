use crate::lockfree::AtomicFloat;
use crate::smooth::SmoothedValue;
use fundsp::prelude::{AudioUnit, BufferMut, BufferRef};
use fundsp::signal::SignalFrame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct GainControl {
    target: AtomicFloat,
    ramp_seconds: AtomicFloat,
    /// Bumped after every write to `target`/`ramp_seconds`.
    generation: AtomicU64,
    /// Smoothed gain as of the last rendered block.
    level: AtomicFloat,
}

/// Control side of a [`GainNode`]. Writes are picked up by the running node
/// at its next block; the latest write wins.
#[derive(Debug, Clone)]
pub struct GainHandle(Arc<GainControl>);

impl GainHandle {
    /// Jump to `value` without a ramp.
    pub fn set_gain(&self, value: f32) {
        self.ramp_to(value, 0.0);
    }

    /// Exponential ramp to `target` over `seconds`.
    pub fn ramp_to(&self, target: f32, seconds: f32) {
        self.0.target.set(target);
        self.0.ramp_seconds.set(seconds);
        self.0.generation.fetch_add(1, Ordering::Release);
    }

    /// Gain the node is at or moving towards.
    pub fn target(&self) -> f32 {
        self.0.target.get()
    }

    pub fn level(&self) -> f32 {
        self.0.level.get()
    }
}

/// Multichannel gain with ramped changes.
///
/// The same gain applies to every channel. Clones share one control block,
/// so a handle taken before the node joins a graph still steers the copy the
/// renderer runs.
#[derive(Clone)]
pub struct GainNode {
    channels: usize,
    gain: SmoothedValue,
    sample_rate: f32,
    control: Arc<GainControl>,
    seen: u64,
}

impl GainNode {
    pub fn new(channels: usize, initial: f32) -> Self {
        Self {
            channels,
            gain: SmoothedValue::immediate(initial),
            sample_rate: 48000.0,
            control: Arc::new(GainControl {
                target: AtomicFloat::new(initial),
                ramp_seconds: AtomicFloat::new(0.0),
                generation: AtomicU64::new(0),
                level: AtomicFloat::new(initial),
            }),
            seen: 0,
        }
    }

    pub fn handle(&self) -> GainHandle {
        GainHandle(Arc::clone(&self.control))
    }

    fn poll_control(&mut self) {
        let generation = self.control.generation.load(Ordering::Acquire);
        if generation == self.seen {
            return;
        }
        self.seen = generation;
        let target = self.control.target.get();
        let seconds = self.control.ramp_seconds.get();
        if seconds <= 0.0 {
            self.gain.set_immediate(target);
            self.control.level.set(target);
        } else {
            self.gain.set_smooth_time(seconds, self.sample_rate);
            self.gain.set_target_exponential(target);
        }
    }
}

impl AudioUnit for GainNode {
    fn inputs(&self) -> usize {
        self.channels
    }

    fn outputs(&self) -> usize {
        self.channels
    }

    fn reset(&mut self) {}

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate as f32;
    }

    fn tick(&mut self, input: &[f32], output: &mut [f32]) {
        self.poll_control();
        let g = self.gain.next_sample();
        for (o, i) in output.iter_mut().zip(input) {
            *o = i * g;
        }
        self.control.level.set(self.gain.current());
    }

    fn process(&mut self, size: usize, input: &BufferRef, output: &mut BufferMut) {
        self.poll_control();
        if !self.gain.is_smoothing() {
            let g = self.gain.current();
            for channel in 0..self.channels {
                for i in 0..size {
                    output.set_f32(channel, i, input.at_f32(channel, i) * g);
                }
            }
            return;
        }

        for i in 0..size {
            let g = self.gain.next_sample();
            for channel in 0..self.channels {
                output.set_f32(channel, i, input.at_f32(channel, i) * g);
            }
        }
        self.control.level.set(self.gain.current());
    }

    fn get_id(&self) -> u64 {
        0x4841_4C4F_4741_494E
    }

    fn route(&mut self, _input: &SignalFrame, _frequency: f64) -> SignalFrame {
        SignalFrame::new(self.channels)
    }

    fn footprint(&self) -> usize {
        core::mem::size_of::<Self>()
    }
}
