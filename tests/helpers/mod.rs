//! Test helpers and fixtures for halo integration tests
//!
//! Every engine renders into an offline context, pulled block by block with
//! [`AudioContext::render`]; no audio hardware is touched.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (passthrough, unity gain)
//! - `DSP_EPSILON` (1e-4): Convolution and rotation
//! - `SILENCE_THRESHOLD` (1e-4): Silence detection (-80dB)

#![allow(dead_code)]

pub mod tolerances;

use halo::prelude::*;
use std::io::Cursor;
use std::time::{Duration, Instant};

/// Default test sample rate (matches the built-in HRIRs)
pub const TEST_SAMPLE_RATE: f64 = 48000.0;

/// Route `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn test_context() -> AudioContext {
    AudioContext::offline(TEST_SAMPLE_RATE)
}

/// Uninitialized engine on its own offline context.
pub fn test_engine(order: AmbisonicOrder) -> (HaloEngine, AudioContext) {
    init_tracing();
    let context = test_context();
    let engine = HaloEngine::builder()
        .order(order)
        .context(context.clone())
        .build()
        .expect("Failed to build test engine");
    (engine, context)
}

/// Initialized engine on its own offline context.
pub fn initialized_engine(order: AmbisonicOrder) -> (HaloEngine, AudioContext) {
    let (mut engine, context) = test_engine(order);
    engine.initialize().expect("Failed to initialize test engine");
    (engine, context)
}

/// Content where channel `c` holds the constant `levels[c]`.
pub fn constant_content(levels: &[f32], seconds: f64, sample_rate: f64) -> ContentBuffer {
    let frames = (seconds * sample_rate).round() as usize;
    let channels = levels.iter().map(|level| vec![*level; frames]).collect();
    ContentBuffer::new(channels, sample_rate).expect("Failed to build content")
}

/// Content for `order` with only ACN `channel` set to `level`.
pub fn single_channel_content(
    order: AmbisonicOrder,
    channel: usize,
    level: f32,
    seconds: f64,
) -> ContentBuffer {
    let mut levels = vec![0.0; order.channel_count()];
    levels[channel] = level;
    constant_content(&levels, seconds, TEST_SAMPLE_RATE)
}

/// Content for `order` with a sine of `frequency` Hz on ACN `channel` only.
pub fn sine_content(
    order: AmbisonicOrder,
    channel: usize,
    frequency: f32,
    amplitude: f32,
    seconds: f64,
) -> ContentBuffer {
    let frames = (seconds * TEST_SAMPLE_RATE).round() as usize;
    let mut channels = vec![vec![0.0; frames]; order.channel_count()];
    let step = 2.0 * std::f32::consts::PI * frequency / TEST_SAMPLE_RATE as f32;
    for (i, sample) in channels[channel].iter_mut().enumerate() {
        *sample = amplitude * (step * i as f32).sin();
    }
    ContentBuffer::new(channels, TEST_SAMPLE_RATE).expect("Failed to build content")
}

/// Largest absolute difference between two signals.
pub fn max_difference(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0_f32, f32::max)
}

/// Encode planar `channels` as a 32-bit float WAV in memory.
pub fn wav_bytes(channels: &[Vec<f32>], sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut bytes = Vec::new();
    {
        let mut writer =
            hound::WavWriter::new(Cursor::new(&mut bytes), spec).expect("Failed to open WAV writer");
        let frames = channels.first().map_or(0, Vec::len);
        for frame in 0..frames {
            for channel in channels {
                writer.write_sample(channel[frame]).expect("Failed to write sample");
            }
        }
        writer.finalize().expect("Failed to finalize WAV");
    }
    bytes
}

/// Render `frames` frames and return `(left, right)`.
pub fn render_stereo(context: &AudioContext, frames: usize) -> (Vec<f32>, Vec<f32>) {
    let mut block = context.render(frames).expect("Failed to render");
    let right = block.pop().expect("missing right channel");
    let left = block.pop().expect("missing left channel");
    (left, right)
}

/// Calculate RMS of a signal.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Calculate peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, |a, b| a.max(b))
}

/// Assert that a signal is approximately silent (all values near zero).
pub fn assert_silence(samples: &[f32], tolerance: f32) {
    let max = peak(samples);
    assert!(
        max <= tolerance,
        "Expected silence, but peak amplitude was {}",
        max
    );
}

/// Assert that a signal has content (not silent).
pub fn assert_has_audio(samples: &[f32], min_rms: f32) {
    let r = rms(samples);
    assert!(
        r >= min_rms,
        "Expected audio content with RMS >= {}, but RMS was {}",
        min_rms,
        r
    );
}

/// Poll `condition` until it holds or `max_wait_ms` passes.
pub fn wait_until(max_wait_ms: u64, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(max_wait_ms);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
