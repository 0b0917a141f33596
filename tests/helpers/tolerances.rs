//! Comparison tolerances for rendered audio.

/// Paths with no arithmetic beyond a gain or a zero-sum fold-down.
pub const FLOAT_EPSILON: f32 = 1e-6;

/// FFT convolution and rotation mixing.
pub const DSP_EPSILON: f32 = 1e-4;

/// Peak below which a block counts as silent (about -80 dB).
pub const SILENCE_THRESHOLD: f32 = 1e-4;

/// Slack for wall-clock elapsed-time reads, in seconds.
pub const CLOCK_EPSILON: f64 = 0.05;
