//! Ramped parameter values for click-free gain changes.
//!
//! # Example
//!
//! ```
//! use halo_core::SmoothedValue;
//!
//! // 200 ms exponential fade at 48 kHz
//! let mut gain = SmoothedValue::new(1.0, 0.2, 48000.0);
//! gain.set_target_exponential(0.01);
//!
//! # let mut buffer = [0.5f32; 512];
//! for sample in buffer.iter_mut() {
//!     *sample *= gain.next_sample();
//! }
//! assert!(gain.is_smoothing());
//! ```

/// Smallest magnitude an exponential ramp may start from or aim at.
const EXPONENTIAL_FLOOR: f32 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Ramp {
    Idle,
    /// Per-sample increment.
    Linear(f32),
    /// Per-sample multiplication factor.
    Exponential(f32),
}

/// Value that moves to a new target over a fixed number of samples.
///
/// Call [`next_sample`](Self::next_sample) once per frame on the render
/// thread. A ramp always lands exactly on its target.
#[derive(Debug, Clone)]
pub struct SmoothedValue {
    current: f32,
    target: f32,
    ramp: Ramp,
    remaining: u32,
    ramp_samples: u32,
}

impl SmoothedValue {
    pub fn new(initial: f32, ramp_seconds: f32, sample_rate: f32) -> Self {
        let mut value = Self::immediate(initial);
        value.set_smooth_time(ramp_seconds, sample_rate);
        value
    }

    /// Value with a one-sample ramp until [`set_smooth_time`](Self::set_smooth_time).
    pub fn immediate(initial: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            ramp: Ramp::Idle,
            remaining: 0,
            ramp_samples: 1,
        }
    }

    /// Length of ramps started after this call.
    pub fn set_smooth_time(&mut self, ramp_seconds: f32, sample_rate: f32) {
        self.ramp_samples = (ramp_seconds * sample_rate).max(1.0) as u32;
    }

    /// Ramp linearly to `target`.
    pub fn set_target(&mut self, target: f32) {
        if target == self.target {
            return;
        }
        self.begin(target, Ramp::Linear((target - self.current) / self.ramp_samples as f32));
    }

    /// Ramp geometrically to `target`.
    ///
    /// An exponential curve cannot reach or cross zero, so ramps from or to
    /// (near) zero, or across a sign change, run linearly instead.
    pub fn set_target_exponential(&mut self, target: f32) {
        if target == self.target {
            return;
        }
        let crosses_zero = self.current.signum() != target.signum()
            || self.current.abs() < EXPONENTIAL_FLOOR
            || target.abs() < EXPONENTIAL_FLOOR;
        if crosses_zero {
            self.set_target(target);
            return;
        }

        let ratio = f64::from(target / self.current);
        let factor = ratio.powf(1.0 / f64::from(self.ramp_samples)) as f32;
        self.begin(target, Ramp::Exponential(factor));
    }

    fn begin(&mut self, target: f32, ramp: Ramp) {
        self.target = target;
        self.ramp = ramp;
        self.remaining = self.ramp_samples;
    }

    /// Jump to `value`, cancelling any ramp.
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.ramp = Ramp::Idle;
        self.remaining = 0;
    }

    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        if self.remaining == 0 {
            return self.current;
        }
        self.remaining -= 1;
        self.current = match (self.remaining, self.ramp) {
            (0, _) | (_, Ramp::Idle) => {
                self.ramp = Ramp::Idle;
                self.remaining = 0;
                self.target
            }
            (_, Ramp::Linear(step)) => self.current + step,
            (_, Ramp::Exponential(factor)) => self.current * factor,
        };
        self.current
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn is_smoothing(&self) -> bool {
        self.remaining > 0
    }
}
