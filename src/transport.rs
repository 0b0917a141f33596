//! Wall-clock playback position for buffer mode.

use std::time::Instant;

/// Playback position derived from a start timestamp plus a start offset.
///
/// While running, the position is `offset + (now - started_at)`; nothing
/// accumulates between reads, so timer jitter never drifts it. Pausing
/// freezes the position at the value last observed.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    duration: f64,
    looping: bool,
    offset: f64,
    started_at: Option<Instant>,
}

impl PlaybackClock {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            looping: false,
            offset: 0.0,
            started_at: None,
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Start running from `position` seconds.
    pub fn start(&mut self, position: f64) {
        self.start_at(position, Instant::now());
    }

    pub(crate) fn start_at(&mut self, position: f64, now: Instant) {
        self.offset = position;
        self.started_at = Some(now);
    }

    /// Freeze at the current position.
    pub fn pause(&mut self) {
        self.pause_at(Instant::now());
    }

    pub(crate) fn pause_at(&mut self, now: Instant) {
        self.offset = self.position_at(now);
        self.started_at = None;
    }

    /// Move to `position` seconds without running.
    pub fn seek(&mut self, position: f64) {
        self.offset = position;
        self.started_at = None;
    }

    pub fn reset(&mut self) {
        self.seek(0.0);
    }

    /// Seconds into the content.
    pub fn position(&self) -> f64 {
        self.position_at(Instant::now())
    }

    pub(crate) fn position_at(&self, now: Instant) -> f64 {
        let Some(started_at) = self.started_at else {
            return self.offset;
        };
        let raw = self.offset + now.saturating_duration_since(started_at).as_secs_f64();
        if self.duration <= 0.0 {
            return 0.0;
        }
        if self.looping {
            raw.rem_euclid(self.duration)
        } else {
            raw.min(self.duration)
        }
    }

    /// Position as a fraction of the duration, in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.duration <= 0.0 {
            return 0.0;
        }
        (self.position() / self.duration).clamp(0.0, 1.0)
    }
}
