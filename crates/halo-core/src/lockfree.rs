//! Atomics shared between the control thread and the render thread.
//!
//! Both types sit on their own cache line so a flag polled by the render
//! thread never shares a line with one the control thread is writing.

use atomic_float::AtomicF32;
use std::sync::atomic::{AtomicBool, Ordering};

/// Gain level or other scalar published by one thread and read by another.
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct AtomicFloat(AtomicF32);

impl AtomicFloat {
    pub fn new(value: f32) -> Self {
        Self(AtomicF32::new(value))
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.0.store(value, Ordering::Release);
    }
}

/// Boolean signal: run/stop switches, abort requests, one-shot end markers.
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct AtomicFlag(AtomicBool);

impl AtomicFlag {
    pub fn new(value: bool) -> Self {
        Self(AtomicBool::new(value))
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.0.store(value, Ordering::Release);
    }

    /// Set the flag. True only for the call that changed it.
    #[inline]
    pub fn raise(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}
