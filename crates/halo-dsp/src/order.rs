use crate::{Error, Result};
use std::fmt;

/// Spherical-harmonic truncation degree.
///
/// Only orders 1 to 3 are supported; anything else fails at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AmbisonicOrder {
    First = 1,
    Second = 2,
    Third = 3,
}

impl AmbisonicOrder {
    pub fn new(order: u32) -> Result<Self> {
        match order {
            1 => Ok(Self::First),
            2 => Ok(Self::Second),
            3 => Ok(Self::Third),
            other => Err(Error::InvalidOrder(other)),
        }
    }

    #[inline]
    pub fn value(self) -> usize {
        self as usize
    }

    /// (order + 1)² ACN channels.
    #[inline]
    pub fn channel_count(self) -> usize {
        let n = self.value() + 1;
        n * n
    }

    /// Stereo-packed convolution pairs, ceil(channels / 2).
    #[inline]
    pub fn stereo_pair_count(self) -> usize {
        self.channel_count().div_ceil(2)
    }
}

impl TryFrom<u32> for AmbisonicOrder {
    type Error = Error;

    fn try_from(order: u32) -> Result<Self> {
        Self::new(order)
    }
}

impl fmt::Display for AmbisonicOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Band (degree) and index (−l..=l) of an ACN channel.
#[inline]
pub fn acn_degree_index(acn: usize) -> (usize, i32) {
    let l = (acn as f64).sqrt() as usize;
    let m = acn as i32 - (l * l + l) as i32;
    (l, m)
}
