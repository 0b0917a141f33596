//! HRIR sets: embedded defaults and chunked loading.

use crate::order::AmbisonicOrder;
use crate::{Error, Result};
use halo_core::ContentBuffer;
use halo_loader::{decode_all, AbortSignal, ChunkSource, LoadHandle};

const FOA_HRIRS: [&[u8]; 2] = [
    include_bytes!("../assets/hrir/foa-0.wav"),
    include_bytes!("../assets/hrir/foa-1.wav"),
];

const SOA_HRIRS: [&[u8]; 5] = [
    include_bytes!("../assets/hrir/soa-0.wav"),
    include_bytes!("../assets/hrir/soa-1.wav"),
    include_bytes!("../assets/hrir/soa-2.wav"),
    include_bytes!("../assets/hrir/soa-3.wav"),
    include_bytes!("../assets/hrir/soa-4.wav"),
];

const TOA_HRIRS: [&[u8]; 8] = [
    include_bytes!("../assets/hrir/toa-0.wav"),
    include_bytes!("../assets/hrir/toa-1.wav"),
    include_bytes!("../assets/hrir/toa-2.wav"),
    include_bytes!("../assets/hrir/toa-3.wav"),
    include_bytes!("../assets/hrir/toa-4.wav"),
    include_bytes!("../assets/hrir/toa-5.wav"),
    include_bytes!("../assets/hrir/toa-6.wav"),
    include_bytes!("../assets/hrir/toa-7.wav"),
];

/// Stereo-packed HRIRs: pair `i` filters ACN `2i` (left channel) and
/// `2i + 1` (right channel).
#[derive(Debug, Clone, PartialEq)]
pub struct HrirSet {
    pairs: Vec<ContentBuffer>,
}

impl HrirSet {
    /// Every pair must be mono or stereo and share one sample rate.
    pub fn new(pairs: Vec<ContentBuffer>) -> Result<Self> {
        let first = pairs
            .first()
            .ok_or_else(|| Error::InvalidHrirSet("no HRIR pairs".into()))?;
        let sample_rate = first.sample_rate();

        for (index, pair) in pairs.iter().enumerate() {
            if pair.channel_count() > 2 {
                return Err(Error::InvalidHrirSet(format!(
                    "pair {index} has {} channels",
                    pair.channel_count()
                )));
            }
            if pair.sample_rate() != sample_rate {
                return Err(Error::InvalidHrirSet(format!(
                    "pair {index} is {} Hz, pair 0 is {sample_rate} Hz",
                    pair.sample_rate()
                )));
            }
        }
        Ok(Self { pairs })
    }

    /// The embedded default set for `order` (48 kHz).
    pub fn builtin(order: AmbisonicOrder) -> Result<Self> {
        let chunks: &[&[u8]] = match order {
            AmbisonicOrder::First => &FOA_HRIRS,
            AmbisonicOrder::Second => &SOA_HRIRS,
            AmbisonicOrder::Third => &TOA_HRIRS,
        };
        Self::new(decode_all(chunks)?)
    }

    /// Split a channel-merged buffer back into `pairs` stereo pairs.
    pub fn from_merged(buffer: ContentBuffer, pairs: usize) -> Result<Self> {
        if buffer.channel_count() != 2 * pairs {
            return Err(Error::InvalidHrirSet(format!(
                "expected {} channels for {pairs} pairs, got {}",
                2 * pairs,
                buffer.channel_count()
            )));
        }
        let sample_rate = buffer.sample_rate();
        let mut channels = buffer.into_channels().into_iter();
        let mut split = Vec::with_capacity(pairs);
        while let (Some(left), Some(right)) = (channels.next(), channels.next()) {
            split.push(ContentBuffer::new(vec![left, right], sample_rate)?);
        }
        Self::new(split)
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn pairs(&self) -> &[ContentBuffer] {
        &self.pairs
    }

    /// Longest response, in frames.
    pub fn frames(&self) -> usize {
        self.pairs.iter().map(ContentBuffer::frames).max().unwrap_or(0)
    }

    pub fn sample_rate(&self) -> f64 {
        self.pairs[0].sample_rate()
    }
}

/// Where a renderer gets its HRIRs.
#[derive(Debug, Clone, Default)]
pub enum HrirSource {
    #[default]
    BuiltIn,
    /// One stereo WAV per pair, in pair order.
    Chunks(Vec<ChunkSource>),
}

impl HrirSource {
    /// Start resolving the set for `order`.
    ///
    /// Built-in sets decode immediately. Chunk sources load in the background
    /// and must supply exactly one chunk per stereo pair.
    pub fn begin(self, order: AmbisonicOrder) -> Result<PendingHrirs> {
        let pairs = order.stereo_pair_count();
        match self {
            HrirSource::BuiltIn => Ok(PendingHrirs {
                pairs,
                state: Pending::Ready(HrirSet::builtin(order)?),
            }),
            HrirSource::Chunks(sources) => {
                if sources.len() != pairs {
                    return Err(Error::InvalidHrirSet(format!(
                        "order {order} needs {pairs} HRIR chunks, got {}",
                        sources.len()
                    )));
                }
                Ok(PendingHrirs {
                    pairs,
                    state: Pending::Loading(LoadHandle::start(sources)?),
                })
            }
        }
    }
}

enum Pending {
    Ready(HrirSet),
    Loading(LoadHandle),
}

/// An HRIR set that may still be loading.
pub struct PendingHrirs {
    pairs: usize,
    state: Pending,
}

impl PendingHrirs {
    pub fn is_done(&self) -> bool {
        match &self.state {
            Pending::Ready(_) => true,
            Pending::Loading(handle) => handle.is_done(),
        }
    }

    /// Signal that cancels the load. `None` once nothing is in flight.
    pub fn abort_handle(&self) -> Option<AbortSignal> {
        match &self.state {
            Pending::Ready(_) => None,
            Pending::Loading(handle) => Some(handle.abort_handle()),
        }
    }

    pub fn abort(&self) {
        if let Pending::Loading(handle) = &self.state {
            handle.abort();
        }
    }

    /// Block until the set is available.
    pub fn wait(self) -> Result<HrirSet> {
        match self.state {
            Pending::Ready(set) => Ok(set),
            Pending::Loading(handle) => HrirSet::from_merged(handle.wait()?, self.pairs),
        }
    }
}
