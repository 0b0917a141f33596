//! Builder for configuring and constructing a `HaloEngine`.

use crate::{HaloEngine, Result};
use halo_core::AudioContext;
use halo_dsp::{AmbisonicOrder, ChannelMap, HrirSource, RenderingMode};

/// Order and channel map are fixed for the life of the engine. Everything
/// else set here can be changed later on the engine itself.
///
/// Without [`context`](Self::context) the engine gets its own context: the
/// system default output with the `cpal` feature, otherwise an offline
/// 48 kHz stereo context pulled through [`AudioContext::render`].
///
/// # Example
///
/// ```
/// use halo::prelude::*;
///
/// let engine = HaloEngine::builder()
///     .order(AmbisonicOrder::First)
///     .channel_map(ChannelMap::fuma())
///     .rendering_mode(RenderingMode::Ambisonic)
///     .volume(0.5)
///     .context(AudioContext::offline(48000.0))
///     .build()?;
/// assert_eq!(engine.state(), EngineState::Uninitialized);
/// # Ok::<(), halo::Error>(())
/// ```
pub struct HaloEngineBuilder {
    order: AmbisonicOrder,
    channel_map: Option<ChannelMap>,
    rendering_mode: RenderingMode,
    volume: f32,
    hrirs: HrirSource,
    context: Option<AudioContext>,
}

impl Default for HaloEngineBuilder {
    fn default() -> Self {
        Self {
            order: AmbisonicOrder::First,
            channel_map: None,
            rendering_mode: RenderingMode::Ambisonic,
            volume: 1.0,
            hrirs: HrirSource::BuiltIn,
            context: None,
        }
    }
}

impl HaloEngineBuilder {
    pub fn order(mut self, order: AmbisonicOrder) -> Self {
        self.order = order;
        self
    }

    /// Physical-to-ACN channel order. Only first order accepts a
    /// non-identity map.
    pub fn channel_map(mut self, map: ChannelMap) -> Self {
        self.channel_map = Some(map);
        self
    }

    pub fn rendering_mode(mut self, mode: RenderingMode) -> Self {
        self.rendering_mode = mode;
        self
    }

    /// Normalized starting volume, applied on initialize.
    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn hrirs(mut self, hrirs: HrirSource) -> Self {
        self.hrirs = hrirs;
        self
    }

    /// Render into an existing context instead of creating one.
    pub fn context(mut self, context: AudioContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Validate the configuration and create the engine (uninitialized).
    ///
    /// Nothing touches the output device until
    /// [`HaloEngine::initialize`].
    pub fn build(self) -> Result<HaloEngine> {
        let channels = self.order.channel_count();
        if let Some(map) = &self.channel_map {
            map.check_len(channels)?;
            if self.order != AmbisonicOrder::First && *map != ChannelMap::identity(channels) {
                return Err(halo_dsp::Error::InvalidChannelMap(format!(
                    "order {} input must be in ACN order, got {map}",
                    self.order
                ))
                .into());
            }
        }

        let context = self.context.unwrap_or_else(default_context);
        tracing::debug!(
            "Building order-{} engine (mode: {}, volume: {})",
            self.order,
            self.rendering_mode,
            self.volume
        );

        Ok(HaloEngine::from_parts(
            context,
            self.order,
            self.channel_map,
            self.hrirs,
            self.rendering_mode,
            self.volume,
        ))
    }
}

#[cfg(feature = "cpal")]
fn default_context() -> AudioContext {
    AudioContext::default_output()
}

#[cfg(not(feature = "cpal"))]
fn default_context() -> AudioContext {
    AudioContext::offline(48000.0)
}
