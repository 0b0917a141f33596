//! HaloEngine: lifecycle, content modes and buffer-mode transport.

use crate::builder::HaloEngineBuilder;
use crate::transport::PlaybackClock;
use crate::{Error, Result};
use crossbeam_channel::{unbounded, Receiver};
use halo_core::tap::{audio_tap, TapPublisher};
use halo_core::{
    AudioContext, AudioGraph, BufferSourceNode, ContentBuffer, GainHandle, GainNode, NodeId,
    SourceEvent,
};
use halo_dsp::orientation::{engine_quaternion_from_azimuth_elevation, to_engine_quaternion};
use halo_dsp::{
    AmbisonicOrder, AmbisonicRenderer, ChannelMap, EngineQuaternion, HrirSource, RendererConfig,
    RenderingMode, RotationQuaternion,
};
use halo_loader::{AbortSignal, ChunkSource, LoadHandle, LoadProgress};
use std::sync::Arc;
use std::time::Duration;

/// Length of every gain change, in seconds.
pub const GAIN_RAMP_SECONDS: f32 = 0.2;

/// Gain floor for volume 0, in dB.
pub const MIN_DB: f32 = -80.0;

/// Gain ceiling for volume 1, in dB.
pub const MAX_DB: f32 = -10.0;

/// Sample rate the built-in HRIRs were measured at.
pub const REFERENCE_HRIR_SAMPLE_RATE: f64 = 48000.0;

/// Map a normalized volume to decibels along a perceptual (power 0.2) curve.
///
/// ```
/// use halo::{volume_to_gain, MAX_DB, MIN_DB};
///
/// assert_eq!(volume_to_gain(0.0), MIN_DB);
/// assert_eq!(volume_to_gain(1.0), MAX_DB);
/// assert!(volume_to_gain(0.5) > (MIN_DB + MAX_DB) / 2.0);
/// ```
pub fn volume_to_gain(volume: f32) -> f32 {
    if volume.is_nan() || volume <= 0.0 {
        return MIN_DB;
    }
    let shaped = volume.powf(0.2);
    (MIN_DB + (MAX_DB - MIN_DB) * shaped).clamp(MIN_DB, MAX_DB)
}

pub fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

pub fn linear_to_db(linear: f32) -> f32 {
    20.0 * linear.log10()
}

/// Output attenuation that keeps unnormalized HRIR convolution at the same
/// level on devices faster than the HRIR rate. Never boosts.
pub fn sample_rate_compensation(device_sample_rate: f64) -> f32 {
    if device_sample_rate.is_finite() && device_sample_rate > 0.0 {
        (REFERENCE_HRIR_SAMPLE_RATE / device_sample_rate).min(1.0) as f32
    } else {
        1.0
    }
}

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initialized,
    BufferLoaded,
    StreamBound,
    Disposed,
}

/// Notifications drained by [`HaloEngine::poll_events`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Buffer playback reached its natural end.
    Ended,
}

type EndedCallback = Box<dyn FnMut() + Send>;

/// Nodes the engine owns once initialized.
///
/// ```text
/// source → input gain → renderer → sample-rate compensation → output → destination
/// ```
struct Pipeline {
    input_gain: NodeId,
    input_level: GainHandle,
    renderer: AmbisonicRenderer,
    compensation: NodeId,
    output: NodeId,
}

impl Pipeline {
    fn build(graph: &mut AudioGraph, config: RendererConfig, initial_gain: f32) -> Result<Self> {
        let channels = config.order.channel_count();
        let sample_rate = graph.sample_rate();
        let compensation_gain = sample_rate_compensation(sample_rate);

        let renderer = AmbisonicRenderer::new(graph, config)?;
        let input_node = GainNode::new(channels, initial_gain);
        let input_level = input_node.handle();
        let input_gain = graph.add(input_node);
        let compensation = graph.add(GainNode::new(2, compensation_gain));
        let output = graph.add(GainNode::new(2, 1.0));

        graph.connect_all(input_gain, renderer.input())?;
        graph.connect_all(renderer.output(), compensation)?;
        graph.connect_all(compensation, output)?;
        graph.connect_all(output, graph.destination())?;

        if compensation_gain < 1.0 {
            tracing::debug!(
                "Sample-rate compensation {:.3} at {} Hz",
                compensation_gain,
                sample_rate
            );
        }

        Ok(Self {
            input_gain,
            input_level,
            renderer,
            compensation,
            output,
        })
    }

    fn teardown(self, graph: &mut AudioGraph) {
        for node in [self.input_gain, self.compensation, self.output] {
            if graph.remove(node).is_err() {
                tracing::debug!("Engine node {:?} already removed", node);
            }
        }
        self.renderer.dispose(graph);
    }

    /// Resolve and prepare HRIRs off the graph lock, then install them.
    fn load_hrirs(&mut self, context: &AudioContext) -> Result<()> {
        let hrirs = self.renderer.begin_initialize()?.wait()?;
        let kernels = self.renderer.prepare_hrirs(&hrirs)?;
        context.graph(|g| self.renderer.complete_initialize(g, kernels))??;
        Ok(())
    }
}

/// Buffer-mode content and its playback.
struct BufferPlayback {
    buffer: Arc<ContentBuffer>,
    clock: PlaybackClock,
    source: Option<NodeId>,
    events: Option<Receiver<SourceEvent>>,
}

impl BufferPlayback {
    fn new(buffer: Arc<ContentBuffer>) -> Self {
        let clock = PlaybackClock::new(buffer.duration_seconds());
        Self {
            buffer,
            clock,
            source: None,
            events: None,
        }
    }

    /// Remove the playing source. Its pending events go with it.
    fn clear_source(&mut self, graph: &mut AudioGraph) {
        if let Some(source) = self.source.take() {
            if graph.remove(source).is_err() {
                tracing::debug!("Buffer source {:?} already removed", source);
            }
        }
        self.events = None;
    }

    fn start(
        &mut self,
        graph: &mut AudioGraph,
        input: NodeId,
        tap: Option<NodeId>,
        from_fraction: f64,
        looping: bool,
    ) -> Result<()> {
        self.clear_source(graph);

        let position = from_fraction * self.clock.duration();
        let (events_tx, events_rx) = unbounded();
        let mut node = BufferSourceNode::new(Arc::clone(&self.buffer)).with_events(events_tx);
        node.set_loop(looping);
        node.start(position);

        let source = graph.add(node);
        graph.connect_all(source, input)?;
        if let Some(tap) = tap {
            graph.connect_all(source, tap)?;
        }

        self.source = Some(source);
        self.events = Some(events_rx);
        self.clock.set_looping(looping);
        self.clock.start(position);
        Ok(())
    }
}

enum Content {
    Empty,
    Buffer(BufferPlayback),
    /// External node feeding the renderer.
    Stream(NodeId),
}

struct ActiveTap {
    node: NodeId,
    publisher: TapPublisher,
}

/// Split borrows for buffer-mode operations.
struct BufferParts<'a> {
    context: &'a AudioContext,
    pipeline: &'a Pipeline,
    playback: &'a mut BufferPlayback,
    tap: Option<NodeId>,
}

fn contract(message: impl Into<String>) -> Error {
    Error::ContractViolation(message.into())
}

/// Ambisonic playback engine.
///
/// Owns one renderer in an [`AudioContext`]'s graph and feeds it either from
/// decoded content (buffer mode) or from an external node (stream mode).
///
/// # Lifecycle
///
/// `Uninitialized → Initialized → BufferLoaded | StreamBound → Disposed`
///
/// - [`initialize`](Self::initialize) must come first. Gated operations called
///   earlier fail with [`Error::ContractViolation`].
/// - [`load`](Self::load) / [`load_from_buffer`](Self::load_from_buffer) enter
///   buffer mode, [`bind_source`](Self::bind_source) enters stream mode. The
///   two are exclusive for the life of the engine.
/// - After [`dispose`](Self::dispose) every operation fails except `dispose`
///   itself, [`stop_publishing_audio_updates`](Self::stop_publishing_audio_updates)
///   and the plain getters.
///
/// Rotation before `initialize` is a silent no-op, so head tracking may start
/// early.
///
/// # Example
///
/// ```no_run
/// use halo::prelude::*;
///
/// let mut engine = HaloEngine::builder()
///     .order(AmbisonicOrder::Third)
///     .volume(0.8)
///     .build()?;
/// engine.initialize()?;
/// engine.load(
///     vec![
///         ChunkSource::from(std::path::PathBuf::from("scene-0.wav")),
///         ChunkSource::from(std::path::PathBuf::from("scene-1.wav")),
///     ],
///     |p| println!("chunk {}: {}/{}", p.chunk_index, p.bytes_loaded, p.bytes_total),
/// )?;
/// engine.play(0.0)?;
/// engine.rotate_with_azimuth_elevation(30.0, 0.0)?;
/// # Ok::<(), halo::Error>(())
/// ```
pub struct HaloEngine {
    context: AudioContext,
    order: AmbisonicOrder,
    channel_map: Option<ChannelMap>,
    hrirs: HrirSource,
    rendering_mode: RenderingMode,
    volume: f32,
    looping: bool,
    pipeline: Option<Pipeline>,
    content: Content,
    tap: Option<ActiveTap>,
    pending_load: Option<AbortSignal>,
    ended_callbacks: Vec<EndedCallback>,
    disposed: bool,
}

impl HaloEngine {
    pub fn builder() -> HaloEngineBuilder {
        HaloEngineBuilder::default()
    }

    pub(crate) fn from_parts(
        context: AudioContext,
        order: AmbisonicOrder,
        channel_map: Option<ChannelMap>,
        hrirs: HrirSource,
        rendering_mode: RenderingMode,
        volume: f32,
    ) -> Self {
        Self {
            context,
            order,
            channel_map,
            hrirs,
            rendering_mode,
            volume,
            looping: false,
            pipeline: None,
            content: Content::Empty,
            tap: None,
            pending_load: None,
            ended_callbacks: Vec::new(),
            disposed: false,
        }
    }

    // ---------------- Guards ----------------

    fn ensure_not_disposed(&self, operation: &str) -> Result<()> {
        if self.disposed {
            return Err(contract(format!(
                "{operation}() called on a disposed engine; create a new one"
            )));
        }
        Ok(())
    }

    fn ensure_initialized(&self, operation: &str) -> Result<&Pipeline> {
        self.ensure_not_disposed(operation)?;
        self.pipeline
            .as_ref()
            .ok_or_else(|| contract(format!("{operation}() called before initialize()")))
    }

    fn ensure_loadable(&self, operation: &str) -> Result<()> {
        self.ensure_initialized(operation)?;
        if matches!(self.content, Content::Stream(_)) {
            return Err(contract(format!(
                "{operation}() is not valid after bind_source()"
            )));
        }
        Ok(())
    }

    fn buffer_parts(&mut self, operation: &str) -> Result<BufferParts<'_>> {
        self.ensure_initialized(operation)?;
        let tap = self.tap.as_ref().map(|t| t.node);
        match (&self.pipeline, &mut self.content) {
            (Some(pipeline), Content::Buffer(playback)) => Ok(BufferParts {
                context: &self.context,
                pipeline,
                playback,
                tap,
            }),
            (_, Content::Stream(_)) => Err(contract(format!(
                "{operation}() is only valid in buffer mode (before bind_source())"
            ))),
            _ => Err(contract(format!(
                "{operation}() needs content; call load() or load_from_buffer() first"
            ))),
        }
    }

    /// Buffer-mode queries: `None` while nothing is loaded.
    fn buffer_query(&self, operation: &str) -> Result<Option<&BufferPlayback>> {
        self.ensure_not_disposed(operation)?;
        match &self.content {
            Content::Buffer(playback) => Ok(Some(playback)),
            Content::Stream(_) => Err(contract(format!(
                "{operation}() is only valid in buffer mode (before bind_source())"
            ))),
            Content::Empty => Ok(None),
        }
    }

    // ---------------- Lifecycle ----------------

    /// Build the renderer, load its HRIRs and wire it to the destination.
    ///
    /// Starts (or resumes) the audio context. Calling again once initialized
    /// does nothing. If HRIR loading fails the engine stays uninitialized and
    /// may be initialized again.
    pub fn initialize(&mut self) -> Result<()> {
        self.ensure_not_disposed("initialize")?;
        if self.pipeline.is_some() {
            return Ok(());
        }

        self.context.ensure_running()?;

        let mut config = RendererConfig::new(self.order)
            .rendering_mode(self.rendering_mode)
            .hrirs(self.hrirs.clone());
        if let Some(map) = &self.channel_map {
            config = config.channel_map(map.clone());
        }
        let initial_gain = db_to_linear(volume_to_gain(self.volume));
        let mut pipeline = self
            .context
            .graph(|g| Pipeline::build(g, config, initial_gain))??;

        if let Err(e) = pipeline.load_hrirs(&self.context) {
            tracing::warn!("Engine initialization failed: {}", e);
            if let Err(teardown) = self.context.graph(|g| pipeline.teardown(g)) {
                tracing::debug!("Could not tear down partial pipeline: {}", teardown);
            }
            return Err(e);
        }

        self.pipeline = Some(pipeline);
        tracing::info!(
            "Engine initialized: order {}, {} channels, mode {}",
            self.order,
            self.order.channel_count(),
            self.rendering_mode
        );
        Ok(())
    }

    /// Tear everything down. Safe to call any number of times.
    ///
    /// Aborts a pending load, stops the visualization tap, removes every node
    /// the engine added and unhooks a bound stream (the stream node itself
    /// belongs to the caller and stays in the graph).
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        self.abort_load();
        self.pending_load = None;
        self.stop_publishing_audio_updates();

        let content = std::mem::replace(&mut self.content, Content::Empty);
        let pipeline = self.pipeline.take();
        if pipeline.is_some() || !matches!(content, Content::Empty) {
            let result = self.context.graph(|g| {
                match content {
                    Content::Buffer(mut playback) => playback.clear_source(g),
                    Content::Stream(source) => {
                        if let Some(pipeline) = &pipeline {
                            g.disconnect_to(source, pipeline.input_gain);
                        }
                    }
                    Content::Empty => {}
                }
                if let Some(pipeline) = pipeline {
                    pipeline.teardown(g);
                }
            });
            if let Err(e) = result {
                tracing::debug!("Audio context unavailable during dispose: {}", e);
            }
        }

        self.ended_callbacks.clear();
        tracing::info!("Engine disposed");
    }

    pub fn state(&self) -> EngineState {
        if self.disposed {
            return EngineState::Disposed;
        }
        if self.pipeline.is_none() {
            return EngineState::Uninitialized;
        }
        match self.content {
            Content::Empty => EngineState::Initialized,
            Content::Buffer(_) => EngineState::BufferLoaded,
            Content::Stream(_) => EngineState::StreamBound,
        }
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    pub fn order(&self) -> AmbisonicOrder {
        self.order
    }

    /// Stereo node carrying the rendered signal. Connected to the destination
    /// on initialize; callers may reroute it.
    pub fn output(&self) -> Result<NodeId> {
        Ok(self.ensure_initialized("output")?.output)
    }

    // ---------------- Content ----------------

    /// Load `sources` (one chunk per channel range), blocking until decoded.
    ///
    /// Progress for each chunk is forwarded to `on_progress`. On failure the
    /// engine keeps whatever it had before and the error is returned.
    pub fn load(
        &mut self,
        sources: Vec<ChunkSource>,
        on_progress: impl FnMut(LoadProgress),
    ) -> Result<()> {
        let handle = self.begin_load(sources)?;
        self.finish_load(handle, on_progress)
    }

    /// Start loading in the background. Any load already in flight is aborted.
    pub fn begin_load(&mut self, sources: Vec<ChunkSource>) -> Result<LoadHandle> {
        self.ensure_loadable("load")?;
        self.abort_load();

        let handle = LoadHandle::start(sources)?;
        self.pending_load = Some(handle.abort_handle());
        Ok(handle)
    }

    /// Wait for `handle` and install the merged content.
    pub fn finish_load(
        &mut self,
        handle: LoadHandle,
        on_progress: impl FnMut(LoadProgress),
    ) -> Result<()> {
        let result = handle.wait_with_progress(on_progress);
        self.pending_load = None;
        let buffer = result.inspect_err(|e| tracing::warn!("Content load failed: {}", e))?;

        self.ensure_loadable("load")?;
        self.install_buffer(Arc::new(buffer))
    }

    /// Abort the load in flight, if any. Idempotent.
    pub fn abort_load(&self) {
        if let Some(signal) = &self.pending_load {
            if !signal.is_aborted() {
                tracing::debug!("Aborting content load");
            }
            signal.abort();
        }
    }

    /// Signal that aborts the load in flight from another thread.
    pub fn load_abort_handle(&self) -> Option<AbortSignal> {
        self.pending_load.clone()
    }

    /// Install already-decoded content.
    pub fn load_from_buffer(&mut self, buffer: impl Into<Arc<ContentBuffer>>) -> Result<()> {
        self.ensure_loadable("load_from_buffer")?;
        self.install_buffer(buffer.into())
    }

    fn install_buffer(&mut self, buffer: Arc<ContentBuffer>) -> Result<()> {
        let expected = self.order.channel_count();
        if buffer.channel_count() != expected {
            return Err(Error::ContentMismatch(format!(
                "expected {expected} channels for order {}, got {}",
                self.order,
                buffer.channel_count()
            )));
        }
        if buffer.frames() == 0 {
            return Err(Error::ContentMismatch("content has no frames".into()));
        }

        let device_rate = self.context.sample_rate()?;
        if buffer.sample_rate() != device_rate {
            tracing::warn!(
                "Content is {} Hz but output runs at {} Hz; playing without resampling",
                buffer.sample_rate(),
                device_rate
            );
        }

        // The first rotation after HRIRs load must happen before playback
        // or the renderer starts with a glitched orientation. Nothing below
        // may fail once the old content is gone.
        self.rotate_with_azimuth_elevation(0.0, 0.0)?;

        if let Content::Buffer(previous) = &mut self.content {
            self.context.graph(|g| previous.clear_source(g))?;
        }
        let duration = buffer.duration_seconds();
        self.content = Content::Buffer(BufferPlayback::new(buffer));

        tracing::info!("Content loaded: {} channels, {:.3} s", expected, duration);
        Ok(())
    }

    /// Feed the renderer from `source`, a node the caller added to the
    /// context's graph. Replaces (and unhooks) a previously bound source.
    pub fn bind_source(&mut self, source: NodeId) -> Result<()> {
        let input = self.ensure_initialized("bind_source")?.input_gain;
        if matches!(self.content, Content::Buffer(_)) {
            return Err(contract(
                "bind_source() is not valid once content has been loaded",
            ));
        }

        let previous = match self.content {
            Content::Stream(previous) => Some(previous),
            _ => None,
        };
        let tap = self.tap.as_ref().map(|t| t.node);

        self.context.graph(|g| -> Result<()> {
            if let Some(previous) = previous {
                g.disconnect_to(previous, input);
                if let Some(tap) = tap {
                    g.disconnect_to(previous, tap);
                }
            }
            g.connect_all(source, input)?;
            if let Some(tap) = tap {
                g.connect_all(source, tap)?;
            }
            Ok(())
        })??;

        self.content = Content::Stream(source);
        tracing::debug!("Bound stream source {:?}", source);
        Ok(())
    }

    // ---------------- Transport (buffer mode) ----------------

    /// Start playback at `from_fraction` of the content (0 = start, 1 = end).
    /// Any playing source is torn down first.
    pub fn play(&mut self, from_fraction: f64) -> Result<()> {
        let looping = self.looping;
        let parts = self.buffer_parts("play")?;
        if !from_fraction.is_finite() {
            return Err(contract(format!(
                "play() needs a finite position, got {from_fraction}"
            )));
        }
        let from = from_fraction.clamp(0.0, 1.0);
        let input = parts.pipeline.input_gain;
        parts
            .context
            .graph(|g| parts.playback.start(g, input, parts.tap, from, looping))??;
        tracing::debug!("Playing from {:.3}", from);
        Ok(())
    }

    /// Play from the last known position.
    pub fn resume(&mut self) -> Result<()> {
        let fraction = self.buffer_parts("resume")?.playback.clock.fraction();
        self.play(fraction)
    }

    /// Pause playback, keeping the position.
    pub fn pause(&mut self) -> Result<()> {
        let parts = self.buffer_parts("pause")?;
        parts.context.graph(|g| parts.playback.clear_source(g))?;
        parts.playback.clock.pause();
        Ok(())
    }

    /// Seek to `time_seconds` without starting playback.
    pub fn prepare(&mut self, time_seconds: f64) -> Result<()> {
        let parts = self.buffer_parts("prepare")?;
        if !time_seconds.is_finite() || time_seconds < 0.0 {
            return Err(contract(format!(
                "prepare() needs a non-negative time, got {time_seconds}"
            )));
        }
        let position = time_seconds.min(parts.playback.clock.duration());
        parts.context.graph(|g| parts.playback.clear_source(g))?;
        parts.playback.clock.seek(position);
        Ok(())
    }

    /// Stop playback and rewind to the start.
    pub fn stop(&mut self) -> Result<()> {
        let parts = self.buffer_parts("stop")?;
        parts.context.graph(|g| parts.playback.clear_source(g))?;
        parts.playback.clock.reset();
        Ok(())
    }

    pub fn is_playing(&self) -> bool {
        match &self.content {
            Content::Buffer(playback) => playback.source.is_some() && playback.clock.is_running(),
            _ => false,
        }
    }

    /// Seconds since the start of the content, from the wall clock.
    pub fn elapsed_time_in_seconds(&self) -> Result<f64> {
        Ok(self
            .buffer_query("elapsed_time_in_seconds")?
            .map_or(0.0, |p| p.clock.position()))
    }

    pub fn duration_in_seconds(&self) -> Result<f64> {
        Ok(self
            .buffer_query("duration_in_seconds")?
            .map_or(0.0, |p| p.clock.duration()))
    }

    /// Sample rate of the loaded content, 0 while nothing is loaded.
    pub fn sample_rate(&self) -> Result<f64> {
        Ok(self
            .buffer_query("sample_rate")?
            .map_or(0.0, |p| p.buffer.sample_rate()))
    }

    pub fn total_samples(&self) -> Result<usize> {
        Ok(self
            .buffer_query("total_samples")?
            .map_or(0, |p| p.buffer.frames()))
    }

    /// Loop the next playback started with [`play`](Self::play).
    pub fn set_loop(&mut self, looping: bool) -> Result<()> {
        self.ensure_not_disposed("set_loop")?;
        self.looping = looping;
        Ok(())
    }

    pub fn is_loop(&self) -> bool {
        self.looping
    }

    // ---------------- Level ----------------

    /// Ramp the input gain to `db` over [`GAIN_RAMP_SECONDS`].
    /// Non-finite values are logged and ignored.
    /// Takes effect at the input gain's next block without touching the graph.
    pub fn set_gain_db(&mut self, db: f32) -> Result<()> {
        let pipeline = self.ensure_initialized("set_gain_db")?;
        if !db.is_finite() {
            tracing::warn!("Ignoring invalid gain {} dB", db);
            return Ok(());
        }
        pipeline
            .input_level
            .ramp_to(db_to_linear(db), GAIN_RAMP_SECONDS);
        Ok(())
    }

    /// Gain the input is ramping toward, in dB.
    pub fn gain_db(&self) -> Result<f32> {
        let pipeline = self.ensure_initialized("gain_db")?;
        Ok(linear_to_db(pipeline.input_level.target()))
    }

    /// Set a normalized volume in `0.0..=1.0`; see [`volume_to_gain`].
    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.ensure_initialized("set_volume")?;
        self.volume = volume;
        self.set_gain_db(volume_to_gain(volume))
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    // ---------------- Renderer control ----------------

    /// Select how the renderer produces its stereo output. Before
    /// initialization the mode is stored and applied on initialize.
    pub fn set_rendering_mode(&mut self, mode: RenderingMode) -> Result<()> {
        self.ensure_not_disposed("set_rendering_mode")?;
        self.rendering_mode = mode;
        match &mut self.pipeline {
            Some(pipeline) => {
                self.context
                    .graph(|g| pipeline.renderer.set_rendering_mode(g, mode))??;
            }
            None => tracing::debug!("Renderer not built yet; storing rendering mode {}", mode),
        }
        Ok(())
    }

    pub fn rendering_mode(&self) -> RenderingMode {
        self.rendering_mode
    }

    /// Remap physical input channels onto ACN (first order only).
    pub fn set_channel_map(&mut self, map: ChannelMap) -> Result<()> {
        self.ensure_not_disposed("set_channel_map")?;
        map.check_len(self.order.channel_count())?;
        if let Some(pipeline) = &mut self.pipeline {
            let remapped = map.clone();
            self.context
                .graph(|g| pipeline.renderer.set_channel_map(g, remapped))??;
        }
        self.channel_map = Some(map);
        Ok(())
    }

    pub fn channel_map(&self) -> ChannelMap {
        match (&self.pipeline, &self.channel_map) {
            (Some(pipeline), _) => pipeline.renderer.channel_map(),
            (None, Some(map)) => map.clone(),
            (None, None) => ChannelMap::identity(self.order.channel_count()),
        }
    }

    // ---------------- Orientation ----------------

    /// Rotate the sound field to `orientation`. A no-op before initialize.
    ///
    /// Never takes the graph lock, so it is safe to call at head-tracker rate.
    pub fn rotate_with_quaternion(&mut self, orientation: EngineQuaternion) -> Result<()> {
        self.ensure_not_disposed("rotate_with_quaternion")?;
        let Some(pipeline) = &mut self.pipeline else {
            return Ok(());
        };
        pipeline
            .renderer
            .set_rotation_matrix3(&orientation.rotation_matrix3())?;
        Ok(())
    }

    /// Rotate by azimuth (about +Z, up) then elevation (about +Y, left), in
    /// degrees and AmbiX space. `(0, 0)` is the canonical initial orientation.
    pub fn rotate_with_azimuth_elevation(&mut self, azimuth: f32, elevation: f32) -> Result<()> {
        self.rotate_with_quaternion(engine_quaternion_from_azimuth_elevation(azimuth, elevation))
    }

    /// Head-tracker entry point.
    pub fn notify(&mut self, rotation: RotationQuaternion) -> Result<()> {
        self.rotate_with_quaternion(to_engine_quaternion(rotation))
    }

    // ---------------- Events ----------------

    /// Register a callback run from [`poll_events`](Self::poll_events) each
    /// time playback ends naturally. Stopping or seeking never triggers it.
    pub fn on_ended(&mut self, callback: impl FnMut() + Send + 'static) -> Result<()> {
        self.ensure_not_disposed("on_ended")?;
        self.ended_callbacks.push(Box::new(callback));
        Ok(())
    }

    /// Drain playback notifications and run the ended callbacks.
    pub fn poll_events(&mut self) -> Result<Vec<EngineEvent>> {
        self.ensure_not_disposed("poll_events")?;

        let mut events = Vec::new();
        if let Content::Buffer(playback) = &mut self.content {
            if let Some(receiver) = &playback.events {
                for event in receiver.try_iter() {
                    match event {
                        SourceEvent::Ended => events.push(EngineEvent::Ended),
                    }
                }
            }
            if !events.is_empty() {
                let end = playback.clock.duration();
                playback.clock.seek(end);
            }
        }

        for _ in &events {
            tracing::debug!("Playback ended; running {} callback(s)", self.ended_callbacks.len());
            for callback in &mut self.ended_callbacks {
                callback();
            }
        }
        Ok(events)
    }

    // ---------------- Visualization ----------------

    /// Publish raw B-format blocks to `callback` at most every `interval`.
    ///
    /// Each message is 960 frames of 16 interleaved channels, scaled to N3D,
    /// with channels above the engine's order left at zero. The tap hangs
    /// off the current source and never alters what is rendered. Restarting
    /// replaces the previous tap.
    pub fn start_publishing_audio_updates<F>(&mut self, interval: Duration, callback: F) -> Result<()>
    where
        F: FnMut(&[f32]) + Send + 'static,
    {
        self.ensure_initialized("start_publishing_audio_updates")?;
        self.stop_publishing_audio_updates();

        let (node, publisher) = audio_tap(self.order.channel_count(), interval, Box::new(callback))?;
        let feed = match &self.content {
            Content::Buffer(playback) => playback.source,
            Content::Stream(source) => Some(*source),
            Content::Empty => None,
        };

        let tap = self.context.graph(|g| -> Result<NodeId> {
            let tap = g.add(node);
            if let Some(feed) = feed {
                g.connect_all(feed, tap)?;
            }
            Ok(tap)
        })??;

        self.tap = Some(ActiveTap { node: tap, publisher });
        tracing::info!("Audio updates started ({} ms interval)", interval.as_millis());
        Ok(())
    }

    /// Stop publishing. Sends one zeroed message so the consumer can reset.
    /// Idempotent.
    pub fn stop_publishing_audio_updates(&mut self) {
        let Some(mut tap) = self.tap.take() else {
            return;
        };
        let node = tap.node;
        if !matches!(self.context.graph(|g| g.remove(node).is_ok()), Ok(true)) {
            tracing::debug!("Tap node {:?} already gone", node);
        }
        tap.publisher.stop();
        tracing::info!("Audio updates stopped");
    }

    pub fn is_publishing_audio_updates(&self) -> bool {
        self.tap.is_some()
    }
}

impl Drop for HaloEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for HaloEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HaloEngine")
            .field("order", &self.order)
            .field("state", &self.state())
            .field("rendering_mode", &self.rendering_mode)
            .field("volume", &self.volume)
            .finish()
    }
}
