//! Ambisonic-to-binaural renderer.
//!
//! Signal path:
//!
//! ```text
//! input ─┬─ [router] ─ rotator ─ convolver ─ fold-down ─┬─ output
//!        └─ bypass (ACN 0/1 → L/R) ─────────────────────┘
//! ```
//!
//! The router exists only at first order. A renderer is NotReady until its
//! HRIRs are installed; until then rotation, remapping and mode changes are
//! logged and dropped (a mode change is remembered and applied on ready).
//!
//! Rotation writes straight to the running rotator. Mode changes and
//! remapping rewire the graph and play from the next commit.

use crate::convolver::{BinauralConvolver, ConvolverKernels};
use crate::hrir::{HrirSet, HrirSource, PendingHrirs};
use crate::order::AmbisonicOrder;
use crate::rotation::{rotation_from_camera_matrix, RotationMatrix3, RotationMatrix4};
use crate::rotator::Rotator;
use crate::router::{ChannelMap, Router};
use crate::{Error, Result};
use halo_core::{AudioGraph, GainNode, NodeId};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderingMode {
    /// Rotation and HRIR convolution.
    #[default]
    Ambisonic,
    /// ACN 0 and 1 straight to L and R, no processing.
    Bypass,
    /// Silence.
    Off,
}

impl RenderingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderingMode::Ambisonic => "ambisonic",
            RenderingMode::Bypass => "bypass",
            RenderingMode::Off => "off",
        }
    }
}

impl FromStr for RenderingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ambisonic" => Ok(RenderingMode::Ambisonic),
            "bypass" => Ok(RenderingMode::Bypass),
            "off" => Ok(RenderingMode::Off),
            other => Err(Error::InvalidRenderingMode(other.to_string())),
        }
    }
}

impl fmt::Display for RenderingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Construction parameters for an [`AmbisonicRenderer`].
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub order: AmbisonicOrder,
    /// First order only. `None` means ACN order.
    pub channel_map: Option<ChannelMap>,
    pub rendering_mode: RenderingMode,
    pub hrirs: HrirSource,
}

impl RendererConfig {
    pub fn new(order: AmbisonicOrder) -> Self {
        Self {
            order,
            channel_map: None,
            rendering_mode: RenderingMode::default(),
            hrirs: HrirSource::default(),
        }
    }

    pub fn channel_map(mut self, map: ChannelMap) -> Self {
        self.channel_map = Some(map);
        self
    }

    pub fn rendering_mode(mut self, mode: RenderingMode) -> Self {
        self.rendering_mode = mode;
        self
    }

    pub fn hrirs(mut self, hrirs: HrirSource) -> Self {
        self.hrirs = hrirs;
        self
    }
}

/// State shared by both renderer variants.
#[derive(Debug)]
struct RendererCore {
    order: AmbisonicOrder,
    input: NodeId,
    output: NodeId,
    bypass: NodeId,
    rotator: Rotator,
    binaural: BinauralConvolver,
    /// Mode currently wired into the graph.
    applied_mode: RenderingMode,
    /// Mode requested by the caller; equals `applied_mode` once ready.
    requested_mode: RenderingMode,
    hrirs: Option<HrirSource>,
    ready: bool,
}

impl RendererCore {
    /// Build everything from the rotator onward. The caller wires `input`
    /// into the rotator.
    fn new(graph: &mut AudioGraph, config: &RendererConfig) -> Result<Self> {
        let channels = config.order.channel_count();

        let input = graph.add(GainNode::new(channels, 1.0));
        let output = graph.add(GainNode::new(2, 1.0));
        let bypass = graph.add(GainNode::new(channels, 1.0));
        let rotator = Rotator::new(graph, config.order)?;
        let binaural = BinauralConvolver::new(graph, config.order)?;

        graph.connect_all(input, bypass)?;
        graph.connect_all(rotator.node(), binaural.input())?;
        graph.connect_all(binaural.output(), output)?;

        Ok(Self {
            order: config.order,
            input,
            output,
            bypass,
            rotator,
            binaural,
            applied_mode: RenderingMode::Ambisonic,
            requested_mode: config.rendering_mode,
            hrirs: Some(config.hrirs.clone()),
            ready: false,
        })
    }

    fn begin_initialize(&mut self) -> Result<PendingHrirs> {
        let source = self.hrirs.take().ok_or(Error::AlreadyInitialized)?;
        tracing::debug!(
            "Initializing order-{} renderer (mode: {})",
            self.order,
            self.requested_mode
        );
        source.begin(self.order)
    }

    fn complete_initialize(&mut self, graph: &mut AudioGraph, kernels: ConvolverKernels) -> Result<()> {
        if self.ready {
            tracing::debug!("Renderer already ready; HRIR kernels ignored");
            return Ok(());
        }
        self.binaural.install_kernels(graph, kernels)?;
        if self.requested_mode != self.applied_mode {
            self.apply_mode(graph, self.requested_mode)?;
        }
        self.ready = true;
        tracing::info!(
            "Order-{} renderer ready (mode: {})",
            self.order,
            self.applied_mode
        );
        Ok(())
    }

    fn set_rendering_mode(&mut self, graph: &mut AudioGraph, mode: RenderingMode) -> Result<()> {
        self.requested_mode = mode;
        if !self.ready {
            tracing::debug!("Renderer not ready; rendering mode {} deferred", mode);
            return Ok(());
        }
        if mode == self.applied_mode {
            return Ok(());
        }
        self.apply_mode(graph, mode)?;
        tracing::info!("Rendering mode changed ({})", mode);
        Ok(())
    }

    fn apply_mode(&mut self, graph: &mut AudioGraph, mode: RenderingMode) -> Result<()> {
        // Each output input has one source, so connecting swaps the path in.
        match mode {
            RenderingMode::Ambisonic => {
                self.binaural.enable(graph)?;
                graph.connect_all(self.binaural.output(), self.output)?;
            }
            RenderingMode::Bypass => {
                self.binaural.disable(graph);
                graph.connect(self.bypass, 0, self.output, 0)?;
                graph.connect(self.bypass, 1, self.output, 1)?;
            }
            RenderingMode::Off => {
                self.binaural.disable(graph);
                graph.disconnect_inputs(self.output);
            }
        }
        self.applied_mode = mode;
        Ok(())
    }

    fn set_rotation_matrix3(&mut self, matrix: &RotationMatrix3) -> Result<()> {
        if !self.ready {
            tracing::debug!("Renderer not ready; rotation dropped");
            return Ok(());
        }
        self.rotator.set_rotation_matrix3(matrix)
    }

    fn set_rotation_matrix4(&mut self, matrix: &RotationMatrix4) -> Result<()> {
        if !self.ready {
            tracing::debug!("Renderer not ready; rotation dropped");
            return Ok(());
        }
        self.rotator.set_rotation_matrix4(matrix)
    }

    fn nodes(&self) -> [NodeId; 7] {
        [
            self.input,
            self.bypass,
            self.rotator.node(),
            self.binaural.input(),
            self.binaural.mixer(),
            self.binaural.output(),
            self.output,
        ]
    }
}

/// First-order renderer with channel remapping.
#[derive(Debug)]
pub struct FoaRenderer {
    core: RendererCore,
    router: Router,
}

impl FoaRenderer {
    fn new(graph: &mut AudioGraph, config: &RendererConfig) -> Result<Self> {
        let map = config.channel_map.clone().unwrap_or_default();
        map.check_len(config.order.channel_count())?;

        let core = RendererCore::new(graph, config)?;
        let router = Router::new(graph, map)?;
        graph.connect_all(core.input, router.input())?;
        graph.connect_all(router.output(), core.rotator.node())?;
        Ok(Self { core, router })
    }

    fn set_channel_map(&mut self, graph: &mut AudioGraph, map: ChannelMap) -> Result<()> {
        map.check_len(self.core.order.channel_count())?;
        if !self.core.ready {
            tracing::debug!("Renderer not ready; channel map {} dropped", map);
            return Ok(());
        }
        if &map != self.router.channel_map() {
            tracing::info!("Remapping channels ({} -> {})", self.router.channel_map(), map);
        }
        self.router.set_channel_map(graph, map)
    }
}

/// Second- and third-order renderer. Input must already be in ACN order.
#[derive(Debug)]
pub struct HoaRenderer {
    core: RendererCore,
}

impl HoaRenderer {
    fn new(graph: &mut AudioGraph, config: &RendererConfig) -> Result<Self> {
        let channels = config.order.channel_count();
        if let Some(map) = &config.channel_map {
            if *map != ChannelMap::identity(channels) {
                return Err(Error::InvalidChannelMap(format!(
                    "order {} input must be in ACN order, got {map}",
                    config.order
                )));
            }
        }
        let core = RendererCore::new(graph, config)?;
        graph.connect_all(core.input, core.rotator.node())?;
        Ok(Self { core })
    }
}

/// Renderer for any supported order.
#[derive(Debug)]
pub enum AmbisonicRenderer {
    Foa(FoaRenderer),
    Hoa(HoaRenderer),
}

impl AmbisonicRenderer {
    /// Build the renderer's nodes into `graph`. HRIRs are not loaded yet.
    pub fn new(graph: &mut AudioGraph, config: RendererConfig) -> Result<Self> {
        let renderer = match config.order {
            AmbisonicOrder::First => Self::Foa(FoaRenderer::new(graph, &config)?),
            _ => Self::Hoa(HoaRenderer::new(graph, &config)?),
        };
        tracing::debug!(
            "Built order-{} renderer ({} channels)",
            config.order,
            config.order.channel_count()
        );
        Ok(renderer)
    }

    fn core(&self) -> &RendererCore {
        match self {
            Self::Foa(foa) => &foa.core,
            Self::Hoa(hoa) => &hoa.core,
        }
    }

    fn core_mut(&mut self) -> &mut RendererCore {
        match self {
            Self::Foa(foa) => &mut foa.core,
            Self::Hoa(hoa) => &mut hoa.core,
        }
    }

    pub fn order(&self) -> AmbisonicOrder {
        self.core().order
    }

    /// Node taking `(order + 1)²` channels.
    pub fn input(&self) -> NodeId {
        self.core().input
    }

    /// Stereo output node.
    pub fn output(&self) -> NodeId {
        self.core().output
    }

    pub fn is_ready(&self) -> bool {
        self.core().ready
    }

    /// The requested mode; it is what renders once the renderer is ready.
    pub fn rendering_mode(&self) -> RenderingMode {
        self.core().requested_mode
    }

    /// Start resolving HRIRs. Fails with [`Error::AlreadyInitialized`] once
    /// the HRIR source has been taken.
    pub fn begin_initialize(&mut self) -> Result<PendingHrirs> {
        self.core_mut().begin_initialize()
    }

    /// Validate resolved HRIRs and build their convolution kernels. Needs no
    /// graph, so the FFT work stays off the graph lock.
    pub fn prepare_hrirs(&self, hrirs: &HrirSet) -> Result<ConvolverKernels> {
        self.core().binaural.prepare_kernels(hrirs)
    }

    /// Install kernels and go Ready, applying the requested rendering mode.
    /// A ready renderer ignores the call.
    pub fn complete_initialize(
        &mut self,
        graph: &mut AudioGraph,
        kernels: ConvolverKernels,
    ) -> Result<()> {
        self.core_mut().complete_initialize(graph, kernels)
    }

    /// Resolve, prepare and install HRIRs in one call.
    ///
    /// Only the first call does anything; later calls, and calls while an
    /// earlier [`begin_initialize`](Self::begin_initialize) is in flight,
    /// return `Ok(())`.
    pub fn initialize(&mut self, graph: &mut AudioGraph) -> Result<()> {
        if self.is_ready() || self.core().hrirs.is_none() {
            tracing::debug!("Renderer already initialized");
            return Ok(());
        }
        let hrirs = self.begin_initialize()?.wait()?;
        let kernels = self.prepare_hrirs(&hrirs)?;
        self.complete_initialize(graph, kernels)
    }

    /// Switch between ambisonic, bypass and off. Before ready the mode is
    /// stored and applied when HRIRs arrive. The new path plays from the
    /// next 128-frame render quantum after the graph is committed.
    pub fn set_rendering_mode(&mut self, graph: &mut AudioGraph, mode: RenderingMode) -> Result<()> {
        self.core_mut().set_rendering_mode(graph, mode)
    }

    /// Parse and apply a mode name. Unknown names are logged and rejected.
    pub fn set_rendering_mode_str(&mut self, graph: &mut AudioGraph, mode: &str) -> Result<()> {
        let mode = mode.parse::<RenderingMode>().inspect_err(|_| {
            tracing::warn!("Rendering mode {:?} is not supported", mode);
        })?;
        self.set_rendering_mode(graph, mode)
    }

    /// Rotate the sound field. Reaches the running mixer at its next block
    /// without touching the graph.
    pub fn set_rotation_matrix3(&mut self, matrix: &RotationMatrix3) -> Result<()> {
        self.core_mut().set_rotation_matrix3(matrix)
    }

    pub fn set_rotation_matrix4(&mut self, matrix: &RotationMatrix4) -> Result<()> {
        self.core_mut().set_rotation_matrix4(matrix)
    }

    /// Rotate by the inverse of a camera's 4×4 world transform.
    pub fn set_rotation_from_camera(&mut self, camera: &RotationMatrix4) -> Result<()> {
        if !self.is_ready() {
            tracing::debug!("Renderer not ready; camera rotation dropped");
            return Ok(());
        }
        let matrix = rotation_from_camera_matrix(camera)?;
        self.set_rotation_matrix4(&matrix)
    }

    pub fn rotation_matrix3(&self) -> RotationMatrix3 {
        self.core().rotator.rotation_matrix3()
    }

    /// Remap physical channels onto ACN. First order only.
    pub fn set_channel_map(&mut self, graph: &mut AudioGraph, map: ChannelMap) -> Result<()> {
        match self {
            Self::Foa(foa) => foa.set_channel_map(graph, map),
            Self::Hoa(hoa) => Err(Error::InvalidChannelMap(format!(
                "channel remapping is only available at first order (order {})",
                hoa.core.order
            ))),
        }
    }

    pub fn channel_map(&self) -> ChannelMap {
        match self {
            Self::Foa(foa) => foa.router.channel_map().clone(),
            Self::Hoa(hoa) => ChannelMap::identity(hoa.core.order.channel_count()),
        }
    }

    /// Remove every node this renderer added. Pending HRIR loads are not
    /// touched; drop or abort the [`PendingHrirs`] separately.
    pub fn dispose(self, graph: &mut AudioGraph) {
        let mut nodes = self.core().nodes().to_vec();
        if let Self::Foa(foa) = &self {
            nodes.extend([foa.router.input(), foa.router.output()]);
        }
        for node in nodes {
            if graph.remove(node).is_err() {
                tracing::debug!("Renderer node {:?} already removed", node);
            }
        }
    }
}
