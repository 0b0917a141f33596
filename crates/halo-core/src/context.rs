//! Audio context: lazily created output device plus the graph it plays.
//!
//! An [`AudioContext`] is a cheap, clonable handle. Nothing touches the output
//! device until the first call that needs it (`sample_rate`, `graph`,
//! `ensure_running`, ...). The device starts suspended; [`AudioContext::ensure_running`]
//! starts or resumes it on demand.
//!
//! # Example
//!
//! ```
//! use halo_core::{AudioContext, DeviceState, GainNode};
//!
//! let context = AudioContext::offline(48000.0);
//! assert!(!context.is_created());
//!
//! let gain = context.graph(|g| g.add(GainNode::new(2, 1.0))).unwrap();
//! assert!(context.is_created());
//! assert_eq!(context.state(), DeviceState::Suspended);
//!
//! context.graph(|g| g.connect_all(gain, g.destination())).unwrap().unwrap();
//! let block = context.render(256).unwrap();
//! assert_eq!(block.len(), 2);
//! ```

use crate::config::OutputConfig;
use crate::graph::{AudioGraph, GraphRenderer};
use crate::lockfree::AtomicFlag;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Control-side graph, shared between the threads that edit it. The render
/// side never takes this lock; it owns a [`GraphRenderer`] instead.
pub type SharedGraph = Arc<Mutex<AudioGraph>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Suspended,
    Running,
    Closed,
}

/// A sink that pulls a [`GraphRenderer`].
pub trait OutputDevice: Send {
    fn sample_rate(&self) -> f64;

    fn channels(&self) -> usize;

    /// Take over `renderer` and begin pulling it. Called once per device;
    /// later starts resume.
    fn start(&mut self, renderer: GraphRenderer) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    fn suspend(&mut self) -> Result<()>;

    fn state(&self) -> DeviceState;

    /// Render `output` on the caller's thread. Devices with their own
    /// callback refuse.
    fn render(&mut self, _output: &mut [Vec<f32>]) -> Result<()> {
        Err(Error::DeviceNotPullable)
    }
}

/// Device with no hardware behind it. Audio is pulled with [`AudioContext::render`].
pub struct OfflineDevice {
    config: OutputConfig,
    state: DeviceState,
    renderer: Option<GraphRenderer>,
}

impl OfflineDevice {
    pub fn new(config: OutputConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: DeviceState::Suspended,
            renderer: None,
        })
    }
}

impl OutputDevice for OfflineDevice {
    fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    fn channels(&self) -> usize {
        self.config.channels
    }

    fn start(&mut self, renderer: GraphRenderer) -> Result<()> {
        self.renderer = Some(renderer);
        self.state = DeviceState::Running;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.state = DeviceState::Running;
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        self.state = DeviceState::Suspended;
        Ok(())
    }

    fn state(&self) -> DeviceState {
        self.state
    }

    fn render(&mut self, output: &mut [Vec<f32>]) -> Result<()> {
        match self.renderer.as_mut() {
            Some(renderer) => {
                renderer.render_planar(output);
                Ok(())
            }
            None => Err(Error::InvalidDevice("offline device was never started".into())),
        }
    }
}

type DeviceFactory = dyn Fn() -> Result<Box<dyn OutputDevice>> + Send + Sync;

struct Live {
    device: Box<dyn OutputDevice>,
    graph: SharedGraph,
    /// Held until the device starts and takes it over.
    renderer: Option<GraphRenderer>,
}

struct Inner {
    factory: Box<DeviceFactory>,
    live: Mutex<Option<Live>>,
    closed: AtomicFlag,
}

#[derive(Clone)]
pub struct AudioContext {
    inner: Arc<Inner>,
}

impl AudioContext {
    /// Context whose device is built by `factory` on first use.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn OutputDevice>> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                factory: Box::new(factory),
                live: Mutex::new(None),
                closed: AtomicFlag::new(false),
            }),
        }
    }

    /// Stereo offline context.
    pub fn offline(sample_rate: f64) -> Self {
        Self::offline_with(OutputConfig {
            sample_rate,
            channels: 2,
        })
    }

    pub fn offline_with(config: OutputConfig) -> Self {
        Self::new(move || Ok(Box::new(OfflineDevice::new(config)?) as Box<dyn OutputDevice>))
    }

    /// Context on the system default output device.
    #[cfg(feature = "cpal")]
    pub fn default_output() -> Self {
        Self::new(|| {
            Ok(Box::new(crate::output::CpalOutput::new(None)?) as Box<dyn OutputDevice>)
        })
    }

    /// Context on the output device called `name`. The lookup happens on
    /// first use, like every other device access.
    #[cfg(feature = "cpal")]
    pub fn named_output(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(move || {
            Ok(Box::new(crate::output::CpalOutput::new(Some(&name))?) as Box<dyn OutputDevice>)
        })
    }

    /// Whether the device has been created yet.
    pub fn is_created(&self) -> bool {
        self.inner.live.lock().is_some()
    }

    fn with_live<R>(&self, f: impl FnOnce(&mut Live) -> Result<R>) -> Result<R> {
        if self.inner.closed.get() {
            return Err(Error::ContextClosed);
        }
        let mut guard = self.inner.live.lock();
        if guard.is_none() {
            let device = (self.inner.factory)()?;
            let (graph, renderer) = AudioGraph::new(device.sample_rate(), device.channels());
            tracing::debug!(
                "Audio context created: {} Hz, {} channels",
                device.sample_rate(),
                device.channels()
            );
            *guard = Some(Live {
                device,
                graph: Arc::new(Mutex::new(graph)),
                renderer: Some(renderer),
            });
        }
        match guard.as_mut() {
            Some(live) => f(live),
            None => Err(Error::ContextClosed),
        }
    }

    /// Create the device if needed and make sure it is running.
    pub fn ensure_running(&self) -> Result<()> {
        self.with_live(|live| {
            if live.device.state() == DeviceState::Running {
                return Ok(());
            }
            match live.renderer.take() {
                Some(renderer) => live.device.start(renderer),
                None => {
                    tracing::debug!("Resuming audio context");
                    live.device.resume()
                }
            }
        })
    }

    pub fn suspend(&self) -> Result<()> {
        match self.inner.live.lock().as_mut() {
            Some(live) => live.device.suspend(),
            None => Ok(()),
        }
    }

    /// Drop the device and graph. Every later call fails with [`Error::ContextClosed`].
    pub fn close(&self) {
        self.inner.closed.set(true);
        if self.inner.live.lock().take().is_some() {
            tracing::debug!("Audio context closed");
        }
    }

    pub fn state(&self) -> DeviceState {
        if self.inner.closed.get() {
            return DeviceState::Closed;
        }
        self.inner
            .live
            .lock()
            .as_ref()
            .map_or(DeviceState::Suspended, |live| live.device.state())
    }

    pub fn sample_rate(&self) -> Result<f64> {
        self.with_live(|live| Ok(live.device.sample_rate()))
    }

    pub fn channels(&self) -> Result<usize> {
        self.with_live(|live| Ok(live.device.channels()))
    }

    pub fn shared_graph(&self) -> Result<SharedGraph> {
        self.with_live(|live| Ok(Arc::clone(&live.graph)))
    }

    /// Edit the graph, then commit whatever `f` changed to the renderer.
    ///
    /// Only other control threads wait on this lock; rendering carries on
    /// with the last committed network.
    pub fn graph<R>(&self, f: impl FnOnce(&mut AudioGraph) -> R) -> Result<R> {
        let graph = self.shared_graph()?;
        let mut graph = graph.lock();
        let result = f(&mut graph);
        graph.commit();
        Ok(result)
    }

    /// Pull `frames` frames of planar output on the calling thread.
    ///
    /// Works for offline devices, and for any device before it is started.
    pub fn render(&self, frames: usize) -> Result<Vec<Vec<f32>>> {
        self.with_live(|live| {
            let mut output = vec![vec![0.0; frames]; live.device.channels()];
            match live.renderer.as_mut() {
                Some(renderer) => renderer.render_planar(&mut output),
                None => live.device.render(&mut output)?,
            }
            Ok(output)
        })
    }
}

impl std::fmt::Debug for AudioContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioContext")
            .field("created", &self.is_created())
            .field("state", &self.state())
            .finish()
    }
}
