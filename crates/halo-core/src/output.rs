//! CPAL hardware output.

use crate::context::{DeviceState, OutputDevice};
use crate::graph::GraphRenderer;
use crate::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

/// Wrapper to hold a `cpal::Stream` in a `Send` context.
///
/// `cpal::Stream` is `!Send` due to platform internals. The stream is only
/// touched through the `AudioContext` mutex, so it is never accessed
/// concurrently, and it is dropped with the device.
struct StreamHandle(cpal::Stream);

// SAFETY: see `StreamHandle`; access is serialized by the context lock.
unsafe impl Send for StreamHandle {}

/// Output through a CPAL device.
///
/// The stream callback owns the [`GraphRenderer`], so it never waits on the
/// control side. Graph edits reach it through commits.
pub struct CpalOutput {
    device_name: Option<String>,
    sample_rate: f64,
    channels: usize,
    state: DeviceState,
    stream: Option<StreamHandle>,
}

impl CpalOutput {
    /// Open the output device called `device_name`, or the system default.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = find_device(device_name)?;
        let config = device.default_output_config()?;

        Ok(Self {
            device_name: device_name.map(str::to_owned),
            sample_rate: config.sample_rate().0 as f64,
            channels: config.channels() as usize,
            state: DeviceState::Suspended,
            stream: None,
        })
    }

    /// Names of the output devices on the default host.
    pub fn output_device_names() -> Result<Vec<String>> {
        let mut names = Vec::new();
        for device in cpal::default_host().output_devices()? {
            names.push(device.name()?);
        }
        Ok(names)
    }
}

impl OutputDevice for CpalOutput {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn start(&mut self, renderer: GraphRenderer) -> Result<()> {
        if self.stream.is_some() {
            return self.resume();
        }

        let device = find_device(self.device_name.as_deref())?;
        let config = device.default_output_config()?;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), renderer)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), renderer)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), renderer)?,
            format => {
                return Err(Error::InvalidConfig(format!(
                    "Unsupported sample format: {:?}",
                    format
                )));
            }
        };

        stream.play()?;
        self.stream = Some(StreamHandle(stream));
        self.state = DeviceState::Running;
        tracing::info!(
            "Output started: {} Hz, {} channels",
            self.sample_rate,
            self.channels
        );
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        if let Some(StreamHandle(stream)) = &self.stream {
            stream.play()?;
            self.state = DeviceState::Running;
        }
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        if let Some(StreamHandle(stream)) = &self.stream {
            stream.pause()?;
            self.state = DeviceState::Suspended;
        }
        Ok(())
    }

    fn state(&self) -> DeviceState {
        self.state
    }
}

fn find_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    let Some(name) = name else {
        return host
            .default_output_device()
            .ok_or_else(|| Error::InvalidDevice("no default output device".into()));
    };

    for device in host.output_devices()? {
        if device.name().is_ok_and(|n| n == name) {
            return Ok(device);
        }
    }
    Err(Error::InvalidDevice(format!("no output device named {name:?}")))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: GraphRenderer,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    // Scratch sized for a generous callback; larger callbacks are rendered in slices.
    let mut scratch = vec![0.0f32; 4096 * channels];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                for chunk in data.chunks_mut(scratch.len()) {
                    let rendered = &mut scratch[..chunk.len()];
                    renderer.render_interleaved(rendered, channels);
                    for (sample, value) in chunk.iter_mut().zip(rendered.iter()) {
                        *sample = T::from_sample(*value);
                    }
                }
            }));

            if result.is_err() {
                for sample in data.iter_mut() {
                    *sample = T::from_sample(0.0);
                }
            }
        },
        |err| {
            tracing::error!("Audio stream error: {}", err);
        },
        None,
    )?;

    Ok(stream)
}
