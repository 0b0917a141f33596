//! Visualization tap.
//!
//! A [`TapNode`] is a sink with no outputs: it copies whatever is connected to
//! it into fixed-size interleaved messages and hands them to a
//! [`TapPublisher`] thread, which forwards them to a callback at a throttled
//! rate. Connecting the tap adds an edge off a source; it never sits in the
//! render path, so output is unaffected.
//!
//! Message buffers are preallocated and recycled through a return channel, so
//! the render thread never allocates. If the publisher falls behind and no
//! buffer is free, the block is dropped.

use crate::lockfree::AtomicFlag;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use fundsp::prelude::{AudioUnit, BufferMut, BufferRef};
use fundsp::signal::SignalFrame;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Channels per message frame (third-order ACN).
pub const TAP_CHANNELS: usize = 16;

/// Frames per message.
pub const TAP_FRAMES: usize = 960;

const POOL_SIZE: usize = 4;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub type TapCallback = Box<dyn FnMut(&[f32]) + Send>;

/// Create a connected tap node / publisher pair.
///
/// `input_channels` ACN channels (SN3D) are scaled to N3D; message channels
/// beyond `input_channels` stay zero.
pub fn audio_tap(
    input_channels: usize,
    interval: Duration,
    callback: TapCallback,
) -> std::io::Result<(TapNode, TapPublisher)> {
    let (data_tx, data_rx) = bounded(POOL_SIZE);
    let (pool_tx, pool_rx) = bounded(POOL_SIZE);
    for _ in 0..POOL_SIZE {
        // Pool is sized to hold every buffer
        let _ = pool_tx.try_send(vec![0.0; TAP_CHANNELS * TAP_FRAMES]);
    }

    let node = TapNode::new(input_channels.min(TAP_CHANNELS), data_tx, pool_rx);
    let publisher = TapPublisher::spawn(interval, callback, data_rx, pool_tx)?;
    Ok((node, publisher))
}

pub struct TapNode {
    inputs: usize,
    scale: Vec<f32>,
    current: Option<Vec<f32>>,
    filled: usize,
    data: Sender<Vec<f32>>,
    pool: Receiver<Vec<f32>>,
}

impl TapNode {
    fn new(inputs: usize, data: Sender<Vec<f32>>, pool: Receiver<Vec<f32>>) -> Self {
        let scale = (0..inputs)
            .map(|acn| {
                let band = (acn as f32).sqrt().floor();
                (2.0 * band + 1.0).sqrt()
            })
            .collect();
        Self {
            inputs,
            scale,
            current: None,
            filled: 0,
            data,
            pool,
        }
    }

    /// Copy `frames` frames, read through `sample(channel, frame)`, into messages.
    fn capture(&mut self, frames: usize, sample: impl Fn(usize, usize) -> f32) {
        let mut frame = 0;
        while frame < frames {
            if self.current.is_none() {
                match self.pool.try_recv() {
                    Ok(mut buffer) => {
                        buffer.fill(0.0);
                        self.current = Some(buffer);
                        self.filled = 0;
                    }
                    Err(_) => return,
                }
            }
            let Some(buffer) = self.current.as_mut() else {
                return;
            };

            let run = (frames - frame).min(TAP_FRAMES - self.filled);
            for (ch, scale) in self.scale.iter().enumerate() {
                for i in 0..run {
                    buffer[(self.filled + i) * TAP_CHANNELS + ch] = sample(ch, frame + i) * scale;
                }
            }
            self.filled += run;
            frame += run;

            if self.filled == TAP_FRAMES {
                if let Some(full) = self.current.take() {
                    // A full queue means the publisher has stopped; drop the block.
                    let _ = self.data.try_send(full);
                }
            }
        }
    }
}

/// Copies share the channels but not the message being filled.
impl Clone for TapNode {
    fn clone(&self) -> Self {
        Self {
            inputs: self.inputs,
            scale: self.scale.clone(),
            current: None,
            filled: 0,
            data: self.data.clone(),
            pool: self.pool.clone(),
        }
    }
}

impl AudioUnit for TapNode {
    fn inputs(&self) -> usize {
        self.inputs
    }

    fn outputs(&self) -> usize {
        0
    }

    fn reset(&mut self) {
        self.filled = 0;
    }

    fn set_sample_rate(&mut self, _sample_rate: f64) {}

    fn tick(&mut self, input: &[f32], _output: &mut [f32]) {
        self.capture(1, |channel, _| input[channel]);
    }

    fn process(&mut self, size: usize, input: &BufferRef, _output: &mut BufferMut) {
        self.capture(size, |channel, i| input.at_f32(channel, i));
    }

    fn get_id(&self) -> u64 {
        0x5441_5053_494E_4B
    }

    fn route(&mut self, _input: &SignalFrame, _frequency: f64) -> SignalFrame {
        SignalFrame::new(0)
    }

    fn footprint(&self) -> usize {
        core::mem::size_of::<Self>()
    }
}

/// Delivery thread for tap messages.
pub struct TapPublisher {
    running: Arc<AtomicFlag>,
    handle: Option<JoinHandle<TapCallback>>,
}

impl TapPublisher {
    fn spawn(
        interval: Duration,
        mut callback: TapCallback,
        data: Receiver<Vec<f32>>,
        pool: Sender<Vec<f32>>,
    ) -> std::io::Result<Self> {
        let running = Arc::new(AtomicFlag::new(true));
        let flag = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("halo-tap".into())
            .spawn(move || {
                let mut last_delivery: Option<Instant> = None;
                while flag.get() {
                    match data.recv_timeout(POLL_INTERVAL) {
                        Ok(buffer) => {
                            let due = last_delivery.map_or(true, |t| t.elapsed() >= interval);
                            if due && flag.get() {
                                callback(&buffer);
                                last_delivery = Some(Instant::now());
                            }
                            let _ = pool.try_send(buffer);
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                callback
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the delivery thread and send one zeroed frame to the callback.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.running.set(false);
        match handle.join() {
            Ok(mut callback) => callback(&vec![0.0; TAP_CHANNELS * TAP_FRAMES]),
            Err(_) => tracing::warn!("Tap publisher thread panicked"),
        }
    }
}

impl Drop for TapPublisher {
    fn drop(&mut self) {
        self.stop();
    }
}
