use crate::buffer::ContentBuffer;
use crate::lockfree::AtomicFlag;
use crossbeam_channel::Sender;
use fundsp::prelude::{AudioUnit, BufferMut, BufferRef};
use fundsp::signal::SignalFrame;
use std::sync::Arc;

/// Notifications a buffer source posts to the control side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEvent {
    /// Playback reached the end of a non-looping buffer.
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Playing,
    Finished,
}

/// Plays a [`ContentBuffer`] once or in a loop.
///
/// Configure it with [`start`](Self::start) and [`set_loop`](Self::set_loop)
/// before adding it to a graph; the renderer runs a copy taken at commit.
/// [`stop`](Self::stop) and the ended flag are shared with that copy.
/// Natural end of playback raises the ended flag and posts
/// [`SourceEvent::Ended`]; an explicit stop does neither.
#[derive(Clone)]
pub struct BufferSourceNode {
    buffer: Arc<ContentBuffer>,
    start_frame: usize,
    position: usize,
    looping: bool,
    state: State,
    stopped: Arc<AtomicFlag>,
    ended: Arc<AtomicFlag>,
    events: Option<Sender<SourceEvent>>,
}

impl BufferSourceNode {
    pub fn new(buffer: Arc<ContentBuffer>) -> Self {
        Self {
            buffer,
            start_frame: 0,
            position: 0,
            looping: false,
            state: State::Idle,
            stopped: Arc::new(AtomicFlag::new(false)),
            ended: Arc::new(AtomicFlag::new(false)),
            events: None,
        }
    }

    pub fn with_events(mut self, events: Sender<SourceEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Begin playback `offset_seconds` into the buffer.
    pub fn start(&mut self, offset_seconds: f64) {
        let offset = (offset_seconds.max(0.0) * self.buffer.sample_rate()).round() as usize;
        self.start_frame = offset.min(self.buffer.frames());
        self.position = self.start_frame;
        self.state = State::Playing;
        self.stopped.set(false);
        self.ended.set(false);
    }

    /// Silence every copy of this source.
    pub fn stop(&self) {
        self.stopped.set(true);
    }

    pub fn ended_flag(&self) -> Arc<AtomicFlag> {
        Arc::clone(&self.ended)
    }

    fn finish(&mut self) {
        self.state = State::Finished;
        if self.ended.raise() {
            if let Some(events) = &self.events {
                let _ = events.try_send(SourceEvent::Ended);
            }
        }
    }

    /// Copy up to `frames` frames into `write` and advance the playhead.
    fn render(&mut self, frames: usize, mut write: impl FnMut(usize, usize, f32)) {
        if self.state == State::Playing && self.stopped.get() {
            self.state = State::Idle;
        }
        if self.state != State::Playing {
            return;
        }

        let total = self.buffer.frames();
        let mut written = 0;
        while written < frames {
            if self.position >= total {
                if self.looping && total > 0 {
                    self.position = 0;
                } else {
                    self.finish();
                    return;
                }
            }

            let run = (frames - written).min(total - self.position);
            for channel in 0..self.buffer.channel_count() {
                let source = &self.buffer.channel(channel)[self.position..self.position + run];
                for (i, sample) in source.iter().enumerate() {
                    write(channel, written + i, *sample);
                }
            }
            self.position += run;
            written += run;
        }

        if self.position >= total && !self.looping {
            self.finish();
        }
    }
}

impl AudioUnit for BufferSourceNode {
    fn inputs(&self) -> usize {
        0
    }

    fn outputs(&self) -> usize {
        self.buffer.channel_count()
    }

    /// Back to the configured start point.
    fn reset(&mut self) {
        self.position = self.start_frame;
        if self.state == State::Finished {
            self.state = State::Playing;
        }
    }

    fn set_sample_rate(&mut self, _sample_rate: f64) {}

    fn tick(&mut self, _input: &[f32], output: &mut [f32]) {
        output.fill(0.0);
        self.render(1, |channel, _, sample| output[channel] = sample);
    }

    fn process(&mut self, size: usize, _input: &BufferRef, output: &mut BufferMut) {
        for channel in 0..self.buffer.channel_count() {
            for i in 0..size {
                output.set_f32(channel, i, 0.0);
            }
        }
        self.render(size, |channel, i, sample| output.set_f32(channel, i, sample));
    }

    fn get_id(&self) -> u64 {
        0x4255_4653_5243
    }

    fn route(&mut self, _input: &SignalFrame, _frequency: f64) -> SignalFrame {
        SignalFrame::new(self.outputs())
    }

    fn footprint(&self) -> usize {
        core::mem::size_of::<Self>()
    }
}
