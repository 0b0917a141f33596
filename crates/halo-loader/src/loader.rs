//! Parallel multi-chunk loading with progress polling and cancellation.

use crate::decode::decode_wav;
use crate::merge::merge_by_channel;
use crate::source::{AbortSignal, ChunkSource, FetchError};
use crate::{Error, Result};
use crossbeam_channel::{never, select, unbounded, Receiver, Sender};
use halo_core::ContentBuffer;
use std::thread::JoinHandle;
use std::time::Duration;

const ABORT_POLL: Duration = Duration::from_millis(10);

/// Byte progress of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadProgress {
    pub chunk_index: usize,
    pub bytes_loaded: u64,
    pub bytes_total: u64,
}

type ChunkResult = (usize, Result<ContentBuffer>);

/// Handle to an in-flight multi-chunk load.
///
/// Every chunk is fetched and decoded on its own thread. The load resolves
/// once all chunks decode, merging their channels in chunk order. The first
/// failure rejects the whole load and aborts the remaining chunks.
///
/// Dropping an unsettled handle aborts the load.
pub struct LoadHandle {
    progress_rx: Receiver<LoadProgress>,
    results_rx: Receiver<ChunkResult>,
    workers: Vec<JoinHandle<()>>,
    chunk_count: usize,
    abort: AbortSignal,
    settled: bool,
}

impl LoadHandle {
    /// Start loading `sources` in parallel.
    pub fn start(sources: Vec<ChunkSource>) -> Result<Self> {
        if sources.is_empty() {
            return Err(Error::Empty);
        }
        let chunk_count = sources.len();
        let (progress_tx, progress_rx) = unbounded();
        let (results_tx, results_rx) = unbounded();
        let abort = AbortSignal::new();

        let mut workers = Vec::with_capacity(chunk_count);
        for (index, source) in sources.into_iter().enumerate() {
            let progress_tx = progress_tx.clone();
            let results_tx: Sender<ChunkResult> = results_tx.clone();
            let abort_signal = abort.clone();

            let spawned = std::thread::Builder::new()
                .name(format!("halo-load-chunk-{index}"))
                .spawn(move || {
                    let result = load_chunk(index, &source, &progress_tx, &abort_signal);
                    // Results after an abort are discarded
                    if !abort_signal.is_aborted() {
                        let _ = results_tx.send((index, result));
                    }
                });

            match spawned {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    abort.abort();
                    return Err(e.into());
                }
            }
        }

        tracing::debug!("Loading {} chunk(s)", chunk_count);

        Ok(Self {
            progress_rx,
            results_rx,
            workers,
            chunk_count,
            abort,
            settled: false,
        })
    }

    /// Drain pending progress updates (non-blocking).
    pub fn progress(&self) -> Vec<LoadProgress> {
        self.progress_rx.try_iter().collect()
    }

    /// Abort the load. Outstanding fetches stop at their next abort check and
    /// the load rejects with [`Error::Cancelled`].
    pub fn abort(&self) {
        if !self.settled && !self.abort.is_aborted() {
            tracing::debug!("Aborting load of {} chunk(s)", self.chunk_count);
        }
        self.abort.abort();
    }

    /// Signal that aborts this load from another thread.
    pub fn abort_handle(&self) -> AbortSignal {
        self.abort.clone()
    }

    pub fn is_done(&self) -> bool {
        self.workers.iter().all(|w| w.is_finished())
    }

    /// Block until the load settles.
    pub fn wait(self) -> Result<ContentBuffer> {
        self.wait_with_progress(|_| {})
    }

    /// Block until the load settles, forwarding progress to `on_progress`.
    pub fn wait_with_progress(
        mut self,
        mut on_progress: impl FnMut(LoadProgress),
    ) -> Result<ContentBuffer> {
        let result = self.collect(&mut on_progress);
        self.settled = true;
        if result.is_err() {
            self.abort.abort();
        }
        result
    }

    fn collect(&mut self, on_progress: &mut dyn FnMut(LoadProgress)) -> Result<ContentBuffer> {
        let mut slots: Vec<Option<ContentBuffer>> = vec![None; self.chunk_count];
        let mut remaining = self.chunk_count;
        let closed = never();
        let mut progress_open = true;

        while remaining > 0 {
            if self.abort.is_aborted() {
                return Err(Error::Cancelled);
            }
            let progress_rx = if progress_open {
                &self.progress_rx
            } else {
                &closed
            };

            select! {
                recv(progress_rx) -> msg => match msg {
                    Ok(progress) => on_progress(progress),
                    Err(_) => progress_open = false,
                },
                recv(self.results_rx) -> msg => match msg {
                    Ok((index, Ok(buffer))) => {
                        slots[index] = Some(buffer);
                        remaining -= 1;
                    }
                    Ok((index, Err(e))) => {
                        tracing::warn!("Chunk {} failed: {}", index, e);
                        return Err(e);
                    }
                    Err(_) => {
                        if self.abort.is_aborted() {
                            return Err(Error::Cancelled);
                        }
                        return Err(Error::Io(std::io::Error::other(
                            "chunk worker exited without a result",
                        )));
                    }
                },
                default(ABORT_POLL) => {}
            }
        }

        for progress in self.progress_rx.try_iter() {
            on_progress(progress);
        }

        let buffers: Vec<ContentBuffer> = slots.into_iter().flatten().collect();
        let merged = merge_by_channel(&buffers)?;
        tracing::debug!(
            "Loaded {} chunk(s): {} channels, {} frames",
            self.chunk_count,
            merged.channel_count(),
            merged.frames()
        );
        Ok(merged)
    }
}

impl Drop for LoadHandle {
    fn drop(&mut self) {
        if !self.settled {
            self.abort.abort();
        }
    }
}

/// Load `sources` and block until merged.
pub fn load_chunks(
    sources: Vec<ChunkSource>,
    on_progress: impl FnMut(LoadProgress),
) -> Result<ContentBuffer> {
    LoadHandle::start(sources)?.wait_with_progress(on_progress)
}

fn load_chunk(
    chunk_index: usize,
    source: &ChunkSource,
    progress_tx: &Sender<LoadProgress>,
    abort: &AbortSignal,
) -> Result<ContentBuffer> {
    let mut report = |bytes_loaded: u64, bytes_total: u64| {
        if !abort.is_aborted() {
            let _ = progress_tx.send(LoadProgress {
                chunk_index,
                bytes_loaded,
                bytes_total,
            });
        }
    };

    let bytes = source
        .fetch(&mut report, abort)
        .map_err(|e| match e {
            FetchError::Aborted => Error::Cancelled,
            other => Error::Network {
                chunk_index,
                reason: other.to_string(),
            },
        })?;

    if abort.is_aborted() {
        return Err(Error::Cancelled);
    }
    decode_wav(&bytes, chunk_index)
}
