//! Content loading for halo.
//!
//! Loads one or more chunks (files, in-memory bytes or remote references
//! behind a [`ChunkFetcher`]) in parallel, decodes each as WAV PCM and merges
//! their channels in chunk order into a single [`ContentBuffer`].
//!
//! ```no_run
//! use halo_loader::{ChunkSource, LoadHandle};
//! use std::path::PathBuf;
//!
//! let handle = LoadHandle::start(vec![
//!     ChunkSource::Path(PathBuf::from("scene-ch0-7.wav")),
//!     ChunkSource::Path(PathBuf::from("scene-ch8-15.wav")),
//! ])?;
//! let buffer = handle.wait_with_progress(|p| {
//!     println!("chunk {}: {}/{}", p.chunk_index, p.bytes_loaded, p.bytes_total)
//! })?;
//! assert_eq!(buffer.channel_count(), 16);
//! # Ok::<(), halo_loader::Error>(())
//! ```
//!
//! [`ContentBuffer`]: halo_core::ContentBuffer

mod error;
pub use error::{Error, Result};

mod decode;
pub use decode::{decode_all, decode_wav};

mod loader;
pub use loader::{load_chunks, LoadHandle, LoadProgress};

mod merge;
pub use merge::{merge_by_channel, MAX_MERGED_CHANNELS};

mod source;
pub use source::{AbortSignal, ChunkFetcher, ChunkSource, FetchError, FileFetcher};
