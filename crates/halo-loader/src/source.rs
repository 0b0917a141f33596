//! Where chunk bytes come from.

use halo_core::AtomicFlag;
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

const READ_BLOCK: usize = 64 * 1024;

/// Shared cancellation flag observed by fetchers and workers.
#[derive(Clone, Default)]
pub struct AbortSignal(Arc<AtomicFlag>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.set(true);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.get()
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AbortSignal").field(&self.is_aborted()).finish()
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("aborted")]
    Aborted,

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Transport for remote chunks.
///
/// `progress` receives `(bytes_loaded, bytes_total)`. Implementations should
/// poll `abort` between transfers and return [`FetchError::Aborted`] once it
/// is set.
pub trait ChunkFetcher: Send + Sync {
    fn fetch(
        &self,
        reference: &str,
        progress: &mut dyn FnMut(u64, u64),
        abort: &AbortSignal,
    ) -> std::result::Result<Vec<u8>, FetchError>;
}

/// Resolves references as paths under a root directory.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ChunkFetcher for FileFetcher {
    fn fetch(
        &self,
        reference: &str,
        progress: &mut dyn FnMut(u64, u64),
        abort: &AbortSignal,
    ) -> std::result::Result<Vec<u8>, FetchError> {
        read_file(&self.root.join(reference), progress, abort)
    }
}

/// One chunk of content: a contiguous range of channels.
#[derive(Clone)]
pub enum ChunkSource {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
    Remote {
        fetcher: Arc<dyn ChunkFetcher>,
        reference: String,
    },
}

impl ChunkSource {
    pub fn remote(fetcher: Arc<dyn ChunkFetcher>, reference: impl Into<String>) -> Self {
        Self::Remote {
            fetcher,
            reference: reference.into(),
        }
    }

    pub(crate) fn fetch(
        &self,
        progress: &mut dyn FnMut(u64, u64),
        abort: &AbortSignal,
    ) -> std::result::Result<Vec<u8>, FetchError> {
        match self {
            ChunkSource::Path(path) => read_file(path, progress, abort),
            ChunkSource::Bytes(bytes) => {
                let total = bytes.len() as u64;
                progress(total, total);
                Ok(bytes.to_vec())
            }
            ChunkSource::Remote { fetcher, reference } => fetcher.fetch(reference, progress, abort),
        }
    }
}

impl fmt::Debug for ChunkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            ChunkSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            ChunkSource::Remote { reference, .. } => {
                f.debug_struct("Remote").field("reference", reference).finish()
            }
        }
    }
}

impl From<PathBuf> for ChunkSource {
    fn from(path: PathBuf) -> Self {
        ChunkSource::Path(path)
    }
}

impl From<Vec<u8>> for ChunkSource {
    fn from(bytes: Vec<u8>) -> Self {
        ChunkSource::Bytes(bytes.into())
    }
}

impl From<&'static [u8]> for ChunkSource {
    fn from(bytes: &'static [u8]) -> Self {
        ChunkSource::Bytes(bytes.into())
    }
}

fn read_file(
    path: &std::path::Path,
    progress: &mut dyn FnMut(u64, u64),
    abort: &AbortSignal,
) -> std::result::Result<Vec<u8>, FetchError> {
    let mut file = std::fs::File::open(path)?;
    let total = file.metadata()?.len();
    let mut bytes = Vec::with_capacity(total as usize);
    let mut block = vec![0u8; READ_BLOCK];

    loop {
        if abort.is_aborted() {
            return Err(FetchError::Aborted);
        }
        let read = file.read(&mut block)?;
        if read == 0 {
            break;
        }
        bytes.extend_from_slice(&block[..read]);
        progress(bytes.len() as u64, total);
    }
    Ok(bytes)
}
