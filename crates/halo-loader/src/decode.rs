//! RIFF/WAV PCM decoding.

use crate::{Error, Result};
use halo_core::ContentBuffer;
use hound::{SampleFormat, WavReader};
use rayon::prelude::*;
use std::io::Cursor;

/// Decode a WAV chunk into planar f32.
///
/// Integer PCM of 8 to 32 bits and 32-bit float are accepted.
pub fn decode_wav(bytes: &[u8], chunk_index: usize) -> Result<ContentBuffer> {
    let decode_error = |reason: String| Error::Decode {
        chunk_index,
        reason,
    };

    let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| decode_error(e.to_string()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(decode_error("WAV header declares zero channels".into()));
    }

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| decode_error(e.to_string()))?,
        (SampleFormat::Int, bits @ 8..=32) => {
            let scale = 1.0 / (1u64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| decode_error(e.to_string()))?
        }
        (format, bits) => {
            return Err(decode_error(format!(
                "unsupported sample format {format:?} at {bits} bits"
            )))
        }
    };

    ContentBuffer::from_interleaved(&interleaved, channels, spec.sample_rate as f64)
        .map_err(|e| decode_error(e.to_string()))
}

/// Decode several in-memory chunks in parallel, preserving order.
pub fn decode_all(chunks: &[&[u8]]) -> Result<Vec<ContentBuffer>> {
    chunks
        .par_iter()
        .enumerate()
        .map(|(index, bytes)| decode_wav(bytes, index))
        .collect()
}
