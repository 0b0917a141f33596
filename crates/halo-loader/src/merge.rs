use crate::{Error, Result};
use halo_core::ContentBuffer;

/// Upper bound on merged channel count.
pub const MAX_MERGED_CHANNELS: usize = 32;

/// Concatenate channels (not frames) across `buffers`, in order.
///
/// Every buffer must have the same frame count and sample rate; a mismatch is
/// an error, never a truncation.
pub fn merge_by_channel(buffers: &[ContentBuffer]) -> Result<ContentBuffer> {
    let first = buffers.first().ok_or(Error::Empty)?;
    let frames = first.frames();
    let sample_rate = first.sample_rate();

    let mut total = 0;
    for (index, buffer) in buffers.iter().enumerate() {
        if buffer.frames() != frames {
            return Err(Error::Merge(format!(
                "chunk {index} has {} frames, expected {frames}",
                buffer.frames()
            )));
        }
        if buffer.sample_rate() != sample_rate {
            return Err(Error::Merge(format!(
                "chunk {index} is {} Hz, expected {sample_rate} Hz",
                buffer.sample_rate()
            )));
        }
        total += buffer.channel_count();
    }
    if total > MAX_MERGED_CHANNELS {
        return Err(Error::Merge(format!(
            "{total} channels exceeds the limit of {MAX_MERGED_CHANNELS}"
        )));
    }

    let channels = buffers
        .iter()
        .flat_map(|b| b.channels().iter().cloned())
        .collect();
    Ok(ContentBuffer::new(channels, sample_rate)?)
}
