//! Fragmenter — splits a serialized message into size-bounded chunks.
//!
//! `max_size` bounds the payload bytes of each chunk, not the encoded
//! datagram. JSON framing and the other chunk fields add overhead on top.

use bytes::Bytes;

use crate::identity::ceil_div;
use crate::wire::Chunk;

#[derive(Debug, thiserror::Error)]
pub enum FragmentError {
    #[error("maximum chunk size must be at least 1 byte")]
    ZeroChunkSize,
    #[error("payload needs {0} chunks, more than a chunk header can count")]
    TooManyChunks(usize),
}

/// Split `payload` into chunks of at most `max_size` bytes, all tagged
/// with `group_id`.
///
/// A payload that fits (including an empty one) becomes a single chunk
/// with `total = 1`. Otherwise `total = ceil(len / max_size)` and the
/// last chunk carries the remainder. Payload slices share the input
/// buffer.
pub fn fragment(
    payload: impl Into<Bytes>,
    max_size: usize,
    group_id: &str,
) -> Result<Vec<Chunk>, FragmentError> {
    if max_size == 0 {
        return Err(FragmentError::ZeroChunkSize);
    }
    let payload: Bytes = payload.into();

    if payload.len() <= max_size {
        return Ok(vec![Chunk {
            payload,
            group_id: group_id.to_owned(),
            total: 1,
            index: 0,
        }]);
    }

    let count = ceil_div(payload.len(), max_size);
    let total = u32::try_from(count).map_err(|_| FragmentError::TooManyChunks(count))?;

    let chunks = (0..count)
        .map(|i| {
            let start = i * max_size;
            let end = (start + max_size).min(payload.len());
            Chunk {
                payload: payload.slice(start..end),
                group_id: group_id.to_owned(),
                total,
                index: i as u32,
            }
        })
        .collect();
    Ok(chunks)
}
