//! Speech chunking: turn a final text into speech-partial sized pieces.
//!
//! Chunk boundaries target a uniformly random length in `[min, max]`
//! bytes, snapped back to the last whitespace before the target so words
//! survive intact — unless that whitespace sits in the first half of the
//! minimum, which would leave a uselessly small fragment.

use std::time::Duration;

use rand::Rng;

use crate::traits::ChunkStream;

/// Split `text` into speech chunks. Empty input yields no chunks; each
/// chunk has its leading whitespace trimmed.
pub fn chunk_text(text: &str, min_chunk: usize, max_chunk: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    if text.is_empty() {
        return chunks;
    }
    let min = min_chunk.max(1);
    let max = max_chunk.max(min);

    let mut rng = rand::thread_rng();
    let mut cursor = 0usize;
    while cursor < text.len() {
        let target = rng.gen_range(min..=max);
        let hard_end = floor_boundary(text, cursor.saturating_add(target));

        let end = if hard_end >= text.len() {
            text.len()
        } else {
            let fragment_floor = cursor + min / 2;
            last_whitespace_past(text, cursor, hard_end, fragment_floor).unwrap_or(hard_end)
        };

        // A multi-byte char can pin the floor boundary at the cursor;
        // always advance by at least one char.
        let end = if end <= cursor {
            ceil_boundary(text, cursor + 1)
        } else {
            end
        };

        let piece = text[cursor..end].trim_start();
        if !piece.is_empty() {
            chunks.push(piece.to_owned());
        }
        cursor = end;
    }

    chunks
}

/// Yield each chunk lazily, cooperatively pausing `delay_ms` between
/// chunks when positive.
pub fn stream_from_chunks(chunks: Vec<String>, delay_ms: u64) -> ChunkStream {
    Box::pin(async_stream::stream! {
        for chunk in chunks {
            yield chunk;
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    })
}

/// Byte index of the last whitespace char in `text[start..end]` that lies
/// strictly past `floor`, if any.
fn last_whitespace_past(text: &str, start: usize, end: usize, floor: usize) -> Option<usize> {
    text[start..end]
        .char_indices()
        .filter(|(i, c)| c.is_whitespace() && start + i > floor)
        .map(|(i, _)| start + i)
        .next_back()
}

fn floor_boundary(text: &str, mut idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(text: &str, mut idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
