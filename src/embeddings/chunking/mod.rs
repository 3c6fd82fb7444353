
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::documents::{Document, Segment};
use crate::{RagError, Result};

/// Separator groups tried in order: paragraph, line, sentence, word.
/// Anything still too long after the last group is cut into raw char runs.
const SEPARATORS: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "! ", "? "], &[" "]];

/// Configuration for document splitting. Sizes are measured in chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Upper bound on the length of every produced segment
    pub max_chunk_size: usize,
    /// Number of chars repeated between consecutive segments
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_chunk_size: 300,
            overlap: 30,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn new(max_chunk_size: usize, overlap: usize) -> Self {
        Self {
            max_chunk_size,
            overlap,
        }
    }

    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(RagError::InvalidParameter(
                "max_chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.overlap >= self.max_chunk_size {
            return Err(RagError::InvalidParameter(format!(
                "overlap ({}) must be smaller than max_chunk_size ({})",
                self.overlap, self.max_chunk_size
            )));
        }
        Ok(())
    }

    /// Room left in a segment once the overlap prefix is accounted for
    fn window_capacity(&self) -> usize {
        self.max_chunk_size - self.overlap
    }
}

/// Split a document into ordered, overlapping segments.
///
/// Every segment is at most `max_chunk_size` chars. Segment `n + 1` starts
/// `overlap` chars before the point where segment `n` ends, or at the start
/// of the document when less text precedes it. Together the segments cover
/// the document end to end. A document of only whitespace has no segments.
#[inline]
pub fn split(document: &Document, config: &ChunkingConfig) -> Result<Vec<Segment>> {
    config.validate()?;

    let text = document.text();
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let capacity = config.window_capacity();
    let mut pieces = Vec::new();
    split_range(text, 0..text.len(), 0, capacity, &mut pieces);

    let windows = pack_windows(text, pieces, capacity);

    let mut segments = Vec::with_capacity(windows.len());
    for window in windows {
        let start = step_back_chars(text, window.start, config.overlap);
        if let Some(segment) = document.segment(start..window.end) {
            segments.push(segment);
        }
    }

    debug!(
        "Split '{}' into {} segments (max {} chars, overlap {})",
        document.source(),
        segments.len(),
        config.max_chunk_size,
        config.overlap
    );

    Ok(segments)
}

/// Recursively break `range` into pieces no longer than `capacity` chars,
/// falling back to finer separators when a piece is still too long.
fn split_range(
    text: &str,
    range: Range<usize>,
    level: usize,
    capacity: usize,
    pieces: &mut Vec<Range<usize>>,
) {
    if slice(text, &range).chars().count() <= capacity {
        pieces.push(range);
        return;
    }

    let Some(separators) = SEPARATORS.get(level) else {
        split_chars(text, range, capacity, pieces);
        return;
    };

    let parts = split_after_separators(slice(text, &range), separators);
    if parts.len() <= 1 {
        split_range(text, range, level + 1, capacity, pieces);
        return;
    }

    for part in parts {
        let absolute = (range.start + part.start)..(range.start + part.end);
        split_range(text, absolute, level + 1, capacity, pieces);
    }
}

/// Split at every separator occurrence, keeping the separator attached to
/// the preceding part so the parts tile the input exactly.
fn split_after_separators(text: &str, separators: &[&str]) -> Vec<Range<usize>> {
    let mut parts = Vec::new();
    let mut start = 0;

    while let Some((index, separator)) = separators
        .iter()
        .filter_map(|separator| {
            text.get(start..)?
                .find(separator)
                .map(|offset| (start + offset, *separator))
        })
        .min_by_key(|(index, _)| *index)
    {
        let end = index + separator.len();
        parts.push(start..end);
        start = end;
    }

    if start < text.len() {
        parts.push(start..text.len());
    }

    parts
}

/// Last resort: cut into runs of exactly `capacity` chars
fn split_chars(text: &str, range: Range<usize>, capacity: usize, pieces: &mut Vec<Range<usize>>) {
    let mut start = range.start;

    for (count, (offset, _)) in slice(text, &range).char_indices().enumerate() {
        if count > 0 && count % capacity == 0 {
            let boundary = range.start + offset;
            pieces.push(start..boundary);
            start = boundary;
        }
    }

    if start < range.end {
        pieces.push(start..range.end);
    }
}

/// Greedily merge adjacent pieces into windows of at most `capacity` chars
fn pack_windows(text: &str, pieces: Vec<Range<usize>>, capacity: usize) -> Vec<Range<usize>> {
    let mut windows = Vec::new();
    let mut current: Option<(Range<usize>, usize)> = None;

    for piece in pieces {
        let piece_len = slice(text, &piece).chars().count();
        current = match current.take() {
            Some((window, window_len)) if window_len + piece_len <= capacity => {
                Some((window.start..piece.end, window_len + piece_len))
            }
            Some((window, _)) => {
                windows.push(window);
                Some((piece, piece_len))
            }
            None => Some((piece, piece_len)),
        };
    }

    if let Some((window, _)) = current {
        windows.push(window);
    }

    windows
}

/// Byte offset `count` chars before `position`, clamped to the text start
fn step_back_chars(text: &str, position: usize, count: usize) -> usize {
    if count == 0 {
        return position;
    }
    text.get(..position)
        .and_then(|prefix| prefix.char_indices().rev().nth(count - 1))
        .map_or(0, |(offset, _)| offset)
}

fn slice<'a>(text: &'a str, range: &Range<usize>) -> &'a str {
    text.get(range.clone()).unwrap_or_default()
}
