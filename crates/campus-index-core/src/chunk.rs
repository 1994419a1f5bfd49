//! Sentence-boundary text chunker.
//!
//! Splits extracted document text into [`Passage`]s that respect a
//! configurable `chunk_size`. Splitting occurs on sentence boundaries
//! (`". "`); sentences accumulate into a buffer until the next one would
//! overflow it. Every passage after the first is prefixed with the tail of
//! its predecessor so context carries across boundaries, and passages that
//! are too short to be useful are dropped.
//!
//! All lengths are counted in `char`s.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::Passage;

const SENTENCE_DELIMITER: &str = ". ";

/// Chunking parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingParams {
    /// Maximum length of a passage before overlap is prepended.
    pub chunk_size: usize,
    /// Number of trailing chars of the previous passage to prepend.
    pub overlap: usize,
    /// Passages shorter than this after trimming are discarded.
    pub min_passage_chars: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
            min_passage_chars: 50,
        }
    }
}

/// Split text into passages with contiguous indices starting at 0.
///
/// Blank input yields an empty vector, as does input whose passages are all
/// shorter than `min_passage_chars`.
pub fn split_text(text: &str, params: &ChunkingParams) -> Vec<Passage> {
    let windows = sentence_windows(text, params.chunk_size);

    let overlapped: Vec<String> = windows
        .iter()
        .enumerate()
        .map(|(i, window)| {
            if i == 0 || params.overlap == 0 {
                window.clone()
            } else {
                format!("{} {}", tail_chars(&windows[i - 1], params.overlap), window)
            }
        })
        .collect();

    overlapped
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty() && p.chars().count() >= params.min_passage_chars)
        .enumerate()
        .map(|(index, text)| make_passage(index, text))
        .collect()
}

/// Accumulate sentences into windows of at most `chunk_size` chars.
fn sentence_windows(text: &str, chunk_size: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let flattened = text.replace('\n', " ");
    let mut windows = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in flattened.trim().split(SENTENCE_DELIMITER) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        let sentence_len = sentence.chars().count();

        // A single sentence longer than the budget gets hard-split; its tail
        // keeps accumulating like a normal sentence.
        if sentence_len > chunk_size {
            if !current.is_empty() {
                windows.push(current.trim().to_string());
            }
            let mut pieces = hard_split(sentence, chunk_size);
            current = pieces.pop().unwrap_or_default();
            current_len = current.chars().count();
            windows.extend(pieces);
            continue;
        }

        if current_len + sentence_len + SENTENCE_DELIMITER.len() > chunk_size {
            if !current.is_empty() {
                windows.push(current.trim().to_string());
            }
            current = sentence.to_string();
            current_len = sentence_len;
        } else if current.is_empty() {
            current = sentence.to_string();
            current_len = sentence_len;
        } else {
            current.push_str(SENTENCE_DELIMITER);
            current.push_str(sentence);
            current_len += SENTENCE_DELIMITER.len() + sentence_len;
        }
    }

    if !current.trim().is_empty() {
        windows.push(current.trim().to_string());
    }

    windows
}

/// Split at the last whitespace before `max_chars`, or exactly at the limit
/// when there is none.
fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    if max_chars == 0 {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > max_chars {
        let limit = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let split_at = remaining[..limit]
            .rfind(char::is_whitespace)
            .filter(|&pos| pos > 0)
            .unwrap_or(limit);

        let piece = remaining[..split_at].trim_end();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        remaining = remaining[split_at..].trim_start();
    }

    if !remaining.is_empty() {
        pieces.push(remaining.to_string());
    }

    pieces
}

fn tail_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    let start = text
        .char_indices()
        .nth(count - n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &text[start..]
}

/// SHA-256 of a passage's text, hex encoded.
pub fn passage_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_passage(index: usize, text: &str) -> Passage {
    Passage {
        chunk_index: index,
        text: text.to_string(),
        hash: passage_hash(text),
    }
}
