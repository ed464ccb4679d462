//! Recursive separator text chunker.
//!
//! Text is split on the coarsest separator that occurs in it (paragraph
//! break, line break, sentence end, space), pieces that are still too long
//! are split again with the finer separators, and the empty separator cuts
//! between characters, so every chunk ends up at most `max_chars` characters
//! long. Adjacent small pieces are merged back together greedily; when a
//! chunk is emitted, its trailing pieces (up to `overlap_chars` characters)
//! are carried into the next one so context survives chunk boundaries.
//!
//! Lengths are measured in `char`s. Each chunk receives a deterministic UUID
//! (v5, derived from its index and text) plus a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Split `text` into chunks according to `config`.
///
/// Returns an empty vector for empty or whitespace-only input.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    split_text(text, config)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(i as i64, &piece))
        .collect()
}

/// The splitting step of [`chunk_text`], without ids or hashes.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let splitter = Splitter {
        max_chars: config.max_chars.max(1),
        overlap_chars: config.overlap_chars,
    };
    splitter.split(text, &config.separators)
}

struct Splitter {
    max_chars: usize,
    overlap_chars: usize,
}

impl Splitter {
    fn split(&self, text: &str, separators: &[String]) -> Vec<String> {
        // First separator present in the text; "" always matches.
        let (separator, rest) = match separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s.as_str()))
        {
            Some(pos) => (separators[pos].as_str(), &separators[pos + 1..]),
            None => ("", &[][..]),
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.max_chars {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if rest.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split(piece, rest));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    /// Greedily joins pieces into chunks of at most `max_chars`, keeping up
    /// to `overlap_chars` of trailing pieces as the start of the next chunk.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut out = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > self.max_chars && !window.is_empty() {
                push_trimmed(&mut out, &window);
                while !window.is_empty()
                    && (total > self.overlap_chars || total + len > self.max_chars)
                {
                    if let Some((_, first_len)) = window.pop_front() {
                        total -= first_len;
                    }
                }
            }

            window.push_back((piece, len));
            total += len;
        }

        if !window.is_empty() {
            push_trimmed(&mut out, &window);
        }
        out
    }
}

fn push_trimmed(out: &mut Vec<String>, window: &VecDeque<(&str, usize)>) {
    let joined: String = window.iter().map(|(p, _)| *p).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Splits on `separator`, attaching each separator to the piece after it.
/// An empty separator splits into single characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
            start = idx;
        }
    }
    pieces.push(&text[start..]);
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let id = Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}:{}", index, hash).as_bytes(),
    );

    Chunk {
        id: id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
