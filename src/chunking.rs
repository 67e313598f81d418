//! Hierarchical chunking engine.
//!
//! Splits a parent document's text into overlapping, linearly-ordered child
//! chunks. Sentences are accumulated greedily until the buffer reaches
//! `max_chars`; each emitted chunk seeds the next with its final
//! `overlap_chars` characters rounded outward to the preceding word
//! boundary, so no word is truncated across a chunk boundary.
//!
//! The splitter itself is a pure function (same text and parameters always
//! produce byte-identical chunk sequences); [`chunk_parent`] wires the
//! pieces into the store as child chunks plus `part_of`/`precedes` edges.

use tracing::debug;

use crate::governance::Relationship;
use crate::models::{ChunkRecord, RelationshipEdge};
use crate::store::{ChunkStore, StoreError};

/// Split text into sentences at terminal punctuation followed by
/// whitespace.
pub fn split_into_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut prev_terminal = false;

    for (idx, ch) in text.char_indices() {
        if prev_terminal && ch.is_whitespace() {
            let sentence = text[start..idx].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = idx;
        }
        prev_terminal = matches!(ch, '.' | '!' | '?');
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// The final `overlap_chars` characters of an emitted chunk, extended left
/// to the nearest preceding word boundary.
fn overlap_seed(chunk: &str, overlap_chars: usize) -> String {
    if overlap_chars == 0 {
        return String::new();
    }
    let total = chunk.chars().count();
    if total <= overlap_chars {
        return chunk.to_string();
    }
    let cut = chunk
        .char_indices()
        .nth(total - overlap_chars)
        .map(|(b, _)| b)
        .unwrap_or(0);
    let start = chunk[..cut].rfind(char::is_whitespace).unwrap_or(0);
    chunk[start..].trim_start().to_string()
}

/// Split `text` into overlapping child chunk texts. Text that fits within
/// `max_chars` produces no children at all — the parent remains the sole
/// retrievable unit.
pub fn split_into_children(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return Vec::new();
    }

    let mut children = Vec::new();
    let mut buffer = String::new();

    for sentence in split_into_sentences(text) {
        if buffer.is_empty() {
            buffer = sentence;
        } else {
            buffer.push(' ');
            buffer.push_str(&sentence);
        }

        if buffer.chars().count() >= max_chars {
            let seed = overlap_seed(&buffer, overlap_chars);
            children.push(std::mem::replace(&mut buffer, seed));
        }
    }

    // A trailing buffer that is nothing but the carried overlap is not a
    // new chunk.
    if buffer.trim().chars().count() > overlap_chars {
        children.push(buffer);
    }

    children
}

/// Chunk a parent's text into child chunks and write them, with lineage
/// edges, through the store.
///
/// Children inherit the parent's governance fields verbatim. Each child
/// gets a `part_of` edge to the parent and a `precedes` edge from its
/// predecessor. A missing parent aborts the whole operation with no
/// children written. Returns the ordered list of new child chunk IDs.
pub async fn chunk_parent(
    store: &ChunkStore,
    parent_chunk_id: &str,
    max_chars: usize,
    overlap_chars: usize,
) -> Result<Vec<String>, StoreError> {
    let parent = store
        .get(parent_chunk_id)
        .await?
        .ok_or_else(|| StoreError::NotFound(parent_chunk_id.to_string()))?;

    let text = match parent.text.as_deref() {
        Some(t) if !t.trim().is_empty() => t,
        _ => return Ok(Vec::new()),
    };

    let pieces = split_into_children(text, max_chars, overlap_chars);
    debug!(parent = parent_chunk_id, children = pieces.len(), "chunked parent");

    let mut child_ids = Vec::with_capacity(pieces.len());
    let mut previous: Option<String> = None;

    for (i, piece) in pieces.into_iter().enumerate() {
        let child = ChunkRecord::child_of(&parent, i + 1, piece);
        store.insert_chunk(&child).await?;

        store
            .insert_relationship(&RelationshipEdge {
                from_chunk_id: child.chunk_id.clone(),
                to_chunk_id: parent.chunk_id.clone(),
                relationship: Relationship::PartOf,
                confidence: 1.0,
            })
            .await?;

        if let Some(prev) = &previous {
            store
                .insert_relationship(&RelationshipEdge {
                    from_chunk_id: prev.clone(),
                    to_chunk_id: child.chunk_id.clone(),
                    relationship: Relationship::Precedes,
                    confidence: 1.0,
                })
                .await?;
        }

        previous = Some(child.chunk_id.clone());
        child_ids.push(child.chunk_id);
    }

    Ok(child_ids)
}
