//! Vector index manager.
//!
//! A flat inner-product index over L2-normalized child-chunk embeddings,
//! with a parallel metadata list keyed by position. The index and its
//! metadata are two co-located artifacts (`vectors.bin` + `metadata.json`)
//! that are always written together and loaded together; loading one
//! without the other is a fatal startup error, as is any length mismatch
//! between them.
//!
//! Parents are categorically excluded — only child chunks are ever added.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

use crate::embedding::Embedder;

pub const INDEX_FILE: &str = "vectors.bin";
pub const METADATA_FILE: &str = "metadata.json";

/// Per-vector metadata, stored in the same order as the index positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub chunk_id: String,
    pub parent_chunk_id: Option<String>,
    pub section: Option<String>,
    pub document_type: String,
    pub title: Option<String>,
}

pub struct VectorIndex {
    dims: usize,
    /// Flat row-major storage, `meta.len() * dims` floats.
    vectors: Vec<f32>,
    meta: Vec<ChunkMeta>,
    ids: HashSet<String>,
}

impl VectorIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            vectors: Vec::new(),
            meta: Vec::new(),
            ids: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.ids.contains(chunk_id)
    }

    /// Append an embedding. The vector is L2-normalized in place so search
    /// reduces to an inner product.
    pub fn add(&mut self, meta: ChunkMeta, mut vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dims {
            bail!(
                "vector for {} has {} dims, index expects {}",
                meta.chunk_id,
                vector.len(),
                self.dims
            );
        }
        if !normalize(&mut vector) {
            bail!("vector for {} has zero norm", meta.chunk_id);
        }

        self.ids.insert(meta.chunk_id.clone());
        self.vectors.extend_from_slice(&vector);
        self.meta.push(meta);
        Ok(())
    }

    /// Cosine search over the whole index. Results below `min_similarity`
    /// are excluded entirely, not down-ranked.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<(ChunkMeta, f32)>> {
        if query.len() != self.dims {
            bail!(
                "query vector has {} dims, index expects {}",
                query.len(),
                self.dims
            );
        }
        let mut normalized = query.to_vec();
        if !normalize(&mut normalized) {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dims)
            .enumerate()
            .map(|(i, row)| {
                let dot: f32 = row.iter().zip(normalized.iter()).map(|(a, b)| a * b).sum();
                (i, dot)
            })
            .filter(|(_, score)| *score >= min_similarity)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| (self.meta[i].clone(), score))
            .collect())
    }

    /// Write both artifacts. They are only ever written as a pair.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;

        let index_path = dir.join(INDEX_FILE);
        let mut file = std::fs::File::create(&index_path)
            .with_context(|| format!("creating {}", index_path.display()))?;
        file.write_all(&(self.dims as u32).to_le_bytes())?;
        file.write_all(&(self.meta.len() as u32).to_le_bytes())?;
        let mut bytes = Vec::with_capacity(self.vectors.len() * 4);
        for v in &self.vectors {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        file.write_all(&bytes)?;
        file.flush()?;

        let metadata_path = dir.join(METADATA_FILE);
        let json = serde_json::to_string(&self.meta)?;
        std::fs::write(&metadata_path, json)
            .with_context(|| format!("writing {}", metadata_path.display()))?;

        info!(vectors = self.meta.len(), dir = %dir.display(), "saved vector index");
        Ok(())
    }

    /// Load the paired artifacts. Returns `Ok(None)` when neither exists
    /// yet; a lone artifact or a length/dimension mismatch is an error.
    pub fn load(dir: &Path, expected_dims: usize) -> Result<Option<Self>> {
        let index_path = dir.join(INDEX_FILE);
        let metadata_path = dir.join(METADATA_FILE);

        match (index_path.exists(), metadata_path.exists()) {
            (false, false) => return Ok(None),
            (true, true) => {}
            (true, false) => bail!(
                "vector index at {} has no metadata file — refusing to load a partial index",
                dir.display()
            ),
            (false, true) => bail!(
                "index metadata at {} has no vector file — refusing to load a partial index",
                dir.display()
            ),
        }

        let mut file = std::fs::File::open(&index_path)
            .with_context(|| format!("opening {}", index_path.display()))?;
        let mut header = [0u8; 8];
        file.read_exact(&mut header)?;
        let dims = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let count = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

        if dims != expected_dims {
            bail!(
                "vector index was built with {} dims but the deployment is configured for {}",
                dims,
                expected_dims
            );
        }

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        if bytes.len() != count * dims * 4 {
            bail!("vector file is truncated: {} bytes for {} vectors", bytes.len(), count);
        }
        let vectors: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let json = std::fs::read_to_string(&metadata_path)
            .with_context(|| format!("reading {}", metadata_path.display()))?;
        let meta: Vec<ChunkMeta> = serde_json::from_str(&json)?;

        if meta.len() != count {
            bail!(
                "index and metadata are out of step: {} vectors, {} metadata entries",
                count,
                meta.len()
            );
        }

        let ids = meta.iter().map(|m| m.chunk_id.clone()).collect();
        info!(vectors = count, dir = %dir.display(), "loaded vector index");
        Ok(Some(Self {
            dims,
            vectors,
            meta,
            ids,
        }))
    }
}

/// L2-normalize in place. Returns `false` for zero-norm vectors.
pub fn normalize(vector: &mut [f32]) -> bool {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return false;
    }
    for v in vector.iter_mut() {
        *v /= norm;
    }
    true
}

/// Embed a child chunk and append it to the index. Returns `false` when the
/// chunk is already indexed.
pub async fn embed_and_add(
    index: &mut VectorIndex,
    embedder: &dyn Embedder,
    meta: ChunkMeta,
    text: &str,
) -> Result<bool> {
    if index.contains(&meta.chunk_id) {
        return Ok(false);
    }
    let vector = embedder.embed(text).await?;
    index.add(meta, vector)?;
    Ok(true)
}

/// Embed a query and search the index.
pub async fn search_index(
    index: &VectorIndex,
    embedder: &dyn Embedder,
    query: &str,
    top_k: usize,
    min_similarity: f32,
) -> Result<Vec<(ChunkMeta, f32)>> {
    let vector = embedder.embed(query).await?;
    index.search(&vector, top_k, min_similarity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str) -> ChunkMeta {
        ChunkMeta {
            chunk_id: id.to_string(),
            parent_chunk_id: Some("parent".to_string()),
            section: Some("045".to_string()),
            document_type: "act".to_string(),
            title: None,
        }
    }

    #[test]
    fn add_and_search_ranks_by_similarity() {
        let mut index = VectorIndex::new(3);
        index.add(meta("a"), vec![1.0, 0.0, 0.0]).unwrap();
        index.add(meta("b"), vec![0.9, 0.1, 0.0]).unwrap();
        index.add(meta("c"), vec![0.0, 0.0, 1.0]).unwrap();

        let hits = index.search(&[1.0, 0.0, 0.0], 10, 0.5).unwrap();
        let ids: Vec<&str> = hits.iter().map(|(m, _)| m.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!((hits[0].1 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn sub_threshold_hits_are_excluded() {
        let mut index = VectorIndex::new(2);
        index.add(meta("near"), vec![1.0, 0.0]).unwrap();
        index.add(meta("far"), vec![0.0, 1.0]).unwrap();

        let hits = index.search(&[1.0, 0.3], 10, 0.5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.chunk_id, "near");
    }

    #[test]
    fn zero_norm_vector_is_rejected() {
        let mut index = VectorIndex::new(2);
        assert!(index.add(meta("z"), vec![0.0, 0.0]).is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn wrong_dims_rejected() {
        let mut index = VectorIndex::new(4);
        assert!(index.add(meta("x"), vec![1.0, 0.0]).is_err());
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = VectorIndex::new(3);
        index.add(meta("a"), vec![1.0, 2.0, 3.0]).unwrap();
        index.add(meta("b"), vec![-1.0, 0.5, 0.0]).unwrap();
        index.save(dir.path()).unwrap();

        let loaded = VectorIndex::load(dir.path(), 3).unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains("a"));
        assert!(loaded.contains("b"));

        let hits = loaded.search(&[1.0, 2.0, 3.0], 1, 0.5).unwrap();
        assert_eq!(hits[0].0.chunk_id, "a");
    }

    #[test]
    fn missing_index_dir_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(VectorIndex::load(dir.path(), 3).unwrap().is_none());
    }

    #[test]
    fn lone_artifact_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(METADATA_FILE), "[]").unwrap();
        assert!(VectorIndex::load(dir.path(), 3).is_err());
    }

    #[test]
    fn metadata_length_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = VectorIndex::new(2);
        index.add(meta("a"), vec![1.0, 0.0]).unwrap();
        index.save(dir.path()).unwrap();
        // Corrupt the pairing by appending a metadata entry.
        let json = serde_json::to_string(&vec![meta("a"), meta("ghost")]).unwrap();
        std::fs::write(dir.path().join(METADATA_FILE), json).unwrap();
        assert!(VectorIndex::load(dir.path(), 2).is_err());
    }

    #[test]
    fn dimension_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = VectorIndex::new(2);
        index.add(meta("a"), vec![1.0, 0.0]).unwrap();
        index.save(dir.path()).unwrap();
        assert!(VectorIndex::load(dir.path(), 3).is_err());
    }
}
