//! Vector-index management commands.
//!
//! `stx index build` embeds pending child chunks into the index and saves
//! the paired artifacts; `stx index status` reports row and vector counts.
//! Builds are incremental: chunks already marked embedded are never
//! re-processed, so re-running after an ingestion batch only touches new
//! children.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::index::{ChunkMeta, VectorIndex};
use crate::store::{normalize_section, ChunkStore};

pub struct IndexBuildReport {
    pub pending: usize,
    pub embedded: u64,
    pub failed: u64,
}

/// Embed all unembedded child chunks (optionally restricted to a section
/// subset) and save the index. Idempotent and safe to re-run; embedding
/// failures skip the chunk and leave it pending.
pub async fn run_index_build(
    config: &Config,
    store: &ChunkStore,
    index: Arc<AsyncMutex<VectorIndex>>,
    embedder: Arc<dyn Embedder>,
    sections: Option<Vec<String>>,
    limit: Option<usize>,
) -> Result<IndexBuildReport> {
    let width = config.corpus.section_width;
    let sections: Option<Vec<String>> =
        sections.map(|s| s.iter().map(|x| normalize_section(x, width)).collect());

    let pending = store
        .unembedded_children(sections.as_deref(), limit)
        .await?;

    let mut embedded = 0u64;
    let mut failed = 0u64;

    // Exclusive access for the whole add-and-save cycle.
    let mut guard = index.lock().await;

    for chunk in &pending {
        if guard.contains(&chunk.chunk_id) {
            store.mark_embedded(&chunk.chunk_id, embedder.model_name()).await?;
            continue;
        }
        let text = match chunk.text.as_deref() {
            Some(t) => t,
            None => continue,
        };

        match embedder.embed(text).await {
            Ok(vector) => {
                let meta = ChunkMeta {
                    chunk_id: chunk.chunk_id.clone(),
                    parent_chunk_id: chunk.parent_chunk_id.clone(),
                    section: chunk.section.clone(),
                    document_type: chunk.document_type.as_str().to_string(),
                    title: chunk.title.clone(),
                };
                guard.add(meta, vector)?;
                store.mark_embedded(&chunk.chunk_id, embedder.model_name()).await?;
                embedded += 1;
            }
            Err(e) => {
                warn!(chunk = %chunk.chunk_id, error = %e, "embedding failed, chunk left pending");
                failed += 1;
            }
        }
    }

    if embedded > 0 {
        guard.save(&config.index.dir)?;
    }

    Ok(IndexBuildReport {
        pending: pending.len(),
        embedded,
        failed,
    })
}

pub async fn run_index_status(
    config: &Config,
    store: &ChunkStore,
    index: &VectorIndex,
) -> Result<()> {
    let counts = store.counts().await?;

    println!("index status");
    println!("  parents:   {}", counts.parents);
    println!("  children:  {}", counts.children);
    println!("  edges:     {}", counts.edges);
    println!("  embedded:  {}", counts.embedded);
    println!("  vectors:   {}", index.len());
    println!("  dims:      {}", index.dims());
    println!("  artifacts: {}", config.index.dir.display());

    Ok(())
}
