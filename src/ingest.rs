//! Ingestion pipeline orchestration.
//!
//! Scans the raw corpus tree, then runs each discovered document through
//! the full per-document pipeline — parse → create parent → type
//! relationship → reference extraction → chunking → embed+index — on a
//! bounded worker pool. One document's failure never aborts the batch; it
//! is recorded and reported at the end.
//!
//! Re-running ingestion is idempotent: chunk writes upsert by structured
//! ID, edges deduplicate on their full tuple, and a content-hash probe
//! skips documents whose parsed text is already in the store.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::chunking;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::governance::{self, DocumentType};
use crate::index::{ChunkMeta, VectorIndex};
use crate::models::{ChunkRecord, RelationshipEdge};
use crate::parser::DocumentParser;
use crate::refextract;
use crate::store::{normalize_section, ChunkStore, StoreError, MIN_EMBED_CHARS};

/// Parsed text shorter than this is treated as an empty document.
const MIN_DOCUMENT_CHARS: usize = 10;

static SECTION_COMPONENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"section_(\d+)").expect("pattern compiles"));

/// One source file discovered in the corpus tree, with metadata read off
/// the folder structure (`.../section_045/circulars/foo.txt`).
#[derive(Debug, Clone)]
pub struct DiscoveredDocument {
    pub path: PathBuf,
    pub section: Option<String>,
    pub document_type: DocumentType,
    pub file_ext: String,
    pub title: String,
}

/// Walk the corpus root and map folder structure to document metadata.
/// Deterministically ordered so variant counters are stable across runs.
pub fn scan_corpus(root: &Path, section_width: usize) -> Result<Vec<DiscoveredDocument>> {
    if !root.exists() {
        anyhow::bail!("corpus root does not exist: {}", root.display());
    }

    let include = build_globset(&["**/*.txt".to_string(), "**/*.md".to_string()])?;

    let mut documents = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if !include.is_match(relative.to_string_lossy().as_ref()) {
            continue;
        }

        let path_str = path.to_string_lossy();
        let section = SECTION_COMPONENT
            .captures(&path_str)
            .map(|c| normalize_section(&c[1], section_width));
        let document_type = document_type_from_path(path);
        let file_ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "txt".to_string());
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        documents.push(DiscoveredDocument {
            path: path.to_path_buf(),
            section,
            document_type,
            file_ext,
            title,
        });
    }

    documents.sort_by(|a, b| {
        a.section
            .cmp(&b.section)
            .then_with(|| a.document_type.as_str().cmp(b.document_type.as_str()))
            .then_with(|| a.path.cmp(&b.path))
    });
    Ok(documents)
}

fn document_type_from_path(path: &Path) -> DocumentType {
    for component in path.components().rev() {
        let name = component.as_os_str().to_string_lossy().to_lowercase();
        let parsed: DocumentType = name.parse().unwrap_or(DocumentType::Other);
        if parsed != DocumentType::Other {
            return parsed;
        }
    }
    DocumentType::Other
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Structured parent chunk ID:
/// `{statute_code}_{type}_s{SECTION}[_{variant}]`.
pub fn structured_chunk_id(
    statute_code: &str,
    document_type: DocumentType,
    section: Option<&str>,
    variant: Option<&str>,
) -> String {
    let mut parts = vec![statute_code.to_string(), document_type.as_str().to_string()];
    if let Some(section) = section {
        parts.push(format!("s{}", section));
    }
    if let Some(variant) = variant {
        parts.push(variant.to_string());
    }
    parts.join("_")
}

#[derive(Debug, Clone)]
pub struct FailedDocument {
    pub document: String,
    pub error: String,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    succeeded: u64,
    skipped: u64,
    deduped: u64,
    chunks: u64,
    edges: u64,
    embedded: u64,
    embed_pending: u64,
}

/// Thread-safe ingestion statistics: one mutex for the counter group, one
/// for the failure list.
#[derive(Default)]
struct IngestStats {
    counters: Mutex<Counters>,
    failures: Mutex<Vec<FailedDocument>>,
}

impl IngestStats {
    fn with<F: FnOnce(&mut Counters)>(&self, f: F) {
        let mut guard = self.counters.lock().expect("stats mutex poisoned");
        f(&mut guard);
    }

    fn record_failure(&self, document: String, error: String) {
        let mut guard = self.failures.lock().expect("stats mutex poisoned");
        guard.push(FailedDocument { document, error });
    }
}

#[derive(Debug)]
pub struct IngestReport {
    pub total: usize,
    pub succeeded: u64,
    pub skipped: u64,
    pub deduped: u64,
    pub chunks_created: u64,
    pub edges_created: u64,
    pub embedded: u64,
    pub embed_pending: u64,
    pub failed: Vec<FailedDocument>,
}

pub struct IngestOptions {
    pub sections: Option<Vec<String>>,
    pub workers: usize,
    pub limit: Option<usize>,
    pub dry_run: bool,
}

/// Run the full ingestion batch.
pub async fn run_ingest(
    config: &Config,
    store: ChunkStore,
    index: Arc<AsyncMutex<VectorIndex>>,
    embedder: Arc<dyn Embedder>,
    parser: Arc<dyn DocumentParser>,
    options: IngestOptions,
) -> Result<IngestReport> {
    let width = config.corpus.section_width;
    let mut documents = scan_corpus(&config.corpus.root, width)?;

    if let Some(sections) = &options.sections {
        let wanted: Vec<String> = sections.iter().map(|s| normalize_section(s, width)).collect();
        documents.retain(|d| d.section.as_deref().is_some_and(|s| wanted.iter().any(|w| w == s)));
    }
    if let Some(limit) = options.limit {
        documents.truncate(limit);
    }

    if options.dry_run {
        let mut estimated_chunks = 0usize;
        for doc in &documents {
            if let Ok(parsed) = parser.parse(&doc.path) {
                estimated_chunks += chunking::split_into_children(
                    &parsed.text,
                    config.chunking.max_chars,
                    config.chunking.overlap_chars,
                )
                .len();
            }
        }
        return Ok(IngestReport {
            total: documents.len(),
            succeeded: 0,
            skipped: 0,
            deduped: 0,
            chunks_created: estimated_chunks as u64,
            edges_created: 0,
            embedded: 0,
            embed_pending: 0,
            failed: Vec::new(),
        });
    }

    info!(documents = documents.len(), workers = options.workers, "starting ingestion batch");

    let stats = Arc::new(IngestStats::default());
    let variant_counters: Arc<Mutex<HashMap<String, u32>>> = Arc::new(Mutex::new(HashMap::new()));
    let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
    let total = documents.len();

    let mut handles = Vec::with_capacity(total);
    for doc in documents {
        let permit_pool = Arc::clone(&semaphore);
        let store = store.clone();
        let index = Arc::clone(&index);
        let embedder = Arc::clone(&embedder);
        let parser = Arc::clone(&parser);
        let stats = Arc::clone(&stats);
        let counters = Arc::clone(&variant_counters);
        let config = config.clone();

        handles.push(tokio::spawn(async move {
            let _permit = permit_pool.acquire_owned().await;
            let document = doc.path.display().to_string();
            if let Err(e) =
                ingest_document(&config, &store, &index, embedder.as_ref(), parser.as_ref(), &counters, &stats, doc)
                    .await
            {
                warn!(document = %document, error = %e, "document ingestion failed");
                stats.record_failure(document, e.to_string());
            }
        }));
    }

    for handle in handles {
        // A panicking worker is a bug, but it must not take the batch down.
        if let Err(e) = handle.await {
            stats.record_failure("worker".to_string(), e.to_string());
        }
    }

    // Writers hold exclusive access across the add-and-save cycle.
    {
        let index = index.lock().await;
        if !index.is_empty() {
            index.save(&config.index.dir)?;
        }
    }

    let counters = *stats.counters.lock().expect("stats mutex poisoned");
    let failed = stats.failures.lock().expect("stats mutex poisoned").clone();

    Ok(IngestReport {
        total,
        succeeded: counters.succeeded,
        skipped: counters.skipped,
        deduped: counters.deduped,
        chunks_created: counters.chunks,
        edges_created: counters.edges,
        embedded: counters.embedded,
        embed_pending: counters.embed_pending,
        failed,
    })
}

#[allow(clippy::too_many_arguments)]
async fn ingest_document(
    config: &Config,
    store: &ChunkStore,
    index: &AsyncMutex<VectorIndex>,
    embedder: &dyn Embedder,
    parser: &dyn DocumentParser,
    variant_counters: &Mutex<HashMap<String, u32>>,
    stats: &IngestStats,
    doc: DiscoveredDocument,
) -> Result<()> {
    let parsed = parser.parse(&doc.path)?;
    let text = parsed.text.trim().to_string();
    if text.chars().count() < MIN_DOCUMENT_CHARS {
        stats.with(|c| c.skipped += 1);
        return Ok(());
    }

    let content_hash = hash_text(&text);

    // The counter increments for every parsed document, so variant labels
    // stay aligned with the deterministic scan order across re-runs.
    let variant = {
        let key = format!(
            "{}_{}",
            doc.section.as_deref().unwrap_or("nosec"),
            doc.document_type.as_str()
        );
        let mut guard = variant_counters.lock().expect("variant counter mutex poisoned");
        let n = guard.entry(key).and_modify(|n| *n += 1).or_insert(1);
        if *n == 1 {
            doc.file_ext.clone()
        } else {
            format!("{}{}", doc.file_ext, n)
        }
    };

    // Content-hash dedup: a second rendering of the same text (e.g. an
    // HTML and a TXT copy of one section) never becomes a second parent.
    if store
        .parent_with_content_hash(doc.document_type, doc.section.as_deref(), &content_hash)
        .await?
        .is_some()
    {
        stats.with(|c| c.deduped += 1);
        return Ok(());
    }

    let parent_id = structured_chunk_id(
        &config.corpus.statute_code,
        doc.document_type,
        doc.section.as_deref(),
        Some(&variant),
    );

    let parent = ChunkRecord::parent(
        parent_id.clone(),
        doc.document_type,
        doc.section.clone(),
        Some(doc.title.clone()),
    );
    store.insert_chunk(&parent).await?;
    store.attach_text(&parent_id, &text, Some(&content_hash)).await?;

    // Document-type relationship to the Act section it hangs off.
    if let (Some(relationship), Some(section)) = (
        governance::default_relationship(doc.document_type),
        doc.section.as_deref(),
    ) {
        if let Some(act_id) = store
            .parent_by_type_and_section(DocumentType::Act, section)
            .await?
        {
            let edge = RelationshipEdge {
                from_chunk_id: parent_id.clone(),
                to_chunk_id: act_id,
                relationship,
                confidence: 1.0,
            };
            match store.insert_relationship(&edge).await {
                Ok(true) => stats.with(|c| c.edges += 1),
                Ok(false) => {}
                Err(StoreError::EdgeRule(violation)) => {
                    warn!(%violation, "skipped default relationship");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // Cross-reference mining.
    let ref_stats = refextract::extract_and_link(
        store,
        &parent_id,
        &text,
        doc.section.as_deref(),
        config.extraction.min_confidence,
        config.corpus.section_width,
    )
    .await?;
    stats.with(|c| c.edges += ref_stats.created as u64);

    // Hierarchical chunking.
    let child_ids = chunking::chunk_parent(
        store,
        &parent_id,
        config.chunking.max_chars,
        config.chunking.overlap_chars,
    )
    .await?;
    stats.with(|c| c.chunks += child_ids.len() as u64);

    // Inline embedding of the new children. Failures skip the chunk and
    // leave it for the next `stx index build`.
    for child_id in &child_ids {
        let child = match store.get(child_id).await? {
            Some(c) => c,
            None => continue,
        };
        if !child.embedding_enabled {
            continue;
        }
        let child_text = match child.text.as_deref() {
            Some(t) if t.chars().count() > MIN_EMBED_CHARS => t.to_string(),
            _ => continue,
        };
        {
            let guard = index.lock().await;
            if guard.contains(child_id) {
                continue;
            }
        }

        match embedder.embed(&child_text).await {
            Ok(vector) => {
                let meta = ChunkMeta {
                    chunk_id: child.chunk_id.clone(),
                    parent_chunk_id: child.parent_chunk_id.clone(),
                    section: child.section.clone(),
                    document_type: child.document_type.as_str().to_string(),
                    title: child.title.clone(),
                };
                let mut guard = index.lock().await;
                guard.add(meta, vector)?;
                drop(guard);
                store.mark_embedded(child_id, embedder.model_name()).await?;
                stats.with(|c| c.embedded += 1);
            }
            Err(e) => {
                warn!(chunk = %child_id, error = %e, "embedding failed, chunk left pending");
                stats.with(|c| c.embed_pending += 1);
            }
        }
    }

    stats.with(|c| c.succeeded += 1);
    Ok(())
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
