//! End-to-end pipeline tests over a temporary SQLite database, with
//! deterministic stand-ins for the embedding and generation services.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Mutex as AsyncMutex;

use statute_harness::chunking;
use statute_harness::config::{
    ChunkingConfig, Config, CorpusConfig, DbConfig, EmbeddingConfig, ExtractionConfig,
    GenerationConfig, IndexConfig, IngestConfig, RetrievalConfig,
};
use statute_harness::db;
use statute_harness::embedding::Embedder;
use statute_harness::generation::Generator;
use statute_harness::governance::{DocumentType, Relationship};
use statute_harness::index::{ChunkMeta, VectorIndex};
use statute_harness::ingest::{self, IngestOptions};
use statute_harness::migrate;
use statute_harness::models::{ChunkRecord, RelationshipEdge, RetrievalOrigin};
use statute_harness::parser::PlainTextParser;
use statute_harness::query::{Orchestrator, QueryConfig, QueryOutcome};
use statute_harness::refextract;
use statute_harness::store::ChunkStore;

const DIMS: usize = 8;

/// Returns the same unit vector for every text, so every indexed chunk
/// matches every query with similarity 1.0. Counts calls so tests can
/// assert a flow bypassed the embedding service.
struct FakeEmbedder {
    calls: AtomicUsize,
}

impl FakeEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut v = vec![0.0f32; DIMS];
        v[0] = 1.0;
        Ok(v)
    }

    fn dims(&self) -> usize {
        DIMS
    }

    fn model_name(&self) -> &str {
        "fake-embedder"
    }
}

struct FakeGenerator;

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok("Generated answer based strictly on the supplied sources.".to_string())
    }
}

struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("generation timed out")
    }
}

struct Fixture {
    _tmp: TempDir,
    store: ChunkStore,
    index: Arc<AsyncMutex<VectorIndex>>,
    embedder: Arc<FakeEmbedder>,
}

async fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect_path(&tmp.path().join("governance.sqlite"))
        .await
        .unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    Fixture {
        _tmp: tmp,
        store: ChunkStore::new(pool),
        index: Arc::new(AsyncMutex::new(VectorIndex::new(DIMS))),
        embedder: Arc::new(FakeEmbedder::new()),
    }
}

fn orchestrator(fx: &Fixture, generator: Arc<dyn Generator>) -> Orchestrator {
    Orchestrator::new(
        fx.store.clone(),
        Arc::clone(&fx.index),
        fx.embedder.clone(),
        generator,
        QueryConfig {
            top_k: 15,
            min_similarity: 0.5,
            section_width: 3,
            definitions_section: "2".to_string(),
        },
    )
}

fn long_text(topic: &str, sentences: usize) -> String {
    (0..sentences)
        .map(|i| {
            format!(
                "Provision {} of this document addresses {} obligations in detail.",
                i, topic
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Create a parent, attach text, and chunk it.
async fn seed_parent(
    fx: &Fixture,
    chunk_id: &str,
    document_type: DocumentType,
    section: Option<&str>,
    text: &str,
) -> Vec<String> {
    let parent = ChunkRecord::parent(
        chunk_id.to_string(),
        document_type,
        section.map(|s| s.to_string()),
        Some(chunk_id.to_string()),
    );
    fx.store.insert_chunk(&parent).await.unwrap();
    fx.store.attach_text(chunk_id, text, None).await.unwrap();
    chunking::chunk_parent(&fx.store, chunk_id, 300, 50)
        .await
        .unwrap()
}

/// Push a chunk's children into the vector index directly.
async fn index_children(fx: &Fixture, child_ids: &[String]) {
    let mut index = fx.index.lock().await;
    for id in child_ids {
        let record = fx.store.get(id).await.unwrap().unwrap();
        let mut v = vec![0.0f32; DIMS];
        v[0] = 1.0;
        index
            .add(
                ChunkMeta {
                    chunk_id: record.chunk_id.clone(),
                    parent_chunk_id: record.parent_chunk_id.clone(),
                    section: record.section.clone(),
                    document_type: record.document_type.as_str().to_string(),
                    title: record.title.clone(),
                },
                v,
            )
            .unwrap();
    }
}

#[tokio::test]
async fn aggregate_chunk_write_round_trips() {
    let fx = fixture().await;
    let parent = ChunkRecord::parent(
        "ca2013_act_s045_txt".to_string(),
        DocumentType::Act,
        Some("045".to_string()),
        Some("Acceptance of deposits".to_string()),
    );
    fx.store.insert_chunk(&parent).await.unwrap();

    let loaded = fx.store.get("ca2013_act_s045_txt").await.unwrap().unwrap();
    assert_eq!(loaded.document_type, DocumentType::Act);
    assert_eq!(loaded.priority, 1);
    assert!(loaded.binding);
    assert!(loaded.refusal.can_answer_standalone);
    assert_eq!(loaded.section.as_deref(), Some("045"));

    // Upsert by primary key: writing again does not duplicate.
    fx.store.insert_chunk(&parent).await.unwrap();
    let counts = fx.store.counts().await.unwrap();
    assert_eq!(counts.parents, 1);
}

#[tokio::test]
async fn child_without_existing_parent_is_rejected() {
    let fx = fixture().await;
    let ghost_parent = ChunkRecord::parent(
        "ca2013_act_s001_txt".to_string(),
        DocumentType::Act,
        Some("001".to_string()),
        None,
    );
    let orphan = ChunkRecord::child_of(&ghost_parent, 1, "orphan text".to_string());
    assert!(fx.store.insert_chunk(&orphan).await.is_err());
}

#[tokio::test]
async fn semantic_edges_never_touch_children() {
    let fx = fixture().await;
    let children = seed_parent(
        &fx,
        "ca2013_circular_s045_txt",
        DocumentType::Circular,
        Some("045"),
        &long_text("deposit", 40),
    )
    .await;
    seed_parent(
        &fx,
        "ca2013_act_s045_txt",
        DocumentType::Act,
        Some("045"),
        "Short provision about deposits and repayment terms.",
    )
    .await;
    assert!(!children.is_empty());

    let bad = RelationshipEdge {
        from_chunk_id: children[0].clone(),
        to_chunk_id: "ca2013_act_s045_txt".to_string(),
        relationship: Relationship::Clarifies,
        confidence: 0.9,
    };
    assert!(fx.store.insert_relationship(&bad).await.is_err());
}

#[tokio::test]
async fn chunking_writes_lineage_and_is_idempotent() {
    let fx = fixture().await;
    let first = seed_parent(
        &fx,
        "ca2013_act_s073_txt",
        DocumentType::Act,
        Some("073"),
        &long_text("repayment", 60),
    )
    .await;
    assert!(first.len() > 1);
    assert_eq!(first[0], "ca2013_act_s073_txt_c1");

    let edges_after_first = fx.store.edge_count().await.unwrap();
    // part_of per child plus precedes between consecutive children.
    assert_eq!(edges_after_first, (2 * first.len() - 1) as u64);

    // Re-chunking the same text yields the same children and no new edges.
    let second = chunking::chunk_parent(&fx.store, "ca2013_act_s073_txt", 300, 50)
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(fx.store.edge_count().await.unwrap(), edges_after_first);

    let counts = fx.store.counts().await.unwrap();
    assert_eq!(counts.children, first.len() as u64);
}

#[tokio::test]
async fn reference_extraction_creates_no_duplicate_edges() {
    let fx = fixture().await;
    seed_parent(
        &fx,
        "ca2013_act_s045_txt",
        DocumentType::Act,
        Some("045"),
        "Acceptance of deposits by companies is regulated here.",
    )
    .await;
    seed_parent(
        &fx,
        "ca2013_circular_s073_txt",
        DocumentType::Circular,
        Some("073"),
        "Circular text placeholder.",
    )
    .await;

    let text = "This circular is issued pursuant to Section 45 of the Act.";
    let first = refextract::extract_and_link(
        &fx.store,
        "ca2013_circular_s073_txt",
        text,
        Some("073"),
        0.5,
        3,
    )
    .await
    .unwrap();
    assert_eq!(first.extracted, 1);
    assert_eq!(first.resolved, 1);
    assert_eq!(first.created, 1);
    assert_eq!(first.edges[0].relationship, Relationship::Implements);

    let second = refextract::extract_and_link(
        &fx.store,
        "ca2013_circular_s073_txt",
        text,
        Some("073"),
        0.5,
        3,
    )
    .await
    .unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(fx.store.edge_count().await.unwrap(), 1);
}

#[tokio::test]
async fn exact_section_query_separates_direct_from_supplementary() {
    let fx = fixture().await;
    seed_parent(
        &fx,
        "ca2013_act_s045_txt",
        DocumentType::Act,
        Some("045"),
        "A company may accept deposits from its members subject to conditions.",
    )
    .await;
    let circular_children = seed_parent(
        &fx,
        "ca2013_circular_s045_txt",
        DocumentType::Circular,
        Some("045"),
        &long_text("deposit clarification", 40),
    )
    .await;
    fx.store
        .insert_relationship(&RelationshipEdge {
            from_chunk_id: "ca2013_circular_s045_txt".to_string(),
            to_chunk_id: "ca2013_act_s045_txt".to_string(),
            relationship: Relationship::Implements,
            confidence: 1.0,
        })
        .await
        .unwrap();
    index_children(&fx, &circular_children).await;

    let orch = orchestrator(&fx, Arc::new(FakeGenerator));
    let outcome = orch.query("What does Section 45 say?").await.unwrap();

    match outcome {
        QueryOutcome::Answered {
            citations,
            direct_lookup,
            supplementary,
            ..
        } => {
            assert!(direct_lookup
                .iter()
                .any(|c| c.chunk_id == "ca2013_act_s045_txt"));
            let act_hit = direct_lookup
                .iter()
                .find(|c| c.chunk_id == "ca2013_act_s045_txt")
                .unwrap();
            assert_eq!(act_hit.similarity_score, 1.0);
            assert_eq!(act_hit.origin, RetrievalOrigin::DirectLookup);

            // The circular reaches the payload only through the
            // supplementary channel.
            assert!(direct_lookup
                .iter()
                .all(|c| c.document_type == DocumentType::Act));
            assert!(!supplementary.is_empty());
            assert!(supplementary
                .iter()
                .all(|c| c.chunk_id.starts_with("ca2013_circular_s045_txt")));
            assert!(citations.contains(&"Section 045".to_string()));
        }
        other => panic!("expected answer, got {:?}", other),
    }
}

#[tokio::test]
async fn section_lookup_treats_padded_forms_identically() {
    let fx = fixture().await;
    seed_parent(
        &fx,
        "ca2013_act_s002_txt",
        DocumentType::Act,
        Some("002"),
        "In this Act, company means a company incorporated under this Act.",
    )
    .await;

    let orch = orchestrator(&fx, Arc::new(FakeGenerator));
    let mut id_sets = Vec::new();
    for q in ["Section 2", "Section 02", "Section 002"] {
        match orch.query(q).await.unwrap() {
            QueryOutcome::Answered { direct_lookup, .. } => {
                let mut ids: Vec<String> =
                    direct_lookup.iter().map(|c| c.chunk_id.clone()).collect();
                ids.sort();
                id_sets.push(ids);
            }
            other => panic!("expected answer for {:?}, got {:?}", q, other),
        }
    }
    assert_eq!(id_sets[0], id_sets[1]);
    assert_eq!(id_sets[1], id_sets[2]);
}

#[tokio::test]
async fn definition_query_bypasses_vector_search() {
    let fx = fixture().await;
    seed_parent(
        &fx,
        "ca2013_act_s002_txt",
        DocumentType::Act,
        Some("002"),
        "In this Act, unless the context otherwise requires, director means a director appointed to the Board of a company.",
    )
    .await;

    let orch = orchestrator(&fx, Arc::new(FakeGenerator));
    let outcome = orch
        .query("What is the definition of director?")
        .await
        .unwrap();

    match outcome {
        QueryOutcome::Answered {
            direct_lookup,
            supplementary,
            ..
        } => {
            assert_eq!(direct_lookup.len(), 1);
            assert_eq!(direct_lookup[0].chunk_id, "ca2013_act_s002_txt");
            assert_eq!(direct_lookup[0].similarity_score, 1.0);
            assert_eq!(direct_lookup[0].origin, RetrievalOrigin::Definition);
            assert!(supplementary.is_empty());
        }
        other => panic!("expected answer, got {:?}", other),
    }

    // Definitional matches never touch the embedding service.
    assert_eq!(fx.embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_parent_law_forces_refusal() {
    let fx = fixture().await;
    // A tier-2 circular anchored to a section whose Act is absent.
    let children = seed_parent(
        &fx,
        "ca2013_circular_s050_txt",
        DocumentType::Circular,
        Some("050"),
        &long_text("deposit insurance", 40),
    )
    .await;
    index_children(&fx, &children).await;

    let orch = orchestrator(&fx, Arc::new(FakeGenerator));
    let outcome = orch
        .query("What are the requirements for deposit insurance?")
        .await
        .unwrap();

    match outcome {
        QueryOutcome::Refused {
            reason,
            missing_parents,
        } => {
            assert!(reason.contains("primary legislation"));
            assert_eq!(missing_parents, vec!["050".to_string()]);
        }
        other => panic!("expected refusal, got {:?}", other),
    }
}

#[tokio::test]
async fn refusal_gate_pulls_resolved_parent_into_context() {
    let fx = fixture().await;
    seed_parent(
        &fx,
        "ca2013_act_s045_txt",
        DocumentType::Act,
        Some("045"),
        "A company may accept deposits from its members subject to conditions.",
    )
    .await;
    let children = seed_parent(
        &fx,
        "ca2013_circular_s045_txt",
        DocumentType::Circular,
        Some("045"),
        &long_text("deposit clarification", 40),
    )
    .await;
    index_children(&fx, &children).await;

    let orch = orchestrator(&fx, Arc::new(FakeGenerator));
    // No section named, so the circular children arrive via vector search;
    // the gate must pull the Act parent into the context.
    let outcome = orch
        .query("How are deposit clarifications applied?")
        .await
        .unwrap();

    match outcome {
        QueryOutcome::Answered {
            direct_lookup,
            citations,
            ..
        } => {
            assert!(direct_lookup
                .iter()
                .any(|c| c.chunk_id == "ca2013_act_s045_txt"));
            assert!(citations.contains(&"Section 045".to_string()));
        }
        other => panic!("expected answer, got {:?}", other),
    }
}

#[tokio::test]
async fn failed_generation_degrades_with_citations() {
    let fx = fixture().await;
    seed_parent(
        &fx,
        "ca2013_act_s045_txt",
        DocumentType::Act,
        Some("045"),
        "A company may accept deposits from its members subject to conditions.",
    )
    .await;

    let orch = orchestrator(&fx, Arc::new(FailingGenerator));
    match orch.query("What does Section 45 say?").await.unwrap() {
        QueryOutcome::Answered {
            answer, citations, ..
        } => {
            assert!(answer.contains("could not be generated"));
            assert_eq!(citations, vec!["Section 045".to_string()]);
        }
        other => panic!("expected degraded answer, got {:?}", other),
    }
}

#[tokio::test]
async fn unknown_section_returns_no_results() {
    let fx = fixture().await;
    let orch = orchestrator(&fx, Arc::new(FakeGenerator));
    match orch.query("What does Section 999 say?").await.unwrap() {
        QueryOutcome::NoResults => {}
        other => panic!("expected no results, got {:?}", other),
    }
}

#[tokio::test]
async fn purge_cascades_to_children_and_edges() {
    let fx = fixture().await;
    let children = seed_parent(
        &fx,
        "ca2013_act_s073_txt",
        DocumentType::Act,
        Some("073"),
        &long_text("repayment", 60),
    )
    .await;
    assert!(!children.is_empty());
    assert!(fx.store.edge_count().await.unwrap() > 0);

    let report = fx.store.purge("ca2013_act_s073_txt").await.unwrap();
    assert_eq!(report.chunks_deleted, (children.len() + 1) as u64);

    assert!(fx.store.get("ca2013_act_s073_txt").await.unwrap().is_none());
    assert!(fx.store.get(&children[0]).await.unwrap().is_none());
    assert_eq!(fx.store.edge_count().await.unwrap(), 0);

    // Idempotent: purging again deletes nothing and does not error.
    let again = fx.store.purge("ca2013_act_s073_txt").await.unwrap();
    assert_eq!(again.chunks_deleted, 0);
}

fn ingest_config(root: PathBuf, tmp: &TempDir) -> Config {
    Config {
        db: DbConfig {
            path: tmp.path().join("governance.sqlite"),
        },
        corpus: CorpusConfig {
            statute_code: "ca2013".to_string(),
            root,
            section_width: 3,
            definitions_section: "2".to_string(),
        },
        chunking: ChunkingConfig {
            max_chars: 300,
            overlap_chars: 50,
        },
        extraction: ExtractionConfig {
            min_confidence: 0.5,
        },
        index: IndexConfig {
            dir: tmp.path().join("vector_store"),
        },
        embedding: EmbeddingConfig::default(),
        generation: GenerationConfig::default(),
        retrieval: RetrievalConfig::default(),
        ingest: IngestConfig { workers: 1 },
    }
}

#[tokio::test]
async fn ingestion_is_idempotent_across_runs() {
    let tmp = TempDir::new().unwrap();
    let raw = tmp.path().join("raw");
    std::fs::create_dir_all(raw.join("section_045/act")).unwrap();
    std::fs::create_dir_all(raw.join("section_045/circulars")).unwrap();
    std::fs::write(
        raw.join("section_045/act/acceptance_of_deposits.txt"),
        long_text("deposit acceptance", 60),
    )
    .unwrap();
    std::fs::write(
        raw.join("section_045/circulars/clarification_2014.txt"),
        format!(
            "{} This circular is issued pursuant to Section 45 of the Act.",
            long_text("clarification", 40)
        ),
    )
    .unwrap();

    let cfg = ingest_config(raw, &tmp);
    let pool = db::connect_path(&cfg.db.path).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    let store = ChunkStore::new(pool);

    let run = |cfg: Config, store: ChunkStore| async move {
        let index = Arc::new(AsyncMutex::new(VectorIndex::new(DIMS)));
        ingest::run_ingest(
            &cfg,
            store,
            index,
            Arc::new(FakeEmbedder::new()),
            Arc::new(PlainTextParser),
            // One worker keeps the act-before-circular ordering the edge
            // assertions depend on.
            IngestOptions {
                sections: None,
                workers: 1,
                limit: None,
                dry_run: false,
            },
        )
        .await
        .unwrap()
    };

    let first = run(cfg.clone(), store.clone()).await;
    assert_eq!(first.total, 2);
    assert_eq!(first.succeeded, 2);
    assert!(first.chunks_created > 0);
    assert!(first.embedded > 0);

    let counts_after_first = store.counts().await.unwrap();
    let edges_after_first = store.counts().await.unwrap().edges;

    // The circular picked up both its type relationship and the extracted
    // "pursuant to Section 45" edge against the Act parent.
    let circular_edges = store
        .relationships_from("ca2013_circular_s045_txt")
        .await
        .unwrap();
    assert!(circular_edges
        .iter()
        .any(|e| e.relationship == Relationship::Implements
            && e.to_chunk_id == "ca2013_act_s045_txt"));

    // Second run: identical sources dedup by content hash; nothing grows.
    let second = run(cfg.clone(), store.clone()).await;
    assert_eq!(second.deduped, 2);
    assert_eq!(second.succeeded, 0);

    let counts_after_second = store.counts().await.unwrap();
    assert_eq!(counts_after_first.parents, counts_after_second.parents);
    assert_eq!(counts_after_first.children, counts_after_second.children);
    assert_eq!(edges_after_first, counts_after_second.edges);
}
