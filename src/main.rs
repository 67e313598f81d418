//! # Statute Harness CLI (`stx`)
//!
//! The `stx` binary drives the governed statutory corpus: database
//! initialization, corpus ingestion, vector-index management, reference
//! extraction, and governed question answering.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `stx init` | Create the SQLite database and run schema migrations |
//! | `stx ingest` | Ingest the raw corpus tree (parse → chunk → link → embed) |
//! | `stx query "<question>"` | Ask a question under governance rules |
//! | `stx get <chunk_id>` | Inspect one chunk, its edges, and its children |
//! | `stx index build` | Embed pending child chunks into the vector index |
//! | `stx index status` | Report store and index counts |
//! | `stx extract <section>` | Re-run reference extraction over a section |
//! | `stx purge <chunk_id>` | Purge a parent document and everything under it |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use statute_harness::config;
use statute_harness::db;
use statute_harness::embed_cmd;
use statute_harness::embedding::HttpEmbedder;
use statute_harness::generation::HttpGenerator;
use statute_harness::get;
use statute_harness::index::VectorIndex;
use statute_harness::ingest::{self, IngestOptions};
use statute_harness::migrate;
use statute_harness::models::ChunkRole;
use statute_harness::parser::PlainTextParser;
use statute_harness::query::{Orchestrator, QueryConfig, QueryOutcome};
use statute_harness::refextract;
use statute_harness::store::{normalize_section, ChunkStore};

/// Statute Harness — a governance-aware ingestion and retrieval framework
/// for statutory corpora.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "stx",
    about = "Statute Harness — governed ingestion and retrieval for statutory corpora",
    version,
    long_about = "Statute Harness ingests a primary Act and its subordinate material \
    (rules, notifications, circulars, forms, commentary), chunks and embeds the text, \
    mines citation edges into a relationship graph, and answers questions through a \
    hybrid retrieval orchestrator that enforces legal refusal policy."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/stx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest the raw corpus tree.
    ///
    /// Each document runs the full pipeline: parse, create the parent
    /// chunk, attach relationships, extract references, chunk, and embed.
    /// One document's failure is recorded without aborting the batch.
    Ingest {
        /// Restrict ingestion to these section numbers.
        #[arg(long, num_args = 1..)]
        sections: Option<Vec<String>>,

        /// Number of parallel ingestion workers (overrides config).
        #[arg(long)]
        workers: Option<usize>,

        /// Maximum number of documents to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Show document and chunk counts without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Ask a question and get a cited, governance-checked answer.
    Query {
        /// The question.
        question: String,

        /// Maximum number of chunks retrieved per channel.
        #[arg(long)]
        top_k: Option<usize>,

        /// Emit the full result payload as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Inspect a chunk by its ID.
    Get {
        /// Chunk ID (e.g. `ca2013_act_s045_txt`).
        chunk_id: String,
    },

    /// Manage the vector index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Re-run reference extraction over every parent document in a section.
    Extract {
        /// Section number (any zero-padding accepted).
        section: String,

        /// Minimum confidence for edge creation (overrides config).
        #[arg(long)]
        min_confidence: Option<f64>,
    },

    /// Purge a parent document, its children, and all touching edges.
    Purge {
        /// Parent chunk ID.
        chunk_id: String,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Embed child chunks not yet in the index, then save both artifacts.
    Build {
        /// Restrict to these section numbers.
        #[arg(long, num_args = 1..)]
        sections: Option<Vec<String>>,

        /// Maximum number of chunks to embed in this run.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show store and index counts.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }

        Commands::Ingest {
            sections,
            workers,
            limit,
            dry_run,
        } => {
            let pool = db::connect(&cfg).await?;
            let store = ChunkStore::new(pool);
            let index = Arc::new(AsyncMutex::new(load_index(&cfg)?));
            let embedder = Arc::new(HttpEmbedder::new(&cfg.embedding)?);
            let parser = Arc::new(PlainTextParser);

            let report = ingest::run_ingest(
                &cfg,
                store,
                index,
                embedder,
                parser,
                IngestOptions {
                    sections,
                    workers: workers.unwrap_or(cfg.ingest.workers),
                    limit,
                    dry_run,
                },
            )
            .await?;

            if dry_run {
                println!("ingest (dry-run)");
                println!("  documents found: {}", report.total);
                println!("  estimated chunks: {}", report.chunks_created);
                return Ok(());
            }

            println!("ingest");
            println!("  documents:        {}", report.total);
            println!("  succeeded:        {}", report.succeeded);
            println!("  skipped:          {}", report.skipped);
            println!("  deduplicated:     {}", report.deduped);
            println!("  chunks written:   {}", report.chunks_created);
            println!("  edges created:    {}", report.edges_created);
            println!("  embedded:         {}", report.embedded);
            println!("  embed pending:    {}", report.embed_pending);
            if !report.failed.is_empty() {
                println!("  failed:           {}", report.failed.len());
                for failure in &report.failed {
                    println!("    {}: {}", failure.document, failure.error);
                }
            }
            println!("ok");
        }

        Commands::Query {
            question,
            top_k,
            json,
        } => {
            let pool = db::connect(&cfg).await?;
            let store = ChunkStore::new(pool);
            let index = Arc::new(AsyncMutex::new(load_index(&cfg)?));
            let embedder = Arc::new(HttpEmbedder::new(&cfg.embedding)?);
            let generator = Arc::new(HttpGenerator::new(&cfg.generation)?);

            let orchestrator = Orchestrator::new(
                store,
                index,
                embedder,
                generator,
                QueryConfig {
                    top_k: top_k.unwrap_or(cfg.retrieval.top_k),
                    min_similarity: cfg.retrieval.min_similarity,
                    section_width: cfg.corpus.section_width,
                    definitions_section: cfg.corpus.definitions_section.clone(),
                },
            );

            let outcome = orchestrator.query(&question).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                return Ok(());
            }

            match outcome {
                QueryOutcome::Answered {
                    answer,
                    citations,
                    direct_lookup,
                    supplementary,
                } => {
                    println!("{}", answer);
                    println!();
                    if !citations.is_empty() {
                        println!("Citations: {}", citations.join(", "));
                    }
                    println!("Sources ({} direct):", direct_lookup.len());
                    for chunk in &direct_lookup {
                        println!(
                            "  [{:.2}] {} ({})",
                            chunk.similarity_score,
                            chunk.chunk_id,
                            chunk.document_type
                        );
                    }
                    if !supplementary.is_empty() {
                        println!("Supplementary ({}):", supplementary.len());
                        for chunk in &supplementary {
                            println!(
                                "  [{:.2}] {} ({})",
                                chunk.similarity_score,
                                chunk.chunk_id,
                                chunk.document_type
                            );
                        }
                    }
                }
                QueryOutcome::Refused {
                    reason,
                    missing_parents,
                } => {
                    println!("Refused: {}", reason);
                    if !missing_parents.is_empty() {
                        println!("Missing primary legislation for: {}", missing_parents.join(", "));
                    }
                }
                QueryOutcome::NoResults => {
                    println!("No results.");
                }
            }
        }

        Commands::Get { chunk_id } => {
            let pool = db::connect(&cfg).await?;
            let store = ChunkStore::new(pool);
            get::run_get(&store, &chunk_id).await?;
        }

        Commands::Index { action } => match action {
            IndexAction::Build { sections, limit } => {
                let pool = db::connect(&cfg).await?;
                let store = ChunkStore::new(pool);
                let index = Arc::new(AsyncMutex::new(load_index(&cfg)?));
                let embedder = Arc::new(HttpEmbedder::new(&cfg.embedding)?);

                let report = embed_cmd::run_index_build(
                    &cfg,
                    &store,
                    index,
                    embedder,
                    sections,
                    limit,
                )
                .await?;

                println!("index build");
                println!("  pending:  {}", report.pending);
                println!("  embedded: {}", report.embedded);
                println!("  failed:   {}", report.failed);
            }
            IndexAction::Status => {
                let pool = db::connect(&cfg).await?;
                let store = ChunkStore::new(pool);
                let index = load_index(&cfg)?;
                embed_cmd::run_index_status(&cfg, &store, &index).await?;
            }
        },

        Commands::Extract {
            section,
            min_confidence,
        } => {
            let pool = db::connect(&cfg).await?;
            let store = ChunkStore::new(pool);
            let section = normalize_section(&section, cfg.corpus.section_width);
            let min_confidence = min_confidence.unwrap_or(cfg.extraction.min_confidence);

            let chunks = store.chunks_for_section(&section, None, 10_000).await?;
            let mut extracted = 0usize;
            let mut resolved = 0usize;
            let mut created = 0usize;

            for chunk in chunks.iter().filter(|c| c.role == ChunkRole::Parent) {
                let text = match chunk.text.as_deref() {
                    Some(t) => t,
                    None => continue,
                };
                let stats = refextract::extract_and_link(
                    &store,
                    &chunk.chunk_id,
                    text,
                    chunk.section.as_deref(),
                    min_confidence,
                    cfg.corpus.section_width,
                )
                .await?;
                extracted += stats.extracted;
                resolved += stats.resolved;
                created += stats.created;
            }

            println!("extract section {}", section);
            println!("  extracted: {}", extracted);
            println!("  resolved:  {}", resolved);
            println!("  created:   {}", created);
        }

        Commands::Purge { chunk_id } => {
            let pool = db::connect(&cfg).await?;
            let store = ChunkStore::new(pool);
            let report = store.purge(&chunk_id).await?;
            println!("purge {}", chunk_id);
            println!("  chunks deleted: {}", report.chunks_deleted);
            println!("  edges deleted:  {}", report.edges_deleted);
        }
    }

    Ok(())
}

/// Load the paired index artifacts, or start an empty index when neither
/// exists yet. A lone artifact is a fatal startup error.
fn load_index(cfg: &config::Config) -> Result<VectorIndex> {
    Ok(VectorIndex::load(&cfg.index.dir, cfg.embedding.dims)?
        .unwrap_or_else(|| VectorIndex::new(cfg.embedding.dims)))
}
