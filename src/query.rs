//! Hybrid retrieval orchestrator.
//!
//! A state machine over a single query, terminal at the first applicable
//! return:
//!
//! 1. Definition-seeking queries restrict lookup to the Act's definitions
//!    section, answered from those hits alone.
//! 2. Queries naming a section number get an exact structural lookup
//!    (parents before children); the answer is generated from that set
//!    only, while an independent vector search surfaces supplementary
//!    material kept separate in the payload.
//! 3. Everything else falls back to semantic search over the index.
//!
//! Before any generation, the refusal gate runs: a chunk whose policy says
//! `refuse_if_parent_missing` must have its parent law present in the
//! assembled context, or the query terminates as a refusal — a defined
//! outcome distinct from "no results".

use anyhow::{Context as _, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::embedding::Embedder;
use crate::generation::Generator;
use crate::governance::DocumentType;
use crate::index::VectorIndex;
use crate::models::{ChunkRecord, RetrievalOrigin, RetrievedChunk};
use crate::store::{normalize_section, ChunkStore};

/// Per-chunk text budget in the generation context block.
const CONTEXT_TEXT_CHARS: usize = 1200;
/// Total context budget submitted to the generation service.
const CONTEXT_TOTAL_CHARS: usize = 6000;

static SECTION_QUERY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)section\s+(\d+)").expect("pattern compiles"));

static DEFINITION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    let re = |p: &str| Regex::new(p).expect("pattern compiles");
    vec![
        re(r#"(?i)definition\s+of\s+['"]?([\w][\w\s-]*?)['"]?[\s?.!]*$"#),
        re(r#"(?i)meaning\s+of\s+['"]?([\w][\w\s-]*?)['"]?[\s?.!]*$"#),
        re(r#"(?i)\bdefine\s+['"]?([\w][\w\s-]*?)['"]?[\s?.!]*$"#),
        re(r#"(?i)what\s+is\s+(?:a\s+|an\s+|the\s+)?['"]?([\w][\w\s-]*?)['"]?[\s?.!]*$"#),
    ]
});

/// Extract the section number a query names, if any.
pub fn detect_section_query(query: &str, width: usize) -> Option<String> {
    SECTION_QUERY
        .captures(query)
        .map(|c| normalize_section(&c[1], width))
}

/// Extract the term a definition-seeking query asks about.
pub fn detect_definition_term(query: &str) -> Option<String> {
    for pattern in DEFINITION_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(query) {
            let term = caps[1].trim().to_lowercase();
            if !term.is_empty() {
                return Some(term);
            }
        }
    }
    None
}

#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub top_k: usize,
    pub min_similarity: f32,
    pub section_width: usize,
    pub definitions_section: String,
}

/// Terminal result of one query.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QueryOutcome {
    Answered {
        answer: String,
        citations: Vec<String>,
        direct_lookup: Vec<RetrievedChunk>,
        supplementary: Vec<RetrievedChunk>,
    },
    Refused {
        reason: String,
        missing_parents: Vec<String>,
    },
    NoResults,
}

pub struct Orchestrator {
    store: ChunkStore,
    index: Arc<AsyncMutex<VectorIndex>>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    config: QueryConfig,
}

impl Orchestrator {
    pub fn new(
        store: ChunkStore,
        index: Arc<AsyncMutex<VectorIndex>>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        config: QueryConfig,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            generator,
            config,
        }
    }

    pub async fn query(&self, question: &str) -> Result<QueryOutcome> {
        let section = detect_section_query(question, self.config.section_width);

        if section.is_none() {
            if let Some(term) = detect_definition_term(question) {
                info!(term = %term, "definition query");
                if let Some(outcome) = self.definition_flow(question, &term).await? {
                    return Ok(outcome);
                }
            }
        }

        if let Some(section) = section {
            info!(section = %section, "explicit section query");
            if let Some(outcome) = self.direct_flow(question, &section).await? {
                return Ok(outcome);
            }
        }

        self.semantic_flow(question).await
    }

    /// Definitions-section lookup filtered by the extracted term. Hits are
    /// answered alone, tagged as definitional matches, bypassing vector
    /// search entirely.
    async fn definition_flow(&self, question: &str, term: &str) -> Result<Option<QueryOutcome>> {
        let definitions_section =
            normalize_section(&self.config.definitions_section, self.config.section_width);
        let mut context = self
            .store
            .definition_chunks(&definitions_section, term, self.config.top_k)
            .await?;
        if context.is_empty() {
            return Ok(None);
        }

        if let Some(refusal) = self.enforce_refusal(&mut context).await? {
            return Ok(Some(refusal));
        }

        let (answer, citations) = self.generate_answer(question, &context).await;
        let direct_lookup = context
            .iter()
            .map(|c| RetrievedChunk::from_record(c, 1.0, RetrievalOrigin::Definition))
            .collect();

        Ok(Some(QueryOutcome::Answered {
            answer,
            citations,
            direct_lookup,
            supplementary: Vec::new(),
        }))
    }

    /// Exact structural lookup by section. The generated answer uses the
    /// direct set only; the supplementary vector hits ride along in a
    /// separate list and never feed generation.
    async fn direct_flow(&self, question: &str, section: &str) -> Result<Option<QueryOutcome>> {
        let mut context = self
            .store
            .chunks_for_section(section, Some(DocumentType::Act), self.config.top_k)
            .await?;
        if context.is_empty() {
            return Ok(None);
        }

        if let Some(refusal) = self.enforce_refusal(&mut context).await? {
            return Ok(Some(refusal));
        }

        let (answer, citations) = self.generate_answer(question, &context).await;

        let direct_lookup: Vec<RetrievedChunk> = context
            .iter()
            .map(|c| RetrievedChunk::from_record(c, 1.0, RetrievalOrigin::DirectLookup))
            .collect();

        // Supplementary semantic hits; a failing embedding service degrades
        // to an empty list rather than failing the query.
        let supplementary = match self.vector_hits(question).await {
            Ok(hits) => {
                let direct_ids: HashSet<&str> =
                    direct_lookup.iter().map(|c| c.chunk_id.as_str()).collect();
                let mut out = Vec::new();
                for (meta, score) in hits {
                    if direct_ids.contains(meta.chunk_id.as_str()) {
                        continue;
                    }
                    if let Some(record) = self.store.get(&meta.chunk_id).await? {
                        out.push(RetrievedChunk::from_record(
                            &record,
                            score as f64,
                            RetrievalOrigin::Supplementary,
                        ));
                    }
                }
                out
            }
            Err(e) => {
                warn!(error = %e, "supplementary vector search unavailable");
                Vec::new()
            }
        };

        Ok(Some(QueryOutcome::Answered {
            answer,
            citations,
            direct_lookup,
            supplementary,
        }))
    }

    /// Fallback semantic search over the whole corpus.
    async fn semantic_flow(&self, question: &str) -> Result<QueryOutcome> {
        let hits = self
            .vector_hits(question)
            .await
            .context("query could not be completed: semantic search unavailable")?;
        if hits.is_empty() {
            return Ok(QueryOutcome::NoResults);
        }

        let ids: Vec<String> = hits.iter().map(|(m, _)| m.chunk_id.clone()).collect();
        let scores: Vec<f32> = hits.iter().map(|(_, s)| *s).collect();
        let mut context = self.store.records_by_ids(&ids).await?;
        if context.is_empty() {
            return Ok(QueryOutcome::NoResults);
        }

        if let Some(refusal) = self.enforce_refusal(&mut context).await? {
            return Ok(refusal);
        }

        let (answer, citations) = self.generate_answer(question, &context).await;

        let direct_lookup = context
            .iter()
            .map(|record| {
                let score = ids
                    .iter()
                    .position(|id| id == &record.chunk_id)
                    .map(|i| scores[i] as f64)
                    .unwrap_or(1.0);
                RetrievedChunk::from_record(record, score, RetrievalOrigin::Semantic)
            })
            .collect();

        Ok(QueryOutcome::Answered {
            answer,
            citations,
            direct_lookup,
            supplementary: Vec::new(),
        })
    }

    /// The hard governance gate. Every context chunk flagged
    /// `refuse_if_parent_missing` must have its parent-law chunk in the
    /// context set; resolvable parents are pulled in, unresolvable ones
    /// terminate the query as a refusal.
    async fn enforce_refusal(
        &self,
        context: &mut Vec<ChunkRecord>,
    ) -> Result<Option<QueryOutcome>> {
        let mut missing: Vec<String> = Vec::new();
        let mut to_add: Vec<ChunkRecord> = Vec::new();

        for chunk in context.iter() {
            if !chunk.refusal.refuse_if_parent_missing {
                continue;
            }
            match self.resolve_parent_law(chunk).await? {
                Some(parent_law_id) => {
                    let already = context.iter().any(|c| c.chunk_id == parent_law_id)
                        || to_add.iter().any(|c| c.chunk_id == parent_law_id);
                    if !already {
                        if let Some(record) = self.store.get(&parent_law_id).await? {
                            to_add.push(record);
                        }
                    }
                }
                None => {
                    missing.push(
                        chunk
                            .section
                            .clone()
                            .unwrap_or_else(|| chunk.chunk_id.clone()),
                    );
                }
            }
        }

        if !missing.is_empty() {
            missing.sort();
            missing.dedup();
            info!(missing = ?missing, "refusing: parent law absent");
            return Ok(Some(QueryOutcome::Refused {
                reason: "cannot answer without primary legislation".to_string(),
                missing_parents: missing,
            }));
        }

        context.extend(to_add);
        Ok(None)
    }

    /// Resolve the parent-law chunk for a governed chunk: the Act parent
    /// anchored at the same section, or failing that an Act reached
    /// through the owning document's semantic edges.
    async fn resolve_parent_law(&self, chunk: &ChunkRecord) -> Result<Option<String>> {
        if let Some(section) = chunk.section.as_deref() {
            if let Some(id) = self
                .store
                .parent_by_type_and_section(DocumentType::Act, section)
                .await?
            {
                return Ok(Some(id));
            }
        }

        let owner = chunk
            .parent_chunk_id
            .clone()
            .unwrap_or_else(|| chunk.chunk_id.clone());
        for edge in self.store.relationships_from(&owner).await? {
            if edge.relationship.is_structural() {
                continue;
            }
            if let Some(target) = self.store.get(&edge.to_chunk_id).await? {
                if target.document_type == DocumentType::Act {
                    return Ok(Some(target.chunk_id));
                }
            }
        }
        Ok(None)
    }

    async fn vector_hits(
        &self,
        question: &str,
    ) -> Result<Vec<(crate::index::ChunkMeta, f32)>> {
        {
            let guard = self.index.lock().await;
            if guard.is_empty() {
                return Ok(Vec::new());
            }
        }
        let vector = self.embedder.embed(question).await?;
        let guard = self.index.lock().await;
        guard.search(&vector, self.config.top_k, self.config.min_similarity)
    }

    /// Submit the context to the generation service. A failed or empty
    /// generation degrades to an explicit could-not-generate answer that
    /// still carries the citations that would have been used.
    async fn generate_answer(
        &self,
        question: &str,
        context: &[ChunkRecord],
    ) -> (String, Vec<String>) {
        let citations = citations_of(context);
        let prompt = build_prompt(question, context);

        match self.generator.generate(&prompt).await {
            Ok(answer) => (answer, citations),
            Err(e) => {
                warn!(error = %e, "generation failed");
                (
                    "An answer could not be generated from the retrieved sources. \
                     The citations below identify the provisions that would have been used."
                        .to_string(),
                    citations,
                )
            }
        }
    }
}

/// Deduplicated section citations across the chunks actually used,
/// in context order.
pub fn citations_of(context: &[ChunkRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut citations = Vec::new();
    for chunk in context {
        if let Some(section) = &chunk.section {
            let citation = format!("Section {}", section);
            if seen.insert(citation.clone()) {
                citations.push(citation);
            }
        }
    }
    citations
}

fn build_prompt(question: &str, context: &[ChunkRecord]) -> String {
    let mut blocks = Vec::with_capacity(context.len());
    for chunk in context {
        let doc_type = chunk.document_type.as_str().to_uppercase();
        let section = chunk.section.as_deref().unwrap_or("-");
        let title = chunk.title.as_deref().unwrap_or("");
        let text: String = chunk
            .text
            .as_deref()
            .unwrap_or("")
            .chars()
            .take(CONTEXT_TEXT_CHARS)
            .collect();
        blocks.push(format!("[{}] Section {}: {}\n{}", doc_type, section, title, text));
    }
    let mut sources = blocks.join("\n\n---\n\n");
    if sources.chars().count() > CONTEXT_TOTAL_CHARS {
        sources = sources.chars().take(CONTEXT_TOTAL_CHARS).collect();
    }

    format!(
        "You are a legal assistant answering strictly from the provided source documents.\n\
         \n\
         Rules:\n\
         - Use ONLY the provided sources.\n\
         - Do NOT add outside knowledge.\n\
         - Always cite the exact Section number.\n\
         - If the answer is not in the sources, say:\n\
         \x20 \"The provided sources do not contain information about this topic.\"\n\
         \n\
         User Question:\n{}\n\
         \n\
         Source Documents:\n{}\n\
         \n\
         Answer Format:\n\
         \n\
         ## Answer\n\
         \n\
         Provide a clear explanation based ONLY on the sources.\n\
         \n\
         ## Legal References\n\
         - Section X: short supporting reference from source\n",
        question, sources
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::DocumentType as DT;

    #[test]
    fn section_queries_are_detected_and_normalized() {
        assert_eq!(detect_section_query("What does Section 45 say?", 3), Some("045".into()));
        assert_eq!(detect_section_query("section 2 definitions", 3), Some("002".into()));
        assert_eq!(detect_section_query("SECTION 002", 3), Some("002".into()));
        assert_eq!(detect_section_query("deposit rules", 3), None);
    }

    #[test]
    fn definition_terms_are_extracted() {
        assert_eq!(
            detect_definition_term("What is the definition of director?"),
            Some("director".into())
        );
        assert_eq!(
            detect_definition_term("meaning of 'small company'"),
            Some("small company".into())
        );
        assert_eq!(detect_definition_term("define charge"), Some("charge".into()));
        assert_eq!(
            detect_definition_term("What is a debenture?"),
            Some("debenture".into())
        );
        assert_eq!(detect_definition_term("list the filing deadlines"), None);
    }

    #[test]
    fn explicit_section_outranks_definition_phrasing() {
        // The orchestrator checks for a section number first; the detector
        // itself still fires, so both signals must be visible.
        let q = "What is the meaning of Section 45?";
        assert!(detect_section_query(q, 3).is_some());
    }

    #[test]
    fn citations_deduplicate_in_order() {
        let a = ChunkRecord::parent("x_act_s045", DT::Act, Some("045".into()), None);
        let b = ChunkRecord::child_of(&a, 1, "text one".into());
        let c = ChunkRecord::parent("x_act_s002", DT::Act, Some("002".into()), None);
        let citations = citations_of(&[a, b, c]);
        assert_eq!(citations, vec!["Section 045", "Section 002"]);
    }

    #[test]
    fn prompt_is_governance_constrained() {
        let a = ChunkRecord::parent("x_act_s045", DT::Act, Some("045".into()), Some("Deposits".into()));
        let prompt = build_prompt("What about deposits?", &[a]);
        assert!(prompt.contains("ONLY the provided sources"));
        assert!(prompt.contains("cite the exact Section number"));
        assert!(prompt.contains("[ACT] Section 045"));
    }
}
