//! Core data models used throughout Statute Harness.
//!
//! A [`ChunkRecord`] is the aggregate view of one chunk across every table
//! in the store: identity, content, retrieval rules, refusal policy,
//! lifecycle, versioning, and embedding state. Governance fields are
//! derived once at construction time via the rule table and are copies on
//! children, never re-derived.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::governance::{
    self, AuthorityLevel, DocumentType, RefusalPolicy, Relationship,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkRole {
    Parent,
    Child,
}

impl ChunkRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkRole::Parent => "parent",
            ChunkRole::Child => "child",
        }
    }
}

impl FromStr for ChunkRole {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "child" => ChunkRole::Child,
            _ => ChunkRole::Parent,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Draft,
    Active,
    Retired,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Draft => "draft",
            LifecycleStatus::Active => "active",
            LifecycleStatus::Retired => "retired",
        }
    }
}

impl FromStr for LifecycleStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "draft" => LifecycleStatus::Draft,
            "retired" => LifecycleStatus::Retired,
            _ => LifecycleStatus::Active,
        })
    }
}

/// One chunk, fully hydrated.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub role: ChunkRole,
    pub parent_chunk_id: Option<String>,
    pub document_type: DocumentType,
    pub authority_level: AuthorityLevel,
    pub binding: bool,
    pub section: Option<String>,
    pub title: Option<String>,
    pub text: Option<String>,
    pub content_hash: Option<String>,
    pub priority: u8,
    pub requires_parent_law: bool,
    pub refusal: RefusalPolicy,
    pub status: LifecycleStatus,
    pub version: String,
    pub embedding_enabled: bool,
}

impl ChunkRecord {
    /// Build a parent chunk, deriving all governance fields from the rule
    /// table. Parents are never embedded; their text is archival only.
    pub fn parent(
        chunk_id: impl Into<String>,
        document_type: DocumentType,
        section: Option<String>,
        title: Option<String>,
    ) -> Self {
        let priority = governance::priority(document_type);
        ChunkRecord {
            chunk_id: chunk_id.into(),
            role: ChunkRole::Parent,
            parent_chunk_id: None,
            document_type,
            authority_level: governance::authority_level(document_type),
            binding: governance::binding(document_type),
            section,
            title,
            text: None,
            content_hash: None,
            priority,
            requires_parent_law: governance::requires_parent_law(priority),
            refusal: governance::refusal_policy(document_type, priority),
            status: LifecycleStatus::Active,
            version: "1.0".to_string(),
            embedding_enabled: false,
        }
    }

    /// Build a child chunk inheriting the parent's governance fields
    /// verbatim. Only children with non-trivial text are embeddable.
    pub fn child_of(parent: &ChunkRecord, index: usize, text: String) -> Self {
        let embedding_enabled = !text.trim().is_empty();
        ChunkRecord {
            chunk_id: format!("{}_c{}", parent.chunk_id, index),
            role: ChunkRole::Child,
            parent_chunk_id: Some(parent.chunk_id.clone()),
            document_type: parent.document_type,
            authority_level: parent.authority_level,
            binding: parent.binding,
            section: parent.section.clone(),
            title: parent.title.clone(),
            text: Some(text),
            content_hash: None,
            priority: parent.priority,
            requires_parent_law: parent.requires_parent_law,
            refusal: parent.refusal,
            status: LifecycleStatus::Active,
            version: "1.0".to_string(),
            embedding_enabled,
        }
    }
}

/// A directed, typed edge between two chunks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipEdge {
    pub from_chunk_id: String,
    pub to_chunk_id: String,
    pub relationship: Relationship,
    pub confidence: f64,
}

/// Where a retrieved chunk came from in the orchestrator's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalOrigin {
    DirectLookup,
    Definition,
    Semantic,
    Supplementary,
}

/// One chunk as returned to a caller of the query path: governance
/// metadata plus a similarity score and truncated text.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub section: Option<String>,
    pub document_type: DocumentType,
    pub authority_level: AuthorityLevel,
    pub binding: bool,
    pub priority: u8,
    pub title: Option<String>,
    pub text: String,
    pub similarity_score: f64,
    pub origin: RetrievalOrigin,
}

/// Display-text truncation for query payloads.
const SNIPPET_CHARS: usize = 500;

impl RetrievedChunk {
    pub fn from_record(record: &ChunkRecord, similarity: f64, origin: RetrievalOrigin) -> Self {
        let full = record.text.as_deref().unwrap_or("");
        let text = if full.chars().count() > SNIPPET_CHARS {
            let cut: String = full.chars().take(SNIPPET_CHARS).collect();
            format!("{}...", cut)
        } else {
            full.to_string()
        };
        RetrievedChunk {
            chunk_id: record.chunk_id.clone(),
            section: record.section.clone(),
            document_type: record.document_type,
            authority_level: record.authority_level,
            binding: record.binding,
            priority: record.priority,
            title: record.title.clone(),
            text,
            similarity_score: similarity,
            origin,
        }
    }
}
