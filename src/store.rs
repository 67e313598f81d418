//! Chunk Store — CRUD over the normalized chunk schema.
//!
//! Every chunk write is one aggregate operation: a single transaction
//! covering the identity, content, retrieval-rule, refusal-policy,
//! lifecycle, versioning, and embedding tables. Either all rows land or
//! none do. Upserts are keyed by `chunk_id`, so re-running ingestion for
//! the same source never duplicates chunks.
//!
//! Integrity violations (a child without a parent, a semantic edge touching
//! a child, a type/relationship mismatch) are rejected at write time as
//! typed [`StoreError`]s, never silently coerced.

use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::governance::{self, AuthorityLevel, DocumentType, RefusalPolicy, Relationship};
use crate::models::{ChunkRecord, ChunkRole, LifecycleStatus, RelationshipEdge};

/// Children shorter than this are stored but never queued for embedding.
pub const MIN_EMBED_CHARS: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("chunk not found: {0}")]
    NotFound(String),
    #[error("child chunk {chunk_id} references missing parent {parent_id}")]
    MissingParent { chunk_id: String, parent_id: String },
    #[error("child chunk {0} must carry a parent_chunk_id")]
    ChildWithoutParent(String),
    #[error("parent chunk {0} must not carry a parent_chunk_id")]
    ParentWithParent(String),
    #[error("edge endpoint does not exist: {0}")]
    EdgeEndpointMissing(String),
    #[error("semantic edge {relationship} may not touch child chunk {chunk_id}")]
    SemanticEdgeOnChild {
        chunk_id: String,
        relationship: Relationship,
    },
    #[error("structural edge {relationship} between {from} and {to} violates role rules")]
    StructuralEdgeMisuse {
        from: String,
        to: String,
        relationship: Relationship,
    },
    #[error(transparent)]
    EdgeRule(#[from] governance::EdgeRuleViolation),
    #[error(transparent)]
    UnknownRelationship(#[from] governance::UnknownRelationship),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreCounts {
    pub parents: u64,
    pub children: u64,
    pub edges: u64,
    pub embedded: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct PurgeReport {
    pub chunks_deleted: u64,
    pub edges_deleted: u64,
}

#[derive(Clone)]
pub struct ChunkStore {
    pool: SqlitePool,
}

impl ChunkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Write one chunk across every table in a single transaction.
    pub async fn insert_chunk(&self, record: &ChunkRecord) -> Result<(), StoreError> {
        match record.role {
            ChunkRole::Parent => {
                if record.parent_chunk_id.is_some() {
                    return Err(StoreError::ParentWithParent(record.chunk_id.clone()));
                }
            }
            ChunkRole::Child => {
                let parent_id = record
                    .parent_chunk_id
                    .as_deref()
                    .ok_or_else(|| StoreError::ChildWithoutParent(record.chunk_id.clone()))?;
                let parent_role: Option<String> = sqlx::query_scalar(
                    "SELECT chunk_role FROM chunks_identity WHERE chunk_id = ?",
                )
                .bind(parent_id)
                .fetch_optional(&self.pool)
                .await?;
                match parent_role.as_deref() {
                    Some("parent") => {}
                    _ => {
                        return Err(StoreError::MissingParent {
                            chunk_id: record.chunk_id.clone(),
                            parent_id: parent_id.to_string(),
                        })
                    }
                }
            }
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO chunks_identity (chunk_id, chunk_role, parent_chunk_id, document_type, authority_level, binding, section)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                chunk_role = excluded.chunk_role,
                parent_chunk_id = excluded.parent_chunk_id,
                document_type = excluded.document_type,
                authority_level = excluded.authority_level,
                binding = excluded.binding,
                section = excluded.section
            "#,
        )
        .bind(&record.chunk_id)
        .bind(record.role.as_str())
        .bind(&record.parent_chunk_id)
        .bind(record.document_type.as_str())
        .bind(record.authority_level.as_str())
        .bind(record.binding)
        .bind(&record.section)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO chunks_content (chunk_id, title, text, content_hash)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                title = excluded.title,
                text = excluded.text,
                content_hash = excluded.content_hash
            "#,
        )
        .bind(&record.chunk_id)
        .bind(&record.title)
        .bind(&record.text)
        .bind(&record.content_hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO chunk_retrieval_rules (chunk_id, priority, requires_parent_law)
            VALUES (?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                priority = excluded.priority,
                requires_parent_law = excluded.requires_parent_law
            "#,
        )
        .bind(&record.chunk_id)
        .bind(record.priority as i64)
        .bind(record.requires_parent_law)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO chunk_refusal_policy (chunk_id, can_answer_standalone, must_reference_parent_law, refuse_if_parent_missing)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                can_answer_standalone = excluded.can_answer_standalone,
                must_reference_parent_law = excluded.must_reference_parent_law,
                refuse_if_parent_missing = excluded.refuse_if_parent_missing
            "#,
        )
        .bind(&record.chunk_id)
        .bind(record.refusal.can_answer_standalone)
        .bind(record.refusal.must_reference_parent_law)
        .bind(record.refusal.refuse_if_parent_missing)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO chunk_lifecycle (chunk_id, status)
            VALUES (?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET status = excluded.status
            "#,
        )
        .bind(&record.chunk_id)
        .bind(record.status.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO chunk_versioning (chunk_id, version)
            VALUES (?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET version = excluded.version
            "#,
        )
        .bind(&record.chunk_id)
        .bind(&record.version)
        .execute(&mut *tx)
        .await?;

        // Embedding linkage is the one mutable piece of a chunk; keep any
        // existing embedded_at so re-ingestion stays incremental.
        sqlx::query(
            r#"
            INSERT INTO chunk_embeddings (chunk_id, enabled)
            VALUES (?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET enabled = excluded.enabled
            "#,
        )
        .bind(&record.chunk_id)
        .bind(record.embedding_enabled)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Attach (or replace) a parent's archival text.
    pub async fn attach_text(
        &self,
        chunk_id: &str,
        text: &str,
        content_hash: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE chunks_content SET text = ?, content_hash = COALESCE(?, content_hash) WHERE chunk_id = ?",
        )
        .bind(text)
        .bind(content_hash)
        .bind(chunk_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(chunk_id.to_string()));
        }
        Ok(())
    }

    pub async fn get(&self, chunk_id: &str) -> Result<Option<ChunkRecord>, StoreError> {
        let row = sqlx::query(&format!("{} WHERE i.chunk_id = ?", SELECT_RECORD))
            .bind(chunk_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_record(&r)))
    }

    /// Parent chunk of the given type anchored at an exact section.
    pub async fn parent_by_type_and_section(
        &self,
        document_type: DocumentType,
        section: &str,
    ) -> Result<Option<String>, StoreError> {
        let id: Option<String> = sqlx::query_scalar(
            r#"
            SELECT i.chunk_id FROM chunks_identity i
            JOIN chunk_lifecycle l ON l.chunk_id = i.chunk_id
            WHERE i.document_type = ? AND i.section = ? AND i.chunk_role = 'parent'
              AND l.status = 'active'
            ORDER BY i.chunk_id
            LIMIT 1
            "#,
        )
        .bind(document_type.as_str())
        .bind(section)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    /// Parent chunk of the given type whose ID contains `needle`. Used to
    /// resolve rule/notification/circular/form/schedule citations whose
    /// numbers land in the structured ID rather than the section column.
    pub async fn parent_id_like(
        &self,
        document_type: DocumentType,
        needle: &str,
    ) -> Result<Option<String>, StoreError> {
        let id: Option<String> = sqlx::query_scalar(
            r#"
            SELECT i.chunk_id FROM chunks_identity i
            JOIN chunk_lifecycle l ON l.chunk_id = i.chunk_id
            WHERE i.document_type = ? AND i.chunk_role = 'parent'
              AND l.status = 'active' AND i.chunk_id LIKE ?
            ORDER BY i.chunk_id
            LIMIT 1
            "#,
        )
        .bind(document_type.as_str())
        .bind(format!("%{}%", needle))
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    /// Active chunks anchored to a section, parents ordered before
    /// children, then by chunk ID for determinism. A `document_type`
    /// narrows the lookup (the orchestrator's direct lookup reads only the
    /// primary Act; subordinate material reaches it through the
    /// supplementary channel).
    pub async fn chunks_for_section(
        &self,
        section: &str,
        document_type: Option<DocumentType>,
        limit: usize,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        let mut sql = format!(
            r#"{}
            WHERE i.section = ? AND l.status = 'active'
            "#,
            SELECT_RECORD
        );
        if document_type.is_some() {
            sql.push_str(" AND i.document_type = ?");
        }
        sql.push_str(
            " ORDER BY CASE WHEN i.chunk_role = 'parent' THEN 0 ELSE 1 END, i.chunk_id LIMIT ?",
        );

        let mut query = sqlx::query(&sql).bind(section);
        if let Some(dt) = document_type {
            query = query.bind(dt.as_str());
        }
        let rows = query.bind(limit as i64).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    /// Chunks in the Act's definitions section whose text contains `term`
    /// (case-insensitive), parents first.
    pub async fn definition_chunks(
        &self,
        definitions_section: &str,
        term: &str,
        limit: usize,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"{}
            WHERE i.section = ? AND i.document_type = 'act' AND l.status = 'active'
              AND c.text IS NOT NULL AND LOWER(c.text) LIKE ?
            ORDER BY CASE WHEN i.chunk_role = 'parent' THEN 0 ELSE 1 END, i.chunk_id
            LIMIT ?
            "#,
            SELECT_RECORD
        ))
        .bind(definitions_section)
        .bind(format!("%{}%", term.to_lowercase()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    /// Hydrate records for the given IDs, preserving the input order and
    /// skipping IDs that no longer exist.
    pub async fn records_by_ids(&self, ids: &[String]) -> Result<Vec<ChunkRecord>, StoreError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get(id).await? {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Active, embeddable children with non-trivial text that have not yet
    /// been marked embedded. Drives incremental index builds.
    pub async fn unembedded_children(
        &self,
        sections: Option<&[String]>,
        limit: Option<usize>,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        let mut sql = format!(
            r#"{}
            WHERE i.chunk_role = 'child' AND l.status = 'active'
              AND e.enabled = 1 AND e.embedded_at IS NULL
              AND c.text IS NOT NULL AND LENGTH(c.text) > {}
            "#,
            SELECT_RECORD, MIN_EMBED_CHARS
        );
        if let Some(sections) = sections {
            let placeholders = vec!["?"; sections.len()].join(", ");
            sql.push_str(&format!(" AND i.section IN ({})", placeholders));
        }
        sql.push_str(" ORDER BY i.section, i.chunk_id");
        if limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(sections) = sections {
            for s in sections {
                query = query.bind(s);
            }
        }
        if let Some(limit) = limit {
            query = query.bind(limit as i64);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    pub async fn mark_embedded(&self, chunk_id: &str, model: &str) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "UPDATE chunk_embeddings SET model = ?, embedded_at = ? WHERE chunk_id = ?",
        )
        .bind(model)
        .bind(now)
        .bind(chunk_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Append a relationship edge. Returns `false` when the identical
    /// `(from, relationship, to)` tuple already exists.
    ///
    /// Structural edges may only take the shapes the chunking engine
    /// produces (`part_of` child→parent, `precedes` child→child); semantic
    /// edges are only ever attached to parents and must pass the
    /// governance type rules.
    pub async fn insert_relationship(
        &self,
        edge: &RelationshipEdge,
    ) -> Result<bool, StoreError> {
        let from = self
            .role_and_type(&edge.from_chunk_id)
            .await?
            .ok_or_else(|| StoreError::EdgeEndpointMissing(edge.from_chunk_id.clone()))?;
        let to = self
            .role_and_type(&edge.to_chunk_id)
            .await?
            .ok_or_else(|| StoreError::EdgeEndpointMissing(edge.to_chunk_id.clone()))?;

        match edge.relationship {
            Relationship::PartOf => {
                if from.0 != ChunkRole::Child || to.0 != ChunkRole::Parent {
                    return Err(StoreError::StructuralEdgeMisuse {
                        from: edge.from_chunk_id.clone(),
                        to: edge.to_chunk_id.clone(),
                        relationship: edge.relationship,
                    });
                }
            }
            Relationship::Precedes => {
                if from.0 != ChunkRole::Child || to.0 != ChunkRole::Child {
                    return Err(StoreError::StructuralEdgeMisuse {
                        from: edge.from_chunk_id.clone(),
                        to: edge.to_chunk_id.clone(),
                        relationship: edge.relationship,
                    });
                }
            }
            rel => {
                if from.0 == ChunkRole::Child {
                    return Err(StoreError::SemanticEdgeOnChild {
                        chunk_id: edge.from_chunk_id.clone(),
                        relationship: rel,
                    });
                }
                if to.0 == ChunkRole::Child {
                    return Err(StoreError::SemanticEdgeOnChild {
                        chunk_id: edge.to_chunk_id.clone(),
                        relationship: rel,
                    });
                }
                governance::validate_semantic_edge(from.1, rel, to.1)?;
            }
        }

        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO chunk_relationships (from_chunk_id, to_chunk_id, relationship, confidence, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(from_chunk_id, relationship, to_chunk_id) DO NOTHING
            "#,
        )
        .bind(&edge.from_chunk_id)
        .bind(&edge.to_chunk_id)
        .bind(edge.relationship.as_str())
        .bind(edge.confidence)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn relationships_from(
        &self,
        chunk_id: &str,
    ) -> Result<Vec<RelationshipEdge>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT from_chunk_id, to_chunk_id, relationship, confidence
            FROM chunk_relationships
            WHERE from_chunk_id = ?
            ORDER BY confidence DESC, to_chunk_id
            "#,
        )
        .bind(chunk_id)
        .fetch_all(&self.pool)
        .await?;

        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            let rel: String = row.get("relationship");
            let relationship = Relationship::from_str(&rel)?;
            edges.push(RelationshipEdge {
                from_chunk_id: row.get("from_chunk_id"),
                to_chunk_id: row.get("to_chunk_id"),
                relationship,
                confidence: row.get("confidence"),
            });
        }
        Ok(edges)
    }

    pub async fn edge_count(&self) -> Result<u64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_relationships")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    pub async fn children_of(&self, parent_id: &str) -> Result<Vec<String>, StoreError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT chunk_id FROM chunks_identity WHERE parent_chunk_id = ? ORDER BY chunk_id",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Content-hash dedup probe: an existing parent of the same type and
    /// section with identical parsed text.
    pub async fn parent_with_content_hash(
        &self,
        document_type: DocumentType,
        section: Option<&str>,
        content_hash: &str,
    ) -> Result<Option<String>, StoreError> {
        let id: Option<String> = sqlx::query_scalar(
            r#"
            SELECT i.chunk_id FROM chunks_identity i
            JOIN chunks_content c ON c.chunk_id = i.chunk_id
            WHERE i.document_type = ? AND i.chunk_role = 'parent'
              AND i.section IS ? AND c.content_hash = ?
            LIMIT 1
            "#,
        )
        .bind(document_type.as_str())
        .bind(section)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    /// Administrative purge: delete a parent document, all of its children,
    /// and every edge touching any of them. Cascades across all tables in
    /// one transaction; safe to re-run.
    pub async fn purge(&self, parent_chunk_id: &str) -> Result<PurgeReport, StoreError> {
        let mut ids = self.children_of(parent_chunk_id).await?;
        ids.push(parent_chunk_id.to_string());

        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut tx = self.pool.begin().await?;

        let edge_sql = format!(
            "DELETE FROM chunk_relationships WHERE from_chunk_id IN ({p}) OR to_chunk_id IN ({p})",
            p = placeholders
        );
        let mut edge_query = sqlx::query(&edge_sql);
        for id in ids.iter().chain(ids.iter()) {
            edge_query = edge_query.bind(id);
        }
        let edges_deleted = edge_query.execute(&mut *tx).await?.rows_affected();

        let mut chunks_deleted = 0u64;
        for table in [
            "chunk_embeddings",
            "chunk_versioning",
            "chunk_lifecycle",
            "chunk_refusal_policy",
            "chunk_retrieval_rules",
            "chunks_content",
            "chunks_identity",
        ] {
            let table_sql = format!(
                "DELETE FROM {} WHERE chunk_id IN ({})",
                table, placeholders
            );
            let mut q = sqlx::query(&table_sql);
            for id in &ids {
                q = q.bind(id);
            }
            let affected = q.execute(&mut *tx).await?.rows_affected();
            if table == "chunks_identity" {
                chunks_deleted = affected;
            }
        }

        tx.commit().await?;
        Ok(PurgeReport {
            chunks_deleted,
            edges_deleted,
        })
    }

    pub async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let parents: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chunks_identity WHERE chunk_role = 'parent'",
        )
        .fetch_one(&self.pool)
        .await?;
        let children: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chunks_identity WHERE chunk_role = 'child'",
        )
        .fetch_one(&self.pool)
        .await?;
        let edges: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_relationships")
            .fetch_one(&self.pool)
            .await?;
        let embedded: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chunk_embeddings WHERE embedded_at IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StoreCounts {
            parents: parents as u64,
            children: children as u64,
            edges: edges as u64,
            embedded: embedded as u64,
        })
    }

    async fn role_and_type(
        &self,
        chunk_id: &str,
    ) -> Result<Option<(ChunkRole, DocumentType)>, StoreError> {
        let row = sqlx::query(
            "SELECT chunk_role, document_type FROM chunks_identity WHERE chunk_id = ?",
        )
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| {
            let role: String = r.get("chunk_role");
            let dt: String = r.get("document_type");
            (
                ChunkRole::from_str(&role).unwrap_or(ChunkRole::Parent),
                DocumentType::from_str(&dt).unwrap_or(DocumentType::Other),
            )
        }))
    }
}

/// Canonical zero-padded form of a section number: `"2"`, `"02"`, and
/// `"002"` all normalize to `"002"` (at the default width) so every lookup
/// path treats them identically. Non-numeric anchors pass through trimmed.
pub fn normalize_section(raw: &str, width: usize) -> String {
    let trimmed = raw.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        let stripped = trimmed.trim_start_matches('0');
        let digits = if stripped.is_empty() { "0" } else { stripped };
        format!("{:0>width$}", digits, width = width)
    } else {
        trimmed.to_string()
    }
}

const SELECT_RECORD: &str = r#"
    SELECT i.chunk_id, i.chunk_role, i.parent_chunk_id, i.document_type,
           i.authority_level, i.binding, i.section,
           c.title, c.text, c.content_hash,
           r.priority, r.requires_parent_law,
           p.can_answer_standalone, p.must_reference_parent_law, p.refuse_if_parent_missing,
           l.status, v.version, e.enabled
    FROM chunks_identity i
    JOIN chunks_content c ON c.chunk_id = i.chunk_id
    JOIN chunk_retrieval_rules r ON r.chunk_id = i.chunk_id
    JOIN chunk_refusal_policy p ON p.chunk_id = i.chunk_id
    JOIN chunk_lifecycle l ON l.chunk_id = i.chunk_id
    JOIN chunk_versioning v ON v.chunk_id = i.chunk_id
    JOIN chunk_embeddings e ON e.chunk_id = i.chunk_id
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_normalization_round_trip() {
        assert_eq!(normalize_section("2", 3), "002");
        assert_eq!(normalize_section("02", 3), "002");
        assert_eq!(normalize_section("002", 3), "002");
        assert_eq!(normalize_section("2", 3), normalize_section("002", 3));
    }

    #[test]
    fn wide_sections_are_not_truncated() {
        assert_eq!(normalize_section("1234", 3), "1234");
    }

    #[test]
    fn non_numeric_anchors_pass_through() {
        assert_eq!(normalize_section(" III ", 3), "III");
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> ChunkRecord {
    let role: String = row.get("chunk_role");
    let dt: String = row.get("document_type");
    let authority: String = row.get("authority_level");
    let status: String = row.get("status");
    let priority: i64 = row.get("priority");

    ChunkRecord {
        chunk_id: row.get("chunk_id"),
        role: role.parse().unwrap_or(ChunkRole::Parent),
        parent_chunk_id: row.get("parent_chunk_id"),
        document_type: dt.parse().unwrap_or(DocumentType::Other),
        authority_level: authority.parse().unwrap_or(AuthorityLevel::Commentary),
        binding: row.get("binding"),
        section: row.get("section"),
        title: row.get("title"),
        text: row.get("text"),
        content_hash: row.get("content_hash"),
        priority: priority as u8,
        requires_parent_law: row.get("requires_parent_law"),
        refusal: RefusalPolicy {
            can_answer_standalone: row.get("can_answer_standalone"),
            must_reference_parent_law: row.get("must_reference_parent_law"),
            refuse_if_parent_missing: row.get("refuse_if_parent_missing"),
        },
        status: status.parse().unwrap_or(LifecycleStatus::Active),
        version: row.get("version"),
        embedding_enabled: row.get("enabled"),
    }
}
