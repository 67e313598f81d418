//! Schema migrations.
//!
//! One table per chunk concern (identity, content, retrieval rules, refusal
//! policy, lifecycle, versioning, embedding state) plus the relationship
//! edge table. All statements are `IF NOT EXISTS`, so `stx init` is safe to
//! re-run, and any future column additions must stay additive/nullable.

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks_identity (
            chunk_id TEXT PRIMARY KEY,
            chunk_role TEXT NOT NULL,
            parent_chunk_id TEXT,
            document_type TEXT NOT NULL,
            authority_level TEXT NOT NULL,
            binding INTEGER NOT NULL,
            section TEXT,
            FOREIGN KEY (parent_chunk_id) REFERENCES chunks_identity(chunk_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks_content (
            chunk_id TEXT PRIMARY KEY,
            title TEXT,
            text TEXT,
            content_hash TEXT,
            FOREIGN KEY (chunk_id) REFERENCES chunks_identity(chunk_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_retrieval_rules (
            chunk_id TEXT PRIMARY KEY,
            priority INTEGER NOT NULL,
            requires_parent_law INTEGER NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks_identity(chunk_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_refusal_policy (
            chunk_id TEXT PRIMARY KEY,
            can_answer_standalone INTEGER NOT NULL,
            must_reference_parent_law INTEGER NOT NULL,
            refuse_if_parent_missing INTEGER NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks_identity(chunk_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_lifecycle (
            chunk_id TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'active',
            FOREIGN KEY (chunk_id) REFERENCES chunks_identity(chunk_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_versioning (
            chunk_id TEXT PRIMARY KEY,
            version TEXT NOT NULL DEFAULT '1.0',
            FOREIGN KEY (chunk_id) REFERENCES chunks_identity(chunk_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_embeddings (
            chunk_id TEXT PRIMARY KEY,
            enabled INTEGER NOT NULL DEFAULT 0,
            model TEXT,
            embedded_at INTEGER,
            FOREIGN KEY (chunk_id) REFERENCES chunks_identity(chunk_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Edges are append-only and unique on the full (from, relationship, to)
    // tuple; re-running extraction can never inflate the edge count.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_relationships (
            from_chunk_id TEXT NOT NULL,
            to_chunk_id TEXT NOT NULL,
            relationship TEXT NOT NULL,
            confidence REAL NOT NULL DEFAULT 1.0,
            created_at INTEGER NOT NULL,
            UNIQUE(from_chunk_id, relationship, to_chunk_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_identity_section ON chunks_identity(section)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_identity_parent ON chunks_identity(parent_chunk_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_identity_type_section ON chunks_identity(document_type, section)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_relationships_from ON chunk_relationships(from_chunk_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
