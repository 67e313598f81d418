//! Chunk inspection by ID.
//!
//! Prints one chunk's full record — identity, governance fields, text —
//! plus its outgoing relationship edges and child chunks.

use anyhow::{bail, Result};

use crate::models::ChunkRole;
use crate::store::ChunkStore;

pub async fn run_get(store: &ChunkStore, chunk_id: &str) -> Result<()> {
    let record = match store.get(chunk_id).await? {
        Some(r) => r,
        None => bail!("chunk not found: {}", chunk_id),
    };

    println!("--- Chunk ---");
    println!("id:              {}", record.chunk_id);
    println!("role:            {}", record.role.as_str());
    if let Some(parent) = &record.parent_chunk_id {
        println!("parent:          {}", parent);
    }
    println!("document_type:   {}", record.document_type);
    println!("authority_level: {}", record.authority_level.as_str());
    println!("binding:         {}", record.binding);
    println!("priority:        {}", record.priority);
    if let Some(section) = &record.section {
        println!("section:         {}", section);
    }
    if let Some(title) = &record.title {
        println!("title:           {}", title);
    }
    println!("status:          {}", record.status.as_str());
    println!("version:         {}", record.version);
    println!(
        "refusal:         standalone={} must_reference={} refuse_if_missing={}",
        record.refusal.can_answer_standalone,
        record.refusal.must_reference_parent_law,
        record.refusal.refuse_if_parent_missing
    );
    println!("embeddable:      {}", record.embedding_enabled);
    println!();

    if let Some(text) = &record.text {
        println!("--- Text ---");
        println!("{}", text);
        println!();
    }

    let edges = store.relationships_from(chunk_id).await?;
    if !edges.is_empty() {
        println!("--- Relationships ({}) ---", edges.len());
        for edge in &edges {
            println!(
                "{} --[{}]--> {} (confidence {:.2})",
                edge.from_chunk_id, edge.relationship, edge.to_chunk_id, edge.confidence
            );
        }
        println!();
    }

    if record.role == ChunkRole::Parent {
        let children = store.children_of(chunk_id).await?;
        if !children.is_empty() {
            println!("--- Children ({}) ---", children.len());
            for child in &children {
                println!("{}", child);
            }
        }
    }

    Ok(())
}
