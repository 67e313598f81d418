//! Document parsing collaborator.
//!
//! The ingestion pipeline needs exactly one thing from document parsing:
//! `parse(path) -> {text, method}`. Richer formats (PDF, OCR, HTML) live
//! behind this trait in external collaborators; the shipped implementation
//! handles plain text.

use anyhow::{Context, Result};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Parsed {
    pub text: String,
    /// Which extraction path produced the text (e.g. `plain_text`).
    pub method: String,
}

pub trait DocumentParser: Send + Sync {
    fn parse(&self, path: &Path) -> Result<Parsed>;
}

/// UTF-8 plain-text reader.
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn parse(&self, path: &Path) -> Result<Parsed> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(Parsed {
            text,
            method: "plain_text".to_string(),
        })
    }
}
