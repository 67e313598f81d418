//! Reference extraction engine.
//!
//! Mines free text for legal citations (sections, rules, notifications,
//! circulars, forms, schedules), classifies the semantic relationship from
//! the surrounding context, scores confidence, resolves each candidate to
//! an existing parent chunk, and writes the resulting edges into the
//! citation graph.
//!
//! Confidence scoring is a pure function over a context string so the
//! scoring rules can be tested without a database.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::governance::Relationship;
use crate::models::RelationshipEdge;
use crate::store::{normalize_section, ChunkStore, StoreError};

/// Citation categories the pattern catalogue recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefType {
    Section,
    SubSection,
    Rule,
    Notification,
    Circular,
    Form,
    Schedule,
}

/// Relationship classes read off the context window. `References` is the
/// generic fallback; it is persisted as a `clarifies` edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefRelation {
    Amends,
    Clarifies,
    Implements,
    Proceduralises,
    Supersedes,
    References,
}

impl RefRelation {
    pub fn is_generic(&self) -> bool {
        matches!(self, RefRelation::References)
    }

    pub fn as_relationship(&self) -> Relationship {
        match self {
            RefRelation::Amends => Relationship::Amends,
            RefRelation::Clarifies | RefRelation::References => Relationship::Clarifies,
            RefRelation::Implements => Relationship::Implements,
            RefRelation::Proceduralises => Relationship::Proceduralises,
            RefRelation::Supersedes => Relationship::Supersedes,
        }
    }
}

/// A citation candidate pulled out of text.
#[derive(Debug, Clone)]
pub struct ExtractedReference {
    pub ref_type: RefType,
    pub ref_number: String,
    pub sub_ref: Option<String>,
    pub relationship: RefRelation,
    pub context: String,
    pub confidence: f64,
}

#[derive(Debug, Default)]
pub struct ExtractionStats {
    pub extracted: usize,
    pub resolved: usize,
    pub created: usize,
    pub edges: Vec<RelationshipEdge>,
}

/// Chars of context captured on each side of a citation match.
const CONTEXT_CHARS: usize = 100;

static REFERENCE_PATTERNS: Lazy<Vec<(RefType, Vec<Regex>)>> = Lazy::new(|| {
    let re = |p: &str| Regex::new(p).expect("reference pattern compiles");
    vec![
        (
            RefType::Section,
            vec![
                re(r"(?i)sections?\s+(\d+)(?:\s*\((\d+)\))?"),
                re(r"(?i)sec\.\s*(\d+)"),
            ],
        ),
        (
            RefType::SubSection,
            vec![re(r"(?i)sub-?section\s*\((\d+)\)(?:\s*\(([a-z])\))?")],
        ),
        (
            RefType::Rule,
            vec![re(r"(?i)rules?\s+(\d+)(?:\s*\((\d+)\))?")],
        ),
        (
            RefType::Notification,
            vec![
                re(r"(?i)s\.o\.\s*(\d+)\s*\(?E?\)?"),
                re(r"(?i)g\.s\.r\.\s*(\d+)\s*\(?E?\)?"),
                re(r"(?i)notification\s+no\.\s*(\d+)"),
            ],
        ),
        (
            RefType::Circular,
            vec![
                re(r"(?i)general\s+circular\s+no\.\s*(\d+)(?:/(\d{4}))?"),
                re(r"(?i)circular\s+no\.\s*(\d+)(?:/(\d{4}))?"),
            ],
        ),
        (
            RefType::Form,
            vec![re(r"(?i:form)\s+(?i:no\.\s*)?([A-Z]{2,4}-?\d+)")],
        ),
        (
            RefType::Schedule,
            vec![re(r"(?i)schedule\s+([IVXLCDM]+|\d+)")],
        ),
    ]
});

/// Indicator-phrase groups in precedence order; the generic group is last,
/// so specific legal language always outranks it.
static RELATIONSHIP_INDICATORS: Lazy<Vec<(RefRelation, Regex)>> = Lazy::new(|| {
    let re = |p: &str| Regex::new(p).expect("indicator pattern compiles");
    vec![
        (
            RefRelation::Amends,
            re(r"amended\s+by|as\s+amended|amendment\s+to|substituted\s+by|omitted\s+by|inserted\s+by"),
        ),
        (
            RefRelation::Clarifies,
            re(r"clarified\s+(?:by|in|vide)|clarification|explained\s+in|interpretation"),
        ),
        (
            RefRelation::Implements,
            re(r"in\s+pursuance\s+of|pursuant\s+to|in\s+exercise\s+of|under\s+(?:the\s+)?powers|empowered\s+by"),
        ),
        (
            RefRelation::Proceduralises,
            re(r"procedure\s+for|form\s+for|manner\s+of|prescribed\s+in"),
        ),
        (
            RefRelation::Supersedes,
            re(r"superseded\s+by|replaced\s+by|in\s+supersession\s+of"),
        ),
        (
            RefRelation::References,
            re(r"as\s+per|subject\s+to|notwithstanding|in\s+accordance\s+with|referred\s+to\s+in|mentioned\s+in|specified\s+in|provided\s+in"),
        ),
    ]
});

static FORMAL_CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pursuant|accordance|provisions\s+of|under\s+section").expect("pattern compiles"));

static AMBIGUITY_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:may|might|could)\b|similar\s+to").expect("pattern compiles"));

/// Classify the relationship a citation carries from its context window.
/// First matching indicator group wins.
pub fn classify_relationship(context: &str) -> RefRelation {
    let lowered = context.to_lowercase();
    for (relation, pattern) in RELATIONSHIP_INDICATORS.iter() {
        if pattern.is_match(&lowered) {
            return *relation;
        }
    }
    RefRelation::References
}

/// Score a candidate's confidence from its context.
///
/// Base 0.5; +0.2 for a non-generic relationship; +0.2 for formal citation
/// language; −0.1 for an ambiguity marker. Clamped to [0, 1].
pub fn score_confidence(context: &str, relationship: RefRelation) -> f64 {
    let lowered = context.to_lowercase();
    let mut confidence: f64 = 0.5;

    if !relationship.is_generic() {
        confidence += 0.2;
    }
    if FORMAL_CITATION.is_match(&lowered) {
        confidence += 0.2;
    }
    if AMBIGUITY_MARKER.is_match(&lowered) {
        confidence -= 0.1;
    }

    confidence.clamp(0.0, 1.0)
}

/// Extract all citation candidates from `text`, suppressing section
/// references back to `current_section`, deduplicated by
/// `(ref_type, ref_number, sub_ref)` with the highest confidence winning.
pub fn extract_references(
    text: &str,
    current_section: Option<&str>,
) -> Vec<ExtractedReference> {
    let current: Option<u64> = current_section.and_then(|s| s.trim().parse().ok());
    let mut candidates = Vec::new();

    for (ref_type, patterns) in REFERENCE_PATTERNS.iter() {
        for pattern in patterns {
            for caps in pattern.captures_iter(text) {
                let whole = match caps.get(0) {
                    Some(m) => m,
                    None => continue,
                };
                let ref_number = match caps.get(1) {
                    Some(m) => m.as_str().to_string(),
                    None => continue,
                };
                let sub_ref = caps.get(2).map(|m| m.as_str().to_string());

                if *ref_type == RefType::Section {
                    if let (Some(cur), Ok(n)) = (current, ref_number.parse::<u64>()) {
                        if n == cur {
                            continue;
                        }
                    }
                }

                let context = context_window(text, whole.start(), whole.end());
                let relationship = classify_relationship(&context);
                let confidence = score_confidence(&context, relationship);

                candidates.push(ExtractedReference {
                    ref_type: *ref_type,
                    ref_number,
                    sub_ref,
                    relationship,
                    context,
                    confidence,
                });
            }
        }
    }

    dedup_references(candidates)
}

fn context_window(text: &str, start: usize, end: usize) -> String {
    let window_start = text[..start]
        .char_indices()
        .rev()
        .nth(CONTEXT_CHARS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let window_end = text[end..]
        .char_indices()
        .nth(CONTEXT_CHARS)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());
    text[window_start..window_end].to_string()
}

fn dedup_references(candidates: Vec<ExtractedReference>) -> Vec<ExtractedReference> {
    let mut seen: HashMap<(RefType, String, Option<String>), ExtractedReference> = HashMap::new();
    for candidate in candidates {
        let key = (
            candidate.ref_type,
            candidate.ref_number.clone(),
            candidate.sub_ref.clone(),
        );
        match seen.get(&key) {
            Some(existing) if existing.confidence >= candidate.confidence => {}
            _ => {
                seen.insert(key, candidate);
            }
        }
    }
    let mut out: Vec<ExtractedReference> = seen.into_values().collect();
    out.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.ref_number.cmp(&b.ref_number))
    });
    out
}

/// Resolve a candidate to a concrete parent chunk ID, or `None` when no
/// match exists (unresolvable candidates are discarded, not retried).
pub async fn resolve_reference(
    store: &ChunkStore,
    reference: &ExtractedReference,
    section_width: usize,
) -> Result<Option<String>, StoreError> {
    use crate::governance::DocumentType;

    match reference.ref_type {
        RefType::Section => {
            let section = normalize_section(&reference.ref_number, section_width);
            store
                .parent_by_type_and_section(DocumentType::Act, &section)
                .await
        }
        // Bare sub-section citations carry no section anchor of their own.
        RefType::SubSection => Ok(None),
        RefType::Rule => store.parent_id_like(DocumentType::Rule, &reference.ref_number).await,
        RefType::Notification => {
            store
                .parent_id_like(DocumentType::Notification, &reference.ref_number)
                .await
        }
        RefType::Circular => {
            store
                .parent_id_like(DocumentType::Circular, &reference.ref_number)
                .await
        }
        RefType::Form => {
            let needle = reference.ref_number.to_lowercase().replace('-', "");
            store.parent_id_like(DocumentType::Form, &needle).await
        }
        RefType::Schedule => {
            let needle = reference.ref_number.to_lowercase();
            store.parent_id_like(DocumentType::Schedule, &needle).await
        }
    }
}

/// Full pipeline: extract, filter by confidence, resolve, and write edges.
///
/// Edges that violate a governance type rule are rejected and logged
/// without aborting the document; everything else propagates. Returns
/// ingestion telemetry counts plus the edges actually created.
pub async fn extract_and_link(
    store: &ChunkStore,
    chunk_id: &str,
    text: &str,
    current_section: Option<&str>,
    min_confidence: f64,
    section_width: usize,
) -> Result<ExtractionStats, StoreError> {
    let references = extract_references(text, current_section);
    let mut stats = ExtractionStats {
        extracted: references.len(),
        ..Default::default()
    };

    for reference in references {
        if reference.confidence < min_confidence {
            continue;
        }

        let target = match resolve_reference(store, &reference, section_width).await? {
            Some(t) => t,
            None => continue,
        };
        if target == chunk_id {
            continue;
        }
        stats.resolved += 1;

        let edge = RelationshipEdge {
            from_chunk_id: chunk_id.to_string(),
            to_chunk_id: target,
            relationship: reference.relationship.as_relationship(),
            confidence: reference.confidence,
        };

        match store.insert_relationship(&edge).await {
            Ok(true) => {
                stats.created += 1;
                stats.edges.push(edge);
            }
            Ok(false) => {}
            Err(StoreError::EdgeRule(violation)) => {
                warn!(%violation, from = chunk_id, "rejected extracted edge");
            }
            Err(e) => return Err(e),
        }
    }

    debug!(
        chunk = chunk_id,
        extracted = stats.extracted,
        resolved = stats.resolved,
        created = stats.created,
        "reference extraction finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO: &str = "As per Section 45 of the Act, read with Rule 7 of the \
        deposit rules, as amended by S.O. 1234(E), the company shall file \
        Form DPT-3 within the prescribed time limit. This circular clarifies \
        the provisions of Section 73 pursuant to the notification G.S.R. 567. \
        Reference is also made to General Circular No. 16/2013 and Schedule III.";

    #[test]
    fn catalogue_finds_each_category() {
        let refs = extract_references(DEMO, None);
        let has = |t: RefType, n: &str| refs.iter().any(|r| r.ref_type == t && r.ref_number == n);
        assert!(has(RefType::Section, "45"));
        assert!(has(RefType::Section, "73"));
        assert!(has(RefType::Rule, "7"));
        assert!(has(RefType::Notification, "1234"));
        assert!(has(RefType::Notification, "567"));
        assert!(has(RefType::Circular, "16"));
        assert!(has(RefType::Form, "DPT-3"));
        assert!(has(RefType::Schedule, "III"));
    }

    #[test]
    fn self_references_are_suppressed() {
        let refs = extract_references("See Section 45 and Section 46.", Some("045"));
        assert!(refs.iter().all(|r| r.ref_number != "45"));
        assert!(refs.iter().any(|r| r.ref_number == "46"));
    }

    #[test]
    fn specific_language_outranks_generic() {
        // Both a generic phrase and specific legal language in context;
        // the specific group wins.
        let rel = classify_relationship("as per the notification issued pursuant to the Act");
        assert_eq!(rel, RefRelation::Implements);
    }

    #[test]
    fn classification_falls_back_to_generic() {
        assert_eq!(
            classify_relationship("as per Section 12 of the Act"),
            RefRelation::References
        );
        assert_eq!(
            classify_relationship("the charge shall be registered forthwith"),
            RefRelation::References
        );
    }

    #[test]
    fn confidence_scoring_fixed_strings() {
        // Generic + formal phrase: 0.5 + 0.2
        let c = score_confidence(
            "in accordance with the provisions of Section 45",
            RefRelation::References,
        );
        assert!((c - 0.7).abs() < 1e-9);

        // Specific + formal: 0.5 + 0.2 + 0.2
        let c = score_confidence("pursuant to Section 45 of the Act", RefRelation::Implements);
        assert!((c - 0.9).abs() < 1e-9);

        // Generic + ambiguous: 0.5 - 0.1
        let c = score_confidence(
            "this may be similar to Section 45",
            RefRelation::References,
        );
        assert!((c - 0.4).abs() < 1e-9);
    }

    #[test]
    fn confidence_stays_clamped() {
        for ctx in [
            "pursuant to and in accordance with the provisions of",
            "may might could similar to",
            "",
        ] {
            for rel in [RefRelation::Implements, RefRelation::References] {
                let c = score_confidence(ctx, rel);
                assert!((0.0..=1.0).contains(&c), "{} out of range", c);
            }
        }
    }

    #[test]
    fn duplicates_keep_highest_confidence() {
        let text = "Section 45 applies. Later, pursuant to Section 45, rules were made.";
        let refs = extract_references(text, None);
        let sec45: Vec<_> = refs
            .iter()
            .filter(|r| r.ref_type == RefType::Section && r.ref_number == "45")
            .collect();
        assert_eq!(sec45.len(), 1);
        assert_eq!(sec45[0].relationship, RefRelation::Implements);
        assert!(sec45[0].confidence >= 0.9 - 1e-9);
    }

    #[test]
    fn context_window_is_bounded() {
        let filler = "x".repeat(400);
        let text = format!("{} Section 45 {}", filler, filler);
        let refs = extract_references(&text, None);
        assert_eq!(refs.len(), 1);
        // window = 100 each side + the match itself
        assert!(refs[0].context.chars().count() <= 2 * CONTEXT_CHARS + 12);
    }

    #[test]
    fn generic_reference_persists_as_clarifies() {
        assert_eq!(
            RefRelation::References.as_relationship(),
            Relationship::Clarifies
        );
    }
}
