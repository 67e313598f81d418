//! Governance rule table.
//!
//! Pure lookups mapping a document type to its binding flag, retrieval
//! priority tier, authority level, and refusal policy. Every piece of
//! per-type branching in the pipeline goes through this table, so adding a
//! document type is a one-line edit per lookup.
//!
//! Unknown document types fail open to the least authoritative tier
//! (priority 4, commentary, non-binding) — never to the most authoritative.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Document types recognized by the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Act,
    Rule,
    Regulation,
    Order,
    Notification,
    Circular,
    Guideline,
    Sop,
    Form,
    Schedule,
    Register,
    Return,
    QaBook,
    Commentary,
    Textbook,
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 16] = [
        DocumentType::Act,
        DocumentType::Rule,
        DocumentType::Regulation,
        DocumentType::Order,
        DocumentType::Notification,
        DocumentType::Circular,
        DocumentType::Guideline,
        DocumentType::Sop,
        DocumentType::Form,
        DocumentType::Schedule,
        DocumentType::Register,
        DocumentType::Return,
        DocumentType::QaBook,
        DocumentType::Commentary,
        DocumentType::Textbook,
        DocumentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Act => "act",
            DocumentType::Rule => "rule",
            DocumentType::Regulation => "regulation",
            DocumentType::Order => "order",
            DocumentType::Notification => "notification",
            DocumentType::Circular => "circular",
            DocumentType::Guideline => "guideline",
            DocumentType::Sop => "sop",
            DocumentType::Form => "form",
            DocumentType::Schedule => "schedule",
            DocumentType::Register => "register",
            DocumentType::Return => "return",
            DocumentType::QaBook => "qa_book",
            DocumentType::Commentary => "commentary",
            DocumentType::Textbook => "textbook",
            DocumentType::Other => "other",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = std::convert::Infallible;

    /// Parse a document type string. Anything unrecognized maps to
    /// [`DocumentType::Other`] rather than failing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "act" => DocumentType::Act,
            "rule" | "rules" => DocumentType::Rule,
            "regulation" | "regulations" => DocumentType::Regulation,
            "order" | "orders" => DocumentType::Order,
            "notification" | "notifications" => DocumentType::Notification,
            "circular" | "circulars" => DocumentType::Circular,
            "guideline" | "guidelines" => DocumentType::Guideline,
            "sop" => DocumentType::Sop,
            "form" | "forms" => DocumentType::Form,
            "schedule" | "schedules" => DocumentType::Schedule,
            "register" => DocumentType::Register,
            "return" | "returns" => DocumentType::Return,
            "qa_book" | "qa" => DocumentType::QaBook,
            "commentary" => DocumentType::Commentary,
            "textbook" | "textbooks" => DocumentType::Textbook,
            _ => DocumentType::Other,
        })
    }
}

/// How much legal weight a document type carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityLevel {
    Statutory,
    Interpretive,
    Procedural,
    Commentary,
}

impl AuthorityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorityLevel::Statutory => "statutory",
            AuthorityLevel::Interpretive => "interpretive",
            AuthorityLevel::Procedural => "procedural",
            AuthorityLevel::Commentary => "commentary",
        }
    }
}

impl FromStr for AuthorityLevel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "statutory" => AuthorityLevel::Statutory,
            "interpretive" => AuthorityLevel::Interpretive,
            "procedural" => AuthorityLevel::Procedural,
            _ => AuthorityLevel::Commentary,
        })
    }
}

/// Refusal policy derived once from `(document_type, priority)` and copied
/// onto every chunk. Never mutated by retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefusalPolicy {
    pub can_answer_standalone: bool,
    pub must_reference_parent_law: bool,
    pub refuse_if_parent_missing: bool,
}

/// Typed edges between chunks. `PartOf` and `Precedes` are structural and
/// written only by the chunking engine; the rest are semantic/legal edges
/// between parent documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    Clarifies,
    Proceduralises,
    Implements,
    Amends,
    Supersedes,
    PartOf,
    Precedes,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::Clarifies => "clarifies",
            Relationship::Proceduralises => "proceduralises",
            Relationship::Implements => "implements",
            Relationship::Amends => "amends",
            Relationship::Supersedes => "supersedes",
            Relationship::PartOf => "part_of",
            Relationship::Precedes => "precedes",
        }
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, Relationship::PartOf | Relationship::Precedes)
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relationship {
    type Err = UnknownRelationship;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clarifies" => Ok(Relationship::Clarifies),
            "proceduralises" => Ok(Relationship::Proceduralises),
            "implements" => Ok(Relationship::Implements),
            "amends" => Ok(Relationship::Amends),
            "supersedes" => Ok(Relationship::Supersedes),
            "part_of" => Ok(Relationship::PartOf),
            "precedes" => Ok(Relationship::Precedes),
            other => Err(UnknownRelationship(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown relationship type: {0}")]
pub struct UnknownRelationship(pub String);

/// Whether the document type carries legal force.
pub fn binding(document_type: DocumentType) -> bool {
    matches!(
        document_type,
        DocumentType::Act
            | DocumentType::Rule
            | DocumentType::Regulation
            | DocumentType::Order
            | DocumentType::Notification
    )
}

/// Retrieval priority tier, 1 (primary law) through 4 (commentary).
pub fn priority(document_type: DocumentType) -> u8 {
    match document_type {
        DocumentType::Act => 1,
        DocumentType::Rule
        | DocumentType::Regulation
        | DocumentType::Order
        | DocumentType::Notification
        | DocumentType::Circular => 2,
        DocumentType::Guideline
        | DocumentType::Sop
        | DocumentType::Form
        | DocumentType::Schedule
        | DocumentType::Register
        | DocumentType::Return => 3,
        DocumentType::QaBook
        | DocumentType::Commentary
        | DocumentType::Textbook
        | DocumentType::Other => 4,
    }
}

pub fn authority_level(document_type: DocumentType) -> AuthorityLevel {
    match document_type {
        DocumentType::Act | DocumentType::Rule | DocumentType::Regulation => {
            AuthorityLevel::Statutory
        }
        DocumentType::Order | DocumentType::Notification | DocumentType::Circular => {
            AuthorityLevel::Interpretive
        }
        DocumentType::Guideline
        | DocumentType::Sop
        | DocumentType::Form
        | DocumentType::Schedule
        | DocumentType::Register
        | DocumentType::Return => AuthorityLevel::Procedural,
        DocumentType::QaBook
        | DocumentType::Commentary
        | DocumentType::Textbook
        | DocumentType::Other => AuthorityLevel::Commentary,
    }
}

/// Refusal policy for a `(document_type, priority)` pair.
///
/// Priority 1 answers standalone. Priority 2 must reference its parent law
/// and refuses outright when the parent is missing. Priority 3/4 answer
/// standalone with contextual framing.
pub fn refusal_policy(_document_type: DocumentType, priority: u8) -> RefusalPolicy {
    match priority {
        1 => RefusalPolicy {
            can_answer_standalone: true,
            must_reference_parent_law: false,
            refuse_if_parent_missing: false,
        },
        2 => RefusalPolicy {
            can_answer_standalone: false,
            must_reference_parent_law: true,
            refuse_if_parent_missing: true,
        },
        _ => RefusalPolicy {
            can_answer_standalone: true,
            must_reference_parent_law: false,
            refuse_if_parent_missing: false,
        },
    }
}

pub fn requires_parent_law(priority: u8) -> bool {
    priority == 2
}

/// The semantic edge a freshly ingested document of this type carries
/// toward the Act section it hangs off. `None` for the Act itself and for
/// the commentary tier, which never originate semantic edges by rule.
pub fn default_relationship(document_type: DocumentType) -> Option<Relationship> {
    match document_type {
        DocumentType::Rule
        | DocumentType::Regulation
        | DocumentType::Notification
        | DocumentType::Order => Some(Relationship::Implements),
        DocumentType::Circular | DocumentType::Guideline => Some(Relationship::Clarifies),
        DocumentType::Sop | DocumentType::Form | DocumentType::Schedule => {
            Some(Relationship::Proceduralises)
        }
        _ => None,
    }
}

/// Type-level compatibility check for semantic edges.
///
/// `implements` may only target statutory documents, and only procedural or
/// subordinate-legislation types may originate it; `amends` is reserved for
/// documents that can alter law. Structural edges carry no type rules here
/// (their role rules are enforced by the store).
pub fn validate_semantic_edge(
    from_type: DocumentType,
    relationship: Relationship,
    to_type: DocumentType,
) -> Result<(), EdgeRuleViolation> {
    match relationship {
        Relationship::Implements => {
            if !matches!(
                to_type,
                DocumentType::Act | DocumentType::Rule | DocumentType::Regulation
            ) {
                return Err(EdgeRuleViolation {
                    from_type,
                    relationship,
                    to_type,
                    reason: "implements may only target statutory documents",
                });
            }
            if matches!(
                from_type,
                DocumentType::QaBook | DocumentType::Commentary | DocumentType::Textbook
            ) {
                return Err(EdgeRuleViolation {
                    from_type,
                    relationship,
                    to_type,
                    reason: "commentary-tier documents cannot implement law",
                });
            }
        }
        Relationship::Amends => {
            if !matches!(
                from_type,
                DocumentType::Act
                    | DocumentType::Rule
                    | DocumentType::Regulation
                    | DocumentType::Notification
            ) {
                return Err(EdgeRuleViolation {
                    from_type,
                    relationship,
                    to_type,
                    reason: "only law-bearing documents can amend",
                });
            }
        }
        _ => {}
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
#[error("{from_type} --[{relationship}]--> {to_type}: {reason}")]
pub struct EdgeRuleViolation {
    pub from_type: DocumentType,
    pub relationship: Relationship,
    pub to_type: DocumentType,
    pub reason: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_type_maps_to_exactly_one_tier() {
        for t in DocumentType::ALL {
            let p = priority(t);
            assert!((1..=4).contains(&p), "{} has priority {}", t, p);
            // Pure: same input, same output.
            assert_eq!(priority(t), p);
            assert_eq!(binding(t), binding(t));
            assert_eq!(authority_level(t), authority_level(t));
        }
    }

    #[test]
    fn primary_law_answers_standalone() {
        let policy = refusal_policy(DocumentType::Act, priority(DocumentType::Act));
        assert!(policy.can_answer_standalone);
        assert!(!policy.refuse_if_parent_missing);
    }

    #[test]
    fn tier_two_refuses_without_parent() {
        for t in [
            DocumentType::Rule,
            DocumentType::Notification,
            DocumentType::Order,
            DocumentType::Circular,
        ] {
            let policy = refusal_policy(t, priority(t));
            assert!(!policy.can_answer_standalone, "{}", t);
            assert!(policy.must_reference_parent_law, "{}", t);
            assert!(policy.refuse_if_parent_missing, "{}", t);
        }
    }

    #[test]
    fn commentary_tier_frames_but_does_not_refuse() {
        let policy = refusal_policy(DocumentType::Textbook, priority(DocumentType::Textbook));
        assert!(policy.can_answer_standalone);
        assert!(!policy.refuse_if_parent_missing);
    }

    #[test]
    fn unknown_type_fails_open_to_least_authoritative() {
        let t: DocumentType = "practice_note".parse().unwrap();
        assert_eq!(t, DocumentType::Other);
        assert_eq!(priority(t), 4);
        assert_eq!(authority_level(t), AuthorityLevel::Commentary);
        assert!(!binding(t));
    }

    #[test]
    fn folder_plurals_parse() {
        assert_eq!(
            "circulars".parse::<DocumentType>().unwrap(),
            DocumentType::Circular
        );
        assert_eq!(
            "notifications".parse::<DocumentType>().unwrap(),
            DocumentType::Notification
        );
    }

    #[test]
    fn structural_edges_are_flagged() {
        assert!(Relationship::PartOf.is_structural());
        assert!(Relationship::Precedes.is_structural());
        assert!(!Relationship::Implements.is_structural());
    }

    #[test]
    fn implements_must_target_statute() {
        assert!(validate_semantic_edge(
            DocumentType::Rule,
            Relationship::Implements,
            DocumentType::Act
        )
        .is_ok());
        assert!(validate_semantic_edge(
            DocumentType::Rule,
            Relationship::Implements,
            DocumentType::Circular
        )
        .is_err());
        assert!(validate_semantic_edge(
            DocumentType::Textbook,
            Relationship::Implements,
            DocumentType::Act
        )
        .is_err());
    }

    #[test]
    fn amends_requires_law_bearing_source() {
        assert!(validate_semantic_edge(
            DocumentType::Notification,
            Relationship::Amends,
            DocumentType::Act
        )
        .is_ok());
        assert!(validate_semantic_edge(
            DocumentType::Circular,
            Relationship::Amends,
            DocumentType::Act
        )
        .is_err());
    }
}
