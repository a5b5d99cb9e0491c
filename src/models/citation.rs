//! Citation engine payloads: suggestions, reference lists, validation.

use serde::{Deserialize, Serialize};

use super::work::CanonicalWork;

/// One ranked citation suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationCandidate {
    pub work: CanonicalWork,
    pub relevance_score: f64,
    pub rationale: String,
    pub matched_context: String,
}

/// Output of a contextual suggestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestResult {
    pub query_used: String,
    pub candidates: Vec<CitationCandidate>,
    pub inline_suggestion: String,
}

/// One bibliographic entry materialized in a requested style.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub id: String,
    /// Common-Style representation handed to the style adapter.
    pub csl: serde_json::Value,
    pub formatted: String,
    /// Structured export in a plain-text-tagged record form (BibTeX).
    pub structured_export: String,
    pub source_work: CanonicalWork,
}

/// A full assembled bibliography.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceList {
    pub style: String,
    pub locale: String,
    pub entries: Vec<ReferenceEntry>,
    pub bibliography: String,
    pub structured_export: String,
    pub inline_suggestion: String,
}

/// A reference supplied by a caller for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManuscriptReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub formatted: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bibtex: Option<String>,
}

/// Per-reference completeness diagnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletenessDiagnostic {
    pub reference_id: String,
    pub missing_fields: Vec<String>,
    pub has_persistent_id: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Result of validating a manuscript against its reference list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub inline_citation_count: usize,
    pub numeric_citations: Vec<u32>,
    pub author_year_citations: Vec<String>,
    pub placeholders: Vec<String>,
    pub missing_references: Vec<String>,
    pub uncited_references: Vec<String>,
    pub duplicate_references: Vec<String>,
    pub completeness_diagnostics: Vec<CompletenessDiagnostic>,
    pub style_warnings: Vec<String>,
}
