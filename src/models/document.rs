//! Ingestion job and parsed document models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job lifecycle. Transitions only move forward; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// How the ingested PDF was licensed to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseState {
    Unknown,
    OpenAccess,
    UserProvided,
}

/// Requested parser strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    #[default]
    Auto,
    Structured,
    Simple,
}

impl ParseMode {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(ParseMode::Auto),
            "structured" => Some(ParseMode::Structured),
            "simple" => Some(ParseMode::Simple),
            _ => None,
        }
    }
}

/// The source seeds of an ingestion request. At least one locator must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_pdf_path: Option<String>,
    #[serde(default)]
    pub parse_mode: ParseMode,
    #[serde(default = "default_true")]
    pub ocr_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl IngestSource {
    pub fn has_locator(&self) -> bool {
        self.doi.is_some()
            || self.paper_url.is_some()
            || self.pdf_url.is_some()
            || self.local_pdf_path.is_some()
    }

    /// Stable seed string: the same locators always hash to the same
    /// document id.
    pub fn seed(&self) -> String {
        format!(
            "doi={}|url={}|pdf={}|local={}",
            self.doi.as_deref().unwrap_or(""),
            self.paper_url.as_deref().unwrap_or(""),
            self.pdf_url.as_deref().unwrap_or(""),
            self.local_pdf_path.as_deref().unwrap_or(""),
        )
    }
}

/// An asynchronous ingestion job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub job_id: String,
    pub document_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub source: IngestSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parser_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parser_confidence: Option<f64>,
    pub license_state: LicenseState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub warnings: Vec<String>,
    /// Human-readable trace of the resolution and parse steps.
    pub provenance: Vec<String>,
}

/// One heading-delimited slice of a parsed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionChunk {
    pub id: String,
    pub heading: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_start: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_end: Option<u32>,
}

/// One bibliography entry sliced from a parsed document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedReference {
    pub raw_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default)]
    pub authors: Vec<String>,
}

/// Which parser produced the document, and how confident it was.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserInfo {
    pub name: String,
    pub version: String,
    pub confidence: f64,
}

/// What a single parser strategy returns.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub parser_name: String,
    pub parser_version: String,
    pub confidence: f64,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub full_text: String,
    pub sections: Vec<SectionChunk>,
    pub references: Vec<ParsedReference>,
}

/// An ingested, parsed document held in memory for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub document_id: String,
    pub source: IngestSource,
    pub parser: ParserInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    pub full_text: String,
    pub sections: Vec<SectionChunk>,
    pub references: Vec<ParsedReference>,
    pub tables: Vec<String>,
    pub equations: Vec<String>,
    pub figures: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub provenance: Vec<String>,
}

/// Compact view of a document returned alongside a succeeded job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub parser: String,
    pub parser_confidence: f64,
    pub section_count: usize,
    pub reference_count: usize,
    pub full_text_chars: usize,
}

impl DocumentSummary {
    pub fn of(document: &ParsedDocument) -> Self {
        Self {
            document_id: document.document_id.clone(),
            title: document.title.clone(),
            parser: document.parser.name.clone(),
            parser_confidence: document.parser.confidence,
            section_count: document.sections.len(),
            reference_count: document.references.len(),
            full_text_chars: document.full_text.chars().count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_deterministic() {
        let a = IngestSource {
            doi: Some("10.1/x".into()),
            ..IngestSource::default()
        };
        let b = IngestSource {
            doi: Some("10.1/x".into()),
            ..IngestSource::default()
        };
        assert_eq!(a.seed(), b.seed());

        let c = IngestSource {
            doi: Some("10.1/y".into()),
            ..IngestSource::default()
        };
        assert_ne!(a.seed(), c.seed());
    }

    #[test]
    fn test_has_locator() {
        assert!(!IngestSource::default().has_locator());
        let with_url = IngestSource {
            pdf_url: Some("https://example.org/a.pdf".into()),
            ..IngestSource::default()
        };
        assert!(with_url.has_locator());
    }

    #[test]
    fn test_terminal_status() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}
