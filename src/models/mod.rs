//! Core data models.
//!
//! - [`ProviderWork`]: a raw per-catalog record after adapter normalization
//! - [`CanonicalWork`]: the merged cross-provider representation with
//!   provenance
//! - [`IngestionJob`] / [`ParsedDocument`]: the ingestion pipeline's records
//! - Citation payloads for suggestions, reference lists, and validation

mod citation;
mod document;
mod work;

pub use citation::{
    CitationCandidate, CompletenessDiagnostic, ManuscriptReference, ReferenceEntry, ReferenceList,
    SuggestResult, ValidationReport,
};
pub use document::{
    DocumentSummary, IngestSource, IngestionJob, JobStatus, LicenseState, ParseMode, ParseOutput,
    ParsedDocument, ParsedReference, ParserInfo, SectionChunk,
};
pub use work::{
    CanonicalWork, CitationCounts, OpenAccessInfo, ProvenanceRecord, ProviderFailure, ProviderKind,
    ProviderWork, SearchInput, SearchResult, WorkAuthor, YearRange,
};
