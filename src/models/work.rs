//! Work models: per-provider records and the merged canonical form.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::{normalize_doi, normalize_whitespace};

/// The external catalogs the aggregator can fan out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAlex,
    Crossref,
    SemanticScholar,
    GoogleScholar,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::OpenAlex,
        ProviderKind::Crossref,
        ProviderKind::SemanticScholar,
        ProviderKind::GoogleScholar,
    ];

    /// Identifier used in tool arguments and diagnostics.
    pub fn id(&self) -> &'static str {
        match self {
            ProviderKind::OpenAlex => "openalex",
            ProviderKind::Crossref => "crossref",
            ProviderKind::SemanticScholar => "semantic_scholar",
            ProviderKind::GoogleScholar => "google_scholar",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAlex => "OpenAlex",
            ProviderKind::Crossref => "Crossref",
            ProviderKind::SemanticScholar => "Semantic Scholar",
            ProviderKind::GoogleScholar => "Google Scholar",
        }
    }

    /// Fixed ranking weight per catalog.
    pub fn weight(&self) -> f64 {
        match self {
            ProviderKind::OpenAlex => 1.0,
            ProviderKind::Crossref => 0.9,
            ProviderKind::SemanticScholar => 1.1,
            ProviderKind::GoogleScholar => 0.7,
        }
    }

    /// Relevance assigned when the catalog supplies none.
    pub fn default_relevance(&self) -> f64 {
        match self {
            ProviderKind::OpenAlex => 0.5,
            ProviderKind::Crossref => 0.5,
            ProviderKind::SemanticScholar => 0.7,
            ProviderKind::GoogleScholar => 0.4,
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.id() == id)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One author as reported by a catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_author_id: Option<String>,
}

impl WorkAuthor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider_author_id: None,
        }
    }

    pub fn with_id(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider_author_id: Some(id.into()),
        }
    }

    /// Lowercased ASCII token stream of the name, for cross-provider matching.
    pub fn normalized_name(&self) -> String {
        crate::utils::normalized_title_key(&self.name)
    }
}

/// Open-access state of a work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAccessInfo {
    pub is_open: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

/// Citation counters. All merges take the max per field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationCounts {
    pub total: u64,
    pub influential: u64,
    pub reference_count: u64,
}

/// A raw per-provider record after adapter normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderWork {
    pub provider: ProviderKind,
    pub provider_id: String,
    pub title: String,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub citations: CitationCounts,
    pub authors: Vec<WorkAuthor>,
    pub open_access: OpenAccessInfo,
    pub external_ids: BTreeMap<String, String>,
    pub fields_of_study: BTreeSet<String>,
    /// Provider-reported relevance in [0, 1].
    pub relevance: f64,
    /// The request URL that produced this record.
    pub source_url: String,
}

impl ProviderWork {
    /// Create a record with normalized title and DOI.
    ///
    /// An empty title falls back to "Untitled"; the DOI, when set later via
    /// [`ProviderWork::set_doi`], is lowercased and stripped of resolver
    /// prefixes.
    pub fn new(provider: ProviderKind, provider_id: impl Into<String>, title: &str) -> Self {
        let normalized = normalize_whitespace(title);
        Self {
            provider,
            provider_id: provider_id.into(),
            title: if normalized.is_empty() {
                "Untitled".to_string()
            } else {
                normalized
            },
            abstract_text: None,
            year: None,
            venue: None,
            doi: None,
            url: None,
            citations: CitationCounts::default(),
            authors: Vec::new(),
            open_access: OpenAccessInfo::default(),
            external_ids: BTreeMap::new(),
            fields_of_study: BTreeSet::new(),
            relevance: provider.default_relevance(),
            source_url: String::new(),
        }
    }

    /// Store a DOI in normalized form; empty input clears nothing.
    pub fn set_doi(&mut self, raw: &str) {
        let doi = normalize_doi(raw);
        if !doi.is_empty() {
            self.external_ids.insert("doi".to_string(), doi.clone());
            self.doi = Some(doi);
        }
    }
}

/// One provider's contribution to a canonical work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub provider: ProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub confidence: f64,
}

/// A single merged representation of one publication across providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalWork {
    /// Stable identity: the DOI when present, else a title/year key.
    pub paper_id: String,
    pub title: String,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub citations: CitationCounts,
    #[serde(default)]
    pub authors: Vec<WorkAuthor>,
    #[serde(default)]
    pub external_ids: BTreeMap<String, String>,
    #[serde(default)]
    pub fields_of_study: BTreeSet<String>,
    #[serde(default)]
    pub open_access: OpenAccessInfo,
    /// Append-only, one entry per contributing provider.
    #[serde(default)]
    pub provenance: Vec<ProvenanceRecord>,
    /// Blended relevance in [0, 1].
    #[serde(default)]
    pub score: f64,
}

impl CanonicalWork {
    pub fn distinct_providers(&self) -> usize {
        let set: BTreeSet<ProviderKind> = self.provenance.iter().map(|p| p.provider).collect();
        set.len()
    }

    /// Identity key: DOI when present, else normalized title plus year.
    pub fn identity(&self) -> String {
        match &self.doi {
            Some(doi) => doi.clone(),
            None => format!(
                "{}|{}",
                crate::utils::normalized_title_key(&self.title),
                self.year.map(|y| y.to_string()).unwrap_or_default()
            ),
        }
    }
}

/// A provider failure captured during fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: ProviderKind,
    pub message: String,
}

/// Inclusive year range after canonicalization at the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i32>,
}

impl YearRange {
    /// A work with no year is always retained.
    pub fn contains(&self, year: Option<i32>) -> bool {
        let Some(year) = year else { return true };
        if let Some(min) = self.min {
            if year < min {
                return false;
            }
        }
        if let Some(max) = self.max {
            if year > max {
                return false;
            }
        }
        true
    }
}

/// Aggregator search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchInput {
    pub query: String,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_range: Option<YearRange>,
    #[serde(default)]
    pub fields_of_study: Vec<String>,
    #[serde(default)]
    pub sources: Vec<ProviderKind>,
}

impl SearchInput {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: 10,
            year_range: None,
            fields_of_study: Vec::new(),
            sources: ProviderKind::ALL.to_vec(),
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn sources(mut self, sources: Vec<ProviderKind>) -> Self {
        self.sources = sources;
        self
    }

    pub fn year_range(mut self, min: Option<i32>, max: Option<i32>) -> Self {
        self.year_range = Some(YearRange { min, max });
        self
    }
}

/// Ranked aggregator output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub results: Vec<CanonicalWork>,
    pub provider_errors: Vec<ProviderFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_title_falls_back() {
        let work = ProviderWork::new(ProviderKind::OpenAlex, "W1", "   ");
        assert_eq!(work.title, "Untitled");
    }

    #[test]
    fn test_set_doi_normalizes() {
        let mut work = ProviderWork::new(ProviderKind::Crossref, "1", "A Title");
        work.set_doi("https://doi.org/10.1234/ABC");
        assert_eq!(work.doi.as_deref(), Some("10.1234/abc"));
        assert_eq!(work.external_ids.get("doi").map(String::as_str), Some("10.1234/abc"));
    }

    #[test]
    fn test_default_relevance_per_provider() {
        assert_eq!(
            ProviderWork::new(ProviderKind::SemanticScholar, "1", "t").relevance,
            0.7
        );
        assert_eq!(
            ProviderWork::new(ProviderKind::GoogleScholar, "1", "t").relevance,
            0.4
        );
    }

    #[test]
    fn test_year_range_retains_null_year() {
        let range = YearRange {
            min: Some(2020),
            max: Some(2022),
        };
        assert!(range.contains(None));
        assert!(range.contains(Some(2021)));
        assert!(!range.contains(Some(2019)));
        assert!(!range.contains(Some(2023)));
    }

    #[test]
    fn test_identity_prefers_doi() {
        let work = CanonicalWork {
            paper_id: "x".into(),
            title: "Some Title".into(),
            abstract_text: None,
            year: Some(2020),
            venue: None,
            doi: Some("10.1/a".into()),
            url: None,
            citations: CitationCounts::default(),
            authors: vec![],
            external_ids: BTreeMap::new(),
            fields_of_study: BTreeSet::new(),
            open_access: OpenAccessInfo::default(),
            provenance: vec![],
            score: 0.0,
        };
        assert_eq!(work.identity(), "10.1/a");
    }
}
