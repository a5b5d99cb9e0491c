//! Semantic Scholar catalog adapter.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::models::{ProviderKind, ProviderWork, WorkAuthor};
use crate::providers::{Provider, ProviderCapabilities, ProviderError};
use crate::utils::{clamp, year_from_int, PacedClient};

const SEARCH_FIELDS: &str = "title,abstract,year,venue,externalIds,citationCount,\
influentialCitationCount,referenceCount,authors,isOpenAccess,openAccessPdf,\
fieldsOfStudy,url";

#[derive(Debug, Clone)]
pub struct SemanticScholarProvider {
    client: Arc<PacedClient>,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarProvider {
    pub fn new(client: Arc<PacedClient>, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        match &self.api_key {
            Some(key) => vec![("x-api-key", key.as_str())],
            None => Vec::new(),
        }
    }

    fn parse_paper(&self, data: &S2Paper, source_url: &str) -> ProviderWork {
        let mut work = ProviderWork::new(
            ProviderKind::SemanticScholar,
            data.paper_id.clone().unwrap_or_default(),
            data.title.as_deref().unwrap_or_default(),
        );

        if let Some(ids) = &data.external_ids {
            for (key, value) in ids {
                if let Some(value) = value.as_str() {
                    if key.eq_ignore_ascii_case("doi") {
                        work.set_doi(value);
                    } else {
                        work.external_ids
                            .insert(key.to_lowercase(), value.to_string());
                    }
                } else if let Some(value) = value.as_i64() {
                    work.external_ids
                        .insert(key.to_lowercase(), value.to_string());
                }
            }
        }
        work.abstract_text = data.abstract_text.clone().filter(|s| !s.is_empty());
        work.year = data.year.and_then(year_from_int);
        work.venue = data.venue.clone().filter(|v| !v.is_empty());
        work.url = data.url.clone();
        work.citations.total = data.citation_count.unwrap_or(0).max(0) as u64;
        work.citations.influential = data.influential_citation_count.unwrap_or(0).max(0) as u64;
        work.citations.reference_count = data.reference_count.unwrap_or(0).max(0) as u64;
        work.authors = data
            .authors
            .iter()
            .filter_map(|a| {
                let name = a.name.clone()?;
                Some(match &a.author_id {
                    Some(id) => WorkAuthor::with_id(name, id.clone()),
                    None => WorkAuthor::new(name),
                })
            })
            .collect();
        work.open_access.is_open = data.is_open_access.unwrap_or(false);
        work.open_access.pdf_url = data.open_access_pdf.as_ref().and_then(|p| p.url.clone());
        work.fields_of_study = data
            .fields_of_study
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect();
        if let Some(score) = data.match_score {
            work.relevance = clamp(score, 0.0, 1.0);
        }
        work.source_url = source_url.to_string();
        work
    }
}

#[async_trait]
impl Provider for SemanticScholarProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SemanticScholar
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::SEARCH
    }

    async fn search_works(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ProviderWork>, ProviderError> {
        let url = format!(
            "{}/graph/v1/paper/search?query={}&limit={}&fields={}",
            self.base_url,
            urlencoding::encode(query),
            limit.clamp(1, 100),
            SEARCH_FIELDS,
        );

        let json = self
            .client
            .get_json(&url, &self.headers())
            .await
            .map_err(|e| ProviderError::fetch(ProviderKind::SemanticScholar, e))?;

        let page: S2SearchPage =
            serde_json::from_value(json).map_err(|e| ProviderError::Parse {
                provider: ProviderKind::SemanticScholar,
                message: e.to_string(),
            })?;

        Ok(page
            .data
            .iter()
            .map(|p| self.parse_paper(p, &url))
            .collect())
    }
}

// ===== Semantic Scholar API types =====

#[derive(Debug, Deserialize)]
struct S2SearchPage {
    #[serde(default)]
    data: Vec<S2Paper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    paper_id: Option<String>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    year: Option<i64>,
    venue: Option<String>,
    url: Option<String>,
    external_ids: Option<serde_json::Map<String, serde_json::Value>>,
    citation_count: Option<i64>,
    influential_citation_count: Option<i64>,
    reference_count: Option<i64>,
    #[serde(default)]
    authors: Vec<S2Author>,
    is_open_access: Option<bool>,
    open_access_pdf: Option<S2OpenAccessPdf>,
    fields_of_study: Option<Vec<String>>,
    match_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Author {
    author_id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2OpenAccessPdf {
    url: Option<String>,
}
