//! Crossref catalog adapter.
//!
//! Crossref abstracts arrive as JATS-flavoured XML embedded in the JSON
//! payload; all tag markup is stripped before storage.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::models::{ProviderKind, ProviderWork, WorkAuthor};
use crate::providers::{Provider, ProviderCapabilities, ProviderError};
use crate::utils::{clamp, normalize_whitespace, year_from_int, PacedClient};

#[derive(Debug, Clone)]
pub struct CrossrefProvider {
    client: Arc<PacedClient>,
    base_url: String,
    mailto: Option<String>,
}

impl CrossrefProvider {
    pub fn new(client: Arc<PacedClient>, base_url: String, mailto: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            mailto,
        }
    }

    fn parse_item(&self, item: &CrItem, source_url: &str) -> ProviderWork {
        let title = item.title.first().map(String::as_str).unwrap_or_default();
        let mut work = ProviderWork::new(
            ProviderKind::Crossref,
            item.doi.clone().unwrap_or_default(),
            title,
        );

        if let Some(doi) = &item.doi {
            work.set_doi(doi);
        }
        work.abstract_text = item
            .abstract_text
            .as_deref()
            .map(strip_markup)
            .filter(|s| !s.is_empty());
        work.year = item
            .issued
            .as_ref()
            .and_then(|d| d.date_parts.first())
            .and_then(|parts| parts.first())
            .copied()
            .flatten()
            .and_then(year_from_int);
        work.venue = item.container_title.first().cloned();
        work.url = item.url.clone();
        work.citations.total = item.is_referenced_by_count.unwrap_or(0).max(0) as u64;
        work.citations.reference_count = item.references_count.unwrap_or(0).max(0) as u64;
        work.authors = item
            .author
            .iter()
            .map(|a| {
                let name = match (&a.given, &a.family) {
                    (Some(given), Some(family)) => format!("{given} {family}"),
                    (None, Some(family)) => family.clone(),
                    (Some(given), None) => given.clone(),
                    (None, None) => a.name.clone().unwrap_or_default(),
                };
                match &a.orcid {
                    Some(orcid) => WorkAuthor::with_id(name, orcid.clone()),
                    None => WorkAuthor::new(name),
                }
            })
            .filter(|a| !a.name.is_empty())
            .collect();
        if let Some(license) = item.license.first() {
            work.open_access.license = license.url.clone();
        }
        for link in &item.link {
            let is_pdf = link
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.eq_ignore_ascii_case("application/pdf"));
            if is_pdf && work.open_access.pdf_url.is_none() {
                work.open_access.pdf_url = link.url.clone();
                work.open_access.is_open = true;
            }
        }
        work.fields_of_study = item.subject.iter().cloned().collect();
        if let Some(score) = item.score {
            // Crossref scores are unbounded; squash into [0, 1].
            work.relevance = clamp(score / 100.0, 0.0, 1.0);
        }
        work.source_url = source_url.to_string();
        work
    }
}

#[async_trait]
impl Provider for CrossrefProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Crossref
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::SEARCH
    }

    async fn search_works(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ProviderWork>, ProviderError> {
        let mut url = format!(
            "{}/works?query={}&rows={}",
            self.base_url,
            urlencoding::encode(query),
            limit.clamp(1, 1000),
        );
        if let Some(email) = &self.mailto {
            url = format!("{url}&mailto={}", urlencoding::encode(email));
        }

        let json = self
            .client
            .get_json(&url, &[])
            .await
            .map_err(|e| ProviderError::fetch(ProviderKind::Crossref, e))?;

        let envelope: CrEnvelope =
            serde_json::from_value(json).map_err(|e| ProviderError::Parse {
                provider: ProviderKind::Crossref,
                message: e.to_string(),
            })?;

        Ok(envelope
            .message
            .items
            .iter()
            .map(|item| self.parse_item(item, &url))
            .collect())
    }
}

/// Strip all tag markup and collapse whitespace.
fn strip_markup(value: &str) -> String {
    let re = Regex::new(r"<[^>]*>").expect("markup regex");
    normalize_whitespace(&re.replace_all(value, " "))
}

// ===== Crossref API types =====

#[derive(Debug, Deserialize)]
struct CrEnvelope {
    message: CrMessage,
}

#[derive(Debug, Deserialize)]
struct CrMessage {
    #[serde(default)]
    items: Vec<CrItem>,
}

#[derive(Debug, Deserialize)]
struct CrItem {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(default)]
    title: Vec<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    issued: Option<CrDate>,
    #[serde(rename = "container-title", default)]
    container_title: Vec<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
    #[serde(rename = "is-referenced-by-count")]
    is_referenced_by_count: Option<i64>,
    #[serde(rename = "references-count")]
    references_count: Option<i64>,
    #[serde(default)]
    author: Vec<CrAuthor>,
    #[serde(default)]
    license: Vec<CrLicense>,
    #[serde(default)]
    link: Vec<CrLink>,
    #[serde(default)]
    subject: Vec<String>,
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CrDate {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i64>>>,
}

#[derive(Debug, Deserialize)]
struct CrAuthor {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
    #[serde(rename = "ORCID")]
    orcid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrLicense {
    #[serde(rename = "URL")]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrLink {
    #[serde(rename = "URL")]
    url: Option<String>,
    #[serde(rename = "content-type")]
    content_type: Option<String>,
}
