//! OpenAlex catalog adapter.
//!
//! OpenAlex stores abstracts as an inverted index (token to positions); the
//! adapter rebuilds the plain text in position order. It is also the catalog
//! with a direct DOI endpoint, which the aggregator tries first during DOI
//! resolution.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::models::{ProviderKind, ProviderWork, WorkAuthor};
use crate::providers::{Provider, ProviderCapabilities, ProviderError};
use crate::utils::{clamp, normalize_whitespace, year_from_int, PacedClient};

/// OpenAlex research catalog.
#[derive(Debug, Clone)]
pub struct OpenAlexProvider {
    client: Arc<PacedClient>,
    base_url: String,
    mailto: Option<String>,
}

impl OpenAlexProvider {
    pub fn new(client: Arc<PacedClient>, base_url: String, mailto: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            mailto,
        }
    }

    fn decorate(&self, url: String) -> String {
        match &self.mailto {
            Some(email) => format!("{url}&mailto={}", urlencoding::encode(email)),
            None => url,
        }
    }

    fn parse_work(&self, data: &OaWork, source_url: &str) -> ProviderWork {
        let title = data.display_name.as_deref().or(data.title.as_deref());
        let mut work = ProviderWork::new(
            ProviderKind::OpenAlex,
            data.id.clone().unwrap_or_default(),
            title.unwrap_or_default(),
        );

        if let Some(doi) = &data.doi {
            work.set_doi(doi);
        }
        work.abstract_text = data
            .abstract_inverted_index
            .as_ref()
            .map(decode_inverted_index)
            .filter(|s| !s.is_empty());
        work.year = data.publication_year.and_then(year_from_int);
        work.venue = data
            .primary_location
            .as_ref()
            .and_then(|l| l.source.as_ref())
            .and_then(|s| s.display_name.clone());
        work.url = data.id.clone();
        work.citations.total = data.cited_by_count.unwrap_or(0).max(0) as u64;
        work.citations.reference_count = data.referenced_works_count.unwrap_or(0).max(0) as u64;
        work.authors = data
            .authorships
            .iter()
            .filter_map(|a| {
                let name = a.author.display_name.clone()?;
                Some(match &a.author.id {
                    Some(id) => WorkAuthor::with_id(name, id.clone()),
                    None => WorkAuthor::new(name),
                })
            })
            .collect();
        if let Some(oa) = &data.open_access {
            work.open_access.is_open = oa.is_oa.unwrap_or(false);
            work.open_access.pdf_url = oa.oa_url.clone();
        }
        if let Some(best) = &data.best_oa_location {
            if work.open_access.pdf_url.is_none() {
                work.open_access.pdf_url = best.pdf_url.clone();
            }
            if work.open_access.license.is_none() {
                work.open_access.license = best.license.clone();
            }
        }
        if let Some(ids) = &data.ids {
            for (key, value) in ids {
                work.external_ids.entry(key.clone()).or_insert(value.clone());
            }
        }
        work.fields_of_study = data
            .concepts
            .iter()
            .filter_map(|c| c.display_name.clone())
            .collect();
        if let Some(score) = data.relevance_score {
            work.relevance = clamp(score, 0.0, 1.0);
        }
        work.source_url = source_url.to_string();
        work
    }
}

#[async_trait]
impl Provider for OpenAlexProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAlex
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::SEARCH | ProviderCapabilities::DOI_LOOKUP
    }

    async fn search_works(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ProviderWork>, ProviderError> {
        let url = self.decorate(format!(
            "{}/works?search={}&per-page={}",
            self.base_url,
            urlencoding::encode(query),
            limit.clamp(1, 200),
        ));

        let json = self
            .client
            .get_json(&url, &[])
            .await
            .map_err(|e| ProviderError::fetch(ProviderKind::OpenAlex, e))?;

        let page: OaWorksPage =
            serde_json::from_value(json).map_err(|e| ProviderError::Parse {
                provider: ProviderKind::OpenAlex,
                message: e.to_string(),
            })?;

        Ok(page
            .results
            .iter()
            .map(|w| self.parse_work(w, &url))
            .collect())
    }

    async fn get_work_by_doi(&self, doi: &str) -> Result<Option<ProviderWork>, ProviderError> {
        let mut url = format!(
            "{}/works/https://doi.org/{}",
            self.base_url,
            urlencoding::encode(doi),
        );
        if let Some(email) = &self.mailto {
            url = format!("{url}?mailto={}", urlencoding::encode(email));
        }

        match self.client.get_json(&url, &[]).await {
            Ok(json) => {
                let work: OaWork = serde_json::from_value(json).map_err(|e| {
                    ProviderError::Parse {
                        provider: ProviderKind::OpenAlex,
                        message: e.to_string(),
                    }
                })?;
                Ok(Some(self.parse_work(&work, &url)))
            }
            Err(e) if e.status() == Some(404) => Ok(None),
            Err(e) => Err(ProviderError::fetch(ProviderKind::OpenAlex, e)),
        }
    }
}

/// Rebuild abstract text from OpenAlex's `token -> positions[]` mapping.
///
/// Tokens land at their recorded positions; positions never mentioned stay
/// empty and collapse away with the surrounding whitespace.
fn decode_inverted_index(index: &BTreeMap<String, Vec<usize>>) -> String {
    let max_position = index
        .values()
        .flat_map(|positions| positions.iter().copied())
        .max();
    let Some(max_position) = max_position else {
        return String::new();
    };

    let mut slots: Vec<&str> = vec![""; max_position + 1];
    for (token, positions) in index {
        for &position in positions {
            slots[position] = token.as_str();
        }
    }
    normalize_whitespace(&slots.join(" "))
}

// ===== OpenAlex API types =====

#[derive(Debug, Deserialize)]
struct OaWorksPage {
    #[serde(default)]
    results: Vec<OaWork>,
}

#[derive(Debug, Deserialize)]
struct OaWork {
    id: Option<String>,
    display_name: Option<String>,
    title: Option<String>,
    doi: Option<String>,
    publication_year: Option<i64>,
    cited_by_count: Option<i64>,
    referenced_works_count: Option<i64>,
    relevance_score: Option<f64>,
    abstract_inverted_index: Option<BTreeMap<String, Vec<usize>>>,
    #[serde(default)]
    authorships: Vec<OaAuthorship>,
    open_access: Option<OaOpenAccess>,
    best_oa_location: Option<OaLocation>,
    primary_location: Option<OaPrimaryLocation>,
    ids: Option<BTreeMap<String, String>>,
    #[serde(default)]
    concepts: Vec<OaConcept>,
}

#[derive(Debug, Deserialize)]
struct OaAuthorship {
    author: OaAuthor,
}

#[derive(Debug, Deserialize)]
struct OaAuthor {
    id: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OaOpenAccess {
    is_oa: Option<bool>,
    oa_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    pdf_url: Option<String>,
    license: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OaPrimaryLocation {
    source: Option<OaSource>,
}

#[derive(Debug, Deserialize)]
struct OaSource {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OaConcept {
    display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_inverted_index_orders_by_position() {
        let mut index = BTreeMap::new();
        index.insert("networks".to_string(), vec![2]);
        index.insert("graph".to_string(), vec![0]);
        index.insert("neural".to_string(), vec![1]);
        assert_eq!(decode_inverted_index(&index), "graph neural networks");
    }

    #[test]
    fn test_decode_inverted_index_skips_gaps() {
        let mut index = BTreeMap::new();
        index.insert("sparse".to_string(), vec![0]);
        index.insert("tokens".to_string(), vec![4]);
        assert_eq!(decode_inverted_index(&index), "sparse tokens");
    }

    #[test]
    fn test_decode_inverted_index_repeated_token() {
        let mut index = BTreeMap::new();
        index.insert("the".to_string(), vec![0, 2]);
        index.insert("and".to_string(), vec![1]);
        assert_eq!(decode_inverted_index(&index), "the and the");
    }

    #[test]
    fn test_decode_empty_index() {
        assert_eq!(decode_inverted_index(&BTreeMap::new()), "");
    }
}
