//! Federated literature aggregator.
//!
//! Fans a query out to the registered catalogs concurrently, folds the
//! surviving records into canonical works, ranks them, and caches the result.
//! A provider failure never fails the aggregate call; it is recorded in the
//! result's `provider_errors`.

mod cache;
mod merge;

pub use cache::SearchCache;
pub use merge::{citation_score, CanonicalSet};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use futures::future::join_all;

use crate::models::{
    CanonicalWork, ProviderFailure, ProviderKind, ProviderWork, SearchInput, SearchResult,
};
use crate::providers::Provider;
use crate::utils::normalize_doi;

/// Aggregator tuning knobs.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Per-provider fan-out size is `ceil(limit * multiplier)`.
    pub provider_result_multiplier: f64,
    /// Jaccard threshold for fuzzy title merging.
    pub fuzzy_title_threshold: f64,
    pub cache_ttl: Duration,
    pub max_cache_entries: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            provider_result_multiplier: 2.0,
            fuzzy_title_threshold: 0.82,
            cache_ttl: Duration::from_secs(60),
            max_cache_entries: 128,
        }
    }
}

pub struct LiteratureGraph {
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
    cache: SearchCache,
    config: GraphConfig,
}

impl std::fmt::Debug for LiteratureGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiteratureGraph")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

impl LiteratureGraph {
    pub fn new(providers: Vec<Arc<dyn Provider>>, config: GraphConfig) -> Self {
        let cache = SearchCache::new(config.cache_ttl, config.max_cache_entries);
        let providers = providers.into_iter().map(|p| (p.kind(), p)).collect();
        Self {
            providers,
            cache,
            config,
        }
    }

    /// Federated search: fan out, filter, merge, rank, cache.
    pub async fn search(&self, input: &SearchInput) -> SearchResult {
        let cache_key = SearchCache::key(input);
        if let Some(hit) = self.cache.get(&cache_key) {
            tracing::debug!(query = %input.query, "graph cache hit");
            return hit;
        }

        let requested: Vec<ProviderKind> = if input.sources.is_empty() {
            ProviderKind::ALL.to_vec()
        } else {
            input.sources.clone()
        };
        let per_provider_limit =
            (input.limit as f64 * self.config.provider_result_multiplier).ceil() as usize;

        let mut tasks = Vec::new();
        for kind in &requested {
            let Some(provider) = self.providers.get(kind).cloned() else {
                continue;
            };
            let query = input.query.clone();
            tasks.push(tokio::spawn(async move {
                let outcome = provider.search_works(&query, per_provider_limit).await;
                (provider.kind(), outcome)
            }));
        }

        let mut provider_errors = Vec::new();
        let mut gathered: Vec<ProviderWork> = Vec::new();
        for joined in join_all(tasks).await {
            match joined {
                Ok((kind, Ok(works))) => {
                    tracing::debug!(provider = kind.id(), count = works.len(), "provider returned");
                    gathered.extend(works);
                }
                Ok((kind, Err(error))) => {
                    tracing::warn!(provider = kind.id(), %error, "provider failed");
                    provider_errors.push(ProviderFailure {
                        provider: kind,
                        message: error.to_string(),
                    });
                }
                Err(join_error) => {
                    tracing::error!(%join_error, "provider task panicked");
                }
            }
        }

        let fields: Vec<String> = input
            .fields_of_study
            .iter()
            .map(|f| f.to_lowercase())
            .collect();
        gathered.retain(|work| {
            let year_ok = input
                .year_range
                .map_or(true, |range| range.contains(work.year));
            let field_ok = fields.is_empty()
                || work
                    .fields_of_study
                    .iter()
                    .any(|f| fields.contains(&f.to_lowercase()));
            year_ok && field_ok
        });

        let fetched_at = Utc::now();
        let mut set = CanonicalSet::new();
        for work in gathered {
            set.fold(work, fetched_at, self.config.fuzzy_title_threshold);
        }

        let mut results = set.into_ranked(requested.len(), Utc::now().year());
        results.truncate(input.limit);

        let payload = SearchResult {
            query: input.query.clone(),
            results,
            provider_errors,
        };
        self.cache.put(cache_key, payload.clone());
        payload
    }

    /// Resolve a DOI to a canonical work.
    ///
    /// Tries the direct-DOI catalog first; on a miss, falls back to a
    /// federated search on the DOI string and picks the canonical whose DOI
    /// matches, else the top result.
    pub async fn resolve_by_doi(&self, doi: &str) -> Option<CanonicalWork> {
        let doi = normalize_doi(doi);
        if doi.is_empty() {
            return None;
        }

        if let Some(provider) = self.providers.get(&ProviderKind::OpenAlex) {
            match provider.get_work_by_doi(&doi).await {
                Ok(Some(work)) => {
                    let mut set = CanonicalSet::new();
                    set.fold(work, Utc::now(), self.config.fuzzy_title_threshold);
                    return set.into_ranked(1, Utc::now().year()).into_iter().next();
                }
                Ok(None) => {
                    tracing::debug!(doi, "direct DOI endpoint had no record");
                }
                Err(error) => {
                    tracing::warn!(doi, %error, "direct DOI lookup failed, falling back to search");
                }
            }
        }

        let input = SearchInput::new(doi.clone()).limit(50).sources(vec![
            ProviderKind::OpenAlex,
            ProviderKind::Crossref,
            ProviderKind::SemanticScholar,
        ]);
        let result = self.search(&input).await;

        let matched = result.results.iter().find(|work| {
            work.doi.as_deref() == Some(doi.as_str())
                || work.external_ids.get("doi").map(String::as_str) == Some(doi.as_str())
        });
        matched.cloned().or_else(|| result.results.first().cloned())
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{make_work, with_authors, MockProvider};

    fn graph_with(providers: Vec<Arc<MockProvider>>) -> LiteratureGraph {
        let providers = providers
            .into_iter()
            .map(|p| p as Arc<dyn Provider>)
            .collect();
        LiteratureGraph::new(providers, GraphConfig::default())
    }

    #[tokio::test]
    async fn test_search_respects_limit_and_order() {
        let works = vec![
            make_work(ProviderKind::OpenAlex, "1", "Old Niche Paper", Some(2001), 1),
            make_work(ProviderKind::OpenAlex, "2", "Fresh Popular Paper", Some(2025), 900),
            make_work(ProviderKind::OpenAlex, "3", "Another Old Paper", Some(2003), 2),
        ];
        let provider = Arc::new(MockProvider::new(ProviderKind::OpenAlex).with_works(works));
        let graph = graph_with(vec![provider]);

        let input = SearchInput::new("query")
            .limit(2)
            .sources(vec![ProviderKind::OpenAlex]);
        let result = graph.search(&input).await;

        assert_eq!(result.results.len(), 2);
        assert_eq!(result.results[0].title, "Fresh Popular Paper");
        assert!(result.provider_errors.is_empty());
    }

    #[tokio::test]
    async fn test_all_providers_failing_yields_errors_per_source() {
        let a = Arc::new(MockProvider::new(ProviderKind::OpenAlex).failing("boom"));
        let b = Arc::new(MockProvider::new(ProviderKind::Crossref).failing("down"));
        let graph = graph_with(vec![a, b]);

        let input = SearchInput::new("anything")
            .sources(vec![ProviderKind::OpenAlex, ProviderKind::Crossref]);
        let result = graph.search(&input).await;

        assert!(result.results.is_empty());
        assert_eq!(result.provider_errors.len(), 2);
    }

    #[tokio::test]
    async fn test_cache_prevents_second_fan_out() {
        let provider = Arc::new(MockProvider::new(ProviderKind::OpenAlex).with_works(vec![
            make_work(ProviderKind::OpenAlex, "1", "Cached Paper", Some(2024), 5),
        ]));
        let graph = graph_with(vec![provider.clone()]);

        let input = SearchInput::new("cache me")
            .limit(10)
            .sources(vec![ProviderKind::OpenAlex]);
        let first = graph.search(&input).await;
        let second = graph.search(&input).await;

        assert_eq!(provider.search_calls(), 1);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_year_filter_drops_out_of_range() {
        let works = vec![
            make_work(ProviderKind::OpenAlex, "1", "In Range", Some(2021), 0),
            make_work(ProviderKind::OpenAlex, "2", "Too Old", Some(2010), 0),
            make_work(ProviderKind::OpenAlex, "3", "No Year", None, 0),
        ];
        let provider = Arc::new(MockProvider::new(ProviderKind::OpenAlex).with_works(works));
        let graph = graph_with(vec![provider]);

        let input = SearchInput::new("q")
            .sources(vec![ProviderKind::OpenAlex])
            .year_range(Some(2020), Some(2022));
        let result = graph.search(&input).await;

        let titles: Vec<&str> = result.results.iter().map(|w| w.title.as_str()).collect();
        assert!(titles.contains(&"In Range"));
        assert!(titles.contains(&"No Year"));
        assert!(!titles.contains(&"Too Old"));
    }

    #[tokio::test]
    async fn test_federated_dedupe_scenario() {
        let a = Arc::new(MockProvider::new(ProviderKind::OpenAlex).with_works(vec![
            with_authors(
                make_work(
                    ProviderKind::OpenAlex,
                    "W1",
                    "Graph Neural Networks for Scientific Retrieval",
                    Some(2023),
                    12,
                ),
                &["Alice Smith"],
            ),
        ]));
        let b = Arc::new(MockProvider::new(ProviderKind::Crossref).with_works(vec![
            with_authors(
                make_work(
                    ProviderKind::Crossref,
                    "c1",
                    "Graph Neural Networks for Scientific Retrieval.",
                    Some(2024),
                    30,
                ),
                &["Alice Smith"],
            ),
        ]));
        let c = Arc::new(MockProvider::new(ProviderKind::SemanticScholar).with_works(vec![
            make_work(
                ProviderKind::SemanticScholar,
                "s1",
                "Unrelated Work on Protein Folding",
                Some(2023),
                4,
            ),
        ]));
        let graph = graph_with(vec![a, b, c]);

        let input = SearchInput::new("graph neural networks").sources(vec![
            ProviderKind::OpenAlex,
            ProviderKind::Crossref,
            ProviderKind::SemanticScholar,
        ]);
        let result = graph.search(&input).await;

        assert_eq!(result.results.len(), 2);
        let merged = result
            .results
            .iter()
            .find(|w| w.title.starts_with("Graph Neural"))
            .unwrap();
        assert_eq!(merged.provenance.len(), 2);
        assert_eq!(merged.citations.total, 30);
    }

    #[tokio::test]
    async fn test_resolve_by_doi_direct_hit() {
        let provider = Arc::new(MockProvider::new(ProviderKind::OpenAlex));
        let mut work = make_work(ProviderKind::OpenAlex, "W9", "Resolved Work", Some(2020), 3);
        work.set_doi("10.5/resolve");
        provider.set_doi_work(Some(work));
        let graph = graph_with(vec![provider]);

        let resolved = graph.resolve_by_doi("https://doi.org/10.5/RESOLVE").await;
        assert_eq!(resolved.unwrap().doi.as_deref(), Some("10.5/resolve"));
    }

    #[tokio::test]
    async fn test_resolve_by_doi_search_fallback() {
        let openalex = Arc::new(MockProvider::new(ProviderKind::OpenAlex));
        let mut fallback_work =
            make_work(ProviderKind::Crossref, "c9", "Fallback Work", Some(2021), 8);
        fallback_work.set_doi("10.5/fallback");
        let crossref =
            Arc::new(MockProvider::new(ProviderKind::Crossref).with_works(vec![fallback_work]));
        let semantic = Arc::new(MockProvider::new(ProviderKind::SemanticScholar));
        let graph = graph_with(vec![openalex, crossref, semantic]);

        let resolved = graph.resolve_by_doi("10.5/fallback").await;
        assert_eq!(resolved.unwrap().title, "Fallback Work");
    }

    #[tokio::test]
    async fn test_resolve_unknown_doi_is_none() {
        let graph = graph_with(vec![
            Arc::new(MockProvider::new(ProviderKind::OpenAlex)),
            Arc::new(MockProvider::new(ProviderKind::Crossref)),
            Arc::new(MockProvider::new(ProviderKind::SemanticScholar)),
        ]);
        assert!(graph.resolve_by_doi("10.0000/nonexistent").await.is_none());
    }
}
