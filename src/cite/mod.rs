//! Contextual citation engine.
//!
//! Derives a query from manuscript context, ranks the aggregator's canonical
//! works against that context, assembles styled reference lists, and
//! validates manuscripts against supplied reference lists.

pub mod style;
mod validate;

pub use style::{
    csl_object, first_surname, format_bibtex, year_or_nd, CitationStyle, DefaultStyleAdapter,
    FormattedReference, StyleAdapter, StyleError,
};
pub use validate::validate_citations;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Datelike, Utc};
use thiserror::Error;

use crate::graph::{citation_score, LiteratureGraph};
use crate::models::{
    CanonicalWork, CitationCandidate, ProviderKind, ReferenceEntry, ReferenceList, SearchInput,
    SuggestResult,
};
use crate::utils::clamp;

/// Window of trailing context considered for query derivation.
const CONTEXT_WINDOW_CHARS: usize = 2500;
/// Number of salient tokens folded into the derived query.
const QUERY_TOKEN_COUNT: usize = 12;
const MIN_TOKEN_CHARS: usize = 4;
const MATCHED_CONTEXT_CHARS: usize = 280;

#[derive(Debug, Error)]
pub enum CiteError {
    #[error("either manuscript_text or works is required")]
    NoInput,
}

/// Suggestion parameters.
#[derive(Debug, Clone)]
pub struct SuggestInput {
    pub manuscript_text: String,
    pub cursor_context: Option<String>,
    pub style: CitationStyle,
    pub k: usize,
    pub recency_bias: f64,
}

/// Reference list parameters.
#[derive(Debug, Clone)]
pub struct BuildListInput {
    pub style: CitationStyle,
    pub locale: String,
    pub manuscript_text: Option<String>,
    pub works: Option<Vec<CanonicalWork>>,
}

pub struct CitationEngine {
    graph: Arc<LiteratureGraph>,
    adapter: Arc<dyn StyleAdapter>,
}

impl std::fmt::Debug for CitationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CitationEngine").finish()
    }
}

impl CitationEngine {
    pub fn new(graph: Arc<LiteratureGraph>) -> Self {
        Self {
            graph,
            adapter: Arc::new(DefaultStyleAdapter),
        }
    }

    pub fn with_adapter(graph: Arc<LiteratureGraph>, adapter: Arc<dyn StyleAdapter>) -> Self {
        Self { graph, adapter }
    }

    /// Context-aware citation suggestions.
    pub async fn suggest(&self, input: &SuggestInput) -> SuggestResult {
        let context = input
            .cursor_context
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(&input.manuscript_text);
        let window = tail_chars(context, CONTEXT_WINDOW_CHARS);
        let context_tokens = salient_tokens(&window);

        let query = if context_tokens.is_empty() {
            head_chars(&input.manuscript_text, 200)
        } else {
            top_tokens(&context_tokens, QUERY_TOKEN_COUNT).join(" ")
        };

        let k = input.k.max(1);
        let limit = (3 * k).max(k).min(30);
        let search = self
            .graph
            .search(&SearchInput {
                query: query.clone(),
                limit,
                year_range: None,
                fields_of_study: Vec::new(),
                sources: ProviderKind::ALL.to_vec(),
            })
            .await;

        let context_set: HashSet<String> = context_tokens.iter().cloned().collect();
        let current_year = Utc::now().year();

        let mut candidates: Vec<CitationCandidate> = search
            .results
            .into_iter()
            .map(|work| {
                let score = score_candidate(&work, &context_set, input.recency_bias, current_year);
                let matched_context = head_chars(
                    work.abstract_text.as_deref().unwrap_or(&work.title),
                    MATCHED_CONTEXT_CHARS,
                );
                let rationale = format!(
                    "context overlap {:.2}, {} citations{}",
                    overlap(&context_set, &work_tokens(&work)),
                    work.citations.total,
                    work.year
                        .map(|y| format!(", published {y}"))
                        .unwrap_or_default(),
                );
                CitationCandidate {
                    work,
                    relevance_score: score,
                    rationale,
                    matched_context,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(k);

        let inline_suggestion = inline_suggestion(input.style, &candidates);
        SuggestResult {
            query_used: query,
            candidates,
            inline_suggestion,
        }
    }

    /// Assemble a styled reference list from explicit works or a manuscript.
    pub async fn build_reference_list(
        &self,
        input: &BuildListInput,
    ) -> Result<ReferenceList, CiteError> {
        let works = match (&input.works, &input.manuscript_text) {
            (Some(works), _) if !works.is_empty() => works.clone(),
            (_, Some(manuscript)) if !manuscript.trim().is_empty() => {
                let suggestion = self
                    .suggest(&SuggestInput {
                        manuscript_text: manuscript.clone(),
                        cursor_context: None,
                        style: input.style,
                        k: 15,
                        recency_bias: 0.6,
                    })
                    .await;
                suggestion.candidates.into_iter().map(|c| c.work).collect()
            }
            _ => return Err(CiteError::NoInput),
        };

        // Dedupe by DOI, falling back to the paper id.
        let mut seen: HashSet<String> = HashSet::new();
        let mut unique: Vec<CanonicalWork> = Vec::new();
        for work in works {
            let key = work
                .doi
                .clone()
                .unwrap_or_else(|| work.paper_id.clone());
            if seen.insert(key) {
                unique.push(work);
            }
        }

        let mut entries = Vec::new();
        for (index, work) in unique.iter().enumerate() {
            let ordinal = index + 1;
            let formatted = match self
                .adapter
                .format(work, input.style, &input.locale, ordinal)
            {
                Ok(formatted) => formatted,
                Err(error) => {
                    tracing::warn!(%error, paper_id = %work.paper_id, "style adapter failed, using fallback");
                    fallback_reference(work)
                }
            };
            entries.push(ReferenceEntry {
                id: format!("ref_{ordinal}"),
                csl: formatted.csl,
                formatted: formatted.text,
                structured_export: formatted.bibtex,
                source_work: work.clone(),
            });
        }

        let bibliography = entries
            .iter()
            .map(|entry| entry.formatted.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let structured_export = entries
            .iter()
            .map(|entry| entry.structured_export.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let inline = inline_for_works(input.style, &unique);

        Ok(ReferenceList {
            style: input.style.as_str().to_string(),
            locale: input.locale.clone(),
            entries,
            bibliography,
            structured_export,
            inline_suggestion: inline,
        })
    }

    /// Validate a manuscript against a reference list.
    pub fn validate(
        &self,
        manuscript: &str,
        references: &[crate::models::ManuscriptReference],
        expected_style: Option<CitationStyle>,
    ) -> crate::models::ValidationReport {
        validate_citations(manuscript, references, expected_style)
    }
}

/// Textual fallback when the style adapter fails for one entry.
fn fallback_reference(work: &CanonicalWork) -> FormattedReference {
    let author = first_surname(work).unwrap_or_else(|| "Anonymous".to_string());
    let text = format!("{} ({}). {}.", author, year_or_nd(work), work.title);
    FormattedReference {
        text,
        bibtex: format_bibtex(work),
        csl: serde_json::json!({ "id": work.paper_id, "title": work.title }),
    }
}

/// Inline citation heuristic over ranked candidates.
fn inline_suggestion(style: CitationStyle, candidates: &[CitationCandidate]) -> String {
    if candidates.is_empty() {
        return String::new();
    }
    if style.is_numeric() {
        return (1..=candidates.len().min(3))
            .map(|ordinal| format!("[{ordinal}]"))
            .collect::<Vec<_>>()
            .join(", ");
    }
    let parts: Vec<String> = candidates
        .iter()
        .take(3)
        .map(|candidate| {
            format!(
                "{}, {}",
                first_surname(&candidate.work).unwrap_or_else(|| "Anonymous".to_string()),
                year_or_nd(&candidate.work)
            )
        })
        .collect();
    format!("({})", parts.join("; "))
}

fn inline_for_works(style: CitationStyle, works: &[CanonicalWork]) -> String {
    if works.is_empty() {
        return String::new();
    }
    if style.is_numeric() {
        return (1..=works.len().min(3))
            .map(|ordinal| format!("[{ordinal}]"))
            .collect::<Vec<_>>()
            .join(", ");
    }
    let parts: Vec<String> = works
        .iter()
        .take(3)
        .map(|work| {
            format!(
                "{}, {}",
                first_surname(work).unwrap_or_else(|| "Anonymous".to_string()),
                year_or_nd(work)
            )
        })
        .collect();
    format!("({})", parts.join("; "))
}

/// Relevance of one canonical work to the manuscript context.
fn score_candidate(
    work: &CanonicalWork,
    context: &HashSet<String>,
    recency_bias: f64,
    current_year: i32,
) -> f64 {
    let overlap_score = overlap(context, &work_tokens(work));
    let recency = match work.year {
        Some(year) => 1.0 / (current_year - year + 1).max(1) as f64,
        None => 0.15,
    };
    0.55 * overlap_score
        + 0.3 * citation_score(work.citations.total).min(1.0)
        + 0.15 * clamp(recency * recency_bias.max(0.0), 0.0, 1.0)
}

/// `|a ∩ b| / max(|a|, |b|)`.
fn overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    intersection as f64 / a.len().max(b.len()) as f64
}

fn work_tokens(work: &CanonicalWork) -> HashSet<String> {
    let mut text = work.title.clone();
    if let Some(abstract_text) = &work.abstract_text {
        text.push(' ');
        text.push_str(abstract_text);
    }
    salient_tokens(&text).into_iter().collect()
}

/// Lowercased ASCII words of at least four characters.
fn salient_tokens(text: &str) -> Vec<String> {
    crate::utils::tokenize(text)
        .into_iter()
        .filter(|token| token.chars().count() >= MIN_TOKEN_CHARS)
        .collect()
}

/// Most frequent tokens, frequency descending, first occurrence as the tie
/// break so the derived query is deterministic.
fn top_tokens(tokens: &[String], count: usize) -> Vec<String> {
    let mut frequency: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, token) in tokens.iter().enumerate() {
        let entry = frequency.entry(token).or_insert((0, position));
        entry.0 += 1;
    }
    let mut ranked: Vec<(&str, usize, usize)> = frequency
        .into_iter()
        .map(|(token, (occurrences, first))| (token, occurrences, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(count)
        .map(|(token, _, _)| token.to_string())
        .collect()
}

fn tail_chars(text: &str, count: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(count);
    chars[start..].iter().collect()
}

fn head_chars(text: &str, count: usize) -> String {
    text.chars().take(count).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphConfig;
    use crate::models::ProviderWork;
    use crate::providers::mock::{make_work, MockProvider};
    use crate::providers::Provider;

    fn engine_with(works_per_provider: Vec<ProviderWork>) -> CitationEngine {
        let providers: Vec<Arc<dyn Provider>> = ProviderKind::ALL
            .iter()
            .map(|kind| {
                let works: Vec<ProviderWork> = works_per_provider
                    .iter()
                    .filter(|w| w.provider == *kind)
                    .cloned()
                    .collect();
                Arc::new(MockProvider::new(*kind).with_works(works)) as Arc<dyn Provider>
            })
            .collect();
        let graph = Arc::new(LiteratureGraph::new(providers, GraphConfig::default()));
        CitationEngine::new(graph)
    }

    fn retrieval_works() -> Vec<ProviderWork> {
        let mut a = make_work(
            ProviderKind::SemanticScholar,
            "s1",
            "Transformer Retrieval Approaches Surveyed",
            Some(2024),
            120,
        );
        a.abstract_text = Some("We present a transformer retrieval approach survey.".into());
        let mut b = make_work(
            ProviderKind::SemanticScholar,
            "s2",
            "Transformer Models for Dense Retrieval",
            Some(2022),
            300,
        );
        b.abstract_text = Some("A retrieval approach built on transformer encoders.".into());
        let c = make_work(
            ProviderKind::SemanticScholar,
            "s3",
            "Unrelated Botany Field Guide",
            Some(2019),
            4,
        );
        vec![a, b, c]
    }

    #[tokio::test]
    async fn test_suggest_derives_salient_query() {
        let engine = engine_with(retrieval_works());
        let result = engine
            .suggest(&SuggestInput {
                manuscript_text: "We present a transformer retrieval approach.".into(),
                cursor_context: None,
                style: CitationStyle::Ieee,
                k: 3,
                recency_bias: 0.5,
            })
            .await;

        for token in ["transformer", "retrieval", "approach"] {
            assert!(
                result.query_used.contains(token),
                "query {:?} missing {token}",
                result.query_used
            );
        }
        assert!(!result.candidates.is_empty());
        assert_eq!(
            result.inline_suggestion,
            (1..=result.candidates.len().min(3))
                .map(|i| format!("[{i}]"))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    #[tokio::test]
    async fn test_suggest_ranks_overlap_above_noise() {
        let engine = engine_with(retrieval_works());
        let result = engine
            .suggest(&SuggestInput {
                manuscript_text: "We present a transformer retrieval approach.".into(),
                cursor_context: None,
                style: CitationStyle::Apa,
                k: 3,
                recency_bias: 0.5,
            })
            .await;

        assert!(result.candidates[0]
            .work
            .title
            .to_lowercase()
            .contains("transformer"));
        let last = result.candidates.last().unwrap();
        assert!(result.candidates[0].relevance_score >= last.relevance_score);
        assert!(result.inline_suggestion.starts_with('('));
    }

    #[tokio::test]
    async fn test_build_list_from_explicit_works() {
        let engine = engine_with(Vec::new());
        let mut work_a = make_work(ProviderKind::OpenAlex, "W1", "First Paper Title", Some(2020), 10);
        work_a.set_doi("10.1234/a");
        let mut work_b = make_work(ProviderKind::OpenAlex, "W2", "Second Paper Title", Some(2021), 5);
        work_b.set_doi("10.1234/b");
        // Same DOI as A: deduplicated away.
        let mut work_c = make_work(ProviderKind::Crossref, "c1", "First Paper Title Again", Some(2020), 3);
        work_c.set_doi("10.1234/a");

        let graph_works: Vec<CanonicalWork> = {
            let mut set = crate::graph::CanonicalSet::new();
            let now = Utc::now();
            for work in [work_a, work_b, work_c] {
                set.fold(work, now, 0.82);
            }
            set.into_ranked(2, 2026)
        };

        let list = engine
            .build_reference_list(&BuildListInput {
                style: CitationStyle::Apa,
                locale: "en-US".into(),
                manuscript_text: None,
                works: Some(graph_works),
            })
            .await
            .unwrap();

        assert_eq!(list.entries.len(), 2);
        assert!(list.bibliography.contains("First Paper Title"));
        assert!(list.structured_export.contains("@article{"));
    }

    #[tokio::test]
    async fn test_build_list_requires_input() {
        let engine = engine_with(Vec::new());
        let result = engine
            .build_reference_list(&BuildListInput {
                style: CitationStyle::Apa,
                locale: "en-US".into(),
                manuscript_text: None,
                works: None,
            })
            .await;
        assert!(matches!(result, Err(CiteError::NoInput)));
    }

    #[test]
    fn test_overlap_metric() {
        let a: HashSet<String> = ["alpha", "beta", "gamma"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let b: HashSet<String> = ["alpha", "beta"].iter().map(|s| s.to_string()).collect();
        assert!((overlap(&a, &b) - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(overlap(&a, &HashSet::new()), 0.0);
    }

    #[test]
    fn test_top_tokens_deterministic() {
        let tokens: Vec<String> = "alpha beta alpha gamma beta alpha"
            .split_whitespace()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            top_tokens(&tokens, 2),
            vec!["alpha".to_string(), "beta".to_string()]
        );
    }

    #[test]
    fn test_tail_and_head_chars() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("ab", 10), "ab");
        assert_eq!(head_chars("abcdef", 2), "ab");
    }
}
