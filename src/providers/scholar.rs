//! Google Scholar catalog adapter (HTML scraper).
//!
//! Google Scholar has no public API; results are scraped from the HTML result
//! pages. The markup changes without notice, so all selectors are best-effort
//! and challenge pages surface as [`ProviderError::ScrapeBlocked`] rather
//! than empty result sets.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::models::{ProviderKind, ProviderWork, WorkAuthor};
use crate::providers::{Provider, ProviderCapabilities, ProviderError};
use crate::utils::{normalize_whitespace, year_from_text, PacedClient};

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
Chrome/120.0 Safari/537.36";

/// One scraped result row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScholarEntry {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    /// The green "authors - venue, year - publisher" byline, unsplit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cited_by: Option<u64>,
}

/// Parameters for the advanced-search tool.
#[derive(Debug, Clone, Default)]
pub struct AdvancedScholarQuery {
    pub query: String,
    pub author: Option<String>,
    pub year_start: Option<i32>,
    pub year_end: Option<i32>,
    pub exact_phrase: Option<String>,
    pub exclude_words: Option<String>,
    pub title_only: bool,
    pub num_results: usize,
    pub start: usize,
    pub language: String,
}

/// A scraped author profile with a slice of publications.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorProfile {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cited_by: Option<u64>,
    pub interests: Vec<String>,
    pub publications: Vec<ScholarEntry>,
}

#[derive(Debug, Clone)]
pub struct GoogleScholarProvider {
    client: Arc<PacedClient>,
    base_url: String,
}

impl GoogleScholarProvider {
    pub fn new(client: Arc<PacedClient>, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<String, ProviderError> {
        let html = self
            .client
            .get_text(url, &[("user-agent", BROWSER_USER_AGENT)])
            .await
            .map_err(|e| ProviderError::fetch(ProviderKind::GoogleScholar, e))?;

        if is_challenge_page(&html) {
            return Err(ProviderError::ScrapeBlocked);
        }
        Ok(html)
    }

    /// Plain keyword search over result pages.
    pub async fn search_keywords(
        &self,
        query: &str,
        num_results: usize,
        start: usize,
        language: &str,
    ) -> Result<Vec<ScholarEntry>, ProviderError> {
        let url = format!(
            "{}/scholar?hl={}&q={}&start={}&num={}",
            self.base_url,
            urlencoding::encode(language),
            urlencoding::encode(query),
            start,
            num_results.clamp(1, 20),
        );
        let html = self.fetch_page(&url).await?;
        let mut entries = parse_result_rows(&html);
        entries.truncate(num_results);
        Ok(entries)
    }

    /// Advanced search: operators are folded into the `q` parameter the way
    /// the advanced-search form does.
    pub async fn search_advanced(
        &self,
        params: &AdvancedScholarQuery,
    ) -> Result<Vec<ScholarEntry>, ProviderError> {
        let mut q = params.query.clone();
        if let Some(phrase) = &params.exact_phrase {
            q.push_str(&format!(" \"{phrase}\""));
        }
        if let Some(author) = &params.author {
            q.push_str(&format!(" author:\"{author}\""));
        }
        if let Some(exclude) = &params.exclude_words {
            for word in exclude.split_whitespace() {
                q.push_str(&format!(" -{word}"));
            }
        }
        if params.title_only {
            q = format!("allintitle: {q}");
        }

        let mut url = format!(
            "{}/scholar?hl={}&q={}&start={}&num={}",
            self.base_url,
            urlencoding::encode(&params.language),
            urlencoding::encode(q.trim()),
            params.start,
            params.num_results.clamp(1, 20),
        );
        if let Some(year) = params.year_start {
            url.push_str(&format!("&as_ylo={year}"));
        }
        if let Some(year) = params.year_end {
            url.push_str(&format!("&as_yhi={year}"));
        }

        let html = self.fetch_page(&url).await?;
        let mut entries = parse_result_rows(&html);
        entries.truncate(params.num_results);
        Ok(entries)
    }

    /// Look up an author profile and their most cited publications.
    pub async fn author_info(
        &self,
        author_name: &str,
        max_publications: usize,
        language: &str,
    ) -> Result<AuthorProfile, ProviderError> {
        let url = format!(
            "{}/citations?hl={}&view_op=search_authors&mauthors={}",
            self.base_url,
            urlencoding::encode(language),
            urlencoding::encode(author_name),
        );
        let html = self.fetch_page(&url).await?;

        let mut profile = parse_author_card(&html).unwrap_or_else(|| AuthorProfile {
            name: author_name.to_string(),
            ..AuthorProfile::default()
        });

        // Publications come from a plain author-scoped result search; the
        // profile page itself requires a user token we do not carry.
        profile.publications = self
            .search_keywords(
                &format!("author:\"{author_name}\""),
                max_publications,
                0,
                language,
            )
            .await
            .unwrap_or_default();
        profile.publications.truncate(max_publications);
        Ok(profile)
    }
}

#[async_trait]
impl Provider for GoogleScholarProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GoogleScholar
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::SEARCH | ProviderCapabilities::AUTHOR_SEARCH
    }

    async fn search_works(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ProviderWork>, ProviderError> {
        let entries = self.search_keywords(query, limit, 0, "en").await?;
        let source_url = format!("{}/scholar", self.base_url);
        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| entry_to_work(entry, index, &source_url))
            .collect())
    }
}

fn entry_to_work(entry: ScholarEntry, index: usize, source_url: &str) -> ProviderWork {
    let provider_id = entry
        .link
        .clone()
        .unwrap_or_else(|| format!("gs-{index}"));
    let mut work = ProviderWork::new(ProviderKind::GoogleScholar, provider_id, &entry.title);
    work.abstract_text = entry.snippet.clone();
    work.year = entry.year;
    work.url = entry.link.clone();
    work.citations.total = entry.cited_by.unwrap_or(0);
    if let Some(byline) = &entry.byline {
        work.authors = byline
            .split('-')
            .next()
            .unwrap_or("")
            .split(',')
            .map(|name| name.trim())
            .filter(|name| !name.is_empty() && !name.contains('…'))
            .map(WorkAuthor::new)
            .collect();
    }
    if let Some(link) = &entry.link {
        if link.to_lowercase().ends_with(".pdf") {
            work.open_access.is_open = true;
            work.open_access.pdf_url = Some(link.clone());
        }
    }
    work.source_url = source_url.to_string();
    work
}

/// Recognize the interstitial pages Scholar serves to suspected bots.
fn is_challenge_page(html: &str) -> bool {
    let lowered = html.to_lowercase();
    lowered.contains("gs_captcha")
        || lowered.contains("unusual traffic from your computer network")
        || lowered.contains("id=\"recaptcha\"")
        || lowered.contains("/sorry/index")
}

fn parse_result_rows(html: &str) -> Vec<ScholarEntry> {
    let document = Html::parse_document(html);
    let row = Selector::parse("div.gs_r.gs_or").expect("row selector");
    let title = Selector::parse("h3.gs_rt").expect("title selector");
    let title_link = Selector::parse("h3.gs_rt a").expect("link selector");
    let byline = Selector::parse("div.gs_a").expect("byline selector");
    let snippet = Selector::parse("div.gs_rs").expect("snippet selector");
    let footer_links = Selector::parse("div.gs_fl a").expect("footer selector");

    let cited_by_re = Regex::new(r"Cited by (\d+)").expect("cited-by regex");

    let mut entries = Vec::new();
    for element in document.select(&row) {
        let Some(title_el) = element.select(&title).next() else {
            continue;
        };
        let title_text = normalize_whitespace(&title_el.text().collect::<String>());
        // Strip the leading "[PDF]" / "[HTML]" badges Scholar prepends.
        let title_text = title_text
            .trim_start_matches("[PDF]")
            .trim_start_matches("[HTML]")
            .trim_start_matches("[BOOK]")
            .trim_start_matches("[CITATION]")
            .trim()
            .to_string();
        if title_text.is_empty() {
            continue;
        }

        let link = element
            .select(&title_link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| href.to_string());
        let byline_text = element
            .select(&byline)
            .next()
            .map(|el| normalize_whitespace(&el.text().collect::<String>()));
        let snippet_text = element
            .select(&snippet)
            .next()
            .map(|el| normalize_whitespace(&el.text().collect::<String>()));
        let cited_by = element
            .select(&footer_links)
            .filter_map(|a| {
                cited_by_re
                    .captures(&a.text().collect::<String>())
                    .and_then(|c| c[1].parse::<u64>().ok())
            })
            .next();
        let year = byline_text.as_deref().and_then(year_from_text);

        entries.push(ScholarEntry {
            title: title_text,
            link,
            snippet: snippet_text,
            byline: byline_text,
            year,
            cited_by,
        });
    }
    entries
}

fn parse_author_card(html: &str) -> Option<AuthorProfile> {
    let document = Html::parse_document(html);
    let card = Selector::parse("div.gsc_1usr, div.gs_ai").expect("card selector");
    let name = Selector::parse("h3.gs_ai_name, h3.gsc_1usr_name").expect("name selector");
    let affiliation = Selector::parse("div.gs_ai_aff").expect("affiliation selector");
    let cited = Selector::parse("div.gs_ai_cby").expect("cited selector");
    let interest = Selector::parse("a.gs_ai_one_int").expect("interest selector");

    let cited_re = Regex::new(r"(\d+)").expect("digits regex");

    let element = document.select(&card).next()?;
    let name_text = element
        .select(&name)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))?;

    Some(AuthorProfile {
        name: name_text,
        affiliation: element
            .select(&affiliation)
            .next()
            .map(|el| normalize_whitespace(&el.text().collect::<String>())),
        cited_by: element.select(&cited).next().and_then(|el| {
            cited_re
                .captures(&el.text().collect::<String>())
                .and_then(|c| c[1].parse().ok())
        }),
        interests: element
            .select(&interest)
            .map(|el| normalize_whitespace(&el.text().collect::<String>()))
            .collect(),
        publications: Vec::new(),
    })
}
