//! Source resolution: turn an ingestion request into a downloadable PDF URL.
//!
//! Candidate order: explicit `pdf_url`, the canonical work's open-access PDF,
//! a landing URL that already points at a `.pdf`, then landing-page
//! discovery (meta tags, typed links, `.pdf` anchors). Relative links are
//! resolved against the post-redirect landing URL.

use reqwest::Url;
use scraper::{Html, Selector};

use crate::graph::LiteratureGraph;
use crate::models::IngestSource;
use crate::utils::PacedClient;

/// Resolve the best downloadable PDF URL for a remote source, recording each
/// step into the job provenance.
pub async fn resolve_pdf_url(
    client: &PacedClient,
    graph: &LiteratureGraph,
    source: &IngestSource,
    provenance: &mut Vec<String>,
) -> Option<String> {
    if let Some(pdf_url) = &source.pdf_url {
        provenance.push(format!("pdf url supplied directly: {pdf_url}"));
        return Some(pdf_url.clone());
    }

    let mut landing_candidates: Vec<String> = Vec::new();
    if let Some(paper_url) = &source.paper_url {
        landing_candidates.push(paper_url.clone());
    }

    if let Some(doi) = &source.doi {
        match graph.resolve_by_doi(doi).await {
            Some(canonical) => {
                provenance.push(format!(
                    "doi {} resolved to \"{}\"",
                    doi, canonical.title
                ));
                if let Some(pdf_url) = canonical.open_access.pdf_url {
                    provenance.push(format!("open-access pdf from catalog: {pdf_url}"));
                    return Some(pdf_url);
                }
                if let Some(url) = canonical.url {
                    landing_candidates.push(url);
                }
            }
            None => provenance.push(format!("doi {doi} did not resolve to a catalog record")),
        }
    }

    for candidate in &landing_candidates {
        if candidate.to_lowercase().ends_with(".pdf") {
            provenance.push(format!("landing url is already a pdf: {candidate}"));
            return Some(candidate.clone());
        }
    }

    for candidate in &landing_candidates {
        match client.get_text(candidate, &[]).await {
            Ok(html) => {
                if let Some(pdf_url) = discover_pdf_in_html(&html, candidate) {
                    provenance.push(format!("pdf discovered on landing page {candidate}"));
                    return Some(pdf_url);
                }
            }
            Err(error) => {
                tracing::debug!(url = candidate, %error, "landing page fetch failed");
                provenance.push(format!("landing page fetch failed: {candidate}"));
            }
        }
    }

    None
}

/// Extract the first PDF link from a landing page, in priority order:
/// `citation_pdf_url` meta, `og:pdf` meta, a `link` typed as PDF, then the
/// first `.pdf` anchor.
pub fn discover_pdf_in_html(html: &str, base_url: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let citation_meta =
        Selector::parse(r#"meta[name="citation_pdf_url"]"#).expect("meta selector");
    if let Some(content) = document
        .select(&citation_meta)
        .next()
        .and_then(|el| el.value().attr("content"))
    {
        return absolutize(content, base_url);
    }

    let og_meta = Selector::parse(r#"meta[property="og:pdf"]"#).expect("og selector");
    if let Some(content) = document
        .select(&og_meta)
        .next()
        .and_then(|el| el.value().attr("content"))
    {
        return absolutize(content, base_url);
    }

    let typed_link = Selector::parse(r#"link[type="application/pdf"]"#).expect("link selector");
    if let Some(href) = document
        .select(&typed_link)
        .next()
        .and_then(|el| el.value().attr("href"))
    {
        return absolutize(href, base_url);
    }

    let anchor = Selector::parse("a[href]").expect("anchor selector");
    for element in document.select(&anchor) {
        let href = element.value().attr("href")?;
        if href.to_lowercase().split('?').next()?.ends_with(".pdf") {
            return absolutize(href, base_url);
        }
    }

    None
}

fn absolutize(href: &str, base_url: &str) -> Option<String> {
    if let Ok(absolute) = Url::parse(href) {
        return Some(absolute.to_string());
    }
    Url::parse(base_url)
        .ok()?
        .join(href)
        .ok()
        .map(|u| u.to_string())
}
