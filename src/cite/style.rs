//! Reference formatting in the supported citation styles.
//!
//! The style adapter is a seam: the engine only depends on the trait, and the
//! built-in adapter formats APA 7th, IEEE, Chicago author-date, and
//! Vancouver, plus a BibTeX export and a Common-Style JSON object.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{CanonicalWork, WorkAuthor};

/// Supported citation styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationStyle {
    Apa,
    Ieee,
    Chicago,
    Vancouver,
}

impl CitationStyle {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "apa" => Some(CitationStyle::Apa),
            "ieee" => Some(CitationStyle::Ieee),
            "chicago" => Some(CitationStyle::Chicago),
            "vancouver" => Some(CitationStyle::Vancouver),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CitationStyle::Apa => "apa",
            CitationStyle::Ieee => "ieee",
            CitationStyle::Chicago => "chicago",
            CitationStyle::Vancouver => "vancouver",
        }
    }

    /// Whether the style cites with bracketed ordinals.
    pub fn is_numeric(&self) -> bool {
        matches!(self, CitationStyle::Ieee | CitationStyle::Vancouver)
    }
}

impl std::fmt::Display for CitationStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("style adapter failed: {0}")]
pub struct StyleError(pub String);

/// A formatted reference plus its structured exports.
#[derive(Debug, Clone)]
pub struct FormattedReference {
    pub text: String,
    pub bibtex: String,
    pub csl: serde_json::Value,
}

/// Maps a work plus style and locale to formatted text and structured
/// exports.
pub trait StyleAdapter: Send + Sync + std::fmt::Debug {
    fn format(
        &self,
        work: &CanonicalWork,
        style: CitationStyle,
        locale: &str,
        index: usize,
    ) -> Result<FormattedReference, StyleError>;
}

/// Built-in formatting adapter.
#[derive(Debug, Clone, Default)]
pub struct DefaultStyleAdapter;

impl StyleAdapter for DefaultStyleAdapter {
    fn format(
        &self,
        work: &CanonicalWork,
        style: CitationStyle,
        _locale: &str,
        index: usize,
    ) -> Result<FormattedReference, StyleError> {
        if work.title.trim().is_empty() {
            return Err(StyleError("work has no title".to_string()));
        }
        let text = match style {
            CitationStyle::Apa => format_apa(work),
            CitationStyle::Ieee => format_ieee(work, index),
            CitationStyle::Chicago => format_chicago(work),
            CitationStyle::Vancouver => format_vancouver(work, index),
        };
        Ok(FormattedReference {
            text,
            bibtex: format_bibtex(work),
            csl: csl_object(work),
        })
    }
}

/// Split a display name into (given, family). Accepts both "First Last" and
/// "Last, First".
fn split_name(name: &str) -> (String, String) {
    if let Some((family, given)) = name.split_once(',') {
        return (given.trim().to_string(), family.trim().to_string());
    }
    let words: Vec<&str> = name.split_whitespace().collect();
    match words.split_last() {
        Some((family, given)) => (given.join(" "), family.to_string()),
        None => (String::new(), name.to_string()),
    }
}

fn initials(given: &str) -> String {
    given
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .map(|c| format!("{}.", c.to_uppercase()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// First author's family name, for fallback text and citation keys.
pub fn first_surname(work: &CanonicalWork) -> Option<String> {
    work.authors.first().map(|author| split_name(&author.name).1)
}

pub fn year_or_nd(work: &CanonicalWork) -> String {
    work.year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "n.d.".to_string())
}

fn format_authors_apa(authors: &[WorkAuthor]) -> String {
    if authors.is_empty() {
        return "Anonymous".to_string();
    }
    let formatted: Vec<String> = authors
        .iter()
        .map(|author| {
            let (given, family) = split_name(&author.name);
            if given.is_empty() {
                family
            } else {
                format!("{}, {}", family, initials(&given))
            }
        })
        .collect();
    match formatted.len() {
        1 => formatted[0].clone(),
        2 => format!("{} & {}", formatted[0], formatted[1]),
        _ => format!(
            "{}, & {}",
            formatted[..formatted.len() - 1].join(", "),
            formatted[formatted.len() - 1]
        ),
    }
}

fn format_authors_ieee(authors: &[WorkAuthor]) -> String {
    if authors.is_empty() {
        return "Anonymous".to_string();
    }
    let formatted: Vec<String> = authors
        .iter()
        .map(|author| {
            let (given, family) = split_name(&author.name);
            if given.is_empty() {
                family
            } else {
                format!("{} {}", initials(&given), family)
            }
        })
        .collect();
    match formatted.len() {
        1 => formatted[0].clone(),
        2 => format!("{} and {}", formatted[0], formatted[1]),
        _ => format!(
            "{}, and {}",
            formatted[..formatted.len() - 1].join(", "),
            formatted[formatted.len() - 1]
        ),
    }
}

fn format_authors_vancouver(authors: &[WorkAuthor]) -> String {
    if authors.is_empty() {
        return "Anonymous".to_string();
    }
    let formatted: Vec<String> = authors
        .iter()
        .take(6)
        .map(|author| {
            let (given, family) = split_name(&author.name);
            let compact: String = given
                .split_whitespace()
                .filter_map(|word| word.chars().next())
                .map(|c| c.to_uppercase().to_string())
                .collect();
            if compact.is_empty() {
                family
            } else {
                format!("{family} {compact}")
            }
        })
        .collect();
    let mut joined = formatted.join(", ");
    if authors.len() > 6 {
        joined.push_str(", et al");
    }
    joined
}

fn format_authors_chicago(authors: &[WorkAuthor]) -> String {
    if authors.is_empty() {
        return "Anonymous".to_string();
    }
    let first = {
        let (given, family) = split_name(&authors[0].name);
        if given.is_empty() {
            family
        } else {
            format!("{family}, {given}")
        }
    };
    match authors.len() {
        1 => first,
        2 => format!("{} and {}", first, authors[1].name),
        _ => format!("{first} et al."),
    }
}

fn doi_suffix(work: &CanonicalWork) -> String {
    match &work.doi {
        Some(doi) => format!(" https://doi.org/{doi}"),
        None => String::new(),
    }
}

fn format_apa(work: &CanonicalWork) -> String {
    let venue = work.venue.as_deref().unwrap_or("");
    let venue_part = if venue.is_empty() {
        String::new()
    } else {
        format!(" {venue}.")
    };
    format!(
        "{} ({}). {}.{}{}",
        format_authors_apa(&work.authors),
        year_or_nd(work),
        work.title,
        venue_part,
        doi_suffix(work),
    )
}

fn format_ieee(work: &CanonicalWork, index: usize) -> String {
    let venue = work.venue.as_deref().unwrap_or("");
    let venue_part = if venue.is_empty() {
        String::new()
    } else {
        format!(" {venue},")
    };
    format!(
        "[{}] {}, \"{},\"{} {}.{}",
        index,
        format_authors_ieee(&work.authors),
        work.title,
        venue_part,
        year_or_nd(work),
        doi_suffix(work),
    )
}

fn format_chicago(work: &CanonicalWork) -> String {
    let venue = work.venue.as_deref().unwrap_or("");
    let venue_part = if venue.is_empty() {
        String::new()
    } else {
        format!(" {venue}.")
    };
    format!(
        "{}. {}. \"{}.\"{}{}",
        format_authors_chicago(&work.authors),
        year_or_nd(work),
        work.title,
        venue_part,
        doi_suffix(work),
    )
}

fn format_vancouver(work: &CanonicalWork, index: usize) -> String {
    let venue = work.venue.as_deref().unwrap_or("");
    let venue_part = if venue.is_empty() {
        String::new()
    } else {
        format!(" {venue}.")
    };
    format!(
        "{}. {}. {}.{} {}.{}",
        index,
        format_authors_vancouver(&work.authors),
        work.title,
        venue_part,
        year_or_nd(work),
        doi_suffix(work),
    )
}

/// BibTeX export: `@article{{key, author = ..., title = ..., ...}}`.
pub fn format_bibtex(work: &CanonicalWork) -> String {
    let surname = first_surname(work).unwrap_or_else(|| "anon".to_string());
    let title_key: String = work
        .title
        .split_whitespace()
        .take(3)
        .flat_map(|word| word.chars().filter(|c| c.is_alphanumeric()))
        .collect();
    let key = format!("{}{}{}", surname, year_or_nd(work).replace('.', ""), title_key);

    let authors = if work.authors.is_empty() {
        "Anonymous".to_string()
    } else {
        work.authors
            .iter()
            .map(|author| {
                let (given, family) = split_name(&author.name);
                if given.is_empty() {
                    family
                } else {
                    format!("{family}, {given}")
                }
            })
            .collect::<Vec<_>>()
            .join(" and ")
    };

    let mut fields = vec![
        format!("  author = {{{authors}}}"),
        format!("  title = {{{}}}", work.title),
    ];
    if let Some(venue) = &work.venue {
        fields.push(format!("  journal = {{{venue}}}"));
    }
    if let Some(year) = work.year {
        fields.push(format!("  year = {{{year}}}"));
    }
    if let Some(doi) = &work.doi {
        fields.push(format!("  doi = {{{doi}}}"));
    }
    if let Some(url) = &work.url {
        fields.push(format!("  url = {{{url}}}"));
    }

    format!("@article{{{key},\n{}\n}}", fields.join(",\n"))
}

/// Common-Style JSON object for downstream tooling.
pub fn csl_object(work: &CanonicalWork) -> serde_json::Value {
    let authors: Vec<serde_json::Value> = work
        .authors
        .iter()
        .map(|author| {
            let (given, family) = split_name(&author.name);
            serde_json::json!({ "family": family, "given": given })
        })
        .collect();

    let mut object = serde_json::json!({
        "id": work.paper_id,
        "type": "article-journal",
        "title": work.title,
        "author": authors,
    });
    if let Some(year) = work.year {
        object["issued"] = serde_json::json!({ "date-parts": [[year]] });
    }
    if let Some(venue) = &work.venue {
        object["container-title"] = serde_json::json!(venue);
    }
    if let Some(doi) = &work.doi {
        object["DOI"] = serde_json::json!(doi);
    }
    if let Some(url) = &work.url {
        object["URL"] = serde_json::json!(url);
    }
    object
}
