//! Text normalization helpers shared across the aggregator, parsers, and
//! citation engine.

use std::collections::HashSet;

use regex::Regex;

/// Collapse runs of whitespace to single spaces and trim.
pub fn normalize_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a DOI: lowercase, strip resolver prefixes and a leading `doi:`.
///
/// Idempotent: normalizing an already-normalized DOI is a no-op.
pub fn normalize_doi(raw: &str) -> String {
    let mut doi = raw.trim().to_lowercase();
    for prefix in [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi:",
    ] {
        if let Some(rest) = doi.strip_prefix(prefix) {
            doi = rest.trim().to_string();
        }
    }
    doi
}

/// Accept an integer publication year in the plausible range.
pub fn year_from_int(value: i64) -> Option<i32> {
    if (1000..=2100).contains(&value) {
        Some(value as i32)
    } else {
        None
    }
}

/// First `(19|20)\d\d` occurrence in a string, if any.
pub fn year_from_text(value: &str) -> Option<i32> {
    let re = Regex::new(r"(19|20)\d{2}").expect("year regex");
    re.find(value).and_then(|m| m.as_str().parse().ok())
}

/// Lowercased ASCII-alphanumeric token stream.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            current.push(ch.to_ascii_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Canonical key for title comparison: lowercase alphanumeric tokens joined
/// by single spaces.
pub fn normalized_title_key(title: &str) -> String {
    tokenize(title).join(" ")
}

/// Title tokens as a set, for Jaccard comparison.
pub fn title_token_set(title: &str) -> HashSet<String> {
    tokenize(title).into_iter().collect()
}

/// Jaccard similarity of two token sets. Empty-vs-empty is 0.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

/// First DOI-shaped substring, normalized, if any.
pub fn find_doi(text: &str) -> Option<String> {
    let re = Regex::new(r"(?i)10\.\d{4,9}/[-._;()/:A-Z0-9]+").expect("doi regex");
    re.find(text).map(|m| {
        normalize_doi(m.as_str())
            .trim_end_matches(['.', ',', ';'])
            .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n b\t\tc "), "a b c");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn test_normalize_doi_strips_resolver() {
        assert_eq!(normalize_doi("https://doi.org/10.1234/ABC"), "10.1234/abc");
        assert_eq!(normalize_doi("http://dx.doi.org/10.1234/abc"), "10.1234/abc");
        assert_eq!(normalize_doi("doi:10.1234/abc"), "10.1234/abc");
    }

    #[test]
    fn test_normalize_doi_idempotent() {
        let once = normalize_doi("https://doi.org/10.1234/Test.X");
        assert_eq!(normalize_doi(&once), once);
    }

    #[test]
    fn test_year_parsing() {
        assert_eq!(year_from_int(2023), Some(2023));
        assert_eq!(year_from_int(999), None);
        assert_eq!(year_from_int(2101), None);
        assert_eq!(year_from_text("Published in 2019, revised"), Some(2019));
        assert_eq!(year_from_text("no year here"), None);
    }

    #[test]
    fn test_title_key() {
        assert_eq!(
            normalized_title_key("Graph Neural Networks, for Retrieval."),
            "graph neural networks for retrieval"
        );
    }

    #[test]
    fn test_jaccard() {
        let a = title_token_set("graph neural networks");
        let b = title_token_set("graph neural networks");
        assert!((jaccard(&a, &b) - 1.0).abs() < f64::EPSILON);

        let c = title_token_set("entirely different words");
        assert_eq!(jaccard(&a, &c), 0.0);
        assert_eq!(jaccard(&HashSet::new(), &HashSet::new()), 0.0);
    }

    #[test]
    fn test_find_doi() {
        assert_eq!(
            find_doi("see https://doi.org/10.1234/j.cell.2020 for details"),
            Some("10.1234/j.cell.2020".to_string())
        );
        assert_eq!(find_doi("no identifier"), None);
    }
}
