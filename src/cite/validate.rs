//! Manuscript citation validation.
//!
//! Parses numeric and author-year citation patterns out of the manuscript,
//! cross-checks them against the supplied reference list, and emits
//! missing/uncited/duplicate findings plus per-reference completeness
//! diagnostics and style warnings.

use std::collections::BTreeSet;

use regex::Regex;

use crate::cite::style::CitationStyle;
use crate::models::{CompletenessDiagnostic, ManuscriptReference, ValidationReport};
use crate::utils::{find_doi, normalized_title_key, year_from_text};

/// Ranges wider than this are treated as unparseable.
const MAX_RANGE_SPAN: u32 = 100;

struct ParsedCitations {
    ordinals: BTreeSet<u32>,
    invalid_chunks: Vec<String>,
    author_years: Vec<(String, String)>,
    placeholders: Vec<String>,
}

fn parse_citations(manuscript: &str) -> ParsedCitations {
    let placeholder_re = Regex::new(r"\[\s*\]|\[TODO\]|\[CITATION\]").expect("placeholder regex");
    let placeholders: Vec<String> = placeholder_re
        .find_iter(manuscript)
        .map(|m| m.as_str().to_string())
        .collect();

    let bracket_re = Regex::new(r"\[([^\[\]]+)\]").expect("bracket regex");
    let ordinal_re = Regex::new(r"^\d{1,4}$").expect("ordinal regex");
    let range_re = Regex::new(r"^(\d{1,4})\s*[-–]\s*(\d{1,4})$").expect("range regex");

    let mut ordinals = BTreeSet::new();
    let mut invalid_chunks = Vec::new();
    for captures in bracket_re.captures_iter(manuscript) {
        let chunk = captures[1].trim().to_string();
        if chunk.is_empty() || chunk == "TODO" || chunk == "CITATION" {
            continue;
        }
        let mut chunk_valid = true;
        let mut chunk_ordinals = Vec::new();
        for part in chunk.split([',', ';']) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if ordinal_re.is_match(part) {
                if let Ok(value) = part.parse::<u32>() {
                    chunk_ordinals.push(value);
                    continue;
                }
            }
            if let Some(range) = range_re.captures(part) {
                let (start, end) = (
                    range[1].parse::<u32>().unwrap_or(0),
                    range[2].parse::<u32>().unwrap_or(0),
                );
                if start <= end && end <= start + MAX_RANGE_SPAN {
                    chunk_ordinals.extend(start..=end);
                    continue;
                }
            }
            chunk_valid = false;
        }
        if chunk_valid && !chunk_ordinals.is_empty() {
            ordinals.extend(chunk_ordinals);
        } else {
            invalid_chunks.push(chunk);
        }
    }

    // Author-year: parenthesized groups containing "Surname, 2023a"-shaped
    // patterns. Non-ASCII surnames are best-effort and may be missed.
    let group_re = Regex::new(r"\(([^()]*(?:19|20)\d{2}[a-z]?[^()]*)\)").expect("group regex");
    let pair_re = Regex::new(r"([A-Z][A-Za-z'\-]+)[^()\d]{0,40}?((?:19|20)\d{2}[a-z]?)")
        .expect("pair regex");

    let mut author_years = Vec::new();
    for group in group_re.captures_iter(manuscript) {
        for pair in pair_re.captures_iter(&group[1]) {
            author_years.push((pair[1].to_string(), pair[2].to_string()));
        }
    }

    ParsedCitations {
        ordinals,
        invalid_chunks,
        author_years,
        placeholders,
    }
}

/// Duplicate grouping key: DOI when present, else normalized title plus
/// year.
fn duplicate_key(reference: &ManuscriptReference) -> String {
    let haystack = reference
        .bibtex
        .as_deref()
        .unwrap_or(&reference.formatted);
    if let Some(doi) = find_doi(haystack).or_else(|| find_doi(&reference.formatted)) {
        return format!("doi:{doi}");
    }
    let year = year_from_text(&reference.formatted)
        .map(|y| y.to_string())
        .unwrap_or_default();
    match reference_title(reference) {
        Some(title) => format!("title:{}|{}", normalized_title_key(&title), year),
        // No title-shaped segment found; the whole text is the best key left.
        None => format!(
            "text:{}|{}",
            normalized_title_key(&reference.formatted),
            year
        ),
    }
}

/// Best-effort title extraction: the BibTeX title field when present, else a
/// quoted segment, else the sentence following the year parenthetical.
fn reference_title(reference: &ManuscriptReference) -> Option<String> {
    if let Some(bibtex) = &reference.bibtex {
        if let Some(title) = bibtex_field(bibtex, "title") {
            return Some(title);
        }
    }
    let formatted = &reference.formatted;

    let quoted_re = Regex::new(r#""([^"]+)""#).expect("quoted title regex");
    if let Some(captures) = quoted_re.captures(formatted) {
        let title = captures[1].trim_end_matches([',', '.']).trim();
        if !title.is_empty() {
            return Some(title.to_string());
        }
    }

    let after_year_re =
        Regex::new(r"\((?:19|20)\d{2}[a-z]?\)\.?\s*([^.]+)").expect("post-year title regex");
    after_year_re
        .captures(formatted)
        .map(|captures| captures[1].trim().to_string())
        .filter(|title| !title.is_empty())
}

fn reference_label(reference: &ManuscriptReference, index: usize) -> String {
    reference
        .id
        .clone()
        .unwrap_or_else(|| format!("ref_{}", index + 1))
}

fn bibtex_field(bibtex: &str, field: &str) -> Option<String> {
    let pattern = format!(r#"(?i){field}\s*=\s*[{{"]([^}}"]+)[}}"]"#);
    Regex::new(&pattern)
        .ok()?
        .captures(bibtex)
        .map(|c| c[1].trim().to_string())
}

fn completeness(reference: &ManuscriptReference, index: usize) -> CompletenessDiagnostic {
    let formatted = &reference.formatted;
    let mut missing = Vec::new();

    let (has_author, has_year, has_title, has_source) = match &reference.bibtex {
        Some(bibtex) => (
            bibtex_field(bibtex, "author").is_some(),
            bibtex_field(bibtex, "year").is_some() || year_from_text(formatted).is_some(),
            bibtex_field(bibtex, "title").is_some(),
            bibtex_field(bibtex, "journal")
                .or_else(|| bibtex_field(bibtex, "booktitle"))
                .is_some(),
        ),
        None => {
            // Heuristics over the formatted text only.
            let author_re = Regex::new(r"^[A-Z][A-Za-z'\-]+").expect("author regex");
            let segments = formatted
                .split(". ")
                .filter(|s| !s.trim().is_empty())
                .count();
            (
                author_re.is_match(formatted),
                year_from_text(formatted).is_some(),
                formatted.split_whitespace().count() >= 5,
                segments >= 3,
            )
        }
    };

    if !has_author {
        missing.push("author".to_string());
    }
    if !has_year {
        missing.push("year".to_string());
    }
    if !has_title {
        missing.push("title".to_string());
    }
    if !has_source {
        missing.push("source".to_string());
    }

    let doi = find_doi(formatted)
        .or_else(|| reference.bibtex.as_deref().and_then(find_doi));
    let has_persistent_id = doi.is_some() || formatted.contains("http");
    let suggestion = doi.filter(|_| !formatted.contains("doi.org/")).map(|doi| {
        format!("Append https://doi.org/{doi} to the formatted reference.")
    });

    CompletenessDiagnostic {
        reference_id: reference_label(reference, index),
        missing_fields: missing,
        has_persistent_id,
        suggestion,
    }
}

/// Validate a manuscript against its reference list.
pub fn validate_citations(
    manuscript: &str,
    references: &[ManuscriptReference],
    expected_style: Option<CitationStyle>,
) -> ValidationReport {
    let parsed = parse_citations(manuscript);
    let mut report = ValidationReport {
        inline_citation_count: parsed.ordinals.len() + parsed.author_years.len(),
        numeric_citations: parsed.ordinals.iter().copied().collect(),
        author_year_citations: parsed
            .author_years
            .iter()
            .map(|(surname, year)| format!("{surname}, {year}"))
            .collect(),
        placeholders: parsed.placeholders.clone(),
        ..ValidationReport::default()
    };

    // Missing references: ordinals outside [1, len], and cited surnames that
    // appear in no reference's formatted text.
    for ordinal in &parsed.ordinals {
        if *ordinal == 0 || *ordinal as usize > references.len() {
            report.missing_references.push(format!("[{ordinal}]"));
        }
    }
    for (surname, year) in &parsed.author_years {
        let needle = surname.to_lowercase();
        let found = references
            .iter()
            .any(|reference| reference.formatted.to_lowercase().contains(&needle));
        if !found {
            report.missing_references.push(format!("({surname}, {year})"));
        }
    }

    // Uncited references: neither cited by 1-based index nor matched by
    // surname.
    for (index, reference) in references.iter().enumerate() {
        let ordinal = (index + 1) as u32;
        let cited_numerically = parsed.ordinals.contains(&ordinal);
        let formatted_lower = reference.formatted.to_lowercase();
        let cited_by_surname = parsed
            .author_years
            .iter()
            .any(|(surname, _)| formatted_lower.contains(&surname.to_lowercase()));
        if !cited_numerically && !cited_by_surname {
            report
                .uncited_references
                .push(reference_label(reference, index));
        }
    }

    // Duplicates: one diagnostic per member beyond the group's first.
    let mut seen: Vec<(String, String)> = Vec::new();
    for (index, reference) in references.iter().enumerate() {
        let key = duplicate_key(reference);
        let label = reference_label(reference, index);
        match seen.iter().find(|(k, _)| *k == key) {
            Some((_, first_label)) => {
                report
                    .duplicate_references
                    .push(format!("{label} duplicates {first_label}"));
            }
            None => seen.push((key, label)),
        }
    }

    for (index, reference) in references.iter().enumerate() {
        report
            .completeness_diagnostics
            .push(completeness(reference, index));
    }

    // Style warnings.
    for placeholder in &parsed.placeholders {
        report
            .style_warnings
            .push(format!("Placeholder citation found: {placeholder}"));
    }
    for chunk in &parsed.invalid_chunks {
        report
            .style_warnings
            .push(format!("Unparseable citation bracket: [{chunk}]"));
    }
    if !parsed.ordinals.is_empty() && !parsed.author_years.is_empty() {
        report
            .style_warnings
            .push("mixed numeric and author-year citation patterns detected".to_string());
    }
    if let Some(style) = expected_style {
        if style.is_numeric() && !parsed.author_years.is_empty() {
            report.style_warnings.push(format!(
                "Expected numeric citations for {style}, but author-year citations are present."
            ));
        }
        if !style.is_numeric() && !parsed.ordinals.is_empty() {
            report.style_warnings.push(format!(
                "Expected author-year citations for {style}, but numeric citations are present."
            ));
        }
        if style == CitationStyle::Apa {
            let missing_ids = report
                .completeness_diagnostics
                .iter()
                .filter(|d| !d.has_persistent_id)
                .count();
            if missing_ids > 0 {
                report.style_warnings.push(format!(
                    "{missing_ids} reference(s) missing a persistent identifier (DOI or URL)."
                ));
            }
        }
    }
    if references.is_empty() {
        report
            .style_warnings
            .push("Reference list is empty.".to_string());
    }

    report
}
