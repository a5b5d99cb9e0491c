//! Granular extraction over parsed documents.
//!
//! Pure pattern matching: sentences from the selected sections are tagged
//! into claim/method/limitation buckets, and dataset/metric mentions are
//! collected from the section text. Confidence is floored relative to the
//! parser's own confidence.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{ParsedDocument, ParsedReference, SectionChunk};
use crate::utils::clamp;

const BUCKET_CAP: usize = 25;
const DATASET_CAP: usize = 30;
const MIN_SENTENCE_CHARS: usize = 20;

const METRIC_KEYWORDS: [&str; 10] = [
    "F1", "accuracy", "precision", "recall", "AUC", "RMSE", "MAE", "BLEU", "ROUGE", "mAP",
];

/// Extraction request options.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionRequest {
    /// Keep only sections whose heading contains one of these names
    /// (case-insensitive). Falls back to all sections when nothing matches.
    pub sections: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub include_references: bool,
}

impl Default for ExtractionRequest {
    fn default() -> Self {
        Self {
            sections: None,
            include_references: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// One tagged sentence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedFinding {
    pub text: String,
    pub confidence: f64,
    pub section_id: String,
}

/// Structured details extracted from one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GranularPaperDetails {
    pub document_id: String,
    pub claims: Vec<TaggedFinding>,
    pub methods: Vec<TaggedFinding>,
    pub limitations: Vec<TaggedFinding>,
    pub datasets: Vec<String>,
    pub metrics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<ParsedReference>>,
}

/// Extract claims, methods, limitations, datasets, and metrics.
pub fn extract_details(
    document: &ParsedDocument,
    request: &ExtractionRequest,
) -> GranularPaperDetails {
    let selected = select_sections(&document.sections, request.sections.as_deref());

    let claim_res = compile([
        r"(?i)\bwe (propose|present|show|demonstrate)\b",
        r"(?i)\bthis paper\b",
        r"(?i)\bour (results|findings)\b",
        r"(?i)\bwe find that\b",
    ]);
    let method_res = compile([
        r"(?i)\bmethod(ology)?\b",
        r"(?i)\bapproach\b",
        r"(?i)\bmodel\b",
        r"(?i)\balgorithm\b",
        r"(?i)\bexperimental setup\b",
    ]);
    let limitation_res = compile([
        r"(?i)\blimitation\b",
        r"(?i)\bhowever\b",
        r"(?i)\bfuture work\b",
        r"(?i)\bchallenge\b",
        r"(?i)\bconstraint\b",
    ]);

    let confidence = clamp(document.parser.confidence, 0.4, 1.0);

    let mut claims = Vec::new();
    let mut methods = Vec::new();
    let mut limitations = Vec::new();

    for section in &selected {
        for sentence in split_sentences(&section.text) {
            if sentence.chars().count() <= MIN_SENTENCE_CHARS {
                continue;
            }
            let finding = |text: &str| TaggedFinding {
                text: text.to_string(),
                confidence,
                section_id: section.id.clone(),
            };
            if claims.len() < BUCKET_CAP && claim_res.iter().any(|re| re.is_match(&sentence)) {
                claims.push(finding(&sentence));
            }
            if methods.len() < BUCKET_CAP && method_res.iter().any(|re| re.is_match(&sentence)) {
                methods.push(finding(&sentence));
            }
            if limitations.len() < BUCKET_CAP
                && limitation_res.iter().any(|re| re.is_match(&sentence))
            {
                limitations.push(finding(&sentence));
            }
        }
    }

    GranularPaperDetails {
        document_id: document.document_id.clone(),
        claims,
        methods,
        limitations,
        datasets: detect_datasets(&selected),
        metrics: detect_metrics(&selected),
        references: request
            .include_references
            .then(|| document.references.clone()),
    }
}

fn compile<const N: usize>(patterns: [&str; N]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("extraction regex"))
        .collect()
}

/// Sections whose lowercased heading contains any requested name; all
/// sections when the filter matches nothing or is absent.
fn select_sections<'a>(
    sections: &'a [SectionChunk],
    requested: Option<&[String]>,
) -> Vec<&'a SectionChunk> {
    let Some(requested) = requested.filter(|names| !names.is_empty()) else {
        return sections.iter().collect();
    };
    let wanted: Vec<String> = requested.iter().map(|name| name.to_lowercase()).collect();
    let matched: Vec<&SectionChunk> = sections
        .iter()
        .filter(|section| {
            let heading = section.heading.to_lowercase();
            wanted.iter().any(|name| heading.contains(name))
        })
        .collect();
    if matched.is_empty() {
        sections.iter().collect()
    } else {
        matched
    }
}

/// Split on sentence-final punctuation followed by whitespace.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') && chars.peek().is_some_and(|next| next.is_whitespace()) {
            let sentence = current.trim().to_string();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            current.clear();
        }
    }
    let sentence = current.trim().to_string();
    if !sentence.is_empty() {
        sentences.push(sentence);
    }
    sentences
}

fn detect_datasets(sections: &[&SectionChunk]) -> Vec<String> {
    let re = Regex::new(r"([A-Z][A-Za-z0-9\-]+ (?:dataset|corpus|benchmark))")
        .expect("dataset regex");
    let mut found = Vec::new();
    for section in sections {
        for capture in re.captures_iter(&section.text) {
            let name = capture[1].to_string();
            if !found.contains(&name) {
                found.push(name);
                if found.len() >= DATASET_CAP {
                    return found;
                }
            }
        }
    }
    found
}

fn detect_metrics(sections: &[&SectionChunk]) -> Vec<String> {
    let mut found = Vec::new();
    for keyword in METRIC_KEYWORDS {
        let pattern = format!(r"(?i)\b{}\b", regex::escape(keyword));
        let re = Regex::new(&pattern).expect("metric regex");
        let present = sections.iter().any(|section| re.is_match(&section.text));
        if present {
            let canonical = keyword.to_uppercase();
            if !found.contains(&canonical) {
                found.push(canonical);
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IngestSource, ParserInfo};
    use chrono::Utc;

    fn document_with(sections: Vec<(&str, &str)>) -> ParsedDocument {
        ParsedDocument {
            document_id: "doc_test".into(),
            source: IngestSource::default(),
            parser: ParserInfo {
                name: "simple-text".into(),
                version: "1.0".into(),
                confidence: 0.62,
            },
            title: Some("Test".into()),
            abstract_text: None,
            full_text: String::new(),
            sections: sections
                .into_iter()
                .enumerate()
                .map(|(index, (heading, text))| SectionChunk {
                    id: format!("sec_{}", index + 1),
                    heading: heading.to_string(),
                    text: text.to_string(),
                    page_start: None,
                    page_end: None,
                })
                .collect(),
            references: vec![ParsedReference {
                raw_text: "Doe, J. Sparse indexes. 2019.".into(),
                doi: None,
                title: None,
                year: Some(2019),
                authors: Vec::new(),
            }],
            tables: Vec::new(),
            equations: Vec::new(),
            figures: Vec::new(),
            created_at: Utc::now(),
            provenance: Vec::new(),
        }
    }

    #[test]
    fn test_claims_methods_limitations() {
        let document = document_with(vec![(
            "Introduction",
            "We propose a new retrieval architecture for scholarly graphs. \
             Our algorithm traverses citation edges with adaptive pruning. \
             However, the approach struggles with very sparse graphs. \
             Tiny note.",
        )]);

        let details = extract_details(&document, &ExtractionRequest::default());
        assert_eq!(details.claims.len(), 1);
        assert!(details.claims[0].text.starts_with("We propose"));
        // "algorithm" and "approach" both land in methods.
        assert_eq!(details.methods.len(), 2);
        assert_eq!(details.limitations.len(), 1);
        assert!((details.claims[0].confidence - 0.62).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_floor() {
        let mut document = document_with(vec![(
            "Body",
            "We propose something quite interesting here today.",
        )]);
        document.parser.confidence = 0.1;
        let details = extract_details(&document, &ExtractionRequest::default());
        assert!((details.claims[0].confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_section_filter_and_fallback() {
        let document = document_with(vec![
            ("Introduction", "We propose an idea that changes everything."),
            ("Methods", "Our algorithm is a careful sequence of steps."),
        ]);

        let filtered = extract_details(
            &document,
            &ExtractionRequest {
                sections: Some(vec!["methods".into()]),
                include_references: true,
            },
        );
        assert!(filtered.claims.is_empty());
        assert_eq!(filtered.methods.len(), 1);

        // A filter matching nothing falls back to all sections.
        let fallback = extract_details(
            &document,
            &ExtractionRequest {
                sections: Some(vec!["acknowledgements".into()]),
                include_references: false,
            },
        );
        assert_eq!(fallback.claims.len(), 1);
        assert!(fallback.references.is_none());
    }

    #[test]
    fn test_datasets_and_metrics() {
        let document = document_with(vec![(
            "Results",
            "We evaluate on the MS-MARCO dataset and the BEIR benchmark. \
             Accuracy and F1 improve, while rouge stays flat. \
             The MS-MARCO dataset appears twice in this text.",
        )]);

        let details = extract_details(&document, &ExtractionRequest::default());
        assert_eq!(
            details.datasets,
            vec!["MS-MARCO dataset".to_string(), "BEIR benchmark".to_string()]
        );
        assert_eq!(
            details.metrics,
            vec!["F1".to_string(), "ACCURACY".to_string(), "ROUGE".to_string()]
        );
    }

    #[test]
    fn test_short_sentences_skipped() {
        let document = document_with(vec![("Body", "We propose X. This paper is longer than twenty characters for sure.")]);
        let details = extract_details(&document, &ExtractionRequest::default());
        // "We propose X." is too short to count.
        assert_eq!(details.claims.len(), 1);
        assert!(details.claims[0].text.contains("This paper"));
    }

    #[test]
    fn test_references_included_by_default() {
        let document = document_with(vec![("Body", "Nothing to tag here at all, really.")]);
        let details = extract_details(&document, &ExtractionRequest::default());
        assert_eq!(details.references.unwrap().len(), 1);
    }
}
