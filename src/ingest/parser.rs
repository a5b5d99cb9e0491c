//! PDF parser chain.
//!
//! Two strategies share one output shape: a structured remote parser that
//! posts the PDF to a full-text-document service and reads back XML, and a
//! lightweight local extractor with line heuristics. The chain tries each in
//! order; a strategy failure is a warning, not a job failure, until every
//! strategy has failed.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use thiserror::Error;

use crate::models::{ParseMode, ParseOutput, ParsedReference, SectionChunk};
use crate::utils::{find_doi, normalize_whitespace, year_from_text, PacedClient};

const STRUCTURED_PARSER_NAME: &str = "structured-xml";
const STRUCTURED_PARSER_VERSION: &str = "1.0";
const SIMPLE_PARSER_NAME: &str = "simple-text";
const SIMPLE_PARSER_VERSION: &str = "1.0";

/// Headings that delimit sections in the simple parser.
const SECTION_HEADINGS: [&str; 12] = [
    "abstract",
    "introduction",
    "background",
    "related work",
    "methods",
    "method",
    "materials",
    "results",
    "discussion",
    "conclusion",
    "limitations",
    "references",
];

#[derive(Debug, Error)]
#[error("{parser}: {message}")]
pub struct ParseFailure {
    pub parser: String,
    pub message: String,
}

impl ParseFailure {
    fn new(parser: &str, message: impl Into<String>) -> Self {
        Self {
            parser: parser.to_string(),
            message: message.into(),
        }
    }
}

/// One parsing strategy.
#[async_trait]
pub trait PdfParser: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    async fn parse(&self, path: &Path) -> Result<ParseOutput, ParseFailure>;
}

/// Resolve the strategy order for a requested mode. The structured parser is
/// skipped when no endpoint is configured.
pub fn resolve_parser_order(
    mode: ParseMode,
    structured: Option<Arc<StructuredParser>>,
    simple: Arc<SimpleParser>,
) -> Vec<Arc<dyn PdfParser>> {
    let mut order: Vec<Arc<dyn PdfParser>> = Vec::new();
    match mode {
        ParseMode::Auto | ParseMode::Structured => {
            if let Some(structured) = structured {
                order.push(structured);
            }
            order.push(simple);
        }
        ParseMode::Simple => {
            order.push(simple);
        }
    }
    order
}

/// Try each parser in order. Failures are collected into `warnings`; the
/// error is returned only when every strategy failed.
pub async fn run_chain(
    parsers: &[Arc<dyn PdfParser>],
    path: &Path,
    warnings: &mut Vec<String>,
) -> Result<ParseOutput, ParseFailure> {
    let mut last_failure = None;
    for parser in parsers {
        match parser.parse(path).await {
            Ok(output) => return Ok(output),
            Err(failure) => {
                tracing::warn!(parser = parser.name(), %failure, "parser failed, trying next");
                warnings.push(failure.to_string());
                last_failure = Some(failure);
            }
        }
    }
    Err(last_failure
        .unwrap_or_else(|| ParseFailure::new("parser-chain", "no parser strategies available")))
}

// ===== Structured (remote) parser =====

/// Posts the PDF to a remote full-text-document service and slices the XML
/// response into title, body text, and bibliography entries.
#[derive(Debug, Clone)]
pub struct StructuredParser {
    client: Arc<PacedClient>,
    endpoint: String,
}

impl StructuredParser {
    pub fn new(client: Arc<PacedClient>, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl PdfParser for StructuredParser {
    fn name(&self) -> &'static str {
        STRUCTURED_PARSER_NAME
    }

    async fn parse(&self, path: &Path) -> Result<ParseOutput, ParseFailure> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ParseFailure::new(self.name(), format!("read failed: {e}")))?;

        let xml = self
            .client
            .post_bytes(&self.endpoint, bytes, "application/pdf")
            .await
            .map_err(|e| ParseFailure::new(self.name(), e.to_string()))?;

        parse_structured_xml(&xml)
            .map_err(|message| ParseFailure::new(STRUCTURED_PARSER_NAME, message))
    }
}

/// Slice a structured-document XML payload.
fn parse_structured_xml(xml: &str) -> Result<ParseOutput, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut title: Option<String> = None;
    let mut in_title = false;
    let mut body_depth = 0usize;
    let mut abstract_depth = 0usize;
    let mut bibl_depth = 0usize;
    let mut body_text = String::new();
    let mut abstract_text = String::new();
    let mut current_heading: Option<String> = None;
    let mut in_head = false;
    let mut head_text = String::new();
    let mut section_text = String::new();
    let mut sections: Vec<SectionChunk> = Vec::new();
    let mut current_bibl = String::new();
    let mut bibl_title: Option<String> = None;
    let mut in_bibl_title = false;
    let mut references: Vec<ParsedReference> = Vec::new();

    let mut push_section =
        |heading: Option<&String>, text: &mut String, sections: &mut Vec<SectionChunk>| {
            let body = normalize_whitespace(text);
            text.clear();
            if body.is_empty() {
                return;
            }
            sections.push(SectionChunk {
                id: format!("sec_{}", sections.len() + 1),
                heading: heading.cloned().unwrap_or_else(|| "Body".to_string()),
                text: body,
                page_start: None,
                page_end: None,
            });
        };

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                let name = local_name(element.name().as_ref());
                match name.as_str() {
                    "title" if bibl_depth > 0 => in_bibl_title = bibl_title.is_none(),
                    "title" if title.is_none() => in_title = true,
                    "body" => body_depth += 1,
                    "abstract" => abstract_depth += 1,
                    "biblStruct" | "bibl" => {
                        bibl_depth += 1;
                        if bibl_depth == 1 {
                            current_bibl.clear();
                            bibl_title = None;
                        }
                    }
                    "head" if body_depth > 0 && bibl_depth == 0 => {
                        push_section(current_heading.as_ref(), &mut section_text, &mut sections);
                        in_head = true;
                        head_text.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::End(element)) => {
                let name = local_name(element.name().as_ref());
                match name.as_str() {
                    "title" if in_bibl_title => {
                        in_bibl_title = false;
                    }
                    "title" if in_title => in_title = false,
                    "body" => {
                        if body_depth > 0 {
                            body_depth -= 1;
                            if body_depth == 0 {
                                push_section(
                                    current_heading.as_ref(),
                                    &mut section_text,
                                    &mut sections,
                                );
                                current_heading = None;
                            }
                        }
                    }
                    "abstract" => abstract_depth = abstract_depth.saturating_sub(1),
                    "biblStruct" | "bibl" => {
                        if bibl_depth > 0 {
                            bibl_depth -= 1;
                            if bibl_depth == 0 {
                                let raw = normalize_whitespace(&current_bibl);
                                if !raw.is_empty() {
                                    references.push(ParsedReference {
                                        doi: find_doi(&raw),
                                        title: bibl_title.take(),
                                        year: year_from_text(&raw),
                                        authors: Vec::new(),
                                        raw_text: raw,
                                    });
                                }
                            }
                        }
                    }
                    "head" if in_head => {
                        in_head = false;
                        current_heading = Some(normalize_whitespace(&head_text));
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(text)) => {
                let value = text
                    .unescape()
                    .map_err(|e| format!("bad XML text: {e}"))?
                    .into_owned();
                if bibl_depth > 0 {
                    if in_bibl_title && bibl_title.is_none() {
                        bibl_title = Some(normalize_whitespace(&value));
                    }
                    current_bibl.push_str(&value);
                    current_bibl.push(' ');
                } else if in_title {
                    title = Some(normalize_whitespace(&value));
                    in_title = false;
                } else if in_head {
                    head_text.push_str(&value);
                    head_text.push(' ');
                } else if abstract_depth > 0 {
                    abstract_text.push_str(&value);
                    abstract_text.push(' ');
                } else if body_depth > 0 {
                    body_text.push_str(&value);
                    body_text.push(' ');
                    section_text.push_str(&value);
                    section_text.push(' ');
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML parse error: {e}")),
            _ => {}
        }
    }

    let full_text = normalize_whitespace(&body_text);
    let confidence = if full_text.is_empty() { 0.65 } else { 0.85 };

    Ok(ParseOutput {
        parser_name: STRUCTURED_PARSER_NAME.to_string(),
        parser_version: STRUCTURED_PARSER_VERSION.to_string(),
        confidence,
        title: title.filter(|t| !t.is_empty()),
        abstract_text: Some(normalize_whitespace(&abstract_text)).filter(|a| !a.is_empty()),
        full_text,
        sections,
        references,
    })
}

fn local_name(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    name.rsplit(':').next().unwrap_or(&name).to_string()
}

// ===== Simple (local) parser =====

/// Lightweight local extractor: raw text plus line heuristics.
#[derive(Debug, Clone, Default)]
pub struct SimpleParser;

impl SimpleParser {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PdfParser for SimpleParser {
    fn name(&self) -> &'static str {
        SIMPLE_PARSER_NAME
    }

    async fn parse(&self, path: &Path) -> Result<ParseOutput, ParseFailure> {
        let path = path.to_path_buf();
        let raw_text = tokio::task::spawn_blocking(move || extract_pdf_text(&path))
            .await
            .map_err(|e| ParseFailure::new(SIMPLE_PARSER_NAME, format!("task failed: {e}")))?
            .map_err(|message| ParseFailure::new(SIMPLE_PARSER_NAME, message))?;

        parse_simple_text(&raw_text)
            .map_err(|message| ParseFailure::new(SIMPLE_PARSER_NAME, message))
    }
}

/// Extract raw text: pdf-extract first, pure-Rust lopdf as fallback.
fn extract_pdf_text(path: &Path) -> Result<String, String> {
    match pdf_extract::extract_text(path) {
        Ok(text) if !text.trim().is_empty() => return Ok(text),
        Ok(_) => tracing::debug!(path = %path.display(), "pdf-extract returned empty text"),
        Err(e) => tracing::debug!(path = %path.display(), error = %e, "pdf-extract failed"),
    }

    let document =
        lopdf::Document::load(path).map_err(|e| format!("failed to load PDF: {e}"))?;
    let pages: Vec<u32> = (1..=document.get_pages().len() as u32).collect();
    document
        .extract_text(&pages)
        .map_err(|e| format!("failed to extract text: {e}"))
}

/// Line heuristics over raw extracted text.
fn parse_simple_text(raw_text: &str) -> Result<ParseOutput, String> {
    let full_text = normalize_whitespace(raw_text);
    if full_text.is_empty() {
        return Err("extractor produced empty text".to_string());
    }

    let lines: Vec<&str> = raw_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let title = lines.first().map(|line| line.to_string());

    let abstract_re = Regex::new(r"(?i)^abstract:?").expect("abstract regex");
    let abstract_text = lines
        .iter()
        .position(|line| abstract_re.is_match(line))
        .map(|start| {
            let end = (start + 6).min(lines.len());
            normalize_whitespace(&lines[start..end].join(" "))
        });

    Ok(ParseOutput {
        parser_name: SIMPLE_PARSER_NAME.to_string(),
        parser_version: SIMPLE_PARSER_VERSION.to_string(),
        confidence: 0.62,
        title,
        abstract_text,
        full_text,
        sections: split_sections(&lines),
        references: extract_references(&lines),
    })
}

fn is_heading(line: &str) -> bool {
    let lowered = line.to_lowercase();
    SECTION_HEADINGS
        .iter()
        .any(|heading| lowered.starts_with(heading))
}

/// Split lines into heading-delimited sections, starting under an implicit
/// "Body" heading.
fn split_sections(lines: &[&str]) -> Vec<SectionChunk> {
    let mut sections = Vec::new();
    let mut current_heading = "Body".to_string();
    let mut current: Vec<&str> = Vec::new();

    let mut push = |heading: &str, body_lines: &[&str], sections: &mut Vec<SectionChunk>| {
        let body = normalize_whitespace(&body_lines.join(" "));
        if body.is_empty() {
            return;
        }
        sections.push(SectionChunk {
            id: format!("sec_{}", sections.len() + 1),
            heading: heading.to_string(),
            text: body,
            page_start: None,
            page_end: None,
        });
    };

    for line in lines {
        if is_heading(line) {
            push(&current_heading, &current, &mut sections);
            current.clear();
            current_heading = line.to_string();
            continue;
        }
        current.push(line);
    }
    push(&current_heading, &current, &mut sections);

    sections
}

/// Take everything after a `references` line, else the trailing 120 lines.
/// Keep lines longer than 30 chars, cap at 60 entries.
fn extract_references(lines: &[&str]) -> Vec<ParsedReference> {
    let start = lines
        .iter()
        .position(|line| line.to_lowercase().starts_with("references"));
    let source: &[&str] = match start {
        Some(index) => &lines[index + 1..],
        None => {
            let tail_start = lines.len().saturating_sub(120);
            &lines[tail_start..]
        }
    };

    source
        .iter()
        .filter(|line| line.len() > 30)
        .take(60)
        .map(|line| ParsedReference {
            raw_text: line.to_string(),
            doi: find_doi(line),
            title: None,
            year: year_from_text(line),
            authors: Vec::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TEXT: &str = "\
Deep Retrieval over Citation Graphs
Jane Doe, John Smith
Abstract: We study retrieval over citation graphs.
This work scales to millions of nodes.
It uses learned sparse indexes.
Earlier systems could not do this.
We evaluate on three corpora.
Introduction
Retrieval over graphs is hard. We make it less hard.
Methods
We build an index and traverse it carefully with pruning heuristics.
Results
Our system wins on every benchmark we tried, by a lot.
References
Doe, J. and Smith, J. Sparse indexes at scale. JIR, 2019. doi:10.1000/jir.2019.55
Short line.
Roe, R. Traversal pruning for graph retrieval systems. In Proceedings of GIR 2021.
";

    #[test]
    fn test_simple_parser_title_and_abstract() {
        let output = parse_simple_text(SAMPLE_TEXT).unwrap();
        assert_eq!(
            output.title.as_deref(),
            Some("Deep Retrieval over Citation Graphs")
        );
        let abstract_text = output.abstract_text.unwrap();
        assert!(abstract_text.starts_with("Abstract: We study retrieval"));
        assert!(abstract_text.contains("three corpora"));
        assert_eq!(output.confidence, 0.62);
    }

    #[test]
    fn test_simple_parser_sections() {
        let output = parse_simple_text(SAMPLE_TEXT).unwrap();
        let headings: Vec<&str> = output
            .sections
            .iter()
            .map(|s| s.heading.as_str())
            .collect();
        assert_eq!(headings[0], "Body");
        assert!(headings.contains(&"Introduction"));
        assert!(headings.contains(&"Methods"));
        assert!(headings.contains(&"Results"));
    }

    #[test]
    fn test_simple_parser_references() {
        let output = parse_simple_text(SAMPLE_TEXT).unwrap();
        assert_eq!(output.references.len(), 2);
        assert_eq!(
            output.references[0].doi.as_deref(),
            Some("10.1000/jir.2019.55")
        );
        assert_eq!(output.references[0].year, Some(2019));
        assert_eq!(output.references[1].year, Some(2021));
    }

    #[test]
    fn test_simple_parser_rejects_empty() {
        assert!(parse_simple_text("   \n \n ").is_err());
    }

    #[test]
    fn test_structured_xml_slicing() {
        let xml = r#"<?xml version="1.0"?>
<TEI xmlns="http://www.tei-c.org/ns/1.0">
  <teiHeader>
    <titleStmt><title>Learned Indexes Revisited</title></titleStmt>
    <abstract><p>We revisit learned indexes.</p></abstract>
  </teiHeader>
  <text>
    <body>
      <div><head>Introduction</head><p>Indexes matter a great deal.</p></div>
      <div><head>Evaluation</head><p>We measure everything twice.</p></div>
    </body>
    <back>
      <listBibl>
        <biblStruct><title>Sparse indexes at scale</title>
          <note>JIR 2019 doi:10.1000/jir.2019.55</note></biblStruct>
      </listBibl>
    </back>
  </text>
</TEI>"#;

        let output = parse_structured_xml(xml).unwrap();
        assert_eq!(output.title.as_deref(), Some("Learned Indexes Revisited"));
        assert_eq!(
            output.abstract_text.as_deref(),
            Some("We revisit learned indexes.")
        );
        assert!(output.full_text.contains("Indexes matter"));
        assert!(output.full_text.contains("measure everything"));
        assert_eq!(output.sections.len(), 2);
        assert_eq!(output.sections[0].heading, "Introduction");
        assert_eq!(output.confidence, 0.85);

        assert_eq!(output.references.len(), 1);
        let reference = &output.references[0];
        assert_eq!(reference.title.as_deref(), Some("Sparse indexes at scale"));
        assert_eq!(reference.doi.as_deref(), Some("10.1000/jir.2019.55"));
        assert_eq!(reference.year, Some(2019));
    }

    #[test]
    fn test_structured_xml_empty_body_lowers_confidence() {
        let xml = r#"<TEI><teiHeader><title>Only a Title</title></teiHeader><text><body></body></text></TEI>"#;
        let output = parse_structured_xml(xml).unwrap();
        assert!(output.full_text.is_empty());
        assert_eq!(output.confidence, 0.65);
    }

    #[test]
    fn test_parser_order_resolution() {
        let simple = Arc::new(SimpleParser::new());

        let order = resolve_parser_order(ParseMode::Simple, None, simple.clone());
        assert_eq!(order.len(), 1);
        assert_eq!(order[0].name(), SIMPLE_PARSER_NAME);

        // No endpoint configured: structured is skipped for auto mode too.
        let order = resolve_parser_order(ParseMode::Auto, None, simple.clone());
        assert_eq!(order.len(), 1);

        let client = Arc::new(
            PacedClient::new(crate::utils::FetchConfig::default(), "test").unwrap(),
        );
        let structured = Arc::new(StructuredParser::new(
            client,
            "http://localhost:8070/api/processFulltextDocument".to_string(),
        ));
        let order = resolve_parser_order(ParseMode::Structured, Some(structured), simple);
        assert_eq!(order.len(), 2);
        assert_eq!(order[0].name(), STRUCTURED_PARSER_NAME);
        assert_eq!(order[1].name(), SIMPLE_PARSER_NAME);
    }
}
