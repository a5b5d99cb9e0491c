//! Tool registry and dispatcher.
//!
//! Each tool declares a JSON-schema for its arguments and a handler. The
//! dispatcher validates arguments, normalizes polymorphic inputs (the year
//! range accepts both a two-element array and a `{start, end}` map), calls
//! into the core, and shapes results. Core exceptions never escape: every
//! failure becomes a structured error result.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cite::{CitationEngine, CitationStyle, SuggestInput};
use crate::extract::{extract_details, ExtractionRequest};
use crate::graph::LiteratureGraph;
use crate::ingest::{IngestError, IngestionEngine, LookupError};
use crate::models::{
    CanonicalWork, IngestSource, JobStatus, ManuscriptReference, ParseMode, ProviderKind,
    SearchInput, YearRange,
};
use crate::providers::{AdvancedScholarQuery, GoogleScholarProvider, ProviderError};

/// Everything the tool handlers reach into.
#[derive(Clone)]
pub struct ServerCore {
    pub graph: Arc<LiteratureGraph>,
    pub engine: IngestionEngine,
    pub cite: Arc<CitationEngine>,
    pub scholar: Arc<GoogleScholarProvider>,
}

impl std::fmt::Debug for ServerCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerCore").finish()
    }
}

/// One text content block in a tool result.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// The wire shape of a tool invocation result.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(payload: Value) -> Self {
        let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
        Self {
            content: vec![ContentBlock {
                kind: "text".to_string(),
                text,
            }],
            structured_content: Some(payload),
            is_error: false,
        }
    }

    pub fn error(kind: &str, message: impl Into<String>, details: Option<Value>) -> Self {
        let message = message.into();
        let mut payload = json!({ "error": { "kind": kind, "message": message } });
        if let Some(details) = details {
            payload["error"]["details"] = details;
        }
        Self {
            content: vec![ContentBlock {
                kind: "text".to_string(),
                text: message,
            }],
            structured_content: Some(payload),
            is_error: true,
        }
    }

    fn validation(message: impl Into<String>) -> Self {
        Self::error("validation_error", message, None)
    }
}

/// Handler for executing one tool.
#[async_trait]
pub trait ToolHandler: Send + Sync + std::fmt::Debug {
    async fn execute(&self, args: Value) -> ToolResult;
}

/// A registered tool.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool").field("name", &self.name).finish()
    }
}

/// Registry of all tools exposed over the transports.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    pub fn from_core(core: ServerCore) -> Self {
        let mut registry = Self {
            tools: HashMap::new(),
        };
        registry.register_search_tools(&core);
        registry.register_scholar_tools(&core);
        registry.register_ingestion_tools(&core);
        registry.register_citation_tools(&core);
        registry
    }

    fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    pub fn all(&self) -> Vec<&Tool> {
        let mut tools: Vec<&Tool> = self.tools.values().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Execute a tool. Unknown names and handler failures both come back as
    /// error results, never as transport failures.
    pub async fn execute(&self, name: &str, args: Value) -> ToolResult {
        match self.get(name) {
            Some(tool) => tool.handler.execute(args).await,
            None => ToolResult::error("unknown_tool", format!("Tool '{name}' not found"), None),
        }
    }

    fn register_search_tools(&mut self, core: &ServerCore) {
        self.register(Tool {
            name: "search_literature_graph".to_string(),
            description: "Federated scholarly search across OpenAlex, Crossref, Semantic \
                          Scholar, and Google Scholar with deduplication and ranking"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" },
                    "year_range": {
                        "description": "Inclusive year range: [start, end] or {start, end}",
                        "anyOf": [
                            { "type": "array", "items": { "type": ["integer", "null"] }, "minItems": 2, "maxItems": 2 },
                            { "type": "object", "properties": { "start": { "type": ["integer", "null"] }, "end": { "type": ["integer", "null"] } } }
                        ]
                    },
                    "fields_of_study": { "type": "array", "items": { "type": "string" } },
                    "limit": { "type": "integer", "default": 10, "minimum": 1, "maximum": 100 },
                    "sources": {
                        "type": "array",
                        "items": { "type": "string", "enum": ["openalex", "crossref", "semantic_scholar", "google_scholar"] }
                    }
                },
                "required": ["query"]
            }),
            handler: Arc::new(SearchGraphHandler { core: core.clone() }),
        });
    }

    fn register_scholar_tools(&mut self, core: &ServerCore) {
        self.register(Tool {
            name: "search_google_scholar_key_words".to_string(),
            description: "Keyword search on Google Scholar".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "num_results": { "type": "integer", "default": 5, "minimum": 1, "maximum": 20 },
                    "start": { "type": "integer", "default": 0, "minimum": 0 },
                    "language": { "type": "string", "default": "en" }
                },
                "required": ["query"]
            }),
            handler: Arc::new(ScholarKeywordsHandler { core: core.clone() }),
        });

        self.register(Tool {
            name: "search_google_scholar_advanced".to_string(),
            description: "Google Scholar search with author, phrase, exclusion, and year \
                          operators"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "author": { "type": "string" },
                    "year_range": {
                        "anyOf": [
                            { "type": "array", "items": { "type": ["integer", "null"] }, "minItems": 2, "maxItems": 2 },
                            { "type": "object", "properties": { "start": { "type": ["integer", "null"] }, "end": { "type": ["integer", "null"] } } }
                        ]
                    },
                    "exact_phrase": { "type": "string" },
                    "exclude_words": { "type": "string" },
                    "title_only": { "type": "boolean", "default": false },
                    "num_results": { "type": "integer", "default": 5, "minimum": 1, "maximum": 20 },
                    "start": { "type": "integer", "default": 0, "minimum": 0 },
                    "language": { "type": "string", "default": "en" }
                },
                "required": ["query"]
            }),
            handler: Arc::new(ScholarAdvancedHandler { core: core.clone() }),
        });

        self.register(Tool {
            name: "get_author_info".to_string(),
            description: "Google Scholar author profile and publications".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "author_name": { "type": "string" },
                    "max_publications": { "type": "integer", "default": 5, "minimum": 1, "maximum": 20 },
                    "language": { "type": "string", "default": "en" }
                },
                "required": ["author_name"]
            }),
            handler: Arc::new(AuthorInfoHandler { core: core.clone() }),
        });
    }

    fn register_ingestion_tools(&mut self, core: &ServerCore) {
        self.register(Tool {
            name: "ingest_paper_fulltext".to_string(),
            description: "Resolve, download, and parse a paper's full text as an async job"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "doi": { "type": "string" },
                    "paper_url": { "type": "string" },
                    "pdf_url": { "type": "string" },
                    "local_pdf_path": { "type": "string" },
                    "parse_mode": { "type": "string", "enum": ["auto", "structured", "simple"], "default": "auto" },
                    "ocr_enabled": { "type": "boolean", "default": true }
                }
            }),
            handler: Arc::new(IngestHandler { core: core.clone() }),
        });

        self.register(Tool {
            name: "get_ingestion_status".to_string(),
            description: "Status of an ingestion job, with a document summary once succeeded"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": { "job_id": { "type": "string" } },
                "required": ["job_id"]
            }),
            handler: Arc::new(IngestStatusHandler { core: core.clone() }),
        });

        self.register(Tool {
            name: "extract_granular_paper_details".to_string(),
            description: "Claims, methods, limitations, datasets, and metrics from an \
                          ingested document"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "document_id": { "type": "string" },
                    "sections": { "type": "array", "items": { "type": "string" } },
                    "include_references": { "type": "boolean", "default": true }
                },
                "required": ["document_id"]
            }),
            handler: Arc::new(ExtractHandler { core: core.clone() }),
        });
    }

    fn register_citation_tools(&mut self, core: &ServerCore) {
        self.register(Tool {
            name: "suggest_contextual_citations".to_string(),
            description: "Rank citation candidates against manuscript context".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "manuscript_text": { "type": "string" },
                    "cursor_context": { "type": "string" },
                    "style": { "type": "string", "enum": ["apa", "ieee", "chicago", "vancouver"], "default": "apa" },
                    "k": { "type": "integer", "default": 10, "minimum": 1, "maximum": 50 },
                    "recency_bias": { "type": "number", "default": 0.5, "minimum": 0, "maximum": 1 }
                },
                "required": ["manuscript_text"]
            }),
            handler: Arc::new(SuggestHandler { core: core.clone() }),
        });

        self.register(Tool {
            name: "build_reference_list".to_string(),
            description: "Format a deduplicated reference list in a citation style".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "style": { "type": "string", "enum": ["apa", "ieee", "chicago", "vancouver"], "default": "apa" },
                    "locale": { "type": "string", "default": "en-US" },
                    "manuscript_text": { "type": "string" },
                    "works": { "type": "array", "items": { "type": "object" } }
                }
            }),
            handler: Arc::new(BuildListHandler { core: core.clone() }),
        });

        self.register(Tool {
            name: "validate_manuscript_citations".to_string(),
            description: "Check a manuscript's citations against its reference list".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "manuscript_text": { "type": "string" },
                    "style": { "type": "string", "enum": ["apa", "ieee", "chicago", "vancouver"] },
                    "references": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "id": { "type": "string" },
                                "formatted": { "type": "string" },
                                "bibtex": { "type": "string" }
                            },
                            "required": ["formatted"]
                        }
                    }
                },
                "required": ["manuscript_text", "references"]
            }),
            handler: Arc::new(ValidateHandler { core: core.clone() }),
        });
    }
}

// ===== Argument helpers =====

fn as_object(args: &Value) -> Result<&serde_json::Map<String, Value>, ToolResult> {
    args.as_object()
        .ok_or_else(|| ToolResult::validation("Arguments must be an object"))
}

fn require_str<'a>(
    args: &'a serde_json::Map<String, Value>,
    key: &str,
) -> Result<&'a str, ToolResult> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolResult::validation(format!("Missing required string argument '{key}'")))
}

fn opt_str(args: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn opt_usize(
    args: &serde_json::Map<String, Value>,
    key: &str,
    default: usize,
    min: usize,
    max: usize,
) -> Result<usize, ToolResult> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => {
            let number = value.as_u64().ok_or_else(|| {
                ToolResult::validation(format!("Argument '{key}' must be a non-negative integer"))
            })? as usize;
            if number < min || number > max {
                return Err(ToolResult::validation(format!(
                    "Argument '{key}' must be between {min} and {max}"
                )));
            }
            Ok(number)
        }
    }
}

fn opt_bool(args: &serde_json::Map<String, Value>, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn opt_f64_range(
    args: &serde_json::Map<String, Value>,
    key: &str,
    default: f64,
    min: f64,
    max: f64,
) -> Result<f64, ToolResult> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => {
            let number = value.as_f64().ok_or_else(|| {
                ToolResult::validation(format!("Argument '{key}' must be a number"))
            })?;
            if number < min || number > max {
                return Err(ToolResult::validation(format!(
                    "Argument '{key}' must be between {min} and {max}"
                )));
            }
            Ok(number)
        }
    }
}

fn parse_style(
    args: &serde_json::Map<String, Value>,
    key: &str,
    default: CitationStyle,
) -> Result<CitationStyle, ToolResult> {
    match args.get(key).and_then(Value::as_str) {
        None => Ok(default),
        Some(raw) => CitationStyle::from_str(raw).ok_or_else(|| {
            ToolResult::validation(format!(
                "Argument '{key}' must be one of apa, ieee, chicago, vancouver"
            ))
        }),
    }
}

/// Canonicalize the polymorphic year range. Accepts `[start, end]` and
/// `{start, end}`; only the canonical `{min, max}` form reaches the core.
fn parse_year_range(
    args: &serde_json::Map<String, Value>,
) -> Result<Option<YearRange>, ToolResult> {
    let Some(value) = args.get("year_range") else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }

    let year_of = |value: &Value, label: &str| -> Result<Option<i32>, ToolResult> {
        match value {
            Value::Null => Ok(None),
            Value::Number(number) => number
                .as_i64()
                .map(|y| Some(y as i32))
                .ok_or_else(|| ToolResult::validation(format!("Invalid {label} year"))),
            _ => Err(ToolResult::validation(format!(
                "Invalid {label} year: expected an integer or null"
            ))),
        }
    };

    let (min, max) = match value {
        Value::Array(items) if items.len() == 2 => {
            (year_of(&items[0], "start")?, year_of(&items[1], "end")?)
        }
        Value::Object(map) => (
            year_of(map.get("start").unwrap_or(&Value::Null), "start")?,
            year_of(map.get("end").unwrap_or(&Value::Null), "end")?,
        ),
        _ => {
            return Err(ToolResult::validation(
                "year_range must be [start, end] or {start, end}",
            ))
        }
    };

    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(ToolResult::validation(
                "year_range start must not exceed end",
            ));
        }
    }
    Ok(Some(YearRange { min, max }))
}

fn parse_sources(
    args: &serde_json::Map<String, Value>,
) -> Result<Vec<ProviderKind>, ToolResult> {
    let Some(value) = args.get("sources") else {
        return Ok(ProviderKind::ALL.to_vec());
    };
    if value.is_null() {
        return Ok(ProviderKind::ALL.to_vec());
    }
    let items = value
        .as_array()
        .ok_or_else(|| ToolResult::validation("sources must be an array of provider ids"))?;
    let mut sources = Vec::new();
    for item in items {
        let id = item
            .as_str()
            .ok_or_else(|| ToolResult::validation("sources entries must be strings"))?;
        let kind = ProviderKind::from_id(id).ok_or_else(|| {
            ToolResult::validation(format!(
                "Unknown source '{id}'; expected openalex, crossref, semantic_scholar, or google_scholar"
            ))
        })?;
        if !sources.contains(&kind) {
            sources.push(kind);
        }
    }
    if sources.is_empty() {
        return Ok(ProviderKind::ALL.to_vec());
    }
    Ok(sources)
}

fn provider_error_result(error: ProviderError) -> ToolResult {
    let kind = match &error {
        ProviderError::ScrapeBlocked => "scholar_scrape_blocked",
        _ => "provider_error",
    };
    let details = error
        .http_status()
        .map(|status| json!({ "http_status": status }));
    ToolResult::error(kind, error.to_string(), details)
}

fn lookup_error_result(error: LookupError) -> ToolResult {
    ToolResult::error("not_found", error.to_string(), None)
}

fn to_payload<T: serde::Serialize>(value: &T) -> ToolResult {
    match serde_json::to_value(value) {
        Ok(payload) => ToolResult::success(payload),
        Err(error) => ToolResult::error("internal_error", error.to_string(), None),
    }
}

// ===== Handlers =====

macro_rules! try_args {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(result) => return result,
        }
    };
}

#[derive(Debug)]
struct SearchGraphHandler {
    core: ServerCore,
}

#[async_trait]
impl ToolHandler for SearchGraphHandler {
    async fn execute(&self, args: Value) -> ToolResult {
        let args = try_args!(as_object(&args));
        let query = try_args!(require_str(args, "query"));
        let limit = try_args!(opt_usize(args, "limit", 10, 1, 100));
        let year_range = try_args!(parse_year_range(args));
        let sources = try_args!(parse_sources(args));
        let fields_of_study = args
            .get("fields_of_study")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let input = SearchInput {
            query: query.to_string(),
            limit,
            year_range,
            fields_of_study,
            sources,
        };
        let result = self.core.graph.search(&input).await;
        to_payload(&result)
    }
}

#[derive(Debug)]
struct ScholarKeywordsHandler {
    core: ServerCore,
}

#[async_trait]
impl ToolHandler for ScholarKeywordsHandler {
    async fn execute(&self, args: Value) -> ToolResult {
        let args = try_args!(as_object(&args));
        let query = try_args!(require_str(args, "query"));
        let num_results = try_args!(opt_usize(args, "num_results", 5, 1, 20));
        let start = try_args!(opt_usize(args, "start", 0, 0, 1000));
        let language = opt_str(args, "language").unwrap_or_else(|| "en".to_string());

        match self
            .core
            .scholar
            .search_keywords(query, num_results, start, &language)
            .await
        {
            Ok(results) => to_payload(&json!({ "query": query, "results": results })),
            Err(error) => provider_error_result(error),
        }
    }
}

#[derive(Debug)]
struct ScholarAdvancedHandler {
    core: ServerCore,
}

#[async_trait]
impl ToolHandler for ScholarAdvancedHandler {
    async fn execute(&self, args: Value) -> ToolResult {
        let args = try_args!(as_object(&args));
        let query = try_args!(require_str(args, "query"));
        let year_range = try_args!(parse_year_range(args));

        let params = AdvancedScholarQuery {
            query: query.to_string(),
            author: opt_str(args, "author"),
            year_start: year_range.and_then(|r| r.min),
            year_end: year_range.and_then(|r| r.max),
            exact_phrase: opt_str(args, "exact_phrase"),
            exclude_words: opt_str(args, "exclude_words"),
            title_only: opt_bool(args, "title_only", false),
            num_results: try_args!(opt_usize(args, "num_results", 5, 1, 20)),
            start: try_args!(opt_usize(args, "start", 0, 0, 1000)),
            language: opt_str(args, "language").unwrap_or_else(|| "en".to_string()),
        };

        match self.core.scholar.search_advanced(&params).await {
            Ok(results) => to_payload(&json!({ "query": params.query, "results": results })),
            Err(error) => provider_error_result(error),
        }
    }
}

#[derive(Debug)]
struct AuthorInfoHandler {
    core: ServerCore,
}

#[async_trait]
impl ToolHandler for AuthorInfoHandler {
    async fn execute(&self, args: Value) -> ToolResult {
        let args = try_args!(as_object(&args));
        let author_name = try_args!(require_str(args, "author_name"));
        let max_publications = try_args!(opt_usize(args, "max_publications", 5, 1, 20));
        let language = opt_str(args, "language").unwrap_or_else(|| "en".to_string());

        match self
            .core
            .scholar
            .author_info(author_name, max_publications, &language)
            .await
        {
            Ok(profile) => to_payload(&profile),
            Err(error) => provider_error_result(error),
        }
    }
}

#[derive(Debug)]
struct IngestHandler {
    core: ServerCore,
}

#[async_trait]
impl ToolHandler for IngestHandler {
    async fn execute(&self, args: Value) -> ToolResult {
        let args = try_args!(as_object(&args));
        let parse_mode = match args.get("parse_mode").and_then(Value::as_str) {
            None => ParseMode::Auto,
            Some(raw) => match ParseMode::from_str(raw) {
                Some(mode) => mode,
                None => {
                    return ToolResult::validation(
                        "parse_mode must be one of auto, structured, simple",
                    )
                }
            },
        };

        let source = IngestSource {
            doi: opt_str(args, "doi"),
            paper_url: opt_str(args, "paper_url"),
            pdf_url: opt_str(args, "pdf_url"),
            local_pdf_path: opt_str(args, "local_pdf_path"),
            parse_mode,
            ocr_enabled: opt_bool(args, "ocr_enabled", true),
        };
        if !source.has_locator() {
            return ToolResult::validation(
                "At least one of doi, paper_url, pdf_url, or local_pdf_path is required",
            );
        }

        match self.core.engine.enqueue(source) {
            Ok(job) => to_payload(&job),
            Err(IngestError::MissingSource) => ToolResult::validation(
                "At least one of doi, paper_url, pdf_url, or local_pdf_path is required",
            ),
            Err(error) => ToolResult::error("ingestion_error", error.to_string(), None),
        }
    }
}

#[derive(Debug)]
struct IngestStatusHandler {
    core: ServerCore,
}

#[async_trait]
impl ToolHandler for IngestStatusHandler {
    async fn execute(&self, args: Value) -> ToolResult {
        let args = try_args!(as_object(&args));
        let job_id = try_args!(require_str(args, "job_id"));

        match self.core.engine.get_job(job_id) {
            Ok(job) => {
                let mut payload = match serde_json::to_value(&job) {
                    Ok(payload) => payload,
                    Err(error) => {
                        return ToolResult::error("internal_error", error.to_string(), None)
                    }
                };
                if job.status == JobStatus::Succeeded {
                    if let Some(summary) = self.core.engine.document_summary(&job.document_id) {
                        payload["document_summary"] =
                            serde_json::to_value(&summary).unwrap_or(Value::Null);
                    }
                }
                ToolResult::success(payload)
            }
            Err(error) => lookup_error_result(error),
        }
    }
}

#[derive(Debug)]
struct ExtractHandler {
    core: ServerCore,
}

#[async_trait]
impl ToolHandler for ExtractHandler {
    async fn execute(&self, args: Value) -> ToolResult {
        let args = try_args!(as_object(&args));
        let document_id = try_args!(require_str(args, "document_id"));
        let sections = args.get("sections").and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>()
        });
        let include_references = opt_bool(args, "include_references", true);

        match self.core.engine.get_document(document_id) {
            Ok(document) => {
                let details = extract_details(
                    &document,
                    &ExtractionRequest {
                        sections,
                        include_references,
                    },
                );
                to_payload(&details)
            }
            Err(error) => lookup_error_result(error),
        }
    }
}

#[derive(Debug)]
struct SuggestHandler {
    core: ServerCore,
}

#[async_trait]
impl ToolHandler for SuggestHandler {
    async fn execute(&self, args: Value) -> ToolResult {
        let args = try_args!(as_object(&args));
        let manuscript_text = try_args!(require_str(args, "manuscript_text"));
        let style = try_args!(parse_style(args, "style", CitationStyle::Apa));
        let k = try_args!(opt_usize(args, "k", 10, 1, 50));
        let recency_bias = try_args!(opt_f64_range(args, "recency_bias", 0.5, 0.0, 1.0));

        let result = self
            .core
            .cite
            .suggest(&SuggestInput {
                manuscript_text: manuscript_text.to_string(),
                cursor_context: opt_str(args, "cursor_context"),
                style,
                k,
                recency_bias,
            })
            .await;
        to_payload(&result)
    }
}

#[derive(Debug)]
struct BuildListHandler {
    core: ServerCore,
}

#[async_trait]
impl ToolHandler for BuildListHandler {
    async fn execute(&self, args: Value) -> ToolResult {
        let args = try_args!(as_object(&args));
        let style = try_args!(parse_style(args, "style", CitationStyle::Apa));
        let locale = opt_str(args, "locale").unwrap_or_else(|| "en-US".to_string());
        let manuscript_text = opt_str(args, "manuscript_text");

        let works: Option<Vec<CanonicalWork>> = match args.get("works") {
            None | Some(Value::Null) => None,
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(works) => Some(works),
                Err(error) => {
                    return ToolResult::validation(format!("Invalid works array: {error}"))
                }
            },
        };

        if manuscript_text.is_none() && works.as_ref().map_or(true, |w| w.is_empty()) {
            return ToolResult::validation(
                "At least one of manuscript_text or works is required",
            );
        }

        match self
            .core
            .cite
            .build_reference_list(&crate::cite::BuildListInput {
                style,
                locale,
                manuscript_text,
                works,
            })
            .await
        {
            Ok(list) => to_payload(&list),
            Err(error) => ToolResult::validation(error.to_string()),
        }
    }
}

#[derive(Debug)]
struct ValidateHandler {
    core: ServerCore,
}

#[async_trait]
impl ToolHandler for ValidateHandler {
    async fn execute(&self, args: Value) -> ToolResult {
        let args = try_args!(as_object(&args));
        let manuscript_text = try_args!(require_str(args, "manuscript_text"));
        let style = match args.get("style").and_then(Value::as_str) {
            None => None,
            Some(raw) => match CitationStyle::from_str(raw) {
                Some(style) => Some(style),
                None => {
                    return ToolResult::validation(
                        "style must be one of apa, ieee, chicago, vancouver",
                    )
                }
            },
        };
        let references: Vec<ManuscriptReference> = match args.get("references") {
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(references) => references,
                Err(error) => {
                    return ToolResult::validation(format!("Invalid references array: {error}"))
                }
            },
            None => return ToolResult::validation("Missing required argument 'references'"),
        };

        let report = self
            .core
            .cite
            .validate(manuscript_text, &references, style);
        to_payload(&report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphConfig;
    use crate::ingest::IngestSettings;
    use crate::providers::mock::MockProvider;
    use crate::providers::Provider;
    use crate::utils::{FetchConfig, PacedClient};

    fn test_core() -> ServerCore {
        let providers: Vec<Arc<dyn Provider>> = ProviderKind::ALL
            .iter()
            .map(|kind| Arc::new(MockProvider::new(*kind)) as Arc<dyn Provider>)
            .collect();
        let graph = Arc::new(LiteratureGraph::new(providers, GraphConfig::default()));
        let client = Arc::new(PacedClient::new(FetchConfig::default(), "test").unwrap());
        let engine = IngestionEngine::new(graph.clone(), client.clone(), IngestSettings::default());
        let cite = Arc::new(CitationEngine::new(graph.clone()));
        let scholar = Arc::new(GoogleScholarProvider::new(
            client,
            "https://scholar.google.com".to_string(),
        ));
        ServerCore {
            graph,
            engine,
            cite,
            scholar,
        }
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::from_core(test_core());
        let result = registry.execute("no_such_tool", json!({})).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_catalog_is_complete() {
        let registry = ToolRegistry::from_core(test_core());
        let names: Vec<&str> = registry.all().iter().map(|t| t.name.as_str()).collect();
        for expected in [
            "search_literature_graph",
            "search_google_scholar_key_words",
            "search_google_scholar_advanced",
            "get_author_info",
            "ingest_paper_fulltext",
            "get_ingestion_status",
            "extract_granular_paper_details",
            "suggest_contextual_citations",
            "build_reference_list",
            "validate_manuscript_citations",
        ] {
            assert!(names.contains(&expected), "missing tool {expected}");
        }
        assert_eq!(names.len(), 10);
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let registry = ToolRegistry::from_core(test_core());
        let result = registry.execute("search_literature_graph", json!({})).await;
        assert!(result.is_error);
        let payload = result.structured_content.unwrap();
        assert_eq!(payload["error"]["kind"], "validation_error");
    }

    #[tokio::test]
    async fn test_year_range_polymorphism() {
        let args = json!({ "year_range": [2019, 2022] });
        let range = parse_year_range(args.as_object().unwrap()).unwrap().unwrap();
        assert_eq!(range.min, Some(2019));
        assert_eq!(range.max, Some(2022));

        let args = json!({ "year_range": { "start": 2019, "end": null } });
        let range = parse_year_range(args.as_object().unwrap()).unwrap().unwrap();
        assert_eq!(range.min, Some(2019));
        assert_eq!(range.max, None);

        let args = json!({ "year_range": "2019" });
        assert!(parse_year_range(args.as_object().unwrap()).is_err());

        let args = json!({ "year_range": [2022, 2019] });
        assert!(parse_year_range(args.as_object().unwrap()).is_err());
    }

    #[tokio::test]
    async fn test_ingest_requires_source() {
        let core = test_core();
        let registry = ToolRegistry::from_core(core.clone());
        let result = registry.execute("ingest_paper_fulltext", json!({})).await;
        assert!(result.is_error);
        assert_eq!(core.engine.job_count(), 0);
    }

    #[tokio::test]
    async fn test_ingestion_status_not_found() {
        let registry = ToolRegistry::from_core(test_core());
        let result = registry
            .execute("get_ingestion_status", json!({ "job_id": "job_missing" }))
            .await;
        assert!(result.is_error);
        let payload = result.structured_content.unwrap();
        assert_eq!(payload["error"]["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_validate_tool_roundtrip() {
        let registry = ToolRegistry::from_core(test_core());
        let result = registry
            .execute(
                "validate_manuscript_citations",
                json!({
                    "manuscript_text": "Claim [1-3]. (Doe, 2023). [TODO]",
                    "style": "ieee",
                    "references": [
                        { "id": "r1", "formatted": "Smith, A. (2020). Shared Title. Venue." },
                        { "id": "r2", "formatted": "Smith, A. (2020). Shared Title. Venue." }
                    ]
                }),
            )
            .await;

        assert!(!result.is_error);
        let payload = result.structured_content.unwrap();
        assert_eq!(payload["inline_citation_count"], 4);
        assert!(payload["missing_references"]
            .as_array()
            .unwrap()
            .iter()
            .any(|v| v == "[3]"));
        assert!(!payload["duplicate_references"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sources_validation() {
        let args = json!({ "sources": ["openalex", "bogus"] });
        assert!(parse_sources(args.as_object().unwrap()).is_err());

        let args = json!({ "sources": ["openalex", "crossref"] });
        let sources = parse_sources(args.as_object().unwrap()).unwrap();
        assert_eq!(sources, vec![ProviderKind::OpenAlex, ProviderKind::Crossref]);
    }
}
