//! Configuration management.
//!
//! Everything is env-var driven with serde defaults; an optional TOML file
//! can override the defaults. Environment variables use the `SCHOLAR_MCP`
//! prefix (e.g. `SCHOLAR_MCP_HTTP_PORT`).

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Which transports to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Line,
    Http,
    Both,
}

impl Default for TransportMode {
    fn default() -> Self {
        TransportMode::Line
    }
}

/// Stateless vs stateful HTTP session handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Stateless,
    Stateful,
}

impl Default for SessionMode {
    fn default() -> Self {
        SessionMode::Stateful
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,

    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Allowed `Origin` values. Empty means loopback defaults when the bind
    /// address is loopback.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Allowed `Host` values. Same loopback defaulting as origins.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,

    /// When set, requests must carry `Authorization: Bearer <key>`.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub session_mode: SessionMode,

    #[serde(default = "default_session_ttl_ms")]
    pub session_ttl_ms: u64,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            endpoint_path: default_endpoint_path(),
            health_path: default_health_path(),
            allowed_origins: Vec::new(),
            allowed_hosts: Vec::new(),
            api_key: std::env::var("SCHOLAR_MCP_API_KEY").ok(),
            session_mode: SessionMode::default(),
            session_ttl_ms: default_session_ttl_ms(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_endpoint_path() -> String {
    "/mcp".to_string()
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_session_ttl_ms() -> u64 {
    30 * 60 * 1000
}

fn default_max_sessions() -> usize {
    64
}

/// External catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_openalex_url")]
    pub openalex_base_url: String,

    #[serde(default = "default_crossref_url")]
    pub crossref_base_url: String,

    #[serde(default = "default_semantic_url")]
    pub semantic_base_url: String,

    #[serde(default = "default_scholar_url")]
    pub scholar_base_url: String,

    /// Semantic Scholar API key (optional, for higher rate limits).
    #[serde(default)]
    pub semantic_api_key: Option<String>,

    /// Contact email for polite pools (OpenAlex, Crossref).
    #[serde(default)]
    pub contact_email: Option<String>,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Minimum spacing between requests to the same catalog.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            openalex_base_url: default_openalex_url(),
            crossref_base_url: default_crossref_url(),
            semantic_base_url: default_semantic_url(),
            scholar_base_url: default_scholar_url(),
            semantic_api_key: std::env::var("SEMANTIC_SCHOLAR_API_KEY").ok(),
            contact_email: std::env::var("SCHOLAR_MCP_CONTACT_EMAIL").ok(),
            request_timeout_ms: default_request_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            request_delay_ms: default_request_delay_ms(),
        }
    }
}

fn default_openalex_url() -> String {
    "https://api.openalex.org".to_string()
}

fn default_crossref_url() -> String {
    "https://api.crossref.org".to_string()
}

fn default_semantic_url() -> String {
    "https://api.semanticscholar.org".to_string()
}

fn default_scholar_url() -> String {
    "https://scholar.google.com".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_request_delay_ms() -> u64 {
    200
}

/// Ingestion policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_true")]
    pub allow_remote_pdfs: bool,

    #[serde(default = "default_true")]
    pub allow_local_pdfs: bool,

    /// Endpoint of the structured full-text parser service. Unset means the
    /// chain starts at the simple parser.
    #[serde(default)]
    pub structured_parser_url: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            allow_remote_pdfs: true,
            allow_local_pdfs: true,
            structured_parser_url: std::env::var("SCHOLAR_MCP_STRUCTURED_PARSER_URL").ok(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Aggregator tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSettings {
    #[serde(default = "default_cache_ttl_ms")]
    pub graph_cache_ttl_ms: u64,

    #[serde(default = "default_max_cache_entries")]
    pub graph_max_cache_entries: usize,

    #[serde(default = "default_provider_multiplier")]
    pub graph_provider_result_multiplier: f64,

    #[serde(default = "default_fuzzy_threshold")]
    pub graph_fuzzy_title_threshold: f64,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            graph_cache_ttl_ms: default_cache_ttl_ms(),
            graph_max_cache_entries: default_max_cache_entries(),
            graph_provider_result_multiplier: default_provider_multiplier(),
            graph_fuzzy_title_threshold: default_fuzzy_threshold(),
        }
    }
}

fn default_cache_ttl_ms() -> u64 {
    60_000
}

fn default_max_cache_entries() -> usize {
    128
}

fn default_provider_multiplier() -> f64 {
    2.0
}

fn default_fuzzy_threshold() -> f64 {
    0.82
}

/// Full application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportMode,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub providers: ProviderConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub graph: GraphSettings,
}

/// Load configuration from a file plus `SCHOLAR_MCP_*` environment
/// variables. Startup fails on malformed configuration.
pub fn load_config(path: Option<&Path>) -> Result<Config, config::ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }
    let settings = builder
        .add_source(config::Environment::with_prefix("SCHOLAR_MCP").try_parsing(true))
        .build()?;
    settings.try_deserialize()
}
