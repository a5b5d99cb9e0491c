//! # scholar-mcp
//!
//! A research-automation MCP server that brokers between an agent-facing
//! tool protocol and a set of scholarly-metadata back ends.
//!
//! ## Architecture
//!
//! - [`models`]: core data structures (provider and canonical works,
//!   ingestion jobs, parsed documents, citation payloads)
//! - [`providers`]: catalog adapters behind the [`providers::Provider`] trait
//! - [`graph`]: the federated literature aggregator with dedupe and ranking
//! - [`ingest`]: the async ingestion pipeline and parser chain
//! - [`extract`]: granular extraction over parsed documents
//! - [`cite`]: contextual citation suggestions, formatting, and validation
//! - [`server`]: tool dispatcher plus the line and HTTP transports
//! - [`config`]: configuration management

pub mod cite;
pub mod config;
pub mod extract;
pub mod graph;
pub mod ingest;
pub mod models;
pub mod providers;
pub mod server;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use cite::CitationEngine;
use config::Config;
use graph::{GraphConfig, LiteratureGraph};
use ingest::{IngestSettings, IngestionEngine};
use providers::{
    CrossrefProvider, GoogleScholarProvider, OpenAlexProvider, Provider, SemanticScholarProvider,
};
use server::ServerCore;
use utils::{FetchConfig, FetchError, PacedClient};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wire the providers, aggregator, ingestion engine, and citation engine
/// from configuration. Each catalog gets its own paced client so the
/// per-host spacing holds independently.
pub fn build_core(config: &Config) -> Result<ServerCore, FetchError> {
    let fetch = FetchConfig {
        timeout: Duration::from_millis(config.providers.request_timeout_ms),
        retries: config.providers.retry_attempts,
        retry_delay: Duration::from_millis(config.providers.retry_delay_ms),
        min_spacing: Duration::from_millis(config.providers.request_delay_ms),
    };

    let agent = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string();
    let polite_agent = match &config.providers.contact_email {
        Some(email) => format!("{agent} (mailto:{email})"),
        None => agent.clone(),
    };

    let openalex = Arc::new(OpenAlexProvider::new(
        Arc::new(PacedClient::new(fetch, &polite_agent)?),
        config.providers.openalex_base_url.clone(),
        config.providers.contact_email.clone(),
    ));
    let crossref = Arc::new(CrossrefProvider::new(
        Arc::new(PacedClient::new(fetch, &polite_agent)?),
        config.providers.crossref_base_url.clone(),
        config.providers.contact_email.clone(),
    ));
    let semantic = Arc::new(SemanticScholarProvider::new(
        Arc::new(PacedClient::new(fetch, &agent)?),
        config.providers.semantic_base_url.clone(),
        config.providers.semantic_api_key.clone(),
    ));
    let scholar = Arc::new(GoogleScholarProvider::new(
        Arc::new(PacedClient::new(fetch, &agent)?),
        config.providers.scholar_base_url.clone(),
    ));

    let catalog: Vec<Arc<dyn Provider>> = vec![
        openalex,
        crossref,
        semantic,
        scholar.clone() as Arc<dyn Provider>,
    ];
    let graph = Arc::new(LiteratureGraph::new(
        catalog,
        GraphConfig {
            provider_result_multiplier: config.graph.graph_provider_result_multiplier,
            fuzzy_title_threshold: config.graph.graph_fuzzy_title_threshold,
            cache_ttl: Duration::from_millis(config.graph.graph_cache_ttl_ms),
            max_cache_entries: config.graph.graph_max_cache_entries,
        },
    ));

    let ingest_client = Arc::new(PacedClient::new(fetch, &agent)?);
    let engine = IngestionEngine::new(
        graph.clone(),
        ingest_client,
        IngestSettings {
            allow_remote_pdfs: config.ingest.allow_remote_pdfs,
            allow_local_pdfs: config.ingest.allow_local_pdfs,
            structured_parser_url: config.ingest.structured_parser_url.clone(),
        },
    );

    let cite = Arc::new(CitationEngine::new(graph.clone()));

    Ok(ServerCore {
        graph,
        engine,
        cite,
        scholar,
    })
}
