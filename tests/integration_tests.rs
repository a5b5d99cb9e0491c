//! Integration tests for scholar-mcp.
//!
//! These exercise the full stack against mock providers: the tool catalog,
//! the aggregator's dedupe and cache behavior, ingestion job lifecycles, and
//! the citation engine, all through the dispatcher.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use scholar_mcp::cite::CitationEngine;
use scholar_mcp::graph::{GraphConfig, LiteratureGraph};
use scholar_mcp::ingest::{IngestSettings, IngestionEngine};
use scholar_mcp::models::ProviderKind;
use scholar_mcp::providers::mock::{make_work, with_authors, MockProvider};
use scholar_mcp::providers::{GoogleScholarProvider, Provider};
use scholar_mcp::server::{
    dispatch_message, SessionManager, ServerCore, ToolRegistry,
};
use scholar_mcp::utils::{FetchConfig, PacedClient};

fn core_with_mocks(mocks: Vec<Arc<MockProvider>>) -> (ServerCore, Vec<Arc<MockProvider>>) {
    let providers: Vec<Arc<dyn Provider>> = mocks
        .iter()
        .map(|mock| mock.clone() as Arc<dyn Provider>)
        .collect();
    let graph = Arc::new(LiteratureGraph::new(providers, GraphConfig::default()));
    let client = Arc::new(PacedClient::new(FetchConfig::default(), "test-agent").unwrap());
    let core = ServerCore {
        graph: graph.clone(),
        engine: IngestionEngine::new(graph.clone(), client.clone(), IngestSettings::default()),
        cite: Arc::new(CitationEngine::new(graph)),
        scholar: Arc::new(GoogleScholarProvider::new(
            client,
            "https://scholar.google.com".to_string(),
        )),
    };
    (core, mocks)
}

fn default_mocks() -> Vec<Arc<MockProvider>> {
    ProviderKind::ALL
        .iter()
        .map(|kind| Arc::new(MockProvider::new(*kind)))
        .collect()
}

#[tokio::test]
async fn test_tool_catalog_is_fixed() {
    let (core, _) = core_with_mocks(default_mocks());
    let registry = ToolRegistry::from_core(core);
    assert_eq!(registry.all().len(), 10);
}

#[tokio::test]
async fn test_federated_dedupe_end_to_end() {
    let mocks = vec![
        Arc::new(MockProvider::new(ProviderKind::OpenAlex).with_works(vec![with_authors(
            make_work(
                ProviderKind::OpenAlex,
                "W1",
                "Graph Neural Networks for Scientific Retrieval",
                Some(2023),
                12,
            ),
            &["Alice Smith"],
        )])),
        Arc::new(MockProvider::new(ProviderKind::Crossref).with_works(vec![with_authors(
            make_work(
                ProviderKind::Crossref,
                "c1",
                "Graph Neural Networks for Scientific Retrieval.",
                Some(2024),
                30,
            ),
            &["Alice Smith"],
        )])),
        Arc::new(MockProvider::new(ProviderKind::SemanticScholar).with_works(vec![make_work(
            ProviderKind::SemanticScholar,
            "s1",
            "A Survey of Unrelated Things",
            Some(2021),
            2,
        )])),
        Arc::new(MockProvider::new(ProviderKind::GoogleScholar)),
    ];
    let (core, _) = core_with_mocks(mocks);
    let registry = ToolRegistry::from_core(core);

    let result = registry
        .execute(
            "search_literature_graph",
            json!({ "query": "graph neural networks", "limit": 10 }),
        )
        .await;
    assert!(!result.is_error);

    let payload = result.structured_content.unwrap();
    let results = payload["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);

    let merged = results
        .iter()
        .find(|work| {
            work["title"]
                .as_str()
                .unwrap()
                .starts_with("Graph Neural Networks")
        })
        .unwrap();
    assert_eq!(merged["provenance"].as_array().unwrap().len(), 2);
    assert_eq!(merged["citations"]["total"], 30);
    assert_eq!(merged["year"], 2023);
}

#[tokio::test]
async fn test_cache_reuse_across_tool_calls() {
    let mocks = default_mocks();
    let (core, mocks) = core_with_mocks(mocks);
    let registry = ToolRegistry::from_core(core);

    let args = json!({ "query": "cache probe", "limit": 5 });
    let first = registry
        .execute("search_literature_graph", args.clone())
        .await;
    let second = registry
        .execute("search_literature_graph", args)
        .await;

    for mock in &mocks {
        assert_eq!(mock.search_calls(), 1, "adapter called more than once");
    }
    assert_eq!(
        serde_json::to_value(&first.structured_content).unwrap(),
        serde_json::to_value(&second.structured_content).unwrap()
    );
}

#[tokio::test]
async fn test_all_providers_failing_is_not_fatal() {
    let mocks: Vec<Arc<MockProvider>> = ProviderKind::ALL
        .iter()
        .map(|kind| Arc::new(MockProvider::new(*kind).failing("unreachable")))
        .collect();
    let (core, _) = core_with_mocks(mocks);
    let registry = ToolRegistry::from_core(core);

    let result = registry
        .execute("search_literature_graph", json!({ "query": "anything" }))
        .await;
    assert!(!result.is_error);

    let payload = result.structured_content.unwrap();
    assert!(payload["results"].as_array().unwrap().is_empty());
    assert_eq!(payload["provider_errors"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_ingestion_failure_lifecycle() {
    let (core, _) = core_with_mocks(default_mocks());
    let engine = core.engine.clone();
    let registry = ToolRegistry::from_core(core);

    let enqueue = registry
        .execute(
            "ingest_paper_fulltext",
            json!({ "doi": "10.0000/nonexistent" }),
        )
        .await;
    assert!(!enqueue.is_error);
    let job = enqueue.structured_content.unwrap();
    let job_id = job["job_id"].as_str().unwrap().to_string();
    assert_eq!(job["status"], "queued");

    engine.drain().await;

    let status = registry
        .execute("get_ingestion_status", json!({ "job_id": job_id }))
        .await;
    assert!(!status.is_error);
    let payload = status.structured_content.unwrap();
    assert_eq!(payload["status"], "failed");
    assert_eq!(
        payload["error"],
        "Unable to resolve a downloadable PDF URL from input."
    );
}

#[tokio::test]
async fn test_ingestion_validation_before_job_creation() {
    let (core, _) = core_with_mocks(default_mocks());
    let engine = core.engine.clone();
    let registry = ToolRegistry::from_core(core);

    let result = registry.execute("ingest_paper_fulltext", json!({})).await;
    assert!(result.is_error);
    assert_eq!(engine.job_count(), 0);
}

#[tokio::test]
async fn test_contextual_citation_scenario() {
    let mut survey = make_work(
        ProviderKind::SemanticScholar,
        "s1",
        "Transformer Retrieval Approaches Surveyed",
        Some(2024),
        120,
    );
    survey.abstract_text = Some("A transformer retrieval approach survey.".into());
    let mut dense = make_work(
        ProviderKind::SemanticScholar,
        "s2",
        "Dense Transformer Retrieval Models",
        Some(2022),
        300,
    );
    dense.abstract_text = Some("A retrieval approach built on transformers.".into());
    let botany = make_work(
        ProviderKind::SemanticScholar,
        "s3",
        "Field Botany Notes",
        Some(2018),
        1,
    );

    let mocks = vec![
        Arc::new(MockProvider::new(ProviderKind::OpenAlex)),
        Arc::new(MockProvider::new(ProviderKind::Crossref)),
        Arc::new(
            MockProvider::new(ProviderKind::SemanticScholar)
                .with_works(vec![survey, dense, botany]),
        ),
        Arc::new(MockProvider::new(ProviderKind::GoogleScholar)),
    ];
    let (core, _) = core_with_mocks(mocks);
    let registry = ToolRegistry::from_core(core);

    let result = registry
        .execute(
            "suggest_contextual_citations",
            json!({
                "manuscript_text": "We present a transformer retrieval approach.",
                "style": "ieee",
                "k": 3,
                "recency_bias": 0.5
            }),
        )
        .await;
    assert!(!result.is_error);

    let payload = result.structured_content.unwrap();
    let query_used = payload["query_used"].as_str().unwrap();
    for token in ["transformer", "retrieval", "approach"] {
        assert!(query_used.contains(token), "query missing {token}");
    }
    let candidates = payload["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 3);
    assert_eq!(payload["inline_suggestion"], "[1], [2], [3]");
}

#[tokio::test]
async fn test_validation_scenario_over_dispatcher() {
    let (core, _) = core_with_mocks(default_mocks());
    let registry = ToolRegistry::from_core(core);

    let result = registry
        .execute(
            "validate_manuscript_citations",
            json!({
                "manuscript_text": "Recent studies support this claim [1-3]. (Doe, 2023). [TODO]",
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
        .any(|value| value == "[3]"));
    let warnings = payload["style_warnings"].as_array().unwrap();
    assert!(warnings.iter().any(|w| w.as_str().unwrap().contains("[TODO]")));
    assert!(warnings
        .iter()
        .any(|w| w.as_str().unwrap().contains("Expected numeric citations")));
    assert!(!payload["duplicate_references"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_session_ttl_pruning() {
    let manager = SessionManager::new(Duration::from_millis(1000), 16);
    let start = Instant::now();
    manager.create(start);
    assert_eq!(manager.len(), 1);

    // Second initialization at T+2000ms sees the first session pruned.
    let later = start + Duration::from_millis(2000);
    manager.prune(later);
    manager.create(later);
    assert_eq!(manager.len(), 1);
}

#[tokio::test]
async fn test_rpc_flow_end_to_end() {
    let (core, _) = core_with_mocks(default_mocks());
    let registry = ToolRegistry::from_core(core);

    let initialize = dispatch_message(
        &registry,
        &json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }),
    )
    .await
    .unwrap();
    assert!(initialize["result"]["serverInfo"]["name"]
        .as_str()
        .unwrap()
        .contains("scholar"));

    let list = dispatch_message(
        &registry,
        &json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }),
    )
    .await
    .unwrap();
    assert_eq!(list["result"]["tools"].as_array().unwrap().len(), 10);

    let call = dispatch_message(
        &registry,
        &json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": { "name": "build_reference_list", "arguments": {} }
        }),
    )
    .await
    .unwrap();
    // Missing inputs surface as a structured tool error, not a protocol
    // failure.
    assert_eq!(call["result"]["isError"], true);
}
