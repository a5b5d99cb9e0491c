//! Asynchronous ingestion engine.
//!
//! `enqueue` computes a deterministic document id, records a queued job, and
//! schedules the work on a background task. The worker resolves the source to
//! a PDF, downloads it into a scoped temp file, runs the parser chain, and
//! stores the resulting document. Jobs only move forward:
//! `queued -> running -> succeeded | failed`.

mod parser;
mod resolve;

pub use parser::{
    resolve_parser_order, run_chain, ParseFailure, PdfParser, SimpleParser, StructuredParser,
};
pub use resolve::{discover_pdf_in_html, resolve_pdf_url};

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::graph::LiteratureGraph;
use crate::models::{
    DocumentSummary, IngestSource, IngestionJob, JobStatus, LicenseState, ParseOutput,
    ParsedDocument, ParserInfo,
};
use crate::utils::PacedClient;

/// Failures inside the ingestion pipeline. These land in the job's `error`
/// field; they never escape the worker.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("At least one of doi, paper_url, pdf_url, or local_pdf_path is required.")]
    MissingSource,

    #[error("Local PDF ingestion is disabled.")]
    LocalDisabled,

    #[error("Remote PDF ingestion is disabled.")]
    RemoteDisabled,

    #[error("Local PDF is not readable: {0}")]
    Unreadable(String),

    #[error("Unable to resolve a downloadable PDF URL from input.")]
    NoPdfUrl,

    #[error("PDF download failed: {0}")]
    Download(String),

    #[error("Downloaded file is not a PDF (content type: {0}).")]
    NotPdf(String),

    #[error("All parsers failed: {0}")]
    AllParsersFailed(String),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Identifier lookups that missed.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),
}

/// Ingestion policy knobs.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub allow_remote_pdfs: bool,
    pub allow_local_pdfs: bool,
    pub structured_parser_url: Option<String>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            allow_remote_pdfs: true,
            allow_local_pdfs: true,
            structured_parser_url: None,
        }
    }
}

struct EngineInner {
    jobs: Mutex<HashMap<String, IngestionJob>>,
    documents: Mutex<HashMap<String, ParsedDocument>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    graph: Arc<LiteratureGraph>,
    client: Arc<PacedClient>,
    settings: IngestSettings,
    simple_parser: Arc<SimpleParser>,
    structured_parser: Option<Arc<StructuredParser>>,
}

/// The engine exclusively owns the job and document tables; other components
/// read through it by identifier only.
#[derive(Clone)]
pub struct IngestionEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for IngestionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionEngine")
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl IngestionEngine {
    pub fn new(
        graph: Arc<LiteratureGraph>,
        client: Arc<PacedClient>,
        settings: IngestSettings,
    ) -> Self {
        let structured_parser = settings
            .structured_parser_url
            .clone()
            .map(|endpoint| Arc::new(StructuredParser::new(client.clone(), endpoint)));

        Self {
            inner: Arc::new(EngineInner {
                jobs: Mutex::new(HashMap::new()),
                documents: Mutex::new(HashMap::new()),
                handles: Mutex::new(Vec::new()),
                graph,
                client,
                settings,
                simple_parser: Arc::new(SimpleParser::new()),
                structured_parser,
            }),
        }
    }

    /// Deterministic document id: the same source seeds always hash to the
    /// same id.
    pub fn document_id_for(source: &IngestSource) -> String {
        let digest = Sha256::digest(source.seed().as_bytes());
        let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
        format!("doc_{hex}")
    }

    /// Record a queued job and schedule its execution.
    pub fn enqueue(&self, source: IngestSource) -> Result<IngestionJob, IngestError> {
        if !source.has_locator() {
            return Err(IngestError::MissingSource);
        }

        let job = IngestionJob {
            job_id: format!("job_{}", Uuid::new_v4()),
            document_id: Self::document_id_for(&source),
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            source,
            parser_name: None,
            parser_confidence: None,
            license_state: LicenseState::Unknown,
            error: None,
            warnings: Vec::new(),
            provenance: Vec::new(),
        };

        self.inner
            .jobs
            .lock()
            .unwrap()
            .insert(job.job_id.clone(), job.clone());

        let inner = self.inner.clone();
        let job_id = job.job_id.clone();
        let handle = tokio::spawn(async move {
            run_worker(inner, job_id).await;
        });
        self.inner.handles.lock().unwrap().push(handle);

        Ok(job)
    }

    pub fn get_job(&self, job_id: &str) -> Result<IngestionJob, LookupError> {
        self.inner
            .jobs
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .ok_or_else(|| LookupError::JobNotFound(job_id.to_string()))
    }

    pub fn get_document(&self, document_id: &str) -> Result<ParsedDocument, LookupError> {
        self.inner
            .documents
            .lock()
            .unwrap()
            .get(document_id)
            .cloned()
            .ok_or_else(|| LookupError::DocumentNotFound(document_id.to_string()))
    }

    /// Summary of the stored document for a succeeded job, if present.
    pub fn document_summary(&self, document_id: &str) -> Option<DocumentSummary> {
        self.inner
            .documents
            .lock()
            .unwrap()
            .get(document_id)
            .map(DocumentSummary::of)
    }

    pub fn job_count(&self) -> usize {
        self.inner.jobs.lock().unwrap().len()
    }

    /// Abort in-flight workers. Jobs have no public cancel operation; this is
    /// internal, for graceful shutdown only.
    pub fn shutdown(&self) {
        let mut handles = self.inner.handles.lock().unwrap();
        for handle in handles.drain(..) {
            handle.abort();
        }
    }

    /// Wait for every scheduled worker to finish. Test support.
    pub async fn drain(&self) {
        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.inner.handles.lock().unwrap());
        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// Forward-only status transition. Terminal states are immutable.
fn transition(job: &mut IngestionJob, to: JobStatus) {
    let allowed = matches!(
        (job.status, to),
        (JobStatus::Queued, JobStatus::Running)
            | (JobStatus::Running, JobStatus::Succeeded)
            | (JobStatus::Running, JobStatus::Failed)
    );
    if !allowed {
        tracing::warn!(
            job_id = %job.job_id,
            from = ?job.status,
            to = ?to,
            "ignoring illegal job transition"
        );
        return;
    }
    job.status = to;
    match to {
        JobStatus::Running => job.started_at = Some(Utc::now()),
        JobStatus::Succeeded | JobStatus::Failed => job.completed_at = Some(Utc::now()),
        JobStatus::Queued => {}
    }
}

async fn run_worker(inner: Arc<EngineInner>, job_id: String) {
    let source = {
        let mut jobs = inner.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(&job_id) else {
            return;
        };
        transition(job, JobStatus::Running);
        job.source.clone()
    };

    let mut provenance = Vec::new();
    let mut warnings = Vec::new();
    let outcome = execute_job(&inner, &source, &mut provenance, &mut warnings).await;

    let mut jobs = inner.jobs.lock().unwrap();
    let Some(job) = jobs.get_mut(&job_id) else {
        return;
    };
    job.provenance = provenance;
    job.warnings = warnings;

    match outcome {
        Ok((output, license_state)) => {
            let document = ParsedDocument {
                document_id: job.document_id.clone(),
                source: source.clone(),
                parser: ParserInfo {
                    name: output.parser_name.clone(),
                    version: output.parser_version.clone(),
                    confidence: output.confidence,
                },
                title: output.title,
                abstract_text: output.abstract_text,
                full_text: output.full_text,
                sections: output.sections,
                references: output.references,
                tables: Vec::new(),
                equations: Vec::new(),
                figures: Vec::new(),
                created_at: Utc::now(),
                provenance: job.provenance.clone(),
            };
            // Identical sources share a document id; the last finishing job
            // owns the stored content.
            inner
                .documents
                .lock()
                .unwrap()
                .insert(document.document_id.clone(), document);

            job.parser_name = Some(output.parser_name);
            job.parser_confidence = Some(output.confidence);
            job.license_state = license_state;
            transition(job, JobStatus::Succeeded);
            tracing::info!(job_id = %job.job_id, document_id = %job.document_id, "ingestion succeeded");
        }
        Err(error) => {
            job.error = Some(error.to_string());
            transition(job, JobStatus::Failed);
            tracing::warn!(job_id = %job.job_id, %error, "ingestion failed");
        }
    }
}

async fn execute_job(
    inner: &EngineInner,
    source: &IngestSource,
    provenance: &mut Vec<String>,
    warnings: &mut Vec<String>,
) -> Result<(ParseOutput, LicenseState), IngestError> {
    let parsers = resolve_parser_order(
        source.parse_mode,
        inner.structured_parser.clone(),
        inner.simple_parser.clone(),
    );

    if let Some(local_path) = &source.local_pdf_path {
        if !inner.settings.allow_local_pdfs {
            return Err(IngestError::LocalDisabled);
        }
        let path = PathBuf::from(local_path);
        let path = path
            .canonicalize()
            .map_err(|e| IngestError::Unreadable(format!("{local_path}: {e}")))?;
        std::fs::metadata(&path)
            .map_err(|e| IngestError::Unreadable(format!("{}: {e}", path.display())))?;
        provenance.push(format!("using local pdf {}", path.display()));

        let output = run_chain(&parsers, &path, warnings)
            .await
            .map_err(|failure| IngestError::AllParsersFailed(failure.to_string()))?;
        return Ok((output, LicenseState::UserProvided));
    }

    if !inner.settings.allow_remote_pdfs {
        return Err(IngestError::RemoteDisabled);
    }

    let pdf_url = resolve_pdf_url(&inner.client, &inner.graph, source, provenance)
        .await
        .ok_or(IngestError::NoPdfUrl)?;

    let fetched = inner
        .client
        .get_bytes(&pdf_url, &[])
        .await
        .map_err(|e| IngestError::Download(e.to_string()))?;

    let is_pdf_content_type = fetched
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.to_lowercase().contains("application/pdf"));
    let has_pdf_magic = fetched.bytes.starts_with(b"%PDF");
    if !is_pdf_content_type && !has_pdf_magic {
        return Err(IngestError::NotPdf(
            fetched.content_type.unwrap_or_else(|| "unknown".to_string()),
        ));
    }
    provenance.push(format!(
        "downloaded {} bytes from {}",
        fetched.bytes.len(),
        fetched.final_url
    ));

    // The temp file is owned by this job alone and removed on every exit
    // path once the parse step completes.
    let mut temp = tempfile::NamedTempFile::new()?;
    temp.write_all(&fetched.bytes)?;
    temp.flush()?;

    let output = run_chain(&parsers, temp.path(), warnings)
        .await
        .map_err(|failure| IngestError::AllParsersFailed(failure.to_string()))?;

    Ok((output, LicenseState::OpenAccess))
}
