//! Mock provider for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::models::{ProviderKind, ProviderWork, WorkAuthor};
use crate::providers::{Provider, ProviderCapabilities, ProviderError};

/// A provider that returns canned responses and counts its calls.
#[derive(Debug, Default, Clone)]
pub struct MockProvider {
    kind: Option<ProviderKind>,
    works: Arc<Mutex<Vec<ProviderWork>>>,
    doi_work: Arc<Mutex<Option<ProviderWork>>>,
    fail_with: Arc<Mutex<Option<String>>>,
    search_calls: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Set the works returned by every `search_works` call.
    pub fn with_works(self, works: Vec<ProviderWork>) -> Self {
        *self.works.lock().unwrap() = works;
        self
    }

    /// Make every call fail with the given message.
    pub fn failing(self, message: &str) -> Self {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn set_doi_work(&self, work: Option<ProviderWork>) {
        *self.doi_work.lock().unwrap() = work;
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind.unwrap_or(ProviderKind::OpenAlex)
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::SEARCH | ProviderCapabilities::DOI_LOOKUP
    }

    async fn search_works(
        &self,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<ProviderWork>, ProviderError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(ProviderError::Parse {
                provider: self.kind(),
                message,
            });
        }
        Ok(self.works.lock().unwrap().clone())
    }

    async fn get_work_by_doi(&self, _doi: &str) -> Result<Option<ProviderWork>, ProviderError> {
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(ProviderError::Parse {
                provider: self.kind(),
                message,
            });
        }
        Ok(self.doi_work.lock().unwrap().clone())
    }
}

/// Build a minimal work for tests.
pub fn make_work(
    provider: ProviderKind,
    id: &str,
    title: &str,
    year: Option<i32>,
    citations: u64,
) -> ProviderWork {
    let mut work = ProviderWork::new(provider, id, title);
    work.year = year;
    work.citations.total = citations;
    work
}

/// Attach authors by display name.
pub fn with_authors(mut work: ProviderWork, names: &[&str]) -> ProviderWork {
    work.authors = names.iter().map(|n| WorkAuthor::new(*n)).collect();
    work
}
