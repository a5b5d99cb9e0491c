//! Scholarly catalog adapters.
//!
//! Each external catalog implements the [`Provider`] trait and normalizes its
//! records into [`ProviderWork`]. New catalogs plug in by implementing the
//! trait and registering with the aggregator.

mod crossref;
mod openalex;
mod scholar;
mod semantic;

pub mod mock;

pub use crossref::CrossrefProvider;
pub use openalex::OpenAlexProvider;
pub use scholar::{AdvancedScholarQuery, AuthorProfile, GoogleScholarProvider, ScholarEntry};
pub use semantic::SemanticScholarProvider;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ProviderKind, ProviderWork};
use crate::utils::FetchError;

bitflags::bitflags! {
    /// What a catalog can do beyond plain keyword search.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProviderCapabilities: u8 {
        const SEARCH = 1 << 0;
        const DOI_LOOKUP = 1 << 1;
        const AUTHOR_SEARCH = 1 << 2;
    }
}

/// Errors raised by catalog adapters.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {source}")]
    Fetch {
        provider: ProviderKind,
        #[source]
        source: FetchError,
    },

    #[error("{provider} response could not be interpreted: {message}")]
    Parse {
        provider: ProviderKind,
        message: String,
    },

    /// The HTML catalog served an anti-automation challenge page.
    #[error("Google Scholar presented an anti-automation challenge")]
    ScrapeBlocked,

    #[error("operation not supported by {provider}")]
    NotSupported { provider: ProviderKind },
}

impl ProviderError {
    pub fn fetch(provider: ProviderKind, source: FetchError) -> Self {
        ProviderError::Fetch { provider, source }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            ProviderError::Fetch { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// A scholarly metadata catalog.
///
/// `search_works` returns an ordered sequence of normalized records. Adapters
/// never partially fail: an error means the whole call yielded nothing, and
/// the aggregator records it without failing the fan-out.
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> ProviderKind;

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::SEARCH
    }

    async fn search_works(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ProviderWork>, ProviderError>;

    /// Direct DOI lookup. `Ok(None)` means the catalog does not know the DOI.
    async fn get_work_by_doi(&self, _doi: &str) -> Result<Option<ProviderWork>, ProviderError> {
        Err(ProviderError::NotSupported {
            provider: self.kind(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_flags() {
        let caps = ProviderCapabilities::SEARCH | ProviderCapabilities::DOI_LOOKUP;
        assert!(caps.contains(ProviderCapabilities::SEARCH));
        assert!(!caps.contains(ProviderCapabilities::AUTHOR_SEARCH));
    }
}
