//! Utility modules.

mod http;
mod text;

pub use http::{FetchConfig, FetchError, FetchedBytes, PacedClient};
pub use text::{
    clamp, find_doi, jaccard, normalize_doi, normalize_whitespace, normalized_title_key,
    title_token_set, tokenize, year_from_int, year_from_text,
};
