//! Cross-provider entity resolution.
//!
//! Incoming provider records fold into a canonical map keyed by a synthetic
//! key, with secondary indexes on DOI and normalized title. Resolution order:
//! DOI match, exact-title match with compatible year and a shared author
//! signal, fuzzy title match above the configured Jaccard threshold, then a
//! fresh canonical.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{CanonicalWork, ProvenanceRecord, ProviderWork, WorkAuthor};
use crate::utils::{clamp, jaccard, normalized_title_key, title_token_set};

/// Citation impact on a log scale, saturating at 10^4 citations.
pub fn citation_score(count: u64) -> f64 {
    ((count as f64 + 1.0).log10() / 4.0).min(1.0)
}

/// Per-provider blended relevance used during merge.
fn provider_blend(work: &ProviderWork) -> f64 {
    let blended = 0.6 * work.relevance
        + 0.3 * citation_score(work.citations.total)
        + 0.1 * work.provider.weight();
    clamp(blended, 0.0, 1.0)
}

/// Null years are compatible with anything; otherwise within two years.
fn years_compatible(a: Option<i32>, b: Option<i32>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() <= 2,
        _ => true,
    }
}

/// Shared author signal: a common provider author id, or a common normalized
/// name. Two works with no author data at all are considered compatible.
fn author_signal(a: &[WorkAuthor], b: &[WorkAuthor]) -> bool {
    if a.is_empty() || b.is_empty() {
        return true;
    }
    let ids_a: Vec<&str> = a
        .iter()
        .filter_map(|x| x.provider_author_id.as_deref())
        .collect();
    if b.iter()
        .filter_map(|x| x.provider_author_id.as_deref())
        .any(|id| ids_a.contains(&id))
    {
        return true;
    }
    let names_a: Vec<String> = a.iter().map(|x| x.normalized_name()).collect();
    b.iter()
        .map(|x| x.normalized_name())
        .any(|name| !name.is_empty() && names_a.contains(&name))
}

/// Accumulator for one aggregator call.
#[derive(Debug, Default)]
pub struct CanonicalSet {
    entries: HashMap<String, CanonicalWork>,
    by_doi: HashMap<String, String>,
    by_title: HashMap<String, Vec<String>>,
    /// Insertion order, for deterministic iteration and fuzzy scans.
    order: Vec<String>,
    next_key: usize,
}

impl CanonicalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn resolve_target_key(&self, work: &ProviderWork, fuzzy_threshold: f64) -> Option<String> {
        if let Some(doi) = &work.doi {
            if let Some(key) = self.by_doi.get(doi) {
                return Some(key.clone());
            }
        }

        let title_key = normalized_title_key(&work.title);
        if let Some(candidates) = self.by_title.get(&title_key) {
            for key in candidates {
                let existing = &self.entries[key];
                if years_compatible(existing.year, work.year)
                    && author_signal(&existing.authors, &work.authors)
                {
                    return Some(key.clone());
                }
            }
        }

        let tokens = title_token_set(&work.title);
        let mut best: Option<(f64, &String)> = None;
        for key in &self.order {
            let existing = &self.entries[key];
            if !years_compatible(existing.year, work.year)
                || !author_signal(&existing.authors, &work.authors)
            {
                continue;
            }
            let similarity = jaccard(&tokens, &title_token_set(&existing.title));
            if similarity >= fuzzy_threshold
                && best.map_or(true, |(current, _)| similarity > current)
            {
                best = Some((similarity, key));
            }
        }
        best.map(|(_, key)| key.clone())
    }

    /// Fold one provider record into the set.
    pub fn fold(&mut self, work: ProviderWork, fetched_at: DateTime<Utc>, fuzzy_threshold: f64) {
        match self.resolve_target_key(&work, fuzzy_threshold) {
            Some(key) => self.merge_into(&key, work, fetched_at),
            None => self.insert_new(work, fetched_at),
        }
    }

    fn insert_new(&mut self, work: ProviderWork, fetched_at: DateTime<Utc>) {
        self.next_key += 1;
        let key = format!("k{}", self.next_key);

        let paper_id = match &work.doi {
            Some(doi) => doi.clone(),
            None => format!(
                "{}:{}",
                normalized_title_key(&work.title).replace(' ', "-"),
                work.year.map(|y| y.to_string()).unwrap_or_default()
            ),
        };

        let canonical = CanonicalWork {
            paper_id,
            title: work.title.clone(),
            abstract_text: work.abstract_text.clone(),
            year: work.year,
            venue: work.venue.clone(),
            doi: work.doi.clone(),
            url: work.url.clone(),
            citations: work.citations,
            authors: work.authors.clone(),
            external_ids: work.external_ids.clone(),
            fields_of_study: work.fields_of_study.clone(),
            open_access: work.open_access.clone(),
            provenance: vec![ProvenanceRecord {
                provider: work.provider,
                source_url: non_empty(&work.source_url),
                fetched_at,
                confidence: work.relevance,
            }],
            score: provider_blend(&work),
        };

        if let Some(doi) = &canonical.doi {
            self.by_doi.insert(doi.clone(), key.clone());
        }
        self.by_title
            .entry(normalized_title_key(&canonical.title))
            .or_default()
            .push(key.clone());
        self.order.push(key.clone());
        self.entries.insert(key, canonical);
    }

    fn merge_into(&mut self, key: &str, work: ProviderWork, fetched_at: DateTime<Utc>) {
        let score = provider_blend(&work);
        let existing = self.entries.get_mut(key).expect("resolved key exists");

        // Scalars: first non-null wins.
        if existing.abstract_text.is_none() {
            existing.abstract_text = work.abstract_text;
        }
        if existing.year.is_none() {
            existing.year = work.year;
        }
        if existing.venue.is_none() {
            existing.venue = work.venue;
        }
        if existing.url.is_none() {
            existing.url = work.url;
        }
        if existing.doi.is_none() {
            if let Some(doi) = work.doi.clone() {
                self.by_doi.insert(doi.clone(), key.to_string());
                existing.doi = Some(doi);
            }
        }

        // Counts are monotone under merge.
        existing.citations.total = existing.citations.total.max(work.citations.total);
        existing.citations.influential =
            existing.citations.influential.max(work.citations.influential);
        existing.citations.reference_count = existing
            .citations
            .reference_count
            .max(work.citations.reference_count);

        if existing.authors.is_empty() {
            existing.authors = work.authors;
        }
        existing
            .fields_of_study
            .extend(work.fields_of_study.into_iter());
        for (id_key, id_value) in work.external_ids {
            existing.external_ids.entry(id_key).or_insert(id_value);
        }
        existing.open_access.is_open = existing.open_access.is_open || work.open_access.is_open;
        if existing.open_access.pdf_url.is_none() {
            existing.open_access.pdf_url = work.open_access.pdf_url;
        }
        if existing.open_access.license.is_none() {
            existing.open_access.license = work.open_access.license;
        }

        // One provenance entry per distinct contributing provider.
        if !existing
            .provenance
            .iter()
            .any(|p| p.provider == work.provider)
        {
            existing.provenance.push(ProvenanceRecord {
                provider: work.provider,
                source_url: non_empty(&work.source_url),
                fetched_at,
                confidence: work.relevance,
            });
        }

        existing.score = existing.score.max(score);
    }

    /// Rank and drain: blended score descending, citation count tiebreaker.
    pub fn into_ranked(mut self, requested_providers: usize, current_year: i32) -> Vec<CanonicalWork> {
        let order = std::mem::take(&mut self.order);
        let mut ranked: Vec<(f64, CanonicalWork)> = order
            .into_iter()
            .filter_map(|key| self.entries.remove(&key))
            .map(|work| {
                let blended = final_blend(&work, requested_providers, current_year);
                (blended, work)
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.citations.total.cmp(&a.1.citations.total))
        });
        ranked.into_iter().map(|(_, work)| work).collect()
    }
}

/// Final ranking blend: merged score, citation impact, provider diversity,
/// and recency.
fn final_blend(work: &CanonicalWork, requested_providers: usize, current_year: i32) -> f64 {
    let diversity = if requested_providers == 0 {
        0.0
    } else {
        work.distinct_providers() as f64 / requested_providers as f64
    };
    let recency = match work.year {
        Some(year) => 1.0 / (current_year - year + 1).max(1) as f64,
        None => 0.15,
    };
    0.5 * work.score
        + 0.25 * citation_score(work.citations.total)
        + 0.15 * diversity
        + 0.1 * (2.0 * recency).min(1.0)
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
