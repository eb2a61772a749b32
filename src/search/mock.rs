// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Demo-mode result synthesis
//!
//! Only used when demo mode is switched on and a provider has no credentials.
//! Every synthesized result is tagged [`ResultOrigin::Mock`] and points at a
//! reserved `.invalid` host so it can never be mistaken for a live match.

use super::scoring::{relevance_score, similarity_score};
use super::types::{ContentType, NormalizedResult, ResultOrigin, SearchRequest, SearchType};

/// Most results a demo provider returns for one call
const MAX_MOCK_RESULTS: usize = 10;

/// Deterministic stand-in results for `request`
pub fn synthesize(provider: &str, request: &SearchRequest, max_results: usize) -> Vec<NormalizedResult> {
    let count = max_results.min(MAX_MOCK_RESULTS);
    let terms = request.terms().trim();
    let slug = slugify(terms);
    let domain = format!("demo-{}.invalid", provider);

    (0..count)
        .map(|i| {
            let url = format!("https://{}/{}/{}", domain, slug, i + 1);
            let title = format!("Sample {} result {} for \"{}\"", request.search_type, i + 1, terms);
            let snippet = format!(
                "Demo data from {}. Configure API credentials to see live results.",
                provider
            );
            let score = match request.search_type {
                SearchType::Image => similarity_score(i, count),
                _ => relevance_score(terms, i, &title, &snippet, &url),
            };
            let thumbnail_url = match request.search_type {
                SearchType::Image => Some(format!("https://{}/thumb/{}.jpg", domain, i + 1)),
                _ => None,
            };

            NormalizedResult {
                title,
                url,
                display_domain: domain.clone(),
                thumbnail_url,
                snippet,
                content_type: match request.search_type {
                    SearchType::Image => ContentType::Image,
                    SearchType::Hashtag => ContentType::Social,
                    SearchType::Text => ContentType::Website,
                },
                relevance_score: score,
                source_provider: provider.to_string(),
                origin: ResultOrigin::Mock,
            }
        })
        .collect()
}

fn slugify(text: &str) -> String {
    let slug: String = text
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let slug = slug
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "query".to_string()
    } else {
        slug
    }
}
