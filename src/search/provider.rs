// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Search provider trait definition

use async_trait::async_trait;

use super::quota::QuotaLimits;
use super::types::{NormalizedResult, SearchError, SearchParameters, SearchRequest, SearchType};

/// Trait for implementing search providers
///
/// Each provider maps a [`SearchRequest`] onto its own wire format, performs the
/// call, and returns results already in the [`NormalizedResult`] shape. Providers
/// are tried in descending priority order with automatic failover.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Perform a search
    ///
    /// # Arguments
    /// * `request` - The search to run
    /// * `max_results` - Maximum number of results to return
    ///
    /// # Returns
    /// Normalized results, or an error categorised by [`SearchError`]
    async fn execute(
        &self,
        request: &SearchRequest,
        max_results: usize,
    ) -> Result<Vec<NormalizedResult>, SearchError>;

    /// Provider id used for quotas, logging and cache statistics
    fn name(&self) -> &str;

    /// Whether the provider is switched on in configuration
    fn is_enabled(&self) -> bool;

    /// Get provider priority (higher = preferred)
    fn priority(&self) -> u8 {
        0
    }

    /// Whether this provider can serve the given kind of search
    fn supports(&self, _search_type: SearchType) -> bool {
        true
    }

    fn quota_limits(&self) -> QuotaLimits {
        QuotaLimits::default()
    }

    /// Estimated cost of one call, for cache statistics
    fn cost_per_request(&self) -> f64 {
        0.0
    }
}

/// Fold exact-match quoting and site restrictions into a free-text query
///
/// Used by engines whose APIs have no dedicated site parameters.
pub(crate) fn compose_query(terms: &str, params: &SearchParameters) -> String {
    let terms = terms.trim();
    let mut query = if params.exact_match && !terms.starts_with('"') {
        format!("\"{}\"", terms)
    } else {
        terms.to_string()
    };

    if !params.site_filter.is_empty() {
        let sites: Vec<String> = params
            .site_filter
            .iter()
            .map(|s| format!("site:{}", s))
            .collect();
        if sites.len() == 1 {
            query.push_str(&format!(" {}", sites[0]));
        } else {
            query.push_str(&format!(" ({})", sites.join(" OR ")));
        }
    }

    for site in &params.exclude_sites {
        query.push_str(&format!(" -site:{}", site));
    }

    query
}
