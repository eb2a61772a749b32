// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Deduplicating merge of results from several providers

use std::cmp::Ordering;
use std::collections::HashSet;

use url::Url;

use super::types::NormalizedResult;

/// Query parameters that only track the click and never change the page
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "msclkid", "ref", "igshid"];

/// Normalize a result link for use as a deduplication key
///
/// Scheme, `www.`, default ports, fragments, tracking parameters and trailing
/// slashes are dropped so the same page reached through different links
/// collapses to one key.
pub fn canonical_url(raw: &str) -> String {
    let raw = raw.trim();
    let Ok(parsed) = Url::parse(raw) else {
        return raw.trim_end_matches('/').to_lowercase();
    };

    let Some(host) = parsed.host_str() else {
        return raw.trim_end_matches('/').to_lowercase();
    };
    let host = host.trim_start_matches("www.");

    let mut key = host.to_string();
    if let Some(port) = parsed.port() {
        key.push_str(&format!(":{}", port));
    }
    key.push_str(parsed.path().trim_end_matches('/'));

    let mut query: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.to_lowercase();
            !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !query.is_empty() {
        query.sort();
        let pairs: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        key.push('?');
        key.push_str(&pairs.join("&"));
    }

    key
}

/// Host shown next to a result, without `www.`
pub fn display_domain(raw: &str) -> String {
    Url::parse(raw.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_default()
}

/// Append `source` to `target`, skipping results whose canonical URL is already present
///
/// First occurrence wins and nothing is reordered. Returns the number of results added.
pub fn merge(target: &mut Vec<NormalizedResult>, source: Vec<NormalizedResult>) -> usize {
    let mut seen: HashSet<String> = target.iter().map(|r| canonical_url(&r.url)).collect();
    let before = target.len();

    for result in source {
        if seen.insert(canonical_url(&result.url)) {
            target.push(result);
        }
    }

    target.len() - before
}

/// Merge lists in order of precedence
pub fn merge_all(lists: Vec<Vec<NormalizedResult>>) -> Vec<NormalizedResult> {
    let mut merged = Vec::new();
    for list in lists {
        merge(&mut merged, list);
    }
    merged
}

/// Stable sort by descending relevance
pub fn sort_by_relevance(results: &mut [NormalizedResult]) {
    results.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(Ordering::Equal)
    });
}
