// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Deterministic 0..1 relevance and similarity scoring
//!
//! Providers report results in rank order with no comparable score, so every
//! adapter scores by position decay plus bonuses for the query appearing in
//! the title, snippet or URL.

use super::types::{SearchMode, SearchParameters};

const POSITION_WEIGHT: f32 = 0.6;
const TITLE_BONUS: f32 = 0.2;
const SNIPPET_BONUS: f32 = 0.1;
const URL_BONUS: f32 = 0.1;

/// Score below which an image result counts as a partial match
pub const PARTIAL_MATCH_CUTOFF: f32 = 0.5;

/// Relevance of the result at `position` (zero-based) for `query`
pub fn relevance_score(query: &str, position: usize, title: &str, snippet: &str, url: &str) -> f32 {
    let mut score = POSITION_WEIGHT * position_decay(position);

    let needle = query.trim().trim_matches('"').trim_start_matches('#').to_lowercase();
    if !needle.is_empty() {
        if title.to_lowercase().contains(&needle) {
            score += TITLE_BONUS;
        }
        if snippet.to_lowercase().contains(&needle) {
            score += SNIPPET_BONUS;
        }
        let compact: String = needle.split_whitespace().collect();
        if url.to_lowercase().contains(&compact) {
            score += URL_BONUS;
        }
    }

    score.clamp(0.0, 1.0)
}

/// Similarity of an image result; providers rank visually closer matches first
pub fn similarity_score(position: usize, total: usize) -> f32 {
    if total <= 1 {
        return 1.0;
    }
    let rank = position.min(total - 1) as f32 / (total - 1) as f32;
    (1.0 - 0.7 * rank).clamp(0.0, 1.0)
}

/// Whether an image result survives the caller's similarity options
///
/// Strict mode requires the full threshold, relaxed mode half of it.
pub fn passes_image_filters(score: f32, params: &SearchParameters) -> bool {
    if !params.partial_matches_allowed() && score < PARTIAL_MATCH_CUTOFF {
        return false;
    }

    match params.similarity_threshold {
        Some(threshold) => {
            let required = match params.search_mode {
                SearchMode::Strict => threshold,
                SearchMode::Relaxed => threshold / 2.0,
            };
            score >= required
        }
        None => true,
    }
}

fn position_decay(position: usize) -> f32 {
    1.0 / (1.0 + 0.1 * position as f32)
}
