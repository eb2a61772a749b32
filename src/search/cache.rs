// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Tiered-TTL cache of combined search results

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use super::clock::Clock;
use super::types::CombinedResult;

/// Occupancy (in tenths of max size) at which cleanup starts evicting live entries
const EVICTION_HIGH_WATER: usize = 9;
/// Occupancy (in tenths of max size) that eviction brings the cache back to
const EVICTION_LOW_WATER: usize = 8;

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub max_size: usize,
    /// TTL for entries sourced from a primary (costly, tightly rate-limited) provider
    pub primary_ttl: Duration,
    /// TTL for every other entry
    pub default_ttl: Duration,
    pub primary_providers: Vec<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_size: 500,
            primary_ttl: Duration::hours(6),
            default_ttl: Duration::minutes(30),
            primary_providers: vec!["google".to_string()],
        }
    }
}

struct CacheEntry {
    payload: CombinedResult,
    created_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    hit_count: u64,
    provider_source: Option<String>,
    ttl: Duration,
    primary: bool,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > self.ttl
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
    provider_calls: HashMap<String, u64>,
    estimated_cost: f64,
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Total entries in cache
    pub total: usize,
    /// Expired entries (not yet evicted)
    pub expired: usize,
    /// Maximum cache capacity
    pub max: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub provider_calls: HashMap<String, u64>,
    pub estimated_cost: f64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Cache of combined results keyed by `type:query:canonical params`
///
/// All state sits behind one mutex, so get/put/cleanup are serialized.
/// Statistics are for observability only.
pub struct ResultCache {
    state: Mutex<CacheState>,
    settings: CacheSettings,
    clock: Arc<dyn Clock>,
}

impl ResultCache {
    pub fn new(settings: CacheSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            settings,
            clock,
        }
    }

    /// Get a cached result; expired entries are removed and reported as a miss
    pub fn get(&self, key: &str) -> Option<CombinedResult> {
        let now = self.clock.now();
        let mut state = self.state.lock().ok()?;

        let expired = match state.entries.get(key) {
            None => {
                state.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            state.entries.remove(key);
            state.misses += 1;
            debug!("Cache entry expired: {}", key);
            return None;
        }

        state.hits += 1;
        let entry = state.entries.get_mut(key)?;
        entry.hit_count += 1;
        entry.last_accessed_at = now;
        Some(entry.payload.clone())
    }

    /// Store a result; runs a cleanup first when the cache is full
    pub fn put(
        &self,
        key: &str,
        payload: CombinedResult,
        provider_source: Option<&str>,
        cost_estimate: Option<f64>,
    ) {
        if self.settings.max_size == 0 {
            return;
        }

        let now = self.clock.now();
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        if state.entries.len() >= self.settings.max_size && !state.entries.contains_key(key) {
            self.cleanup_locked(&mut state, now);
        }

        let primary = provider_source.map(|p| self.is_primary(p)).unwrap_or(false);
        let ttl = if primary {
            self.settings.primary_ttl
        } else {
            self.settings.default_ttl
        };

        if let Some(cost) = cost_estimate {
            state.estimated_cost += cost;
        }

        state.entries.insert(
            key.to_string(),
            CacheEntry {
                payload,
                created_at: now,
                last_accessed_at: now,
                hit_count: 0,
                provider_source: provider_source.map(str::to_string),
                ttl,
                primary,
            },
        );
    }

    pub fn invalidate(&self, key: &str) -> bool {
        match self.state.lock() {
            Ok(mut state) => state.entries.remove(key).is_some(),
            Err(_) => false,
        }
    }

    /// Purge expired entries; above the high-water mark also evict the least
    /// valuable live entries down to the low-water mark
    pub fn cleanup(&self) {
        let now = self.clock.now();
        if let Ok(mut state) = self.state.lock() {
            self.cleanup_locked(&mut state, now);
        }
    }

    /// Count a provider call for statistics
    pub fn record_provider_call(&self, provider: &str) {
        if let Ok(mut state) = self.state.lock() {
            *state.provider_calls.entry(provider.to_string()).or_insert(0) += 1;
        }
    }

    /// Provider that sourced a cached entry, if any
    pub fn provider_source(&self, key: &str) -> Option<String> {
        let state = self.state.lock().ok()?;
        state.entries.get(key)?.provider_source.clone()
    }

    /// Clear all cache entries
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let state = match self.state.lock() {
            Ok(s) => s,
            Err(_) => {
                return CacheStats {
                    total: 0,
                    expired: 0,
                    max: self.settings.max_size,
                    hits: 0,
                    misses: 0,
                    evictions: 0,
                    provider_calls: HashMap::new(),
                    estimated_cost: 0.0,
                }
            }
        };

        CacheStats {
            total: state.entries.len(),
            expired: state.entries.values().filter(|e| e.is_expired(now)).count(),
            max: self.settings.max_size,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            provider_calls: state.provider_calls.clone(),
            estimated_cost: state.estimated_cost,
        }
    }

    fn is_primary(&self, provider: &str) -> bool {
        self.settings
            .primary_providers
            .iter()
            .any(|p| p.eq_ignore_ascii_case(provider))
    }

    fn cleanup_locked(&self, state: &mut CacheState, now: DateTime<Utc>) {
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        let mut evicted = before - state.entries.len();

        let max = self.settings.max_size;
        if state.entries.len() * 10 >= max * EVICTION_HIGH_WATER {
            let target = max * EVICTION_LOW_WATER / 10;
            let excess = state.entries.len().saturating_sub(target);

            // Least valuable first: non-primary source, fewest hits, oldest access
            let mut ranked: Vec<(bool, u64, DateTime<Utc>, String)> = state
                .entries
                .iter()
                .map(|(k, e)| (e.primary, e.hit_count, e.last_accessed_at, k.clone()))
                .collect();
            ranked.sort();

            for (_, _, _, key) in ranked.into_iter().take(excess) {
                state.entries.remove(&key);
            }
            state.evictions += excess as u64;
            evicted += excess;
        }

        if evicted > 0 {
            debug!(
                "Cache cleanup removed {} entries ({} remain)",
                evicted,
                state.entries.len()
            );
        }
    }
}
