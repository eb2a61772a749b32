// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Per-provider daily and per-minute quotas
//!
//! Counters are only ever incremented by [`QuotaManager::track_usage`] (or
//! [`QuotaManager::try_acquire`]) and only ever zeroed by a due reset. Resets run
//! lazily on every check and on the orchestrator's maintenance timer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::clock::{next_local_midnight, Clock};

/// Length of a per-minute window, counted from its first request
const MINUTE_WINDOW_SECS: i64 = 60;

/// Daily and per-minute ceilings for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaLimits {
    pub daily_limit: u32,
    pub per_minute_limit: u32,
}

impl QuotaLimits {
    pub fn new(daily_limit: u32, per_minute_limit: u32) -> Self {
        Self {
            daily_limit,
            per_minute_limit,
        }
    }
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self::new(100, 10)
    }
}

/// Usage state of one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderQuota {
    pub provider_id: String,
    pub daily_limit: u32,
    pub daily_usage: u32,
    pub daily_reset_at: DateTime<Utc>,
    pub per_minute_limit: u32,
    pub minute_usage: u32,
    /// Unset while the current minute window has seen no requests
    pub minute_reset_at: Option<DateTime<Utc>>,
}

impl ProviderQuota {
    fn new(provider_id: &str, limits: QuotaLimits, now: DateTime<Utc>) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            daily_limit: limits.daily_limit,
            daily_usage: 0,
            daily_reset_at: next_local_midnight(now),
            per_minute_limit: limits.per_minute_limit,
            minute_usage: 0,
            minute_reset_at: None,
        }
    }

    /// Zero any window whose reset time has passed; returns true if anything changed
    fn reset_if_due(&mut self, now: DateTime<Utc>) -> bool {
        let mut changed = false;

        if now > self.daily_reset_at {
            self.daily_usage = 0;
            self.daily_reset_at = next_local_midnight(now);
            changed = true;
        }

        if let Some(reset_at) = self.minute_reset_at {
            if now > reset_at {
                self.minute_usage = 0;
                self.minute_reset_at = None;
                changed = true;
            }
        }

        changed
    }

    pub fn is_admissible(&self) -> bool {
        self.daily_usage < self.daily_limit && self.minute_usage < self.per_minute_limit
    }

    fn record(&mut self, now: DateTime<Utc>) {
        self.daily_usage = self.daily_usage.saturating_add(1);
        self.minute_usage = self.minute_usage.saturating_add(1);
        if self.minute_reset_at.is_none() {
            self.minute_reset_at = Some(now + Duration::seconds(MINUTE_WINDOW_SECS));
        }
    }
}

/// Tracks provider usage and answers admissibility queries
///
/// Never fails: a poisoned lock makes every provider inadmissible.
pub struct QuotaManager {
    quotas: Mutex<HashMap<String, ProviderQuota>>,
    default_limits: QuotaLimits,
    clock: Arc<dyn Clock>,
}

impl QuotaManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_default_limits(clock, QuotaLimits::default())
    }

    /// Limits applied to providers that were never registered
    pub fn with_default_limits(clock: Arc<dyn Clock>, default_limits: QuotaLimits) -> Self {
        Self {
            quotas: Mutex::new(HashMap::new()),
            default_limits,
            clock,
        }
    }

    /// Set a provider's limits, keeping any usage already recorded
    pub fn register(&self, provider_id: &str, limits: QuotaLimits) {
        let now = self.clock.now();
        let Ok(mut quotas) = self.quotas.lock() else {
            return;
        };
        let quota = quotas
            .entry(provider_id.to_string())
            .or_insert_with(|| ProviderQuota::new(provider_id, limits, now));
        quota.daily_limit = limits.daily_limit;
        quota.per_minute_limit = limits.per_minute_limit;
    }

    pub fn can_make_request(&self, provider_id: &str) -> bool {
        let now = self.clock.now();
        let Ok(mut quotas) = self.quotas.lock() else {
            return false;
        };
        let quota = self.entry(&mut quotas, provider_id, now);
        quota.reset_if_due(now);
        quota.is_admissible()
    }

    /// Count one request against the provider's daily and minute windows
    pub fn track_usage(&self, provider_id: &str) {
        let now = self.clock.now();
        let Ok(mut quotas) = self.quotas.lock() else {
            return;
        };
        let quota = self.entry(&mut quotas, provider_id, now);
        quota.reset_if_due(now);
        quota.record(now);
    }

    /// Check and count in one step; returns false without counting when inadmissible
    pub fn try_acquire(&self, provider_id: &str) -> bool {
        let now = self.clock.now();
        let Ok(mut quotas) = self.quotas.lock() else {
            return false;
        };
        let quota = self.entry(&mut quotas, provider_id, now);
        quota.reset_if_due(now);
        if !quota.is_admissible() {
            return false;
        }
        quota.record(now);
        true
    }

    /// Reset every provider whose window has elapsed
    pub fn reset_due(&self) {
        let now = self.clock.now();
        let Ok(mut quotas) = self.quotas.lock() else {
            return;
        };
        for quota in quotas.values_mut() {
            if quota.reset_if_due(now) {
                debug!("Quota window reset for {}", quota.provider_id);
            }
        }
    }

    pub fn snapshot(&self, provider_id: &str) -> Option<ProviderQuota> {
        let now = self.clock.now();
        let mut quotas = self.quotas.lock().ok()?;
        let quota = quotas.get_mut(provider_id)?;
        quota.reset_if_due(now);
        Some(quota.clone())
    }

    pub fn snapshots(&self) -> Vec<ProviderQuota> {
        let now = self.clock.now();
        let Ok(mut quotas) = self.quotas.lock() else {
            return Vec::new();
        };
        let mut all: Vec<ProviderQuota> = quotas
            .values_mut()
            .map(|q| {
                q.reset_if_due(now);
                q.clone()
            })
            .collect();
        all.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        all
    }

    fn entry<'a>(
        &self,
        quotas: &'a mut HashMap<String, ProviderQuota>,
        provider_id: &str,
        now: DateTime<Utc>,
    ) -> &'a mut ProviderQuota {
        quotas
            .entry(provider_id.to_string())
            .or_insert_with(|| ProviderQuota::new(provider_id, self.default_limits, now))
    }
}
