// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Multi-engine search orchestration
//!
//! Fans one logical search out across several external engines:
//! - Google Custom Search (primary), Bing and Brave (fallbacks)
//! - Per-provider daily and per-minute quotas with scheduled resets
//! - A priority-aware queue for calls that hit a quota mid-search
//! - Deduplicating merge by canonical URL
//! - Tiered-TTL result caching with priority eviction
//! - Per-user weekly and monthly allowances by subscription tier

pub mod bing;
pub mod brave;
pub mod cache;
pub mod clock;
pub mod config;
pub mod google;
pub mod merger;
pub mod mock;
pub mod paging;
pub mod provider;
pub mod queue;
pub mod quota;
pub mod scoring;
pub mod service;
pub mod types;
pub mod usage;

// Re-export commonly used types
pub use cache::{CacheStats, ResultCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SearchConfig;
pub use provider::SearchProvider;
pub use quota::{ProviderQuota, QuotaLimits, QuotaManager};
pub use service::{ProviderStats, SearchOrchestrator};
pub use types::{
    CombinedResult, ContentFilter, ContentType, NormalizedResult, ResultOrigin, SearchError,
    SearchParameters, SearchRequest, SearchType, SortBy,
};
pub use usage::{SubscriptionTier, UsageReservation, UsageSummary, UsageTracker, UserContext};
