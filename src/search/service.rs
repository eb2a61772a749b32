// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Search orchestration
//!
//! Coordinates search providers, quotas, the request queue and caching.
//! Providers are tried one after another in descending priority; each
//! answer is merged into one combined, deduplicated result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::bing::BingSearchProvider;
use super::brave::BraveSearchProvider;
use super::cache::{CacheStats, ResultCache};
use super::clock::{Clock, SystemClock};
use super::config::SearchConfig;
use super::google::GoogleSearchProvider;
use super::merger;
use super::paging::MAX_PAGES;
use super::provider::SearchProvider;
use super::queue::{QueuedJob, QueuedOutcome, RequestQueue};
use super::quota::QuotaManager;
use super::types::{
    CombinedResult, ProviderFailure, SearchError, SearchParameters, SearchRequest, SearchType,
    MULTI_ENGINE_SOURCE,
};
use super::usage::{UsageSummary, UsageTracker, UserContext};

type SearchOutcome = Result<CombinedResult, SearchError>;
type PendingSearch = Shared<BoxFuture<'static, SearchOutcome>>;

const QUOTA_RESET_INTERVAL: Duration = Duration::from_secs(60);

/// An in-flight search; joiners with queue priority promote it
struct PendingEntry {
    search: PendingSearch,
    priority: Arc<AtomicBool>,
}

/// Per-provider view for dashboards and the CLI
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStats {
    pub provider: String,
    pub enabled: bool,
    pub priority: u8,
    /// Enabled and currently within quota
    pub available: bool,
    pub daily_usage: u32,
    pub daily_limit: u32,
    pub daily_reset_at: Option<DateTime<Utc>>,
    pub minute_usage: u32,
    pub per_minute_limit: u32,
    pub minute_reset_at: Option<DateTime<Utc>>,
    pub calls: u64,
    pub cost_per_request: f64,
}

/// Main search service that orchestrates providers, quotas, queueing and caching
///
/// Owns every piece of shared state; dropping it stops the maintenance timers
/// and the queue consumer.
pub struct SearchOrchestrator {
    inner: Arc<Inner>,
    maintenance: Vec<JoinHandle<()>>,
}

struct Inner {
    config: SearchConfig,
    /// Sorted by descending priority
    providers: Vec<Arc<dyn SearchProvider>>,
    quota: Arc<QuotaManager>,
    cache: ResultCache,
    usage: UsageTracker,
    queue: OnceLock<RequestQueue>,
    pending: Mutex<HashMap<String, PendingEntry>>,
}

impl SearchOrchestrator {
    /// Create an orchestrator with the Google, Bing and Brave adapters
    pub fn new(config: SearchConfig) -> Self {
        let timeout = config.provider_timeout();
        let providers: Vec<Arc<dyn SearchProvider>> = vec![
            Arc::new(GoogleSearchProvider::new(
                config.providers.google.clone(),
                config.demo_mode,
                timeout,
            )),
            Arc::new(BingSearchProvider::new(
                config.providers.bing.clone(),
                config.demo_mode,
                timeout,
            )),
            Arc::new(BraveSearchProvider::new(
                config.providers.brave.clone(),
                config.demo_mode,
                timeout,
            )),
        ];

        if !config.has_any_provider() {
            if config.demo_mode {
                info!("No search credentials configured; demo mode serves sample results");
            } else {
                warn!("No search credentials configured; searches will fail until keys are set");
            }
        }

        Self::with_providers(config, providers)
    }

    pub fn with_providers(config: SearchConfig, providers: Vec<Arc<dyn SearchProvider>>) -> Self {
        Self::with_clock(config, providers, Arc::new(SystemClock))
    }

    /// Create an orchestrator over explicit providers and time source
    pub fn with_clock(
        config: SearchConfig,
        mut providers: Vec<Arc<dyn SearchProvider>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        providers.sort_by(|a, b| b.priority().cmp(&a.priority()));

        let quota = Arc::new(QuotaManager::new(clock.clone()));
        for provider in &providers {
            quota.register(provider.name(), provider.quota_limits());
            debug!(
                "Registered {} (priority {}, enabled: {})",
                provider.name(),
                provider.priority(),
                provider.is_enabled()
            );
        }

        let inner = Arc::new(Inner {
            cache: ResultCache::new(config.cache_settings(), clock.clone()),
            usage: UsageTracker::new(clock),
            quota,
            providers,
            queue: OnceLock::new(),
            pending: Mutex::new(HashMap::new()),
            config,
        });

        let maintenance = Self::start_maintenance(&inner);

        Self { inner, maintenance }
    }

    /// Spawn the quota reset and cache cleanup timers when a runtime is present
    fn start_maintenance(inner: &Arc<Inner>) -> Vec<JoinHandle<()>> {
        let Ok(handle) = Handle::try_current() else {
            debug!("No tokio runtime; quota resets and cache cleanup run lazily");
            return Vec::new();
        };

        let cleanup_interval = Duration::from_secs(inner.config.cache.cleanup_interval_secs.max(1));

        let weak = Arc::downgrade(inner);
        let quota_timer = handle.spawn(Self::every(QUOTA_RESET_INTERVAL, weak, |inner| {
            inner.quota.reset_due()
        }));

        let weak = Arc::downgrade(inner);
        let cache_timer = handle.spawn(Self::every(cleanup_interval, weak, |inner| {
            inner.cache.cleanup()
        }));

        vec![quota_timer, cache_timer]
    }

    async fn every(period: Duration, inner: Weak<Inner>, task: fn(&Inner)) {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            match inner.upgrade() {
                Some(inner) => task(&inner),
                None => break,
            }
        }
    }

    /// Perform a search
    ///
    /// # Returns
    /// The combined result, served from cache when a live entry exists
    ///
    /// # Errors
    /// * `InvalidQuery` - the request failed validation
    /// * `NoProvidersAvailable` - every provider is disabled, unsupported or over quota
    /// * `Configuration` - every attempted provider lacks credentials
    /// * `AllProvidersFailed` - every attempted provider errored
    pub async fn search(&self, request: SearchRequest) -> SearchOutcome {
        self.run(request, false).await
    }

    /// Perform a search on behalf of a user, enforcing their tier's allowance
    ///
    /// Premium and admin users jump ahead in the request queue. The allowance is
    /// reserved before the search runs and handed back if it fails, so only
    /// successful searches count.
    pub async fn search_as(&self, user: &UserContext, request: SearchRequest) -> SearchOutcome {
        if !self.inner.config.enabled {
            return Err(SearchError::SearchDisabled);
        }
        let reservation = self.inner.usage.reserve(user)?;

        let outcome = self.run(request, user.tier.is_priority()).await;
        if outcome.is_err() {
            self.inner.usage.release(reservation);
        }
        outcome
    }

    async fn run(&self, request: SearchRequest, priority: bool) -> SearchOutcome {
        if !self.inner.config.enabled {
            return Err(SearchError::SearchDisabled);
        }
        request.validate()?;

        let key = request.cache_key();
        if let Some(mut cached) = self.inner.cache.get(&key) {
            debug!("Cache hit for {}", key);
            cached.cached = true;
            cached.search_time_ms = 0;
            return Ok(cached);
        }
        debug!("Cache miss for {}", key);

        self.join_or_start(key, request, priority).await
    }

    /// Attach to an in-flight search for the same key, or start one
    ///
    /// A priority caller joining a normal search promotes it. Provider calls it
    /// has already queued keep their place.
    fn join_or_start(&self, key: String, request: SearchRequest, priority: bool) -> PendingSearch {
        let inner = self.inner.clone();
        let owned_key = key.clone();
        let flag = Arc::new(AtomicBool::new(priority));
        let shared_flag = flag.clone();
        let start = move || {
            async move {
                let outcome = inner.clone().execute(request, owned_key.clone(), shared_flag).await;
                inner.forget_pending(&owned_key);
                outcome
            }
            .boxed()
            .shared()
        };

        let Ok(mut pending) = self.inner.pending.lock() else {
            return start();
        };
        if let Some(existing) = pending.get(&key) {
            debug!("Joining in-flight search for {}", key);
            if priority {
                existing.priority.store(true, Ordering::Relaxed);
            }
            return existing.search.clone();
        }
        let search = start();
        pending.insert(
            key,
            PendingEntry {
                search: search.clone(),
                priority: flag,
            },
        );
        search
    }

    /// Check if search is enabled
    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    /// Names of providers that are enabled and within quota, in priority order
    pub fn list_available_providers(&self) -> Vec<String> {
        self.inner
            .providers
            .iter()
            .filter(|p| p.is_enabled() && self.inner.quota.can_make_request(p.name()))
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn provider_stats(&self) -> Vec<ProviderStats> {
        let calls = self.inner.cache.stats().provider_calls;

        self.inner
            .providers
            .iter()
            .map(|p| {
                let quota = self.inner.quota.snapshot(p.name());
                let available = p.is_enabled() && self.inner.quota.can_make_request(p.name());
                let limits = p.quota_limits();
                ProviderStats {
                    provider: p.name().to_string(),
                    enabled: p.is_enabled(),
                    priority: p.priority(),
                    available,
                    daily_usage: quota.as_ref().map(|q| q.daily_usage).unwrap_or(0),
                    daily_limit: limits.daily_limit,
                    daily_reset_at: quota.as_ref().map(|q| q.daily_reset_at),
                    minute_usage: quota.as_ref().map(|q| q.minute_usage).unwrap_or(0),
                    per_minute_limit: limits.per_minute_limit,
                    minute_reset_at: quota.as_ref().and_then(|q| q.minute_reset_at),
                    calls: calls.get(p.name()).copied().unwrap_or(0),
                    cost_per_request: p.cost_per_request(),
                }
            })
            .collect()
    }

    /// Get cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Clear the search cache
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Drop the cached result for one search; true if there was one
    pub fn invalidate(&self, search_type: SearchType, query: &str, params: SearchParameters) -> bool {
        let key = SearchRequest::new(search_type, query, params).cache_key();
        self.inner.cache.invalidate(&key)
    }

    pub fn usage_summary(&self, user: &UserContext) -> UsageSummary {
        self.inner.usage.summary(user)
    }

    pub fn quota_manager(&self) -> &QuotaManager {
        &self.inner.quota
    }

    /// Provider calls waiting in, or running from, the request queue
    pub fn queued_requests(&self) -> usize {
        self.inner.queue.get().map(RequestQueue::len).unwrap_or(0)
    }
}

impl Drop for SearchOrchestrator {
    fn drop(&mut self) {
        for task in &self.maintenance {
            task.abort();
        }
    }
}

impl Inner {
    async fn execute(
        self: Arc<Self>,
        request: SearchRequest,
        key: String,
        priority: Arc<AtomicBool>,
    ) -> SearchOutcome {
        let start = Instant::now();
        let limit = self.result_limit(&request);
        let per_engine = self.config.max_results_per_engine.min(limit);

        let eligible = self.eligible_providers(request.search_type);
        if eligible.is_empty() {
            warn!("No search providers available for {} search", request.search_type);
            return Err(SearchError::NoProvidersAvailable);
        }

        let mut items = Vec::new();
        let mut providers_used: Vec<String> = Vec::new();
        let mut failures: Vec<ProviderFailure> = Vec::new();
        let mut errors: Vec<SearchError> = Vec::new();

        for provider in &eligible {
            if items.len() >= limit {
                break;
            }

            debug!("Trying search provider: {}", provider.name());

            let queue_priority = priority.load(Ordering::Relaxed);
            match self.attempt(provider, &request, per_engine, queue_priority).await {
                Ok(results) => {
                    self.cache.record_provider_call(provider.name());
                    let returned = results.len();
                    let added = merger::merge(&mut items, results);
                    debug!(
                        "{} returned {} results, {} new",
                        provider.name(),
                        returned,
                        added
                    );
                    providers_used.push(provider.name().to_string());
                }
                Err(e) => {
                    if !matches!(e, SearchError::QuotaExceeded { .. } | SearchError::QueueClosed) {
                        self.cache.record_provider_call(provider.name());
                    }
                    warn!(
                        "Search provider {} failed: {}, trying next",
                        provider.name(),
                        e
                    );
                    failures.push(ProviderFailure {
                        provider: provider.name().to_string(),
                        error: e.to_string(),
                    });
                    errors.push(e);
                }
            }
        }

        // An empty answer only stands when no provider failed
        if providers_used.is_empty() || (items.is_empty() && !errors.is_empty()) {
            let attempted = providers_used.len() + errors.len();
            return Err(Self::failure(attempted, errors));
        }

        merger::sort_by_relevance(&mut items);
        items.truncate(limit);

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let synthetic = items.iter().any(|r| r.is_mock());
        let result = CombinedResult {
            request_id: Uuid::new_v4().to_string(),
            query: request.query().to_string(),
            search_type: request.search_type,
            total_results: items.len(),
            items,
            source: MULTI_ENGINE_SOURCE.to_string(),
            providers_used,
            failures,
            synthetic,
            cached: false,
            search_time_ms: elapsed_ms,
        };

        if result.items.is_empty() {
            info!("Search for {} found nothing", key);
            return Ok(result);
        }

        let cost: f64 = self
            .providers
            .iter()
            .filter(|p| result.providers_used.iter().any(|u| u == p.name()))
            .map(|p| p.cost_per_request())
            .sum();
        self.cache.put(
            &key,
            result.clone(),
            result.providers_used.first().map(String::as_str),
            Some(cost),
        );

        info!(
            "Search complete: {} results from [{}] in {}ms",
            result.total_results,
            result.providers_used.join(", "),
            elapsed_ms
        );

        Ok(result)
    }

    /// Call one provider now if its quota allows, otherwise through the queue
    async fn attempt(
        &self,
        provider: &Arc<dyn SearchProvider>,
        request: &SearchRequest,
        max_results: usize,
        priority: bool,
    ) -> QueuedOutcome {
        let timeout = self.attempt_budget();

        if self.quota.try_acquire(provider.name()) {
            return bounded(provider.as_ref(), request, max_results, timeout).await;
        }

        // Lost the quota to a concurrent search since the eligibility check
        info!("{} is over quota, queueing request", provider.name());
        let queued_provider = provider.clone();
        let queued_request = request.clone();
        let job: QueuedJob = Box::new(move || {
            async move {
                bounded(queued_provider.as_ref(), &queued_request, max_results, timeout).await
            }
            .boxed()
        });
        self.queue().submit(provider.name(), priority, job).await
    }

    /// Bound on one provider attempt
    ///
    /// Adapters time out each HTTP call on their own and keep earlier pages when a
    /// later one fails, so the attempt as a whole gets room for every page.
    fn attempt_budget(&self) -> Duration {
        self.config.provider_timeout() * (MAX_PAGES as u32 + 1)
    }

    fn queue(&self) -> &RequestQueue {
        self.queue
            .get_or_init(|| RequestQueue::spawn(self.quota.clone(), self.config.queue_settings()))
    }

    fn eligible_providers(&self, search_type: SearchType) -> Vec<Arc<dyn SearchProvider>> {
        self.providers
            .iter()
            .filter(|p| {
                if !p.is_enabled() {
                    debug!("Skipping {}: disabled", p.name());
                    return false;
                }
                if !p.supports(search_type) {
                    debug!("Skipping {}: no {} search", p.name(), search_type);
                    return false;
                }
                if !self.quota.can_make_request(p.name()) {
                    info!("Skipping {}: over quota", p.name());
                    return false;
                }
                true
            })
            .cloned()
            .collect()
    }

    fn result_limit(&self, request: &SearchRequest) -> usize {
        request
            .params
            .max_results
            .unwrap_or(self.config.default_num_results)
            .min(self.config.combined_results_limit)
            .max(1)
    }

    /// Configuration errors surface as-is when nothing else went wrong
    fn failure(attempted: usize, mut errors: Vec<SearchError>) -> SearchError {
        let Some(last) = errors.pop() else {
            return SearchError::NoProvidersAvailable;
        };
        if last.is_configuration() && errors.iter().all(SearchError::is_configuration) {
            return last;
        }
        SearchError::AllProvidersFailed {
            attempted,
            last: Box::new(last),
        }
    }

    fn forget_pending(&self, key: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(key);
        }
    }
}

async fn bounded(
    provider: &dyn SearchProvider,
    request: &SearchRequest,
    max_results: usize,
    timeout: Duration,
) -> QueuedOutcome {
    match tokio::time::timeout(timeout, provider.execute(request, max_results)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(SearchError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
