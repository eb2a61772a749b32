// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Scriptable provider shared by the search integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use contentguard_search::search::paging::fetch_paged;
use contentguard_search::search::{
    ManualClock, NormalizedResult, QuotaLimits, SearchConfig, SearchError, SearchOrchestrator,
    SearchProvider, SearchRequest, SearchType,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub enum Behavior {
    /// Return this many results
    Results(usize),
    /// Return results at these URLs, in order
    Urls(Vec<&'static str>),
    Fail(SearchError),
}

pub struct MockProvider {
    name: &'static str,
    priority: u8,
    enabled: bool,
    image_support: bool,
    limits: QuotaLimits,
    delay: Duration,
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new(name: &'static str, priority: u8, behavior: Behavior) -> Self {
        Self {
            name,
            priority,
            enabled: true,
            image_support: true,
            limits: QuotaLimits::new(100, 10),
            delay: Duration::ZERO,
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn without_images(mut self) -> Self {
        self.image_support = false;
        self
    }

    pub fn with_limits(mut self, daily: u32, per_minute: u32) -> Self {
        self.limits = QuotaLimits::new(daily, per_minute);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Counter of `execute` invocations, readable after the provider is moved
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl SearchProvider for MockProvider {
    async fn execute(
        &self,
        request: &SearchRequest,
        max_results: usize,
    ) -> Result<Vec<NormalizedResult>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let urls: Vec<String> = match &self.behavior {
            Behavior::Fail(e) => return Err(e.clone()),
            Behavior::Results(n) => (0..*n)
                .map(|i| format!("https://{}.example/result/{}", self.name, i))
                .collect(),
            Behavior::Urls(urls) => urls.iter().map(|u| u.to_string()).collect(),
        };

        Ok(urls
            .into_iter()
            .take(max_results)
            .enumerate()
            .map(|(i, url)| {
                NormalizedResult::new(
                    self.name,
                    request.search_type,
                    format!("{} result {}", self.name, i),
                    url,
                    format!("Found by {}", self.name),
                    None,
                    0.9 - 0.05 * i as f32,
                )
            })
            .collect())
    }

    fn name(&self) -> &str {
        self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn supports(&self, search_type: SearchType) -> bool {
        self.image_support || search_type != SearchType::Image
    }

    fn quota_limits(&self) -> QuotaLimits {
        self.limits
    }
}

/// Provider that fetches through `fetch_paged`, ten results per page
///
/// Each page takes its configured latency. A page slower than `page_timeout`
/// fails with a timeout once that much time has passed, like an HTTP client would.
pub struct PagedProvider {
    name: &'static str,
    page_delays: Vec<Duration>,
    page_timeout: Duration,
}

pub const PAGE_SIZE: usize = 10;

impl PagedProvider {
    pub fn new(name: &'static str, page_delays: Vec<Duration>, page_timeout: Duration) -> Self {
        Self {
            name,
            page_delays,
            page_timeout,
        }
    }
}

#[async_trait]
impl SearchProvider for PagedProvider {
    async fn execute(
        &self,
        request: &SearchRequest,
        max_results: usize,
    ) -> Result<Vec<NormalizedResult>, SearchError> {
        let urls = fetch_paged(self.name, PAGE_SIZE, max_results, |offset, count| {
            let delay = self
                .page_delays
                .get(offset / PAGE_SIZE)
                .copied()
                .unwrap_or(Duration::ZERO);
            let timeout = self.page_timeout;
            let name = self.name;
            async move {
                if delay > timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(SearchError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                tokio::time::sleep(delay).await;
                Ok((offset..offset + count)
                    .map(|i| format!("https://{}.example/page/{}", name, i))
                    .collect::<Vec<_>>())
            }
        })
        .await?;

        Ok(urls
            .into_iter()
            .enumerate()
            .map(|(i, url)| {
                NormalizedResult::new(
                    self.name,
                    request.search_type,
                    format!("{} result {}", self.name, i),
                    url,
                    format!("Found by {}", self.name),
                    None,
                    0.9 - 0.01 * i as f32,
                )
            })
            .collect())
    }

    fn name(&self) -> &str {
        self.name
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn priority(&self) -> u8 {
        10
    }
}

pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 11, 12, 0, 0).unwrap(),
    ))
}

pub fn orchestrator(providers: Vec<MockProvider>, clock: Arc<ManualClock>) -> SearchOrchestrator {
    orchestrator_with(SearchConfig::default(), providers, clock)
}

pub fn orchestrator_with(
    config: SearchConfig,
    providers: Vec<MockProvider>,
    clock: Arc<ManualClock>,
) -> SearchOrchestrator {
    let providers: Vec<Arc<dyn SearchProvider>> = providers
        .into_iter()
        .map(|p| Arc::new(p) as Arc<dyn SearchProvider>)
        .collect();
    SearchOrchestrator::with_clock(config, providers, clock)
}

pub fn provider_error() -> SearchError {
    SearchError::ApiError {
        status: 503,
        message: "upstream unavailable".to_string(),
    }
}

pub fn config_error(provider: &str) -> SearchError {
    SearchError::Configuration {
        provider: provider.to_string(),
        message: "API key missing".to_string(),
    }
}
