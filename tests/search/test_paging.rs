// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Multi-page provider attempts under the provider timeout

use super::mock_provider::{test_clock, Behavior, MockProvider, PagedProvider};
use contentguard_search::search::{
    SearchConfig, SearchOrchestrator, SearchParameters, SearchProvider, SearchRequest,
};
use std::sync::Arc;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn thirty_results() -> SearchRequest {
    SearchRequest::text(
        "acme",
        SearchParameters {
            max_results: Some(30),
            ..Default::default()
        },
    )
}

fn service(providers: Vec<Arc<dyn SearchProvider>>) -> SearchOrchestrator {
    SearchOrchestrator::with_clock(SearchConfig::default(), providers, test_clock())
}

fn boxed(provider: impl SearchProvider + 'static) -> Arc<dyn SearchProvider> {
    Arc::new(provider)
}

#[tokio::test(start_paused = true)]
async fn test_slow_pages_within_their_own_timeout_are_all_kept() {
    let paged = PagedProvider::new("p1", vec![Duration::from_secs(20); 3], HTTP_TIMEOUT);
    let service = service(vec![boxed(paged)]);

    let result = service.search(thirty_results()).await.unwrap();

    assert_eq!(result.items.len(), 30);
    assert_eq!(result.providers_used, vec!["p1"]);
    assert!(result.failures.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_later_page_keeps_earlier_pages() {
    let paged = PagedProvider::new(
        "p1",
        vec![Duration::from_secs(1), Duration::from_secs(45)],
        HTTP_TIMEOUT,
    );
    let service = service(vec![boxed(paged)]);

    let result = service.search(thirty_results()).await.unwrap();

    assert_eq!(result.items.len(), 10);
    assert_eq!(result.providers_used, vec!["p1"]);
    assert!(result
        .items
        .iter()
        .all(|r| r.url.starts_with("https://p1.example/page/")));
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_first_page_falls_back() {
    let paged = PagedProvider::new("p1", vec![Duration::from_secs(45)], HTTP_TIMEOUT);
    let backup = MockProvider::new("p2", 5, Behavior::Results(4));
    let service = service(vec![boxed(paged), boxed(backup)]);

    let result = service.search(thirty_results()).await.unwrap();

    assert_eq!(result.providers_used, vec!["p2"]);
    assert_eq!(result.failures.len(), 1);
    assert!(result.failures[0].error.contains("30000ms"));
}

#[tokio::test(start_paused = true)]
async fn test_hung_provider_is_cut_off_by_attempt_budget() {
    let hung = MockProvider::new("p1", 10, Behavior::Results(5)).with_delay(Duration::from_secs(1000));
    let backup = MockProvider::new("p2", 5, Behavior::Results(4));
    let service = service(vec![boxed(hung), boxed(backup)]);

    let started = tokio::time::Instant::now();
    let result = service.search(thirty_results()).await.unwrap();

    assert_eq!(result.providers_used, vec!["p2"]);
    assert!(result.failures[0].error.contains("120000ms"));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(120) && elapsed < Duration::from_secs(121));
}
