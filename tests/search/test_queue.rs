// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Provider calls that lose their quota mid-search go through the request queue

use super::mock_provider::{
    orchestrator, orchestrator_with, provider_error, test_clock, Behavior, MockProvider,
};
use chrono::Duration as ChronoDuration;
use contentguard_search::search::{SearchConfig, SearchError, SearchParameters, SearchRequest};
use std::sync::atomic::Ordering;
use std::time::Duration;

/// p1 fails slowly so both searches pass the eligibility check for p2 before
/// either reaches it; p2 allows one call per minute.
fn racing_providers() -> (MockProvider, MockProvider) {
    let p1 = MockProvider::new("p1", 10, Behavior::Fail(provider_error()))
        .with_delay(Duration::from_millis(100));
    let p2 = MockProvider::new("p2", 8, Behavior::Results(2)).with_limits(100, 1);
    (p1, p2)
}

#[tokio::test(start_paused = true)]
async fn test_blocked_call_waits_in_queue_until_quota_frees() {
    let clock = test_clock();
    let (p1, p2) = racing_providers();
    let p2_calls = p2.calls();
    let service = orchestrator(vec![p1, p2], clock.clone());

    let (a, b, _) = tokio::join!(
        service.search(SearchRequest::text("acme", SearchParameters::default())),
        service.search(SearchRequest::text("globex", SearchParameters::default())),
        async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            clock.advance(ChronoDuration::seconds(61));
        }
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.providers_used, vec!["p2"]);
    assert_eq!(b.providers_used, vec!["p2"]);
    assert_eq!(p2_calls.load(Ordering::SeqCst), 2);

    // Each admitted call counted exactly once
    let p2_quota = service.quota_manager().snapshot("p2").unwrap();
    assert_eq!(p2_quota.daily_usage, 2);
}

#[tokio::test(start_paused = true)]
async fn test_queued_call_gives_up_after_max_wait() {
    let clock = test_clock();
    let mut config = SearchConfig::default();
    config.queue.max_wait_secs = 3;
    let (p1, p2) = racing_providers();
    let p2_calls = p2.calls();
    let service = orchestrator_with(config, vec![p1, p2], clock);

    let (a, b) = tokio::join!(
        service.search(SearchRequest::text("acme", SearchParameters::default())),
        service.search(SearchRequest::text("globex", SearchParameters::default()))
    );

    // One search got p2; the other timed out in the queue with p1 already failed
    let (ok, err) = match (a, b) {
        (Ok(ok), Err(err)) | (Err(err), Ok(ok)) => (ok, err),
        other => panic!("expected one success and one failure, got {:?}", other),
    };
    assert_eq!(ok.providers_used, vec!["p2"]);
    match err {
        SearchError::AllProvidersFailed { attempted, last } => {
            assert_eq!(attempted, 2);
            assert!(matches!(*last, SearchError::QuotaExceeded { ref provider } if provider == "p2"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(p2_calls.load(Ordering::SeqCst), 1);
    assert_eq!(service.queued_requests(), 0);
}
