// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// End-to-end orchestration: provider selection, fallback and merging

use super::mock_provider::{
    config_error, orchestrator, orchestrator_with, provider_error, test_clock, Behavior,
    MockProvider,
};
use contentguard_search::search::{
    SearchConfig, SearchError, SearchOrchestrator, SearchParameters, SearchRequest, SearchType,
};
use std::sync::atomic::Ordering;
use tokio_test::assert_ok;

fn acme() -> SearchRequest {
    SearchRequest::text("acme", SearchParameters::default())
}

#[tokio::test]
async fn test_fallback_to_second_provider() {
    let p1 = MockProvider::new("p1", 10, Behavior::Fail(provider_error()));
    let p2 = MockProvider::new("p2", 8, Behavior::Results(5));
    let (p1_calls, p2_calls) = (p1.calls(), p2.calls());
    let service = orchestrator(vec![p1, p2], test_clock());

    let result = assert_ok!(service.search(acme()).await);

    assert_eq!(result.items.len(), 5);
    assert!(result.items.iter().all(|r| r.source_provider == "p2"));
    assert_eq!(result.providers_used, vec!["p2"]);
    assert_eq!(result.source, "multi-engine");
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].provider, "p1");
    assert_eq!(p1_calls.load(Ordering::SeqCst), 1);
    assert_eq!(p2_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_exhausted_provider_is_skipped_without_attempt() {
    let p1 = MockProvider::new("p1", 10, Behavior::Results(5)).with_limits(1, 10);
    let p2 = MockProvider::new("p2", 8, Behavior::Results(5));
    let (p1_calls, p2_calls) = (p1.calls(), p2.calls());
    let service = orchestrator(vec![p1, p2], test_clock());

    // p1 already served its one request today
    service.quota_manager().track_usage("p1");
    assert!(!service.quota_manager().can_make_request("p1"));

    let result = service.search(acme()).await.unwrap();

    assert_eq!(p1_calls.load(Ordering::SeqCst), 0);
    assert_eq!(p2_calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.providers_used, vec!["p2"]);
    assert_eq!(service.list_available_providers(), vec!["p2"]);
}

#[tokio::test]
async fn test_second_search_served_from_cache() {
    let p1 = MockProvider::new("p1", 10, Behavior::Results(3));
    let p2 = MockProvider::new("p2", 8, Behavior::Results(3));
    let (p1_calls, p2_calls) = (p1.calls(), p2.calls());
    let service = orchestrator(vec![p1, p2], test_clock());

    let first = service.search(acme()).await.unwrap();
    let second = service.search(acme()).await.unwrap();

    assert_eq!(p1_calls.load(Ordering::SeqCst), 1);
    assert_eq!(p2_calls.load(Ordering::SeqCst), 1);
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.items, second.items);
    assert_eq!(first.request_id, second.request_id);

    let stats = service.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.total, 1);
}

#[tokio::test]
async fn test_no_providers_available() {
    let p1 = MockProvider::new("p1", 10, Behavior::Results(5)).disabled();
    let p2 = MockProvider::new("p2", 8, Behavior::Results(5)).disabled();
    let (p1_calls, p2_calls) = (p1.calls(), p2.calls());
    let service = orchestrator(vec![p1, p2], test_clock());

    let err = service.search(acme()).await.unwrap_err();

    assert_eq!(err, SearchError::NoProvidersAvailable);
    assert!(err.is_retryable());
    assert_eq!(p1_calls.load(Ordering::SeqCst), 0);
    assert_eq!(p2_calls.load(Ordering::SeqCst), 0);
    assert!(service.list_available_providers().is_empty());
}

#[tokio::test]
async fn test_all_providers_failed_wraps_last_error() {
    let timeout = SearchError::Timeout { timeout_ms: 30_000 };
    let p1 = MockProvider::new("p1", 10, Behavior::Fail(provider_error()));
    let p2 = MockProvider::new("p2", 8, Behavior::Fail(timeout.clone()));
    let service = orchestrator(vec![p1, p2], test_clock());

    let err = service.search(acme()).await.unwrap_err();

    assert_eq!(
        err,
        SearchError::AllProvidersFailed {
            attempted: 2,
            last: Box::new(timeout),
        }
    );
    assert!(err.is_retryable());
    assert!(service.cache_stats().total == 0);
}

#[tokio::test]
async fn test_configuration_errors_surface_directly() {
    let p1 = MockProvider::new("p1", 10, Behavior::Fail(config_error("p1")));
    let p2 = MockProvider::new("p2", 8, Behavior::Fail(config_error("p2")));
    let service = orchestrator(vec![p1, p2], test_clock());

    let err = service.search(acme()).await.unwrap_err();

    assert_eq!(err, config_error("p2"));
    assert!(err.is_configuration());
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_configuration_error_mixed_with_provider_error() {
    let p1 = MockProvider::new("p1", 10, Behavior::Fail(config_error("p1")));
    let p2 = MockProvider::new("p2", 8, Behavior::Fail(provider_error()));
    let service = orchestrator(vec![p1, p2], test_clock());

    let err = service.search(acme()).await.unwrap_err();

    assert!(matches!(err, SearchError::AllProvidersFailed { attempted: 2, .. }));
    assert!(!err.is_configuration());
}

#[tokio::test]
async fn test_stops_once_enough_results() {
    let p1 = MockProvider::new("p1", 10, Behavior::Results(10));
    let p2 = MockProvider::new("p2", 8, Behavior::Results(10));
    let p2_calls = p2.calls();
    let service = orchestrator(vec![p1, p2], test_clock());

    let result = service.search(acme()).await.unwrap();

    assert_eq!(result.items.len(), 10);
    assert_eq!(p2_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_merge_deduplicates_across_providers() {
    let p1 = MockProvider::new(
        "p1",
        10,
        Behavior::Urls(vec!["https://www.shop.com/item/", "https://a.com/1"]),
    );
    let p2 = MockProvider::new(
        "p2",
        8,
        Behavior::Urls(vec!["http://shop.com/item?utm_source=ads", "https://b.com/2"]),
    );
    let service = orchestrator(vec![p1, p2], test_clock());

    let result = service.search(acme()).await.unwrap();

    assert_eq!(result.total_results, 3);
    let shop: Vec<_> = result
        .items
        .iter()
        .filter(|r| r.display_domain == "shop.com")
        .collect();
    assert_eq!(shop.len(), 1);
    assert_eq!(shop[0].source_provider, "p1");
    assert_eq!(result.providers_used, vec!["p1", "p2"]);
}

#[tokio::test]
async fn test_results_sorted_by_relevance_and_truncated() {
    let p1 = MockProvider::new("p1", 10, Behavior::Results(3));
    let p2 = MockProvider::new("p2", 8, Behavior::Results(3));
    let service = orchestrator(vec![p1, p2], test_clock());

    let params = SearchParameters {
        max_results: Some(4),
        ..Default::default()
    };
    let result = service
        .search(SearchRequest::text("acme", params))
        .await
        .unwrap();

    assert_eq!(result.items.len(), 4);
    let scores: Vec<f32> = result.items.iter().map(|r| r.relevance_score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    // Equal scores keep provider order
    assert_eq!(result.items[0].source_provider, "p1");
    assert_eq!(result.items[1].source_provider, "p2");
}

#[tokio::test]
async fn test_max_results_clamped_to_combined_limit() {
    let config = SearchConfig {
        combined_results_limit: 3,
        ..Default::default()
    };
    let p1 = MockProvider::new("p1", 10, Behavior::Results(10));
    let service = orchestrator_with(config, vec![p1], test_clock());

    let params = SearchParameters {
        max_results: Some(50),
        ..Default::default()
    };
    let result = service
        .search(SearchRequest::text("acme", params))
        .await
        .unwrap();
    assert_eq!(result.items.len(), 3);
}

#[tokio::test]
async fn test_unsupported_type_skips_provider() {
    let p1 = MockProvider::new("p1", 10, Behavior::Results(2)).without_images();
    let p2 = MockProvider::new("p2", 8, Behavior::Results(2));
    let p1_calls = p1.calls();
    let service = orchestrator(vec![p1, p2], test_clock());

    let request = SearchRequest::image(
        "https://storage.example.com/uploads/logo.png",
        SearchParameters::default(),
    );
    let result = service.search(request).await.unwrap();

    assert_eq!(p1_calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.providers_used, vec!["p2"]);
    assert_eq!(result.search_type, SearchType::Image);
}

#[tokio::test]
async fn test_empty_answers_are_not_errors() {
    let p1 = MockProvider::new("p1", 10, Behavior::Results(0));
    let service = orchestrator(vec![p1], test_clock());

    let result = service.search(acme()).await.unwrap();

    assert!(result.items.is_empty());
    assert_eq!(result.providers_used, vec!["p1"]);
    assert_eq!(service.cache_stats().total, 0);
}

#[tokio::test]
async fn test_empty_answer_after_a_failure_is_an_error() {
    let p1 = MockProvider::new("p1", 10, Behavior::Fail(provider_error()));
    let p2 = MockProvider::new("p2", 8, Behavior::Results(0));
    let p2_calls = p2.calls();
    let service = orchestrator(vec![p1, p2], test_clock());

    let err = service.search(acme()).await.unwrap_err();

    assert_eq!(
        err,
        SearchError::AllProvidersFailed {
            attempted: 2,
            last: Box::new(provider_error()),
        }
    );
    assert_eq!(p2_calls.load(Ordering::SeqCst), 1);
    assert_eq!(service.cache_stats().total, 0);
}

#[tokio::test]
async fn test_invalid_requests_rejected() {
    let service = orchestrator(
        vec![MockProvider::new("p1", 10, Behavior::Results(1))],
        test_clock(),
    );

    let empty = service
        .search(SearchRequest::text("  ", SearchParameters::default()))
        .await;
    assert!(matches!(empty, Err(SearchError::InvalidQuery { .. })));

    let hashtag = service
        .search(SearchRequest::hashtag("two words", SearchParameters::default()))
        .await;
    assert!(matches!(hashtag, Err(SearchError::InvalidQuery { .. })));
}

#[tokio::test]
async fn test_invalidate_drops_cached_result() {
    let p1 = MockProvider::new("p1", 10, Behavior::Results(2));
    let calls = p1.calls();
    let service = orchestrator(vec![p1], test_clock());

    service.search(acme()).await.unwrap();
    assert!(service.invalidate(SearchType::Text, "ACME", SearchParameters::default()));
    assert!(!service.invalidate(SearchType::Text, "acme", SearchParameters::default()));

    service.search(acme()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    service.clear_cache();
    assert_eq!(service.cache_stats().total, 0);
}

#[tokio::test]
async fn test_provider_stats_report_usage() {
    let p1 = MockProvider::new("p1", 10, Behavior::Results(2)).with_limits(50, 5);
    let p2 = MockProvider::new("p2", 8, Behavior::Fail(provider_error()));
    let service = orchestrator(vec![p1, p2], test_clock());

    service.search(acme()).await.unwrap();
    let stats = service.provider_stats();

    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].provider, "p1");
    assert_eq!(stats[0].daily_usage, 1);
    assert_eq!(stats[0].daily_limit, 50);
    assert_eq!(stats[0].per_minute_limit, 5);
    assert_eq!(stats[0].calls, 1);
    assert!(stats[0].available);
    assert_eq!(stats[1].provider, "p2");
    assert_eq!(stats[1].calls, 1);
}

#[tokio::test]
async fn test_demo_mode_results_are_tagged() {
    let config = SearchConfig {
        demo_mode: true,
        ..Default::default()
    };
    let service = SearchOrchestrator::new(config);

    let result = service.search(acme()).await.unwrap();

    assert!(result.synthetic);
    assert!(!result.items.is_empty());
    assert!(result.items.iter().all(|r| r.is_mock()));
}

#[tokio::test]
async fn test_missing_credentials_without_demo_mode() {
    let service = SearchOrchestrator::new(SearchConfig::default());

    let err = service.search(acme()).await.unwrap_err();

    assert!(err.is_configuration());
}
