// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Cache keys, tiered TTLs and quota windows driven through a manual clock

use super::mock_provider::{orchestrator, orchestrator_with, test_clock, Behavior, MockProvider};
use chrono::Duration;
use contentguard_search::search::clock::next_local_midnight;
use contentguard_search::search::{
    Clock, QuotaLimits, QuotaManager, SearchConfig, SearchParameters, SearchRequest, SearchType,
};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[test]
fn test_cache_key_ignores_parameter_order() {
    let a: SearchParameters = serde_json::from_value(json!({
        "exactMatch": true,
        "language": "en",
        "siteFilter": ["etsy.com", "ebay.com"],
        "maxResults": 20
    }))
    .unwrap();
    let b: SearchParameters = serde_json::from_value(json!({
        "maxResults": 20,
        "siteFilter": ["ebay.com", "etsy.com"],
        "language": "en",
        "exactMatch": true
    }))
    .unwrap();

    let key_a = SearchRequest::text("Acme Logo", a).cache_key();
    let key_b = SearchRequest::text("  acme logo ", b).cache_key();
    assert_eq!(key_a, key_b);
    assert!(key_a.starts_with("text:acme logo:"));
}

#[test]
fn test_cache_key_separates_types_and_params() {
    let params = SearchParameters::default();
    let text = SearchRequest::text("acme", params.clone()).cache_key();
    let hashtag = SearchRequest::hashtag("acme", params.clone()).cache_key();
    let exact = SearchRequest::text(
        "acme",
        SearchParameters {
            exact_match: true,
            ..params
        },
    )
    .cache_key();

    assert_ne!(text, hashtag);
    assert_ne!(text, exact);
}

#[tokio::test]
async fn test_cached_entry_expires_after_ttl() {
    let clock = test_clock();
    let p1 = MockProvider::new("p1", 10, Behavior::Results(3));
    let calls = p1.calls();
    let service = orchestrator(vec![p1], clock.clone());
    let request = SearchRequest::text("acme", SearchParameters::default());

    service.search(request.clone()).await.unwrap();

    // Non-primary source: 30 minute TTL
    clock.advance(Duration::minutes(30) - Duration::seconds(1));
    let hit = service.search(request.clone()).await.unwrap();
    assert!(hit.cached);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance(Duration::seconds(2));
    let miss = service.search(request).await.unwrap();
    assert!(!miss.cached);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_primary_provider_gets_long_ttl() {
    let clock = test_clock();
    let mut config = SearchConfig::default();
    config.cache.primary_providers = vec!["p1".to_string()];
    let p1 = MockProvider::new("p1", 10, Behavior::Results(3));
    let calls = p1.calls();
    let service = orchestrator_with(config, vec![p1], clock.clone());
    let request = SearchRequest::text("acme", SearchParameters::default());

    service.search(request.clone()).await.unwrap();
    clock.advance(Duration::hours(5));
    assert!(service.search(request.clone()).await.unwrap().cached);

    clock.advance(Duration::hours(1) + Duration::seconds(1));
    assert!(!service.search(request).await.unwrap().cached);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cache_tracks_cost_of_providers_used() {
    let config = SearchConfig {
        demo_mode: true,
        ..Default::default()
    };
    let service = contentguard_search::SearchOrchestrator::new(config);

    service
        .search(SearchRequest::text("acme", SearchParameters::default()))
        .await
        .unwrap();

    let stats = service.cache_stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.provider_calls.get("google"), Some(&1));
    assert!((stats.estimated_cost - 0.005).abs() < 1e-9);
}

#[test]
fn test_quota_counts_until_daily_limit() {
    let clock = test_clock();
    let quota = QuotaManager::new(clock.clone());
    quota.register("p1", QuotaLimits::new(3, 100));

    let mut last = 0;
    for _ in 0..3 {
        assert!(quota.can_make_request("p1"));
        quota.track_usage("p1");
        let usage = quota.snapshot("p1").unwrap().daily_usage;
        assert!(usage > last);
        last = usage;
    }
    assert!(!quota.can_make_request("p1"));

    // Still blocked later the same day
    clock.advance(Duration::minutes(5));
    assert!(!quota.can_make_request("p1"));
}

#[test]
fn test_quota_daily_reset_at_local_midnight() {
    let clock = test_clock();
    let quota = QuotaManager::new(clock.clone());
    quota.register("p1", QuotaLimits::new(1, 10));
    quota.track_usage("p1");
    assert!(!quota.can_make_request("p1"));

    let midnight = next_local_midnight(clock.now());
    assert_eq!(quota.snapshot("p1").unwrap().daily_reset_at, midnight);

    clock.set(midnight);
    assert!(!quota.can_make_request("p1"));

    clock.set(midnight + Duration::seconds(1));
    assert!(quota.can_make_request("p1"));
    assert_eq!(quota.snapshot("p1").unwrap().daily_usage, 0);
}

#[test]
fn test_quota_minute_window_starts_at_first_request() {
    let clock = test_clock();
    let quota = QuotaManager::new(clock.clone());
    quota.register("p1", QuotaLimits::new(100, 2));

    clock.advance(Duration::seconds(10));
    assert!(quota.try_acquire("p1"));
    clock.advance(Duration::seconds(30));
    assert!(quota.try_acquire("p1"));
    assert!(!quota.try_acquire("p1"));

    // Window opened at +10s, so it closes after +70s
    clock.advance(Duration::seconds(30));
    assert!(!quota.can_make_request("p1"));
    clock.advance(Duration::seconds(1));
    assert!(quota.can_make_request("p1"));

    let snapshot = quota.snapshot("p1").unwrap();
    assert_eq!(snapshot.minute_usage, 0);
    assert_eq!(snapshot.daily_usage, 2);
}

#[tokio::test]
async fn test_per_minute_limit_skips_provider_between_searches() {
    let clock = test_clock();
    let p1 = MockProvider::new("p1", 10, Behavior::Results(3)).with_limits(100, 1);
    let p2 = MockProvider::new("p2", 8, Behavior::Results(3));
    let (p1_calls, p2_calls) = (p1.calls(), p2.calls());
    let service = orchestrator(vec![p1, p2], clock.clone());

    service
        .search(SearchRequest::text("first", SearchParameters::default()))
        .await
        .unwrap();
    let second = service
        .search(SearchRequest::text("second", SearchParameters::default()))
        .await
        .unwrap();
    assert_eq!(second.providers_used, vec!["p2"]);
    assert_eq!(p1_calls.load(Ordering::SeqCst), 1);

    clock.advance(Duration::seconds(61));
    let third = service
        .search(SearchRequest::text("third", SearchParameters::default()))
        .await
        .unwrap();
    assert_eq!(third.providers_used, vec!["p1", "p2"]);
    assert_eq!(p1_calls.load(Ordering::SeqCst), 2);
    assert_eq!(p2_calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_unknown_search_type_rejected_by_parser() {
    assert!("video".parse::<SearchType>().is_err());
    assert_eq!("IMAGE".parse::<SearchType>().unwrap(), SearchType::Image);
}

#[test]
fn test_manual_clock_is_shared() {
    let clock = test_clock();
    let as_trait: Arc<dyn Clock> = clock.clone();
    clock.advance(Duration::hours(1));
    assert_eq!(as_trait.now(), clock.now());
}
