// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Brave Search API provider
//!
//! Last-resort web engine. Brave has no reverse image search, so it only
//! serves text and hashtag queries.

use async_trait::async_trait;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use super::config::ProviderSettings;
use super::mock;
use super::paging::fetch_paged;
use super::provider::{compose_query, SearchProvider};
use super::quota::QuotaLimits;
use super::scoring::relevance_score;
use super::types::{
    ContentFilter, DateRestrict, NormalizedResult, SearchError, SearchRequest, SearchType,
};

const BRAVE_API_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const PAGE_SIZE: usize = 20;

/// Brave Search API provider
pub struct BraveSearchProvider {
    settings: ProviderSettings,
    demo_mode: bool,
    timeout: Duration,
    client: Client,
}

impl BraveSearchProvider {
    /// Create a new Brave Search provider
    ///
    /// # Arguments
    /// * `settings` - API key, limits and priority
    /// * `demo_mode` - synthesize tagged sample results when the key is missing
    /// * `timeout` - bound on each HTTP call
    pub fn new(settings: ProviderSettings, demo_mode: bool, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            settings,
            demo_mode,
            timeout,
            client,
        }
    }

    async fn fetch_page(
        &self,
        api_key: &str,
        query: Vec<(&'static str, String)>,
    ) -> Result<Vec<BraveResult>, SearchError> {
        let response = self
            .client
            .get(BRAVE_API_URL)
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    SearchError::ApiError {
                        status: 0,
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();

        if status == 429 {
            return Err(SearchError::RateLimited {
                retry_after_secs: 60,
            });
        }

        if status == 401 || status == 403 {
            return Err(SearchError::Configuration {
                provider: "brave".to_string(),
                message: "subscription token rejected; check BRAVE_API_KEY".to_string(),
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let data: BraveResponse = response.json().await.map_err(|e| SearchError::ApiError {
            status: 0,
            message: format!("JSON parse error: {}", e),
        })?;

        Ok(data.web.map(|web| web.results).unwrap_or_default())
    }
}

#[async_trait]
impl SearchProvider for BraveSearchProvider {
    async fn execute(
        &self,
        request: &SearchRequest,
        max_results: usize,
    ) -> Result<Vec<NormalizedResult>, SearchError> {
        if !self.supports(request.search_type) {
            return Err(SearchError::InvalidQuery {
                reason: "brave does not support image search".to_string(),
            });
        }

        let Some(api_key) = self.settings.api_key() else {
            if self.demo_mode {
                debug!("Brave key missing, serving demo results");
                return Ok(mock::synthesize(self.name(), request, max_results));
            }
            return Err(SearchError::Configuration {
                provider: "brave".to_string(),
                message: "set BRAVE_API_KEY, or enable SEARCH_DEMO_MODE".to_string(),
            });
        };

        let results = fetch_windows(request, max_results, |query| {
            self.fetch_page(api_key, query)
        })
        .await?;

        let terms = request.terms();
        Ok(results
            .into_iter()
            .enumerate()
            .map(|(position, r)| {
                let score = relevance_score(terms, position, &r.title, &r.description, &r.url);
                NormalizedResult::new(
                    "brave",
                    request.search_type,
                    r.title,
                    r.url,
                    r.description,
                    r.thumbnail.map(|t| t.src),
                    score,
                )
            })
            .collect())
    }

    fn name(&self) -> &str {
        "brave"
    }

    fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    fn priority(&self) -> u8 {
        self.settings.priority
    }

    fn supports(&self, search_type: SearchType) -> bool {
        search_type != SearchType::Image
    }

    fn quota_limits(&self) -> QuotaLimits {
        self.settings.quota_limits()
    }

    fn cost_per_request(&self) -> f64 {
        self.settings.cost_per_request
    }
}

/// Page through Brave results for `max_results` items
///
/// Brave's `offset` is a page index in units of `count`, so every page asks for a
/// full `PAGE_SIZE` and a short final page is trimmed locally.
async fn fetch_windows<F, Fut>(
    request: &SearchRequest,
    max_results: usize,
    mut send: F,
) -> Result<Vec<BraveResult>, SearchError>
where
    F: FnMut(Vec<(&'static str, String)>) -> Fut,
    Fut: Future<Output = Result<Vec<BraveResult>, SearchError>>,
{
    fetch_paged("brave", PAGE_SIZE, max_results, |offset, count| {
        let page = send(build_query(request, offset / PAGE_SIZE));
        async move {
            let mut results = page.await?;
            results.truncate(count);
            Ok(results)
        }
    })
    .await
}

fn build_query(request: &SearchRequest, page: usize) -> Vec<(&'static str, String)> {
    let params = &request.params;
    let safesearch = match params.content_filter {
        ContentFilter::Off => "off",
        ContentFilter::Medium => "moderate",
        ContentFilter::High => "strict",
    };

    let mut query: Vec<(&'static str, String)> = vec![
        ("q", compose_query(request.terms(), params)),
        ("count", PAGE_SIZE.to_string()),
        ("offset", page.to_string()),
        ("safesearch", safesearch.to_string()),
    ];

    if let Some(restrict) = params.date_restrict {
        let freshness = match restrict {
            DateRestrict::Day => "pd",
            DateRestrict::Week => "pw",
            DateRestrict::Month => "pm",
            DateRestrict::Year => "py",
        };
        query.push(("freshness", freshness.to_string()));
    }
    if let Some(ref language) = params.language {
        query.push(("search_lang", language.to_lowercase()));
    }
    if let Some(ref country) = params.country {
        query.push(("country", country.to_lowercase()));
    }

    query
}

#[derive(Debug, serde::Deserialize)]
struct BraveResponse {
    web: Option<BraveWebResults>,
}

#[derive(Debug, serde::Deserialize)]
struct BraveWebResults {
    results: Vec<BraveResult>,
}

#[derive(Debug, serde::Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
    thumbnail: Option<BraveThumbnail>,
}

#[derive(Debug, serde::Deserialize)]
struct BraveThumbnail {
    src: String,
}
