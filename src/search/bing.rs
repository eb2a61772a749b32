// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Bing Search API provider
//!
//! Secondary engine using the Bing Web Search and Image Search v7 APIs.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::config::ProviderSettings;
use super::mock;
use super::paging::fetch_paged;
use super::provider::{compose_query, SearchProvider};
use super::quota::QuotaLimits;
use super::scoring::{passes_image_filters, relevance_score, similarity_score};
use super::types::{
    ContentFilter, DateRestrict, ImageColorType, ImageSize, ImageType, NormalizedResult,
    SearchError, SearchRequest, SearchType,
};

const BING_WEB_URL: &str = "https://api.bing.microsoft.com/v7.0/search";
const BING_IMAGES_URL: &str = "https://api.bing.microsoft.com/v7.0/images/search";
const WEB_PAGE_SIZE: usize = 50;
const IMAGE_PAGE_SIZE: usize = 150;

/// Bing Search API provider
pub struct BingSearchProvider {
    settings: ProviderSettings,
    demo_mode: bool,
    timeout: Duration,
    client: Client,
}

impl BingSearchProvider {
    /// Create a new Bing Search provider
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
        request: &SearchRequest,
        offset: usize,
        count: usize,
    ) -> Result<Vec<BingItem>, SearchError> {
        let url = match request.search_type {
            SearchType::Image => BING_IMAGES_URL,
            _ => BING_WEB_URL,
        };

        let response = self
            .client
            .get(url)
            .header("Ocp-Apim-Subscription-Key", api_key)
            .query(&build_query(request, offset, count))
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
                provider: "bing".to_string(),
                message: "subscription key rejected; check BING_API_KEY".to_string(),
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let data: BingResponse = response.json().await.map_err(|e| SearchError::ApiError {
            status: 0,
            message: format!("JSON parse error: {}", e),
        })?;

        Ok(data.into_items(request.search_type))
    }
}

#[async_trait]
impl SearchProvider for BingSearchProvider {
    async fn execute(
        &self,
        request: &SearchRequest,
        max_results: usize,
    ) -> Result<Vec<NormalizedResult>, SearchError> {
        let Some(api_key) = self.settings.api_key() else {
            if self.demo_mode {
                debug!("Bing key missing, serving demo results");
                return Ok(mock::synthesize(self.name(), request, max_results));
            }
            return Err(SearchError::Configuration {
                provider: "bing".to_string(),
                message: "set BING_API_KEY, or enable SEARCH_DEMO_MODE".to_string(),
            });
        };

        let page_size = match request.search_type {
            SearchType::Image => IMAGE_PAGE_SIZE,
            _ => WEB_PAGE_SIZE,
        };
        let items = fetch_paged(self.name(), page_size, max_results, move |offset, count| {
            self.fetch_page(api_key, request, offset, count)
        })
        .await?;

        Ok(normalize(items, request))
    }

    fn name(&self) -> &str {
        "bing"
    }

    fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    fn priority(&self) -> u8 {
        self.settings.priority
    }

    fn quota_limits(&self) -> QuotaLimits {
        self.settings.quota_limits()
    }

    fn cost_per_request(&self) -> f64 {
        self.settings.cost_per_request
    }
}

fn build_query(request: &SearchRequest, offset: usize, count: usize) -> Vec<(&'static str, String)> {
    let params = &request.params;
    let mut query: Vec<(&'static str, String)> = vec![
        ("q", compose_query(request.terms(), params)),
        ("count", count.to_string()),
        ("offset", offset.to_string()),
        ("safeSearch", safe_search(params.content_filter).to_string()),
    ];

    if let Some(restrict) = params.date_restrict {
        // Bing has no one-year freshness window; leave it unrestricted
        if let Some(freshness) = freshness(restrict) {
            query.push(("freshness", freshness.to_string()));
        }
    }
    if let (Some(language), Some(country)) = (&params.language, &params.country) {
        query.push((
            "mkt",
            format!("{}-{}", language.to_lowercase(), country.to_uppercase()),
        ));
    } else if let Some(ref country) = params.country {
        query.push(("cc", country.to_uppercase()));
    }
    if let Some(ref language) = params.language {
        query.push(("setLang", language.to_lowercase()));
    }

    match request.search_type {
        SearchType::Image => {
            if let Some(size) = params.min_size {
                let size = match size {
                    ImageSize::Small => "Small",
                    ImageSize::Medium => "Medium",
                    ImageSize::Large => "Large",
                    ImageSize::Huge => "Wallpaper",
                };
                query.push(("size", size.to_string()));
            }
            if let Some(image_type) = params.image_type {
                let image_type = match image_type {
                    ImageType::Photo | ImageType::Face => "Photo",
                    ImageType::Clipart => "Clipart",
                    ImageType::Lineart => "Line",
                    ImageType::Animated => "AnimatedGif",
                };
                query.push(("imageType", image_type.to_string()));
            }
            if params.image_type == Some(ImageType::Face) {
                query.push(("imageContent", "Face".to_string()));
            }
            if let Some(color) = image_color(request) {
                query.push(("color", color));
            }
        }
        _ => {
            query.push(("responseFilter", "Webpages".to_string()));
        }
    }

    query
}

fn safe_search(filter: ContentFilter) -> &'static str {
    match filter {
        ContentFilter::Off => "Off",
        ContentFilter::Medium => "Moderate",
        ContentFilter::High => "Strict",
    }
}

fn freshness(restrict: DateRestrict) -> Option<&'static str> {
    match restrict {
        DateRestrict::Day => Some("Day"),
        DateRestrict::Week => Some("Week"),
        DateRestrict::Month => Some("Month"),
        DateRestrict::Year => None,
    }
}

/// Bing takes either a named colour or ColorOnly/Monochrome in one `color` field
fn image_color(request: &SearchRequest) -> Option<String> {
    let params = &request.params;
    if let Some(ref color) = params.dominant_color {
        if !params.include_similar_colors {
            let mut chars = color.trim().chars();
            return chars.next().map(|first| {
                first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
            });
        }
    }
    match params.image_color_type {
        Some(ImageColorType::Color) => Some("ColorOnly".to_string()),
        Some(ImageColorType::Gray) | Some(ImageColorType::Mono) => Some("Monochrome".to_string()),
        _ => None,
    }
}

fn normalize(items: Vec<BingItem>, request: &SearchRequest) -> Vec<NormalizedResult> {
    let total = items.len();
    let terms = request.terms();

    items
        .into_iter()
        .enumerate()
        .filter_map(|(position, item)| match item {
            BingItem::Web(page) => {
                let score = relevance_score(terms, position, &page.name, &page.snippet, &page.url);
                Some(NormalizedResult::new(
                    "bing",
                    request.search_type,
                    page.name,
                    page.url,
                    page.snippet,
                    None,
                    score,
                ))
            }
            BingItem::Image(image) => {
                let score = similarity_score(position, total);
                if !passes_image_filters(score, &request.params) {
                    return None;
                }
                let url = image.host_page_url.unwrap_or_else(|| image.content_url.clone());
                Some(NormalizedResult::new(
                    "bing",
                    SearchType::Image,
                    image.name,
                    url,
                    String::new(),
                    image.thumbnail_url.or(Some(image.content_url)),
                    score,
                ))
            }
        })
        .collect()
}

enum BingItem {
    Web(BingWebResult),
    Image(BingImageResult),
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct BingResponse {
    web_pages: Option<BingWebPages>,
    /// Image search responses put results at the top level
    value: Option<Vec<BingImageResult>>,
}

impl BingResponse {
    fn into_items(self, search_type: SearchType) -> Vec<BingItem> {
        match search_type {
            SearchType::Image => self
                .value
                .unwrap_or_default()
                .into_iter()
                .map(BingItem::Image)
                .collect(),
            _ => self
                .web_pages
                .map(|pages| pages.value.into_iter().map(BingItem::Web).collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct BingWebPages {
    value: Vec<BingWebResult>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct BingWebResult {
    name: String,
    url: String,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct BingImageResult {
    #[serde(default)]
    name: String,
    content_url: String,
    host_page_url: Option<String>,
    thumbnail_url: Option<String>,
}
