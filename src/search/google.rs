// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Google Custom Search JSON API provider
//!
//! Primary engine for text, hashtag and image searches. The API returns at most
//! ten items per call, so larger requests are paged with `start`.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::config::ProviderSettings;
use super::mock;
use super::paging::fetch_paged;
use super::provider::SearchProvider;
use super::quota::QuotaLimits;
use super::scoring::{passes_image_filters, relevance_score, similarity_score};
use super::types::{
    ContentFilter, DateRestrict, ImageColorType, ImageSize, ImageType, NormalizedResult,
    SearchError, SearchParameters, SearchRequest, SearchType, SortBy,
};

const GOOGLE_API_URL: &str = "https://www.googleapis.com/customsearch/v1";
const PAGE_SIZE: usize = 10;

/// Google Custom Search provider
pub struct GoogleSearchProvider {
    settings: ProviderSettings,
    demo_mode: bool,
    timeout: Duration,
    client: Client,
}

impl GoogleSearchProvider {
    /// Create a new Google provider
    ///
    /// # Arguments
    /// * `settings` - API key, engine id (`cx`), limits and priority
    /// * `demo_mode` - synthesize tagged sample results when credentials are missing
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

    fn credentials(&self) -> Option<(&str, &str)> {
        let key = self.settings.api_key()?;
        let cx = self
            .settings
            .engine_id
            .as_deref()
            .filter(|cx| !cx.trim().is_empty())?;
        Some((key, cx))
    }

    async fn fetch_page(
        &self,
        key: &str,
        cx: &str,
        request: &SearchRequest,
        offset: usize,
        count: usize,
    ) -> Result<Vec<GoogleItem>, SearchError> {
        let mut query = build_query(request, offset, count);
        query.push(("key", key.to_string()));
        query.push(("cx", cx.to_string()));

        let response = self
            .client
            .get(GOOGLE_API_URL)
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
                provider: "google".to_string(),
                message: "API key or engine id rejected; check GOOGLE_API_KEY and GOOGLE_CX"
                    .to_string(),
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let data: GoogleResponse = response.json().await.map_err(|e| SearchError::ApiError {
            status: 0,
            message: format!("JSON parse error: {}", e),
        })?;

        Ok(data.items.unwrap_or_default())
    }
}

#[async_trait]
impl SearchProvider for GoogleSearchProvider {
    async fn execute(
        &self,
        request: &SearchRequest,
        max_results: usize,
    ) -> Result<Vec<NormalizedResult>, SearchError> {
        let Some((key, cx)) = self.credentials() else {
            if self.demo_mode {
                debug!("Google credentials missing, serving demo results");
                return Ok(mock::synthesize(self.name(), request, max_results));
            }
            return Err(SearchError::Configuration {
                provider: "google".to_string(),
                message: "set GOOGLE_API_KEY and GOOGLE_CX, or enable SEARCH_DEMO_MODE"
                    .to_string(),
            });
        };

        let items = fetch_paged(self.name(), PAGE_SIZE, max_results, move |offset, count| {
            self.fetch_page(key, cx, request, offset, count)
        })
        .await?;

        Ok(normalize(items, request))
    }

    fn name(&self) -> &str {
        "google"
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

/// Query-string pairs for one page, without credentials
fn build_query(request: &SearchRequest, offset: usize, count: usize) -> Vec<(&'static str, String)> {
    let params = &request.params;
    let mut terms = request.terms().trim().to_string();

    let mut query: Vec<(&'static str, String)> = vec![
        ("num", count.min(PAGE_SIZE).to_string()),
        ("start", (offset + 1).to_string()),
    ];

    if params.exact_match {
        query.push(("exactTerms", terms.clone()));
    }

    // siteSearch takes one domain; more than one goes into the query text
    match params.site_filter.len() {
        0 => {}
        1 => {
            if let Some(site) = params.site_filter.iter().next() {
                query.push(("siteSearch", site.clone()));
                query.push(("siteSearchFilter", "i".to_string()));
            }
        }
        _ => {
            let sites: Vec<String> = params
                .site_filter
                .iter()
                .map(|s| format!("site:{}", s))
                .collect();
            terms = format!("{} ({})", terms, sites.join(" OR "));
        }
    }
    for site in &params.exclude_sites {
        terms.push_str(&format!(" -site:{}", site));
    }
    query.insert(0, ("q", terms));

    if let Some(restrict) = params.date_restrict {
        query.push(("dateRestrict", date_restrict(restrict).to_string()));
    }
    query.push(("safe", safe_level(params.content_filter).to_string()));
    if let Some(ref language) = params.language {
        query.push(("lr", format!("lang_{}", language.to_lowercase())));
    }
    if let Some(ref country) = params.country {
        query.push(("cr", format!("country{}", country.to_uppercase())));
    }
    if let Some(ref file_type) = params.file_type {
        query.push(("fileType", file_type.clone()));
    }
    if let Some(ref rights) = params.rights {
        query.push(("rights", rights.clone()));
    }
    if params.sort_by == SortBy::Date {
        query.push(("sort", "date".to_string()));
    }

    if request.search_type == SearchType::Image {
        query.push(("searchType", "image".to_string()));
        push_image_params(&mut query, params);
    }

    query
}

fn push_image_params(query: &mut Vec<(&'static str, String)>, params: &SearchParameters) {
    if let Some(size) = params.min_size {
        let size = match size {
            ImageSize::Small => "small",
            ImageSize::Medium => "medium",
            ImageSize::Large => "large",
            ImageSize::Huge => "huge",
        };
        query.push(("imgSize", size.to_string()));
    }
    if let Some(image_type) = params.image_type {
        let image_type = match image_type {
            ImageType::Photo => "photo",
            ImageType::Clipart => "clipart",
            ImageType::Lineart => "lineart",
            ImageType::Face => "face",
            ImageType::Animated => "animated",
        };
        query.push(("imgType", image_type.to_string()));
    }
    if let Some(color_type) = params.image_color_type {
        let color_type = match color_type {
            ImageColorType::Color => "color",
            ImageColorType::Gray => "gray",
            ImageColorType::Mono => "mono",
            ImageColorType::Trans => "trans",
        };
        query.push(("imgColorType", color_type.to_string()));
    }
    // A dominant colour narrows matches, so similar-colour searches leave it out
    if let Some(ref color) = params.dominant_color {
        if !params.include_similar_colors {
            query.push(("imgDominantColor", color.to_lowercase()));
        }
    }
}

fn date_restrict(restrict: DateRestrict) -> &'static str {
    match restrict {
        DateRestrict::Day => "d1",
        DateRestrict::Week => "w1",
        DateRestrict::Month => "m1",
        DateRestrict::Year => "y1",
    }
}

fn safe_level(filter: ContentFilter) -> &'static str {
    match filter {
        ContentFilter::Off => "off",
        ContentFilter::Medium | ContentFilter::High => "active",
    }
}

fn normalize(items: Vec<GoogleItem>, request: &SearchRequest) -> Vec<NormalizedResult> {
    let total = items.len();
    let terms = request.terms();

    items
        .into_iter()
        .enumerate()
        .filter_map(|(position, item)| {
            let GoogleItem {
                title,
                link,
                snippet,
                pagemap,
                image,
            } = item;
            let snippet = snippet.unwrap_or_default();

            match request.search_type {
                SearchType::Image => {
                    let score = similarity_score(position, total);
                    if !passes_image_filters(score, &request.params) {
                        return None;
                    }
                    let (page, thumbnail) = match image {
                        Some(img) => (img.context_link.unwrap_or_else(|| link.clone()), img.thumbnail_link),
                        None => (link.clone(), None),
                    };
                    Some(NormalizedResult::new(
                        "google",
                        SearchType::Image,
                        title,
                        page,
                        snippet,
                        thumbnail.or(Some(link)),
                        score,
                    ))
                }
                search_type => {
                    let score = relevance_score(terms, position, &title, &snippet, &link);
                    let thumbnail = pagemap
                        .and_then(|p| p.cse_thumbnail)
                        .and_then(|t| t.into_iter().next())
                        .map(|t| t.src);
                    Some(NormalizedResult::new(
                        "google",
                        search_type,
                        title,
                        link,
                        snippet,
                        thumbnail,
                        score,
                    ))
                }
            }
        })
        .collect()
}

#[derive(Debug, serde::Deserialize)]
struct GoogleResponse {
    items: Option<Vec<GoogleItem>>,
}

#[derive(Debug, serde::Deserialize)]
struct GoogleItem {
    title: String,
    link: String,
    snippet: Option<String>,
    pagemap: Option<GooglePagemap>,
    image: Option<GoogleImage>,
}

#[derive(Debug, serde::Deserialize)]
struct GooglePagemap {
    cse_thumbnail: Option<Vec<GoogleThumbnail>>,
}

#[derive(Debug, serde::Deserialize)]
struct GoogleThumbnail {
    src: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleImage {
    context_link: Option<String>,
    thumbnail_link: Option<String>,
}
