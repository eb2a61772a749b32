// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Core types for multi-engine search

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Source tag attached to every combined result produced by the orchestrator
pub const MULTI_ENGINE_SOURCE: &str = "multi-engine";

/// Hosts whose results are reported as social content
const SOCIAL_HOSTS: &[&str] = &[
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "youtube.com",
    "pinterest.com",
    "reddit.com",
    "linkedin.com",
    "tumblr.com",
    "threads.net",
];

fn is_valid_hashtag(tag: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    match PATTERN.get_or_init(|| Regex::new(r"^#?[\p{L}\p{N}_]+$").ok()) {
        Some(pattern) => pattern.is_match(tag),
        None => {
            let body = tag.trim_start_matches('#');
            !body.is_empty() && body.chars().all(|c| c.is_alphanumeric() || c == '_')
        }
    }
}

/// Kind of search being performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Text,
    Hashtag,
    Image,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Text => "text",
            SearchType::Hashtag => "hashtag",
            SearchType::Image => "image",
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(SearchType::Text),
            "hashtag" => Ok(SearchType::Hashtag),
            "image" => Ok(SearchType::Image),
            other => Err(format!("unknown search type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateRestrict {
    Day,
    Week,
    Month,
    Year,
}

/// Safe-search level requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFilter {
    Off,
    #[default]
    Medium,
    High,
}

impl FromStr for ContentFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" => Ok(ContentFilter::Off),
            "medium" => Ok(ContentFilter::Medium),
            "high" => Ok(ContentFilter::High),
            other => Err(format!("unknown content filter: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Relevance,
    Date,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "relevance" => Ok(SortBy::Relevance),
            "date" => Ok(SortBy::Date),
            other => Err(format!("unknown sort order: {}", other)),
        }
    }
}

/// How strictly image similarity thresholds are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Relaxed,
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSize {
    Small,
    Medium,
    Large,
    Huge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Photo,
    Clipart,
    Lineart,
    Face,
    Animated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageColorType {
    Color,
    Gray,
    Mono,
    Trans,
}

/// Options recognised by every search, plus the image-only options
///
/// Unset options are omitted from the serialized form so that the canonical
/// encoding only reflects what the caller asked for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchParameters {
    #[serde(skip_serializing_if = "is_false")]
    pub exact_match: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_restrict: Option<DateRestrict>,
    pub content_filter: ContentFilter,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub site_filter: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub exclude_sites: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rights: Option<String>,
    pub sort_by: SortBy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f32>,
    pub search_mode: SearchMode,
    #[serde(skip_serializing_if = "is_false")]
    pub include_similar_colors: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_partial_matches: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_size: Option<ImageSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_type: Option<ImageType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_color_type: Option<ImageColorType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dominant_color: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl SearchParameters {
    /// Key-sorted JSON encoding used for cache keys
    ///
    /// Round-trips through `Value`, whose object map is a `BTreeMap`, so keys come
    /// out sorted at every level. Site sets are `BTreeSet`s and already ordered.
    pub fn canonical_json(&self) -> String {
        serde_json::to_value(self)
            .and_then(|value| serde_json::to_string(&value))
            .unwrap_or_else(|_| String::from("{}"))
    }

    /// Whether partial image matches are kept (defaults to true)
    pub fn partial_matches_allowed(&self) -> bool {
        self.include_partial_matches.unwrap_or(true)
    }
}

/// A unit of search work; immutable once constructed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(rename = "type")]
    pub search_type: SearchType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_text: Option<String>,
    /// Publicly resolvable URL of the uploaded image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub params: SearchParameters,
}

impl SearchRequest {
    pub fn text(query: impl Into<String>, params: SearchParameters) -> Self {
        Self {
            search_type: SearchType::Text,
            query_text: Some(query.into()),
            image_ref: None,
            params,
        }
    }

    /// Build a hashtag search; the tag is stored with a single leading `#`
    pub fn hashtag(tag: impl AsRef<str>, params: SearchParameters) -> Self {
        let tag = tag.as_ref().trim().trim_start_matches('#');
        Self {
            search_type: SearchType::Hashtag,
            query_text: Some(format!("#{}", tag)),
            image_ref: None,
            params,
        }
    }

    pub fn image(image_url: impl Into<String>, params: SearchParameters) -> Self {
        Self {
            search_type: SearchType::Image,
            query_text: None,
            image_ref: Some(image_url.into()),
            params,
        }
    }

    /// Build a request of any type from a single query string
    ///
    /// For image searches the query is the image URL.
    pub fn new(search_type: SearchType, query: impl Into<String>, params: SearchParameters) -> Self {
        match search_type {
            SearchType::Text => Self::text(query, params),
            SearchType::Hashtag => Self::hashtag(query.into(), params),
            SearchType::Image => Self::image(query, params),
        }
    }

    /// The text that identifies this request: query text, or image URL for image searches
    pub fn query(&self) -> &str {
        match self.search_type {
            SearchType::Image => self
                .image_ref
                .as_deref()
                .or(self.query_text.as_deref())
                .unwrap_or(""),
            _ => self.query_text.as_deref().unwrap_or(""),
        }
    }

    /// Terms sent to text engines; image searches fall back to the image URL
    pub fn terms(&self) -> &str {
        self.query_text
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or_else(|| self.query())
    }

    /// `type:query:canonical params`
    ///
    /// Text and hashtag queries are lowercased. Image URLs keep their case since
    /// URL paths are case-sensitive.
    pub fn cache_key(&self) -> String {
        let query = self.query().trim();
        let query = match self.search_type {
            SearchType::Image => query.to_string(),
            _ => query.to_lowercase(),
        };
        format!(
            "{}:{}:{}",
            self.search_type,
            query,
            self.params.canonical_json()
        )
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        match self.search_type {
            SearchType::Text => {
                if self.query().trim().is_empty() {
                    return Err(SearchError::InvalidQuery {
                        reason: "query text is empty".to_string(),
                    });
                }
            }
            SearchType::Hashtag => {
                if !is_valid_hashtag(self.query().trim()) {
                    return Err(SearchError::InvalidQuery {
                        reason: format!("'{}' is not a valid hashtag", self.query()),
                    });
                }
            }
            SearchType::Image => {
                let image = self.image_ref.as_deref().unwrap_or("").trim();
                if image.is_empty() {
                    return Err(SearchError::InvalidQuery {
                        reason: "image search requires an image URL".to_string(),
                    });
                }
                if url::Url::parse(image).is_err() {
                    return Err(SearchError::InvalidQuery {
                        reason: format!("image reference is not a URL: {}", image),
                    });
                }
            }
        }

        if let Some(threshold) = self.params.similarity_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(SearchError::InvalidQuery {
                    reason: format!("similarity threshold {} outside 0..1", threshold),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Website,
    Image,
    Social,
}

impl ContentType {
    pub fn classify(domain: &str, search_type: SearchType) -> Self {
        let domain = domain.trim_start_matches("www.");
        let social = SOCIAL_HOSTS
            .iter()
            .any(|host| domain == *host || domain.ends_with(&format!(".{}", host)));

        if social {
            ContentType::Social
        } else if search_type == SearchType::Image {
            ContentType::Image
        } else {
            ContentType::Website
        }
    }
}

/// Whether a result came from a live provider call or demo-mode synthesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultOrigin {
    #[default]
    Live,
    Mock,
}

/// A single result in the provider-independent shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResult {
    pub title: String,
    /// Result link; its canonical form is the deduplication key
    pub url: String,
    pub display_domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub snippet: String,
    pub content_type: ContentType,
    /// Always within 0..=1
    pub relevance_score: f32,
    pub source_provider: String,
    #[serde(rename = "source")]
    pub origin: ResultOrigin,
}

impl NormalizedResult {
    /// Build a live result, deriving the display domain and content type from the URL
    pub fn new(
        provider: &str,
        search_type: SearchType,
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
        thumbnail_url: Option<String>,
        relevance_score: f32,
    ) -> Self {
        let url = url.into();
        let display_domain = super::merger::display_domain(&url);
        let content_type = ContentType::classify(&display_domain, search_type);

        Self {
            title: title.into(),
            url,
            display_domain,
            thumbnail_url,
            snippet: snippet.into(),
            content_type,
            relevance_score: relevance_score.clamp(0.0, 1.0),
            source_provider: provider.to_string(),
            origin: ResultOrigin::Live,
        }
    }

    pub fn is_mock(&self) -> bool {
        self.origin == ResultOrigin::Mock
    }
}

/// A provider attempt that failed during a combined search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFailure {
    pub provider: String,
    pub error: String,
}

/// Deduplicated, merged output of one logical search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedResult {
    pub request_id: String,
    pub query: String,
    #[serde(rename = "type")]
    pub search_type: SearchType,
    pub items: Vec<NormalizedResult>,
    pub total_results: usize,
    /// Always [`MULTI_ENGINE_SOURCE`]
    pub source: String,
    pub providers_used: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub failures: Vec<ProviderFailure>,
    /// True when any item was synthesized in demo mode
    pub synthetic: bool,
    pub cached: bool,
    pub search_time_ms: u64,
}

/// Errors that can occur during search operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SearchError {
    /// Provider credentials are missing or were rejected
    #[error("{provider} is not configured: {message}")]
    Configuration { provider: String, message: String },

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Search API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Search timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The provider's quota did not free up while the request was queued
    #[error("Quota exhausted for {provider}")]
    QuotaExceeded { provider: String },

    #[error("Request queue is closed")]
    QueueClosed,

    #[error("Invalid query: {reason}")]
    InvalidQuery { reason: String },

    #[error("No search providers available; try again later")]
    NoProvidersAvailable,

    #[error("All {attempted} search providers failed; last error: {last}")]
    AllProvidersFailed {
        attempted: usize,
        last: Box<SearchError>,
    },

    #[error("{tier} plan {period} search limit of {limit} reached")]
    UsageLimitExceeded {
        tier: String,
        period: String,
        limit: u32,
    },

    #[error("Search disabled on this host")]
    SearchDisabled,
}

impl SearchError {
    /// Whether an operator has to fix credentials before this can succeed
    pub fn is_configuration(&self) -> bool {
        match self {
            SearchError::Configuration { .. } => true,
            SearchError::AllProvidersFailed { last, .. } => last.is_configuration(),
            _ => false,
        }
    }

    /// Whether retrying later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::RateLimited { .. }
            | SearchError::ApiError { .. }
            | SearchError::Timeout { .. }
            | SearchError::QuotaExceeded { .. }
            | SearchError::QueueClosed
            | SearchError::NoProvidersAvailable => true,
            SearchError::AllProvidersFailed { last, .. } => !last.is_configuration(),
            _ => false,
        }
    }
}
