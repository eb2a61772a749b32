// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Configuration for multi-engine search

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use super::cache::CacheSettings;
use super::queue::QueueSettings;
use super::quota::QuotaLimits;

/// Configuration for the search orchestrator
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    /// Whether search is enabled
    pub enabled: bool,
    /// Synthesize tagged sample results for providers without credentials
    pub demo_mode: bool,
    /// Provider-specific configuration
    pub providers: SearchProviderConfig,
    pub cache: CacheConfig,
    pub queue: QueueConfig,
    /// Most results requested from any single engine
    pub max_results_per_engine: usize,
    /// Ceiling on results returned by one combined search
    pub combined_results_limit: usize,
    /// Results returned when the caller does not set `maxResults`
    pub default_num_results: usize,
    /// Timeout for one provider attempt in milliseconds
    pub provider_timeout_ms: u64,
}

/// Provider-specific configuration
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchProviderConfig {
    /// Primary text/image engine (Google Custom Search)
    pub google: ProviderSettings,
    /// Secondary engine (Bing Search v7)
    pub bing: ProviderSettings,
    /// Text-only engine (Brave Search)
    pub brave: ProviderSettings,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    pub enabled: bool,
    /// Higher is tried first
    pub priority: u8,
    pub daily_limit: u32,
    pub per_minute_limit: u32,
    pub cost_per_request: f64,
    pub api_key: Option<String>,
    /// Search engine id (Google `cx`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_id: Option<String>,
}

impl ProviderSettings {
    fn new(priority: u8, daily_limit: u32, per_minute_limit: u32, cost_per_request: f64) -> Self {
        Self {
            enabled: true,
            priority,
            daily_limit,
            per_minute_limit,
            cost_per_request,
            api_key: None,
            engine_id: None,
        }
    }

    fn from_env(prefix: &str, defaults: ProviderSettings) -> Self {
        Self {
            enabled: env_flag(&format!("{}_ENABLED", prefix), defaults.enabled),
            priority: env_parse(&format!("{}_PRIORITY", prefix), defaults.priority),
            daily_limit: env_parse(&format!("{}_DAILY_LIMIT", prefix), defaults.daily_limit),
            per_minute_limit: env_parse(
                &format!("{}_PER_MINUTE_LIMIT", prefix),
                defaults.per_minute_limit,
            ),
            cost_per_request: env_parse(
                &format!("{}_COST_PER_REQUEST", prefix),
                defaults.cost_per_request,
            ),
            api_key: env_secret(&format!("{}_API_KEY", prefix)),
            engine_id: defaults.engine_id,
        }
    }

    pub fn quota_limits(&self) -> QuotaLimits {
        QuotaLimits::new(self.daily_limit, self.per_minute_limit)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    fn redacted(&self) -> Self {
        Self {
            api_key: self.api_key.as_ref().map(|_| "****".to_string()),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    pub max_size: usize,
    pub primary_ttl_secs: u64,
    pub default_ttl_secs: u64,
    /// Providers whose results get the long TTL
    pub primary_providers: Vec<String>,
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    pub capacity: usize,
    pub drain_delay_ms: u64,
    pub max_wait_secs: u64,
}

impl SearchConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut google = ProviderSettings::from_env("GOOGLE", defaults.providers.google);
        google.engine_id = env_secret("GOOGLE_CX");

        Self {
            // Set SEARCH_ENABLED=false to disable
            enabled: env_flag("SEARCH_ENABLED", defaults.enabled),
            demo_mode: env_flag("SEARCH_DEMO_MODE", defaults.demo_mode),
            providers: SearchProviderConfig {
                google,
                bing: ProviderSettings::from_env("BING", defaults.providers.bing),
                brave: ProviderSettings::from_env("BRAVE", defaults.providers.brave),
            },
            cache: CacheConfig {
                max_size: env_parse("SEARCH_CACHE_MAX_SIZE", defaults.cache.max_size),
                primary_ttl_secs: env_parse(
                    "SEARCH_CACHE_PRIMARY_TTL_SECS",
                    defaults.cache.primary_ttl_secs,
                ),
                default_ttl_secs: env_parse(
                    "SEARCH_CACHE_DEFAULT_TTL_SECS",
                    defaults.cache.default_ttl_secs,
                ),
                primary_providers: env::var("SEARCH_CACHE_PRIMARY_PROVIDERS")
                    .ok()
                    .map(|v| {
                        v.split(',')
                            .map(|p| p.trim().to_lowercase())
                            .filter(|p| !p.is_empty())
                            .collect()
                    })
                    .unwrap_or(defaults.cache.primary_providers),
                cleanup_interval_secs: env_parse(
                    "SEARCH_CACHE_CLEANUP_INTERVAL_SECS",
                    defaults.cache.cleanup_interval_secs,
                ),
            },
            queue: QueueConfig {
                capacity: env_parse("SEARCH_QUEUE_CAPACITY", defaults.queue.capacity),
                drain_delay_ms: env_parse(
                    "SEARCH_QUEUE_DRAIN_DELAY_MS",
                    defaults.queue.drain_delay_ms,
                ),
                max_wait_secs: env_parse("SEARCH_QUEUE_MAX_WAIT_SECS", defaults.queue.max_wait_secs),
            },
            max_results_per_engine: env_parse(
                "SEARCH_MAX_RESULTS_PER_ENGINE",
                defaults.max_results_per_engine,
            ),
            combined_results_limit: env_parse(
                "SEARCH_COMBINED_RESULTS_LIMIT",
                defaults.combined_results_limit,
            ),
            default_num_results: env_parse(
                "SEARCH_DEFAULT_NUM_RESULTS",
                defaults.default_num_results,
            ),
            provider_timeout_ms: env_parse(
                "SEARCH_PROVIDER_TIMEOUT_MS",
                defaults.provider_timeout_ms,
            ),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.cache.max_size == 0 {
            return Err("Cache max size must be greater than 0".to_string());
        }
        if self.cache.primary_ttl_secs == 0 || self.cache.default_ttl_secs == 0 {
            return Err("Cache TTLs must be greater than 0".to_string());
        }
        if self.combined_results_limit == 0 || self.max_results_per_engine == 0 {
            return Err("Result limits must be greater than 0".to_string());
        }
        if self.provider_timeout_ms == 0 {
            return Err("Provider timeout must be greater than 0".to_string());
        }
        for (name, settings) in self.provider_settings() {
            if settings.enabled && (settings.daily_limit == 0 || settings.per_minute_limit == 0) {
                return Err(format!("{} quota limits must be greater than 0", name));
            }
        }
        if self.providers.google.enabled
            && self.providers.google.api_key().is_some()
            && self.providers.google.engine_id.is_none()
        {
            return Err("GOOGLE_CX is required when GOOGLE_API_KEY is set".to_string());
        }
        Ok(())
    }

    /// Check if any search provider has credentials
    pub fn has_any_provider(&self) -> bool {
        self.provider_settings()
            .iter()
            .any(|(_, s)| s.enabled && s.api_key().is_some())
    }

    pub fn provider_settings(&self) -> [(&'static str, &ProviderSettings); 3] {
        [
            ("google", &self.providers.google),
            ("bing", &self.providers.bing),
            ("brave", &self.providers.brave),
        ]
    }

    /// Copy of the configuration with API keys masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.providers.google = self.providers.google.redacted();
        copy.providers.bing = self.providers.bing.redacted();
        copy.providers.brave = self.providers.brave.redacted();
        copy
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            max_size: self.cache.max_size,
            primary_ttl: chrono::Duration::seconds(self.cache.primary_ttl_secs as i64),
            default_ttl: chrono::Duration::seconds(self.cache.default_ttl_secs as i64),
            primary_providers: self.cache.primary_providers.clone(),
        }
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            capacity: self.queue.capacity,
            drain_delay: Duration::from_millis(self.queue.drain_delay_ms),
            max_wait: Duration::from_secs(self.queue.max_wait_secs),
            ..QueueSettings::default()
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            demo_mode: false,
            providers: SearchProviderConfig {
                google: ProviderSettings::new(10, 100, 10, 0.005),
                bing: ProviderSettings::new(8, 50, 3, 0.003),
                brave: ProviderSettings::new(5, 60, 1, 0.0),
            },
            cache: CacheConfig {
                max_size: 500,
                primary_ttl_secs: 6 * 3600,
                default_ttl_secs: 30 * 60,
                primary_providers: vec!["google".to_string()],
                cleanup_interval_secs: 300,
            },
            queue: QueueConfig {
                capacity: 64,
                drain_delay_ms: 1000,
                max_wait_secs: 120,
            },
            max_results_per_engine: 30,
            combined_results_limit: 50,
            default_num_results: 10,
            provider_timeout_ms: 30_000,
        }
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_secret(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
