// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use clap::Args;
use tracing::info;

use crate::search::{
    CombinedResult, ContentFilter, SearchConfig, SearchOrchestrator, SearchParameters,
    SearchRequest, SearchType, SortBy, SubscriptionTier, UserContext,
};

/// Arguments for the search command
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Query text or hashtag (not needed for image searches)
    pub query: Option<String>,

    /// Kind of search (text, hashtag or image)
    #[arg(long = "type", default_value = "text")]
    pub search_type: SearchType,

    /// Publicly reachable URL of the image to look for
    #[arg(long)]
    pub image_url: Option<String>,

    /// Maximum number of combined results
    #[arg(long)]
    pub max_results: Option<usize>,

    /// Match the query as an exact phrase
    #[arg(long)]
    pub exact: bool,

    /// Only return results from this domain (repeatable)
    #[arg(long)]
    pub site: Vec<String>,

    /// Never return results from this domain (repeatable)
    #[arg(long)]
    pub exclude_site: Vec<String>,

    /// Result ordering (relevance/date)
    #[arg(long, default_value = "relevance")]
    pub sort: SortBy,

    /// Safe-search level (off/medium/high)
    #[arg(long, default_value = "medium")]
    pub safe: ContentFilter,

    /// Search on behalf of this user, enforcing their plan's allowance
    #[arg(long, env = "SEARCH_USER_ID")]
    pub user: Option<String>,

    /// Subscription tier of --user (anonymous/basic/premium/admin)
    #[arg(long, default_value = "anonymous")]
    pub tier: SubscriptionTier,

    /// Serve tagged sample results for providers without credentials
    #[arg(long)]
    pub demo: bool,

    /// Print the combined result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the providers command
#[derive(Args, Debug)]
pub struct ProvidersArgs {
    /// Print provider statistics as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the config command
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Exit with an error if the configuration is invalid
    #[arg(long)]
    pub strict: bool,
}

impl SearchArgs {
    fn to_request(&self) -> Result<SearchRequest> {
        let params = SearchParameters {
            exact_match: self.exact,
            content_filter: self.safe,
            site_filter: self.site.iter().cloned().collect(),
            exclude_sites: self.exclude_site.iter().cloned().collect(),
            sort_by: self.sort,
            max_results: self.max_results,
            ..Default::default()
        };

        let request = match self.search_type {
            SearchType::Image => {
                let image_url = self
                    .image_url
                    .clone()
                    .or_else(|| self.query.clone())
                    .ok_or_else(|| anyhow!("Image search needs --image-url"))?;
                SearchRequest::image(image_url, params)
            }
            search_type => {
                let query = self
                    .query
                    .clone()
                    .ok_or_else(|| anyhow!("A query is required for {} search", search_type))?;
                SearchRequest::new(search_type, query, params)
            }
        };

        Ok(request)
    }
}

fn load_config() -> Result<SearchConfig> {
    let config = SearchConfig::from_env();
    config
        .validate()
        .map_err(|e| anyhow!(e))
        .context("Invalid search configuration")?;
    Ok(config)
}

/// Run a search and print the combined result
pub async fn run_search(args: SearchArgs) -> Result<()> {
    let mut config = load_config()?;
    if args.demo {
        config.demo_mode = true;
    }

    let request = args.to_request()?;
    let orchestrator = SearchOrchestrator::new(config);

    let result = match args.user {
        Some(ref user_id) => {
            let user = UserContext::new(user_id.clone(), args.tier);
            let result = orchestrator.search_as(&user, request).await;
            info!("{}", orchestrator.usage_summary(&user).message);
            result
        }
        None => orchestrator.search(request).await,
    };

    let result = result.map_err(|e| {
        if e.is_configuration() {
            anyhow!("{}. Set the provider's API key or pass --demo.", e)
        } else {
            anyhow!(e)
        }
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    Ok(())
}

fn print_result(result: &CombinedResult) {
    println!(
        "🔎 {} result(s) for \"{}\" from [{}] in {}ms",
        result.total_results,
        result.query,
        result.providers_used.join(", "),
        result.search_time_ms
    );
    if result.synthetic {
        println!("⚠️  Some results are demo samples, not live matches");
    }
    for failure in &result.failures {
        println!("   ({} failed: {})", failure.provider, failure.error);
    }
    println!();

    for (i, item) in result.items.iter().enumerate() {
        let tag = if item.is_mock() { " [sample]" } else { "" };
        println!("{:>2}. {}{}", i + 1, item.title, tag);
        println!("    {}", item.url);
        if !item.snippet.is_empty() {
            println!("    {}", item.snippet);
        }
        println!(
            "    {} · {:?} · score {:.2}",
            item.source_provider, item.content_type, item.relevance_score
        );
    }
}

/// Print every provider with quota usage
pub fn list_providers(args: ProvidersArgs) -> Result<()> {
    let orchestrator = SearchOrchestrator::new(load_config()?);
    let stats = orchestrator.provider_stats();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    for p in stats {
        let status = match (p.enabled, p.available) {
            (false, _) => "disabled",
            (true, true) => "available",
            (true, false) => "over quota",
        };
        println!(
            "{:<8} priority {:>2}  {:<10}  day {}/{}  minute {}/{}",
            p.provider,
            p.priority,
            status,
            p.daily_usage,
            p.daily_limit,
            p.minute_usage,
            p.per_minute_limit
        );
    }

    Ok(())
}

/// Print the effective configuration with API keys masked
pub fn show_config(args: ConfigArgs) -> Result<()> {
    let config = SearchConfig::from_env();
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);

    if let Err(e) = config.validate() {
        if args.strict {
            return Err(anyhow!(e)).context("Invalid search configuration");
        }
        println!("⚠️  {}", e);
    }

    Ok(())
}
