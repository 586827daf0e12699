use std::env;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::warn;

use crate::models::ListingType;

/// Explicit run context, read once from the environment at startup and passed
/// down instead of consulted globally.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Data-store endpoint (mandatory)
    pub supabase_url: String,
    /// Data-store API key (mandatory)
    pub supabase_key: String,
    /// Target cities, source-language names
    pub cities: Vec<String>,
    /// Feeds to visit per source
    pub listing_types: Vec<ListingType>,
    /// Inter-request delay applied between pages / listing types
    pub delay: Duration,
    /// Settle interval after a scroll, waiting for async content
    pub settle: Duration,
    /// Page cap for paginated feeds
    pub max_pages: usize,
    /// Iteration cap for incremental-scroll feeds
    pub max_scrolls: usize,
    pub headless: bool,
    /// Audit tag for the run log (CI run id when present)
    pub triggered_by: Option<String>,
}

impl RunConfig {
    pub fn from_env() -> Self {
        let listing_types = env_list("LISTING_TYPES", &["buy", "rent", "commercial", "new_homes"])
            .iter()
            .filter_map(|tag| {
                let parsed = ListingType::parse(tag);
                if parsed.is_none() {
                    warn!("Unknown listing type in LISTING_TYPES, skipping: {tag}");
                }
                parsed
            })
            .collect();

        Self {
            supabase_url: env::var("SUPABASE_URL").unwrap_or_default(),
            supabase_key: env::var("SUPABASE_KEY").unwrap_or_default(),
            cities: env_list("CITIES", &["תל אביב", "חיפה", "ירושלים"]),
            listing_types,
            delay: Duration::from_millis(env_u64("SCRAPE_DELAY_MS", 2000)),
            settle: Duration::from_millis(env_u64("SCROLL_SETTLE_MS", 1000)),
            max_pages: env_u64("MAX_PAGES", 5) as usize,
            max_scrolls: env_u64("MAX_SCROLLS", 50) as usize,
            headless: env_bool("HEADLESS", true),
            triggered_by: env::var("GITHUB_RUN_ID").ok(),
        }
    }

    /// Mandatory-configuration check, run by the Initialize stage before any
    /// scraping. Failure here is fatal for the whole run.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.supabase_url.is_empty() {
            missing.push("SUPABASE_URL");
        }
        if self.supabase_key.is_empty() {
            missing.push("SUPABASE_KEY");
        }
        if !missing.is_empty() {
            bail!("Missing required environment variables: {}", missing.join(", "));
        }
        if self.listing_types.is_empty() {
            bail!("No valid listing types configured");
        }
        if self.cities.is_empty() {
            bail!("No target cities configured");
        }
        Ok(())
    }
}

/// Comma-separated environment list with a default when unset or blank.
fn env_list(var: &str, default: &[&str]) -> Vec<String> {
    match env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

fn env_u64(var: &str, default: u64) -> u64 {
    env::var(var)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(var: &str, default: bool) -> bool {
    match env::var(var) {
        Ok(raw) => !matches!(raw.trim(), "0" | "false" | "no"),
        Err(_) => default,
    }
}
