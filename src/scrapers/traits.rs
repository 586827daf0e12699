use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Listing, ListingType, Source};
use crate::scrapers::browser::RenderSurface;

/// What one adapter invocation produced.
///
/// `soft_errors` carries per-listing-type failures that were isolated inside
/// the adapter; they flow into the stage's error count without failing the
/// invocation.
#[derive(Debug, Default)]
pub struct ScrapeOutcome {
    pub listings: Vec<Listing>,
    pub soft_errors: Vec<String>,
}

impl ScrapeOutcome {
    pub fn record_error(&mut self, listing_type: ListingType, error: impl std::fmt::Display) {
        self.soft_errors.push(format!("{listing_type}: {error}"));
    }
}

/// Uniform contract implemented by every source adapter.
///
/// City handling is deliberately source-specific and inconsistent, matching
/// the sites themselves: adapters with city-scoped URLs honor only the first
/// requested city; the rest filter client-side on the extracted city. Each
/// adapter documents which it does.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    /// Scrape the requested feeds, returning every listing extracted.
    ///
    /// Unsupported listing types are skipped with a warning. A single
    /// listing type's failure is recorded, not raised; `Err` means the whole
    /// invocation could not proceed (e.g. the session died). `limit`
    /// overrides the configured page/scroll cap: a cost bound, not an exact
    /// result count.
    async fn scrape(
        &self,
        surface: &mut dyn RenderSurface,
        listing_types: &[ListingType],
        cities: &[String],
        limit: Option<usize>,
    ) -> Result<ScrapeOutcome>;
}
