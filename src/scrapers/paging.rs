//! Load-exhaustion strategies: drive a rendering surface until a result set
//! is exhausted or a safety bound is hit.
//!
//! Two variants, chosen per source: a bounded page loop for classic
//! pagination, and an incremental-scroll loop for infinite feeds. Both treat
//! every stop condition as a normal outcome; a mid-flight render error ends
//! the loop with whatever was already collected.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::models::Listing;
use crate::scrapers::browser::RenderSurface;

/// Bounded page-by-page loader for `?page=N` feeds.
pub struct PagedFeed {
    /// Hard cap on pages visited, regardless of true result-set size.
    pub page_cap: usize,
    /// Fixed inter-page delay.
    pub delay: Duration,
    /// Settle interval after navigation before reading the DOM.
    pub settle: Duration,
    /// Optional script run after load (scroll nudges for lazy content).
    pub prime_script: Option<&'static str>,
}

impl PagedFeed {
    /// Append a page parameter, respecting an existing query string.
    pub fn page_url(base: &str, page: usize) -> String {
        if base.contains('?') {
            format!("{base}&page={page}")
        } else {
            format!("{base}?page={page}")
        }
    }

    /// Render pages 1..=cap, parsing each, stopping early when a page yields
    /// zero extractable listings ("no more data").
    pub async fn exhaust<F>(
        &self,
        surface: &mut dyn RenderSurface,
        base_url: &str,
        mut parse_page: F,
    ) -> Vec<Listing>
    where
        F: FnMut(&str) -> Vec<Listing> + Send,
    {
        let mut collected = Vec::new();

        for page in 1..=self.page_cap {
            let url = Self::page_url(base_url, page);
            debug!("Scraping page {page}: {url}");

            let html = match self.render_page(surface, &url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("Error rendering page {page}, stopping: {e:#}");
                    break;
                }
            };

            let listings = parse_page(&html);
            if listings.is_empty() {
                info!("No more listings on page {page}, stopping");
                break;
            }
            debug!("Page {page} yielded {} listings", listings.len());
            collected.extend(listings);

            if page < self.page_cap {
                tokio::time::sleep(self.delay).await;
            }
        }

        collected
    }

    async fn render_page(
        &self,
        surface: &mut dyn RenderSurface,
        url: &str,
    ) -> anyhow::Result<String> {
        surface.goto(url).await?;
        surface.settle(self.settle).await?;
        if let Some(script) = self.prime_script {
            surface.evaluate(script).await?;
            surface.settle(self.settle).await?;
        }
        surface.content().await
    }
}

/// Why an incremental-scroll loop stopped. All of these are normal stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollStop {
    /// An explicit end-of-results marker was rendered.
    EndMarker,
    /// A scroll round loaded no new elements.
    NoNewContent,
    /// The configured iteration cap was reached.
    ScrollCap,
    /// Nothing was rendered at all, or the surface errored mid-scroll.
    Empty,
}

/// Incremental-scroll loader for dynamically fed result lists.
pub struct ScrollFeed {
    /// Selector counting currently rendered listing elements.
    pub item_selector: &'static str,
    /// XPath for the explicit end-of-results marker, when the source has one.
    pub end_marker: Option<&'static str>,
    /// Settle interval after each scroll.
    pub settle: Duration,
    /// Iteration cap; bounds the loop even on a feed that never stops
    /// producing content.
    pub max_scrolls: usize,
}

impl ScrollFeed {
    /// Scroll until exhausted. The caller reads `surface.content()` afterwards
    /// and extracts every rendered card in one pass.
    pub async fn exhaust(&self, surface: &mut dyn RenderSurface) -> ScrollStop {
        let mut scrolls = 0;

        while scrolls < self.max_scrolls {
            let before = match surface.count(self.item_selector).await {
                Ok(n) => n,
                Err(e) => {
                    warn!("Error counting rendered listings, stopping scroll: {e:#}");
                    return ScrollStop::Empty;
                }
            };
            if before == 0 {
                warn!("No listings rendered on page");
                return ScrollStop::Empty;
            }

            if let Err(e) = self.scroll_round(surface).await {
                warn!("Error during scroll round, stopping: {e:#}");
                return ScrollStop::Empty;
            }

            if let Some(marker) = self.end_marker {
                if surface.marker_visible(marker).await.unwrap_or(false) {
                    info!("Reached end of results after {scrolls} scrolls");
                    return ScrollStop::EndMarker;
                }
            }

            let after = surface.count(self.item_selector).await.unwrap_or(before);
            if after == before {
                info!("No more listings loading (stuck at {before})");
                return ScrollStop::NoNewContent;
            }

            scrolls += 1;
            debug!("Scroll {scrolls}: {after} listings visible");
        }

        info!("Scroll cap reached ({} scrolls)", self.max_scrolls);
        ScrollStop::ScrollCap
    }

    async fn scroll_round(&self, surface: &mut dyn RenderSurface) -> anyhow::Result<()> {
        surface.scroll_last_into_view(self.item_selector).await?;
        surface.settle(self.settle).await
    }
}
