//! Madlan.co.il adapter.
//!
//! Madlan paginates and scopes queries by a city slug in the URL path; only
//! the first requested city is honored. Hebrew city names map through a
//! fixed slug table, anything else falls back to lowercase-dashed.

use anyhow::Result;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::models::{IdConfidence, Listing, ListingType, Source};
use crate::scrapers::browser::RenderSurface;
use crate::scrapers::extract::{
    absolutize, digits, first_href, id_after_segment, number_after, number_before, probe_text,
    split_address, synthesize_id, Probe,
};
use crate::scrapers::paging::PagedFeed;
use crate::scrapers::traits::{ScrapeOutcome, SourceAdapter};

const CARD_SELECTORS: &[&str] = &["div[class*=\"property\"]", "a[class*=\"listing\"]"];

/// Madlan only feeds more cards in after the viewport has been to the bottom.
const PRIME_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight)";

/// Madlan's result pages are short; its feed rarely goes past a few pages.
const DEFAULT_PAGE_CAP: usize = 3;

const PRICE_PROBES: &[Probe] = &[
    Probe::Currency { symbol: "₪" },
    Probe::Class { tag: Some("div"), fragment: "price" },
];
const ADDRESS_PROBES: &[Probe] = &[Probe::Class { tag: Some("div"), fragment: "address" }];
const ROOMS_PROBES: &[Probe] = &[Probe::Marker { marker: "חד" }];
const AREA_PROBES: &[Probe] = &[Probe::Marker { marker: "מ\"ר" }];
const FLOOR_PROBES: &[Probe] = &[Probe::Marker { marker: "קומה" }];

const CITY_SLUGS: &[(&str, &str)] = &[
    ("תל אביב", "tel-aviv"),
    ("חיפה", "haifa"),
    ("ירושלים", "jerusalem"),
    ("באר שבע", "beer-sheva"),
    ("פתח תקווה", "petah-tikva"),
];

pub struct MadlanAdapter {
    delay: Duration,
    settle: Duration,
    max_pages: usize,
}

impl MadlanAdapter {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            delay: config.delay,
            settle: config.settle,
            max_pages: config.max_pages.min(DEFAULT_PAGE_CAP),
        }
    }

    fn feed_url(listing_type: ListingType) -> Option<&'static str> {
        match listing_type {
            ListingType::Buy => Some("https://www.madlan.co.il/for-sale"),
            ListingType::Rent => Some("https://www.madlan.co.il/for-rent"),
            ListingType::Commercial | ListingType::NewHomes => None,
        }
    }

    fn city_slug(city: &str) -> String {
        CITY_SLUGS
            .iter()
            .find(|(name, _)| *name == city)
            .map(|(_, slug)| slug.to_string())
            .unwrap_or_else(|| city.to_lowercase().replace(' ', "-"))
    }

    pub fn parse_cards(html: &str, listing_type: ListingType) -> Vec<Listing> {
        let document = Html::parse_document(html);

        let mut cards: Vec<ElementRef<'_>> = Vec::new();
        for selector in CARD_SELECTORS {
            let sel = Selector::parse(selector).unwrap();
            cards = document.select(&sel).collect();
            if !cards.is_empty() {
                break;
            }
        }
        debug!("Found {} property cards", cards.len());

        let mut listings = Vec::new();
        for card in cards {
            match Self::parse_card(card, listing_type) {
                Some(listing) => listings.push(listing),
                None => debug!("Skipped unparseable card"),
            }
        }
        listings
    }

    fn parse_card(card: ElementRef<'_>, listing_type: ListingType) -> Option<Listing> {
        let price = probe_text(card, PRICE_PROBES).and_then(|t| digits(&t));
        let (street, city) = probe_text(card, ADDRESS_PROBES)
            .map(|raw| split_address(&raw))
            .unwrap_or((None, None));

        if street.is_none() && price.is_none() {
            return None;
        }

        let rooms = probe_text(card, ROOMS_PROBES).and_then(|t| number_before(&t, "חד"));
        let square_meters =
            probe_text(card, AREA_PROBES).and_then(|t| number_before(&t, "מ\"ר")).map(|n| n as i64);
        let floor = probe_text(card, FLOOR_PROBES).and_then(|t| number_after(&t, "קומה"));

        let href = first_href(card);
        let (external_id, id_confidence) = match href
            .as_deref()
            .and_then(|h| id_after_segment(h, "/listing/"))
        {
            Some(id) => (format!("madlan_{id}"), IdConfidence::Stable),
            None => (
                // Madlan's fallback key never includes the area
                synthesize_id(Source::Madlan, listing_type, street.as_deref(), price, None),
                IdConfidence::Derived,
            ),
        };

        let mut listing = Listing::new(Source::Madlan, listing_type, external_id, id_confidence);
        listing.address_street = street;
        listing.address_city = city;
        listing.price_current = price;
        listing.rooms = rooms;
        listing.square_meters = square_meters;
        listing.floor = floor;
        listing.images = card_images(card);
        listing.listing_url = href.map(|h| absolutize(Source::Madlan.base_url(), &h));
        Some(listing)
    }
}

fn card_images(card: ElementRef<'_>) -> Vec<String> {
    let sel = Selector::parse("img[src]").unwrap();
    card.select(&sel)
        .filter_map(|img| img.value().attr("src"))
        .map(|src| absolutize(Source::Madlan.base_url(), src))
        .collect()
}

#[async_trait]
impl SourceAdapter for MadlanAdapter {
    fn source(&self) -> Source {
        Source::Madlan
    }

    async fn scrape(
        &self,
        surface: &mut dyn RenderSurface,
        listing_types: &[ListingType],
        cities: &[String],
        limit: Option<usize>,
    ) -> Result<ScrapeOutcome> {
        let mut outcome = ScrapeOutcome::default();

        for &listing_type in listing_types {
            let Some(base_url) = Self::feed_url(listing_type) else {
                warn!("Madlan does not serve {listing_type} listings, skipping");
                continue;
            };
            info!("Scraping Madlan {listing_type}...");

            // City lives in the URL path; first requested city only
            let url = match cities.first() {
                Some(city) => format!("{base_url}/{}", Self::city_slug(city)),
                None => base_url.to_string(),
            };

            let feed = PagedFeed {
                page_cap: limit.unwrap_or(self.max_pages),
                delay: self.delay,
                settle: self.settle,
                prime_script: Some(PRIME_SCRIPT),
            };
            let listings = feed
                .exhaust(surface, &url, |html| Self::parse_cards(html, listing_type))
                .await;
            info!("Scraped {} listings for {listing_type}", listings.len());
            outcome.listings.extend(listings);

            tokio::time::sleep(self.delay).await;
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSurface;

    const FIXTURE: &str = r#"
        <html><body>
          <div class="property-card">
            <a href="/listing/998877-rothschild">
              <img src="/images/998877-front.jpg">
            </a>
            <span>₪3,200,000</span>
            <div class="address">Rothschild 12, תל אביב</div>
            <span>4 חד'</span>
            <span>110 מ"ר</span>
            <span>קומה 2</span>
          </div>
        </body></html>"#;

    #[test]
    fn parses_card_with_images_and_stable_id() {
        let listings = MadlanAdapter::parse_cards(FIXTURE, ListingType::Buy);
        assert_eq!(listings.len(), 1);

        let listing = &listings[0];
        assert_eq!(listing.external_id, "madlan_998877");
        assert_eq!(listing.id_confidence, IdConfidence::Stable);
        assert_eq!(listing.price_current, Some(3_200_000));
        assert_eq!(listing.address_street.as_deref(), Some("Rothschild 12"));
        assert_eq!(listing.address_city.as_deref(), Some("תל אביב"));
        assert_eq!(listing.rooms, Some(4.0));
        assert_eq!(listing.square_meters, Some(110));
        assert_eq!(listing.floor, Some(2));
        assert_eq!(
            listing.images,
            vec!["https://www.madlan.co.il/images/998877-front.jpg".to_string()]
        );
        assert_eq!(
            listing.listing_url.as_deref(),
            Some("https://www.madlan.co.il/listing/998877-rothschild")
        );
    }

    #[test]
    fn city_slug_maps_known_cities_and_falls_back() {
        assert_eq!(MadlanAdapter::city_slug("תל אביב"), "tel-aviv");
        assert_eq!(MadlanAdapter::city_slug("באר שבע"), "beer-sheva");
        assert_eq!(MadlanAdapter::city_slug("Ramat Gan"), "ramat-gan");
    }

    #[tokio::test]
    async fn commercial_feed_is_skipped_as_unsupported() {
        let mut surface = ScriptedSurface::default();
        let adapter = MadlanAdapter {
            delay: Duration::ZERO,
            settle: Duration::ZERO,
            max_pages: 3,
        };

        let outcome = adapter
            .scrape(
                &mut surface,
                &[ListingType::Commercial, ListingType::NewHomes],
                &[],
                None,
            )
            .await
            .unwrap();

        assert!(outcome.listings.is_empty());
        assert!(outcome.soft_errors.is_empty());
        assert!(surface.visited.is_empty());
    }

    #[tokio::test]
    async fn city_scoped_url_uses_slug_path() {
        let mut surface = ScriptedSurface {
            pages: vec![FIXTURE.to_string(), "<html></html>".to_string()],
            ..Default::default()
        };
        let adapter = MadlanAdapter {
            delay: Duration::ZERO,
            settle: Duration::ZERO,
            max_pages: 3,
        };

        let outcome = adapter
            .scrape(&mut surface, &[ListingType::Buy], &["תל אביב".to_string()], None)
            .await
            .unwrap();

        assert_eq!(outcome.listings.len(), 1);
        assert!(surface.visited[0].starts_with("https://www.madlan.co.il/for-sale/tel-aviv"));
    }
}
