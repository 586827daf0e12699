//! OnMap.co.il adapter.
//!
//! OnMap serves an infinite-scroll feed and exposes no city filter in its
//! URLs, so requested cities are applied client-side against the extracted
//! city after the feed is exhausted.

use anyhow::Result;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::models::{IdConfidence, Listing, ListingType, Source};
use crate::scrapers::browser::RenderSurface;
use crate::scrapers::extract::{
    digits, first_decimal, probe_text, split_address, synthesize_id, Probe,
};
use crate::scrapers::paging::ScrollFeed;
use crate::scrapers::traits::{ScrapeOutcome, SourceAdapter};

const CARD_SELECTOR: &str = "div.s-result";
const END_MARKER: &str = "//div[contains(text(), 'End of results')]";

const PRICE_PROBES: &[Probe] = &[
    Probe::Class { tag: Some("span"), fragment: "price" },
    Probe::Currency { symbol: "₪" },
];
const ADDRESS_PROBES: &[Probe] = &[Probe::Class { tag: Some("div"), fragment: "address" }];
const TYPE_PROBES: &[Probe] = &[Probe::Class { tag: Some("div"), fragment: "type" }];
const ROOMS_PROBES: &[Probe] = &[Probe::Class { tag: Some("div"), fragment: "rooms" }];
const AREA_PROBES: &[Probe] = &[Probe::Class { tag: Some("div"), fragment: "area" }];
const FLOOR_PROBES: &[Probe] = &[Probe::Class { tag: Some("div"), fragment: "floor" }];
const PARKING_PROBES: &[Probe] = &[Probe::Class { tag: Some("div"), fragment: "parking" }];

pub struct OnmapAdapter {
    delay: Duration,
    settle: Duration,
    max_scrolls: usize,
}

impl OnmapAdapter {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            delay: config.delay,
            settle: config.settle,
            max_scrolls: config.max_scrolls,
        }
    }

    fn feed_url(listing_type: ListingType) -> &'static str {
        match listing_type {
            ListingType::Buy => "https://www.onmap.co.il/en/listings/sale",
            ListingType::Rent => "https://www.onmap.co.il/en/listings/rent",
            ListingType::Commercial => "https://www.onmap.co.il/en/commercial",
            ListingType::NewHomes => "https://www.onmap.co.il/en/projects",
        }
    }

    async fn scrape_listing_type(
        &self,
        surface: &mut dyn RenderSurface,
        listing_type: ListingType,
        limit: Option<usize>,
    ) -> Result<Vec<Listing>> {
        let url = Self::feed_url(listing_type);
        info!("Accessing {url}");

        surface.goto(url).await?;
        surface.settle(self.settle).await?;

        let feed = ScrollFeed {
            item_selector: CARD_SELECTOR,
            end_marker: Some(END_MARKER),
            settle: self.settle,
            max_scrolls: limit.unwrap_or(self.max_scrolls),
        };
        let stop = feed.exhaust(surface).await;
        debug!("Scroll loop finished: {stop:?}");

        let html = surface.content().await?;
        Ok(Self::parse_cards(&html, listing_type))
    }

    pub fn parse_cards(html: &str, listing_type: ListingType) -> Vec<Listing> {
        let document = Html::parse_document(html);
        let card_selector = Selector::parse(CARD_SELECTOR).unwrap();

        let mut listings = Vec::new();
        for card in document.select(&card_selector) {
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

        // A card with neither address nor price carries nothing worth keeping
        if street.is_none() && price.is_none() {
            return None;
        }

        let rooms = probe_text(card, ROOMS_PROBES).and_then(|t| first_decimal(&t));
        let square_meters = probe_text(card, AREA_PROBES).and_then(|t| digits(&t));
        let floor = probe_text(card, FLOOR_PROBES).and_then(|t| digits(&t));
        let parking = probe_text(card, PARKING_PROBES)
            .map(|t| t.to_lowercase().contains("parking"))
            .unwrap_or(false);

        // OnMap cards carry no id-bearing hyperlink; identity is always
        // synthesized and therefore degraded.
        let external_id = synthesize_id(
            Source::Onmap,
            listing_type,
            street.as_deref(),
            price,
            square_meters,
        );

        let mut listing = Listing::new(
            Source::Onmap,
            listing_type,
            external_id,
            IdConfidence::Derived,
        );
        listing.property_type = probe_text(card, TYPE_PROBES)
            .map(|t| t.trim().to_string())
            .or_else(|| Some("Apartment".to_string()));
        listing.address_street = street;
        listing.address_city = city;
        listing.price_current = price;
        listing.rooms = rooms;
        listing.square_meters = square_meters;
        listing.floor = floor;
        listing.parking_spots = u32::from(parking);
        Some(listing)
    }
}

#[async_trait]
impl SourceAdapter for OnmapAdapter {
    fn source(&self) -> Source {
        Source::Onmap
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
            info!("Scraping OnMap {listing_type}...");

            match self.scrape_listing_type(surface, listing_type, limit).await {
                Ok(mut listings) => {
                    // No native city filter; match the extracted city instead
                    if !cities.is_empty() {
                        listings.retain(|l| {
                            l.address_city
                                .as_ref()
                                .map(|city| cities.iter().any(|c| c == city))
                                .unwrap_or(false)
                        });
                    }
                    info!("Scraped {} listings for {listing_type}", listings.len());
                    outcome.listings.extend(listings);
                }
                Err(e) => {
                    warn!("Error scraping {listing_type}: {e:#}");
                    outcome.record_error(listing_type, format!("{e:#}"));
                }
            }

            tokio::time::sleep(self.delay).await;
        }

        Ok(outcome)
    }
}
