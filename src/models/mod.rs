use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source site of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Onmap,
    Yad2,
    Madlan,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Onmap => "onmap",
            Source::Yad2 => "yad2",
            Source::Madlan => "madlan",
        }
    }

    /// Base origin used to absolutize relative listing/image URLs
    pub fn base_url(&self) -> &'static str {
        match self {
            Source::Onmap => "https://www.onmap.co.il",
            Source::Yad2 => "https://www.yad2.co.il",
            Source::Madlan => "https://www.madlan.co.il",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of feed being scraped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingType {
    Buy,
    Rent,
    Commercial,
    NewHomes,
}

impl ListingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingType::Buy => "buy",
            ListingType::Rent => "rent",
            ListingType::Commercial => "commercial",
            ListingType::NewHomes => "new_homes",
        }
    }

    /// Parse a configured listing-type tag. Unknown tags yield None; callers
    /// log a warning and skip rather than erroring out.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "buy" => Some(ListingType::Buy),
            "rent" => Some(ListingType::Rent),
            "commercial" => Some(ListingType::Commercial),
            "new_homes" => Some(ListingType::NewHomes),
            _ => None,
        }
    }
}

impl fmt::Display for ListingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How trustworthy the external id is.
///
/// `Stable` ids were read off the card's own hyperlink. `Derived` ids were
/// synthesized from street+price(+area) and can collide between two genuinely
/// distinct listings; consumers should treat those rows as lower confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdConfidence {
    Stable,
    Derived,
}

/// Canonical property listing, normalized across all sources.
///
/// Immutable once extracted; persistence replaces whole records keyed by
/// `(source, external_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub source: Source,
    pub external_id: String,
    pub id_confidence: IdConfidence,
    pub listing_type: ListingType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,

    // Location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_neighborhood: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long: Option<f64>,

    // Pricing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_current: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_original: Option<i64>,
    pub currency: String,

    // Physical attributes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rooms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub square_meters: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building_floors: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_built: Option<i64>,
    pub parking_spots: u32,

    // Media & description
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    // Agent info
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_email: Option<String>,

    // Lifecycle
    pub status: String,
    pub days_on_market: u32,
    pub scraped_at: DateTime<Utc>,
}

impl Listing {
    /// A listing with identity set and everything else at its documented
    /// default (numeric unknowns absent, counts zero, status "active").
    pub fn new(
        source: Source,
        listing_type: ListingType,
        external_id: String,
        id_confidence: IdConfidence,
    ) -> Self {
        Self {
            source,
            external_id,
            id_confidence,
            listing_type,
            property_type: None,
            address_street: None,
            address_city: None,
            address_neighborhood: None,
            lat: None,
            long: None,
            price_current: None,
            price_original: None,
            currency: "ILS".to_string(),
            rooms: None,
            square_meters: None,
            floor: None,
            building_floors: None,
            year_built: None,
            parking_spots: 0,
            images: Vec::new(),
            listing_url: None,
            description: None,
            agent_name: None,
            agent_phone: None,
            agent_email: None,
            status: "active".to_string(),
            days_on_market: 0,
            scraped_at: Utc::now(),
        }
    }
}
