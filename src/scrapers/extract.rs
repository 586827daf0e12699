//! Shared field-extraction machinery.
//!
//! Every source has its own markup vocabulary, but the control logic is the
//! same everywhere: an ordered set of probes per field, first match wins, no
//! match leaves the field absent. Number parsing strips everything that is
//! not a digit, so `"₪1,250,000"` and `"1 250 000 ₪"` both come out as
//! 1250000; a probe that yields no digits produces an absent value, never an
//! error.

use scraper::{ElementRef, Selector};

use crate::models::{ListingType, Source};

/// One way of locating a field's text inside a listing card.
#[derive(Debug, Clone, Copy)]
pub enum Probe {
    /// First descendant element whose class attribute contains `fragment`
    /// (optionally constrained to a tag). Class names shift between site
    /// deploys, so fragments are matched, never full names.
    Class {
        tag: Option<&'static str>,
        fragment: &'static str,
    },
    /// First text chunk containing a unit marker (e.g. `מ"ר`, `חדרים`).
    Marker { marker: &'static str },
    /// First text chunk containing a currency symbol.
    Currency { symbol: &'static str },
}

/// Run probes in order against one card; first match wins.
pub fn probe_text(card: ElementRef<'_>, probes: &[Probe]) -> Option<String> {
    for &probe in probes {
        let hit = match probe {
            Probe::Class { tag, fragment } => {
                let selector = format!("{}[class*=\"{}\"]", tag.unwrap_or(""), fragment);
                Selector::parse(&selector).ok().and_then(|sel| {
                    card.select(&sel)
                        .next()
                        .map(|el| el.text().collect::<String>())
                })
            }
            Probe::Marker { marker } => card
                .text()
                .find(|chunk| chunk.contains(marker))
                .map(|chunk| chunk.to_string()),
            Probe::Currency { symbol } => card
                .text()
                .find(|chunk| chunk.contains(symbol))
                .map(|chunk| chunk.to_string()),
        };
        match hit {
            Some(text) if !text.trim().is_empty() => return Some(text),
            _ => continue,
        }
    }
    None
}

/// The card's own hyperlink: the card element itself when it is an anchor,
/// otherwise its first `<a href>` descendant.
pub fn first_href(card: ElementRef<'_>) -> Option<String> {
    if let Some(href) = card.value().attr("href") {
        return Some(href.to_string());
    }
    let sel = Selector::parse("a[href]").unwrap();
    card.select(&sel)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

/// Strip every non-digit and parse. `None` when no digits survive.
pub fn digits(text: &str) -> Option<i64> {
    let cleaned: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

/// Numeric token (digits, `.` or `,` decimal separator) immediately before
/// `marker` in `text`. Used for `"3.5 חדרים"`-style unit-suffixed values.
pub fn number_before(text: &str, marker: &str) -> Option<f64> {
    let prefix = text.split(marker).next()?.trim_end();
    let token: String = prefix
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if token.is_empty() {
        return None;
    }
    token.replace(',', ".").parse().ok()
}

/// Numeric token following `marker`, for prefix-marked values like
/// `"קומה 3"` (floor 3).
pub fn number_after(text: &str, marker: &str) -> Option<i64> {
    let suffix = text.split(marker).nth(1)?;
    let token: String = suffix
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    token.parse().ok()
}

/// First numeric token in free text, decimal point kept ("3.5 rooms" → 3.5).
pub fn first_decimal(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let token: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    token.trim_end_matches('.').parse().ok()
}

/// Decompose a combined address: the last comma-separated segment is treated
/// as the city, the remainder (re-joined) as the street. A heuristic, not a
/// guarantee.
pub fn split_address(raw: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = raw.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
    match parts.as_slice() {
        [] => (None, None),
        [only] => (Some(only.to_string()), None),
        [street @ .., city] => (Some(street.join(", ")), Some(city.to_string())),
    }
}

/// Numeric id from the final path segment of a card hyperlink, when present.
/// Query strings and fragments are ignored.
pub fn trailing_path_id(href: &str) -> Option<String> {
    let path = href.split(|c| c == '?' || c == '#').next()?;
    let segment = path.rsplit('/').find(|s| !s.is_empty())?;
    if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
        Some(segment.to_string())
    } else {
        None
    }
}

/// Numeric id following a known path segment, e.g.
/// `id_after_segment("/listing/998877-dizengoff", "/listing/")` → `998877`.
pub fn id_after_segment(href: &str, segment: &str) -> Option<String> {
    let rest = href.split(segment).nth(1)?;
    let id: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Deterministic fallback id for cards without an id-bearing hyperlink.
/// Collision-prone by construction; callers mark the listing `Derived`.
pub fn synthesize_id(
    source: Source,
    listing_type: ListingType,
    street: Option<&str>,
    price: Option<i64>,
    square_meters: Option<i64>,
) -> String {
    let mut id = format!(
        "{}_{}_{}_{}",
        source,
        listing_type,
        street.unwrap_or("unknown"),
        price.map(|p| p.to_string()).unwrap_or_else(|| "na".to_string()),
    );
    if let Some(sqm) = square_meters {
        id.push('_');
        id.push_str(&sqm.to_string());
    }
    id
}

/// Rewrite a relative URL against the source's base origin.
pub fn absolutize(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", base.trim_end_matches('/'), href)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), href)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn card(html: &str) -> Html {
        Html::parse_fragment(html)
    }

    #[test]
    fn digits_strips_currency_and_grouping() {
        assert_eq!(digits("₪1,250,000"), Some(1_250_000));
        assert_eq!(digits("1 250 000 ₪"), Some(1_250_000));
        assert_eq!(digits("price on request"), None);
        assert_eq!(digits(""), None);
    }

    #[test]
    fn number_before_handles_fractional_rooms() {
        assert_eq!(number_before("3.5 חדרים", "חדרים"), Some(3.5));
        assert_eq!(number_before("3,5 חדרים", "חדרים"), Some(3.5));
        assert_eq!(number_before("85 מ\"ר", "מ\"ר"), Some(85.0));
        assert_eq!(number_before("חדרים", "חדרים"), None);
    }

    #[test]
    fn number_after_reads_prefix_marked_floor() {
        assert_eq!(number_after("קומה 3", "קומה"), Some(3));
        assert_eq!(number_after("קומה 12 מתוך 20", "קומה"), Some(12));
        assert_eq!(number_after("קרקע", "קומה"), None);
    }

    #[test]
    fn split_address_takes_last_segment_as_city() {
        assert_eq!(
            split_address("Rothschild 12, Tel Aviv"),
            (Some("Rothschild 12".to_string()), Some("Tel Aviv".to_string()))
        );
        // Remainder is re-joined when more than two segments are present
        assert_eq!(
            split_address("Herzl 5, Florentin, Tel Aviv"),
            (Some("Herzl 5, Florentin".to_string()), Some("Tel Aviv".to_string()))
        );
        assert_eq!(split_address("Herzl 5"), (Some("Herzl 5".to_string()), None));
        assert_eq!(split_address(""), (None, None));
    }

    #[test]
    fn first_decimal_finds_leading_token() {
        assert_eq!(first_decimal("3.5"), Some(3.5));
        assert_eq!(first_decimal("about 4 rooms"), Some(4.0));
        assert_eq!(first_decimal("no numbers"), None);
    }

    #[test]
    fn id_after_segment_reads_digits_only() {
        assert_eq!(
            id_after_segment("/listing/998877-dizengoff-1", "/listing/"),
            Some("998877".to_string())
        );
        assert_eq!(id_after_segment("/listing/abc", "/listing/"), None);
        assert_eq!(id_after_segment("/other/12", "/listing/"), None);
    }

    #[test]
    fn trailing_path_id_requires_numeric_segment() {
        assert_eq!(trailing_path_id("/item/4821734"), Some("4821734".to_string()));
        assert_eq!(
            trailing_path_id("https://www.madlan.co.il/listing/998877?utm=x"),
            Some("998877".to_string())
        );
        assert_eq!(trailing_path_id("/item/4821734/"), Some("4821734".to_string()));
        assert_eq!(trailing_path_id("/realestate/forsale"), None);
        assert_eq!(trailing_path_id(""), None);
    }

    #[test]
    fn synthesized_id_is_deterministic() {
        let a = synthesize_id(Source::Yad2, ListingType::Buy, Some("Herzl 5"), Some(2_000_000), None);
        let b = synthesize_id(Source::Yad2, ListingType::Buy, Some("Herzl 5"), Some(2_000_000), None);
        assert_eq!(a, b);
        assert_eq!(a, "yad2_buy_Herzl 5_2000000");

        let with_area =
            synthesize_id(Source::Onmap, ListingType::Rent, Some("Dizengoff 1"), Some(6500), Some(70));
        assert_eq!(with_area, "onmap_rent_Dizengoff 1_6500_70");
    }

    #[test]
    fn absolutize_rewrites_relative_urls_only() {
        assert_eq!(
            absolutize("https://www.yad2.co.il", "/item/123"),
            "https://www.yad2.co.il/item/123"
        );
        assert_eq!(
            absolutize("https://www.yad2.co.il/", "item/123"),
            "https://www.yad2.co.il/item/123"
        );
        assert_eq!(absolutize("https://www.yad2.co.il", "https://cdn.example/img.jpg"), "https://cdn.example/img.jpg");
    }

    #[test]
    fn probes_match_in_order_and_fall_through() {
        let doc = card(
            r#"<div class="feed-item">
                 <div class="item-price-box">₪1,250,000</div>
                 <span>3.5 חדרים</span>
               </div>"#,
        );
        let root = doc.root_element();

        // Class fragment wins before the currency fallback
        let price = probe_text(
            root,
            &[
                Probe::Class { tag: Some("div"), fragment: "price" },
                Probe::Currency { symbol: "₪" },
            ],
        );
        assert_eq!(digits(&price.unwrap()), Some(1_250_000));

        // Missing class falls through to the marker probe
        let rooms = probe_text(
            root,
            &[
                Probe::Class { tag: Some("div"), fragment: "rooms" },
                Probe::Marker { marker: "חדרים" },
            ],
        );
        assert_eq!(number_before(&rooms.unwrap(), "חדרים"), Some(3.5));

        // No probe matching leaves the field absent
        let agent = probe_text(root, &[Probe::Class { tag: None, fragment: "agent" }]);
        assert!(agent.is_none());
    }
}
