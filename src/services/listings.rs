// src/services/listings.rs

//! Listing scraper service.
//!
//! Fetches paginated search results and extracts listings using configured
//! CSS selectors. Banned property-type categories are filtered out before
//! the listings are returned.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Config, Listing, SelectorConfig, TargetConfig};
use crate::utils::http;
use crate::utils::resolve_url;
use crate::utils::url::{listing_id, with_result_offset};

/// Summary of one scrape.
#[derive(Debug, Default)]
pub struct ScrapeOutcome {
    pub listings: Vec<Listing>,
    pub pages_fetched: usize,
    pub filtered_out: usize,
}

/// Service for scraping listings from portal search results.
pub struct ListingScraper {
    config: Arc<Config>,
}

/// Selectors compiled once per scrape.
struct ParsedSelectors {
    card: Selector,
    link: Selector,
    price: Selector,
    address: Selector,
    property_type: Selector,
    status: Selector,
    date: Selector,
    image: Selector,
    agent: Selector,
    result_count: Selector,
}

impl ParsedSelectors {
    fn compile(config: &SelectorConfig) -> Result<Self> {
        Ok(Self {
            card: parse_selector(&config.card)?,
            link: parse_selector(&config.link)?,
            price: parse_selector(&config.price)?,
            address: parse_selector(&config.address)?,
            property_type: parse_selector(&config.property_type)?,
            status: parse_selector(&config.status)?,
            date: parse_selector(&config.date)?,
            image: parse_selector(&config.image)?,
            agent: parse_selector(&config.agent)?,
            result_count: parse_selector(&config.result_count)?,
        })
    }
}

impl ListingScraper {
    /// Create a new listing scraper with the given configuration.
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Scrape all result pages for a target.
    ///
    /// Transport errors, non-success statuses and anti-bot blocks propagate;
    /// the caller logs and aborts the cycle. A page that fetches but yields
    /// no recognizable cards contributes nothing.
    pub async fn scrape(&self, target: &TargetConfig) -> Result<ScrapeOutcome> {
        let scraper_cfg = &self.config.scraper;
        // Fresh client per cycle rotates the User-Agent.
        let client = http::create_async_client(scraper_cfg)?;
        let selectors = ParsedSelectors::compile(&scraper_cfg.selectors)?;
        let base_url = Url::parse(&target.search_url)?;
        let now = Utc::now();
        let delay = Duration::from_millis(scraper_cfg.request_delay_ms);

        // Page one tells us how many results exist.
        let first_body = http::fetch_page(&client, &target.search_url).await?;
        let first = parse_page(&first_body, &selectors, &base_url, now);
        let mut outcome = ScrapeOutcome {
            pages_fetched: 1,
            ..ScrapeOutcome::default()
        };
        let mut buffer = first.listings;

        // Without a result count, a full first page means there may be more.
        let page_size = scraper_cfg.page_size;
        let expected = first
            .result_count
            .unwrap_or(if buffer.len() >= page_size {
                page_size * scraper_cfg.max_pages
            } else {
                buffer.len()
            })
            .min(page_size * scraper_cfg.max_pages);
        let offsets: Vec<usize> = (1..scraper_cfg.max_pages)
            .map(|page| page * page_size)
            .filter(|offset| *offset < expected)
            .collect();

        let mut page_stream = stream::iter(offsets)
            .map(|offset| {
                let client = client.clone();
                let search_url = target.search_url.clone();
                async move {
                    let url = with_result_offset(&search_url, offset)?;
                    let body = http::fetch_page(&client, &url).await?;
                    Ok::<(usize, String), AppError>((offset, body))
                }
            })
            .buffer_unordered(scraper_cfg.max_concurrent.max(1));

        while let Some(result) = page_stream.next().await {
            match result {
                Ok((offset, body)) => {
                    outcome.pages_fetched += 1;
                    let page = parse_page(&body, &selectors, &base_url, now);
                    if page.listings.is_empty() {
                        log::warn!(
                            "No listings parsed at offset {} for {}",
                            offset,
                            target.display_name()
                        );
                    }
                    buffer.extend(page.listings);
                }
                // A blocked page poisons the whole cycle.
                Err(error) if error.is_blocked() => return Err(error),
                Err(error) => {
                    log::warn!(
                        "Failed to fetch page for {}: {}",
                        target.display_name(),
                        error
                    );
                }
            }

            if delay.as_millis() > 0 {
                tokio::time::sleep(delay).await;
            }
        }

        // Featured cards repeat across pages; keep the first sighting.
        let mut seen = HashSet::new();
        let mut deduped = Vec::new();
        for listing in buffer {
            if seen.insert(listing.id.clone()) {
                deduped.push(listing);
            }
        }

        let before = deduped.len();
        deduped.retain(|listing| !self.config.filters.is_banned(&listing.property_type));
        outcome.filtered_out = before - deduped.len();
        if outcome.filtered_out > 0 {
            log::debug!(
                "Filtered {} banned-type listings for {}",
                outcome.filtered_out,
                target.display_name()
            );
        }

        outcome.listings = deduped;
        Ok(outcome)
    }
}

/// Everything extracted from one result page.
struct ParsedPage {
    listings: Vec<Listing>,
    result_count: Option<usize>,
}

/// Parse one result page. Unparseable markup yields an empty page.
fn parse_page(
    body: &str,
    selectors: &ParsedSelectors,
    base_url: &Url,
    now: DateTime<Utc>,
) -> ParsedPage {
    let document = Html::parse_document(body);

    let result_count = document
        .select(&selectors.result_count)
        .next()
        .and_then(|el| parse_count(&text_of(&el)));

    let listings = document
        .select(&selectors.card)
        .filter_map(|card| parse_card(&card, selectors, base_url, now))
        .collect();

    ParsedPage {
        listings,
        result_count,
    }
}

/// Parse a single listing card. Cards missing a link or a price are skipped.
fn parse_card(
    card: &ElementRef,
    selectors: &ParsedSelectors,
    base_url: &Url,
    now: DateTime<Utc>,
) -> Option<Listing> {
    let link_elem = card.select(&selectors.link).next()?;
    let href = link_elem.value().attr("href")?;
    let url = resolve_url(base_url, href);

    let price_text = card
        .select(&selectors.price)
        .next()
        .map(|el| text_of(&el))?;
    let price = parse_price(&price_text)?;

    let address = card
        .select(&selectors.address)
        .next()
        .map(|el| text_of(&el))
        .unwrap_or_default();
    let property_type = card
        .select(&selectors.property_type)
        .next()
        .map(|el| text_of(&el))
        .unwrap_or_default();

    let under_offer = card
        .select(&selectors.status)
        .next()
        .map(|el| is_under_offer(&text_of(&el)))
        .unwrap_or(false);

    let (listed_at, updated_at) = card
        .select(&selectors.date)
        .next()
        .map(|el| parse_added_or_reduced(&text_of(&el), now))
        .unwrap_or((None, None));

    let image_url = card
        .select(&selectors.image)
        .next()
        .and_then(|el| el.value().attr("src"))
        .map(|src| resolve_url(base_url, src));

    let agent_elem = card.select(&selectors.agent).next();
    let agent_url = agent_elem
        .and_then(|el| el.value().attr("href"))
        .map(|href| resolve_url(base_url, href));
    let agent_name = agent_elem
        .and_then(|el| el.value().attr("title"))
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty());

    Some(Listing {
        id: listing_id(&url),
        price,
        address,
        property_type,
        listed_at,
        updated_at,
        under_offer,
        url,
        image_url,
        agent_name,
        agent_url,
    })
}

/// Collect an element's text with normalized whitespace.
fn text_of(element: &ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a price string like "£425,000" into whole currency units.
///
/// Returns `None` for unpriced listings ("POA").
fn parse_price(text: &str) -> Option<i64> {
    let re = Regex::new(r"(\d[\d,]*)").ok()?;
    let captures = re.captures(text)?;
    captures
        .get(1)?
        .as_str()
        .replace(',', "")
        .parse::<i64>()
        .ok()
}

/// Parse a result-count string like "1,204 properties".
fn parse_count(text: &str) -> Option<usize> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

/// Whether a status badge means the listing is under offer.
fn is_under_offer(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("under offer") || lower.contains("sold")
}

/// Parse the "Added on 01/08/2026" / "Reduced yesterday" line into
/// (listed_at, updated_at) Unix timestamps.
fn parse_added_or_reduced(text: &str, now: DateTime<Utc>) -> (Option<i64>, Option<i64>) {
    let lower = text.to_lowercase();
    let date = if lower.contains("today") {
        Some(now.date_naive())
    } else if lower.contains("yesterday") {
        Some(now.date_naive() - chrono::Duration::days(1))
    } else {
        lower
            .split_whitespace()
            .find_map(|word| NaiveDate::parse_from_str(word, "%d/%m/%Y").ok())
    };

    let timestamp = date
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp());

    if lower.contains("reduced") {
        (None, timestamp)
    } else {
        (timestamp, None)
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
