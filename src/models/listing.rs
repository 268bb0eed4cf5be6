//! Scraped listing data structure.

use serde::{Deserialize, Serialize};

/// One property listing extracted from a result page.
///
/// Produced fresh on every scrape cycle and never mutated afterwards;
/// lifecycle state lives on [`TrackedProperty`](crate::models::TrackedProperty).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Listing {
    /// Stable external identifier (portal id, or a hash of the URL)
    pub id: String,

    /// Asking price in whole currency units
    pub price: i64,

    /// Display address
    pub address: String,

    /// Property type line, e.g. "3 bedroom terraced house for sale"
    pub property_type: String,

    /// When the portal first listed it, Unix seconds
    pub listed_at: Option<i64>,

    /// When the portal last touched it (reduction etc.), Unix seconds
    pub updated_at: Option<i64>,

    /// Under offer / sold subject to contract
    pub under_offer: bool,

    /// Full URL of the listing page
    pub url: String,

    /// Main photo URL
    pub image_url: Option<String>,

    /// Listing agent name
    pub agent_name: Option<String>,

    /// Listing agent URL
    pub agent_url: Option<String>,
}

impl Listing {
    /// Short label for log lines.
    pub fn label(&self) -> String {
        format!("{} ({})", self.address, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_includes_address_and_id() {
        let listing = Listing {
            id: "140913088".into(),
            price: 425_000,
            address: "12 Harbour Road, Bristol".into(),
            property_type: "3 bedroom terraced house for sale".into(),
            listed_at: None,
            updated_at: None,
            under_offer: false,
            url: "https://portal.example/properties/140913088".into(),
            image_url: None,
            agent_name: None,
            agent_url: None,
        };
        assert_eq!(listing.label(), "12 Harbour Road, Bristol (140913088)");
    }
}
