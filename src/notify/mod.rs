//! Notification dispatch.
//!
//! The dispatcher keeps exactly one visible notification per tracked
//! property: created on first sight, edited in place on every later event,
//! and deleted when the retention sweep drops the record. [`Notifier`] is
//! the delivery boundary; [`WebhookNotifier`] is the production
//! implementation.

pub mod webhook;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::Result;
use crate::models::{Listing, TrackedProperty};
use crate::pipeline::UpdatedListing;

pub use webhook::WebhookNotifier;

/// Embed accent colors per event kind.
const COLOR_NEW: u32 = 0x2E_CC71;
const COLOR_REDUCED: u32 = 0xE6_7E22;
const COLOR_CHANGED: u32 = 0x34_98DB;
const COLOR_RETURNED: u32 = 0x1A_BC9C;
const COLOR_VANISHED: u32 = 0x95_A5A6;

/// One rendered notification artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub url: Option<String>,
    pub color: u32,
    pub image_url: Option<String>,
}

impl Notification {
    /// Webhook payload with a single embed.
    pub fn to_json(&self) -> Value {
        let mut embed = json!({
            "title": self.title,
            "description": self.description,
            "color": self.color,
        });
        if let Some(url) = &self.url {
            embed["url"] = json!(url);
        }
        if let Some(image_url) = &self.image_url {
            embed["image"] = json!({ "url": image_url });
        }
        json!({ "embeds": [embed] })
    }
}

/// Delivery boundary for notification artifacts.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Create an artifact on a channel, returning its message id.
    async fn post(&self, channel: &str, note: &Notification) -> Result<String>;

    /// Replace an existing artifact in place.
    async fn edit(&self, channel: &str, message_id: &str, note: &Notification) -> Result<()>;

    /// Remove an artifact.
    async fn delete(&self, channel: &str, message_id: &str) -> Result<()>;
}

/// Render a newly listed property.
pub fn for_new(listing: &Listing) -> Notification {
    let mut description = format!("**{}**\n{}", format_price(listing.price), listing.property_type);
    if listing.under_offer {
        description.push_str("\nUnder offer");
    }
    if let Some(agent) = &listing.agent_name {
        description.push_str(&format!("\nListed by {agent}"));
    }
    Notification {
        title: listing.address.clone(),
        description,
        url: Some(listing.url.clone()),
        color: COLOR_NEW,
        image_url: listing.image_url.clone(),
    }
}

/// Render a price or offer-status change.
pub fn for_updated(updated: &UpdatedListing) -> Notification {
    let listing = &updated.listing;
    let mut lines = Vec::new();

    if listing.price != updated.previous_price {
        let verb = if updated.is_reduction() {
            "Reduced"
        } else {
            "Raised"
        };
        lines.push(format!(
            "**{}** ({verb} from {})",
            format_price(listing.price),
            format_price(updated.previous_price)
        ));
    } else {
        lines.push(format!("**{}**", format_price(listing.price)));
    }
    lines.push(listing.property_type.clone());

    if listing.under_offer && !updated.was_under_offer {
        lines.push("Now under offer".to_string());
    } else if !listing.under_offer && updated.was_under_offer {
        lines.push("No longer under offer".to_string());
    } else if listing.under_offer {
        lines.push("Under offer".to_string());
    }

    Notification {
        title: listing.address.clone(),
        description: lines.join("\n"),
        url: Some(listing.url.clone()),
        color: if updated.is_reduction() {
            COLOR_REDUCED
        } else {
            COLOR_CHANGED
        },
        image_url: listing.image_url.clone(),
    }
}

/// Render a listing that returned after vanishing.
pub fn for_back_on_market(listing: &Listing) -> Notification {
    let mut note = for_new(listing);
    note.description = format!("Back on the market\n{}", note.description);
    note.color = COLOR_RETURNED;
    note
}

/// Render a vanished property from its tracked snapshot.
pub fn for_vanished(tracked: &TrackedProperty) -> Notification {
    Notification {
        title: tracked.address.clone(),
        description: format!(
            "No longer listed\nLast seen at **{}**",
            format_price(tracked.price)
        ),
        url: Some(tracked.url.clone()),
        color: COLOR_VANISHED,
        image_url: tracked.image_url.clone(),
    }
}

/// Format a whole-unit price with thousands separators.
fn format_price(price: i64) -> String {
    let digits = price.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if price < 0 {
        format!("-£{grouped}")
    } else {
        format!("£{grouped}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_listing() -> Listing {
        Listing {
            id: "140913088".into(),
            price: 425_000,
            address: "12 Harbour Road, Bristol".into(),
            property_type: "3 bedroom terraced house for sale".into(),
            listed_at: None,
            updated_at: None,
            under_offer: false,
            url: "https://portal.example/properties/140913088".into(),
            image_url: Some("https://portal.example/media/1.jpg".into()),
            agent_name: Some("Hart & Co".into()),
            agent_url: None,
        }
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(950), "£950");
        assert_eq!(format_price(425_000), "£425,000");
        assert_eq!(format_price(1_250_000), "£1,250,000");
    }

    #[test]
    fn test_for_new_renders_price_and_agent() {
        let note = for_new(&sample_listing());
        assert_eq!(note.title, "12 Harbour Road, Bristol");
        assert!(note.description.contains("£425,000"));
        assert!(note.description.contains("Listed by Hart & Co"));
        assert_eq!(note.color, COLOR_NEW);
    }

    #[test]
    fn test_for_updated_reduction() {
        let updated = UpdatedListing {
            listing: Listing {
                price: 399_950,
                ..sample_listing()
            },
            previous_price: 425_000,
            was_under_offer: false,
        };
        let note = for_updated(&updated);
        assert!(note.description.contains("Reduced from £425,000"));
        assert_eq!(note.color, COLOR_REDUCED);
    }

    #[test]
    fn test_for_updated_offer_flag_only() {
        let updated = UpdatedListing {
            listing: Listing {
                under_offer: true,
                ..sample_listing()
            },
            previous_price: 425_000,
            was_under_offer: false,
        };
        let note = for_updated(&updated);
        assert!(note.description.contains("Now under offer"));
        assert_eq!(note.color, COLOR_CHANGED);
    }

    #[test]
    fn test_for_vanished_uses_snapshot() {
        let tracked = TrackedProperty::from_listing(&sample_listing(), "hook", Utc::now());
        let note = for_vanished(&tracked);
        assert!(note.description.contains("No longer listed"));
        assert!(note.description.contains("£425,000"));
        assert_eq!(note.color, COLOR_VANISHED);
    }

    #[test]
    fn test_to_json_shape() {
        let note = for_new(&sample_listing());
        let payload = note.to_json();
        assert_eq!(payload["embeds"][0]["title"], "12 Harbour Road, Bristol");
        assert_eq!(
            payload["embeds"][0]["image"]["url"],
            "https://portal.example/media/1.jpg"
        );
        assert!(payload["embeds"][0]["color"].is_u64());
    }
}
