//! Persisted lifecycle state for a tracked property.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Listing;

/// Persisted record tracking one listing across scrape cycles.
///
/// Keyed by the listing's external id; at most one record per id, and at
/// most one outstanding notification message per record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackedProperty {
    /// External listing identifier
    pub id: String,

    /// Notification channel (webhook endpoint) this property reports to
    pub channel: String,

    /// Identifier of the one outstanding notification message, if sent
    pub message_id: Option<String>,

    /// Last known asking price
    pub price: i64,

    /// Last known under-offer flag
    pub under_offer: bool,

    /// Display fields snapshotted for artifact edits after the listing
    /// itself is gone
    pub address: String,
    pub property_type: String,
    pub url: String,
    pub image_url: Option<String>,
    pub agent_name: Option<String>,
    pub agent_url: Option<String>,

    /// First and most recent sighting
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,

    /// Still present in the latest scrape
    pub active: bool,

    /// Set once when the listing disappears; cleared if it returns
    pub vanished_at: Option<DateTime<Utc>>,
}

impl TrackedProperty {
    /// Create a record for a listing seen for the first time.
    pub fn from_listing(listing: &Listing, channel: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: listing.id.clone(),
            channel: channel.to_string(),
            message_id: None,
            price: listing.price,
            under_offer: listing.under_offer,
            address: listing.address.clone(),
            property_type: listing.property_type.clone(),
            url: listing.url.clone(),
            image_url: listing.image_url.clone(),
            agent_name: listing.agent_name.clone(),
            agent_url: listing.agent_url.clone(),
            first_seen: now,
            last_seen: now,
            active: true,
            vanished_at: None,
        }
    }

    /// Fold the latest sighting into the record.
    pub fn absorb(&mut self, listing: &Listing, now: DateTime<Utc>) {
        self.price = listing.price;
        self.under_offer = listing.under_offer;
        self.address = listing.address.clone();
        self.property_type = listing.property_type.clone();
        self.url = listing.url.clone();
        self.image_url = listing.image_url.clone();
        self.agent_name = listing.agent_name.clone();
        self.agent_url = listing.agent_url.clone();
        self.last_seen = now;
        self.active = true;
        self.vanished_at = None;
    }

    /// Mark the record inactive. Sets `vanished_at` only on the first
    /// transition.
    pub fn mark_vanished(&mut self, now: DateTime<Utc>) {
        if self.active {
            self.active = false;
            self.vanished_at = Some(now);
        }
    }

    /// Whether the record's retention window has elapsed.
    pub fn past_retention(&self, now: DateTime<Utc>, retention_days: u32) -> bool {
        match self.vanished_at {
            Some(vanished_at) if !self.active => {
                now - vanished_at >= chrono::Duration::days(i64::from(retention_days))
            }
            _ => false,
        }
    }
}
