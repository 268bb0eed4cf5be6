//! Diff calculation for listing lifecycle events.
//!
//! Compares the persisted property map against the latest scrape to
//! identify newly appeared, changed, returned and vanished listings for
//! notification dispatch.

use std::collections::{HashMap, HashSet};

use crate::models::{Listing, TrackedProperty};

/// A listing whose price or offer status moved since the last cycle.
#[derive(Debug, Clone)]
pub struct UpdatedListing {
    pub listing: Listing,
    pub previous_price: i64,
    pub was_under_offer: bool,
}

impl UpdatedListing {
    /// Price moved downwards.
    pub fn is_reduction(&self) -> bool {
        self.listing.price < self.previous_price
    }
}

/// Partitioned outcome of one diff.
#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    /// Listings never tracked before
    pub new: Vec<Listing>,
    /// Tracked listings whose price or under-offer flag changed
    pub updated: Vec<UpdatedListing>,
    /// Previously vanished listings present again
    pub back_on_market: Vec<Listing>,
    /// Ids of active records absent from this scrape
    pub vanished: Vec<String>,
}

impl DiffResult {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.new.is_empty()
            || !self.updated.is_empty()
            || !self.back_on_market.is_empty()
            || !self.vanished.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        self.new.len() + self.updated.len() + self.back_on_market.len() + self.vanished.len()
    }
}

/// Calculator for diffing a scrape against the tracked map.
#[derive(Debug, Clone, Default)]
pub struct DiffCalculator;

impl DiffCalculator {
    /// Create a new diff calculator.
    pub fn new() -> Self {
        Self
    }

    /// Partition `current` against `previous`.
    ///
    /// A listing present in both with identical price and flags produces no
    /// event. Only records still marked active can vanish, so a listing
    /// absent for a second cycle emits nothing.
    pub fn calculate(
        &self,
        previous: &HashMap<String, TrackedProperty>,
        current: &[Listing],
    ) -> DiffResult {
        let mut result = DiffResult::default();
        let current_ids: HashSet<&str> = current.iter().map(|l| l.id.as_str()).collect();

        for listing in current {
            match previous.get(&listing.id) {
                None => result.new.push(listing.clone()),
                Some(tracked) if !tracked.active => {
                    result.back_on_market.push(listing.clone());
                }
                Some(tracked)
                    if tracked.price != listing.price
                        || tracked.under_offer != listing.under_offer =>
                {
                    result.updated.push(UpdatedListing {
                        listing: listing.clone(),
                        previous_price: tracked.price,
                        was_under_offer: tracked.under_offer,
                    });
                }
                Some(_) => {}
            }
        }

        result.vanished = previous
            .values()
            .filter(|tracked| tracked.active && !current_ids.contains(tracked.id.as_str()))
            .map(|tracked| tracked.id.clone())
            .collect();
        result.vanished.sort();

        result
    }
}

/// Convenience function to calculate a diff.
pub fn calculate_diff(
    previous: &HashMap<String, TrackedProperty>,
    current: &[Listing],
) -> DiffResult {
    DiffCalculator::new().calculate(previous, current)
}
