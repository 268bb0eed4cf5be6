//! Storage abstractions for the persisted property map.
//!
//! Each target owns one map file keyed by listing id. The map is
//! read-modify-written once per cycle; targets have disjoint key spaces and
//! disjoint files, so there is no cross-task write contention.

pub mod local;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::TrackedProperty;

// Re-export for convenience
pub use local::LocalStore;

/// Persisted snapshot of one target's tracked properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyMap {
    /// ISO 8601 timestamp of last write
    pub updated_at: DateTime<Utc>,
    /// Total record count
    pub count: usize,
    /// Records keyed by listing id
    pub properties: HashMap<String, TrackedProperty>,
}

impl PropertyMap {
    pub fn new(properties: HashMap<String, TrackedProperty>) -> Self {
        Self {
            updated_at: Utc::now(),
            count: properties.len(),
            properties,
        }
    }

    /// Empty map for a target seen for the first time.
    pub fn empty() -> Self {
        Self::new(HashMap::new())
    }

    /// Number of records still marked active.
    pub fn active_count(&self) -> usize {
        self.properties.values().filter(|p| p.active).count()
    }
}

/// Trait for property map storage backends.
#[async_trait]
pub trait PropertyStore: Send + Sync {
    /// Load a target's map, or an empty map if none was persisted yet.
    async fn load(&self, target_id: &str) -> Result<PropertyMap>;

    /// Persist a target's map.
    async fn save(&self, target_id: &str, map: &PropertyMap) -> Result<()>;
}
