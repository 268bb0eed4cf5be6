// src/pipeline/cycle.rs

//! One scrape cycle: fetch, guard, diff, dispatch, sweep, persist.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Config, TargetConfig, TrackedProperty};
use crate::notify::{self, Notification, Notifier};
use crate::pipeline::diff::calculate_diff;
use crate::pipeline::guard::{ScrapeGuard, ScrapeGuardConfig};
use crate::services::ListingScraper;
use crate::storage::{PropertyMap, PropertyStore};

/// Summary of one cycle.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    pub scraped: usize,
    pub new: usize,
    pub updated: usize,
    pub back_on_market: usize,
    pub vanished: usize,
    pub swept: usize,
    /// The scrape guard rejected the result set; nothing changed
    pub skipped: bool,
}

impl CycleOutcome {
    pub fn event_count(&self) -> usize {
        self.new + self.updated + self.back_on_market + self.vanished
    }
}

/// Run one full cycle for a target.
///
/// Transport, parse-level and blocked errors propagate so the watch loop
/// can log and pick the next delay; a guard rejection is a quiet skip.
pub async fn run_cycle(
    config: &Config,
    target: &TargetConfig,
    scraper: &ListingScraper,
    store: &dyn PropertyStore,
    notifier: &dyn Notifier,
) -> Result<CycleOutcome> {
    let map = store.load(&target.id).await?;
    let scrape = scraper.scrape(target).await?;

    let (map, outcome) = apply_cycle(
        config,
        target,
        map,
        scrape.listings,
        notifier,
        Utc::now(),
    )
    .await;

    if !outcome.skipped {
        store.save(&target.id, &map).await?;
    }

    log::info!(
        "Cycle for {}: {} scraped, {} new, {} updated, {} returned, {} vanished, {} swept{}",
        target.display_name(),
        outcome.scraped,
        outcome.new,
        outcome.updated,
        outcome.back_on_market,
        outcome.vanished,
        outcome.swept,
        if outcome.skipped { " (skipped)" } else { "" },
    );

    Ok(outcome)
}

/// Apply a scraped listing set to the tracked map and dispatch events.
///
/// Pure of I/O apart from notification delivery, which is best-effort:
/// failures are logged and dropped, never fatal to the cycle.
pub(crate) async fn apply_cycle(
    config: &Config,
    target: &TargetConfig,
    mut map: PropertyMap,
    listings: Vec<crate::models::Listing>,
    notifier: &dyn Notifier,
    now: DateTime<Utc>,
) -> (PropertyMap, CycleOutcome) {
    let mut outcome = CycleOutcome {
        scraped: listings.len(),
        ..CycleOutcome::default()
    };

    let guard = ScrapeGuard::with_config(ScrapeGuardConfig {
        max_drop_percent: config.tracking.max_drop_percent,
        min_baseline: config.tracking.min_baseline,
    });
    if let Err(error) = guard.validate(target.display_name(), listings.len(), map.active_count())
    {
        log::warn!("Skipping cycle: {error}");
        outcome.skipped = true;
        return (map, outcome);
    }

    let diff = calculate_diff(&map.properties, &listings);
    outcome.new = diff.new.len();
    outcome.updated = diff.updated.len();
    outcome.back_on_market = diff.back_on_market.len();
    outcome.vanished = diff.vanished.len();

    for listing in &diff.new {
        let mut tracked = TrackedProperty::from_listing(listing, &target.webhook_url, now);
        deliver(notifier, &mut tracked, &notify::for_new(listing)).await;
        map.properties.insert(tracked.id.clone(), tracked);
    }

    for updated in &diff.updated {
        if let Some(tracked) = map.properties.get_mut(&updated.listing.id) {
            tracked.absorb(&updated.listing, now);
            deliver(notifier, tracked, &notify::for_updated(updated)).await;
        }
    }

    for listing in &diff.back_on_market {
        if let Some(tracked) = map.properties.get_mut(&listing.id) {
            tracked.absorb(listing, now);
            deliver(notifier, tracked, &notify::for_back_on_market(listing)).await;
        }
    }

    for id in &diff.vanished {
        if let Some(tracked) = map.properties.get_mut(id) {
            tracked.mark_vanished(now);
            let note = notify::for_vanished(tracked);
            deliver(notifier, tracked, &note).await;
        }
    }

    // Unchanged sightings still refresh the bookkeeping.
    for listing in &listings {
        if let Some(tracked) = map.properties.get_mut(&listing.id) {
            if tracked.active {
                tracked.last_seen = now;
            }
        }
    }

    outcome.swept = sweep_map(
        &mut map.properties,
        config.tracking.retention_days,
        notifier,
        now,
    )
    .await;

    (PropertyMap::new(map.properties), outcome)
}

/// Run only the retention sweep for a target.
pub async fn run_sweep(
    config: &Config,
    target: &TargetConfig,
    store: &dyn PropertyStore,
    notifier: &dyn Notifier,
) -> Result<usize> {
    let mut map = store.load(&target.id).await?;
    let swept = sweep_map(
        &mut map.properties,
        config.tracking.retention_days,
        notifier,
        Utc::now(),
    )
    .await;
    if swept > 0 {
        store.save(&target.id, &PropertyMap::new(map.properties)).await?;
    }
    log::info!("Sweep for {}: {} records removed", target.display_name(), swept);
    Ok(swept)
}

/// Delete records past the retention window along with their artifacts.
async fn sweep_map(
    properties: &mut HashMap<String, TrackedProperty>,
    retention_days: u32,
    notifier: &dyn Notifier,
    now: DateTime<Utc>,
) -> usize {
    let expired: Vec<String> = properties
        .values()
        .filter(|tracked| tracked.past_retention(now, retention_days))
        .map(|tracked| tracked.id.clone())
        .collect();

    for id in &expired {
        if let Some(tracked) = properties.remove(id) {
            if let Some(message_id) = &tracked.message_id {
                if let Err(error) = notifier.delete(&tracked.channel, message_id).await {
                    log::warn!("Failed to delete notification for {id}: {error}");
                }
            }
            log::debug!("Swept {} ({})", tracked.address, id);
        }
    }
    expired.len()
}

/// Create or edit the one artifact for a record.
///
/// A record whose earlier post failed has no message id yet; the next event
/// posts instead of editing, restoring the one-artifact invariant.
async fn deliver(notifier: &dyn Notifier, tracked: &mut TrackedProperty, note: &Notification) {
    match &tracked.message_id {
        Some(message_id) => {
            if let Err(error) = notifier.edit(&tracked.channel, message_id, note).await {
                log::warn!("Failed to edit notification for {}: {error}", tracked.id);
            }
        }
        None => match notifier.post(&tracked.channel, note).await {
            Ok(message_id) => tracked.message_id = Some(message_id),
            Err(error) => {
                log::warn!("Failed to post notification for {}: {error}", tracked.id);
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::Listing;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Post(String),
        Edit(String, String),
        Delete(String),
    }

    /// Records delivery calls; fails every call when `fail` is set.
    #[derive(Default)]
    struct MockNotifier {
        calls: Mutex<Vec<Call>>,
        fail: bool,
        next_id: Mutex<u64>,
    }

    impl MockNotifier {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn post(&self, _channel: &str, note: &Notification) -> Result<String> {
            if self.fail {
                return Err(AppError::notify("mock failure"));
            }
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            let id = next.to_string();
            self.calls
                .lock()
                .unwrap()
                .push(Call::Post(note.title.clone()));
            Ok(id)
        }

        async fn edit(&self, _channel: &str, message_id: &str, note: &Notification) -> Result<()> {
            if self.fail {
                return Err(AppError::notify("mock failure"));
            }
            self.calls
                .lock()
                .unwrap()
                .push(Call::Edit(message_id.to_string(), note.title.clone()));
            Ok(())
        }

        async fn delete(&self, _channel: &str, message_id: &str) -> Result<()> {
            if self.fail {
                return Err(AppError::notify("mock failure"));
            }
            self.calls
                .lock()
                .unwrap()
                .push(Call::Delete(message_id.to_string()));
            Ok(())
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.tracking.min_baseline = 3;
        config.tracking.retention_days = 14;
        config
    }

    fn test_target() -> TargetConfig {
        TargetConfig {
            id: "bristol".into(),
            search_url: "https://portal.example/find?area=BS1".into(),
            webhook_url: "https://hooks.example/abc".into(),
            name: None,
        }
    }

    fn make_listing(id: &str, price: i64) -> Listing {
        Listing {
            id: id.to_string(),
            price,
            address: format!("{id} Test Street"),
            property_type: "3 bedroom terraced house for sale".into(),
            listed_at: None,
            updated_at: None,
            under_offer: false,
            url: format!("https://portal.example/properties/{id}"),
            image_url: None,
            agent_name: None,
            agent_url: None,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_first_sight_posts_then_unchanged_is_silent() {
        let config = test_config();
        let target = test_target();
        let notifier = MockNotifier::default();
        let listings = vec![make_listing("001", 425_000)];

        let (map, outcome) = apply_cycle(
            &config,
            &target,
            PropertyMap::empty(),
            listings.clone(),
            &notifier,
            at(0),
        )
        .await;
        assert_eq!(outcome.new, 1);
        assert_eq!(map.properties["001"].message_id.as_deref(), Some("1"));

        // Same scrape again: no events, no delivery calls.
        let (map, outcome) =
            apply_cycle(&config, &target, map, listings, &notifier, at(600)).await;
        assert_eq!(outcome.event_count(), 0);
        assert_eq!(notifier.calls().len(), 1);
        assert_eq!(map.properties["001"].last_seen, at(600));
    }

    #[tokio::test]
    async fn test_price_change_edits_same_artifact() {
        let config = test_config();
        let target = test_target();
        let notifier = MockNotifier::default();

        let (map, _) = apply_cycle(
            &config,
            &target,
            PropertyMap::empty(),
            vec![make_listing("001", 425_000)],
            &notifier,
            at(0),
        )
        .await;

        let (map, outcome) = apply_cycle(
            &config,
            &target,
            map,
            vec![make_listing("001", 399_950)],
            &notifier,
            at(600),
        )
        .await;

        assert_eq!(outcome.updated, 1);
        assert_eq!(map.properties["001"].price, 399_950);
        let calls = notifier.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[1], Call::Edit(id, _) if id == "1"));
    }

    #[tokio::test]
    async fn test_vanish_marks_inactive_exactly_once() {
        let config = test_config();
        let target = test_target();
        let notifier = MockNotifier::default();

        let (map, _) = apply_cycle(
            &config,
            &target,
            PropertyMap::empty(),
            vec![make_listing("001", 425_000)],
            &notifier,
            at(0),
        )
        .await;

        let (map, outcome) =
            apply_cycle(&config, &target, map, vec![], &notifier, at(600)).await;
        assert_eq!(outcome.vanished, 1);
        assert!(!map.properties["001"].active);
        assert_eq!(map.properties["001"].vanished_at, Some(at(600)));

        // Still absent: no further events, timestamp untouched.
        let (map, outcome) =
            apply_cycle(&config, &target, map, vec![], &notifier, at(1200)).await;
        assert_eq!(outcome.event_count(), 0);
        assert_eq!(map.properties["001"].vanished_at, Some(at(600)));
        assert_eq!(notifier.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_back_on_market_reactivates() {
        let config = test_config();
        let target = test_target();
        let notifier = MockNotifier::default();
        let listing = make_listing("001", 425_000);

        let (map, _) = apply_cycle(
            &config,
            &target,
            PropertyMap::empty(),
            vec![listing.clone()],
            &notifier,
            at(0),
        )
        .await;
        let (map, _) = apply_cycle(&config, &target, map, vec![], &notifier, at(600)).await;

        let (map, outcome) =
            apply_cycle(&config, &target, map, vec![listing], &notifier, at(1200)).await;
        assert_eq!(outcome.back_on_market, 1);
        assert!(map.properties["001"].active);
        assert!(map.properties["001"].vanished_at.is_none());
        // Created once, edited twice, never re-posted.
        let calls = notifier.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(&calls[2], Call::Edit(id, _) if id == "1"));
    }

    #[tokio::test]
    async fn test_sweep_deletes_record_and_artifact() {
        let config = test_config();
        let target = test_target();
        let notifier = MockNotifier::default();
        let day = 86_400;

        let (map, _) = apply_cycle(
            &config,
            &target,
            PropertyMap::empty(),
            vec![make_listing("001", 425_000)],
            &notifier,
            at(0),
        )
        .await;
        let (map, _) = apply_cycle(&config, &target, map, vec![], &notifier, at(day)).await;

        // Fifteen days after vanishing: the record and its artifact go.
        let (map, outcome) =
            apply_cycle(&config, &target, map, vec![], &notifier, at(16 * day)).await;
        assert_eq!(outcome.swept, 1);
        assert!(map.properties.is_empty());
        assert!(notifier.calls().contains(&Call::Delete("1".to_string())));

        // Gone means gone: later empty scrapes emit nothing.
        let calls_before = notifier.calls().len();
        let (_, outcome) =
            apply_cycle(&config, &target, map, vec![], &notifier, at(17 * day)).await;
        assert_eq!(outcome.event_count(), 0);
        assert_eq!(notifier.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn test_guard_skips_collapsed_scrape() {
        let config = test_config();
        let target = test_target();
        let notifier = MockNotifier::default();
        let listings: Vec<Listing> = (0..20)
            .map(|i| make_listing(&format!("{i:03}"), 300_000))
            .collect();

        let (map, _) = apply_cycle(
            &config,
            &target,
            PropertyMap::empty(),
            listings,
            &notifier,
            at(0),
        )
        .await;

        let (map, outcome) = apply_cycle(
            &config,
            &target,
            map,
            vec![make_listing("000", 300_000)],
            &notifier,
            at(600),
        )
        .await;

        assert!(outcome.skipped);
        assert_eq!(outcome.event_count(), 0);
        assert_eq!(map.active_count(), 20);
    }

    #[tokio::test]
    async fn test_delivery_failure_never_fails_the_cycle() {
        let config = test_config();
        let target = test_target();
        let notifier = MockNotifier::failing();

        let (map, outcome) = apply_cycle(
            &config,
            &target,
            PropertyMap::empty(),
            vec![make_listing("001", 425_000)],
            &notifier,
            at(0),
        )
        .await;

        assert_eq!(outcome.new, 1);
        let tracked = &map.properties["001"];
        assert!(tracked.message_id.is_none());

        // Recovery: the next event posts instead of editing.
        let working = MockNotifier::default();
        let (map, _) = apply_cycle(
            &config,
            &target,
            map,
            vec![make_listing("001", 399_950)],
            &working,
            at(600),
        )
        .await;
        assert_eq!(map.properties["001"].message_id.as_deref(), Some("1"));
        assert!(matches!(&working.calls()[0], Call::Post(_)));
    }
}
