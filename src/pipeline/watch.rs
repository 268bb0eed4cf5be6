// src/pipeline/watch.rs

//! Cooperative watch loops.
//!
//! One loop per target: sleep the planned interval, run a cycle, repeat
//! until shutdown. Loops share a semaphore capping simultaneous outbound
//! scrapes. Cancellation lands before the next sleep; an in-flight cycle is
//! awaited to completion, never aborted.

use std::sync::Arc;

use chrono::Local;
use tokio::sync::{Semaphore, watch};

use crate::error::Result;
use crate::models::{Config, TargetConfig};
use crate::notify::Notifier;
use crate::pipeline::cycle::run_cycle;
use crate::pipeline::schedule::{Backoff, IntervalPlanner};
use crate::services::ListingScraper;
use crate::storage::PropertyStore;

/// Watch all configured targets until Ctrl-C.
pub async fn run_watch(
    config: Arc<Config>,
    store: Arc<dyn PropertyStore>,
    notifier: Arc<dyn Notifier>,
) -> Result<()> {
    let planner = IntervalPlanner::from_config(&config.schedule)?;
    let semaphore = Arc::new(Semaphore::new(config.schedule.max_scrapes_in_flight));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::new();
    for target in config.targets.clone() {
        handles.push(tokio::spawn(watch_target(
            Arc::clone(&config),
            target,
            planner.clone(),
            Arc::clone(&store),
            Arc::clone(&notifier),
            Arc::clone(&semaphore),
            shutdown_rx.clone(),
        )));
    }

    tokio::signal::ctrl_c().await?;
    log::info!("Shutdown requested, stopping {} target loops", handles.len());
    let _ = shutdown_tx.send(true);

    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

/// The loop for one target.
async fn watch_target(
    config: Arc<Config>,
    target: TargetConfig,
    planner: IntervalPlanner,
    store: Arc<dyn PropertyStore>,
    notifier: Arc<dyn Notifier>,
    semaphore: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) {
    let scraper = ListingScraper::new(Arc::clone(&config));
    let mut backoff = Backoff::from_config(&config.schedule);
    log::info!("Watching {}: {}", target.display_name(), target.search_url);

    let mut next_delay = planner.next_delay(Local::now().time());
    loop {
        log::debug!(
            "Next cycle for {} in {}s",
            target.display_name(),
            next_delay.as_secs()
        );

        tokio::select! {
            _ = tokio::time::sleep(next_delay) => {}
            _ = shutdown.changed() => {
                log::info!("Stopping watch loop for {}", target.display_name());
                return;
            }
        }

        let cycle_result = {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            run_cycle(
                &config,
                &target,
                &scraper,
                store.as_ref(),
                notifier.as_ref(),
            )
            .await
        };

        next_delay = match cycle_result {
            Ok(_) => {
                backoff.reset();
                planner.next_delay(Local::now().time())
            }
            Err(error) if error.is_blocked() => {
                let delay = backoff.next();
                log::warn!(
                    "{} blocked ({error}); backing off {}s",
                    target.display_name(),
                    delay.as_secs()
                );
                delay
            }
            Err(error) => {
                log::warn!(
                    "Cycle failed for {}: {error}; retrying next tick",
                    target.display_name()
                );
                planner.next_delay(Local::now().time())
            }
        };
    }
}
