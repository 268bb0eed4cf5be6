// src/utils/http.rs

//! HTTP client utilities.
//!
//! Builds a browser-shaped [`reqwest::Client`] (cookie store, rotating
//! User-Agent) and classifies anti-bot responses so the scheduler can back
//! off instead of hammering a portal that has already blocked us.

use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::ScraperConfig;

/// Body markers that identify a challenge page served with a 200.
const BLOCK_MARKERS: &[&str] = &[
    "captcha",
    "access denied",
    "unusual traffic",
    "pardon our interruption",
    "are you a robot",
];

/// How much of the body to scan for block markers.
const BLOCK_SCAN_BYTES: usize = 4096;

/// Create a configured asynchronous HTTP client.
///
/// Picks one User-Agent from the configured pool; callers rebuild the client
/// per cycle to rotate it.
pub fn create_async_client(config: &ScraperConfig) -> Result<Client> {
    let client = Client::builder()
        .user_agent(pick_user_agent(&config.user_agents))
        .timeout(Duration::from_secs(config.timeout_secs))
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?;
    Ok(client)
}

/// Select a random User-Agent string from the pool.
fn pick_user_agent(pool: &[String]) -> String {
    let mut rng = rand::thread_rng();
    pool.choose(&mut rng)
        .cloned()
        .unwrap_or_else(|| "Mozilla/5.0 (compatible; propwatch/0.1)".to_string())
}

/// Fetch a page and return its body, surfacing anti-bot blocks.
///
/// 403/429 statuses and challenge-page bodies become [`AppError::Blocked`];
/// other non-success statuses propagate as HTTP errors.
pub async fn fetch_page(client: &Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    let status = response.status();

    if status == reqwest::StatusCode::FORBIDDEN
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
    {
        return Err(AppError::Blocked {
            status: status.as_u16(),
        });
    }

    let body = response.error_for_status()?.text().await?;
    if looks_blocked(&body) {
        return Err(AppError::Blocked {
            status: status.as_u16(),
        });
    }
    Ok(body)
}

/// Whether a body reads like a challenge page rather than results.
fn looks_blocked(body: &str) -> bool {
    let head_len = body
        .char_indices()
        .take_while(|(i, _)| *i < BLOCK_SCAN_BYTES)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let head = body[..head_len].to_lowercase();
    BLOCK_MARKERS.iter().any(|marker| head.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_client_with_defaults() {
        let config = ScraperConfig::default();
        assert!(create_async_client(&config).is_ok());
    }

    #[test]
    fn test_pick_user_agent_from_pool() {
        let pool = vec!["UA-1".to_string(), "UA-2".to_string()];
        let ua = pick_user_agent(&pool);
        assert!(pool.contains(&ua));
    }

    #[test]
    fn test_pick_user_agent_empty_pool_falls_back() {
        let ua = pick_user_agent(&[]);
        assert!(ua.contains("propwatch"));
    }

    #[test]
    fn test_looks_blocked_detects_challenge_markers() {
        assert!(looks_blocked("<html><title>Access Denied</title></html>"));
        assert!(looks_blocked("please solve this CAPTCHA to continue"));
        assert!(!looks_blocked("<html><div class=\"propertyCard\"></div></html>"));
    }

    #[test]
    fn test_looks_blocked_scans_head_only() {
        let body = format!("{}captcha", "x".repeat(BLOCK_SCAN_BYTES));
        assert!(!looks_blocked(&body));
    }
}
