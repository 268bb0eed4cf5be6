// src/utils/url.rs

//! URL manipulation utilities.

use sha2::{Digest, Sha256};
use url::Url;

/// Build the URL for a given result offset.
///
/// The portal paginates with an `index` query parameter counting listings,
/// not pages. Offset zero returns the configured URL untouched.
pub fn with_result_offset(search_url: &str, offset: usize) -> crate::error::Result<String> {
    if offset == 0 {
        return Ok(search_url.to_string());
    }

    let parsed = Url::parse(search_url)?;
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| key != "index")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut page = parsed.clone();
    page.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("index", &offset.to_string());
    Ok(page.to_string())
}

/// Extract a stable listing identifier from a listing URL.
///
/// Prefers the numeric id the portal embeds in the path or query; falls back
/// to a hash of the URL so the one-record-per-listing invariant survives
/// markup changes.
pub fn listing_id(url: &str) -> String {
    extract_listing_id(url).unwrap_or_else(|| hashed_id(url))
}

/// Extract the portal's numeric listing id, if present.
pub fn extract_listing_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;

    for (key, value) in parsed.query_pairs() {
        let key_lower = key.to_lowercase();
        if matches!(key_lower.as_str(), "propertyid" | "property_id" | "id")
            && !value.is_empty()
            && value.chars().all(|c| c.is_ascii_digit())
        {
            return Some(value.into_owned());
        }
    }

    let mut segments = parsed.path_segments()?;
    while let Some(segment) = segments.next() {
        if segment == "properties" || segment == "property" {
            if let Some(next) = segments.next() {
                let digits: String = next.chars().take_while(|c| c.is_ascii_digit()).collect();
                if !digits.is_empty() {
                    return Some(digits);
                }
            }
            break;
        }
    }
    None
}

/// Derive a short, stable id by hashing the URL.
fn hashed_id(url: &str) -> String {
    let digest = Sha256::digest(url.trim().as_bytes());
    hex::encode(&digest[..8])
}
