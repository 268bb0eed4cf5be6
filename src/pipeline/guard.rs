//! Scrape-drop guard.
//!
//! A partial page or an unnoticed soft-block can make most of the tracked
//! set look vanished in one cycle. The guard aborts the diff when the
//! scraped count drops too far below the active baseline, so nothing gets
//! mass-marked inactive from a bad scrape.

use crate::error::{AppError, Result};

/// Guard configuration.
#[derive(Debug, Clone)]
pub struct ScrapeGuardConfig {
    /// Maximum allowed drop percentage (0-100)
    pub max_drop_percent: u8,
    /// Minimum active baseline before the check applies.
    /// Below this threshold, the check is skipped (for new targets).
    pub min_baseline: usize,
}

impl Default for ScrapeGuardConfig {
    fn default() -> Self {
        Self {
            max_drop_percent: 50,
            min_baseline: 10,
        }
    }
}

/// Guard for rejecting suspect scrape results.
#[derive(Debug, Clone, Default)]
pub struct ScrapeGuard {
    config: ScrapeGuardConfig,
}

/// Result of a guard check.
#[derive(Debug, Clone)]
pub enum GuardVerdict {
    /// Safe to diff against the tracked map
    Proceed {
        scraped: usize,
        baseline: usize,
    },
    /// First cycles for a target, nothing to compare against
    ColdStart { scraped: usize },
    /// Scraped count collapsed, skip the diff
    Suspect {
        scraped: usize,
        baseline: usize,
        drop_percent: f64,
    },
    /// Nothing scraped while the baseline is populated
    Empty { baseline: usize },
}

impl ScrapeGuard {
    /// Create a guard with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a guard with custom configuration.
    pub fn with_config(config: ScrapeGuardConfig) -> Self {
        Self { config }
    }

    /// Check a scraped count against the active baseline.
    pub fn check(&self, scraped: usize, baseline: usize) -> GuardVerdict {
        if scraped == 0 {
            if baseline < self.config.min_baseline {
                return GuardVerdict::ColdStart { scraped };
            }
            return GuardVerdict::Empty { baseline };
        }

        if baseline < self.config.min_baseline {
            return GuardVerdict::ColdStart { scraped };
        }

        if scraped < baseline {
            let drop = baseline - scraped;
            let drop_percent = (drop as f64 / baseline as f64) * 100.0;
            if drop_percent > f64::from(self.config.max_drop_percent) {
                return GuardVerdict::Suspect {
                    scraped,
                    baseline,
                    drop_percent,
                };
            }
        }

        GuardVerdict::Proceed { scraped, baseline }
    }

    /// Validate and return Ok if safe, Err if the scrape looks bad.
    pub fn validate(&self, target: &str, scraped: usize, baseline: usize) -> Result<()> {
        match self.check(scraped, baseline) {
            GuardVerdict::Proceed { scraped, baseline } => {
                log::debug!("Scrape guard {target}: ok ({scraped} listings, {baseline} active)");
                Ok(())
            }
            GuardVerdict::ColdStart { scraped } => {
                log::info!("Scrape guard {target}: cold start ({scraped} listings)");
                Ok(())
            }
            GuardVerdict::Suspect {
                scraped,
                baseline,
                drop_percent,
            } => Err(AppError::guard(
                target,
                format!(
                    "{baseline} active -> {scraped} scraped ({drop_percent:.1}% drop > {}% threshold)",
                    self.config.max_drop_percent
                ),
            )),
            GuardVerdict::Empty { baseline } => Err(AppError::guard(
                target,
                format!("empty scrape with {baseline} active records"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proceed_no_drop() {
        let guard = ScrapeGuard::new();
        assert!(matches!(
            guard.check(100, 100),
            GuardVerdict::Proceed { .. }
        ));
    }

    #[test]
    fn test_proceed_small_drop() {
        let guard = ScrapeGuard::new();
        // 30% drop stays under the 50% default threshold.
        assert!(matches!(guard.check(70, 100), GuardVerdict::Proceed { .. }));
    }

    #[test]
    fn test_suspect_large_drop() {
        let guard = ScrapeGuard::new();
        assert!(matches!(guard.check(40, 100), GuardVerdict::Suspect { .. }));
    }

    #[test]
    fn test_cold_start_below_baseline() {
        let guard = ScrapeGuard::new();
        assert!(matches!(guard.check(50, 3), GuardVerdict::ColdStart { .. }));
        assert!(matches!(guard.check(0, 0), GuardVerdict::ColdStart { .. }));
    }

    #[test]
    fn test_empty_with_baseline() {
        let guard = ScrapeGuard::new();
        assert!(matches!(guard.check(0, 100), GuardVerdict::Empty { .. }));
    }

    #[test]
    fn test_increase_is_safe() {
        let guard = ScrapeGuard::new();
        assert!(matches!(
            guard.check(150, 100),
            GuardVerdict::Proceed { .. }
        ));
    }

    #[test]
    fn test_validate_returns_error() {
        let guard = ScrapeGuard::with_config(ScrapeGuardConfig {
            max_drop_percent: 20,
            min_baseline: 5,
        });
        let result = guard.validate("bristol", 70, 100);
        assert!(result.is_err());
    }
}
