//! Polling cadence computation.
//!
//! The watch loop sleeps a randomized interval between cycles: short inside
//! the configured active time-of-day windows, long with wider jitter
//! outside them. Blocked responses switch the loop to a capped exponential
//! backoff until a cycle succeeds again.

use std::time::Duration;

use chrono::NaiveTime;
use rand::Rng;

use crate::error::{AppError, Result};
use crate::models::ScheduleConfig;

/// One local time-of-day window, possibly wrapping past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl ActiveWindow {
    /// Parse a window from "HH:MM-HH:MM".
    pub fn parse(spec: &str) -> Result<Self> {
        let (start, end) = spec
            .split_once('-')
            .ok_or_else(|| AppError::config(format!("invalid active window '{spec}'")))?;
        let parse_time = |s: &str| {
            NaiveTime::parse_from_str(s.trim(), "%H:%M")
                .map_err(|e| AppError::config(format!("invalid time in window '{spec}': {e}")))
        };
        Ok(Self {
            start: parse_time(start)?,
            end: parse_time(end)?,
        })
    }

    /// Whether a time of day falls inside the window.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time < self.end
        } else {
            // Wraps past midnight, e.g. 22:00-06:00.
            time >= self.start || time < self.end
        }
    }
}

/// Computes the delay before the next cycle.
#[derive(Debug, Clone)]
pub struct IntervalPlanner {
    windows: Vec<ActiveWindow>,
    active_secs: (u64, u64),
    idle_secs: (u64, u64),
}

impl IntervalPlanner {
    /// Build a planner from the schedule configuration.
    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        let windows = config
            .active_windows
            .iter()
            .map(|spec| ActiveWindow::parse(spec))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            windows,
            active_secs: (config.active_min_secs, config.active_max_secs),
            idle_secs: (config.idle_min_secs, config.idle_max_secs),
        })
    }

    /// Whether the given time of day falls in any active window.
    pub fn is_active(&self, time: NaiveTime) -> bool {
        self.windows.iter().any(|w| w.contains(time))
    }

    /// Randomized delay until the next cycle for the given time of day.
    pub fn next_delay(&self, time: NaiveTime) -> Duration {
        let (min, max) = if self.is_active(time) {
            self.active_secs
        } else {
            self.idle_secs
        };
        let secs = if min >= max {
            min
        } else {
            rand::thread_rng().gen_range(min..=max)
        };
        Duration::from_secs(secs)
    }
}

/// Capped exponential backoff for blocked responses.
///
/// Doubles from `base` on every consecutive block, caps at `max`, and
/// resets on the first successful cycle.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: None,
        }
    }

    /// Build a backoff from the schedule configuration, doubling from the
    /// active-interval upper bound.
    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self::new(
            Duration::from_secs(config.active_max_secs),
            Duration::from_secs(config.blocked_backoff_max_secs),
        )
    }

    /// Delay to apply after another blocked response.
    pub fn next(&mut self) -> Duration {
        let next = match self.current {
            None => self.base,
            Some(current) => current.saturating_mul(2).min(self.max),
        };
        self.current = Some(next);
        next
    }

    /// Forget the backoff after a successful cycle.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Whether a blocked response is currently being backed off.
    pub fn is_backing_off(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_window_parse() {
        let window = ActiveWindow::parse("07:30-09:30").unwrap();
        assert!(window.contains(time(8, 0)));
        assert!(!window.contains(time(9, 30)));
        assert!(!window.contains(time(12, 0)));
    }

    #[test]
    fn test_window_parse_rejects_garbage() {
        assert!(ActiveWindow::parse("0730").is_err());
        assert!(ActiveWindow::parse("25:00-26:00").is_err());
    }

    #[test]
    fn test_window_wraps_midnight() {
        let window = ActiveWindow::parse("22:00-06:00").unwrap();
        assert!(window.contains(time(23, 15)));
        assert!(window.contains(time(2, 0)));
        assert!(!window.contains(time(12, 0)));
    }

    #[test]
    fn test_delay_bounds_active_and_idle() {
        let planner = IntervalPlanner::from_config(&ScheduleConfig::default()).unwrap();

        for _ in 0..200 {
            let active = planner.next_delay(time(8, 0)).as_secs();
            assert!((540..=660).contains(&active), "active delay {active}");

            let idle = planner.next_delay(time(12, 0)).as_secs();
            assert!((900..=2700).contains(&idle), "idle delay {idle}");
        }
    }

    #[test]
    fn test_is_active_matches_default_windows() {
        let planner = IntervalPlanner::from_config(&ScheduleConfig::default()).unwrap();
        assert!(planner.is_active(time(8, 0)));
        assert!(planner.is_active(time(19, 30)));
        assert!(!planner.is_active(time(3, 0)));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(660), Duration::from_secs(3600));
        assert_eq!(backoff.next(), Duration::from_secs(660));
        assert_eq!(backoff.next(), Duration::from_secs(1320));
        assert_eq!(backoff.next(), Duration::from_secs(2640));
        assert_eq!(backoff.next(), Duration::from_secs(3600));
        assert_eq!(backoff.next(), Duration::from_secs(3600));
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::from_config(&ScheduleConfig::default());
        backoff.next();
        assert!(backoff.is_backing_off());
        backoff.reset();
        assert!(!backoff.is_backing_off());
        assert_eq!(backoff.next(), Duration::from_secs(660));
    }
}
