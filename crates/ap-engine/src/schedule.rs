// schedule.rs - Adaptive rest: how long the engine waits before its next cycle.
//
// Precedence: quiet hours (checked before any work) > rate limit > normal.

use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, MIN_REST_MS};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RestLevel {
    #[default]
    Normal,
    RateLimited,
    QuietHours,
}

impl std::fmt::Display for RestLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestLevel::Normal => write!(f, "normal"),
            RestLevel::RateLimited => write!(f, "rate_limited"),
            RestLevel::QuietHours => write!(f, "quiet_hours"),
        }
    }
}

/// Upper bound on any single rest, whatever the config says.
pub const MAX_REST: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Lower bound, for configs built in code that skipped validation.
pub const MIN_REST: Duration = Duration::from_millis(MIN_REST_MS);

pub fn in_quiet_hours(config: &EngineConfig, local_time: NaiveTime) -> bool {
    config
        .quiet_hours
        .map(|window| window.contains(local_time))
        .unwrap_or(false)
}

/// Rest level for a cycle that did run.
pub fn level_for(rate_limited: bool) -> RestLevel {
    if rate_limited {
        RestLevel::RateLimited
    } else {
        RestLevel::Normal
    }
}

pub fn rest_delay(level: RestLevel, config: &EngineConfig) -> Duration {
    let ms = match level {
        RestLevel::Normal => config.cycle_interval_ms,
        RestLevel::RateLimited => config.rate_limit_rest_ms,
        RestLevel::QuietHours => config.quiet_hours_rest_ms,
    };
    Duration::from_millis(ms).clamp(MIN_REST, MAX_REST)
}

/// `std` duration to `chrono` duration, saturating at [`MAX_REST`].
pub fn to_chrono(delay: Duration) -> chrono::Duration {
    chrono::Duration::from_std(delay.min(MAX_REST)).unwrap_or_else(|_| chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuietHours;

    #[test]
    fn default_delays_are_15_30_60_minutes() {
        let config = EngineConfig::default();
        assert_eq!(rest_delay(RestLevel::Normal, &config), Duration::from_secs(15 * 60));
        assert_eq!(rest_delay(RestLevel::RateLimited, &config), Duration::from_secs(30 * 60));
        assert_eq!(rest_delay(RestLevel::QuietHours, &config), Duration::from_secs(60 * 60));
    }

    #[test]
    fn rate_limit_beats_normal() {
        assert_eq!(level_for(true), RestLevel::RateLimited);
        assert_eq!(level_for(false), RestLevel::Normal);
    }

    #[test]
    fn quiet_hours_need_a_window() {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let mut config = EngineConfig::default();
        assert!(!in_quiet_hours(&config, noon));
        config.quiet_hours = QuietHours::parse("11:00", "13:00");
        assert!(in_quiet_hours(&config, noon));
    }

    #[test]
    fn absurd_intervals_are_capped() {
        let config = EngineConfig {
            cycle_interval_ms: u64::MAX,
            ..EngineConfig::default()
        };
        assert_eq!(rest_delay(RestLevel::Normal, &config), MAX_REST);
        assert_eq!(to_chrono(Duration::MAX), chrono::Duration::days(7));
    }

    #[test]
    fn zero_intervals_are_floored() {
        let config = EngineConfig {
            cycle_interval_ms: 0,
            rate_limit_rest_ms: 0,
            ..EngineConfig::default()
        };
        assert_eq!(rest_delay(RestLevel::Normal, &config), MIN_REST);
        assert_eq!(rest_delay(RestLevel::RateLimited, &config), Duration::from_secs(1));
    }
}
