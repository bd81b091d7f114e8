// config.rs - Engine configuration and runtime config updates.

use std::time::Duration;

use ap_action::ActionType;
use ap_policy::default_auto_approve;
use chrono::NaiveTime;
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;

/// Shortest rest the engine accepts, from config files or runtime updates.
pub const MIN_REST_MS: u64 = 1_000;

/// Daily window in local time during which the engine does no work.
///
/// `start == end` is an empty window. `start > end` wraps midnight, so
/// `22:00`-`07:00` covers late evening and early morning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuietHours {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parse `"HH:MM"` bounds.
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        Some(Self {
            start: hhmm::parse(start)?,
            end: hhmm::parse(end)?,
        })
    }

    /// Whether `time` falls inside the window. The start is inclusive, the
    /// end exclusive.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start == self.end {
            false
        } else if self.start < self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn parse(s: &str) -> Option<NaiveTime> {
        let s = s.trim();
        NaiveTime::parse_from_str(s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .ok()
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid time '{}', expected HH:MM", raw)))
    }
}

fn default_auto_approve_types() -> Vec<ActionType> {
    default_auto_approve()
}

fn default_cycle_interval_ms() -> u64 {
    15 * 60 * 1000
}

fn default_rate_limit_rest_ms() -> u64 {
    30 * 60 * 1000
}

fn default_quiet_hours_rest_ms() -> u64 {
    60 * 60 * 1000
}

fn default_desired_actions() -> usize {
    3
}

fn default_handoff_ttl_ms() -> u64 {
    4 * 60 * 60 * 1000
}

fn default_progress_per_action() -> f64 {
    0.1
}

fn default_backend_timeout_ms() -> u64 {
    5 * 60 * 1000
}

fn check_rest(field: &'static str, ms: u64) -> Result<(), ConfigError> {
    if ms < MIN_REST_MS {
        return Err(ConfigError::RestTooShort {
            field,
            ms,
            min: MIN_REST_MS,
        });
    }
    Ok(())
}

fn at_least_min<E: de::Error>(ms: u64) -> Result<u64, E> {
    if ms < MIN_REST_MS {
        return Err(E::custom(format!(
            "must be at least {} ms, got {}",
            MIN_REST_MS, ms
        )));
    }
    Ok(ms)
}

fn rest_ms<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    at_least_min(u64::deserialize(deserializer)?)
}

fn optional_rest_ms<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Option::<u64>::deserialize(deserializer)?
        .map(at_least_min)
        .transpose()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Action types that run without manual confirmation.
    #[serde(default = "default_auto_approve_types")]
    pub auto_approve_types: Vec<ActionType>,

    /// Rest after a normal cycle (success, failure or proposer error).
    #[serde(default = "default_cycle_interval_ms", deserialize_with = "rest_ms")]
    pub cycle_interval_ms: u64,

    /// Rest after any upstream call reported quota exhaustion.
    #[serde(default = "default_rate_limit_rest_ms", deserialize_with = "rest_ms")]
    pub rate_limit_rest_ms: u64,

    /// Rest when a cycle lands inside quiet hours.
    #[serde(default = "default_quiet_hours_rest_ms", deserialize_with = "rest_ms")]
    pub quiet_hours_rest_ms: u64,

    #[serde(default)]
    pub quiet_hours: Option<QuietHours>,

    /// How many actions to ask the proposer for each cycle.
    #[serde(default = "default_desired_actions")]
    pub desired_actions: usize,

    /// How long a handoff snapshot stays usable.
    #[serde(default = "default_handoff_ttl_ms")]
    pub handoff_ttl_ms: u64,

    /// Progress credited to a goal per completed action.
    #[serde(default = "default_progress_per_action")]
    pub progress_per_action: f64,

    /// Self-enforced timeout handed to backends at construction.
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_approve_types: default_auto_approve_types(),
            cycle_interval_ms: default_cycle_interval_ms(),
            rate_limit_rest_ms: default_rate_limit_rest_ms(),
            quiet_hours_rest_ms: default_quiet_hours_rest_ms(),
            quiet_hours: None,
            desired_actions: default_desired_actions(),
            handoff_ttl_ms: default_handoff_ttl_ms(),
            progress_per_action: default_progress_per_action(),
            backend_timeout_ms: default_backend_timeout_ms(),
        }
    }
}

impl EngineConfig {
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }

    /// Reject rests below [`MIN_REST_MS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_rest("cycle_interval_ms", self.cycle_interval_ms)?;
        check_rest("rate_limit_rest_ms", self.rate_limit_rest_ms)?;
        check_rest("quiet_hours_rest_ms", self.quiet_hours_rest_ms)?;
        Ok(())
    }

    /// Apply a partial update. A rejected update leaves the config untouched.
    pub fn apply(&mut self, update: &ConfigUpdate) -> Result<(), ConfigError> {
        if let Some(interval) = update.cycle_interval_ms {
            check_rest("cycle_interval_ms", interval)?;
        }
        if let Some(types) = &update.auto_approve_types {
            self.auto_approve_types = types.clone();
        }
        if let Some(interval) = update.cycle_interval_ms {
            self.cycle_interval_ms = interval;
        }
        if let Some(quiet_hours) = update.quiet_hours {
            self.quiet_hours = quiet_hours;
        }
        Ok(())
    }
}

/// Partial update accepted at runtime. Absent fields are left alone;
/// `quiet_hours: null` clears the window.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_approve_types: Option<Vec<ActionType>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_rest_ms"
    )]
    pub cycle_interval_ms: Option<u64>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    pub quiet_hours: Option<Option<QuietHours>>,
}

fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
