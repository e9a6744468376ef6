//! Pacing policy configuration
//!
//! The policy travels as a loose JSON document that historically mixed
//! snake_case and camelCase field names. This module defines the single
//! canonical `PolicyConfig` shape and normalizes either naming on read:
//! unknown fields are ignored, missing fields fall back to defaults
//! (`min=30`, `max=40`, `strategy=ignore`). Validation is separate from
//! parsing so stored blobs always load, while admission rejects policies
//! that break the pacing rules.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Interval lower bound applied when the policy omits `min_interval`
pub const DEFAULT_MIN_INTERVAL_SECS: u32 = 30;
/// Interval upper bound applied when the policy omits `max_interval`
pub const DEFAULT_MAX_INTERVAL_SECS: u32 = 40;
/// Smallest inter-message delay any policy may configure
pub const MIN_ALLOWED_INTERVAL_SECS: u32 = 5;

/// Validation failure for a submitted policy
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{field}: {reason}")]
pub struct PolicyError {
    /// Policy field that failed validation
    pub field: &'static str,
    /// Human-readable reason for the rejection
    pub reason: String,
}

impl PolicyError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// A wall-clock time of day, stored as minutes past midnight
///
/// Parsed from `HH:MM` strings and interpreted in the campaign timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MinuteOfDay(u32);

impl MinuteOfDay {
    /// Parses an `HH:MM` string
    ///
    /// # Errors
    ///
    /// Returns a `PolicyError` when the string is not a valid 24-hour time
    pub fn parse(s: &str) -> Result<Self, PolicyError> {
        let Some((h, m)) = s.split_once(':') else {
            return Err(PolicyError::new(
                "time",
                format!("expected HH:MM, got '{s}'"),
            ));
        };
        let hour: u32 = h
            .parse()
            .map_err(|_| PolicyError::new("time", format!("invalid hour in '{s}'")))?;
        let minute: u32 = m
            .parse()
            .map_err(|_| PolicyError::new("time", format!("invalid minute in '{s}'")))?;
        if hour > 23 || minute > 59 {
            return Err(PolicyError::new(
                "time",
                format!("'{s}' is outside the 24-hour clock"),
            ));
        }
        Ok(Self(hour * 60 + minute))
    }

    /// Minutes past local midnight
    #[must_use]
    pub fn minutes(self) -> u32 {
        self.0
    }

    /// Hour component (0-23)
    #[must_use]
    pub fn hour(self) -> u32 {
        self.0 / 60
    }

    /// Minute component (0-59)
    #[must_use]
    pub fn minute(self) -> u32 {
        self.0 % 60
    }
}

impl fmt::Display for MinuteOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl Serialize for MinuteOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MinuteOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(D::Error::custom)
    }
}

/// How the dispatcher treats the recurring business-hours window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusinessHoursStrategy {
    /// Send around the clock
    #[default]
    Ignore,
    /// Hold sends outside `[resume_at, pause_at)` local time
    Pause,
}

/// One-shot scheduled interruption with an absolute resume instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomaticPause {
    /// Local time of day at which sending stops
    #[serde(alias = "pauseAt")]
    pub pause_at: MinuteOfDay,
    /// Absolute instant at which sending resumes
    #[serde(alias = "resumeAt")]
    pub resume_at: DateTime<Utc>,
}

/// Canonical pacing policy for a campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Minimum randomized inter-message delay, seconds
    #[serde(alias = "minInterval")]
    pub min_interval: u32,
    /// Maximum randomized inter-message delay, seconds
    #[serde(alias = "maxInterval")]
    pub max_interval: u32,
    /// Whether to insert a longer pause between batches
    #[serde(alias = "useBatching")]
    pub use_batching: bool,
    /// Messages per batch when batching is enabled
    #[serde(alias = "batchSize")]
    pub batch_size: u32,
    /// Minimum batch pause, seconds
    #[serde(alias = "batchPauseMin")]
    pub batch_pause_min: u32,
    /// Maximum batch pause, seconds
    #[serde(alias = "batchPauseMax")]
    pub batch_pause_max: u32,
    /// Business-hours handling
    #[serde(alias = "businessHoursStrategy")]
    pub business_hours_strategy: BusinessHoursStrategy,
    /// Local time at which the daily window closes (`pause` strategy)
    #[serde(alias = "pauseAt", skip_serializing_if = "Option::is_none")]
    pub pause_at: Option<MinuteOfDay>,
    /// Local time at which the daily window opens (`pause` strategy)
    #[serde(alias = "resumeAt", skip_serializing_if = "Option::is_none")]
    pub resume_at: Option<MinuteOfDay>,
    /// Optional one-shot interruption
    #[serde(alias = "automaticPause", skip_serializing_if = "Option::is_none")]
    pub automatic_pause: Option<AutomaticPause>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL_SECS,
            max_interval: DEFAULT_MAX_INTERVAL_SECS,
            use_batching: false,
            batch_size: 1,
            batch_pause_min: 1,
            batch_pause_max: 1,
            business_hours_strategy: BusinessHoursStrategy::Ignore,
            pause_at: None,
            resume_at: None,
            automatic_pause: None,
        }
    }
}

impl PolicyConfig {
    /// Normalizes a stored or submitted policy blob
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the blob is not a JSON object at all;
    /// naming variants and unknown fields are tolerated.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Checks the pacing rules a policy must satisfy before admission
    ///
    /// # Errors
    ///
    /// Returns a `PolicyError` naming the offending field
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.min_interval < MIN_ALLOWED_INTERVAL_SECS {
            return Err(PolicyError::new(
                "min_interval",
                format!("must be at least {MIN_ALLOWED_INTERVAL_SECS} seconds"),
            ));
        }
        if self.min_interval > self.max_interval {
            return Err(PolicyError::new(
                "max_interval",
                format!(
                    "must be >= min_interval ({} > {})",
                    self.min_interval, self.max_interval
                ),
            ));
        }
        if self.use_batching {
            if self.batch_size < 1 {
                return Err(PolicyError::new("batch_size", "must be at least 1"));
            }
            if self.batch_pause_min < 1 {
                return Err(PolicyError::new("batch_pause_min", "must be at least 1"));
            }
            if self.batch_pause_min > self.batch_pause_max {
                return Err(PolicyError::new(
                    "batch_pause_max",
                    format!(
                        "must be >= batch_pause_min ({} > {})",
                        self.batch_pause_min, self.batch_pause_max
                    ),
                ));
            }
        }
        if self.business_hours_strategy == BusinessHoursStrategy::Pause {
            let (Some(pause_at), Some(resume_at)) = (self.pause_at, self.resume_at) else {
                return Err(PolicyError::new(
                    "pause_at",
                    "strategy 'pause' requires both pause_at and resume_at",
                ));
            };
            // Windows spanning midnight are not supported.
            if resume_at >= pause_at {
                return Err(PolicyError::new(
                    "resume_at",
                    format!("must be strictly earlier in the day than pause_at ({resume_at} >= {pause_at})"),
                ));
            }
        }
        Ok(())
    }

    /// The daily window bounds when the `pause` strategy is configured
    #[must_use]
    pub fn business_hours(&self) -> Option<(MinuteOfDay, MinuteOfDay)> {
        if self.business_hours_strategy == BusinessHoursStrategy::Pause {
            self.pause_at.zip(self.resume_at)
        } else {
            None
        }
    }

    /// Expected-value inter-message delay used by the schedule preview
    #[must_use]
    pub fn avg_interval_secs(&self) -> i64 {
        i64::from(self.min_interval + self.max_interval) / 2
    }

    /// Expected-value batch pause used by the schedule preview
    #[must_use]
    pub fn avg_batch_pause_secs(&self) -> i64 {
        i64::from(self.batch_pause_min + self.batch_pause_max) / 2
    }
}
