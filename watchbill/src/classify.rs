//! Cancellation-urgency classification.
//!
//! A pure function of the time remaining before a slot starts. The buckets
//! drive who gets escalated after a cancellation and how long a proposed
//! replacement has to respond. Boundary values fall on the calmer side:
//! exactly at the LATE threshold is ANTICIPATED, exactly at the ANTICIPATED
//! threshold is NORMAL.

use crate::config::PolicyConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How close to the slot start a cancellation landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Less than the LATE threshold (default 72h) before start.
    Late,
    /// Between the LATE and ANTICIPATED thresholds (default 72h..168h).
    Anticipated,
    /// At or beyond the ANTICIPATED threshold.
    Normal,
}

/// Classify a cancellation happening at `now` for a slot starting at `start`.
///
/// A slot already underway classifies as LATE.
pub fn classify(start: DateTime<Utc>, now: DateTime<Utc>, policy: &PolicyConfig) -> Urgency {
    let remaining = start - now;
    let late = to_chrono(policy.late_threshold);
    let anticipated = to_chrono(policy.anticipated_threshold);

    if remaining < late {
        Urgency::Late
    } else if remaining < anticipated {
        Urgency::Anticipated
    } else {
        Urgency::Normal
    }
}

fn to_chrono(d: std::time::Duration) -> Duration {
    Duration::from_std(d).unwrap_or_else(|_| Duration::max_value())
}
