//! Engine policy configuration.
//!
//! Thresholds that drive cancellation-urgency classification and replacement
//! response deadlines. Values are durations and can be overridden via
//! `WATCHBILL_`-prefixed environment variables (humantime syntax, e.g.
//! `WATCHBILL_POLICY__LATE_THRESHOLD=48h`).

use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cancellation and replacement policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Cancellations closer to the slot start than this are LATE.
    #[serde(with = "humantime_serde")]
    pub late_threshold: Duration,

    /// Cancellations closer than this (but not LATE) are ANTICIPATED.
    #[serde(with = "humantime_serde")]
    pub anticipated_threshold: Duration,

    /// Below this remaining time, a proposed replacement gets the short
    /// response window instead of the standard one.
    #[serde(with = "humantime_serde")]
    pub urgent_replacement_cutoff: Duration,

    /// Response window for replacements proposed close to the slot start.
    #[serde(with = "humantime_serde")]
    pub urgent_replacement_window: Duration,

    /// Response window for replacements proposed well in advance.
    #[serde(with = "humantime_serde")]
    pub standard_replacement_window: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            late_threshold: Duration::from_secs(72 * 3600),
            anticipated_threshold: Duration::from_secs(168 * 3600),
            urgent_replacement_cutoff: Duration::from_secs(12 * 3600),
            urgent_replacement_window: Duration::from_secs(3600),
            standard_replacement_window: Duration::from_secs(4 * 3600),
        }
    }
}

impl PolicyConfig {
    pub fn load() -> Result<Self, figment::Error> {
        let config: Self = Self::figment().extract()?;
        config.validate().map_err(figment::Error::from)?;
        Ok(config)
    }

    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Env::prefixed("WATCHBILL_POLICY__"))
    }

    fn validate(&self) -> Result<(), String> {
        if self.late_threshold >= self.anticipated_threshold {
            return Err(format!(
                "late_threshold ({:?}) must be below anticipated_threshold ({:?})",
                self.late_threshold, self.anticipated_threshold
            ));
        }
        if self.urgent_replacement_window > self.standard_replacement_window {
            return Err(format!(
                "urgent_replacement_window ({:?}) cannot exceed standard_replacement_window ({:?})",
                self.urgent_replacement_window, self.standard_replacement_window
            ));
        }
        Ok(())
    }

    /// Replacement response deadline for a cancellation happening `remaining`
    /// before the slot starts. Negative remaining (slot already started)
    /// counts as urgent.
    pub fn replacement_window(&self, remaining: chrono::Duration) -> Duration {
        let cutoff = chrono::Duration::from_std(self.urgent_replacement_cutoff).unwrap_or(chrono::Duration::zero());
        if remaining < cutoff {
            self.urgent_replacement_window
        } else {
            self.standard_replacement_window
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_policy() {
        let config = PolicyConfig::default();
        assert_eq!(config.late_threshold, Duration::from_secs(72 * 3600));
        assert_eq!(config.anticipated_threshold, Duration::from_secs(168 * 3600));
        assert_eq!(config.standard_replacement_window, Duration::from_secs(4 * 3600));
    }

    #[test]
    fn env_overrides_thresholds() {
        Jail::expect_with(|jail| {
            jail.set_env("WATCHBILL_POLICY__LATE_THRESHOLD", "48h");
            jail.set_env("WATCHBILL_POLICY__URGENT_REPLACEMENT_WINDOW", "30m");

            let config = PolicyConfig::load()?;

            assert_eq!(config.late_threshold, Duration::from_secs(48 * 3600));
            assert_eq!(config.urgent_replacement_window, Duration::from_secs(30 * 60));
            // Untouched values keep their defaults
            assert_eq!(config.anticipated_threshold, Duration::from_secs(168 * 3600));
            Ok(())
        });
    }

    #[test]
    fn rejects_inverted_thresholds() {
        Jail::expect_with(|jail| {
            jail.set_env("WATCHBILL_POLICY__LATE_THRESHOLD", "200h");

            assert!(PolicyConfig::load().is_err());
            Ok(())
        });
    }

    #[test]
    fn replacement_window_switches_at_cutoff() {
        let config = PolicyConfig::default();
        assert_eq!(
            config.replacement_window(chrono::Duration::hours(11)),
            config.urgent_replacement_window
        );
        assert_eq!(
            config.replacement_window(chrono::Duration::hours(12)),
            config.standard_replacement_window
        );
        assert_eq!(
            config.replacement_window(chrono::Duration::hours(-1)),
            config.urgent_replacement_window
        );
    }
}
