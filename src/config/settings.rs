//! Timing parameters for the connectivity state machines.
//!
//! Defaults reproduce the device's field behaviour: a fixed 10 second
//! reconnect retry and a 1 second pause between provisioning rounds. Tests
//! shrink them; deployments may override them from the environment.

use log::warn;
use std::fmt;
use std::time::Duration;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "GARDEN_LINK_";

/// Interval and ceiling parameters for every background loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectivitySettings {
    /// First delay after a failed reconnect attempt.
    pub reconnect_backoff_min: Duration,
    /// Ceiling for the reconnect delay. Equal to the minimum for a fixed retry.
    pub reconnect_backoff_max: Duration,
    /// Growth factor applied after each failed attempt.
    pub backoff_multiplier: u32,
    /// How long the supervisor parks when no credentials are stored.
    pub credential_park_interval: Duration,
    /// Pause between stopping and restarting the provisioning transport.
    pub provisioning_restart_delay: Duration,
    /// Longest a provisioning round may sit idle before a forced restart.
    pub provisioning_round_timeout: Duration,
    /// Queue depth of each event subscription.
    pub subscriber_capacity: usize,
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            reconnect_backoff_min: Duration::from_secs(10),
            reconnect_backoff_max: Duration::from_secs(10),
            backoff_multiplier: 2,
            credential_park_interval: Duration::from_secs(30),
            provisioning_restart_delay: Duration::from_secs(1),
            provisioning_round_timeout: Duration::from_secs(120),
            subscriber_capacity: 32,
        }
    }
}

impl ConnectivitySettings {
    /// Defaults overridden by any `GARDEN_LINK_*` environment variables.
    ///
    /// Recognised variables: `RECONNECT_MIN_SECS`, `RECONNECT_MAX_SECS`,
    /// `BACKOFF_MULTIPLIER`, `PARK_SECS`, `PROVISION_RESTART_MS`,
    /// `PROVISION_TIMEOUT_SECS`, `SUBSCRIBER_CAPACITY`. Unparseable values
    /// are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        let number = |key: &str| -> Option<u64> {
            let raw = lookup(key)?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring {}{}={:?}: not a number", ENV_PREFIX, key, raw);
                    None
                }
            }
        };

        if let Some(secs) = number("RECONNECT_MIN_SECS") {
            settings.reconnect_backoff_min = Duration::from_secs(secs);
        }
        if let Some(secs) = number("RECONNECT_MAX_SECS") {
            settings.reconnect_backoff_max = Duration::from_secs(secs);
        }
        if let Some(factor) = number("BACKOFF_MULTIPLIER") {
            settings.backoff_multiplier = factor.min(u32::MAX as u64) as u32;
        }
        if let Some(secs) = number("PARK_SECS") {
            settings.credential_park_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = number("PROVISION_RESTART_MS") {
            settings.provisioning_restart_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = number("PROVISION_TIMEOUT_SECS") {
            settings.provisioning_round_timeout = Duration::from_secs(secs);
        }
        if let Some(depth) = number("SUBSCRIBER_CAPACITY") {
            settings.subscriber_capacity = depth as usize;
        }
        settings
    }

    /// Reject settings that would spin or stall a loop.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.reconnect_backoff_min.is_zero() {
            return Err(SettingsError::ZeroInterval("reconnect_backoff_min"));
        }
        if self.credential_park_interval.is_zero() {
            return Err(SettingsError::ZeroInterval("credential_park_interval"));
        }
        if self.provisioning_round_timeout.is_zero() {
            return Err(SettingsError::ZeroInterval("provisioning_round_timeout"));
        }
        if self.reconnect_backoff_max < self.reconnect_backoff_min {
            return Err(SettingsError::CeilingBelowMinimum);
        }
        if self.backoff_multiplier == 0 {
            return Err(SettingsError::ZeroMultiplier);
        }
        if self.subscriber_capacity == 0 {
            return Err(SettingsError::ZeroCapacity);
        }
        Ok(())
    }
}

/// Invalid timing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// An interval that paces a loop was zero.
    ZeroInterval(&'static str),
    /// Backoff ceiling is smaller than its minimum.
    CeilingBelowMinimum,
    /// Backoff multiplier was zero.
    ZeroMultiplier,
    /// Subscription queues cannot be zero-sized.
    ZeroCapacity,
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroInterval(name) => write!(f, "{} must be non-zero", name),
            Self::CeilingBelowMinimum => {
                write!(f, "reconnect_backoff_max is below reconnect_backoff_min")
            }
            Self::ZeroMultiplier => write!(f, "backoff_multiplier must be at least 1"),
            Self::ZeroCapacity => write!(f, "subscriber_capacity must be non-zero"),
        }
    }
}

impl std::error::Error for SettingsError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_field_behaviour() {
        let settings = ConnectivitySettings::default();
        assert_eq!(settings.reconnect_backoff_min, Duration::from_secs(10));
        assert_eq!(settings.reconnect_backoff_max, Duration::from_secs(10));
        assert_eq!(settings.provisioning_restart_delay, Duration::from_secs(1));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_overrides_applied() {
        let settings = ConnectivitySettings::from_lookup(lookup(&[
            ("RECONNECT_MIN_SECS", "2"),
            ("RECONNECT_MAX_SECS", "60"),
            ("PROVISION_RESTART_MS", "250"),
        ]));
        assert_eq!(settings.reconnect_backoff_min, Duration::from_secs(2));
        assert_eq!(settings.reconnect_backoff_max, Duration::from_secs(60));
        assert_eq!(settings.provisioning_restart_delay, Duration::from_millis(250));
        assert_eq!(settings.credential_park_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_garbage_override_ignored() {
        let settings = ConnectivitySettings::from_lookup(lookup(&[("PARK_SECS", "soon")]));
        assert_eq!(settings.credential_park_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let settings = ConnectivitySettings {
            reconnect_backoff_min: Duration::from_secs(30),
            reconnect_backoff_max: Duration::from_secs(5),
            ..Default::default()
        };
        assert_eq!(settings.validate(), Err(SettingsError::CeilingBelowMinimum));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let settings = ConnectivitySettings {
            credential_park_interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::ZeroInterval("credential_park_interval"))
        );
    }
}
