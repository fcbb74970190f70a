//! Engine configuration from `AGENCYOPS_*` environment variables.

use std::time::Duration;

use thiserror::Error;

use agencyops_alerts::AlertThresholds;

use crate::store::TxOptions;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Where rollup deltas are applied.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum RollupMode {
    /// Inside the transaction that writes the detail document.
    #[default]
    Transactional,
    /// Later, by the rollup consumer, keyed by the agency sequence number.
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub thresholds: AlertThresholds,
    pub tx_timeout: Duration,
    pub tx_max_attempts: u32,
    pub rollup_mode: RollupMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: AlertThresholds::default(),
            tx_timeout: Duration::from_millis(2000),
            tx_max_attempts: 16,
            rollup_mode: RollupMode::Transactional,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep their
    /// defaults, malformed ones are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let thresholds = AlertThresholds {
            delay_threshold_minutes: parse_positive(
                &lookup,
                "AGENCYOPS_DELAY_THRESHOLD_MINUTES",
                defaults.thresholds.delay_threshold_minutes,
            )?,
            overlong_session_hours: parse_positive(
                &lookup,
                "AGENCYOPS_OVERLONG_SESSION_HOURS",
                defaults.thresholds.overlong_session_hours,
            )?,
            low_occupancy_percent: match lookup("AGENCYOPS_LOW_OCCUPANCY_PERCENT") {
                None => defaults.thresholds.low_occupancy_percent,
                Some(raw) => raw
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|p| *p <= 100)
                    .ok_or(ConfigError::Invalid {
                        var: "AGENCYOPS_LOW_OCCUPANCY_PERCENT",
                        value: raw,
                        expected: "a percentage between 0 and 100",
                    })?,
            },
        };

        let tx_timeout_ms = parse_positive(
            &lookup,
            "AGENCYOPS_TX_TIMEOUT_MS",
            defaults.tx_timeout.as_millis() as i64,
        )?;
        let tx_max_attempts = parse_positive(
            &lookup,
            "AGENCYOPS_TX_MAX_ATTEMPTS",
            i64::from(defaults.tx_max_attempts),
        )?;

        let rollup_mode = match lookup("AGENCYOPS_ROLLUP_MODE") {
            None => defaults.rollup_mode,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "transactional" => RollupMode::Transactional,
                "deferred" => RollupMode::Deferred,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "AGENCYOPS_ROLLUP_MODE",
                        value: raw,
                        expected: "`transactional` or `deferred`",
                    });
                }
            },
        };

        Ok(Self {
            thresholds,
            tx_timeout: Duration::from_millis(tx_timeout_ms as u64),
            tx_max_attempts: u32::try_from(tx_max_attempts).unwrap_or(u32::MAX),
            rollup_mode,
        })
    }

    pub fn tx_options(&self) -> TxOptions {
        TxOptions {
            timeout: Some(self.tx_timeout),
            max_attempts: self.tx_max_attempts,
            cancel: None,
        }
    }
}

fn parse_positive<F>(lookup: &F, var: &'static str, default: i64) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or(ConfigError::Invalid {
                var,
                value: raw,
                expected: "a positive integer",
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn unset_variables_keep_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.tx_options().max_attempts, 16);
    }

    #[test]
    fn overrides_are_applied() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("AGENCYOPS_DELAY_THRESHOLD_MINUTES", "45"),
            ("AGENCYOPS_LOW_OCCUPANCY_PERCENT", "50"),
            ("AGENCYOPS_ROLLUP_MODE", "Deferred"),
        ]))
        .unwrap();

        assert_eq!(config.thresholds.delay_threshold_minutes, 45);
        assert_eq!(config.thresholds.low_occupancy_percent, 50);
        assert_eq!(config.rollup_mode, RollupMode::Deferred);
    }

    #[test]
    fn malformed_values_are_errors() {
        let err = EngineConfig::from_lookup(lookup(&[("AGENCYOPS_TX_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "AGENCYOPS_TX_TIMEOUT_MS", .. }));

        assert!(
            EngineConfig::from_lookup(lookup(&[("AGENCYOPS_LOW_OCCUPANCY_PERCENT", "120")]))
                .is_err()
        );
        assert!(EngineConfig::from_lookup(lookup(&[("AGENCYOPS_ROLLUP_MODE", "lazy")])).is_err());
    }
}
