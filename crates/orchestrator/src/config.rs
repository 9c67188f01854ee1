//! Commander configuration: retry parameters, per-stage time budgets and the
//! consistency mode, with env-var overrides.

use core::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Durations (de)serialize as whole milliseconds.
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Inline retry behaviour shared by every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryParams {
    /// Retries after the first attempt.
    pub num_of_retries: u32,
    /// Ceiling for a single backoff sleep.
    #[serde(with = "millis", rename = "max_retry_delay_ms")]
    pub max_retry_delay: Duration,
}

impl RetryParams {
    pub const DEFAULT: Self = Self::new(3, Duration::from_secs(30));

    pub const fn new(num_of_retries: u32, max_retry_delay: Duration) -> Self {
        Self {
            num_of_retries,
            max_retry_delay,
        }
    }
}

impl Default for RetryParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Time budgets. All but `queue_task_time` are measured from order creation;
/// `queue_task_time` is measured from a queued task's first drain visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLimits {
    #[serde(with = "millis", rename = "queue_time_ms")]
    pub queue_time: Duration,
    #[serde(with = "millis", rename = "queue_task_time_ms")]
    pub queue_task_time: Duration,
    #[serde(with = "millis", rename = "payment_time_ms")]
    pub payment_time: Duration,
    #[serde(with = "millis", rename = "message_time_ms")]
    pub message_time: Duration,
    #[serde(with = "millis", rename = "employee_time_ms")]
    pub employee_time: Duration,
}

impl TimeLimits {
    pub const DEFAULT: Self = Self::new(
        Duration::from_secs(240),
        Duration::from_secs(60),
        Duration::from_secs(120),
        Duration::from_secs(150),
        Duration::from_secs(240),
    );

    pub const fn new(
        queue_time: Duration,
        queue_task_time: Duration,
        payment_time: Duration,
        message_time: Duration,
        employee_time: Duration,
    ) -> Self {
        Self {
            queue_time,
            queue_task_time,
            payment_time,
            message_time,
            employee_time,
        }
    }

    /// Pause between drain steps.
    pub fn drain_interval(&self) -> Duration {
        self.queue_task_time / 3
    }
}

impl Default for TimeLimits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// How stage handlers guard check-and-act on the order's flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyMode {
    /// Separate load and store; two handlers racing on the same order can
    /// both apply a side effect.
    #[default]
    Relaxed,
    /// Each check-and-act holds the order's stage lock.
    Serialized,
}

impl FromStr for ConsistencyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relaxed" => Ok(Self::Relaxed),
            "serialized" | "serialised" => Ok(Self::Serialized),
            _ => Err(ConfigError::invalid(
                "COMMANDER_CONSISTENCY",
                s,
                "expected relaxed or serialized",
            )),
        }
    }
}

/// Everything the commander needs besides its collaborators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommanderConfig {
    pub retry: RetryParams,
    pub limits: TimeLimits,
    #[serde(default)]
    pub consistency: ConsistencyMode,
}

impl CommanderConfig {
    pub fn with_retry(mut self, retry: RetryParams) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_limits(mut self, limits: TimeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_consistency(mut self, consistency: ConsistencyMode) -> Self {
        self.consistency = consistency;
        self
    }

    /// Defaults overridden by `COMMANDER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = lookup("COMMANDER_NUM_RETRIES") {
            config.retry.num_of_retries = v
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid("COMMANDER_NUM_RETRIES", &v, format!("{e}")))?;
        }

        let override_ms = |key: &'static str, current: Duration| -> Result<Duration, ConfigError> {
            match lookup(key) {
                Some(v) => parse_millis(key, &v),
                None => Ok(current),
            }
        };

        config.retry.max_retry_delay =
            override_ms("COMMANDER_MAX_RETRY_DELAY_MS", config.retry.max_retry_delay)?;
        config.limits.queue_time = override_ms("COMMANDER_QUEUE_TIME_MS", config.limits.queue_time)?;
        config.limits.queue_task_time =
            override_ms("COMMANDER_QUEUE_TASK_TIME_MS", config.limits.queue_task_time)?;
        config.limits.payment_time =
            override_ms("COMMANDER_PAYMENT_TIME_MS", config.limits.payment_time)?;
        config.limits.message_time =
            override_ms("COMMANDER_MESSAGE_TIME_MS", config.limits.message_time)?;
        config.limits.employee_time =
            override_ms("COMMANDER_EMPLOYEE_TIME_MS", config.limits.employee_time)?;

        if let Some(v) = lookup("COMMANDER_CONSISTENCY") {
            config.consistency = v.parse()?;
        }

        Ok(config)
    }
}

fn parse_millis(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ConfigError::invalid(key, value, format!("{e}")))
}

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
    fn defaults() {
        let config = CommanderConfig::default();
        assert_eq!(config.retry.num_of_retries, 3);
        assert_eq!(config.retry.max_retry_delay, Duration::from_secs(30));
        assert_eq!(config.limits.queue_time, Duration::from_secs(240));
        assert_eq!(config.limits.queue_task_time, Duration::from_secs(60));
        assert_eq!(config.limits.payment_time, Duration::from_secs(120));
        assert_eq!(config.limits.message_time, Duration::from_secs(150));
        assert_eq!(config.limits.employee_time, Duration::from_secs(240));
        assert_eq!(config.consistency, ConsistencyMode::Relaxed);
        assert_eq!(config.limits.drain_interval(), Duration::from_secs(20));
    }

    #[test]
    fn env_overrides_apply() {
        let config = CommanderConfig::from_lookup(lookup(&[
            ("COMMANDER_NUM_RETRIES", "1"),
            ("COMMANDER_MAX_RETRY_DELAY_MS", "1000"),
            ("COMMANDER_PAYMENT_TIME_MS", "6000"),
            ("COMMANDER_CONSISTENCY", "Serialized"),
        ]))
        .unwrap();

        assert_eq!(config.retry, RetryParams::new(1, Duration::from_millis(1000)));
        assert_eq!(config.limits.payment_time, Duration::from_millis(6000));
        assert_eq!(config.limits.queue_time, Duration::from_secs(240));
        assert_eq!(config.consistency, ConsistencyMode::Serialized);
    }

    #[test]
    fn unparsable_values_are_errors() {
        let err = CommanderConfig::from_lookup(lookup(&[("COMMANDER_QUEUE_TIME_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { key: "COMMANDER_QUEUE_TIME_MS", .. }
        ));

        let err = CommanderConfig::from_lookup(lookup(&[("COMMANDER_CONSISTENCY", "strict")]))
            .unwrap_err();
        assert!(err.to_string().contains("COMMANDER_CONSISTENCY"));
    }

    #[test]
    fn serializes_durations_as_millis() {
        let config = CommanderConfig::default().with_retry(RetryParams::new(1, Duration::from_millis(250)));
        let json = serde_json::to_value(config).unwrap();
        assert_eq!(json["retry"]["max_retry_delay_ms"], 250);
        assert_eq!(json["limits"]["queue_task_time_ms"], 60_000);
        assert_eq!(json["consistency"], "relaxed");

        let back: CommanderConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
