use std::env;
use std::time::Duration;

use crate::utils::error::Error;

pub const POLL_INTERVAL_ENV: &str = "JOB_RUNNER_POLL_INTERVAL_MS";
pub const TAIL_LINES_ENV: &str = "JOB_RUNNER_TAIL_LINES";

/// Process-wide knobs that are not part of a job task.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Delay between two observations of a resource while waiting on it.
    pub poll_interval: Duration,
    /// Backlog requested when attaching to the pod's logs.
    pub tail_lines: i64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            poll_interval: Duration::from_millis(1000),
            tail_lines: 1000,
        }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = RunnerConfig::default();

        if let Some(value) = lookup(POLL_INTERVAL_ENV) {
            let millis: u64 = parse(POLL_INTERVAL_ENV, &value)?;
            if millis == 0 {
                return Err(Error::UserInputError(format!(
                    "{} must be greater than zero",
                    POLL_INTERVAL_ENV
                )));
            }
            config.poll_interval = Duration::from_millis(millis);
        }

        if let Some(value) = lookup(TAIL_LINES_ENV) {
            config.tail_lines = parse(TAIL_LINES_ENV, &value)?;
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, Error> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::UserInputError(format!("{} has an invalid value '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::{RunnerConfig, POLL_INTERVAL_ENV, TAIL_LINES_ENV};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = RunnerConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config, RunnerConfig::default());
        assert_eq!(config.tail_lines, 1000);
    }

    #[test]
    fn reads_overrides() {
        let config =
            RunnerConfig::from_lookup(lookup(&[(POLL_INTERVAL_ENV, "250"), (TAIL_LINES_ENV, "50")]))
                .unwrap();

        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.tail_lines, 50);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(RunnerConfig::from_lookup(lookup(&[(POLL_INTERVAL_ENV, "soon")])).is_err());
        assert!(RunnerConfig::from_lookup(lookup(&[(POLL_INTERVAL_ENV, "0")])).is_err());
        assert!(RunnerConfig::from_lookup(lookup(&[(TAIL_LINES_ENV, "-")])).is_err());
    }
}
