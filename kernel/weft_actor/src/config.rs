//! Actor system configuration.

use std::num::NonZeroUsize;
use std::str::FromStr;

/// Default instructions per turn.
pub const DEFAULT_STEP_BUDGET: usize = 10_000;

/// How runnable actors are assigned to worker threads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SchedulerMode {
    /// One queue drained by every worker.
    #[default]
    Shared,
    /// One queue per worker; each actor always runs on the same worker.
    Pinned,
}

impl FromStr for SchedulerMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared" => Ok(SchedulerMode::Shared),
            "pinned" => Ok(SchedulerMode::Pinned),
            _ => Err(ConfigError::Invalid {
                key: "WEFT_SCHEDULER",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: `{value}`")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemConfig {
    /// Worker threads (0 = one per available core).
    pub workers: usize,
    pub scheduler: SchedulerMode,
    /// Instructions an actor may run before yielding its worker.
    pub step_budget: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            workers: 0,
            scheduler: SchedulerMode::Shared,
            step_budget: DEFAULT_STEP_BUDGET,
        }
    }
}

impl SystemConfig {
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SchedulerMode) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// A zero budget is treated as one.
    #[must_use]
    pub fn with_step_budget(mut self, step_budget: usize) -> Self {
        self.step_budget = step_budget.max(1);
        self
    }

    /// Defaults overridden by `WEFT_WORKERS`, `WEFT_SCHEDULER` and
    /// `WEFT_STEP_BUDGET`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = SystemConfig::default();
        if let Some(value) = lookup("WEFT_WORKERS") {
            config.workers = parse_count("WEFT_WORKERS", &value)?;
        }
        if let Some(value) = lookup("WEFT_SCHEDULER") {
            config.scheduler = value.parse()?;
        }
        if let Some(value) = lookup("WEFT_STEP_BUDGET") {
            config = config.with_step_budget(parse_count("WEFT_STEP_BUDGET", &value)?);
        }
        Ok(config)
    }

    /// The number of worker threads to start.
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
        } else {
            self.workers
        }
    }
}

fn parse_count(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        }
    }

    #[test]
    fn defaults() {
        let config = SystemConfig::default();
        assert_eq!(config.step_budget, 10_000);
        assert_eq!(config.scheduler, SchedulerMode::Shared);
        assert!(config.effective_workers() >= 1);
    }

    #[test]
    fn builders() {
        let config = SystemConfig::default()
            .with_workers(3)
            .with_scheduler(SchedulerMode::Pinned)
            .with_step_budget(0);
        assert_eq!(config.effective_workers(), 3);
        assert_eq!(config.scheduler, SchedulerMode::Pinned);
        assert_eq!(config.step_budget, 1);
    }

    #[test]
    fn environment_overrides() {
        let config = SystemConfig::from_lookup(lookup(&[
            ("WEFT_WORKERS", "2"),
            ("WEFT_SCHEDULER", "Pinned"),
            ("WEFT_STEP_BUDGET", "50"),
        ]))
        .unwrap();
        assert_eq!(
            config,
            SystemConfig {
                workers: 2,
                scheduler: SchedulerMode::Pinned,
                step_budget: 50,
            }
        );
    }

    #[test]
    fn malformed_environment() {
        let err = SystemConfig::from_lookup(lookup(&[("WEFT_WORKERS", "many")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "WEFT_WORKERS",
                value: "many".to_string(),
            }
        );
        assert!(SystemConfig::from_lookup(lookup(&[("WEFT_SCHEDULER", "fifo")])).is_err());
    }
}
