//! Run configuration.
//!
//! [`RunConfig`] holds every knob the coordinator reads. Start from `RunConfig::default()` or
//! [`RunConfig::from_env`] and adjust with the builder methods.
//!
//! | Variable                      | Field                                    |
//! |-------------------------------|------------------------------------------|
//! | `TRELLIS_ISOLATION`           | `isolation` (`auto`, `process`, `thread`, `inline`) |
//! | `TRELLIS_SIGNIFICANT_FIGURES` | `significant_figures`                    |
//! | `TRELLIS_TEST_TIMEOUT_MS`     | `test_timeout`                           |

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::assertions::SignificantFigures;
use crate::error::{RunError, RunResult};

pub const ISOLATION_ENV: &str = "TRELLIS_ISOLATION";
pub const SIGNIFICANT_FIGURES_ENV: &str = "TRELLIS_SIGNIFICANT_FIGURES";
pub const TEST_TIMEOUT_ENV: &str = "TRELLIS_TEST_TIMEOUT_MS";

/// How a leaf test's execution context is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum IsolationMode {
    /// Process if the current executable can be re-launched, otherwise thread.
    #[default]
    Auto,
    /// A child process per leaf test.
    Process,
    /// A thread per leaf test; panics are contained.
    Thread,
    /// Run in the coordinator itself, no containment.
    Inline,
}

impl FromStr for IsolationMode {
    type Err = RunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(IsolationMode::Auto),
            "process" => Ok(IsolationMode::Process),
            "thread" => Ok(IsolationMode::Thread),
            "inline" => Ok(IsolationMode::Inline),
            _ => Err(RunError::Config {
                key: ISOLATION_ENV,
                value: s.to_string(),
                expected: "one of auto, process, thread, inline",
            }),
        }
    }
}

impl fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IsolationMode::Auto => "auto",
            IsolationMode::Process => "process",
            IsolationMode::Thread => "thread",
            IsolationMode::Inline => "inline",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Isolation for every leaf when running a whole suite.
    pub isolation: IsolationMode,
    /// Isolation for the one leaf selected by name.
    pub single_test_isolation: IsolationMode,
    /// Tolerance for double comparisons, reset at the start of every leaf.
    pub significant_figures: SignificantFigures,
    /// Kill a process-isolated leaf that runs longer than this.
    pub test_timeout: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            isolation: IsolationMode::Auto,
            single_test_isolation: IsolationMode::Inline,
            significant_figures: SignificantFigures::DEFAULT,
            test_timeout: None,
        }
    }
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with the `TRELLIS_*` environment variables.
    pub fn from_env() -> RunResult<Self> {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Overlay values looked up by variable name.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> RunResult<Self> {
        if let Some(value) = lookup(ISOLATION_ENV) {
            self.isolation = value.parse()?;
        }
        if let Some(value) = lookup(SIGNIFICANT_FIGURES_ENV) {
            let figures = value
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|f| (1..=SignificantFigures::MAX.0).contains(f))
                .ok_or(RunError::Config {
                    key: SIGNIFICANT_FIGURES_ENV,
                    value: value.clone(),
                    expected: "a positive whole number no larger than 2147483647",
                })?;
            self.significant_figures = SignificantFigures(figures);
        }
        if let Some(value) = lookup(TEST_TIMEOUT_ENV) {
            let millis = value.trim().parse::<u64>().map_err(|_| RunError::Config {
                key: TEST_TIMEOUT_ENV,
                value: value.clone(),
                expected: "a timeout in milliseconds",
            })?;
            self.test_timeout = Some(Duration::from_millis(millis));
        }
        Ok(self)
    }

    pub fn with_isolation(mut self, isolation: IsolationMode) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_single_test_isolation(mut self, isolation: IsolationMode) -> Self {
        self.single_test_isolation = isolation;
        self
    }

    /// Clamped to `1..=SignificantFigures::MAX`.
    pub fn with_significant_figures(mut self, figures: u32) -> Self {
        self.significant_figures = SignificantFigures::clamped(figures);
        self
    }

    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_keep_single_tests_inline() {
        let config = RunConfig::default();
        assert_eq!(config.isolation, IsolationMode::Auto);
        assert_eq!(config.single_test_isolation, IsolationMode::Inline);
        assert_eq!(config.significant_figures, SignificantFigures(8));
        assert_eq!(config.test_timeout, None);
    }

    #[test]
    fn overrides_apply() {
        let config = RunConfig::default()
            .with_overrides(lookup(&[
                (ISOLATION_ENV, "Thread"),
                (SIGNIFICANT_FIGURES_ENV, "4"),
                (TEST_TIMEOUT_ENV, "1500"),
            ]))
            .unwrap();
        assert_eq!(config.isolation, IsolationMode::Thread);
        assert_eq!(config.significant_figures, SignificantFigures(4));
        assert_eq!(config.test_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn bad_values_are_config_errors() {
        let err = RunConfig::default()
            .with_overrides(lookup(&[(ISOLATION_ENV, "fork")]))
            .unwrap_err();
        assert!(matches!(err, RunError::Config { key: ISOLATION_ENV, .. }));

        let err = RunConfig::default()
            .with_overrides(lookup(&[(SIGNIFICANT_FIGURES_ENV, "0")]))
            .unwrap_err();
        assert!(matches!(err, RunError::Config { .. }));
    }

    #[test]
    fn significant_figures_stay_in_range() {
        assert_eq!(RunConfig::new().with_significant_figures(0).significant_figures, SignificantFigures(1));
        assert_eq!(RunConfig::new().with_significant_figures(u32::MAX).significant_figures, SignificantFigures::MAX);
        assert_eq!(RunConfig::new().with_significant_figures(5).significant_figures, SignificantFigures(5));

        let err = RunConfig::default()
            .with_overrides(lookup(&[(SIGNIFICANT_FIGURES_ENV, "4294967295")]))
            .unwrap_err();
        assert!(matches!(err, RunError::Config { key: SIGNIFICANT_FIGURES_ENV, .. }));
    }

    #[test]
    fn isolation_mode_round_trips_through_display() {
        for mode in [
            IsolationMode::Auto,
            IsolationMode::Process,
            IsolationMode::Thread,
            IsolationMode::Inline,
        ] {
            assert_eq!(mode.to_string().parse::<IsolationMode>().unwrap(), mode);
        }
    }
}
