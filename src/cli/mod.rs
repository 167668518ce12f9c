//! Command-line entry for test executables.
//!
//! A test program builds its suite and hands it to [`run_main`]:
//!
//! ```no_run
//! use trellis::{TestSuite, TextReporter};
//!
//! fn main() {
//!     let mut suite = TestSuite::new("all");
//!     suite.add_test("adds", |ctx| ctx.assert_equal(trellis::site!(), 1 + 1, 2));
//!     trellis::cli::run_main(suite, &mut TextReporter::stdout());
//! }
//! ```
//!
//! ## Design
//!
//! Arguments are parsed with clap and layered over [`RunConfig::from_env`]. Everything below
//! returns results; only [`run_main`] exits the process.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use std::process;
use std::time::Duration;

use clap::Parser;

use crate::assertions::SignificantFigures;
use crate::config::{IsolationMode, RunConfig};
use crate::error::RunResult;
use crate::reporter::Reporter;
use crate::runner::{ExitCode, Runner};
use crate::suite::TestSuite;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run a trellis test suite
#[derive(Parser, Debug, Default)]
#[command(version = VERSION)]
#[command(about = "Run a trellis test suite", long_about = None)]
pub struct Cli {
    /// Run only the tests with this name
    #[arg(value_name = "TEST")]
    pub test: Option<String>,

    /// How each test is isolated (overrides TRELLIS_ISOLATION)
    #[arg(long, value_enum, value_name = "MODE")]
    pub isolation: Option<IsolationMode>,

    /// Kill a process-isolated test after this many milliseconds
    #[arg(long = "timeout-ms", value_name = "MILLIS")]
    pub timeout_ms: Option<u64>,

    /// Significant figures used when comparing doubles
    #[arg(long = "significant-figures", value_name = "N", value_parser = clap::value_parser!(u32).range(1..=i64::from(i32::MAX)))]
    pub significant_figures: Option<u32>,

    /// Log the coordinator's progress to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Overlay the command line on `config`.
    ///
    /// `--isolation` applies to whichever run the command line selects.
    pub fn apply(&self, mut config: RunConfig) -> RunConfig {
        if let Some(isolation) = self.isolation {
            config = if self.test.is_some() {
                config.with_single_test_isolation(isolation)
            } else {
                config.with_isolation(isolation)
            };
        }
        if let Some(millis) = self.timeout_ms {
            config = config.with_test_timeout(Duration::from_millis(millis));
        }
        if let Some(figures) = self.significant_figures {
            config.significant_figures = SignificantFigures(figures);
        }
        config
    }
}

/// Parse the command line, run the suite and exit with its status.
///
/// This is the only place where `process::exit` is called.
pub fn run_main(suite: TestSuite, reporter: &mut dyn Reporter) {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute(&cli, suite, reporter) {
        Ok(exit_code) => {
            if !exit_code.is_success() {
                process::exit(exit_code.0);
            }
        }
        Err(err) => {
            eprintln!("{:?}", miette::Report::new(err));
            process::exit(ExitCode::FAILURE.0);
        }
    }
}

/// Run `suite` as the parsed command line asks.
pub fn execute(cli: &Cli, suite: TestSuite, reporter: &mut dyn Reporter) -> RunResult<ExitCode> {
    let runner = Runner::new(cli.apply(RunConfig::from_env()?));
    match &cli.test {
        Some(name) => runner.run_single_test(suite, name, reporter),
        None => runner.run_test_suite(suite, reporter),
    }
}

/// Structured logging to stderr; stdout carries test output and completion messages.
fn init_tracing(verbose: bool) {
    let default = if verbose { "trellis=debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .try_init();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::reporter::RecordingReporter;

    #[test]
    fn parses_every_flag() {
        let cli = Cli::try_parse_from([
            "suite",
            "--isolation",
            "thread",
            "--timeout-ms",
            "250",
            "--significant-figures",
            "5",
            "-v",
            "opens_config",
        ])
        .unwrap();

        assert_eq!(cli.test.as_deref(), Some("opens_config"));
        assert_eq!(cli.isolation, Some(IsolationMode::Thread));
        assert!(cli.verbose);

        let config = cli.apply(RunConfig::default());
        assert_eq!(config.single_test_isolation, IsolationMode::Thread);
        assert_eq!(config.isolation, IsolationMode::Auto);
        assert_eq!(config.test_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.significant_figures, SignificantFigures(5));
    }

    #[test]
    fn rejects_zero_significant_figures() {
        assert!(Cli::try_parse_from(["suite", "--significant-figures", "0"]).is_err());
        assert!(Cli::try_parse_from(["suite", "--significant-figures", "2147483648"]).is_err());
    }

    #[test]
    fn isolation_without_a_test_name_applies_to_the_whole_run() {
        let cli = Cli::try_parse_from(["suite", "--isolation", "inline"]).unwrap();
        let config = cli.apply(RunConfig::default());
        assert_eq!(config.isolation, IsolationMode::Inline);
        assert_eq!(config.single_test_isolation, IsolationMode::Inline);
    }

    #[test]
    fn execute_selects_the_named_test() {
        let mut suite = TestSuite::new("all");
        suite.add_test("wanted", |ctx| ctx.assert_true(crate::site!(), true, format_args!("ok")));
        suite.add_test("unwanted", |ctx| ctx.fail(crate::site!(), format_args!("ran")));

        let cli = Cli {
            test: Some("wanted".to_owned()),
            isolation: Some(IsolationMode::Inline),
            ..Cli::default()
        };
        let mut reporter = RecordingReporter::new();
        let code = execute(&cli, suite, &mut reporter).unwrap();

        assert_eq!(code, ExitCode::SUCCESS);
        assert_eq!(reporter.counts().passes, 1);
    }
}
