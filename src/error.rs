//! Errors that abort a test run.
//!
//! Assertion failures never show up here: they are counted and reported through the
//! [`Reporter`](crate::Reporter). These errors cover the run's own plumbing, and every one of
//! them is fatal to the run.

use std::io;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RunError {
    #[error("reporter could not be initialised: {0}")]
    #[diagnostic(code(trellis::reporter))]
    Reporter(String),

    #[error("could not locate the running test executable")]
    #[diagnostic(
        code(trellis::current_exe),
        help("process isolation re-launches the current executable; use thread isolation instead")
    )]
    CurrentExe(#[source] io::Error),

    #[error("could not create an isolated context for test `{test}`")]
    #[diagnostic(code(trellis::spawn))]
    Spawn {
        test: String,
        #[source]
        source: io::Error,
    },

    #[error("lost track of the isolated context for test `{test}`")]
    #[diagnostic(code(trellis::wait))]
    Wait {
        test: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid value `{value}` for {key}")]
    #[diagnostic(code(trellis::config), help("{expected}"))]
    Config {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

pub type RunResult<T> = Result<T, RunError>;
