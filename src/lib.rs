#![deny(unsafe_code)]
//! Trellis: unit tests with mock expectations and per-test isolation
//!
//! Tests are plain functions taking a [`Context`]. They are collected into a [`TestSuite`]
//! tree, and every leaf test runs in its own isolated execution context so a crash, panic or
//! hang in one test is counted and reported instead of taking the run down with it.
//!
//! ## Pieces
//!
//! - [`constraint`] - checks and write-backs attached to a mocked function's parameters
//! - [`mocks`] - the per-test registry of expectations, stubbed results and unwanted calls
//! - [`TestSuite`] - suites, nested suites and their setup/teardown hooks
//! - [`Runner`] - walks a suite, isolates each leaf and relays outcomes to a [`Reporter`]
//! - [`messaging`] - the completion channel between an isolated test and the coordinator
//! - [`cli`] - a ready-made `main` for test executables
//!
//! ## Panic Policy
//!
//! - **Production code**: errors are returned as [`RunError`]; `runner` and `cli` enforce
//!   `#![deny(clippy::unwrap_used)]`.
//! - **Test code**: `.unwrap()` is acceptable in tests.
//! - **Test procedures**: a panic inside a test is the test's problem. Under process or thread
//!   isolation it is counted as an exception.
//!
//! ## Unsafe
//!
//! The only `unsafe` is the SIGINT disposition swap around a child process wait.

pub mod assertions;
pub mod cli;
pub mod config;
pub mod constraint;
pub mod error;
pub mod messaging;
pub mod mocks;
pub mod reporter;

mod context;
mod isolation;
mod macros;
mod runner;
mod suite;

pub use assertions::{Asserter, SignificantFigures, Site};
pub use config::{IsolationMode, RunConfig};
pub use constraint::{Arg, Constraint, Param};
pub use context::Context;
pub use error::{RunError, RunResult};
pub use isolation::{CHILD_PATH_ENV, CHILD_SUITE_ENV, CHILD_TAG_ENV, die_in};
pub use mocks::{MockRegistry, Persistence};
pub use reporter::{Breadcrumb, RecordedEvent, RecordingReporter, Reporter, Tally, TextReporter};
pub use runner::{ExitCode, Runner, run_single_test, run_test_suite};
pub use suite::{Procedure, TestSuite, UnitTest};
