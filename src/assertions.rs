//! Assertion primitives shared by the constraint engine and the test context.
//!
//! ## Contents
//!
//! - [`Site`] - a source location captured by the assertion and expectation macros
//! - [`Asserter`] - the sink every pass/fail verdict flows through
//! - [`SignificantFigures`] and [`doubles_are_equal`] - tolerance-based float equality
//! - [`strings_are_equal`] - null-safe string equality

use std::fmt;

/// Source location of an assertion or a declared expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Site {
    pub file: &'static str,
    pub line: u32,
}

impl Site {
    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Receives the outcome of every check made while a test runs.
///
/// The test [`Context`](crate::Context) is the production implementation: it counts passes and
/// failures and forwards failure messages to the reporter. The mock registry only ever talks
/// to this trait, which keeps it testable without a reporter.
pub trait Asserter {
    /// Record one check. `message` is only rendered when `condition` is false.
    fn assert_true(&mut self, site: &Site, condition: bool, message: fmt::Arguments<'_>);
}

/// Number of significant figures two doubles must agree on to compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignificantFigures(pub u32);

impl SignificantFigures {
    pub const DEFAULT: SignificantFigures = SignificantFigures(8);
    pub const MAX: SignificantFigures = SignificantFigures(i32::MAX as u32);

    /// Bring `figures` into `1..=MAX`.
    pub fn clamped(figures: u32) -> Self {
        Self(figures.clamp(1, Self::MAX.0))
    }
}

impl Default for SignificantFigures {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Compare two doubles to `figures` significant figures.
///
/// The allowed difference is one unit in the last significant place of the larger magnitude,
/// so `1.0000000` and `1.0000001` are equal at 7 figures but not at 8.
pub fn doubles_are_equal(tried: f64, expected: f64, figures: SignificantFigures) -> bool {
    if tried == expected {
        return true;
    }
    if !tried.is_finite() || !expected.is_finite() {
        return false;
    }
    let largest = tried.abs().max(expected.abs());
    (tried - expected).abs() < accuracy(figures, largest)
}

fn accuracy(figures: SignificantFigures, largest: f64) -> f64 {
    // truncation toward zero on the exponent, matching integer conversion of log10
    let exponent = largest.log10() as i32;
    let figures = i32::try_from(figures.0).unwrap_or(i32::MAX);
    10f64.powi(exponent.saturating_add(1).saturating_sub(figures))
}

/// Null-safe string equality: two absent strings are equal, one absent string never is.
pub fn strings_are_equal(tried: Option<&str>, expected: Option<&str>) -> bool {
    match (tried, expected) {
        (Some(tried), Some(expected)) => tried == expected,
        (None, None) => true,
        _ => false,
    }
}

/// Render an optional string for a failure message.
pub fn show_null_as_the_string_null(value: Option<&str>) -> &str {
    value.unwrap_or("null")
}
