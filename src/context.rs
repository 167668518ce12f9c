//! The per-test context handed to every hook and test procedure.
//!
//! A [`Context`] is created fresh for each leaf test inside its isolated execution context. It
//! owns that test's [`MockRegistry`], counts assertion outcomes into a local [`Tally`] and
//! forwards failures to the reporter as they happen. When the leaf finishes, the local tally is
//! what travels back to the coordinator.

use std::fmt;

use crate::assertions::{
    Asserter, SignificantFigures, Site, doubles_are_equal, show_null_as_the_string_null, strings_are_equal,
};
use crate::constraint::{Constraint, Param};
use crate::mocks::{MockRegistry, Persistence};
use crate::reporter::{Reporter, Tally};

/// Counts outcomes and forwards failures. Split from the registry so a call can borrow both.
struct Verdicts<'r> {
    reporter: &'r mut dyn Reporter,
    tally: Tally,
}

impl Asserter for Verdicts<'_> {
    fn assert_true(&mut self, site: &Site, condition: bool, message: fmt::Arguments<'_>) {
        if condition {
            self.tally.passes += 1;
        } else {
            self.tally.failures += 1;
            self.reporter.show_fail(site, &message.to_string());
        }
    }
}

pub struct Context<'r> {
    verdicts: Verdicts<'r>,
    mocks: MockRegistry,
    figures: SignificantFigures,
}

impl<'r> Context<'r> {
    pub fn new(reporter: &'r mut dyn Reporter, figures: SignificantFigures) -> Self {
        Self {
            verdicts: Verdicts {
                reporter,
                tally: Tally::ZERO,
            },
            mocks: MockRegistry::new(),
            figures,
        }
    }

    /// Outcomes counted so far in this context.
    pub fn tally(&self) -> Tally {
        self.verdicts.tally
    }

    /// Report unmet one-shot expectations, drop all mock state and hand back the tally.
    pub fn conclude(mut self) -> Tally {
        self.mocks.tally(&mut self.verdicts);
        self.mocks.clear();
        self.verdicts.tally
    }

    pub fn significant_figures(&self) -> SignificantFigures {
        self.figures
    }

    /// Change the double tolerance for the rest of this test. Clamped to at least one figure.
    pub fn set_significant_figures(&mut self, figures: u32) {
        self.figures = SignificantFigures::clamped(figures);
    }

    // Expectations

    pub fn expect(&mut self, function: &str, site: Site, constraints: Vec<Constraint>) {
        self.mocks
            .declare_expectation(function, site, constraints, Persistence::OneShot);
    }

    pub fn always_expect(&mut self, function: &str, site: Site, constraints: Vec<Constraint>) {
        self.mocks
            .declare_expectation(function, site, constraints, Persistence::Persistent);
    }

    pub fn expect_never(&mut self, function: &str, site: Site) {
        self.mocks.declare_unwanted_call(function, site);
    }

    // Stubs

    pub fn will_return(&mut self, function: &str, value: i64) {
        self.mocks.declare_result(function, value, Persistence::OneShot);
    }

    pub fn always_return(&mut self, function: &str, value: i64) {
        self.mocks.declare_result(function, value, Persistence::Persistent);
    }

    /// One-shot stub plus one-shot expectation for the same function.
    pub fn will_respond(&mut self, function: &str, value: i64, site: Site, constraints: Vec<Constraint>) {
        self.will_return(function, value);
        self.expect(function, site, constraints);
    }

    pub fn always_respond(&mut self, function: &str, value: i64, site: Site, constraints: Vec<Constraint>) {
        self.always_return(function, value);
        self.always_expect(function, site, constraints);
    }

    /// Record a call made to a stand-in and return its stubbed result.
    pub fn mock(&mut self, function: &str, params: &mut [Param<'_>]) -> i64 {
        self.mocks
            .record_call(function, params, &mut self.verdicts, self.figures)
    }

    // Gating

    pub fn mock_enabled(&self, function: &str) -> bool {
        self.mocks.is_enabled(function)
    }

    pub fn disable_mock(&mut self, function: &str) {
        self.mocks.set_disabled(function);
    }

    pub fn enable_mock(&mut self, function: &str) {
        self.mocks.set_enabled(function);
    }

    pub fn disable_all_mocks(&mut self) {
        self.mocks.disable_all_by_default();
    }

    // Assertions

    pub fn assert_true(&mut self, site: Site, condition: bool, message: fmt::Arguments<'_>) {
        self.verdicts.assert_true(&site, condition, message);
    }

    pub fn assert_false(&mut self, site: Site, condition: bool, message: fmt::Arguments<'_>) {
        self.verdicts.assert_true(&site, !condition, message);
    }

    pub fn assert_equal(&mut self, site: Site, tried: i64, expected: i64) {
        self.verdicts.assert_true(
            &site,
            tried == expected,
            format_args!("[{}] should match [{}]", tried, expected),
        );
    }

    pub fn assert_not_equal(&mut self, site: Site, tried: i64, expected: i64) {
        self.verdicts.assert_true(
            &site,
            tried != expected,
            format_args!("[{}] should not match [{}]", tried, expected),
        );
    }

    pub fn assert_string_equal(&mut self, site: Site, tried: Option<&str>, expected: Option<&str>) {
        self.verdicts.assert_true(
            &site,
            strings_are_equal(tried, expected),
            format_args!(
                "[{}] should match [{}]",
                show_null_as_the_string_null(tried),
                show_null_as_the_string_null(expected)
            ),
        );
    }

    pub fn assert_double_equal(&mut self, site: Site, tried: f64, expected: f64) {
        self.verdicts.assert_true(
            &site,
            doubles_are_equal(tried, expected, self.figures),
            format_args!(
                "[{}] should match [{}] within [{}] significant figures",
                tried, expected, self.figures.0
            ),
        );
    }

    /// Unconditional failure.
    pub fn fail(&mut self, site: Site, message: fmt::Arguments<'_>) {
        self.verdicts.assert_true(&site, false, message);
    }
}

impl Asserter for Context<'_> {
    fn assert_true(&mut self, site: &Site, condition: bool, message: fmt::Arguments<'_>) {
        self.verdicts.assert_true(site, condition, message);
    }
}
