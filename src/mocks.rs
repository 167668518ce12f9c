//! Per-test registry of expected calls, stubbed results and mock gating.
//!
//! Every intercepted call goes through [`MockRegistry::record_call`]. Lookup is by function
//! name, first match in declaration order. One-shot records are removed the moment they match;
//! persistent records stay until [`MockRegistry::clear`].
//!
//! The registry lives inside the per-test [`Context`](crate::Context) and is reset, populated,
//! tallied and discarded once per leaf test.

use crate::assertions::{Asserter, SignificantFigures, Site};
use crate::constraint::{Constraint, ConstraintKind, Param, copy_out_buffer, write_out_value};

/// Whether a record is consumed by its first match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    OneShot,
    Persistent,
}

impl Persistence {
    pub fn keeps(self) -> bool {
        self == Persistence::Persistent
    }
}

#[derive(Debug)]
pub struct RecordedExpectation {
    pub function: String,
    pub site: Site,
    pub persistence: Persistence,
    pub constraints: Vec<Constraint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedResult {
    pub function: String,
    pub value: i64,
    pub persistence: Persistence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnwantedCall {
    pub function: String,
    pub site: Site,
}

#[derive(Debug, Default)]
pub struct MockRegistry {
    expectations: Vec<RecordedExpectation>,
    results: Vec<RecordedResult>,
    unwanted: Vec<UnwantedCall>,
    disabled: Vec<String>,
    enabled: Vec<String>,
    disabled_by_default: bool,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_expectation(
        &mut self,
        function: &str,
        site: Site,
        constraints: Vec<Constraint>,
        persistence: Persistence,
    ) {
        self.expectations.push(RecordedExpectation {
            function: function.to_owned(),
            site,
            persistence,
            constraints,
        });
    }

    pub fn declare_unwanted_call(&mut self, function: &str, site: Site) {
        self.unwanted.push(UnwantedCall {
            function: function.to_owned(),
            site,
        });
    }

    pub fn declare_result(&mut self, function: &str, value: i64, persistence: Persistence) {
        self.results.push(RecordedResult {
            function: function.to_owned(),
            value,
            persistence,
        });
    }

    /// Handle one intercepted call and return its stubbed result (0 when nothing is stubbed).
    pub fn record_call(
        &mut self,
        function: &str,
        params: &mut [Param<'_>],
        asserter: &mut dyn Asserter,
        figures: SignificantFigures,
    ) -> i64 {
        tracing::trace!(function, params = params.len(), "intercepted call");
        self.unwanted_check(function, asserter);

        if let Some(index) = self.find_expectation(function) {
            let expectation = &self.expectations[index];
            for param in params.iter_mut() {
                apply_any_constraints(expectation, param, asserter, figures);
            }
            if !expectation.persistence.keeps() {
                self.expectations.remove(index);
            }
        }

        self.stubbed_result(function)
    }

    /// Report every one-shot expectation that was never matched.
    pub fn tally(&self, asserter: &mut dyn Asserter) {
        for expectation in self.expectations.iter().filter(|e| !e.persistence.keeps()) {
            asserter.assert_true(
                &expectation.site,
                false,
                format_args!("Call was not made to function [{}]", expectation.function),
            );
        }
    }

    pub fn clear(&mut self) {
        self.expectations.clear();
        self.results.clear();
        self.unwanted.clear();
        self.disabled.clear();
        self.enabled.clear();
        self.disabled_by_default = false;
    }

    pub fn set_enabled(&mut self, function: &str) {
        self.enabled.push(function.to_owned());
    }

    pub fn set_disabled(&mut self, function: &str) {
        self.disabled.push(function.to_owned());
    }

    pub fn disable_all_by_default(&mut self) {
        self.disabled_by_default = true;
    }

    pub fn is_enabled(&self, function: &str) -> bool {
        if self.disabled_by_default {
            self.enabled.iter().any(|f| f == function)
        } else {
            !self.disabled.iter().any(|f| f == function)
        }
    }

    /// Number of expectations still waiting to be matched (one-shot and persistent).
    pub fn pending_expectations(&self) -> usize {
        self.expectations.len()
    }

    fn unwanted_check(&self, function: &str, asserter: &mut dyn Asserter) {
        for unwanted in self.unwanted.iter().filter(|u| u.function == function) {
            asserter.assert_true(
                &unwanted.site,
                false,
                format_args!("Unexpected call to function [{}]", function),
            );
        }
    }

    fn find_expectation(&self, function: &str) -> Option<usize> {
        self.expectations.iter().position(|e| e.function == function)
    }

    fn stubbed_result(&mut self, function: &str) -> i64 {
        let Some(index) = self.results.iter().position(|r| r.function == function) else {
            return 0;
        };
        if self.results[index].persistence.keeps() {
            self.results[index].value
        } else {
            self.results.remove(index).value
        }
    }
}

fn apply_any_constraints(
    expectation: &RecordedExpectation,
    param: &mut Param<'_>,
    asserter: &mut dyn Asserter,
    figures: SignificantFigures,
) {
    let function = expectation.function.as_str();
    let site = &expectation.site;
    for constraint in expectation.constraints.iter().filter(|c| c.is_for(param.name)) {
        tracing::trace!(function, parameter = param.name, class = %constraint.class(), "applying constraint");
        match constraint.kind() {
            ConstraintKind::Check(predicate) => {
                predicate.test(function, param.name, &param.value, site, asserter, figures);
            }
            ConstraintKind::Set(value) => {
                write_out_value(*value, function, param.name, &mut param.value, site, asserter);
            }
            ConstraintKind::Fill(bytes) => {
                copy_out_buffer(bytes, function, param.name, &mut param.value, site, asserter);
            }
        }
    }
}
