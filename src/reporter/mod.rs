//! Reporting seam between the run coordinator and result presentation.
//!
//! ## Reporter Trait
//!
//! The coordinator drives a [`Reporter`] through suite and test start/finish events, forwards
//! assertion failures and incomplete tests to it, and applies each leaf's outcome [`Tally`] to
//! its cumulative counters. Implement the trait to change the output format.
//!
//! ## Implementations
//!
//! - [`TextReporter`] - plain text, one line per failure plus a completion summary
//! - [`RecordingReporter`] - keeps every event in memory; meant for tests of stand-ins

mod breadcrumb;
mod recording;
mod text;

use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::assertions::Site;
use crate::error::RunError;

pub use breadcrumb::Breadcrumb;
pub use recording::{RecordedEvent, RecordingReporter};
pub use text::TextReporter;

/// Pass/fail/exception counters.
///
/// Used both for a reporter's running totals and for the delta a leaf test sends back to the
/// coordinator when it completes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub passes: u32,
    pub failures: u32,
    pub exceptions: u32,
}

impl Tally {
    pub const ZERO: Tally = Tally {
        passes: 0,
        failures: 0,
        exceptions: 0,
    };

    /// A run is clean when nothing failed and nothing blew up.
    pub fn is_clean(&self) -> bool {
        self.failures == 0 && self.exceptions == 0
    }
}

impl Add for Tally {
    type Output = Tally;

    fn add(self, other: Tally) -> Tally {
        Tally {
            passes: self.passes + other.passes,
            failures: self.failures + other.failures,
            exceptions: self.exceptions + other.exceptions,
        }
    }
}

impl AddAssign for Tally {
    fn add_assign(&mut self, other: Tally) {
        *self = *self + other;
    }
}

/// Receives run events from the coordinator.
///
/// Reporters must be `Send`: in thread isolation the leaf body, and the failures it reports,
/// run on a separate thread.
pub trait Reporter: Send {
    /// Called once before anything runs. An error aborts the run with a failure status.
    fn start_run(&mut self) -> Result<(), RunError> {
        Ok(())
    }

    /// Called when a suite is entered, with the number of leaf tests it holds.
    fn start_suite(&mut self, name: &str, test_count: usize);

    /// Called before a leaf test's isolated context is created.
    fn start_test(&mut self, name: &str);

    /// Called after the leaf's outcome has been applied.
    fn finish_test(&mut self, name: &str);

    /// Called when a suite has been fully walked.
    fn finish_suite(&mut self, name: &str);

    /// An assertion failed at `site`.
    fn show_fail(&mut self, site: &Site, message: &str);

    /// A leaf test never reported completion (it crashed, panicked or was killed).
    fn show_incomplete(&mut self, name: &str);

    /// Cumulative counters.
    fn counts(&self) -> Tally;

    /// Add a leaf's outcome to the cumulative counters.
    fn apply(&mut self, delta: Tally);

    /// Called once after the run; the reporter is not driven again afterwards.
    fn finish_run(&mut self) {}

    /// Re-enter `trail` (outermost suite first, running test last) without announcing it.
    ///
    /// A process-isolated test starts with a fresh reporter; this restores the path its
    /// failure lines are printed under.
    fn resume(&mut self, _trail: &[&str]) {}
}
