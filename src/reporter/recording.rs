//! In-memory reporter for tests.

use super::{Reporter, Tally};
use crate::assertions::Site;
use crate::error::RunError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    StartSuite { name: String, test_count: usize },
    StartTest(String),
    FinishTest(String),
    FinishSuite(String),
    Fail { site: Site, message: String },
    Incomplete(String),
}

/// Keeps every event so tests can assert on what a run reported.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Vec<RecordedEvent>,
    tally: Tally,
    refuse_start: bool,
    finished: bool,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A reporter whose initialisation fails.
    pub fn refusing_to_start() -> Self {
        Self {
            refuse_start: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    /// Failure messages in the order they were shown.
    pub fn failures(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                RecordedEvent::Fail { message, .. } => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Sites of the failures, in order.
    pub fn failure_sites(&self) -> Vec<Site> {
        self.events
            .iter()
            .filter_map(|event| match event {
                RecordedEvent::Fail { site, .. } => Some(*site),
                _ => None,
            })
            .collect()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Reporter for RecordingReporter {
    fn start_run(&mut self) -> Result<(), RunError> {
        if self.refuse_start {
            return Err(RunError::Reporter("recording reporter configured to refuse".to_string()));
        }
        Ok(())
    }

    fn start_suite(&mut self, name: &str, test_count: usize) {
        self.events.push(RecordedEvent::StartSuite {
            name: name.to_owned(),
            test_count,
        });
    }

    fn start_test(&mut self, name: &str) {
        self.events.push(RecordedEvent::StartTest(name.to_owned()));
    }

    fn finish_test(&mut self, name: &str) {
        self.events.push(RecordedEvent::FinishTest(name.to_owned()));
    }

    fn finish_suite(&mut self, name: &str) {
        self.events.push(RecordedEvent::FinishSuite(name.to_owned()));
    }

    fn show_fail(&mut self, site: &Site, message: &str) {
        self.events.push(RecordedEvent::Fail {
            site: *site,
            message: message.to_owned(),
        });
    }

    fn show_incomplete(&mut self, name: &str) {
        self.events.push(RecordedEvent::Incomplete(name.to_owned()));
    }

    fn counts(&self) -> Tally {
        self.tally
    }

    fn apply(&mut self, delta: Tally) {
        self.tally += delta;
    }

    fn finish_run(&mut self) {
        self.finished = true;
    }
}
