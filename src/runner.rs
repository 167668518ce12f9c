//! Suite runner: walks the tree, isolates each leaf and relays its outcome to the reporter.

#![deny(clippy::unwrap_used)]

use std::process;

use crate::assertions::{SignificantFigures, Site};
use crate::config::RunConfig;
use crate::context::Context;
use crate::error::RunResult;
use crate::isolation::{self, ChildLaunch, Mechanism, Role};
use crate::messaging::{Outbox, Tag};
use crate::reporter::{Reporter, Tally};
use crate::suite::{PathStep, Procedure, TestSuite, UnitTest};

/// Process exit status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);

    pub fn from_tally(tally: Tally) -> Self {
        if tally.is_clean() { Self::SUCCESS } else { Self::FAILURE }
    }

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(u8::try_from(code.0).unwrap_or(1))
    }
}

/// Lifecycle of one leaf test, as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeafState {
    NotStarted,
    RunningIsolated,
    AwaitingCompletion,
    Reported,
}

/// Runs suites under a [`RunConfig`].
#[derive(Debug, Clone, Default)]
pub struct Runner {
    config: RunConfig,
}

impl Runner {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run every test in `suite`.
    ///
    /// Returns [`ExitCode::SUCCESS`] iff nothing failed and nothing crashed. An error means an
    /// isolated context could not be created and the run was abandoned.
    #[tracing::instrument(skip_all, fields(suite = suite.name(), tests = suite.count_tests()))]
    pub fn run_test_suite(&self, suite: TestSuite, reporter: &mut dyn Reporter) -> RunResult<ExitCode> {
        let mechanism = Mechanism::resolve(self.config.isolation)?;
        self.run(suite, reporter, mechanism, |walk, suite| walk.run_every_test(suite))
    }

    /// Run only the leaf tests called `name`, descending only into suites that contain one.
    #[tracing::instrument(skip_all, fields(suite = suite.name(), test = name))]
    pub fn run_single_test(&self, suite: TestSuite, name: &str, reporter: &mut dyn Reporter) -> RunResult<ExitCode> {
        let mechanism = Mechanism::resolve(self.config.single_test_isolation)?;
        self.run(suite, reporter, mechanism, |walk, suite| walk.run_named_test(suite, name))
    }

    fn run(
        &self,
        suite: TestSuite,
        reporter: &mut dyn Reporter,
        mechanism: Mechanism,
        walk_with: impl FnOnce(&mut Walk<'_>, &TestSuite) -> RunResult<()>,
    ) -> RunResult<ExitCode> {
        match Role::for_suite(suite.name()) {
            Role::Coordinator => {}
            Role::Child { tag, path } => self.run_as_child(&suite, reporter, tag, &path),
            Role::Bystander => {
                tracing::debug!(suite = suite.name(), "child process launched for another suite, skipping");
                return Ok(ExitCode::SUCCESS);
            }
        }

        if let Err(err) = reporter.start_run() {
            tracing::error!(error = %err, "reporter failed to start");
            return Ok(ExitCode::FAILURE);
        }

        let mut walk = Walk {
            reporter: &mut *reporter,
            mechanism,
            figures: self.config.significant_figures,
            timeout: self.config.test_timeout,
            root: suite.name(),
            path: Vec::new(),
        };
        if let Err(err) = walk_with(&mut walk, &suite) {
            reporter.finish_run();
            return Err(err);
        }

        let totals = reporter.counts();
        reporter.finish_run();
        tracing::debug!(?totals, "run complete");
        Ok(ExitCode::from_tally(totals))
    }

    /// Rebuild the coordinator's descent to the leaf at `path`, run it, report and exit.
    fn run_as_child(&self, suite: &TestSuite, reporter: &mut dyn Reporter, tag: Tag, path: &[usize]) -> ! {
        let figures = self.config.significant_figures;
        let mut current = suite;
        let mut rest = path;
        let mut trail = vec![suite.name()];
        loop {
            match current.walk_path(rest) {
                Some(PathStep::Descend { owner, suite, rest: deeper }) => {
                    let mut silent = Silent;
                    let mut ctx = Context::new(&mut silent, figures);
                    owner.setup(&mut ctx);
                    trail.push(suite.name());
                    current = suite;
                    rest = deeper;
                }
                Some(PathStep::Leaf { owner, name, procedure }) => {
                    trail.push(name);
                    reporter.resume(&trail);
                    run_leaf_body(owner, procedure, reporter, figures, Outbox::to_stdout(tag));
                    reporter.finish_run();
                    process::exit(0);
                }
                None => {
                    tracing::error!(suite = suite.name(), ?path, "child path does not name a test");
                    process::exit(1);
                }
            }
        }
    }
}

/// One depth-first walk over a suite tree.
struct Walk<'a> {
    reporter: &'a mut dyn Reporter,
    mechanism: Mechanism,
    figures: SignificantFigures,
    timeout: Option<std::time::Duration>,
    root: &'a str,
    path: Vec<usize>,
}

impl Walk<'_> {
    fn run_every_test(&mut self, suite: &TestSuite) -> RunResult<()> {
        self.reporter.start_suite(suite.name(), suite.count_tests());
        for (index, entry) in suite.entries().iter().enumerate() {
            self.path.push(index);
            let outcome = match entry {
                UnitTest::Leaf { name, procedure } => self.run_leaf(suite, name, procedure),
                UnitTest::Suite(child) => self.run_nested(suite, |walk| walk.run_every_test(child)),
            };
            self.path.pop();
            outcome?;
        }
        self.reporter.finish_suite(suite.name());
        Ok(())
    }

    fn run_named_test(&mut self, suite: &TestSuite, name: &str) -> RunResult<()> {
        self.reporter.start_suite(suite.name(), suite.count_tests());
        for (index, entry) in suite.entries().iter().enumerate() {
            self.path.push(index);
            let outcome = match entry {
                UnitTest::Leaf { name: leaf, procedure } if leaf == name => self.run_leaf(suite, leaf, procedure),
                UnitTest::Suite(child) if child.has_test(name) => {
                    self.run_nested(suite, |walk| walk.run_named_test(child, name))
                }
                _ => Ok(()),
            };
            self.path.pop();
            outcome?;
        }
        self.reporter.finish_suite(suite.name());
        Ok(())
    }

    /// Wrap a nested suite's run in the owning suite's setup and teardown.
    ///
    /// The hooks run here in the coordinator; their assertions count, their mock declarations
    /// are discarded.
    fn run_nested(&mut self, owner: &TestSuite, body: impl FnOnce(&mut Self) -> RunResult<()>) -> RunResult<()> {
        self.run_hook(|ctx| owner.setup(ctx));
        let outcome = body(self);
        self.run_hook(|ctx| owner.teardown(ctx));
        outcome
    }

    fn run_hook(&mut self, hook: impl FnOnce(&mut Context<'_>)) {
        let mut ctx = Context::new(&mut *self.reporter, self.figures);
        hook(&mut ctx);
        let tally = ctx.tally();
        self.reporter.apply(tally);
    }

    fn run_leaf(&mut self, owner: &TestSuite, name: &str, procedure: &Procedure) -> RunResult<()> {
        let mut state = LeafState::NotStarted;
        tracing::debug!(test = name, ?state);

        self.reporter.start_test(name);
        state = LeafState::RunningIsolated;
        tracing::debug!(test = name, ?state, mechanism = ?self.mechanism);

        let figures = self.figures;
        let received = match &self.mechanism {
            Mechanism::Process(exe) => isolation::run_in_process(&ChildLaunch {
                exe,
                suite: self.root,
                test: name,
                path: &self.path,
                timeout: self.timeout,
            })?,
            Mechanism::Thread => {
                let reporter = &mut *self.reporter;
                isolation::run_in_thread(name, |outbox| {
                    run_leaf_body(owner, procedure, reporter, figures, outbox)
                })?
            }
            Mechanism::Inline => {
                let reporter = &mut *self.reporter;
                isolation::run_inline(|outbox| run_leaf_body(owner, procedure, reporter, figures, outbox))
            }
        };

        state = LeafState::AwaitingCompletion;
        tracing::debug!(test = name, ?state, ?received);
        match received {
            Some(delta) => self.reporter.apply(delta),
            None => {
                self.reporter.show_incomplete(name);
                self.reporter.apply(Tally {
                    exceptions: 1,
                    ..Tally::ZERO
                });
            }
        }
        self.reporter.finish_test(name);

        state = LeafState::Reported;
        tracing::debug!(test = name, ?state);
        Ok(())
    }
}

/// The unit of isolation: fresh context, owner's setup, the test, owner's teardown, tally.
fn run_leaf_body(
    owner: &TestSuite,
    procedure: &Procedure,
    reporter: &mut dyn Reporter,
    figures: SignificantFigures,
    outbox: Outbox,
) {
    let mut ctx = Context::new(reporter, figures);
    owner.setup(&mut ctx);
    procedure(&mut ctx);
    owner.teardown(&mut ctx);
    let tally = ctx.conclude();
    if let Err(err) = outbox.send(tally) {
        tracing::warn!(error = %err, "could not send completion message");
    }
}

/// Swallows everything; used for wrapper hooks replayed in a child process.
struct Silent;

impl Reporter for Silent {
    fn start_suite(&mut self, _name: &str, _test_count: usize) {}
    fn start_test(&mut self, _name: &str) {}
    fn finish_test(&mut self, _name: &str) {}
    fn finish_suite(&mut self, _name: &str) {}
    fn show_fail(&mut self, _site: &Site, _message: &str) {}
    fn show_incomplete(&mut self, _name: &str) {}

    fn counts(&self) -> Tally {
        Tally::ZERO
    }

    fn apply(&mut self, _delta: Tally) {}
}

/// Run `suite` with configuration from the environment.
///
/// A run that cannot create its isolated contexts is reported on stderr and fails.
pub fn run_test_suite(suite: TestSuite, reporter: &mut dyn Reporter) -> ExitCode {
    finish(RunConfig::from_env().and_then(|config| Runner::new(config).run_test_suite(suite, reporter)))
}

/// Run the tests called `name` in `suite` with configuration from the environment.
pub fn run_single_test(suite: TestSuite, name: &str, reporter: &mut dyn Reporter) -> ExitCode {
    finish(RunConfig::from_env().and_then(|config| Runner::new(config).run_single_test(suite, name, reporter)))
}

fn finish(outcome: RunResult<ExitCode>) -> ExitCode {
    outcome.unwrap_or_else(|err| {
        eprintln!("{:?}", miette::Report::new(err));
        ExitCode::FAILURE
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::config::IsolationMode;
    use crate::error::RunError;
    use crate::reporter::{RecordedEvent, RecordingReporter};

    fn threaded() -> Runner {
        Runner::new(RunConfig::default().with_isolation(IsolationMode::Thread))
    }

    const SITE: Site = Site::new("runner_tests.rs", 1);

    #[test]
    fn failing_leaf_fails_the_run() {
        let mut suite = TestSuite::new("all");
        suite.add_test("fails", |ctx| ctx.assert_true(SITE, false, format_args!("nope")));
        suite.add_test("quiet", |_| {});

        let mut reporter = RecordingReporter::new();
        let code = threaded().run_test_suite(suite, &mut reporter).unwrap();

        assert_eq!(code, ExitCode::FAILURE);
        assert_eq!(
            reporter.counts(),
            Tally {
                passes: 0,
                failures: 1,
                exceptions: 0
            }
        );
        assert!(reporter.is_finished());
    }

    #[test]
    fn panicking_leaf_counts_as_exception() {
        let mut suite = TestSuite::new("all");
        suite.add_test("explodes", |_| panic!("boom"));
        suite.add_test("passes", |ctx| ctx.assert_equal(SITE, 1, 1));

        let mut reporter = RecordingReporter::new();
        let code = threaded().run_test_suite(suite, &mut reporter).unwrap();

        assert_eq!(code, ExitCode::FAILURE);
        assert_eq!(reporter.counts().exceptions, 1);
        assert_eq!(reporter.counts().passes, 1);
        assert!(reporter.events().contains(&RecordedEvent::Incomplete("explodes".into())));
    }

    #[test]
    fn hooks_wrap_leaves_and_nested_suites() {
        fn push(log: &Arc<Mutex<Vec<String>>>, entry: &'static str) -> impl Fn(&mut Context<'_>) + Send + Sync + 'static {
            let log = Arc::clone(log);
            move |_| log.lock().unwrap().push(entry.to_owned())
        }

        let log = Arc::new(Mutex::new(Vec::<String>::new()));

        let mut inner = TestSuite::new("inner");
        inner.set_setup(push(&log, "inner setup"));
        inner.set_teardown(push(&log, "inner teardown"));
        inner.add_test("a", push(&log, "a"));

        let mut outer = TestSuite::new("outer");
        outer.set_setup(push(&log, "outer setup"));
        outer.set_teardown(push(&log, "outer teardown"));
        outer.add_test("b", push(&log, "b"));
        outer.add_suite("inner", inner);

        let mut reporter = RecordingReporter::new();
        let code = Runner::new(RunConfig::default().with_isolation(IsolationMode::Inline))
            .run_test_suite(outer, &mut reporter)
            .unwrap();

        assert_eq!(code, ExitCode::SUCCESS);
        assert_eq!(
            *log.lock().unwrap(),
            [
                "outer setup",
                "b",
                "outer teardown",
                "outer setup",
                "inner setup",
                "a",
                "inner teardown",
                "outer teardown",
            ]
        );
    }

    #[test]
    fn single_test_runs_only_the_named_leaf() {
        let mut inner = TestSuite::new("inner");
        inner.add_test("target", |ctx| ctx.assert_equal(SITE, 2, 2));
        inner.add_test("other", |ctx| ctx.fail(SITE, format_args!("should not run")));

        let mut outer = TestSuite::new("outer");
        outer.add_test("sibling", |ctx| ctx.fail(SITE, format_args!("should not run")));
        outer.add_suite("inner", inner);

        let mut reporter = RecordingReporter::new();
        let code = Runner::default().run_single_test(outer, "target", &mut reporter).unwrap();

        assert_eq!(code, ExitCode::SUCCESS);
        assert_eq!(reporter.counts().passes, 1);
        let started: Vec<&RecordedEvent> = reporter
            .events()
            .iter()
            .filter(|event| matches!(event, RecordedEvent::StartTest(_)))
            .collect();
        assert_eq!(started, [&RecordedEvent::StartTest("target".into())]);
    }

    #[test]
    fn reporter_that_cannot_start_fails_fast() {
        let mut suite = TestSuite::new("all");
        suite.add_test("never", |ctx| ctx.fail(SITE, format_args!("ran anyway")));

        let mut reporter = RecordingReporter::refusing_to_start();
        let code = threaded().run_test_suite(suite, &mut reporter).unwrap();

        assert_eq!(code, ExitCode::FAILURE);
        assert!(reporter.events().is_empty());
    }

    #[test]
    fn fatal_error_still_finishes_the_reporter() {
        let mut suite = TestSuite::new("all");
        suite.add_test("unreachable", |_| {});

        let mut reporter = RecordingReporter::new();
        let missing = Mechanism::Process(PathBuf::from("/nonexistent/trellis-child"));
        let outcome = Runner::default().run(suite, &mut reporter, missing, |walk, suite| walk.run_every_test(suite));

        assert!(matches!(outcome, Err(RunError::Spawn { ref test, .. }) if test == "unreachable"));
        assert!(reporter.is_finished());
    }

    #[test]
    fn exit_code_converts_for_main() {
        assert!(ExitCode::from_tally(Tally::ZERO).is_success());
        assert_eq!(process::ExitCode::from(ExitCode::FAILURE), process::ExitCode::from(1));
    }
}
