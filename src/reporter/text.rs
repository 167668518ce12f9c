//! Plain-text reporter.

use std::io::{self, Write};

use super::{Breadcrumb, Reporter, Tally};
use crate::assertions::Site;

/// Writes a line per failure and a summary when the outermost suite finishes.
///
/// Output shape:
///
/// ```text
/// Running "all"...
/// src/io.rs:40: unit test failure: files -> opens_config -> Wanted [3], but got [4] ... at [src/io.rs] line [40]
/// Exception!: files -> crashes -> Test "crashes" failed to complete
/// Completed "all": 12 passes, 1 failure, 1 exception.
/// ```
pub struct TextReporter {
    out: Box<dyn Write + Send>,
    breadcrumb: Breadcrumb,
    tally: Tally,
    log_depth: usize,
}

impl TextReporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            breadcrumb: Breadcrumb::new(),
            tally: Tally::ZERO,
            log_depth: 1,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn breadcrumb(&self) -> &Breadcrumb {
        &self.breadcrumb
    }

    /// Names below the outermost suite, each followed by an arrow.
    fn trail(&self) -> String {
        let mut trail = String::new();
        let mut index = 0;
        self.breadcrumb.walk(|name| {
            if index > 0 {
                trail.push_str(name);
                trail.push_str(" -> ");
            }
            index += 1;
        });
        trail
    }

    fn finish(&mut self, name: &str) {
        self.breadcrumb.pop();
        if self.breadcrumb.depth() == 0 {
            let Tally {
                passes,
                failures,
                exceptions,
            } = self.tally;
            let _ = writeln!(
                self.out,
                "Completed \"{}\": {} pass{}, {} failure{}, {} exception{}.",
                name,
                passes,
                if passes == 1 { "" } else { "es" },
                failures,
                if failures == 1 { "" } else { "s" },
                exceptions,
                if exceptions == 1 { "" } else { "s" },
            );
        }
    }
}

impl Reporter for TextReporter {
    fn start_suite(&mut self, name: &str, _test_count: usize) {
        self.breadcrumb.push(name);
        if self.breadcrumb.depth() == self.log_depth {
            let _ = writeln!(self.out, "Running \"{}\"...", name);
        }
    }

    fn start_test(&mut self, name: &str) {
        self.breadcrumb.push(name);
    }

    fn finish_test(&mut self, name: &str) {
        self.finish(name);
    }

    fn finish_suite(&mut self, name: &str) {
        self.finish(name);
    }

    fn show_fail(&mut self, site: &Site, message: &str) {
        let trail = self.trail();
        let _ = writeln!(
            self.out,
            "{}:{}: unit test failure: {}{} at [{}] line [{}]",
            site.file, site.line, trail, message, site.file, site.line
        );
    }

    fn show_incomplete(&mut self, name: &str) {
        let trail = self.trail();
        let _ = writeln!(self.out, "Exception!: {}Test \"{}\" failed to complete", trail, name);
    }

    fn counts(&self) -> Tally {
        self.tally
    }

    fn apply(&mut self, delta: Tally) {
        self.tally += delta;
    }

    fn finish_run(&mut self) {
        let _ = self.out.flush();
    }

    fn resume(&mut self, trail: &[&str]) {
        for name in trail {
            self.breadcrumb.push(name);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn prints_failures_exceptions_and_summary() {
        let buffer = SharedBuffer::default();
        let mut reporter = TextReporter::new(Box::new(buffer.clone()));

        reporter.start_suite("all", 3);
        reporter.start_suite("files", 2);
        reporter.start_test("opens_config");
        reporter.show_fail(&Site::new("tests/io.rs", 12), "boom");
        reporter.apply(Tally {
            passes: 0,
            failures: 1,
            exceptions: 0,
        });
        reporter.finish_test("opens_config");
        reporter.start_test("crashes");
        reporter.show_incomplete("crashes");
        reporter.apply(Tally {
            passes: 0,
            failures: 0,
            exceptions: 1,
        });
        reporter.finish_test("crashes");
        reporter.finish_suite("files");
        reporter.apply(Tally {
            passes: 3,
            failures: 0,
            exceptions: 0,
        });
        reporter.finish_suite("all");
        reporter.finish_run();

        insta::assert_snapshot!(buffer.contents(), @r#"
        Running "all"...
        tests/io.rs:12: unit test failure: files -> opens_config -> boom at [tests/io.rs] line [12]
        Exception!: files -> crashes -> Test "crashes" failed to complete
        Completed "all": 3 passes, 1 failure, 1 exception.
        "#);
    }

    #[test]
    fn summary_uses_singular_forms() {
        let buffer = SharedBuffer::default();
        let mut reporter = TextReporter::new(Box::new(buffer.clone()));
        reporter.start_suite("one", 1);
        reporter.apply(Tally {
            passes: 1,
            failures: 0,
            exceptions: 0,
        });
        reporter.finish_suite("one");

        assert!(
            buffer
                .contents()
                .ends_with("Completed \"one\": 1 pass, 0 failures, 0 exceptions.\n")
        );
        assert_eq!(reporter.breadcrumb().depth(), 0);
    }

    #[test]
    fn resumed_trail_prefixes_failures_without_a_banner() {
        let buffer = SharedBuffer::default();
        let mut reporter = TextReporter::new(Box::new(buffer.clone()));
        reporter.resume(&["all", "parsing", "rejects_tabs"]);
        reporter.show_fail(&Site::new("tests/parse.rs", 7), "nope");

        assert_eq!(
            buffer.contents(),
            "tests/parse.rs:7: unit test failure: parsing -> rejects_tabs -> nope at [tests/parse.rs] line [7]\n"
        );
    }
}
