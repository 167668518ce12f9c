//! Suite tree: named suites owning leaf tests and nested suites.

use std::fmt;

use crate::context::Context;

/// A test procedure or a setup/teardown hook.
pub type Procedure = Box<dyn Fn(&mut Context<'_>) + Send + Sync>;

pub enum UnitTest {
    Leaf { name: String, procedure: Procedure },
    Suite(TestSuite),
}

impl UnitTest {
    pub fn name(&self) -> &str {
        match self {
            UnitTest::Leaf { name, .. } => name,
            UnitTest::Suite(suite) => suite.name(),
        }
    }
}

impl fmt::Debug for UnitTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitTest::Leaf { name, .. } => f.debug_struct("Leaf").field("name", name).finish(),
            UnitTest::Suite(suite) => fmt::Debug::fmt(suite, f),
        }
    }
}

/// An ordered list of tests sharing one setup and one teardown.
///
/// The setup and teardown run around every leaf test directly in this suite, and once around
/// each nested suite as a whole.
pub struct TestSuite {
    name: String,
    entries: Vec<UnitTest>,
    setup: Option<Procedure>,
    teardown: Option<Procedure>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            setup: None,
            teardown: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[UnitTest] {
        &self.entries
    }

    pub fn add_test(&mut self, name: impl Into<String>, procedure: impl Fn(&mut Context<'_>) + Send + Sync + 'static) {
        self.entries.push(UnitTest::Leaf {
            name: name.into(),
            procedure: Box::new(procedure),
        });
    }

    /// Nest `child` under this suite, renamed to `name`.
    pub fn add_suite(&mut self, name: impl Into<String>, mut child: TestSuite) {
        child.name = name.into();
        self.entries.push(UnitTest::Suite(child));
    }

    pub fn set_setup(&mut self, hook: impl Fn(&mut Context<'_>) + Send + Sync + 'static) {
        self.setup = Some(Box::new(hook));
    }

    pub fn set_teardown(&mut self, hook: impl Fn(&mut Context<'_>) + Send + Sync + 'static) {
        self.teardown = Some(Box::new(hook));
    }

    pub(crate) fn setup(&self, ctx: &mut Context<'_>) {
        if let Some(hook) = &self.setup {
            hook(ctx);
        }
    }

    pub(crate) fn teardown(&self, ctx: &mut Context<'_>) {
        if let Some(hook) = &self.teardown {
            hook(ctx);
        }
    }

    /// Number of leaf tests, nested suites included.
    pub fn count_tests(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry {
                UnitTest::Leaf { .. } => 1,
                UnitTest::Suite(suite) => suite.count_tests(),
            })
            .sum()
    }

    /// Whether a leaf called `name` exists anywhere below this suite.
    pub fn has_test(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| match entry {
            UnitTest::Leaf { name: leaf, .. } => leaf == name,
            UnitTest::Suite(suite) => suite.has_test(name),
        })
    }

    /// Follow entry indices downwards; every index but the last must name a nested suite.
    pub(crate) fn walk_path<'s>(&'s self, path: &'s [usize]) -> Option<PathStep<'s>> {
        let (&first, rest) = path.split_first()?;
        match (self.entries.get(first)?, rest.is_empty()) {
            (UnitTest::Leaf { name, procedure }, true) => Some(PathStep::Leaf {
                owner: self,
                name,
                procedure,
            }),
            (UnitTest::Suite(suite), false) => Some(PathStep::Descend {
                owner: self,
                suite,
                rest,
            }),
            _ => None,
        }
    }
}

impl fmt::Debug for TestSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSuite")
            .field("name", &self.name)
            .field("entries", &self.entries)
            .field("setup", &self.setup.is_some())
            .field("teardown", &self.teardown.is_some())
            .finish()
    }
}

pub(crate) enum PathStep<'s> {
    Leaf {
        owner: &'s TestSuite,
        name: &'s str,
        procedure: &'s Procedure,
    },
    Descend {
        owner: &'s TestSuite,
        suite: &'s TestSuite,
        rest: &'s [usize],
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TestSuite {
        let mut inner = TestSuite::new("inner");
        inner.add_test("deep", |_| {});
        inner.add_test("deeper", |_| {});

        let mut outer = TestSuite::new("outer");
        outer.add_test("shallow", |_| {});
        outer.add_suite("nested", inner);
        outer
    }

    #[test]
    fn counts_leaves_recursively() {
        assert_eq!(sample().count_tests(), 3);
        assert_eq!(TestSuite::new("empty").count_tests(), 0);
    }

    #[test]
    fn finds_tests_at_any_depth() {
        let suite = sample();
        assert!(suite.has_test("shallow"));
        assert!(suite.has_test("deeper"));
        assert!(!suite.has_test("nested"));
        assert!(!suite.has_test("missing"));
    }

    #[test]
    fn add_suite_renames_the_child() {
        let suite = sample();
        let names: Vec<&str> = suite.entries().iter().map(UnitTest::name).collect();
        assert_eq!(names, ["shallow", "nested"]);
    }

    #[test]
    fn walk_path_resolves_leaves_and_rejects_bad_paths() {
        let suite = sample();
        match suite.walk_path(&[1, 0]) {
            Some(PathStep::Descend { suite: nested, rest, .. }) => {
                assert_eq!(nested.name(), "nested");
                match nested.walk_path(rest) {
                    Some(PathStep::Leaf { name, owner, .. }) => {
                        assert_eq!(name, "deep");
                        assert_eq!(owner.name(), "nested");
                    }
                    _ => panic!("expected a leaf"),
                }
            }
            _ => panic!("expected a nested suite"),
        }
        assert!(suite.walk_path(&[]).is_none());
        assert!(suite.walk_path(&[0, 1]).is_none());
        assert!(suite.walk_path(&[1]).is_none());
        assert!(suite.walk_path(&[7]).is_none());
    }

    #[test]
    fn walk_path_follows_a_parsed_path_to_its_leaf() {
        let suite = sample();
        let path: Vec<usize> = vec![1, 0];
        let mut current = &suite;
        let mut rest = path.as_slice();
        let mut trail = vec![suite.name()];
        let leaf = loop {
            match current.walk_path(rest) {
                Some(PathStep::Descend { suite, rest: deeper, .. }) => {
                    trail.push(suite.name());
                    current = suite;
                    rest = deeper;
                }
                Some(PathStep::Leaf { name, .. }) => break name,
                None => panic!("path should name a test"),
            }
        };
        trail.push(leaf);
        assert_eq!(trail, ["outer", "nested", "deep"]);
    }
}
