//! Suite path tracker used when printing where a failure happened.

/// Stack of suite and test names from the outermost suite down to the running test.
#[derive(Debug, Default, Clone)]
pub struct Breadcrumb {
    trail: Vec<String>,
}

impl Breadcrumb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str) {
        self.trail.push(name.to_owned());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.trail.pop()
    }

    pub fn depth(&self) -> usize {
        self.trail.len()
    }

    pub fn current(&self) -> Option<&str> {
        self.trail.last().map(String::as_str)
    }

    /// Visit every name from the outermost inwards.
    pub fn walk(&self, mut visit: impl FnMut(&str)) {
        for name in &self.trail {
            visit(name);
        }
    }
}
