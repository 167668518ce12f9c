//! Parameter constraints attached to an expected call.
//!
//! A [`Constraint`] names one parameter of a mocked function and either checks the value the
//! call supplied ([`Predicate`]) or writes a canned value back through it (`Set`, `Fill`).
//! Constraints are built with the factory functions in this module and handed to
//! [`Context::expect`](crate::Context::expect) and friends:
//!
//! ```rust
//! use trellis::constraint::{fill, set, want, want_string};
//!
//! let constraints = vec![
//!     want("fd", 3),
//!     want_string("path", Some("/etc/hosts")),
//!     set("bytes_read", 16),
//!     fill("buffer", b"0123456789abcdef", 16),
//! ];
//! assert_eq!(constraints.len(), 4);
//! ```
//!
//! The actual arguments of an intercepted call arrive as [`Param`]s carrying an [`Arg`].

use std::fmt;

use crate::assertions::{
    Asserter, SignificantFigures, Site, doubles_are_equal, show_null_as_the_string_null, strings_are_equal,
};

// ============================================================================
// Actual arguments
// ============================================================================

/// One actual argument of an intercepted call.
///
/// Writable variants borrow the caller's storage so `Set` and `Fill` constraints can hand
/// values back to the code under test.
#[derive(Debug)]
pub enum Arg<'a> {
    Word(i64),
    Double(f64),
    Str(Option<&'a str>),
    Slot(&'a mut i64),
    Slot32(&'a mut i32),
    Buffer(&'a mut [u8]),
}

impl Arg<'_> {
    fn word(&self) -> Option<i64> {
        match self {
            Arg::Word(w) => Some(*w),
            _ => None,
        }
    }

    fn double(&self) -> Option<f64> {
        match self {
            Arg::Double(d) => Some(*d),
            Arg::Word(w) => Some(*w as f64),
            _ => None,
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, Arg::Word(0) | Arg::Str(None))
    }
}

impl fmt::Display for Arg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Word(w) => write!(f, "{}", w),
            Arg::Double(d) => write!(f, "{}", d),
            Arg::Str(s) => f.write_str(show_null_as_the_string_null(*s)),
            Arg::Slot(v) => write!(f, "&mut {}", v),
            Arg::Slot32(v) => write!(f, "&mut {}", v),
            Arg::Buffer(b) => write!(f, "&mut [{} bytes]", b.len()),
        }
    }
}

macro_rules! word_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Arg<'_> {
                fn from(value: $ty) -> Self {
                    Arg::Word(value as i64)
                }
            }
        )*
    };
}

word_from!(i64, i32, i16, i8, u64, u32, u16, u8, usize, isize);

impl From<bool> for Arg<'_> {
    fn from(value: bool) -> Self {
        Arg::Word(i64::from(value))
    }
}

impl From<f64> for Arg<'_> {
    fn from(value: f64) -> Self {
        Arg::Double(value)
    }
}

impl From<f32> for Arg<'_> {
    fn from(value: f32) -> Self {
        Arg::Double(f64::from(value))
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(value: &'a str) -> Self {
        Arg::Str(Some(value))
    }
}

impl<'a> From<&'a String> for Arg<'a> {
    fn from(value: &'a String) -> Self {
        Arg::Str(Some(value.as_str()))
    }
}

impl<'a> From<Option<&'a str>> for Arg<'a> {
    fn from(value: Option<&'a str>) -> Self {
        Arg::Str(value)
    }
}

impl<'a> From<&'a mut i64> for Arg<'a> {
    fn from(value: &'a mut i64) -> Self {
        Arg::Slot(value)
    }
}

impl<'a> From<&'a mut i32> for Arg<'a> {
    fn from(value: &'a mut i32) -> Self {
        Arg::Slot32(value)
    }
}

impl<'a> From<&'a mut [u8]> for Arg<'a> {
    fn from(value: &'a mut [u8]) -> Self {
        Arg::Buffer(value)
    }
}

impl<'a, const N: usize> From<&'a mut [u8; N]> for Arg<'a> {
    fn from(value: &'a mut [u8; N]) -> Self {
        Arg::Buffer(value.as_mut_slice())
    }
}

impl<'a> From<&'a mut Vec<u8>> for Arg<'a> {
    fn from(value: &'a mut Vec<u8>) -> Self {
        Arg::Buffer(value.as_mut_slice())
    }
}

/// A named actual argument.
#[derive(Debug)]
pub struct Param<'a> {
    pub name: &'a str,
    pub value: Arg<'a>,
}

impl<'a> Param<'a> {
    pub fn new(name: &'a str, value: impl Into<Arg<'a>>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

// ============================================================================
// Constraints
// ============================================================================

/// The coarse class a constraint dispatches on when a call matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintClass {
    Want,
    WantNot,
    Set,
    Fill,
}

impl fmt::Display for ConstraintClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintClass::Want => "want",
            ConstraintClass::WantNot => "want_not",
            ConstraintClass::Set => "set",
            ConstraintClass::Fill => "fill",
        };
        f.write_str(name)
    }
}

/// A check on the value a call supplied for one parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Equal(i64),
    NotEqual(i64),
    NonNull,
    StringEqual(Option<String>),
    DoubleEqual(f64),
}

impl Predicate {
    /// Evaluate the predicate against an actual argument.
    pub fn compare(&self, actual: &Arg<'_>, figures: SignificantFigures) -> bool {
        match self {
            Predicate::Equal(expected) => actual.word() == Some(*expected),
            Predicate::NotEqual(expected) => actual.word().is_some_and(|tried| tried != *expected),
            Predicate::NonNull => !actual.is_null(),
            Predicate::StringEqual(expected) => match actual {
                Arg::Str(tried) => strings_are_equal(*tried, expected.as_deref()),
                _ => false,
            },
            Predicate::DoubleEqual(expected) => {
                actual.double().is_some_and(|tried| doubles_are_equal(tried, *expected, figures))
            }
        }
    }

    /// Evaluate the predicate and report the verdict at `site`.
    pub fn test(
        &self,
        function: &str,
        parameter: &str,
        actual: &Arg<'_>,
        site: &Site,
        asserter: &mut dyn Asserter,
        figures: SignificantFigures,
    ) {
        let passed = self.compare(actual, figures);
        match self {
            Predicate::Equal(expected) => asserter.assert_true(
                site,
                passed,
                format_args!(
                    "Wanted [{}], but got [{}] in function [{}] parameter [{}]",
                    expected, actual, function, parameter
                ),
            ),
            Predicate::NotEqual(expected) => asserter.assert_true(
                site,
                passed,
                format_args!(
                    "Wanted anything but [{}] in function [{}] parameter [{}]",
                    expected, function, parameter
                ),
            ),
            Predicate::NonNull => asserter.assert_true(
                site,
                passed,
                format_args!(
                    "Wanted non-null, but got null in function [{}] parameter [{}]",
                    function, parameter
                ),
            ),
            Predicate::StringEqual(expected) => asserter.assert_true(
                site,
                passed,
                format_args!(
                    "Wanted [{}], but got [{}] in function [{}] parameter [{}]",
                    show_null_as_the_string_null(expected.as_deref()),
                    actual,
                    function,
                    parameter
                ),
            ),
            Predicate::DoubleEqual(expected) => asserter.assert_true(
                site,
                passed,
                format_args!(
                    "Wanted [{}], but got [{}] in function [{}] parameter [{}]",
                    expected, actual, function, parameter
                ),
            ),
        }
    }
}

/// What a constraint does when its parameter shows up in a matching call.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintKind {
    Check(Predicate),
    /// Write the value through a [`Arg::Slot`] / [`Arg::Slot32`].
    Set(i64),
    /// Copy the owned bytes into an [`Arg::Buffer`]; the copy size is the byte count.
    Fill(Vec<u8>),
}

/// A predicate or action bound to one named parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    parameter: String,
    kind: ConstraintKind,
}

impl Constraint {
    pub fn new(parameter: impl Into<String>, kind: ConstraintKind) -> Self {
        Self {
            parameter: parameter.into(),
            kind,
        }
    }

    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    pub fn is_for(&self, parameter: &str) -> bool {
        self.parameter == parameter
    }

    pub fn class(&self) -> ConstraintClass {
        match &self.kind {
            ConstraintKind::Check(Predicate::Equal(_) | Predicate::StringEqual(_) | Predicate::DoubleEqual(_)) => {
                ConstraintClass::Want
            }
            ConstraintKind::Check(Predicate::NotEqual(_) | Predicate::NonNull) => ConstraintClass::WantNot,
            ConstraintKind::Set(_) => ConstraintClass::Set,
            ConstraintKind::Fill(_) => ConstraintClass::Fill,
        }
    }

    /// Number of bytes a `Fill` constraint copies; zero for every other kind.
    pub fn copy_size(&self) -> usize {
        match &self.kind {
            ConstraintKind::Fill(bytes) => bytes.len(),
            _ => 0,
        }
    }
}

/// Write `value` through the slot supplied for `parameter`.
pub(crate) fn write_out_value(
    value: i64,
    function: &str,
    parameter: &str,
    actual: &mut Arg<'_>,
    site: &Site,
    asserter: &mut dyn Asserter,
) {
    match actual {
        Arg::Slot(slot) => **slot = value,
        // 32-bit slots take the low word, as an `int` out-parameter would
        Arg::Slot32(slot) => **slot = value as i32,
        other => asserter.assert_true(
            site,
            false,
            format_args!(
                "Cannot set [{}] into [{}] in function [{}] parameter [{}]: not a writable slot",
                value, other, function, parameter
            ),
        ),
    }
}

/// Copy `bytes` into the buffer supplied for `parameter`.
pub(crate) fn copy_out_buffer(
    bytes: &[u8],
    function: &str,
    parameter: &str,
    actual: &mut Arg<'_>,
    site: &Site,
    asserter: &mut dyn Asserter,
) {
    let Arg::Buffer(buffer) = actual else {
        asserter.assert_true(
            site,
            false,
            format_args!(
                "Cannot fill [{}] in function [{}] parameter [{}]: not a writable buffer",
                actual, function, parameter
            ),
        );
        return;
    };
    let count = bytes.len().min(buffer.len());
    buffer[..count].copy_from_slice(&bytes[..count]);
    if count < bytes.len() {
        asserter.assert_true(
            site,
            false,
            format_args!(
                "Buffer of [{}] bytes is too small to fill [{}] bytes in function [{}] parameter [{}]",
                buffer.len(),
                bytes.len(),
                function,
                parameter
            ),
        );
    }
}

// ============================================================================
// Factories
// ============================================================================

/// The argument must equal `expected`.
pub fn want(parameter: &str, expected: i64) -> Constraint {
    Constraint::new(parameter, ConstraintKind::Check(Predicate::Equal(expected)))
}

/// The argument must differ from `unexpected`.
pub fn want_not(parameter: &str, unexpected: i64) -> Constraint {
    Constraint::new(parameter, ConstraintKind::Check(Predicate::NotEqual(unexpected)))
}

/// The argument must not be zero or an absent string.
pub fn want_non_null(parameter: &str) -> Constraint {
    Constraint::new(parameter, ConstraintKind::Check(Predicate::NonNull))
}

/// The argument must be a string equal to `expected`; `None` stands for a null string.
pub fn want_string(parameter: &str, expected: Option<&str>) -> Constraint {
    Constraint::new(
        parameter,
        ConstraintKind::Check(Predicate::StringEqual(expected.map(str::to_owned))),
    )
}

/// The argument must equal `expected` to the running test's significant figures.
pub fn want_double(parameter: &str, expected: f64) -> Constraint {
    Constraint::new(parameter, ConstraintKind::Check(Predicate::DoubleEqual(expected)))
}

/// Write `value` through the argument, which must be a writable slot.
pub fn set(parameter: &str, value: i64) -> Constraint {
    Constraint::new(parameter, ConstraintKind::Set(value))
}

/// Copy the first `copy_size` bytes of `source` into the argument, which must be a buffer.
///
/// `copy_size` is clamped to `source.len()`.
pub fn fill(parameter: &str, source: &[u8], copy_size: usize) -> Constraint {
    let count = copy_size.min(source.len());
    Constraint::new(parameter, ConstraintKind::Fill(source[..count].to_vec()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Verdicts {
        passes: usize,
        failures: Vec<String>,
    }

    impl Asserter for Verdicts {
        fn assert_true(&mut self, _site: &Site, condition: bool, message: fmt::Arguments<'_>) {
            if condition {
                self.passes += 1;
            } else {
                self.failures.push(message.to_string());
            }
        }
    }

    const SITE: Site = Site::new("constraint_tests.rs", 7);
    const FIGURES: SignificantFigures = SignificantFigures::DEFAULT;

    #[test]
    fn want_compares_words() {
        let constraint = want("fd", 3);
        let ConstraintKind::Check(predicate) = constraint.kind() else {
            panic!("want should build a check");
        };
        assert!(predicate.compare(&Arg::Word(3), FIGURES));
        assert!(!predicate.compare(&Arg::Word(4), FIGURES));
        assert!(!predicate.compare(&Arg::Str(Some("3")), FIGURES));
        assert_eq!(constraint.class(), ConstraintClass::Want);
    }

    #[test]
    fn want_failure_names_function_and_parameter() {
        let mut verdicts = Verdicts::default();
        Predicate::Equal(3).test("open_file", "fd", &Arg::Word(9), &SITE, &mut verdicts, FIGURES);
        assert_eq!(
            verdicts.failures,
            vec!["Wanted [3], but got [9] in function [open_file] parameter [fd]".to_string()]
        );
    }

    #[test]
    fn want_not_and_non_null_are_want_not_class() {
        assert_eq!(want_not("x", 1).class(), ConstraintClass::WantNot);
        assert_eq!(want_non_null("x").class(), ConstraintClass::WantNot);

        let mut verdicts = Verdicts::default();
        Predicate::NonNull.test("f", "p", &Arg::Word(0), &SITE, &mut verdicts, FIGURES);
        Predicate::NonNull.test("f", "p", &Arg::Str(Some("")), &SITE, &mut verdicts, FIGURES);
        Predicate::NotEqual(5).test("f", "p", &Arg::Word(5), &SITE, &mut verdicts, FIGURES);
        assert_eq!(verdicts.passes, 1);
        assert_eq!(
            verdicts.failures,
            vec![
                "Wanted non-null, but got null in function [f] parameter [p]".to_string(),
                "Wanted anything but [5] in function [f] parameter [p]".to_string(),
            ]
        );
    }

    #[test]
    fn want_not_rejects_arguments_that_are_not_words() {
        let predicate = Predicate::NotEqual(5);
        assert!(predicate.compare(&Arg::Word(6), FIGURES));
        assert!(!predicate.compare(&Arg::Double(6.0), FIGURES));
        assert!(!predicate.compare(&Arg::Str(Some("6")), FIGURES));
        let mut slot = 6i64;
        assert!(!predicate.compare(&Arg::from(&mut slot), FIGURES));
    }

    #[test]
    fn string_constraint_renders_null() {
        let mut verdicts = Verdicts::default();
        let ConstraintKind::Check(predicate) = want_string("name", None).kind().clone() else {
            panic!("want_string should build a check");
        };
        predicate.test("greet", "name", &Arg::Str(None), &SITE, &mut verdicts, FIGURES);
        predicate.test("greet", "name", &Arg::Str(Some("bob")), &SITE, &mut verdicts, FIGURES);
        assert_eq!(verdicts.passes, 1);
        assert_eq!(
            verdicts.failures,
            vec!["Wanted [null], but got [bob] in function [greet] parameter [name]".to_string()]
        );
    }

    #[test]
    fn double_constraint_uses_significant_figures() {
        let predicate = Predicate::DoubleEqual(2.5);
        assert!(predicate.compare(&Arg::Double(2.500_000_001), FIGURES));
        assert!(!predicate.compare(&Arg::Double(2.6), FIGURES));
        assert!(predicate.compare(&Arg::Double(2.6), SignificantFigures(1)));
    }

    #[test]
    fn set_writes_through_slots() {
        let mut verdicts = Verdicts::default();
        let mut wide = 0i64;
        let mut narrow = 0i32;
        write_out_value(42, "f", "x", &mut Arg::from(&mut wide), &SITE, &mut verdicts);
        write_out_value(1 << 33 | 7, "f", "y", &mut Arg::from(&mut narrow), &SITE, &mut verdicts);
        assert_eq!(wide, 42);
        assert_eq!(narrow, 7);
        assert!(verdicts.failures.is_empty());

        write_out_value(1, "f", "z", &mut Arg::Word(0), &SITE, &mut verdicts);
        assert_eq!(verdicts.failures.len(), 1);
    }

    #[test]
    fn fill_copies_copy_size_bytes() {
        let constraint = fill("buf", b"abcdefgh", 4);
        assert_eq!(constraint.copy_size(), 4);
        let ConstraintKind::Fill(bytes) = constraint.kind() else {
            panic!("fill should build a fill");
        };

        let mut verdicts = Verdicts::default();
        let mut dest = [0u8; 6];
        copy_out_buffer(bytes, "f", "buf", &mut Arg::from(&mut dest), &SITE, &mut verdicts);
        assert_eq!(&dest, b"abcd\0\0");
        assert!(verdicts.failures.is_empty());
    }

    #[test]
    fn fill_into_short_buffer_copies_what_fits_and_fails() {
        let mut verdicts = Verdicts::default();
        let mut dest = [0u8; 2];
        copy_out_buffer(b"xyz", "f", "buf", &mut Arg::from(&mut dest), &SITE, &mut verdicts);
        assert_eq!(&dest, b"xy");
        assert_eq!(verdicts.failures.len(), 1);
    }

    #[test]
    fn fill_clamps_to_source_length() {
        assert_eq!(fill("buf", b"ab", 16).copy_size(), 2);
    }
}
