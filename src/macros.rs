//! Declaration macros.
//!
//! Each macro captures the call site with `file!()`/`line!()` and names functions and
//! parameters by stringifying their identifiers, so a test reads like the code it mocks:
//!
//! ```rust
//! use trellis::constraint::{set, want};
//! use trellis::{Context, expect, mock, will_return};
//!
//! fn read(ctx: &mut Context<'_>, fd: i64, count: &mut i64) -> i64 {
//!     mock!(ctx, fd, count)
//! }
//!
//! fn reads_four_bytes(ctx: &mut Context<'_>) {
//!     expect!(ctx, read, want("fd", 3), set("count", 4));
//!     will_return!(ctx, read, 4);
//!
//!     let mut count = 0;
//!     assert_eq!(read(ctx, 3, &mut count), 4);
//!     assert_eq!(count, 4);
//! }
//! # let mut suite = trellis::TestSuite::new("doc");
//! # trellis::add_test!(suite, reads_four_bytes);
//! ```

/// The [`Site`](crate::Site) of the macro invocation.
#[macro_export]
macro_rules! site {
    () => {
        $crate::Site::new(file!(), line!())
    };
}

/// Name of the function the macro is expanded in, without its module path.
#[doc(hidden)]
#[macro_export]
macro_rules! function_name {
    () => {{
        fn here() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let path = type_name_of(here);
        let path = path.strip_suffix("::here").unwrap_or(path);
        let path = path.trim_end_matches("::{{closure}}");
        match path.rfind("::") {
            Some(pos) => &path[pos + 2..],
            None => path,
        }
    }};
}

/// Record a call to the enclosing function and return its stubbed result.
///
/// `mock!(ctx, a, b)` names parameters after the identifiers passed; `mock!(ctx, a: expr)`
/// names them explicitly.
#[macro_export]
macro_rules! mock {
    ($ctx:expr, $($name:ident : $value:expr),+ $(,)?) => {
        $ctx.mock(
            $crate::function_name!(),
            &mut [$($crate::Param::new(stringify!($name), $value)),+],
        )
    };
    ($ctx:expr $(, $param:ident)* $(,)?) => {
        $ctx.mock(
            $crate::function_name!(),
            &mut [$($crate::Param::new(stringify!($param), $param)),*],
        )
    };
}

/// Whether the enclosing function's stand-in is enabled in this test.
#[macro_export]
macro_rules! mock_enabled {
    ($ctx:expr) => {
        $ctx.mock_enabled($crate::function_name!())
    };
}

/// Expect one call to `function`, checking `constraints` against its arguments.
#[macro_export]
macro_rules! expect {
    ($ctx:expr, $function:ident $(, $constraint:expr)* $(,)?) => {
        $ctx.expect(stringify!($function), $crate::site!(), vec![$($constraint),*])
    };
}

/// Like [`expect!`], but for every call and never reported as unmet.
#[macro_export]
macro_rules! always_expect {
    ($ctx:expr, $function:ident $(, $constraint:expr)* $(,)?) => {
        $ctx.always_expect(stringify!($function), $crate::site!(), vec![$($constraint),*])
    };
}

/// Fail the test whenever `function` is called.
#[macro_export]
macro_rules! expect_never {
    ($ctx:expr, $function:ident $(,)?) => {
        $ctx.expect_never(stringify!($function), $crate::site!())
    };
}

#[macro_export]
macro_rules! will_return {
    ($ctx:expr, $function:ident, $value:expr $(,)?) => {
        $ctx.will_return(stringify!($function), ($value) as i64)
    };
}

#[macro_export]
macro_rules! always_return {
    ($ctx:expr, $function:ident, $value:expr $(,)?) => {
        $ctx.always_return(stringify!($function), ($value) as i64)
    };
}

#[macro_export]
macro_rules! will_respond {
    ($ctx:expr, $function:ident, $value:expr $(, $constraint:expr)* $(,)?) => {
        $ctx.will_respond(
            stringify!($function),
            ($value) as i64,
            $crate::site!(),
            vec![$($constraint),*],
        )
    };
}

#[macro_export]
macro_rules! always_respond {
    ($ctx:expr, $function:ident, $value:expr $(, $constraint:expr)* $(,)?) => {
        $ctx.always_respond(
            stringify!($function),
            ($value) as i64,
            $crate::site!(),
            vec![$($constraint),*],
        )
    };
}

/// Add a test named after the procedure.
#[macro_export]
macro_rules! add_test {
    ($suite:expr, $procedure:ident $(,)?) => {
        $suite.add_test(stringify!($procedure), $procedure)
    };
}

#[macro_export]
macro_rules! add_tests {
    ($suite:expr $(, $procedure:ident)+ $(,)?) => {
        $($crate::add_test!($suite, $procedure);)+
    };
}

// Assertions

#[macro_export]
macro_rules! assert_true {
    ($ctx:expr, $condition:expr $(,)?) => {
        $ctx.assert_true(
            $crate::site!(),
            $condition,
            format_args!("[{}] should be true", stringify!($condition)),
        )
    };
    ($ctx:expr, $condition:expr, $($message:tt)+) => {
        $ctx.assert_true($crate::site!(), $condition, format_args!($($message)+))
    };
}

#[macro_export]
macro_rules! assert_false {
    ($ctx:expr, $condition:expr $(,)?) => {
        $ctx.assert_false(
            $crate::site!(),
            $condition,
            format_args!("[{}] should be false", stringify!($condition)),
        )
    };
    ($ctx:expr, $condition:expr, $($message:tt)+) => {
        $ctx.assert_false($crate::site!(), $condition, format_args!($($message)+))
    };
}

#[macro_export]
macro_rules! assert_equal {
    ($ctx:expr, $tried:expr, $expected:expr $(,)?) => {
        $ctx.assert_equal($crate::site!(), ($tried) as i64, ($expected) as i64)
    };
}

#[macro_export]
macro_rules! assert_not_equal {
    ($ctx:expr, $tried:expr, $expected:expr $(,)?) => {
        $ctx.assert_not_equal($crate::site!(), ($tried) as i64, ($expected) as i64)
    };
}

#[macro_export]
macro_rules! assert_string_equal {
    ($ctx:expr, $tried:expr, $expected:expr $(,)?) => {
        $ctx.assert_string_equal($crate::site!(), $tried, $expected)
    };
}

#[macro_export]
macro_rules! assert_double_equal {
    ($ctx:expr, $tried:expr, $expected:expr $(,)?) => {
        $ctx.assert_double_equal($crate::site!(), ($tried) as f64, ($expected) as f64)
    };
}

#[macro_export]
macro_rules! fail {
    ($ctx:expr, $($message:tt)+) => {
        $ctx.fail($crate::site!(), format_args!($($message)+))
    };
}
