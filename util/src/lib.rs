/// Poor man's approx assertion for scalars
#[macro_export]
macro_rules! assert_approx_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let x: f64 = $x;
        let y: f64 = $y;
        let absdiff = (x - y).abs();
        if !(absdiff <= $tol) {
            panic!(
                "assert_approx_eq!({}, {}) failed.\n left: {:e}\nright: {:e}\n diff: {:e}\nabstol: {:e}",
                stringify!($x),
                stringify!($y),
                x,
                y,
                absdiff,
                $tol
            );
        }
    }};
}

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// Returns the message of a panic payload, if it is a string.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
}

/// Asserts that the expression panics with a message containing the given text.
#[macro_export]
macro_rules! assert_panics_with {
    ($e:expr, $text:expr) => {{
        use std::panic::{catch_unwind, AssertUnwindSafe};
        let expr_string = std::stringify!($e);
        match catch_unwind(AssertUnwindSafe(|| $e)) {
            Ok(_) => panic!("assert_panics_with!({}) failed: no panic.", expr_string),
            Err(payload) => {
                let message = $crate::panic_message(payload.as_ref()).unwrap_or("");
                assert!(
                    message.contains($text),
                    "assert_panics_with!({}) failed: message \"{}\" does not contain \"{}\".",
                    expr_string,
                    message,
                    $text
                );
            }
        }
    }};
}
