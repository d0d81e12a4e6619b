//! # Fatal assertion handling
//!
//! There is only one way for this HAL to report a violated invariant, for example an invalid
//! interrupt ID or an invalid core index: the [fatal_assert] macro. It reports the source
//! location of the failed check to the assertion hook and halts the core. There is no recovery,
//! continuing with a corrupted interrupt routing or tick state is worse than stopping.
//!
//! The hook is registered once with [set_assert_hook], usually by the kernel glue which
//! forwards the location to the assertion handler of the kernel. Without a registered hook,
//! a failed assertion panics, and the panic handler of the application is responsible for
//! halting.
use core::ffi::CStr;

use once_cell::sync::OnceCell;

/// Assertion sink. Receives the line number and the file name of the failed check.
pub type AssertHook = fn(line: u32, file: &'static CStr);

static ASSERT_HOOK: OnceCell<AssertHook> = OnceCell::new();

/// Register the assertion hook.
///
/// The hook can only be set once. The passed hook is returned if a hook was already set.
pub fn set_assert_hook(hook: AssertHook) -> Result<(), AssertHook> {
    ASSERT_HOOK.set(hook)
}

/// Report a failed assertion and halt. Use the [fatal_assert] macro instead of calling this
/// directly.
#[cold]
#[inline(never)]
pub fn assertion_failed(line: u32, file: &'static CStr) -> ! {
    let file_str = file.to_str().unwrap_or("<unknown>");
    ::log::error!("fatal assertion failed at {}:{}", file_str, line);
    match ASSERT_HOOK.get() {
        Some(hook) => {
            hook(line, file);
            crate::halt()
        }
        None => panic!("fatal assertion failed at {}:{}", file_str, line),
    }
}

/// Checks a condition and calls [assertion_failed] with the current source location if it
/// does not hold. Checked in release builds as well.
#[macro_export]
macro_rules! fatal_assert {
    ($cond:expr $(,)?) => {
        if !$cond {
            $crate::fatal::assertion_failed(
                line!(),
                match ::core::ffi::CStr::from_bytes_with_nul(concat!(file!(), "\0").as_bytes()) {
                    Ok(file) => file,
                    Err(_) => c"<unknown>",
                },
            );
        }
    };
}

/// Unwrap a [Result], reporting the error location with [assertion_failed] on error.
#[macro_export]
macro_rules! fatal_unwrap {
    ($result:expr $(,)?) => {
        match $result {
            Ok(value) => value,
            Err(_) => $crate::fatal::assertion_failed(
                line!(),
                match ::core::ffi::CStr::from_bytes_with_nul(concat!(file!(), "\0").as_bytes()) {
                    Ok(file) => file,
                    Err(_) => c"<unknown>",
                },
            ),
        }
    };
}
