//! Fatal error reporting

/// Abort on a broken runtime invariant
///
/// Logs file, line and message at error level, then panics. Used where the
/// runtime's own bookkeeping can no longer be trusted, never for errors a
/// program could observe and recover from.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::__log::error!("[Fatal] {}:{}: {}", file!(), line!(), msg);
        panic!("{}", msg)
    }};
}
