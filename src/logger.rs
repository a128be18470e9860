//! Logging utilities with colored module prefixes.
//!
//! Two macros are exported:
//! - `log!("module"; "...", args)` for normal progress output
//! - `warn!("module"; "...", args)` for recoverable config problems
//!
//! Warnings go to stderr so that piping stdout still yields a clean
//! build transcript.

use colored::{ColoredString, Colorize};
use std::io::{Write, stderr, stdout};

/// Log a message with a colored module prefix.
///
/// # Usage
/// ```ignore
/// log!("module"; "message with {} formatting", args);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Log a warning with a yellow module prefix.
#[macro_export]
macro_rules! warn {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::warn($module, &format!($($arg)*))
    }};
}

#[inline]
pub fn log(module: &str, message: &str) {
    let prefix = colorize_prefix(module);
    let mut stdout = stdout().lock();
    writeln!(stdout, "{prefix} {message}").ok();
    stdout.flush().ok();
}

#[inline]
pub fn warn(module: &str, message: &str) {
    let prefix = format!("[{module}]").yellow().bold();
    let mut stderr = stderr().lock();
    writeln!(stderr, "{prefix} {message}").ok();
    stderr.flush().ok();
}

/// Apply color to a module prefix based on module type.
#[inline]
fn colorize_prefix(module: &str) -> ColoredString {
    let wrapped = format!("[{module}]");
    match module {
        "build" | "page" => wrapped.green().bold(),
        "config" | "check" => wrapped.cyan().bold(),
        "style" | "asset" | "format" => wrapped.blue().bold(),
        "error" => wrapped.red().bold(),
        _ => wrapped.normal().bold(),
    }
}
