//! Error classification: terminal failure → user-facing message + exit
//! status.

use clap::CommandFactory;

use preload_error::PreloadError;

use crate::options::Cli;

/// Where to send reports for unexpected failures.
pub const ISSUE_TRACKER: &str = "https://github.com/balena-os/balena-preload/issues";

/// Prints a terminal error to stderr and returns the process exit status.
///
/// Usage, auth, and domain errors get a concise line without a debug dump;
/// anything else is printed in full detail with a bug-report pointer.
pub fn report(err: &PreloadError) -> i32 {
    match err {
        PreloadError::Usage(msg) => {
            eprintln!("Error: {msg}");
            eprintln!();
            eprintln!("{}", usage_text());
            1
        }
        PreloadError::Auth(msg) | PreloadError::Domain(msg) => {
            eprintln!("Error: {msg}");
            1
        }
        PreloadError::Unexpected { report, code } => {
            eprintln!("Unexpected error: {report:?}");
            eprintln!();
            eprintln!("If this looks like a bug, please report it at {ISSUE_TRACKER}");
            exit_status(*code)
        }
    }
}

/// Picks the exit status for an unexpected error.
fn exit_status(code: Option<i32>) -> i32 {
    match code {
        Some(code) if code > 0 => code,
        _ => 1,
    }
}

/// Renders the CLI usage line.
fn usage_text() -> String {
    Cli::command().render_usage().to_string()
}
