//! Stable exit codes for the launcher process.
//!
//! External tooling and CI scripts match on these integers, so the values must
//! never change. Exit codes returned by the engine itself are passed through
//! unchanged and are not listed here.

use crate::core::types::FailureCategory;

/// Run succeeded, including runs that end in deferred execution of a target.
pub const SUCCESS: i32 = 0;
/// No project root or usable project configuration (command line error).
pub const CONFIGURATION: i32 = 3;
/// Fatal bootstrap error; anything not otherwise classified.
pub const UNANTICIPATED: i32 = 11;
/// I/O failure other than disk full or broken pipe.
pub const IO: i32 = 13;
/// I/O failure caused by the disk running out of space.
pub const DISK_FULL: i32 = 14;
/// Interrupted by the user (128 + SIGINT).
pub const INTERRUPTED: i32 = 130;
/// Downstream reader closed the pipe (128 + SIGPIPE).
pub const BROKEN_PIPE: i32 = 141;

/// Translate a failure category into its exit code.
pub fn for_category(category: FailureCategory) -> i32 {
    match category {
        FailureCategory::Configuration => CONFIGURATION,
        FailureCategory::DiskFull => DISK_FULL,
        FailureCategory::BrokenPipe => BROKEN_PIPE,
        FailureCategory::OtherIo => IO,
        FailureCategory::Interrupted => INTERRUPTED,
        FailureCategory::Unanticipated => UNANTICIPATED,
    }
}
