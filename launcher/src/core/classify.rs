//! Failure classification for exit-code selection.

use std::io;

use crate::core::types::FailureCategory;
use crate::errors::BootstrapError;

#[cfg(unix)]
const ENOSPC: i32 = nix::errno::Errno::ENOSPC as i32;
#[cfg(unix)]
const EPIPE: i32 = nix::errno::Errno::EPIPE as i32;
#[cfg(not(unix))]
const ENOSPC: i32 = 28;
#[cfg(not(unix))]
const EPIPE: i32 = 32;

/// Classify an error by walking its chain outermost-first.
///
/// The first [`BootstrapError`] or [`io::Error`] found decides the category;
/// anything else is unanticipated.
pub fn classify(err: &anyhow::Error) -> FailureCategory {
    for cause in err.chain() {
        if let Some(bootstrap) = cause.downcast_ref::<BootstrapError>() {
            return bootstrap.category();
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return io_category(io_err);
        }
    }
    FailureCategory::Unanticipated
}

pub fn io_category(err: &io::Error) -> FailureCategory {
    match err.kind() {
        io::ErrorKind::StorageFull => return FailureCategory::DiskFull,
        io::ErrorKind::BrokenPipe => return FailureCategory::BrokenPipe,
        _ => {}
    }
    match err.raw_os_error() {
        Some(ENOSPC) => FailureCategory::DiskFull,
        Some(EPIPE) => FailureCategory::BrokenPipe,
        _ => FailureCategory::OtherIo,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use anyhow::{Context, anyhow};

    use super::*;

    #[test]
    fn io_errors_classified_by_kind_and_errno() {
        let disk_full = io::Error::from_raw_os_error(ENOSPC);
        let pipe = io::Error::from(io::ErrorKind::BrokenPipe);
        let other = io::Error::from(io::ErrorKind::PermissionDenied);

        assert_eq!(io_category(&disk_full), FailureCategory::DiskFull);
        assert_eq!(io_category(&pipe), FailureCategory::BrokenPipe);
        assert_eq!(io_category(&other), FailureCategory::OtherIo);
    }

    #[test]
    fn io_error_under_context_is_still_io() {
        let err = Err::<(), _>(io::Error::from_raw_os_error(EPIPE))
            .context("write engine output")
            .unwrap_err();
        assert_eq!(classify(&err), FailureCategory::BrokenPipe);
    }

    #[test]
    fn detect_failure_is_unanticipated_even_with_io_source() {
        let err = anyhow::Error::new(BootstrapError::DetectBackend {
            path: PathBuf::from("/missing/launcher"),
            source: io::Error::from(io::ErrorKind::NotFound),
        });
        assert_eq!(classify(&err), FailureCategory::Unanticipated);
    }

    #[test]
    fn typed_failures_keep_category_through_context() {
        let err = anyhow::Error::new(BootstrapError::NoProject {
            start: PathBuf::from("/tmp"),
        })
        .context("acquire project");
        assert_eq!(classify(&err), FailureCategory::Configuration);

        let err = anyhow::Error::new(BootstrapError::Interrupted);
        assert_eq!(classify(&err), FailureCategory::Interrupted);
    }

    #[test]
    fn untyped_errors_are_unanticipated() {
        assert_eq!(
            classify(&anyhow!("engine produced garbage")),
            FailureCategory::Unanticipated
        );
    }
}
