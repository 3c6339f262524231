//! Typed bootstrap failures.
//!
//! Plumbing code returns `anyhow::Result` with context; the variants here mark
//! the failures whose category must survive that wrapping.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::FailureCategory;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("no .launcher.toml found in {} or any parent directory", start.display())]
    NoProject { start: PathBuf },

    #[error("invalid project configuration {}: {reason}", path.display())]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("invalid command line: {0}")]
    InvalidCommandLine(String),

    #[error("launcher interrupted by user")]
    Interrupted,

    /// The invoked artifact could not be inspected.
    #[error("failed to inspect launcher artifact {}: {source}", path.display())]
    DetectBackend {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to install signal handlers: {0}")]
    SignalInstall(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl BootstrapError {
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::NoProject { .. } | Self::InvalidConfig { .. } | Self::InvalidCommandLine(_) => {
                FailureCategory::Configuration
            }
            Self::Interrupted => FailureCategory::Interrupted,
            Self::DetectBackend { .. } | Self::SignalInstall(_) => FailureCategory::Unanticipated,
            Self::Io(err) => crate::core::classify::io_category(err),
        }
    }
}
