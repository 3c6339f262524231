//! Shared types for the launcher bootstrap.
//!
//! These types define the contract between the orchestrator, the execution
//! backends, and the entry point. They carry no I/O handles.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Failure taxonomy used to pick an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// No project found, invalid project config, or unusable command line.
    Configuration,
    DiskFull,
    BrokenPipe,
    OtherIo,
    /// User interruption (SIGINT).
    Interrupted,
    Unanticipated,
}

/// Per-run correlation id shared by status reporting and tracing.
///
/// Rendered as a version 4 UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(String);

impl BuildId {
    /// Generate a fresh id from 128 random bits.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill(&mut bytes);
        Self::from_bytes(bytes)
    }

    /// Format raw bytes as a version 4, RFC 4122 variant UUID.
    pub fn from_bytes(mut bytes: [u8; 16]) -> Self {
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        let hex = hex::encode(bytes);
        Self(format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process to replace the launcher with after a successful `run`.
///
/// Written by the engine as JSON into the command-args file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecTarget {
    /// Program to execute.
    pub path: PathBuf,
    /// Full argument vector, including `argv[0]`.
    pub argv: Vec<String>,
    /// Complete environment for the target; replaces the launcher's.
    #[serde(default)]
    pub envp: BTreeMap<String, String>,
    /// Working directory for the target.
    pub cwd: PathBuf,
}

/// Result of a backend `launch` or `kill`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The backend finished; its exit code is authoritative.
    Completed { exit_code: i32 },
    /// The build succeeded and asked for the launcher to be replaced by
    /// `target` once reporting is done.
    DeferredExec {
        target: ExecTarget,
        preceding_exit_code: i32,
    },
    /// The backend classified its own failure.
    Failed {
        category: FailureCategory,
        detail: String,
    },
}

/// The argument list the launcher was started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// `argv[0]`, used to locate the invoked artifact.
    pub program: OsString,
    /// `argv[1..]`, forwarded to the engine.
    pub args: Vec<OsString>,
}

impl Invocation {
    pub fn new(program: impl Into<OsString>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// True when the invocation is exactly the `kill` maintenance command.
    pub fn is_kill(&self) -> bool {
        matches!(self.args.as_slice(), [only] if only == "kill")
    }

    /// True when the engine is asked to build and run a target.
    pub fn is_run(&self) -> bool {
        self.args.first().is_some_and(|first| first == "run")
    }

    /// First argument, lossily decoded, for status reports.
    pub fn command(&self) -> Option<String> {
        self.args
            .first()
            .map(|arg| arg.to_string_lossy().into_owned())
    }
}
