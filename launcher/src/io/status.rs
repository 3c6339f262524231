//! Final status reporting.
//!
//! The reporter is built before anything else runs, picks up the build id and
//! the first failure message along the way, and is consumed by
//! [`StatusReporter::report`] so a run can report at most once.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::types::BuildId;

/// Environment variable naming a JSON-lines file to append reports to.
pub const STATUS_FILE_ENV: &str = "LAUNCHER_STATUS_FILE";

/// What gets transmitted at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub build_id: Option<BuildId>,
    /// First launcher argument (e.g. `build`, `run`, `kill`).
    pub command: Option<String>,
    pub status_message: Option<String>,
    pub exit_code: i32,
}

/// Delivery mechanism for the final report.
pub trait ReportTransport {
    fn send(&self, report: &StatusReport) -> Result<()>;
}

/// Appends each report as one JSON line.
pub struct JsonLinesTransport {
    path: PathBuf,
}

impl JsonLinesTransport {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ReportTransport for JsonLinesTransport {
    fn send(&self, report: &StatusReport) -> Result<()> {
        let mut line = serde_json::to_string(report).context("serialize status report")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open status file {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append status file {}", self.path.display()))
    }
}

/// Emits the report as a log event.
pub struct LogTransport;

impl ReportTransport for LogTransport {
    fn send(&self, report: &StatusReport) -> Result<()> {
        info!(
            build_id = report.build_id.as_ref().map(BuildId::as_str),
            command = report.command.as_deref(),
            status_message = report.status_message.as_deref(),
            exit_code = report.exit_code,
            "launcher finished"
        );
        Ok(())
    }
}

/// Pick the transport from the environment.
pub fn transport_from_env() -> Box<dyn ReportTransport> {
    match std::env::var_os(STATUS_FILE_ENV) {
        Some(path) if !path.is_empty() => Box::new(JsonLinesTransport::new(PathBuf::from(path))),
        _ => Box::new(LogTransport),
    }
}

impl<T: ReportTransport + ?Sized> ReportTransport for Box<T> {
    fn send(&self, report: &StatusReport) -> Result<()> {
        (**self).send(report)
    }
}

/// Accumulates run status and sends it once.
pub struct StatusReporter<T: ReportTransport> {
    build_id: Option<BuildId>,
    command: Option<String>,
    status_message: Option<String>,
    transport: T,
}

impl<T: ReportTransport> StatusReporter<T> {
    pub fn new(command: Option<String>, transport: T) -> Self {
        Self {
            build_id: None,
            command,
            status_message: None,
            transport,
        }
    }

    pub fn set_build_id(&mut self, build_id: BuildId) {
        self.build_id = Some(build_id);
    }

    pub fn build_id(&self) -> Option<&BuildId> {
        self.build_id.as_ref()
    }

    /// Record a status message. The first non-empty message wins.
    pub fn set_status_message(&mut self, message: impl Into<String>) {
        let message = message.into();
        if self.status_message.is_none() && !message.trim().is_empty() {
            self.status_message = Some(message);
        }
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    /// Build the final report and hand it to the transport.
    ///
    /// Transport failures are returned to the caller, which must not let them
    /// affect the exit code.
    pub fn report(self, exit_code: i32) -> Result<StatusReport> {
        let report = StatusReport {
            build_id: self.build_id,
            command: self.command,
            status_message: self.status_message,
            exit_code,
        };
        debug!(exit_code, "sending status report");
        self.transport.send(&report)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::anyhow;

    use super::*;

    struct FailingTransport;

    impl ReportTransport for FailingTransport {
        fn send(&self, _report: &StatusReport) -> Result<()> {
            Err(anyhow!("telemetry endpoint unreachable"))
        }
    }

    #[test]
    fn first_non_empty_status_message_wins() {
        let mut reporter = StatusReporter::new(None, LogTransport);
        reporter.set_status_message("  ");
        reporter.set_status_message("disk full");
        reporter.set_status_message("later failure");
        assert_eq!(reporter.status_message(), Some("disk full"));
    }

    #[test]
    fn json_lines_transport_appends_one_line_per_report() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("status.jsonl");

        for code in [0, 3] {
            let mut reporter = StatusReporter::new(
                Some("build".to_string()),
                JsonLinesTransport::new(path.clone()),
            );
            reporter.set_build_id(BuildId::from_bytes([1; 16]));
            reporter.report(code).expect("report");
        }

        let contents = fs::read_to_string(&path).expect("read status file");
        let reports: Vec<StatusReport> = contents
            .lines()
            .map(|line| serde_json::from_str(line).expect("parse line"))
            .collect();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].exit_code, 3);
        assert_eq!(reports[0].command.as_deref(), Some("build"));
        assert_eq!(reports[0].build_id, Some(BuildId::from_bytes([1; 16])));
    }

    #[test]
    fn transport_failure_is_returned_not_swallowed() {
        let reporter = StatusReporter::new(None, FailingTransport);
        let err = reporter.report(0).unwrap_err();
        assert!(err.to_string().contains("unreachable"));
    }
}
