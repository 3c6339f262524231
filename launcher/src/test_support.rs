//! Test-only fakes for the bootstrap seams: projects, backends, report
//! transports and process replacement.
//!
//! The fakes share an [`EventLog`] so tests can assert the order in which the
//! launcher touched each collaborator.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::bootstrap::ProcessReplacer;
use crate::core::types::{BuildId, ExecTarget, Invocation, Outcome};
use crate::errors::BootstrapError;
use crate::io::backend::{BackendFactory, ExecutionBackend};
use crate::io::detect::BackendKind;
use crate::io::project::{PROJECT_MARKER, ProjectContext};
use crate::io::signals::Interrupt;
use crate::io::status::{ReportTransport, StatusReport};
use crate::orchestrate::ProjectLocator;

/// Ordered record of collaborator calls.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events
            .lock()
            .expect("event log lock")
            .push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("event log lock").clone()
    }
}

/// Temporary directory containing a project marker.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        Self::with_config("")
    }

    pub fn with_config(config: &str) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join(PROJECT_MARKER), config)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Directory the launch trace lands in with the default config.
    pub fn trace_dir(&self) -> PathBuf {
        self.path().join("launcher-out/log/traces")
    }

    pub fn trace_files(&self) -> Vec<PathBuf> {
        match fs::read_dir(self.trace_dir()) {
            Ok(entries) => entries.filter_map(|e| e.ok().map(|e| e.path())).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Locates the project by walking up from a fixed directory.
pub struct DiscoverLocator {
    pub start: PathBuf,
}

impl DiscoverLocator {
    pub fn new(start: impl Into<PathBuf>) -> Self {
        Self {
            start: start.into(),
        }
    }
}

impl ProjectLocator for DiscoverLocator {
    fn acquire(&self) -> Result<ProjectContext> {
        ProjectContext::discover(&self.start)
    }
}

/// What a scripted backend call does.
#[derive(Debug, Clone)]
pub enum Step {
    Return(Outcome),
    /// Fail with an I/O error carrying this raw OS error code.
    FailIo(i32),
    /// Fail without a recognizable category.
    FailOther(String),
    /// Trip the run's interrupt flag, then unwind as interrupted.
    Interrupt,
}

impl Step {
    fn perform(&self, interrupt: &Interrupt) -> Result<Outcome> {
        match self {
            Self::Return(outcome) => Ok(outcome.clone()),
            Self::FailIo(code) => {
                Err(BootstrapError::from(io::Error::from_raw_os_error(*code)).into())
            }
            Self::FailOther(message) => Err(anyhow!(message.clone())),
            Self::Interrupt => {
                interrupt.trigger();
                Err(BootstrapError::Interrupted.into())
            }
        }
    }
}

/// Factory for [`ScriptedBackend`]s.
#[derive(Debug, Clone)]
pub struct ScriptedFactory {
    pub launch: Step,
    pub kill: Step,
    pub events: EventLog,
    kinds: Arc<Mutex<Vec<BackendKind>>>,
    build_ids: Arc<Mutex<Vec<BuildId>>>,
}

impl ScriptedFactory {
    pub fn new(launch: Step, events: EventLog) -> Self {
        Self {
            launch,
            kill: Step::Return(Outcome::Completed { exit_code: 0 }),
            events,
            kinds: Arc::default(),
            build_ids: Arc::default(),
        }
    }

    pub fn with_kill(mut self, kill: Step) -> Self {
        self.kill = kill;
        self
    }

    /// Kinds the factory was asked to build.
    pub fn kinds(&self) -> Vec<BackendKind> {
        self.kinds.lock().expect("kinds lock").clone()
    }

    /// Build ids passed to `launch`.
    pub fn build_ids(&self) -> Vec<BuildId> {
        self.build_ids.lock().expect("build ids lock").clone()
    }
}

impl BackendFactory for ScriptedFactory {
    fn create(
        &self,
        kind: BackendKind,
        _project: &ProjectContext,
        _invocation: &Invocation,
        interrupt: &Interrupt,
    ) -> Result<Box<dyn ExecutionBackend>> {
        self.kinds.lock().expect("kinds lock").push(kind);
        Ok(Box::new(ScriptedBackend {
            script: self.clone(),
            interrupt: interrupt.clone(),
        }))
    }
}

/// Backend that returns scripted outcomes and records every call.
pub struct ScriptedBackend {
    script: ScriptedFactory,
    interrupt: Interrupt,
}

impl ExecutionBackend for ScriptedBackend {
    fn launch(&mut self, build_id: &BuildId) -> Result<Outcome> {
        self.script.events.push("launch");
        self.script
            .build_ids
            .lock()
            .expect("build ids lock")
            .push(build_id.clone());
        self.script.launch.perform(&self.interrupt)
    }

    fn kill(&mut self) -> Result<Outcome> {
        self.script.events.push("kill");
        self.script.kill.perform(&self.interrupt)
    }

    fn dispose(&mut self) {
        self.script.events.push("dispose");
    }
}

/// Transport that keeps every report in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    reports: Arc<Mutex<Vec<StatusReport>>>,
    events: Option<EventLog>,
    fail: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the report, then fails the send.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn reports(&self) -> Vec<StatusReport> {
        self.reports.lock().expect("reports lock").clone()
    }
}

impl ReportTransport for RecordingTransport {
    fn send(&self, report: &StatusReport) -> Result<()> {
        if let Some(events) = &self.events {
            events.push("report");
        }
        self.reports
            .lock()
            .expect("reports lock")
            .push(report.clone());
        if self.fail {
            return Err(anyhow!("status endpoint unavailable"));
        }
        Ok(())
    }
}

/// Replacer that records targets instead of replacing the process.
#[derive(Debug, Clone, Default)]
pub struct RecordingReplacer {
    targets: Arc<Mutex<Vec<ExecTarget>>>,
    events: Option<EventLog>,
    fail: bool,
}

impl RecordingReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn targets(&self) -> Vec<ExecTarget> {
        self.targets.lock().expect("targets lock").clone()
    }
}

impl ProcessReplacer for RecordingReplacer {
    fn replace(&self, target: &ExecTarget) -> io::Result<()> {
        if let Some(events) = &self.events {
            events.push("exec");
        }
        self.targets
            .lock()
            .expect("targets lock")
            .push(target.clone());
        if self.fail {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        Ok(())
    }
}
