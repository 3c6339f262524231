//! Process orchestration for one launcher run.
//!
//! Sequence: signal handlers, build id, project context, trace scope, backend,
//! then `kill` or `launch`. Every acquisition is a guard, so cleanup runs on
//! each exit path; the trace flush happens once, after all of them dropped.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::core::types::{BuildId, FailureCategory, Invocation, Outcome};
use crate::io::backend::{BackendFactory, BackendGuard};
use crate::io::detect::{classify_artifact, resolve_invoked_path};
use crate::io::project::ProjectContext;
use crate::io::signals::Interrupt;
use crate::io::status::{ReportTransport, StatusReporter};
use crate::io::trace::TraceBuffer;

/// Source of the project context for a run.
pub trait ProjectLocator {
    fn acquire(&self) -> Result<ProjectContext>;
}

/// Discovers the project from the current working directory.
pub struct CurrentDirLocator;

impl ProjectLocator for CurrentDirLocator {
    fn acquire(&self) -> Result<ProjectContext> {
        let cwd = std::env::current_dir()
            .map_err(crate::errors::BootstrapError::from)
            .context("read current directory")?;
        ProjectContext::discover(&cwd)
    }
}

/// Collaborators for one run.
pub struct Orchestrator<'a, L: ProjectLocator, F: BackendFactory> {
    pub locator: &'a L,
    pub factory: &'a F,
    pub interrupt: &'a Interrupt,
    pub traces: &'a TraceBuffer,
}

impl<L: ProjectLocator, F: BackendFactory> Orchestrator<'_, L, F> {
    /// Run the bootstrap sequence and return the backend's outcome.
    ///
    /// The reporter receives the build id before anything fallible runs, and
    /// the trace is flushed whenever the project context was acquired.
    pub fn run<T: ReportTransport>(
        &self,
        invocation: &Invocation,
        reporter: &mut StatusReporter<T>,
    ) -> Result<Outcome> {
        let build_id = BuildId::generate();
        reporter.set_build_id(build_id.clone());
        info!(build_id = %build_id, "launcher starting");
        self.interrupt.install()?;

        let mut trace_dir = None;
        let result = self.run_in_project(invocation, &build_id, &mut trace_dir);
        self.flush_traces(trace_dir.as_deref(), &build_id);
        result
    }

    fn run_in_project(
        &self,
        invocation: &Invocation,
        build_id: &BuildId,
        trace_dir: &mut Option<PathBuf>,
    ) -> Result<Outcome> {
        let project = self.locator.acquire()?;
        *trace_dir = Some(project.trace_dir());
        let _main = self.traces.start("main");
        self.interrupt.check()?;

        let kind = {
            let _detect = self.traces.start("detect");
            let artifact = resolve_invoked_path(&invocation.program)?;
            classify_artifact(&artifact)?
        };
        let mut backend = BackendGuard::new(self.factory.create(
            kind,
            &project,
            invocation,
            self.interrupt,
        )?);
        self.interrupt.check()?;

        let outcome = if invocation.is_kill() {
            let _kill = self.traces.start("kill");
            debug!("maintenance command: stopping daemon");
            match backend.backend().kill()? {
                Outcome::DeferredExec { .. } => Outcome::Failed {
                    category: FailureCategory::Unanticipated,
                    detail: "kill requested a deferred exec".to_string(),
                },
                outcome => outcome,
            }
        } else {
            let _launch = self.traces.start("launch");
            backend.backend().launch(build_id)?
        };
        self.interrupt.check()?;
        Ok(outcome)
    }

    fn flush_traces(&self, dir: Option<&Path>, build_id: &BuildId) {
        let Some(dir) = dir else {
            debug!("no project context, skipping trace flush");
            return;
        };
        if let Err(err) = self.traces.flush(dir, build_id) {
            warn!(err = %format!("{err:#}"), "failed to write launch trace");
        }
    }
}
