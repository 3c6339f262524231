//! Execution backends.
//!
//! The [`ExecutionBackend`] trait is the seam between the orchestrator and the
//! way the engine is installed. Tests use scripted backends that return
//! predetermined outcomes without spawning processes.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use crate::core::types::{BuildId, ExecTarget, Invocation, Outcome};
use crate::errors::BootstrapError;
use crate::exit_codes;
use crate::io::daemon::{DaemonKillRequest, kill_daemon};
use crate::io::detect::BackendKind;
use crate::io::process::run_to_completion;
use crate::io::project::ProjectContext;
use crate::io::signals::Interrupt;

/// Flag the engine understands for `run`: where to write the target to exec.
pub const COMMAND_ARGS_FLAG: &str = "--command-args-file";
/// Set when the engine is a staged package rather than a checkout binary.
pub const ENGINE_MODE_ENV: &str = "LAUNCHER_ENGINE_MODE";

/// Capability set shared by every backend.
pub trait ExecutionBackend {
    /// Run the engine for the current invocation.
    fn launch(&mut self, build_id: &BuildId) -> Result<Outcome>;
    /// Stop the persistent daemon associated with this backend.
    fn kill(&mut self) -> Result<Outcome>;
    /// Release anything the backend opened. Called exactly once.
    fn dispose(&mut self);
}

/// Owns a backend and disposes it on drop, on every exit path.
pub struct BackendGuard {
    backend: Box<dyn ExecutionBackend>,
}

impl BackendGuard {
    pub fn new(backend: Box<dyn ExecutionBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&mut self) -> &mut dyn ExecutionBackend {
        self.backend.as_mut()
    }
}

impl Drop for BackendGuard {
    fn drop(&mut self) {
        self.backend.dispose();
    }
}

/// Builds the backend for a detected installation kind.
pub trait BackendFactory {
    fn create(
        &self,
        kind: BackendKind,
        project: &ProjectContext,
        invocation: &Invocation,
        interrupt: &Interrupt,
    ) -> Result<Box<dyn ExecutionBackend>>;
}

/// Factory for the real Packaged and Repository backends.
pub struct SystemBackendFactory;

impl BackendFactory for SystemBackendFactory {
    fn create(
        &self,
        kind: BackendKind,
        project: &ProjectContext,
        invocation: &Invocation,
        interrupt: &Interrupt,
    ) -> Result<Box<dyn ExecutionBackend>> {
        let engine = EngineSession::new(project, invocation, interrupt);
        let backend: Box<dyn ExecutionBackend> = match kind {
            BackendKind::Packaged { archive } => Box::new(PackagedBackend::new(archive, engine)),
            BackendKind::Repository { root } => {
                let program = root.join(&project.config().engine.program);
                Box::new(RepositoryBackend::new(root, program, engine))
            }
        };
        Ok(backend)
    }
}

/// Everything the engine needs from the current run, independent of how the
/// engine is installed.
pub struct EngineSession {
    args: Vec<OsString>,
    is_run: bool,
    project_root: PathBuf,
    scratch_dir: PathBuf,
    output_dir: PathBuf,
    interrupt: Interrupt,
    interrupt_grace: Duration,
    daemon: DaemonKillRequest,
    command_args_file: Option<NamedTempFile>,
}

impl EngineSession {
    pub fn new(project: &ProjectContext, invocation: &Invocation, interrupt: &Interrupt) -> Self {
        let config = project.config();
        Self {
            args: invocation.args.clone(),
            is_run: invocation.is_run(),
            project_root: project.root().to_path_buf(),
            scratch_dir: project.scratch_dir().to_path_buf(),
            output_dir: project.output_dir().to_path_buf(),
            interrupt: interrupt.clone(),
            interrupt_grace: Duration::from_secs(config.engine.interrupt_grace_secs),
            daemon: DaemonKillRequest {
                pid_path: project.daemon_pid_path(),
                timeout: Duration::from_secs(config.daemon.kill_timeout_secs),
            },
            command_args_file: None,
        }
    }

    /// Spawn `program` with the invocation's arguments and wait for it.
    #[instrument(skip_all, fields(build_id = %build_id, program = %program.display()))]
    fn launch(
        &mut self,
        program: &Path,
        install_root: &Path,
        extra_env: &[(&str, &str)],
        build_id: &BuildId,
    ) -> Result<Outcome> {
        let mut cmd = Command::new(program);
        cmd.args(&self.args)
            .env("LAUNCHER_BUILD_ID", build_id.as_str())
            .env("LAUNCHER_PROJECT_ROOT", &self.project_root)
            .env("LAUNCHER_INSTALL_ROOT", install_root)
            .env("LAUNCHER_TMP_DIR", &self.scratch_dir)
            .envs(extra_env.iter().copied());

        let args_path = if self.is_run {
            let file = NamedTempFile::with_prefix_in("run-args-", &self.scratch_dir)
                .map_err(BootstrapError::from)
                .context("create command args file")?;
            let path = file.path().to_path_buf();
            cmd.arg(COMMAND_ARGS_FLAG).arg(&path);
            self.command_args_file = Some(file);
            Some(path)
        } else {
            None
        };

        let exit_code = run_to_completion(cmd, &self.interrupt, self.interrupt_grace)?;
        if exit_code != exit_codes::SUCCESS {
            info!(exit_code, "engine exited with failure");
            return Ok(Outcome::Completed { exit_code });
        }
        match args_path {
            Some(path) => read_exec_target(&path),
            None => Ok(Outcome::Completed { exit_code }),
        }
    }

    fn kill(&mut self) -> Result<Outcome> {
        kill_daemon(&self.daemon)
    }

    fn dispose(&mut self) {
        if let Some(file) = self.command_args_file.take() {
            debug!(path = %file.path().display(), "removing command args file");
        }
    }
}

fn read_exec_target(path: &Path) -> Result<Outcome> {
    let contents = fs::read_to_string(path)
        .map_err(BootstrapError::from)
        .with_context(|| format!("read command args {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(Outcome::Completed {
            exit_code: exit_codes::SUCCESS,
        });
    }
    let target: ExecTarget = serde_json::from_str(&contents)
        .with_context(|| format!("parse command args {}", path.display()))?;
    info!(target = %target.path.display(), "build succeeded, deferring exec of target");
    Ok(Outcome::DeferredExec {
        target,
        preceding_exit_code: exit_codes::SUCCESS,
    })
}

/// Runs the engine shipped inside a checkout of the launcher.
pub struct RepositoryBackend {
    root: PathBuf,
    program: PathBuf,
    engine: EngineSession,
}

impl RepositoryBackend {
    pub fn new(root: PathBuf, program: PathBuf, engine: EngineSession) -> Self {
        Self {
            root,
            program,
            engine,
        }
    }
}

impl ExecutionBackend for RepositoryBackend {
    fn launch(&mut self, build_id: &BuildId) -> Result<Outcome> {
        self.engine.launch(&self.program, &self.root, &[], build_id)
    }

    fn kill(&mut self) -> Result<Outcome> {
        self.engine.kill()
    }

    fn dispose(&mut self) {
        self.engine.dispose();
    }
}

/// Runs a staged copy of a packaged launcher archive.
///
/// Packages are staged once per content hash under
/// `<output>/launcher/packages/<hash>/package` and reused afterwards.
pub struct PackagedBackend {
    archive: PathBuf,
    engine: EngineSession,
}

impl PackagedBackend {
    pub fn new(archive: PathBuf, engine: EngineSession) -> Self {
        Self { archive, engine }
    }

    fn stage(&self) -> Result<PathBuf> {
        let hash = file_sha256(&self.archive)?;
        let dir = self
            .engine
            .output_dir
            .join("launcher")
            .join("packages")
            .join(&hash[..16]);
        let staged = dir.join("package");
        if staged.is_file() {
            debug!(staged = %staged.display(), "reusing staged package");
            return Ok(staged);
        }
        fs::create_dir_all(&dir)
            .map_err(BootstrapError::from)
            .with_context(|| format!("create staging dir {}", dir.display()))?;
        let staging = NamedTempFile::with_prefix_in("package-", &dir)
            .map_err(BootstrapError::from)
            .with_context(|| format!("create staging file in {}", dir.display()))?;
        fs::copy(&self.archive, staging.path())
            .map_err(BootstrapError::from)
            .with_context(|| format!("stage {}", self.archive.display()))?;
        make_executable(staging.path())?;
        if let Err(err) = staging.persist(&staged) {
            // Another launcher may have installed the same content first.
            if !staged.is_file() {
                return Err(BootstrapError::from(err.error))
                    .with_context(|| format!("install staged package {}", staged.display()));
            }
            debug!(err = %err.error, "package staged concurrently");
        }
        info!(staged = %staged.display(), "package staged");
        Ok(staged)
    }
}

impl ExecutionBackend for PackagedBackend {
    fn launch(&mut self, build_id: &BuildId) -> Result<Outcome> {
        let staged = self.stage()?;
        let install_root = staged
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| staged.clone());
        self.engine
            .launch(&staged, &install_root, &[(ENGINE_MODE_ENV, "1")], build_id)
    }

    fn kill(&mut self) -> Result<Outcome> {
        self.engine.kill()
    }

    fn dispose(&mut self) {
        self.engine.dispose();
    }
}

fn file_sha256(path: &Path) -> Result<String> {
    let bytes = fs::read(path)
        .map_err(BootstrapError::from)
        .with_context(|| format!("read package {}", path.display()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)
        .map_err(BootstrapError::from)
        .with_context(|| format!("stat {}", path.display()))?
        .permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions)
        .map_err(BootstrapError::from)
        .with_context(|| format!("chmod {}", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
