//! Project root discovery and the per-run project context.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::debug;

use crate::errors::BootstrapError;
use crate::io::config::{LauncherConfig, load_config};

/// File that marks a project root and holds its configuration.
pub const PROJECT_MARKER: &str = ".launcher.toml";

/// The discovered project and its derived directories.
///
/// Owns a per-run scratch directory under `<output>/tmp/` that is removed when
/// the context is dropped, whichever way the run ends.
#[derive(Debug)]
pub struct ProjectContext {
    root: PathBuf,
    config: LauncherConfig,
    output_dir: PathBuf,
    log_dir: PathBuf,
    scratch: TempDir,
}

impl ProjectContext {
    /// Find the nearest project root at or above `start` and prepare its
    /// output directories.
    pub fn discover(start: &Path) -> Result<Self> {
        let root = find_project_root(start).ok_or_else(|| BootstrapError::NoProject {
            start: start.to_path_buf(),
        })?;
        let config = load_config(&root.join(PROJECT_MARKER))?;
        Self::open(root, config)
    }

    /// Open a project at a known root with an already loaded config.
    pub fn open(root: PathBuf, config: LauncherConfig) -> Result<Self> {
        let output_dir = root.join(&config.output_dir);
        let log_dir = output_dir.join("log");
        let tmp_dir = output_dir.join("tmp");
        for dir in [&log_dir, &tmp_dir] {
            fs::create_dir_all(dir)
                .map_err(BootstrapError::from)
                .with_context(|| format!("create {}", dir.display()))?;
        }
        let scratch = tempfile::Builder::new()
            .prefix("launcher-")
            .tempdir_in(&tmp_dir)
            .map_err(BootstrapError::from)
            .with_context(|| format!("create scratch dir in {}", tmp_dir.display()))?;
        debug!(
            root = %root.display(),
            scratch = %scratch.path().display(),
            "project context acquired"
        );
        Ok(Self {
            root,
            config,
            output_dir,
            log_dir,
            scratch,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Destination for the trace flush.
    pub fn trace_dir(&self) -> PathBuf {
        self.log_dir.join("traces")
    }

    /// Per-run scratch directory; gone once the context drops.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    pub fn daemon_pid_path(&self) -> PathBuf {
        self.output_dir.join(&self.config.daemon.pid_file)
    }
}

fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(PROJECT_MARKER).is_file())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classify::classify;
    use crate::core::types::FailureCategory;

    #[test]
    fn discovers_marker_in_parent_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        fs::write(root.join(PROJECT_MARKER), "output_dir = \"out\"\n").expect("write marker");
        let nested = root.join("src").join("lib");
        fs::create_dir_all(&nested).expect("create nested");

        let project = ProjectContext::discover(&nested).expect("discover");
        assert_eq!(project.root(), root);
        assert_eq!(project.output_dir(), root.join("out"));
        assert!(project.log_dir().is_dir());
        assert!(project.trace_dir().ends_with("out/log/traces"));
        assert_eq!(project.daemon_pid_path(), root.join("out/daemon/pid"));
    }

    #[test]
    fn missing_marker_is_no_project() {
        let temp = tempfile::tempdir().expect("tempdir");

        let err = ProjectContext::discover(temp.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BootstrapError>(),
            Some(BootstrapError::NoProject { .. })
        ));
        assert_eq!(classify(&err), FailureCategory::Configuration);
    }

    #[test]
    fn scratch_dir_removed_on_drop() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join(PROJECT_MARKER), "").expect("write marker");

        let project = ProjectContext::discover(temp.path()).expect("discover");
        let scratch = project.scratch_dir().to_path_buf();
        fs::write(scratch.join("run-args.json"), "{}").expect("write scratch file");
        assert!(scratch.is_dir());

        drop(project);
        assert!(!scratch.exists());
    }
}
