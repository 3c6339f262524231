//! Launcher configuration stored in the project marker `.launcher.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::errors::BootstrapError;

/// Launcher configuration (TOML).
///
/// The marker file doubles as the project root indicator, so an empty file is
/// valid and yields the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LauncherConfig {
    /// Output directory, relative to the project root.
    pub output_dir: String,

    pub engine: EngineConfig,

    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable, relative to the repository install root.
    pub program: String,

    /// Seconds the engine gets to exit on its own after an interrupt.
    pub interrupt_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Daemon pid file, relative to the output directory.
    pub pid_file: String,

    /// Seconds to wait for the daemon to exit after SIGTERM.
    pub kill_timeout_secs: u64,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            output_dir: "launcher-out".to_string(),
            engine: EngineConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "launcher-engine".to_string(),
            interrupt_grace_secs: 5,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pid_file: "daemon/pid".to_string(),
            kill_timeout_secs: 10,
        }
    }
}

impl LauncherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.output_dir.trim().is_empty() {
            return Err(anyhow!("output_dir must be non-empty"));
        }
        if self.engine.program.trim().is_empty() {
            return Err(anyhow!("engine.program must be non-empty"));
        }
        if self.daemon.pid_file.trim().is_empty() {
            return Err(anyhow!("daemon.pid_file must be non-empty"));
        }
        if self.daemon.kill_timeout_secs == 0 {
            return Err(anyhow!("daemon.kill_timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load and validate config from the project marker.
///
/// Parse and validation failures surface as [`BootstrapError::InvalidConfig`]
/// so they map to the configuration exit code.
pub fn load_config(path: &Path) -> Result<LauncherConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LauncherConfig =
        toml::from_str(&contents).map_err(|err| BootstrapError::InvalidConfig {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    cfg.validate()
        .map_err(|err| BootstrapError::InvalidConfig {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classify::classify;
    use crate::core::types::FailureCategory;

    #[test]
    fn empty_marker_yields_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".launcher.toml");
        fs::write(&path, "").expect("write marker");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg, LauncherConfig::default());
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".launcher.toml");
        fs::write(&path, "output_dir = \"out\"\n\n[daemon]\nkill_timeout_secs = 3\n")
            .expect("write marker");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.output_dir, "out");
        assert_eq!(cfg.daemon.kill_timeout_secs, 3);
        assert_eq!(cfg.daemon.pid_file, "daemon/pid");
        assert_eq!(cfg.engine, EngineConfig::default());
    }

    #[test]
    fn invalid_config_is_a_configuration_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".launcher.toml");
        fs::write(&path, "[daemon]\nkill_timeout_secs = 0\n").expect("write marker");

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("kill_timeout_secs"));
        assert_eq!(classify(&err), FailureCategory::Configuration);

        fs::write(&path, "output_dir = [").expect("write marker");
        let err = load_config(&path).unwrap_err();
        assert_eq!(classify(&err), FailureCategory::Configuration);
    }
}
