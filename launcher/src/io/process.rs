//! Helpers for running the engine and replacing the launcher process.

use std::io;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::ExecTarget;
use crate::errors::BootstrapError;
use crate::io::signals::Interrupt;

/// How often the engine wait loop checks for interruption.
pub const INTERRUPT_POLL: Duration = Duration::from_millis(100);

/// Run a command with inherited stdio until it exits, returning its exit code.
///
/// Once `interrupt` trips, the child (which shares the terminal's process group
/// and normally got the same SIGINT) has `grace` to exit before it is killed,
/// and the call fails with [`BootstrapError::Interrupted`].
#[instrument(skip_all, fields(grace_secs = grace.as_secs()))]
pub fn run_to_completion(mut cmd: Command, interrupt: &Interrupt, grace: Duration) -> Result<i32> {
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    debug!(program = ?cmd.get_program(), "spawning engine");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn engine");
            return Err(BootstrapError::from(e)).context("spawn engine");
        }
    };

    loop {
        if let Some(status) = child
            .wait_timeout(INTERRUPT_POLL)
            .map_err(BootstrapError::from)
            .context("wait for engine")?
        {
            if interrupt.is_set() {
                return Err(BootstrapError::Interrupted.into());
            }
            let code = exit_code(status);
            debug!(exit_code = code, "engine finished");
            return Ok(code);
        }
        if interrupt.is_set() {
            stop_after_interrupt(&mut child, grace)?;
            return Err(BootstrapError::Interrupted.into());
        }
    }
}

fn stop_after_interrupt(child: &mut Child, grace: Duration) -> Result<()> {
    warn!(grace_secs = grace.as_secs(), "interrupted, waiting for engine to exit");
    let exited = child
        .wait_timeout(grace)
        .map_err(BootstrapError::from)
        .context("wait for interrupted engine")?;
    if exited.is_none() {
        warn!("engine still running after grace period, killing");
        child
            .kill()
            .map_err(BootstrapError::from)
            .context("kill engine")?;
        child
            .wait()
            .map_err(BootstrapError::from)
            .context("wait engine after kill")?;
    }
    Ok(())
}

/// Exit code of a finished process; signal deaths map to `128 + signal`.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    crate::exit_codes::UNANTICIPATED
}

fn target_command(target: &ExecTarget) -> Command {
    let mut cmd = Command::new(&target.path);
    if let Some((arg0, rest)) = target.argv.split_first() {
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.arg0(arg0);
        }
        #[cfg(not(unix))]
        let _ = arg0;
        cmd.args(rest);
    }
    cmd.env_clear().envs(&target.envp).current_dir(&target.cwd);
    cmd
}

/// Replace the current process with `target`.
///
/// Only returns on failure.
#[cfg(unix)]
pub fn exec_target(target: &ExecTarget) -> io::Error {
    use std::os::unix::process::CommandExt;

    debug!(path = %target.path.display(), "replacing launcher with target");
    target_command(target).exec()
}

/// Run `target` to completion and exit with its code; there is no process
/// image replacement on this platform.
#[cfg(not(unix))]
pub fn exec_target(target: &ExecTarget) -> io::Error {
    debug!(path = %target.path.display(), "running target in place of launcher");
    match target_command(target).status() {
        Ok(status) => std::process::exit(exit_code(status)),
        Err(err) => err,
    }
}
