//! Termination of the project's persistent build daemon.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::core::types::{FailureCategory, Outcome};
use crate::errors::BootstrapError;
use crate::exit_codes;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long to wait for the process to disappear after SIGKILL.
const KILL_SETTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct DaemonKillRequest {
    pub pid_path: PathBuf,
    /// Wait budget after SIGTERM before escalating to SIGKILL.
    pub timeout: Duration,
}

/// Stop the daemon named by the pid file, if any.
///
/// A missing or unreadable pid file means nothing is running and is a
/// success; stale pid files are removed. Only positive pids are accepted, so a
/// corrupt file can never name a process group or every process.
pub fn kill_daemon(request: &DaemonKillRequest) -> Result<Outcome> {
    let Some(pid) = read_pid(&request.pid_path)? else {
        debug!(pid_file = %request.pid_path.display(), "no daemon pid recorded");
        remove_pid_file(&request.pid_path)?;
        return Ok(Outcome::Completed {
            exit_code: exit_codes::SUCCESS,
        });
    };
    let outcome = terminate(pid, request.timeout)?;
    if matches!(outcome, Outcome::Completed { .. }) {
        remove_pid_file(&request.pid_path)?;
    }
    Ok(outcome)
}

fn read_pid(path: &Path) -> Result<Option<i32>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content.trim().parse::<i32>().ok().filter(|pid| *pid > 0)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(BootstrapError::from(err))
            .with_context(|| format!("read daemon pid file {}", path.display())),
    }
}

fn remove_pid_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(BootstrapError::from(err))
            .with_context(|| format!("remove daemon pid file {}", path.display())),
    }
}

#[cfg(unix)]
fn terminate(pid: i32, timeout: Duration) -> Result<Outcome> {
    use nix::sys::signal::Signal;

    if !is_alive(pid)? {
        info!(pid, "daemon already gone");
        return Ok(Outcome::Completed {
            exit_code: exit_codes::SUCCESS,
        });
    }
    info!(pid, "stopping daemon");
    if !send(pid, Signal::SIGTERM)? || wait_for_exit(pid, timeout)? {
        info!(pid, "daemon stopped");
        return Ok(Outcome::Completed {
            exit_code: exit_codes::SUCCESS,
        });
    }
    warn!(pid, timeout_secs = timeout.as_secs(), "daemon ignored SIGTERM, killing");
    if send(pid, Signal::SIGKILL)? && !wait_for_exit(pid, KILL_SETTLE)? {
        return Ok(Outcome::Failed {
            category: FailureCategory::Unanticipated,
            detail: format!("daemon {pid} did not exit"),
        });
    }
    Ok(Outcome::Completed {
        exit_code: exit_codes::SUCCESS,
    })
}

/// Returns false when the process was already gone.
#[cfg(unix)]
fn send(pid: i32, signal: nix::sys::signal::Signal) -> Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), signal) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(errno) => Err(BootstrapError::from(io::Error::from(errno)))
            .with_context(|| format!("send {signal} to daemon {pid}")),
    }
}

#[cfg(unix)]
fn is_alive(pid: i32) -> Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(errno) => Err(BootstrapError::from(io::Error::from(errno)))
            .with_context(|| format!("probe daemon {pid}")),
    }
}

#[cfg(unix)]
fn wait_for_exit(pid: i32, timeout: Duration) -> Result<bool> {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if !is_alive(pid)? {
            return Ok(true);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    Ok(!is_alive(pid)?)
}

#[cfg(not(unix))]
fn terminate(pid: i32, _timeout: Duration) -> Result<Outcome> {
    Ok(Outcome::Failed {
        category: FailureCategory::Unanticipated,
        detail: format!("daemon termination unsupported on this platform (pid {pid})"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(pid_path: PathBuf) -> DaemonKillRequest {
        DaemonKillRequest {
            pid_path,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn no_pid_file_is_success() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = kill_daemon(&request(temp.path().join("daemon/pid"))).expect("kill");
        assert_eq!(outcome, Outcome::Completed { exit_code: 0 });
    }

    #[test]
    fn garbage_pid_file_is_removed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pid_path = temp.path().join("pid");
        fs::write(&pid_path, "not-a-pid\n").expect("write pid");

        let outcome = kill_daemon(&request(pid_path.clone())).expect("kill");
        assert_eq!(outcome, Outcome::Completed { exit_code: 0 });
        assert!(!pid_path.exists());
    }

    #[test]
    fn out_of_range_pids_are_treated_as_stale() {
        let temp = tempfile::tempdir().expect("tempdir");
        for content in ["4294967295", "2147483648", "-1", "0"] {
            let pid_path = temp.path().join("pid");
            fs::write(&pid_path, content).expect("write pid");

            let outcome = kill_daemon(&request(pid_path.clone())).expect("kill");
            assert_eq!(outcome, Outcome::Completed { exit_code: 0 }, "pid {content}");
            assert!(!pid_path.exists(), "pid {content}");
        }
    }

    #[cfg(unix)]
    fn spawn_ignoring_sigterm() -> std::process::Child {
        use std::process::Command;

        let child = Command::new("sh")
            .arg("-c")
            .arg("trap '' TERM; exec sleep 30")
            .spawn()
            .expect("spawn daemon");
        // Let the shell install the trap before it is signalled.
        std::thread::sleep(Duration::from_millis(200));
        child
    }

    #[cfg(unix)]
    #[test]
    fn daemon_ignoring_sigterm_is_killed() {
        use std::os::unix::process::ExitStatusExt;
        use std::thread;

        let temp = tempfile::tempdir().expect("tempdir");
        let pid_path = temp.path().join("pid");
        let mut child = spawn_ignoring_sigterm();
        fs::write(&pid_path, child.id().to_string()).expect("write pid");
        let reaper = thread::spawn(move || child.wait());

        let outcome = kill_daemon(&DaemonKillRequest {
            pid_path: pid_path.clone(),
            timeout: Duration::from_millis(300),
        })
        .expect("kill");

        assert_eq!(outcome, Outcome::Completed { exit_code: 0 });
        assert!(!pid_path.exists());
        let status = reaper.join().expect("join").expect("wait child");
        assert_eq!(status.signal(), Some(9));
    }

    #[cfg(unix)]
    #[test]
    fn daemon_surviving_sigkill_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pid_path = temp.path().join("pid");
        // Never reaped during the call, so the killed child lingers as a
        // zombie and keeps answering liveness probes.
        let mut child = spawn_ignoring_sigterm();
        fs::write(&pid_path, child.id().to_string()).expect("write pid");

        let outcome = kill_daemon(&DaemonKillRequest {
            pid_path: pid_path.clone(),
            timeout: Duration::from_millis(300),
        })
        .expect("kill");

        assert_eq!(
            outcome,
            Outcome::Failed {
                category: FailureCategory::Unanticipated,
                detail: format!("daemon {} did not exit", child.id()),
            }
        );
        assert!(pid_path.exists());
        child.wait().expect("reap child");
    }

    #[cfg(unix)]
    #[test]
    fn running_daemon_is_terminated() {
        use std::process::Command;
        use std::thread;

        let temp = tempfile::tempdir().expect("tempdir");
        let pid_path = temp.path().join("pid");
        let mut child = Command::new("sleep").arg("30").spawn().expect("spawn sleep");
        fs::write(&pid_path, format!("{}\n", child.id())).expect("write pid");
        // Reap the child so it does not linger as a zombie that still answers probes.
        let reaper = thread::spawn(move || child.wait());

        let outcome = kill_daemon(&request(pid_path.clone())).expect("kill");
        assert_eq!(outcome, Outcome::Completed { exit_code: 0 });
        assert!(!pid_path.exists());
        reaper.join().expect("join").expect("wait child");
    }
}
