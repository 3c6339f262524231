//! Entry point policy: turn the orchestrator's result into one exit code,
//! report it, and perform a deferred exec if the engine asked for one.

use std::io;

use anyhow::Result;
use tracing::{debug, error, warn};

use crate::core::classify::classify;
use crate::core::types::{BuildId, ExecTarget, FailureCategory, Invocation, Outcome};
use crate::errors::BootstrapError;
use crate::exit_codes;
use crate::io::backend::BackendFactory;
use crate::io::process::exec_target;
use crate::io::status::{ReportTransport, StatusReporter};
use crate::orchestrate::{Orchestrator, ProjectLocator};

/// Status message recorded when the user interrupts the run.
pub const INTERRUPT_MESSAGE: &str = "launcher interrupted by user";

/// Final decision of a run, after the status report was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finish {
    pub exit_code: i32,
    /// Target to replace the launcher with, if the engine deferred one.
    pub exec: Option<ExecTarget>,
}

/// Replaces the running process with an exec target.
pub trait ProcessReplacer {
    /// Returns `Ok` only when the replacement is simulated; a real replacement
    /// never returns on success.
    fn replace(&self, target: &ExecTarget) -> io::Result<()>;
}

/// Replaces the process image via `exec`.
pub struct SystemReplacer;

impl ProcessReplacer for SystemReplacer {
    fn replace(&self, target: &ExecTarget) -> io::Result<()> {
        Err(exec_target(target))
    }
}

/// Run the orchestrator, report, then exec or return the exit code.
pub fn run_bootstrap<L, F, T, R>(
    orchestrator: &Orchestrator<'_, L, F>,
    invocation: &Invocation,
    mut reporter: StatusReporter<T>,
    replacer: &R,
) -> i32
where
    L: ProjectLocator,
    F: BackendFactory,
    T: ReportTransport,
    R: ProcessReplacer,
{
    let result = orchestrator.run(invocation, &mut reporter);
    let finish = conclude(result, reporter);
    complete(finish, replacer)
}

/// Map a run result to its exit code and send the status report.
///
/// Reporting happens exactly once, before any deferred exec, and its failure
/// never changes the exit code.
pub fn conclude<T: ReportTransport>(
    result: Result<Outcome>,
    mut reporter: StatusReporter<T>,
) -> Finish {
    let (exit_code, exec) = match result {
        Ok(Outcome::Completed { exit_code }) => (exit_code, None),
        Ok(Outcome::DeferredExec {
            target,
            preceding_exit_code,
        }) => {
            if preceding_exit_code == exit_codes::SUCCESS {
                (exit_codes::SUCCESS, Some(target))
            } else {
                warn!(
                    exit_code = preceding_exit_code,
                    "engine failed, skipping deferred exec"
                );
                (preceding_exit_code, None)
            }
        }
        Ok(Outcome::Failed { category, detail }) => {
            (record_failure(&mut reporter, category, detail), None)
        }
        Err(err) => {
            let category = classify(&err);
            (record_failure(&mut reporter, category, format!("{err:#}")), None)
        }
    };

    if let Err(err) = reporter.report(exit_code) {
        debug!(err = %format!("{err:#}"), "status report failed");
    }
    Finish { exit_code, exec }
}

/// Log a failure, record its status message and return its exit code.
fn record_failure<T: ReportTransport>(
    reporter: &mut StatusReporter<T>,
    category: FailureCategory,
    detail: String,
) -> i32 {
    let message = match category {
        FailureCategory::Interrupted => INTERRUPT_MESSAGE.to_string(),
        _ => detail,
    };
    error!(category = ?category, "{message}");
    reporter.set_status_message(message);
    exit_codes::for_category(category)
}

/// Report a command line the launcher could not parse.
pub fn reject_command_line<T: ReportTransport>(
    reason: String,
    mut reporter: StatusReporter<T>,
) -> i32 {
    reporter.set_build_id(BuildId::generate());
    let finish = conclude(
        Err(BootstrapError::InvalidCommandLine(reason).into()),
        reporter,
    );
    finish.exit_code
}

/// Perform the deferred exec, if any. Returns the code to exit with when the
/// process was not replaced.
pub fn complete<R: ProcessReplacer>(finish: Finish, replacer: &R) -> i32 {
    let Some(target) = finish.exec else {
        return finish.exit_code;
    };
    match replacer.replace(&target) {
        Ok(()) => finish.exit_code,
        Err(err) => {
            error!(path = %target.path.display(), err = %err, "failed to exec target");
            exit_codes::UNANTICIPATED
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use anyhow::anyhow;

    use super::*;
    use crate::test_support::{RecordingReplacer, RecordingTransport};

    fn target() -> ExecTarget {
        ExecTarget {
            path: PathBuf::from("/usr/bin/app"),
            argv: vec!["app".to_string()],
            envp: BTreeMap::new(),
            cwd: PathBuf::from("/"),
        }
    }

    #[test]
    fn completed_passes_exit_code_through() {
        let transport = RecordingTransport::new();
        let reporter = StatusReporter::new(Some("build".into()), transport.clone());

        let finish = conclude(Ok(Outcome::Completed { exit_code: 4 }), reporter);

        assert_eq!(finish, Finish { exit_code: 4, exec: None });
        let reports = transport.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].exit_code, 4);
        assert_eq!(reports[0].status_message, None);
    }

    #[test]
    fn deferred_exec_after_failure_is_skipped() {
        let transport = RecordingTransport::new();
        let reporter = StatusReporter::new(Some("run".into()), transport.clone());

        let finish = conclude(
            Ok(Outcome::DeferredExec {
                target: target(),
                preceding_exit_code: 1,
            }),
            reporter,
        );

        assert_eq!(finish, Finish { exit_code: 1, exec: None });
    }

    #[test]
    fn failed_outcome_sets_status_message() {
        let transport = RecordingTransport::new();
        let reporter = StatusReporter::new(Some("kill".into()), transport.clone());

        let finish = conclude(
            Ok(Outcome::Failed {
                category: FailureCategory::Unanticipated,
                detail: "daemon 42 did not exit".to_string(),
            }),
            reporter,
        );

        assert_eq!(finish.exit_code, exit_codes::UNANTICIPATED);
        let reports = transport.reports();
        assert_eq!(
            reports[0].status_message.as_deref(),
            Some("daemon 42 did not exit")
        );
    }

    #[test]
    fn interrupted_outcome_uses_interrupt_message() {
        let transport = RecordingTransport::new();
        let reporter = StatusReporter::new(Some("build".into()), transport.clone());

        let finish = conclude(
            Ok(Outcome::Failed {
                category: FailureCategory::Interrupted,
                detail: "engine stopped on SIGINT".to_string(),
            }),
            reporter,
        );

        assert_eq!(finish.exit_code, exit_codes::INTERRUPTED);
        assert_eq!(
            transport.reports()[0].status_message.as_deref(),
            Some(INTERRUPT_MESSAGE)
        );
    }

    #[test]
    fn first_status_message_is_kept() {
        let transport = RecordingTransport::new();
        let mut reporter = StatusReporter::new(None, transport.clone());
        reporter.set_status_message("engine reported a problem");

        let finish = conclude(Err(anyhow!("boom")), reporter);

        assert_eq!(finish.exit_code, exit_codes::UNANTICIPATED);
        assert_eq!(
            transport.reports()[0].status_message.as_deref(),
            Some("engine reported a problem")
        );
    }

    #[test]
    fn unparsable_command_line_is_configuration_error() {
        let transport = RecordingTransport::new();
        let reporter = StatusReporter::new(None, transport.clone());

        let code = reject_command_line("unexpected argument".to_string(), reporter);

        assert_eq!(code, exit_codes::CONFIGURATION);
        let reports = transport.reports();
        assert!(reports[0].build_id.is_some());
    }

    #[test]
    fn failed_exec_exits_unanticipated() {
        let replacer = RecordingReplacer::failing();
        let finish = Finish {
            exit_code: 0,
            exec: Some(target()),
        };

        assert_eq!(complete(finish, &replacer), exit_codes::UNANTICIPATED);
        assert_eq!(replacer.targets(), vec![target()]);
    }

    #[test]
    fn no_exec_returns_exit_code_untouched() {
        let replacer = RecordingReplacer::new();
        let finish = Finish {
            exit_code: 13,
            exec: None,
        };

        assert_eq!(complete(finish, &replacer), 13);
        assert!(replacer.targets().is_empty());
    }
}
