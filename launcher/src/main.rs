//! Bootstrap launcher.
//!
//! Forwards its arguments to the build engine, or stops the project's daemon
//! for `launcher kill`, and exits with a stable code for every failure class.

use std::ffi::OsString;

use clap::Parser;

use launcher::bootstrap::{SystemReplacer, reject_command_line, run_bootstrap};
use launcher::core::types::Invocation;
use launcher::io::backend::SystemBackendFactory;
use launcher::io::signals::Interrupt;
use launcher::io::status::{StatusReporter, transport_from_env};
use launcher::io::trace::TraceBuffer;
use launcher::logging;
use launcher::orchestrate::{CurrentDirLocator, Orchestrator};

#[derive(Parser)]
#[command(
    name = "launcher",
    about = "Bootstrap launcher for the build engine",
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Cli {
    /// Engine command and arguments, forwarded verbatim.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
    args: Vec<OsString>,
}

fn main() {
    logging::init();

    let argv: Vec<OsString> = std::env::args_os().collect();
    let program = argv.first().cloned().unwrap_or_else(|| OsString::from("launcher"));
    let command = argv.get(1).map(|arg| arg.to_string_lossy().into_owned());
    let reporter = StatusReporter::new(command, transport_from_env());

    let code = match Cli::try_parse_from(&argv) {
        Ok(cli) => {
            let invocation = Invocation::new(program, cli.args);
            let interrupt = Interrupt::system();
            let orchestrator = Orchestrator {
                locator: &CurrentDirLocator,
                factory: &SystemBackendFactory,
                interrupt: &interrupt,
                traces: TraceBuffer::global(),
            };
            run_bootstrap(&orchestrator, &invocation, reporter, &SystemReplacer)
        }
        Err(err) => reject_command_line(err.to_string(), reporter),
    };
    std::process::exit(code);
}
