//! Bootstrap launcher for a build tool engine.
//!
//! The launcher finds the project, decides how the engine is installed, runs
//! it (or stops its daemon for `kill`), and maps whatever happened to a stable
//! exit code that is reported exactly once. The architecture keeps a strict
//! split:
//!
//! - **[`core`]**: Pure logic (failure classification, shared types).
//! - **[`io`]**: Side effects (project discovery, processes, signals, traces,
//!   status reporting). Each piece sits behind a seam that tests replace.
//!
//! [`orchestrate`] sequences one run with scoped cleanup, and [`bootstrap`]
//! turns its result into the process exit.

pub mod bootstrap;
pub mod core;
pub mod errors;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrate;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
