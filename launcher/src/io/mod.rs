//! Side-effecting pieces of the bootstrap: filesystem, processes, signals.

pub mod backend;
pub mod config;
pub mod daemon;
pub mod detect;
pub mod process;
pub mod project;
pub mod signals;
pub mod status;
pub mod trace;
