//! Deterministic logic shared by the launcher bootstrap.
//!
//! Core modules are free of I/O side effects: they classify failures and
//! define the types exchanged between the orchestrator and the backends.

pub mod classify;
pub mod types;
