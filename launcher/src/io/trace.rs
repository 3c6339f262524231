//! Launch trace buffer.
//!
//! # Separation of Concerns
//!
//! - **Logging (`logging`)**: diagnostics via `LAUNCHER_LOG`, stderr only.
//! - **Launch traces (this module)**: spans covering the bootstrap, persisted
//!   once per run to `<output>/log/traces/launch.<build-id>.trace` in Chrome
//!   trace-event format.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::types::BuildId;

/// One completed span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSpan {
    pub name: String,
    /// Microseconds since the buffer was created.
    pub start_us: u64,
    pub duration_us: u64,
}

#[derive(Debug)]
struct Inner {
    epoch: Instant,
    spans: Mutex<Vec<TraceSpan>>,
}

/// Append-only span buffer. Clones share the same spans.
#[derive(Debug, Clone)]
pub struct TraceBuffer {
    inner: Arc<Inner>,
}

impl Default for TraceBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceBuffer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                epoch: Instant::now(),
                spans: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The process-wide buffer.
    pub fn global() -> &'static TraceBuffer {
        static GLOBAL: OnceLock<TraceBuffer> = OnceLock::new();
        GLOBAL.get_or_init(TraceBuffer::new)
    }

    /// Open a span that is recorded when the returned scope drops.
    pub fn start(&self, name: &str) -> TraceScope<'_> {
        TraceScope {
            buffer: self,
            name: name.to_string(),
            started: Instant::now(),
        }
    }

    /// Snapshot of the recorded spans.
    pub fn spans(&self) -> Vec<TraceSpan> {
        self.lock().clone()
    }

    /// Drain the buffer into `<dir>/launch.<build_id>.trace`.
    pub fn flush(&self, dir: &Path, build_id: &BuildId) -> Result<PathBuf> {
        let spans = std::mem::take(&mut *self.lock());
        fs::create_dir_all(dir).with_context(|| format!("create trace dir {}", dir.display()))?;
        let path = dir.join(format!("launch.{build_id}.trace"));
        let pid = std::process::id();
        let events: Vec<TraceEvent<'_>> = spans
            .iter()
            .map(|span| TraceEvent {
                name: &span.name,
                cat: "launcher",
                ph: "X",
                ts: span.start_us,
                dur: span.duration_us,
                pid,
                tid: 0,
                args: TraceArgs { build_id },
            })
            .collect();
        let mut buf = serde_json::to_string_pretty(&events).context("serialize trace")?;
        buf.push('\n');
        fs::write(&path, buf).with_context(|| format!("write trace {}", path.display()))?;
        debug!(path = %path.display(), spans = events.len(), "trace flushed");
        Ok(path)
    }

    fn record(&self, span: TraceSpan) {
        self.lock().push(span);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TraceSpan>> {
        // A poisoned buffer still holds valid spans.
        self.inner
            .spans
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn micros_since_epoch(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.inner.epoch).as_micros() as u64
    }
}

/// Open span; recorded on drop, including during unwinding.
#[derive(Debug)]
pub struct TraceScope<'a> {
    buffer: &'a TraceBuffer,
    name: String,
    started: Instant,
}

impl Drop for TraceScope<'_> {
    fn drop(&mut self) {
        let span = TraceSpan {
            name: std::mem::take(&mut self.name),
            start_us: self.buffer.micros_since_epoch(self.started),
            duration_us: self.started.elapsed().as_micros() as u64,
        };
        self.buffer.record(span);
    }
}

#[derive(Serialize)]
struct TraceEvent<'a> {
    name: &'a str,
    cat: &'static str,
    ph: &'static str,
    ts: u64,
    dur: u64,
    pid: u32,
    tid: u32,
    args: TraceArgs<'a>,
}

#[derive(Serialize)]
struct TraceArgs<'a> {
    build_id: &'a BuildId,
}
