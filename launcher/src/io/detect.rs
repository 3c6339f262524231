//! Environment detection: which kind of launcher artifact is running.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::BootstrapError;

/// End-of-central-directory record signature.
const EOCD_SIGNATURE: &[u8; 4] = b"PK\x05\x06";
/// Fixed size of the end-of-central-directory record.
const EOCD_LEN: u64 = 22;
/// Longest zip comment that may follow the record.
const MAX_COMMENT_LEN: u64 = u16::MAX as u64;

/// How the launcher was installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    /// A self-contained archive that is staged before use.
    Packaged { archive: PathBuf },
    /// A plain executable inside a checkout; `root` is its install base.
    Repository { root: PathBuf },
}

/// Resolve `argv[0]` to a readable path.
///
/// A bare program name was found through `PATH`, so ask the OS where the
/// running executable lives instead.
pub fn resolve_invoked_path(program: &OsStr) -> Result<PathBuf, BootstrapError> {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return Ok(path.to_path_buf());
    }
    std::env::current_exe().map_err(|source| BootstrapError::DetectBackend {
        path: path.to_path_buf(),
        source,
    })
}

/// Classify the invoked artifact. Reads the file; never writes.
pub fn classify_artifact(path: &Path) -> Result<BackendKind, BootstrapError> {
    let detect_err = |source| BootstrapError::DetectBackend {
        path: path.to_path_buf(),
        source,
    };
    let resolved = path.canonicalize().map_err(detect_err)?;
    let kind = if is_zip_archive(&resolved).map_err(detect_err)? {
        BackendKind::Packaged { archive: resolved }
    } else {
        let root = resolved
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| detect_err(io::Error::from(io::ErrorKind::NotFound)))?;
        BackendKind::Repository { root }
    };
    debug!(?kind, "launcher artifact classified");
    Ok(kind)
}

/// True when the file ends in a zip end-of-central-directory record, which is
/// also the case for archives with an executable stub prepended.
pub fn is_zip_archive(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len < EOCD_LEN {
        return Ok(false);
    }
    let tail_len = len.min(EOCD_LEN + MAX_COMMENT_LEN);
    file.seek(SeekFrom::Start(len - tail_len))?;
    let mut tail = Vec::with_capacity(tail_len as usize);
    file.take(tail_len).read_to_end(&mut tail)?;

    let Some(last_start) = tail.len().checked_sub(EOCD_LEN as usize) else {
        return Ok(false);
    };
    Ok((0..=last_start)
        .rev()
        .any(|start| tail[start..].starts_with(EOCD_SIGNATURE)))
}
