use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::{system_time_secs, Malformed, Signal};

/// File name of the trigger inside the project metadata directory.
pub const TRIGGER_FILE_NAME: &str = "launch_browser_trigger.json";

/// Single-slot mailbox backed by one file.
///
/// `post` overwrites whatever is pending (last writer wins); `peek` takes a
/// snapshot without consuming; `clear_if_unchanged` deletes the file only when
/// it still holds the snapshot's bytes. There is never more than one pending
/// signal.
#[derive(Debug, Clone)]
pub struct SignalSlot {
    path: PathBuf,
}

/// Content observed by one `peek`.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub bytes: Vec<u8>,
    /// Modification time, seconds since the Unix epoch.
    pub modified: f64,
    pub parsed: Result<Signal, Malformed>,
}

impl Snapshot {
    /// Freshness key: the signal timestamp, else the file mtime.
    pub fn stamp(&self) -> f64 {
        match &self.parsed {
            Ok(sig) => sig.created_at,
            Err(_) => self.modified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Removed,
    /// The producer replaced the file after the snapshot; it was kept.
    Replaced,
    /// Someone else already removed it.
    AlreadyGone,
}

impl SignalSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Slot at `<metadata_dir>/launch_browser_trigger.json`.
    pub fn in_metadata_dir(metadata_dir: &Path) -> Self {
        Self::new(metadata_dir.join(TRIGGER_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a signal, replacing any pending one.
    ///
    /// The document is written to a temporary sibling and renamed into place
    /// so a reader never sees a partial file. The metadata directory is
    /// created when missing; sibling files are left alone.
    pub fn post(&self, signal: &Signal) -> Result<()> {
        let dir = self
            .path
            .parent()
            .context("trigger path has no parent directory")?;
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create metadata directory {}", dir.display()))?;
        let body = serde_json::to_vec_pretty(&signal.to_raw()).context("serialize signal")?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".launch_browser_trigger")
            .suffix(".tmp")
            .tempfile_in(dir)
            .with_context(|| format!("cannot create temporary file in {}", dir.display()))?;
        tmp.write_all(&body).context("write signal")?;
        tmp.as_file().sync_all().context("sync signal")?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("cannot move signal into {}", self.path.display()))?;
        Ok(())
    }

    /// Snapshot the pending signal, if any.
    ///
    /// A missing metadata directory or a file that vanishes between the
    /// metadata call and the read both yield `Ok(None)`.
    pub fn peek(&self) -> Result<Option<Snapshot>> {
        let meta = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if is_absent(&e) => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("cannot stat {}", self.path.display()))
            }
        };
        if !meta.is_file() {
            return Ok(None);
        }
        let modified = meta.modified().map(system_time_secs).unwrap_or(0.0);
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if is_absent(&e) => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read {}", self.path.display()))
            }
        };
        let parsed = Signal::parse(&bytes, modified);
        Ok(Some(Snapshot {
            bytes,
            modified,
            parsed,
        }))
    }

    /// Delete the trigger only if it still holds `snapshot`'s content.
    pub fn clear_if_unchanged(&self, snapshot: &Snapshot) -> Result<ClearOutcome> {
        let current = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if is_absent(&e) => return Ok(ClearOutcome::AlreadyGone),
            Err(e) => {
                return Err(e).with_context(|| format!("cannot re-read {}", self.path.display()))
            }
        };
        if current != snapshot.bytes {
            return Ok(ClearOutcome::Replaced);
        }
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(ClearOutcome::Removed),
            Err(e) if is_absent(&e) => Ok(ClearOutcome::AlreadyGone),
            Err(e) => Err(e).with_context(|| format!("cannot remove {}", self.path.display())),
        }
    }
}

fn is_absent(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::NotFound {
        return true;
    }
    // ENOTDIR: a path component is a file rather than a directory.
    #[cfg(unix)]
    {
        e.raw_os_error() == Some(nix::errno::Errno::ENOTDIR as i32)
    }
    #[cfg(not(unix))]
    {
        false
    }
}
