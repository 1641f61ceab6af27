// JSON flat-file ledger backend
//
// Writes go to a temp file in the ledger's directory, are fsynced, and then
// renamed over the ledger. A crash leaves either the previous ledger or the
// new one on disk, never a truncated file.

use super::{Ledger, LedgerStore, PersistError, Result};
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// Upper bound on the ledger file size accepted by `load`
pub const MAX_LEDGER_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Ledger stored as a pretty-printed JSON object at a fixed path
#[derive(Debug, Clone)]
pub struct JsonFileLedger {
    path: PathBuf,
}

impl JsonFileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory the temp file is created in (same filesystem as the ledger)
    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl LedgerStore for JsonFileLedger {
    /// Load the ledger; a missing file is an empty ledger
    fn load(&self) -> Result<Ledger> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No ledger file yet, starting empty");
                return Ok(Ledger::new());
            }
            Err(e) => return Err(PersistError::io("open ledger file", e)),
        };

        let size = file
            .metadata()
            .map_err(|e| PersistError::io("stat ledger file", e))?
            .len();
        if size > MAX_LEDGER_FILE_SIZE {
            return Err(PersistError::FileTooLarge {
                path: self.path.clone(),
                size,
                max: MAX_LEDGER_FILE_SIZE,
            });
        }

        let reader = BufReader::new(file.take(MAX_LEDGER_FILE_SIZE.saturating_add(1)));
        serde_json::from_reader(reader).map_err(|source| PersistError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, ledger: &Ledger) -> Result<()> {
        // Serialize before touching the filesystem
        let json = serde_json::to_string_pretty(ledger).map_err(PersistError::Serialize)?;

        let parent = self.parent_dir();
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| PersistError::io("create ledger directory", e))?;
        }

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| PersistError::io("create temp file", e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| PersistError::io("write temp file", e))?;
        tmp.write_all(b"\n")
            .map_err(|e| PersistError::io("write temp file", e))?;
        tmp.flush()
            .map_err(|e| PersistError::io("flush temp file", e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| PersistError::io("fsync temp file", e))?;

        tmp.persist(&self.path)
            .map_err(|e| PersistError::io("rename temp file over ledger", e.error))?;

        sync_dir(parent)?;

        tracing::trace!(path = %self.path.display(), entries = ledger.len(), "Ledger saved");
        Ok(())
    }
}

// Commit the rename; directories cannot be opened for fsync on Windows
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| PersistError::io("fsync ledger directory", e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
