//! Durable per-inviter attribution ledger
//!
//! The ledger maps an inviter tag to the number of joins attributed to that
//! inviter. It is the only state that outlives the process. Entries are only
//! ever incremented; nothing is pruned.
//!
//! Storage is behind [`LedgerStore`] so the flat-file backend
//! ([`JsonFileLedger`]) can be swapped for [`MemoryLedger`] in tests.

mod file;

pub use file::{JsonFileLedger, MAX_LEDGER_FILE_SIZE};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

/// Errors raised while loading or saving the ledger
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error during {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger file {} is {size} bytes, maximum is {max}", path.display())]
    FileTooLarge { path: PathBuf, size: u64, max: u64 },

    #[error("ledger file {} is not valid JSON: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize ledger: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("ledger writer task failed: {0}")]
    Task(String),

    #[error("ledger storage unavailable: {0}")]
    Unavailable(String),
}

impl PersistError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistError>;

/// Cumulative attributed-join count per inviter tag
///
/// Serialized as a plain JSON object (`{"alice#0001": 3}`) with sorted keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    counts: BTreeMap<String, u64>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one attributed join for `inviter`, returning the new total
    pub fn increment(&mut self, inviter: &str) -> u64 {
        let count = self.counts.entry(inviter.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Attributed joins for `inviter` (0 if never seen)
    pub fn get(&self, inviter: &str) -> u64 {
        self.counts.get(inviter).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all attributed joins
    pub fn total(&self) -> u64 {
        self.counts.values().fold(0u64, |acc, n| acc.saturating_add(*n))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(tag, n)| (tag.as_str(), *n))
    }

    /// Inviters ordered by count (descending), ties broken by tag
    ///
    /// `limit` of `None` returns every entry.
    pub fn ranked(&self, limit: Option<usize>) -> Vec<(&str, u64)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        entries
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for Ledger {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        Self {
            counts: iter.into_iter().map(|(tag, n)| (tag.into(), n)).collect(),
        }
    }
}

/// Load/save access to the durable ledger
///
/// `save` replaces the whole stored ledger; implementations must never leave
/// a partially written ledger behind.
pub trait LedgerStore: Send + Sync {
    fn load(&self) -> Result<Ledger>;

    fn save(&self, ledger: &Ledger) -> Result<()>;
}

/// In-memory ledger store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryLedger {
    stored: Mutex<Ledger>,
    fail_saves: Mutex<Option<String>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `ledger` already stored
    pub fn with_ledger(ledger: Ledger) -> Self {
        Self {
            stored: Mutex::new(ledger),
            fail_saves: Mutex::new(None),
        }
    }

    /// Make every subsequent `save` fail with `reason` (`None` clears it)
    pub fn fail_saves(&self, reason: Option<&str>) {
        *self.fail_saves.lock().unwrap_or_else(|e| e.into_inner()) = reason.map(str::to_string);
    }

    /// The last successfully saved ledger
    pub fn stored(&self) -> Ledger {
        self.stored.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl LedgerStore for MemoryLedger {
    fn load(&self) -> Result<Ledger> {
        Ok(self.stored())
    }

    fn save(&self, ledger: &Ledger) -> Result<()> {
        if let Some(reason) = self
            .fail_saves
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return Err(PersistError::Unavailable(reason));
        }
        *self.stored.lock().unwrap_or_else(|e| e.into_inner()) = ledger.clone();
        Ok(())
    }
}
