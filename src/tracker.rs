//! Invite attribution tracker
//!
//! Keeps a per-community [`InviteSnapshot`] and, when a member joins, diffs
//! it against the live invite list to find which invite was used. The
//! invite's creator gets one more attributed join in the durable [`Ledger`].
//!
//! # Concurrency
//!
//! Calls for the same community are serialized by a per-community async
//! mutex so the fetch/diff/replace sequence is atomic with respect to other
//! joins in that community. Different communities proceed in parallel; the
//! only state they share is the ledger, whose read-modify-write is guarded
//! by its own mutex.
//!
//! # Example
//!
//! ```no_run
//! use invitrack::ledger::JsonFileLedger;
//! use invitrack::snapshot_store::MemorySnapshotStore;
//! use invitrack::source::ReplaySource;
//! use invitrack::tracker::{InviteTracker, TrackerConfig};
//! use std::sync::Arc;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let tracker = InviteTracker::new(
//!     Arc::new(ReplaySource::new()),
//!     Arc::new(MemorySnapshotStore::new()),
//!     Arc::new(JsonFileLedger::new("ledger.json")),
//!     TrackerConfig::default(),
//! )?;
//!
//! let result = tracker.attribute_join(&"guild".into(), "newcomer#0001").await?;
//! println!("invited by {}", result.inviter);
//! # Ok(())
//! # }
//! ```

use crate::invite::{CommunityId, Invite, InviteSnapshot};
use crate::ledger::{Ledger, LedgerStore, PersistError};
use crate::snapshot_store::SnapshotStore;
use crate::source::{FetchError, InviteSource};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default upper bound on a live invite fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Tracker tuning knobs
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Fetches slower than this fail with [`FetchError::Timeout`]
    pub fetch_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl TrackerConfig {
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

/// Who brought a member in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Inviter {
    Known(String),
    Unknown,
}

impl Inviter {
    pub fn tag(&self) -> Option<&str> {
        match self {
            Inviter::Known(tag) => Some(tag),
            Inviter::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Inviter::Known(_))
    }
}

impl fmt::Display for Inviter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inviter::Known(tag) => f.write_str(tag),
            Inviter::Unknown => f.write_str("unknown"),
        }
    }
}

/// Outcome of attributing one join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionResult {
    pub inviter: Inviter,
    /// Invite code whose use count increased, if any
    pub code: Option<String>,
    /// Ledger total for the inviter after this join (0 when unknown)
    pub total_for_inviter: u64,
    /// False when the ledger write failed and the increment is memory-only
    pub durable: bool,
}

impl AttributionResult {
    fn unknown(code: Option<String>) -> Self {
        Self {
            inviter: Inviter::Unknown,
            code,
            total_for_inviter: 0,
            durable: true,
        }
    }
}

/// Tracks invite usage per community and attributes joins to inviters
pub struct InviteTracker {
    source: Arc<dyn InviteSource>,
    snapshots: Arc<dyn SnapshotStore>,
    ledger_store: Arc<dyn LedgerStore>,
    ledger: tokio::sync::Mutex<Ledger>,
    /// Bumped under the ledger lock for every increment
    generation: AtomicU64,
    /// Generation of the newest ledger handed to `ledger_store`
    written: Arc<Mutex<u64>>,
    community_locks: Mutex<HashMap<CommunityId, Arc<tokio::sync::Mutex<()>>>>,
    config: TrackerConfig,
}

impl InviteTracker {
    /// Create a tracker, loading the current ledger from `ledger_store`
    ///
    /// # Errors
    /// Returns [`PersistError`] if the stored ledger cannot be read.
    pub fn new(
        source: Arc<dyn InviteSource>,
        snapshots: Arc<dyn SnapshotStore>,
        ledger_store: Arc<dyn LedgerStore>,
        config: TrackerConfig,
    ) -> Result<Self, PersistError> {
        let ledger = ledger_store.load()?;
        tracing::debug!(inviters = ledger.len(), "Loaded invite ledger");

        Ok(Self {
            source,
            snapshots,
            ledger_store,
            ledger: tokio::sync::Mutex::new(ledger),
            generation: AtomicU64::new(0),
            written: Arc::new(Mutex::new(0)),
            community_locks: Mutex::new(HashMap::new()),
            config,
        })
    }

    /// Take the initial snapshot of every community
    ///
    /// A community whose fetch fails is logged and skipped; its first join
    /// will then resolve to an unknown inviter. Returns how many communities
    /// were initialized.
    pub async fn initialize(&self, communities: &[CommunityId]) -> usize {
        let mut initialized = 0;
        for community in communities {
            match self.refresh(community).await {
                Ok(_) => initialized += 1,
                Err(e) => {
                    tracing::warn!(%community, error = %e, "Skipping invite snapshot for community");
                }
            }
        }
        tracing::info!(
            initialized,
            total = communities.len(),
            "Invite snapshots initialized"
        );
        initialized
    }

    /// Attribute a new member of `community` to the inviter whose invite was used
    ///
    /// The stored snapshot is replaced with the live list whether or not an
    /// invite matched. Without a prior snapshot the inviter is unknown.
    ///
    /// # Errors
    /// Returns [`FetchError`] if the live invite list cannot be fetched; the
    /// stored snapshot is left untouched in that case. Ledger write failures
    /// are not errors: they are logged and reported via
    /// [`AttributionResult::durable`].
    pub async fn attribute_join(
        &self,
        community: &CommunityId,
        member: &str,
    ) -> Result<AttributionResult, FetchError> {
        let lock = self.community_lock(community);
        let _guard = lock.lock().await;

        let live = self.fetch_live(community).await?;
        let used = self
            .snapshots
            .get(community)
            .and_then(|stored| stored.find_used(&live).cloned());
        self.snapshots
            .put(community.clone(), InviteSnapshot::from_invites(&live));

        let Some(Invite { code, inviter, .. }) = used else {
            tracing::info!(%community, member, "No invite use detected, inviter unknown");
            return Ok(AttributionResult::unknown(None));
        };

        let Some(inviter) = inviter else {
            tracing::info!(%community, member, code = %code, "Used invite has no creator");
            return Ok(AttributionResult::unknown(Some(code)));
        };

        let (total, durable) = self.record(&inviter).await;
        tracing::info!(%community, member, code = %code, inviter = %inviter, total, "Join attributed");

        Ok(AttributionResult {
            inviter: Inviter::Known(inviter),
            code: Some(code),
            total_for_inviter: total,
            durable,
        })
    }

    /// Replace the stored snapshot with a fresh live fetch, without attributing
    ///
    /// Used when invites are created or deleted and when the agent joins a
    /// community. Returns the number of live invites.
    pub async fn refresh(&self, community: &CommunityId) -> Result<usize, FetchError> {
        let lock = self.community_lock(community);
        let _guard = lock.lock().await;

        let live = self.fetch_live(community).await?;
        self.snapshots
            .put(community.clone(), InviteSnapshot::from_invites(&live));
        tracing::debug!(%community, invites = live.len(), "Invite snapshot refreshed");
        Ok(live.len())
    }

    /// Drop the snapshot of a community the agent has left
    ///
    /// Returns whether a snapshot was stored.
    pub async fn forget(&self, community: &CommunityId) -> bool {
        let lock = self.community_lock(community);
        let _guard = lock.lock().await;

        let removed = self.snapshots.remove(community).is_some();
        self.release_lock(community, &lock);
        tracing::debug!(%community, removed, "Invite snapshot dropped");
        removed
    }

    /// Current stored snapshot of `community`
    pub fn snapshot(&self, community: &CommunityId) -> Option<InviteSnapshot> {
        self.snapshots.get(community)
    }

    /// Attributed joins recorded for `inviter`
    pub async fn inviter_total(&self, inviter: &str) -> u64 {
        self.ledger.lock().await.get(inviter)
    }

    /// Copy of the in-memory ledger
    pub async fn ledger(&self) -> Ledger {
        self.ledger.lock().await.clone()
    }

    fn community_lock(&self, community: &CommunityId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .community_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(community.clone()).or_default())
    }

    /// Drop the lock entry of `community` unless another call is waiting on it
    fn release_lock(&self, community: &CommunityId, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .community_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one held by the caller
        if Arc::strong_count(lock) == 2 {
            locks.remove(community);
        }
    }

    async fn fetch_live(&self, community: &CommunityId) -> Result<Vec<Invite>, FetchError> {
        let timeout = self.config.fetch_timeout;
        match tokio::time::timeout(timeout, self.source.fetch_invites(community)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(FetchError::Timeout {
                community: community.clone(),
                timeout,
            }),
        }
    }

    /// Increment `inviter` and write the whole ledger back
    ///
    /// The write runs on the blocking pool and completes even if the caller
    /// is dropped mid-await. Writes are ordered by generation: a write that
    /// finds a newer ledger already stored is skipped, so a detached write
    /// never puts an older ledger back.
    async fn record(&self, inviter: &str) -> (u64, bool) {
        let mut ledger = self.ledger.lock().await;
        let total = ledger.increment(inviter);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let store = Arc::clone(&self.ledger_store);
        let written = Arc::clone(&self.written);
        let to_save = ledger.clone();
        let saved = tokio::task::spawn_blocking(move || -> Result<(), PersistError> {
            let mut written = written.lock().unwrap_or_else(|e| e.into_inner());
            if *written > generation {
                return Ok(());
            }
            store.save(&to_save)?;
            *written = generation;
            Ok(())
        })
        .await
        .unwrap_or_else(|e| Err(PersistError::Task(e.to_string())));

        match saved {
            Ok(()) => (total, true),
            Err(e) => {
                tracing::warn!(inviter, total, error = %e, "Ledger write failed, increment not durable");
                (total, false)
            }
        }
    }
}
