//! Per-community snapshot storage

use crate::invite::{CommunityId, InviteSnapshot};
use std::collections::HashMap;
use std::sync::Mutex;

/// Storage for the last-known invite snapshot of each community
///
/// Snapshots are replaced wholesale; implementations never merge.
pub trait SnapshotStore: Send + Sync {
    fn get(&self, community: &CommunityId) -> Option<InviteSnapshot>;

    fn put(&self, community: CommunityId, snapshot: InviteSnapshot);

    /// Drop the snapshot of a community the agent no longer belongs to
    fn remove(&self, community: &CommunityId) -> Option<InviteSnapshot>;
}

/// In-memory snapshot store (discarded at process exit)
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<CommunityId, InviteSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of communities with a stored snapshot
    pub fn len(&self) -> usize {
        self.snapshots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn get(&self, community: &CommunityId) -> Option<InviteSnapshot> {
        let snapshots = self.snapshots.lock().unwrap_or_else(|e| e.into_inner());
        snapshots.get(community).cloned()
    }

    fn put(&self, community: CommunityId, snapshot: InviteSnapshot) {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(|e| e.into_inner());
        snapshots.insert(community, snapshot);
    }

    fn remove(&self, community: &CommunityId) -> Option<InviteSnapshot> {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(|e| e.into_inner());
        snapshots.remove(community)
    }
}
