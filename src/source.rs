//! Live invite sources
//!
//! [`InviteSource`] is the seam between the tracker and the chat platform.
//! A real deployment implements it over the platform API; [`ReplaySource`]
//! serves invite lists recorded in an event log so the tracker can run
//! offline and in tests.

use crate::invite::{CommunityId, Invite};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while fetching a community's live invite list
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("invite fetch for community {community} timed out after {timeout:?}")]
    Timeout {
        community: CommunityId,
        timeout: Duration,
    },

    #[error("community {0} is not known to the invite source")]
    UnknownCommunity(CommunityId),

    #[error("invite fetch for community {community} failed: {reason}")]
    Platform {
        community: CommunityId,
        reason: String,
    },
}

/// Fetches the current invite list of a community
#[async_trait]
pub trait InviteSource: Send + Sync {
    async fn fetch_invites(&self, community: &CommunityId) -> Result<Vec<Invite>, FetchError>;
}

/// Invite source backed by invite lists recorded in an event log
///
/// Each community holds the most recently recorded list; fetches return a
/// copy of it in recorded order.
#[derive(Debug, Default)]
pub struct ReplaySource {
    live: RwLock<HashMap<CommunityId, Vec<Invite>>>,
}

impl ReplaySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the live invite list of `community`
    pub fn set_invites(&self, community: CommunityId, invites: Vec<Invite>) {
        let mut live = self.live.write().unwrap_or_else(|e| e.into_inner());
        live.insert(community, invites);
    }

    /// Stop serving invites for `community`
    pub fn remove(&self, community: &CommunityId) {
        let mut live = self.live.write().unwrap_or_else(|e| e.into_inner());
        live.remove(community);
    }
}

#[async_trait]
impl InviteSource for ReplaySource {
    async fn fetch_invites(&self, community: &CommunityId) -> Result<Vec<Invite>, FetchError> {
        let live = self.live.read().unwrap_or_else(|e| e.into_inner());
        live.get(community)
            .cloned()
            .ok_or_else(|| FetchError::UnknownCommunity(community.clone()))
    }
}
