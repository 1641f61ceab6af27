//! Platform events as they appear in an event log (one JSON object per line)
//!
//! ```text
//! {"event":"invites","community":"g1","invites":[{"code":"A","uses":2,"inviter":"alice#0001"}]}
//! {"event":"ready","communities":["g1"]}
//! {"event":"member_join","community":"g1","member":"bob#0002"}
//! ```

use crate::invite::{CommunityId, Invite};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlatformEvent {
    /// Session established; the agent belongs to these communities
    Ready { communities: Vec<CommunityId> },

    /// Live invite list as the platform now reports it (replay input only)
    Invites {
        community: CommunityId,
        invites: Vec<Invite>,
    },

    InviteCreate { community: CommunityId },

    InviteDelete { community: CommunityId },

    /// The agent was added to a community
    CommunityCreate { community: CommunityId },

    /// The agent was removed from a community
    CommunityDelete { community: CommunityId },

    MemberJoin {
        community: CommunityId,
        member: String,
    },
}

impl PlatformEvent {
    /// Community the event belongs to (`None` for session-wide events)
    pub fn community(&self) -> Option<&CommunityId> {
        match self {
            PlatformEvent::Ready { .. } => None,
            PlatformEvent::Invites { community, .. }
            | PlatformEvent::InviteCreate { community }
            | PlatformEvent::InviteDelete { community }
            | PlatformEvent::CommunityCreate { community }
            | PlatformEvent::CommunityDelete { community }
            | PlatformEvent::MemberJoin { community, .. } => Some(community),
        }
    }

    /// Parse one event log line
    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}
