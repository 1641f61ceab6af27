//! Invite data model and the snapshot diff
//!
//! A community's invites are observed as a list of `{code, uses, inviter}`
//! records. The tracker keeps the last observed counts per code as an
//! [`InviteSnapshot`] and compares it against the next live list to decide
//! which invite was just used.
//!
//! # Matching Heuristic
//!
//! The first code (in live enumeration order) whose use count went up wins.
//! If two different invites are used between two fetches only one of them is
//! reported. This is a best-effort approximation, not a correctness guarantee.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifier of a community (the platform's top-level membership container)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommunityId(pub String);

impl CommunityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommunityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One live invite as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    /// Opaque invite code, unique within a community
    pub code: String,
    /// Number of times the invite has been used so far
    pub uses: u64,
    /// Tag of the member who created the invite (absent for vanity/widget invites)
    #[serde(default)]
    pub inviter: Option<String>,
}

impl Invite {
    pub fn new(code: impl Into<String>, uses: u64, inviter: Option<&str>) -> Self {
        Self {
            code: code.into(),
            uses,
            inviter: inviter.map(str::to_string),
        }
    }
}

/// Last-known `{code -> uses}` mapping for one community
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InviteSnapshot {
    uses: HashMap<String, u64>,
}

impl InviteSnapshot {
    /// Create an empty snapshot (no prior data)
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from a live invite list
    ///
    /// If the platform reports the same code twice the last entry wins.
    pub fn from_invites(invites: &[Invite]) -> Self {
        let uses = invites
            .iter()
            .map(|invite| (invite.code.clone(), invite.uses))
            .collect();
        Self { uses }
    }

    /// Recorded use count for `code`, if the code was seen
    pub fn uses(&self, code: &str) -> Option<u64> {
        self.uses.get(code).copied()
    }

    pub fn len(&self) -> usize {
        self.uses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uses.is_empty()
    }

    /// Find the invite in `live` whose use count increased since this snapshot
    ///
    /// A code missing from the snapshot counts as having had zero uses, so a
    /// brand-new invite with one use qualifies. Returns the first match in
    /// `live` order, or `None` when nothing increased.
    pub fn find_used<'a>(&self, live: &'a [Invite]) -> Option<&'a Invite> {
        live.iter()
            .find(|invite| invite.uses > self.uses(&invite.code).unwrap_or(0))
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for InviteSnapshot {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        Self {
            uses: iter.into_iter().map(|(code, n)| (code.into(), n)).collect(),
        }
    }
}
