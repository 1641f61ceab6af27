//! Join notices posted after an attribution
//!
//! A [`JoinNotice`] is what the surrounding glue would post to a community's
//! log channel. It renders either as templated text or as one JSON object
//! per line.

use crate::invite::CommunityId;
use crate::tracker::AttributionResult;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Text templates for join notices
///
/// Placeholders: `{member}`, `{community}`, `{inviter}`, `{code}`, `{total}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoticeTemplates {
    /// Used when the inviter is known
    pub known: String,
    /// Used when no inviter could be determined
    pub unknown: String,
}

impl Default for NoticeTemplates {
    fn default() -> Self {
        Self {
            known: "{member} joined {community}, invited by {inviter} via {code} ({total} invites)"
                .to_string(),
            unknown: "{member} joined {community}, inviter unknown".to_string(),
        }
    }
}

/// One member join, ready to be posted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinNotice {
    pub community: CommunityId,
    pub member: String,
    /// Inviter tag, `None` when unknown
    pub inviter: Option<String>,
    pub code: Option<String>,
    pub total: u64,
    pub durable: bool,
}

impl JoinNotice {
    pub fn new(community: CommunityId, member: impl Into<String>, result: &AttributionResult) -> Self {
        Self {
            community,
            member: member.into(),
            inviter: result.inviter.tag().map(str::to_string),
            code: result.code.clone(),
            total: result.total_for_inviter,
            durable: result.durable,
        }
    }

    /// Render with the matching template
    pub fn render(&self, templates: &NoticeTemplates) -> String {
        let template = if self.inviter.is_some() {
            &templates.known
        } else {
            &templates.unknown
        };

        // Single pass; substituted values are never scanned for placeholders
        let mut rendered = String::with_capacity(template.len());
        let mut rest = template.as_str();
        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let tail = &rest[open..];
            let substituted = tail
                .find('}')
                .and_then(|close| self.placeholder(&tail[1..close]).map(|value| (close, value)));
            match substituted {
                Some((close, value)) => {
                    rendered.push_str(&value);
                    rest = &tail[close + 1..];
                }
                None => {
                    rendered.push('{');
                    rest = &tail[1..];
                }
            }
        }
        rendered.push_str(rest);
        rendered
    }

    fn placeholder(&self, name: &str) -> Option<Cow<'_, str>> {
        let value = match name {
            "member" => Cow::Borrowed(self.member.as_str()),
            "community" => Cow::Borrowed(self.community.as_str()),
            "inviter" => Cow::Borrowed(self.inviter.as_deref().unwrap_or("unknown")),
            "code" => Cow::Borrowed(self.code.as_deref().unwrap_or("-")),
            "total" => Cow::Owned(self.total.to_string()),
            _ => return None,
        };
        Some(value)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::Inviter;

    fn known_result() -> AttributionResult {
        AttributionResult {
            inviter: Inviter::Known("alice#0001".to_string()),
            code: Some("abc123".to_string()),
            total_for_inviter: 4,
            durable: true,
        }
    }

    #[test]
    fn test_render_known() {
        let notice = JoinNotice::new("guild".into(), "bob#0002", &known_result());

        assert_eq!(
            notice.render(&NoticeTemplates::default()),
            "bob#0002 joined guild, invited by alice#0001 via abc123 (4 invites)"
        );
    }

    #[test]
    fn test_render_unknown() {
        let result = AttributionResult {
            inviter: Inviter::Unknown,
            code: None,
            total_for_inviter: 0,
            durable: true,
        };
        let notice = JoinNotice::new("guild".into(), "bob#0002", &result);

        assert_eq!(
            notice.render(&NoticeTemplates::default()),
            "bob#0002 joined guild, inviter unknown"
        );
    }

    #[test]
    fn test_render_custom_template() {
        let templates = NoticeTemplates {
            known: "Welcome {member}! Thanks {inviter} ({total})".to_string(),
            ..NoticeTemplates::default()
        };
        let notice = JoinNotice::new("guild".into(), "bob", &known_result());

        assert_eq!(notice.render(&templates), "Welcome bob! Thanks alice#0001 (4)");
    }

    #[test]
    fn test_placeholders_in_member_tag_are_not_expanded() {
        let notice = JoinNotice::new("guild".into(), "{inviter}{total}", &known_result());

        assert_eq!(
            notice.render(&NoticeTemplates::default()),
            "{inviter}{total} joined guild, invited by alice#0001 via abc123 (4 invites)"
        );
    }

    #[test]
    fn test_unknown_placeholders_and_stray_braces_are_kept() {
        let templates = NoticeTemplates {
            known: "{member} {{inviter}} {nope} {".to_string(),
            ..NoticeTemplates::default()
        };
        let notice = JoinNotice::new("guild".into(), "bob", &known_result());

        assert_eq!(notice.render(&templates), "bob {alice#0001}} {nope} {");
    }

    #[test]
    fn test_json_shape() {
        let notice = JoinNotice::new("guild".into(), "bob", &known_result());
        let value: serde_json::Value = serde_json::from_str(&notice.to_json().unwrap()).unwrap();

        assert_eq!(value["community"], "guild");
        assert_eq!(value["inviter"], "alice#0001");
        assert_eq!(value["code"], "abc123");
        assert_eq!(value["total"], 4);
        assert_eq!(value["durable"], true);
    }
}
