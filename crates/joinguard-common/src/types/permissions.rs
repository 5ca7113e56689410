//! Permission and removal policy types
//!
//! The platform has changed the shape of its permission object more than
//! once. All of that is pinned down here: the gate only ever asks for
//! [`Posting::Denied`] or [`Posting::Allowed`], and the platform client
//! serializes the resulting [`ChatPermissions`] as-is.

use serde::{Deserialize, Serialize};

/// Version of the permission layout below
pub const PERMISSIONS_SCHEMA_VERSION: u8 = 2;

/// Whether a member may post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Posting {
    Denied,
    Allowed,
}

/// Per-member permission set
///
/// Field names follow the platform's wire names. Construct only through
/// [`ChatPermissions::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPermissions {
    #[serde(skip_serializing, default = "schema_version")]
    version: u8,
    can_send_messages: bool,
    can_send_audios: bool,
    can_send_documents: bool,
    can_send_photos: bool,
    can_send_videos: bool,
    can_send_video_notes: bool,
    can_send_voice_notes: bool,
    can_send_polls: bool,
    can_send_other_messages: bool,
    can_add_web_page_previews: bool,
}

fn schema_version() -> u8 {
    PERMISSIONS_SCHEMA_VERSION
}

impl ChatPermissions {
    pub fn new(posting: Posting) -> Self {
        let allowed = posting == Posting::Allowed;
        Self {
            version: PERMISSIONS_SCHEMA_VERSION,
            can_send_messages: allowed,
            can_send_audios: allowed,
            can_send_documents: allowed,
            can_send_photos: allowed,
            can_send_videos: allowed,
            can_send_video_notes: allowed,
            can_send_voice_notes: allowed,
            can_send_polls: allowed,
            can_send_other_messages: allowed,
            can_add_web_page_previews: allowed,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn posting(&self) -> Posting {
        if self.can_send_messages {
            Posting::Allowed
        } else {
            Posting::Denied
        }
    }
}

/// What happens to a member whose challenge window elapsed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Remove from the group; the member may join again
    #[default]
    Kick,
    /// Remove and block re-entry
    Ban,
}

impl std::fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalPolicy::Kick => write!(f, "kick"),
            RemovalPolicy::Ban => write!(f, "ban"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_clears_every_flag() {
        let perms = ChatPermissions::new(Posting::Denied);
        let json = serde_json::to_value(&perms).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("version"));
        assert!(obj.values().all(|v| v == &serde_json::Value::Bool(false)));
        assert_eq!(perms.posting(), Posting::Denied);
    }

    #[test]
    fn test_allowed_round_trip_keeps_version() {
        let perms = ChatPermissions::new(Posting::Allowed);
        let json = serde_json::to_string(&perms).unwrap();
        let back: ChatPermissions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, perms);
        assert_eq!(back.version(), PERMISSIONS_SCHEMA_VERSION);
    }

    #[test]
    fn test_removal_policy_from_config_string() {
        let policy: RemovalPolicy = serde_json::from_str("\"ban\"").unwrap();
        assert_eq!(policy, RemovalPolicy::Ban);
        assert_eq!(RemovalPolicy::default(), RemovalPolicy::Kick);
    }
}
