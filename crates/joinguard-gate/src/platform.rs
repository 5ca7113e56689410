//! Messaging platform seam
//!
//! Everything the gate asks of the outside world goes through
//! [`PlatformClient`]. Implementations translate to a concrete bot API and
//! report failures; they never retry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use joinguard_common::{
    GroupId, MessageId, PlatformError, RemovalPolicy, SubjectId, VERIFY_CALLBACK_PREFIX,
};
use serde::{Deserialize, Serialize};

/// Inline control attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveControl {
    /// Button caption
    pub label: String,
    /// Opaque payload echoed back when the control is activated
    pub payload: String,
}

impl InteractiveControl {
    /// The confirmation button of a challenge, bound to one member
    pub fn verify_button(label: impl Into<String>, subject: SubjectId) -> Self {
        Self {
            label: label.into(),
            payload: format!("{}{}", VERIFY_CALLBACK_PREFIX, subject),
        }
    }

    /// Extract the bound member from a verify payload
    pub fn parse_verify_payload(payload: &str) -> Option<SubjectId> {
        payload
            .strip_prefix(VERIFY_CALLBACK_PREFIX)
            .and_then(|rest| rest.parse().ok())
    }
}

/// Operations the gate and operator console need from the platform
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Take away a member's ability to post, until `until` if given
    async fn restrict_posting(
        &self,
        subject: SubjectId,
        group: GroupId,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), PlatformError>;

    /// Give a member back the default posting rights
    async fn restore_posting(
        &self,
        subject: SubjectId,
        group: GroupId,
    ) -> Result<(), PlatformError>;

    /// Remove a member from a group
    async fn remove_member(
        &self,
        subject: SubjectId,
        group: GroupId,
        policy: RemovalPolicy,
    ) -> Result<(), PlatformError>;

    /// Post a message, optionally with an inline control
    async fn send_message(
        &self,
        group: GroupId,
        content: &str,
        control: Option<InteractiveControl>,
    ) -> Result<MessageId, PlatformError>;

    /// Replace the text of an earlier message and drop its controls
    async fn edit_message(
        &self,
        group: GroupId,
        message: MessageId,
        content: &str,
    ) -> Result<(), PlatformError>;

    /// Answer the activation of an inline control
    async fn acknowledge(
        &self,
        callback_id: &str,
        text: &str,
        alert: bool,
    ) -> Result<(), PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_payload_round_trip() {
        let control = InteractiveControl::verify_button("I am human", SubjectId(42));
        assert_eq!(control.payload, "verify:42");
        assert_eq!(InteractiveControl::parse_verify_payload(&control.payload), Some(SubjectId(42)));
    }

    #[test]
    fn test_foreign_payload_rejected() {
        assert_eq!(InteractiveControl::parse_verify_payload("vote:42"), None);
        assert_eq!(InteractiveControl::parse_verify_payload("verify:abc"), None);
    }
}
