//! Operator console
//!
//! Owner-only commands sent to the bot in a private chat. Plain
//! pass-through to the group registry and the platform; the verification
//! state machine is only read, never driven, from here.

use chrono::{DateTime, Duration, Utc};
use joinguard_common::{GroupId, SubjectId};
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::gate::VerificationGate;
use crate::groups::GroupRegistry;
use crate::platform::PlatformClient;

/// Longest temporary mute an operator may impose
pub const MAX_MUTE_MINUTES: u64 = 366 * 24 * 60;

pub const USAGE: &str = "/groups - list known groups\n\
/broadcast <group_id> <text> - post a message to a group\n\
/mute <group_id> <user_id> <minutes> - mute a member temporarily\n\
/pending - list pending verifications\n\
/help - this text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Groups,
    Broadcast { group: GroupId, text: String },
    Mute { group: GroupId, subject: SubjectId, minutes: u64 },
    Pending,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("not a command")]
    NotACommand,
    #[error("unknown command /{0}")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid {what}: {value}")]
    Invalid { what: &'static str, value: String },
}

impl OperatorCommand {
    /// Parse a message text. Accepts `/cmd@botname` forms.
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let text = text.trim();
        let rest = text.strip_prefix('/').ok_or(CommandError::NotACommand)?;
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();

        match name.as_str() {
            "groups" => Ok(Self::Groups),
            "pending" => Ok(Self::Pending),
            "help" | "start" => Ok(Self::Help),
            "broadcast" => {
                let (group, text) = args
                    .split_once(char::is_whitespace)
                    .ok_or(CommandError::Usage("/broadcast <group_id> <text>"))?;
                let text = text.trim();
                if text.is_empty() {
                    return Err(CommandError::Usage("/broadcast <group_id> <text>"));
                }
                Ok(Self::Broadcast {
                    group: parse_id(group, "group id")?,
                    text: text.to_string(),
                })
            }
            "mute" => {
                let parts: Vec<&str> = args.split_whitespace().collect();
                let &[group, subject, minutes] = parts.as_slice() else {
                    return Err(CommandError::Usage("/mute <group_id> <user_id> <minutes>"));
                };
                let minutes: u64 = minutes.parse().map_err(|_| CommandError::Invalid {
                    what: "minutes",
                    value: minutes.to_string(),
                })?;
                if minutes == 0 || minutes > MAX_MUTE_MINUTES {
                    return Err(CommandError::Invalid {
                        what: "minutes",
                        value: minutes.to_string(),
                    });
                }
                Ok(Self::Mute {
                    group: parse_id(group, "group id")?,
                    subject: parse_id(subject, "user id")?,
                    minutes,
                })
            }
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn parse_id<T: std::str::FromStr>(value: &str, what: &'static str) -> Result<T, CommandError> {
    value.parse().map_err(|_| CommandError::Invalid {
        what,
        value: value.to_string(),
    })
}

/// Executes operator commands
pub struct AdminConsole {
    owner: Option<SubjectId>,
    groups: Arc<GroupRegistry>,
    gate: Arc<VerificationGate>,
    platform: Arc<dyn PlatformClient>,
}

impl AdminConsole {
    pub fn new(
        owner: Option<SubjectId>,
        groups: Arc<GroupRegistry>,
        gate: Arc<VerificationGate>,
        platform: Arc<dyn PlatformClient>,
    ) -> Self {
        Self {
            owner,
            groups,
            gate,
            platform,
        }
    }

    pub fn is_owner(&self, sender: SubjectId) -> bool {
        self.owner == Some(sender)
    }

    /// Handle a private message; `None` means stay silent
    pub async fn handle(
        &self,
        sender: SubjectId,
        text: &str,
        now: DateTime<Utc>,
    ) -> Option<String> {
        if !self.is_owner(sender) {
            return None;
        }
        let command = match OperatorCommand::parse(text) {
            Ok(command) => command,
            Err(CommandError::NotACommand) => return None,
            Err(e) => return Some(e.to_string()),
        };
        info!(?command, "operator command");
        Some(self.execute(command, now).await)
    }

    pub async fn execute(&self, command: OperatorCommand, now: DateTime<Utc>) -> String {
        match command {
            OperatorCommand::Help => USAGE.to_string(),
            OperatorCommand::Groups => {
                let groups = self.groups.list();
                if groups.is_empty() {
                    return "No known groups.".to_string();
                }
                let mut out = String::new();
                for group in groups {
                    let _ = writeln!(out, "{} {}", group.id, group.title);
                }
                out.trim_end().to_string()
            }
            OperatorCommand::Pending => {
                let pending = self.gate.pending();
                if pending.is_empty() {
                    return "No pending verifications.".to_string();
                }
                let mut out = String::new();
                for record in pending {
                    let left = (record.deadline - now).num_seconds().max(0);
                    let _ = writeln!(
                        out,
                        "{} in {} ({}), {}s left",
                        record.key.subject, record.key.group, record.display_name, left
                    );
                }
                out.trim_end().to_string()
            }
            OperatorCommand::Broadcast { group, text } => {
                if !self.groups.contains(group) {
                    return format!("Unknown group {group}.");
                }
                match self.platform.send_message(group, &text, None).await {
                    Ok(_) => format!("Sent to {group}."),
                    Err(e) => {
                        warn!(
                            group = %group,
                            action = "broadcast",
                            error = %e,
                            "platform call failed"
                        );
                        format!("Failed: {e}")
                    }
                }
            }
            OperatorCommand::Mute {
                group,
                subject,
                minutes,
            } => {
                let until = now + Duration::minutes(minutes as i64);
                match self.platform.restrict_posting(subject, group, Some(until)).await {
                    Ok(()) => format!(
                        "Muted {subject} in {group} until {}.",
                        until.format("%Y-%m-%d %H:%M UTC")
                    ),
                    Err(e) => {
                        warn!(
                            subject = %subject,
                            group = %group,
                            action = "mute",
                            error = %e,
                            "platform call failed"
                        );
                        format!("Failed: {e}")
                    }
                }
            }
        }
    }
}
