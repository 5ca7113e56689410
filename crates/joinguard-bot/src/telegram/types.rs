//! Bot API wire types
//!
//! Only the fields JoinGuard reads. Unknown fields are ignored.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Response envelope shared by every method
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub error_code: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
    pub my_chat_member: Option<ChatMemberUpdated>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl User {
    /// `@username` if set, otherwise the full name
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(username) => format!("@{username}"),
            None => match &self.last_name {
                Some(last) => format!("{} {}", self.first_name, last),
                None => self.first_name.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
}

impl Chat {
    pub fn is_group(&self) -> bool {
        matches!(self.kind.as_str(), "group" | "supergroup")
    }

    pub fn is_private(&self) -> bool {
        self.kind == "private"
    }
}

/// Result of `getChat`; `bio` is set for users who have one
#[derive(Debug, Clone, Deserialize)]
pub struct ChatFullInfo {
    pub id: i64,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub date: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    #[serde(default)]
    pub new_chat_members: Vec<User>,
}

impl Message {
    pub fn sent_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.date, 0).single().unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMemberUpdated {
    pub chat: Chat,
    pub from: User,
    pub date: i64,
    pub new_chat_member: ChatMember,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMember {
    pub status: String,
    pub user: User,
}

impl ChatMember {
    pub fn is_present(&self) -> bool {
        matches!(self.status.as_str(), "creator" | "administrator" | "member" | "restricted")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_join_update() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 3,
                "date": 1_700_000_000,
                "chat": {"id": -1001, "type": "supergroup", "title": "Rustaceans"},
                "from": {"id": 5, "is_bot": false, "first_name": "Mal"},
                "new_chat_members": [
                    {"id": 5, "is_bot": false, "first_name": "Mal", "last_name": "Lory"},
                    {"id": 6, "is_bot": true, "first_name": "Spam", "username": "spam_bot"}
                ],
                "new_chat_member": {"id": 5, "is_bot": false, "first_name": "Mal"}
            }
        }))
        .unwrap();

        let message = update.message.unwrap();
        assert!(message.chat.is_group());
        assert_eq!(message.new_chat_members.len(), 2);
        assert_eq!(message.new_chat_members[0].display_name(), "Mal Lory");
        assert_eq!(message.new_chat_members[1].display_name(), "@spam_bot");
        assert_eq!(message.sent_at().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_parse_error_envelope() {
        let resp: ApiResponse<bool> = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: not enough rights"}"#,
        )
        .unwrap();
        assert!(!resp.ok);
        assert!(resp.result.is_none());
        assert_eq!(resp.error_code, Some(400));
    }

    #[test]
    fn test_keyboard_wire_shape() {
        let markup = InlineKeyboardMarkup {
            inline_keyboard: vec![vec![InlineKeyboardButton {
                text: "I am human".into(),
                callback_data: "verify:5".into(),
            }]],
        };
        assert_eq!(
            serde_json::to_value(&markup).unwrap(),
            serde_json::json!({
                "inline_keyboard": [[{"text": "I am human", "callback_data": "verify:5"}]]
            })
        );
    }
}
