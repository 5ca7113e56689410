//! Bot API HTTP client
//!
//! Implements [`PlatformClient`] over the Telegram Bot API. Each call is a
//! single JSON POST; failures are mapped to [`PlatformError`] and returned
//! to the caller, never retried here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use joinguard_common::{
    ChatPermissions, GroupId, MessageId, PlatformError, Posting, RemovalPolicy, SubjectId,
};
use joinguard_gate::{InteractiveControl, PlatformClient};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};

use super::types::{
    ApiResponse, ChatFullInfo, InlineKeyboardButton, InlineKeyboardMarkup, Message, Update, User,
};
use crate::dispatch::ProfileLookup;

/// Update kinds requested from getUpdates
const ALLOWED_UPDATES: [&str; 3] = ["message", "callback_query", "my_chat_member"];

/// Telegram Bot API client
pub struct TelegramClient {
    http: reqwest::Client,
    endpoint: String,
}

impl TelegramClient {
    /// Create a client; `poll_timeout` bounds getUpdates long polls
    pub fn new(
        api_base_url: &str,
        token: &str,
        poll_timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(poll_timeout + Duration::from_secs(15))
            .build()
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("{}/bot{}", api_base_url.trim_end_matches('/'), token),
        })
    }

    async fn call<P, R>(&self, method: &'static str, params: &P) -> Result<R, PlatformError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.endpoint, method);
        let response = self
            .http
            .post(&url)
            .json(params)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.without_url().to_string()))?;

        let envelope: ApiResponse<R> = response
            .json()
            .await
            .map_err(|e| PlatformError::Decode(format!("{method}: {}", e.without_url())))?;

        if !envelope.ok {
            return Err(PlatformError::Api {
                method,
                code: envelope.error_code.unwrap_or_default(),
                description: envelope.description.unwrap_or_default(),
            });
        }
        envelope
            .result
            .ok_or_else(|| PlatformError::Decode(format!("{method}: ok without result")))
    }

    pub async fn get_me(&self) -> Result<User, PlatformError> {
        self.call("getMe", &json!({})).await
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, PlatformError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ALLOWED_UPDATES,
            }),
        )
        .await
    }

    async fn set_permissions(
        &self,
        subject: SubjectId,
        group: GroupId,
        posting: Posting,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), PlatformError> {
        let mut params = json!({
            "chat_id": group.get(),
            "user_id": subject.get(),
            "permissions": ChatPermissions::new(posting),
            "use_independent_chat_permissions": true,
        });
        if let Some(until) = until {
            params["until_date"] = json!(until.timestamp());
        }
        let _: bool = self.call("restrictChatMember", &params).await?;
        Ok(())
    }
}

#[async_trait]
impl PlatformClient for TelegramClient {
    #[instrument(skip(self))]
    async fn restrict_posting(
        &self,
        subject: SubjectId,
        group: GroupId,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), PlatformError> {
        self.set_permissions(subject, group, Posting::Denied, until).await
    }

    #[instrument(skip(self))]
    async fn restore_posting(
        &self,
        subject: SubjectId,
        group: GroupId,
    ) -> Result<(), PlatformError> {
        self.set_permissions(subject, group, Posting::Allowed, None).await
    }

    #[instrument(skip(self))]
    async fn remove_member(
        &self,
        subject: SubjectId,
        group: GroupId,
        policy: RemovalPolicy,
    ) -> Result<(), PlatformError> {
        let target = json!({ "chat_id": group.get(), "user_id": subject.get() });
        let _: bool = self.call("banChatMember", &target).await?;
        if policy == RemovalPolicy::Kick {
            // lifting the ban right away turns it into a kick
            let _: bool = self
                .call(
                    "unbanChatMember",
                    &json!({
                        "chat_id": group.get(),
                        "user_id": subject.get(),
                        "only_if_banned": true,
                    }),
                )
                .await?;
        }
        debug!(%subject, %group, %policy, "member removed");
        Ok(())
    }

    #[instrument(skip(self, content))]
    async fn send_message(
        &self,
        group: GroupId,
        content: &str,
        control: Option<InteractiveControl>,
    ) -> Result<MessageId, PlatformError> {
        let mut params = json!({ "chat_id": group.get(), "text": content });
        if let Some(control) = control {
            let markup = InlineKeyboardMarkup {
                inline_keyboard: vec![vec![InlineKeyboardButton {
                    text: control.label,
                    callback_data: control.payload,
                }]],
            };
            params["reply_markup"] = serde_json::to_value(markup)
                .map_err(|e| PlatformError::Decode(e.to_string()))?;
        }
        let message: Message = self.call("sendMessage", &params).await?;
        Ok(MessageId(message.message_id))
    }

    #[instrument(skip(self, content))]
    async fn edit_message(
        &self,
        group: GroupId,
        message: MessageId,
        content: &str,
    ) -> Result<(), PlatformError> {
        // result is the edited Message, or `true` for inline messages
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                &json!({ "chat_id": group.get(), "message_id": message.get(), "text": content }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn acknowledge(
        &self,
        callback_id: &str,
        text: &str,
        alert: bool,
    ) -> Result<(), PlatformError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &json!({ "callback_query_id": callback_id, "text": text, "show_alert": alert }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileLookup for TelegramClient {
    async fn profile_text(&self, subject: SubjectId) -> Result<Option<String>, PlatformError> {
        let info: ChatFullInfo = self.call("getChat", &json!({ "chat_id": subject.get() })).await?;
        Ok(info.bio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_normalizes_trailing_slash() {
        let client =
            TelegramClient::new("https://api.telegram.org/", "1:x", Duration::from_secs(30))
                .unwrap();
        assert_eq!(client.endpoint, "https://api.telegram.org/bot1:x");
    }

    #[tokio::test]
    async fn test_unreachable_api_is_transport_error() {
        // nothing listens on port 9 locally
        let client =
            TelegramClient::new("http://127.0.0.1:9", "1:x", Duration::from_secs(1)).unwrap();
        let err = client.get_me().await.unwrap_err();
        assert!(matches!(err, PlatformError::Transport(_)));
    }
}
