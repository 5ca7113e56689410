//! Update dispatcher
//!
//! Turns Bot API updates into gate events and operator commands. Each
//! update is handled on its own task so a slow platform call for one
//! member never holds up another.

use async_trait::async_trait;
use chrono::Utc;
use joinguard_common::{GroupId, PlatformError, SubjectId};
use joinguard_gate::{
    AdminConsole, ChallengeResponse, GroupRegistry, InteractiveControl, JoinEvent, PlatformClient,
    VerificationGate,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::telegram::{CallbackQuery, ChatMemberUpdated, Message, TelegramClient, Update};

/// Pause after a failed getUpdates before polling again
const POLL_BACKOFF: Duration = Duration::from_secs(5);

/// How long shutdown waits for in-flight update handlers
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of member profile text
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn profile_text(&self, subject: SubjectId) -> Result<Option<String>, PlatformError>;
}

pub struct Dispatcher {
    bot_id: SubjectId,
    gate: Arc<VerificationGate>,
    groups: Arc<GroupRegistry>,
    admin: AdminConsole,
    platform: Arc<dyn PlatformClient>,
    profiles: Arc<dyn ProfileLookup>,
}

impl Dispatcher {
    pub fn new(
        bot_id: SubjectId,
        gate: Arc<VerificationGate>,
        groups: Arc<GroupRegistry>,
        admin: AdminConsole,
        platform: Arc<dyn PlatformClient>,
        profiles: Arc<dyn ProfileLookup>,
    ) -> Self {
        Self {
            bot_id,
            gate,
            groups,
            admin,
            platform,
            profiles,
        }
    }

    /// Poll until `shutdown` flips to true, then drain in-flight handlers
    pub async fn run(
        self: Arc<Self>,
        client: Arc<TelegramClient>,
        poll_timeout_secs: u64,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut offset = 0i64;
        let mut inflight: Vec<JoinHandle<()>> = Vec::new();
        info!("polling for updates");

        loop {
            let batch = tokio::select! {
                _ = shutdown.changed() => break,
                batch = client.get_updates(offset, poll_timeout_secs) => batch,
            };

            match batch {
                Ok(updates) => {
                    inflight.retain(|handle| !handle.is_finished());
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        let this = self.clone();
                        inflight.push(tokio::spawn(async move {
                            this.handle_update(update).await
                        }));
                    }
                }
                Err(e) => {
                    warn!(error = %e, "getUpdates failed");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(POLL_BACKOFF) => {}
                    }
                }
            }
        }
        info!(inflight = inflight.len(), "update polling stopped, draining handlers");
        Self::drain(inflight, DRAIN_TIMEOUT).await;
    }

    /// Wait for spawned handlers, giving up after `limit`
    async fn drain(handles: Vec<JoinHandle<()>>, limit: Duration) -> bool {
        let all = async {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "update handler failed");
                }
            }
        };
        match tokio::time::timeout(limit, all).await {
            Ok(()) => true,
            Err(_) => {
                warn!("update handlers still running at shutdown");
                false
            }
        }
    }

    pub async fn handle_update(&self, update: Update) {
        if let Some(message) = update.message {
            self.handle_message(message).await;
        } else if let Some(query) = update.callback_query {
            self.handle_callback(query).await;
        } else if let Some(change) = update.my_chat_member {
            self.handle_membership(change).await;
        }
    }

    async fn handle_message(&self, message: Message) {
        if message.chat.is_private() {
            if let (Some(from), Some(text)) = (&message.from, &message.text) {
                let sender = SubjectId(from.id);
                if let Some(reply) = self.admin.handle(sender, text, Utc::now()).await {
                    let chat = GroupId(message.chat.id);
                    if let Err(e) = self.platform.send_message(chat, &reply, None).await {
                        warn!(error = %e, "failed to answer operator");
                    }
                }
            }
            return;
        }
        if !message.chat.is_group() {
            return;
        }

        let group = GroupId(message.chat.id);
        let title = message.chat.title.as_deref().unwrap_or_default();
        if self.groups.observe(group, title, Utc::now()) {
            self.persist_groups().await;
        }

        let at = message.sent_at();
        for member in &message.new_chat_members {
            if member.is_bot || SubjectId(member.id) == self.bot_id {
                debug!(member = member.id, "skipping bot account");
                continue;
            }
            let subject = SubjectId(member.id);
            let profile_text = match self.profiles.profile_text(subject).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        %subject,
                        %group,
                        action = "profile_lookup",
                        error = %e,
                        "treating profile as empty"
                    );
                    None
                }
            };
            self.gate
                .on_join(JoinEvent {
                    subject,
                    group,
                    display_name: member.display_name(),
                    profile_text,
                    at,
                })
                .await;
        }
    }

    async fn handle_callback(&self, query: CallbackQuery) {
        let claimed = query
            .data
            .as_deref()
            .and_then(InteractiveControl::parse_verify_payload);
        let (claimed, message) = match (claimed, query.message) {
            (Some(claimed), Some(message)) => (claimed, message),
            _ => {
                debug!(data = ?query.data, "ignoring unrelated callback");
                if let Err(e) = self.platform.acknowledge(&query.id, "", false).await {
                    warn!(error = %e, "failed to answer callback");
                }
                return;
            }
        };

        self.gate
            .on_challenge_response(ChallengeResponse {
                claimed_subject: claimed,
                responder: SubjectId(query.from.id),
                group: GroupId(message.chat.id),
                at: Utc::now(),
                callback_id: Some(query.id),
            })
            .await;
    }

    async fn handle_membership(&self, change: ChatMemberUpdated) {
        if SubjectId(change.new_chat_member.user.id) != self.bot_id || !change.chat.is_group() {
            return;
        }
        let group = GroupId(change.chat.id);
        let changed = if change.new_chat_member.is_present() {
            let title = change.chat.title.as_deref().unwrap_or_default();
            self.groups.observe(group, title, Utc::now())
        } else {
            info!(%group, status = %change.new_chat_member.status, "bot left group");
            self.groups.forget(group).is_some()
        };
        if changed {
            self.persist_groups().await;
        }
    }

    async fn persist_groups(&self) {
        if let Err(e) = self.groups.persist().await {
            warn!(error = %e, "failed to persist group registry");
        }
    }
}
