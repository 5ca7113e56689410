//! Verification gate
//!
//! Drives a joining member through
//! `Unrestricted -> PendingVerification -> {Verified, Removed}`.
//!
//! Every path that ends a verification goes through
//! [`VerificationRegistry::try_resolve`]; only the winner of that transition
//! talks to the platform. Platform failures are logged and counted, never
//! retried, and never roll back the registry.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use joinguard_common::{GroupId, PlatformError, RemovalPolicy, SubjectId, VerificationKey};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::classifier::{classify, describe_reasons};
use crate::messages::{render, MessageTemplates, TemplateArgs};
use crate::platform::{InteractiveControl, PlatformClient};
use crate::registry::{
    CreateOutcome, Requester, ResolveOutcome, VerificationRecord, VerificationRegistry,
};
use crate::store::PendingStore;
use crate::telemetry::GateMetrics;
use crate::timer::ChallengeTimer;

/// Gate tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Seconds a suspicious member has to confirm
    pub challenge_window_secs: u64,
    /// What removal means on timeout
    pub removal_policy: RemovalPolicy,
    /// Seconds a resolved key absorbs redelivered joins
    pub replay_guard_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            challenge_window_secs: joinguard_common::DEFAULT_CHALLENGE_WINDOW_SECS,
            removal_policy: RemovalPolicy::Kick,
            replay_guard_secs: joinguard_common::DEFAULT_REPLAY_GUARD_SECS,
        }
    }
}

impl GateConfig {
    fn challenge_window(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.challenge_window_secs as i64)
    }
}

/// A member joined a group
#[derive(Debug, Clone)]
pub struct JoinEvent {
    pub subject: SubjectId,
    pub group: GroupId,
    /// How to address the member in the group
    pub display_name: String,
    /// Profile text, if the lookup produced any
    pub profile_text: Option<String>,
    pub at: DateTime<Utc>,
}

/// A member activated a challenge's confirmation control
#[derive(Debug, Clone)]
pub struct ChallengeResponse {
    /// Member the control was bound to
    pub claimed_subject: SubjectId,
    /// Member who actually pressed it
    pub responder: SubjectId,
    pub group: GroupId,
    pub at: DateTime<Utc>,
    /// Platform handle for answering the press
    pub callback_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Clean profile, welcomed without restriction
    Welcomed,
    /// Restricted and challenged
    Challenged,
    /// A verification for this member is already pending or just resolved
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    Verified,
    NotYourChallenge,
    /// Already resolved or unknown
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOutcome {
    Removed,
    /// The member verified first, or the record is gone
    AlreadySettled,
}

/// Result of reloading checkpointed state at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records whose window is still open, timers re-armed
    pub resumed: usize,
    /// Records whose window closed while we were down, removed now
    pub expired: usize,
}

/// Orchestrates classifier, registry and timers
pub struct VerificationGate {
    config: GateConfig,
    registry: VerificationRegistry,
    timer: ChallengeTimer,
    platform: Arc<dyn PlatformClient>,
    store: Arc<dyn PendingStore>,
    templates: MessageTemplates,
    metrics: Arc<GateMetrics>,
    checkpoint_lock: Mutex<()>,
    this: Weak<VerificationGate>,
}

impl VerificationGate {
    pub fn new(
        config: GateConfig,
        platform: Arc<dyn PlatformClient>,
        store: Arc<dyn PendingStore>,
        templates: MessageTemplates,
        metrics: Arc<GateMetrics>,
    ) -> Arc<Self> {
        let replay_guard = ChronoDuration::seconds(config.replay_guard_secs as i64);
        Arc::new_cyclic(|this| Self {
            config,
            registry: VerificationRegistry::new(replay_guard),
            timer: ChallengeTimer::new(),
            platform,
            store,
            templates,
            metrics,
            checkpoint_lock: Mutex::new(()),
            this: this.clone(),
        })
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn registry(&self) -> &VerificationRegistry {
        &self.registry
    }

    pub fn timer(&self) -> &ChallengeTimer {
        &self.timer
    }

    pub fn metrics(&self) -> &GateMetrics {
        &self.metrics
    }

    /// Handle a member joining a group
    #[instrument(skip(self, join), fields(subject = %join.subject, group = %join.group))]
    pub async fn on_join(&self, join: JoinEvent) -> JoinOutcome {
        self.metrics.joins_total.inc();
        let key = VerificationKey::new(join.subject, join.group);
        let classification = classify(join.profile_text.as_deref());

        if !classification.is_suspicious() {
            debug!("clean profile, welcoming");
            let text = render(
                &self.templates.welcome,
                &TemplateArgs {
                    name: &join.display_name,
                    ..Default::default()
                },
            );
            let sent = self.platform.send_message(join.group, &text, None).await;
            self.report("send_welcome", key, sent);
            return JoinOutcome::Welcomed;
        }

        self.metrics.suspicious_joins_total.inc();
        let reasons: Vec<_> = classification.reasons.into_iter().collect();
        let record = match self.registry.try_create(
            key,
            &join.display_name,
            reasons,
            join.at,
            self.config.challenge_window(),
        ) {
            CreateOutcome::Created(record) => record,
            CreateOutcome::AlreadyPending | CreateOutcome::RecentlyResolved(_) => {
                debug!("duplicate join absorbed");
                self.metrics.duplicate_joins_total.inc();
                return JoinOutcome::Duplicate;
            }
        };
        info!(
            reasons = %describe_reasons(&record.reasons),
            deadline = %record.deadline,
            "gating suspicious member"
        );
        self.metrics.pending.set(self.registry.len() as i64);
        // durable before the member is muted
        self.checkpoint().await;

        let restricted = self.platform.restrict_posting(join.subject, join.group, None).await;
        self.report("restrict_posting", key, restricted);

        let text = render(
            &self.templates.challenge,
            &TemplateArgs {
                name: &record.display_name,
                reasons: &describe_reasons(&record.reasons),
                minutes: self.config.challenge_window_secs.div_ceil(60),
            },
        );
        let control = InteractiveControl::verify_button(&self.templates.button_label, join.subject);
        let sent = self.platform.send_message(join.group, &text, Some(control)).await;
        let message = self.report("send_challenge", key, sent);
        self.metrics.challenges_issued_total.inc();

        self.arm(&record, message, record.remaining(join.at));
        self.checkpoint().await;
        JoinOutcome::Challenged
    }

    /// Handle a press on a challenge's confirmation control
    #[instrument(
        skip(self, response),
        fields(subject = %response.claimed_subject, group = %response.group)
    )]
    pub async fn on_challenge_response(&self, response: ChallengeResponse) -> ChallengeOutcome {
        let key = VerificationKey::new(response.claimed_subject, response.group);

        if response.responder != response.claimed_subject {
            info!(responder = %response.responder, "challenge pressed by someone else");
            self.metrics.identity_mismatches_total.inc();
            self.ack(key, response.callback_id.as_deref(), &self.templates.not_yours, true)
                .await;
            return ChallengeOutcome::NotYourChallenge;
        }

        match self.registry.try_resolve(key, Requester::Click, response.at) {
            ResolveOutcome::ResolvedBy(resolution) => {
                if let Some(timer) = resolution.timer {
                    timer.cancel();
                }
                info!("member verified");
                self.metrics.verified_total.inc();
                self.metrics.pending.set(self.registry.len() as i64);
                // durable before posting is restored
                self.checkpoint().await;

                let restored = self.platform.restore_posting(key.subject, key.group).await;
                self.report("restore_posting", key, restored);
                self.ack(key, response.callback_id.as_deref(), &self.templates.verified_ack, false)
                    .await;

                let record = resolution.record;
                if let Some(message) = record.challenge_message {
                    let text = render(
                        &self.templates.verified,
                        &TemplateArgs {
                            name: &record.display_name,
                            ..Default::default()
                        },
                    );
                    let edited = self.platform.edit_message(key.group, message, &text).await;
                    self.report("edit_challenge", key, edited);
                }
                ChallengeOutcome::Verified
            }
            ResolveOutcome::AlreadyResolved(by) => {
                debug!(by = ?by, "response after resolution");
                self.stale_response(key, response.callback_id.as_deref()).await
            }
            ResolveOutcome::NotFound => {
                debug!("response for unknown verification");
                self.stale_response(key, response.callback_id.as_deref()).await
            }
        }
    }

    /// Handle the expiry of a challenge window
    #[instrument(skip(self), fields(subject = %key.subject, group = %key.group))]
    pub async fn on_timeout(&self, key: VerificationKey) -> TimeoutOutcome {
        let resolution = match self.registry.try_resolve(key, Requester::Timeout, Utc::now()) {
            ResolveOutcome::ResolvedBy(resolution) => resolution,
            ResolveOutcome::AlreadyResolved(_) | ResolveOutcome::NotFound => {
                debug!("timer fired for settled verification");
                return TimeoutOutcome::AlreadySettled;
            }
        };
        info!(policy = %self.config.removal_policy, "challenge window elapsed, removing member");
        self.metrics.removed_total.inc();
        self.metrics.pending.set(self.registry.len() as i64);

        let removed = self
            .platform
            .remove_member(key.subject, key.group, self.config.removal_policy)
            .await;
        self.report("remove_member", key, removed);
        // after removal: a crash before this point makes recover() remove again
        self.checkpoint().await;

        let record = resolution.record;
        let text = render(
            &self.templates.timeout,
            &TemplateArgs {
                name: &record.display_name,
                ..Default::default()
            },
        );
        match record.challenge_message {
            Some(message) => {
                let edited = self.platform.edit_message(key.group, message, &text).await;
                self.report("edit_challenge", key, edited);
            }
            None => {
                let sent = self.platform.send_message(key.group, &text, None).await;
                self.report("send_timeout_notice", key, sent);
            }
        }
        TimeoutOutcome::Removed
    }

    /// Reload checkpointed records after a restart
    ///
    /// Records whose deadline passed are resolved through the timeout path
    /// right away; the rest get a timer for the time they have left.
    pub async fn recover(
        &self,
        now: DateTime<Utc>,
    ) -> Result<RecoveryReport, joinguard_common::StoreError> {
        let records = self.store.load().await?;
        let mut report = RecoveryReport::default();
        let mut expired = Vec::new();

        for record in records {
            if !self.registry.restore(record.clone()) {
                continue;
            }
            if record.is_expired(now) {
                expired.push(record.key);
            } else {
                self.arm(&record, record.challenge_message, record.remaining(now));
                report.resumed += 1;
            }
        }
        self.metrics.pending.set(self.registry.len() as i64);

        for key in expired {
            if self.on_timeout(key).await == TimeoutOutcome::Removed {
                report.expired += 1;
            }
        }

        info!(
            resumed = report.resumed,
            expired = report.expired,
            "recovered pending verifications"
        );
        Ok(report)
    }

    /// Pending records, oldest first
    pub fn pending(&self) -> Vec<VerificationRecord> {
        self.registry.pending_records()
    }

    fn arm(
        &self,
        record: &VerificationRecord,
        message: Option<joinguard_common::MessageId>,
        fire_in: Duration,
    ) {
        let gate = self.this.clone();
        let handle = self.timer.schedule(record.key, fire_in, move |key| async move {
            if let Some(gate) = gate.upgrade() {
                gate.on_timeout(key).await;
            }
        });
        if let Err(handle) = self.registry.arm(record.key, message, handle) {
            debug!(key = %record.key, "resolved before timer was attached");
            handle.cancel();
        }
    }

    async fn stale_response(
        &self,
        key: VerificationKey,
        callback_id: Option<&str>,
    ) -> ChallengeOutcome {
        self.metrics.stale_responses_total.inc();
        self.ack(key, callback_id, &self.templates.expired, false).await;
        ChallengeOutcome::Expired
    }

    async fn ack(&self, key: VerificationKey, callback_id: Option<&str>, text: &str, alert: bool) {
        if let Some(callback_id) = callback_id {
            let acked = self.platform.acknowledge(callback_id, text, alert).await;
            self.report("acknowledge", key, acked);
        }
    }

    async fn checkpoint(&self) {
        let _guard = self.checkpoint_lock.lock().await;
        let records = self.registry.pending_records();
        if let Err(e) = self.store.save(&records).await {
            warn!(error = %e, pending = records.len(), "checkpoint failed");
        }
    }

    /// Log and count a failed side effect; pass successes through
    fn report<T>(
        &self,
        action: &'static str,
        key: VerificationKey,
        result: Result<T, PlatformError>,
    ) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                if e.is_permission_denied() {
                    warn!(
                        subject = %key.subject,
                        group = %key.group,
                        action,
                        error = %e,
                        "platform refused, check bot admin rights"
                    );
                } else {
                    warn!(
                        subject = %key.subject,
                        group = %key.group,
                        action,
                        error = %e,
                        "platform call failed"
                    );
                }
                self.metrics
                    .platform_failures_total
                    .with_label_values(&[action])
                    .inc();
                None
            }
        }
    }
}
