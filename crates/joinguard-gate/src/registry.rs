//! Pending verification registry
//!
//! Single owner of every pending [`VerificationRecord`]. All mutation goes
//! through [`VerificationRegistry::try_create`] and
//! [`VerificationRegistry::try_resolve`], each one check-and-set under a
//! single mutex. The pending set is small, so one lock over one map is
//! enough. No I/O happens while the lock is held.

use chrono::{DateTime, Duration, Utc};
use joinguard_common::{MessageId, VerificationKey};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

use crate::classifier::SuspicionReason;
use crate::timer::TimerHandle;

/// Lifecycle status of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Resolved,
}

/// One gated member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub key: VerificationKey,
    /// Name used when addressing the member in group messages
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub status: RecordStatus,
    pub reasons: Vec<SuspicionReason>,
    /// The challenge message, once it has been sent
    #[serde(default)]
    pub challenge_message: Option<MessageId>,
}

impl VerificationRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }

    /// Time left until the deadline, zero if already past
    pub fn remaining(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.deadline - now).to_std().unwrap_or_default()
    }
}

/// Who resolved a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requester {
    Click,
    Timeout,
}

/// Outcome of [`VerificationRegistry::try_create`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// New record; the caller performs the side effects
    Created(VerificationRecord),
    /// A record is already pending for this key
    AlreadyPending,
    /// The join is no newer than one seen before the key resolved: a
    /// redelivered event
    RecentlyResolved(Requester),
}

/// Outcome of [`VerificationRegistry::try_resolve`]
#[derive(Debug)]
pub enum ResolveOutcome {
    /// The caller won the transition and owns the side effects
    ResolvedBy(Resolution),
    /// Somebody else resolved this key first
    AlreadyResolved(Requester),
    NotFound,
}

impl ResolveOutcome {
    pub fn winner(&self) -> Option<Requester> {
        match self {
            ResolveOutcome::ResolvedBy(res) => Some(res.requester),
            _ => None,
        }
    }
}

/// The spoils of a won resolution
#[derive(Debug)]
pub struct Resolution {
    pub requester: Requester,
    pub record: VerificationRecord,
    /// The expiry timer attached to the record, if any
    pub timer: Option<TimerHandle>,
}

#[derive(Debug)]
struct PendingSlot {
    record: VerificationRecord,
    timer: Option<TimerHandle>,
    /// Latest platform join timestamp seen for the key
    last_join_at: DateTime<Utc>,
}

/// Memory of a resolved key
///
/// `last_join_at` is in the platform's clock, like every join timestamp it
/// is compared against. `forget_after` is local time.
#[derive(Debug, Clone, Copy)]
struct Tombstone {
    last_join_at: DateTime<Utc>,
    by: Requester,
    forget_after: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RegistryState {
    pending: HashMap<VerificationKey, PendingSlot>,
    settled: HashMap<VerificationKey, Tombstone>,
}

impl RegistryState {
    fn prune(&mut self, now: DateTime<Utc>) {
        let before = self.settled.len();
        self.settled.retain(|_, t| t.forget_after > now);
        let pruned = before - self.settled.len();
        if pruned > 0 {
            trace!(pruned, "forgot settled verifications");
        }
    }
}

/// Registry of pending verifications
#[derive(Debug)]
pub struct VerificationRegistry {
    state: Mutex<RegistryState>,
    replay_guard: Duration,
}

impl VerificationRegistry {
    /// `replay_guard` is how long a resolved key is remembered
    pub fn new(replay_guard: Duration) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            replay_guard,
        }
    }

    /// Insert a pending record for `key` unless one exists
    pub fn try_create(
        &self,
        key: VerificationKey,
        display_name: &str,
        reasons: Vec<SuspicionReason>,
        now: DateTime<Utc>,
        window: Duration,
    ) -> CreateOutcome {
        let mut state = self.state.lock();
        state.prune(now);

        if let Some(slot) = state.pending.get_mut(&key) {
            slot.last_join_at = slot.last_join_at.max(now);
            debug!(key = %key, "verification already pending");
            return CreateOutcome::AlreadyPending;
        }
        if let Some(tomb) = state.settled.get(&key) {
            if now <= tomb.last_join_at {
                debug!(key = %key, by = ?tomb.by, "join predates resolution, ignoring");
                return CreateOutcome::RecentlyResolved(tomb.by);
            }
        }
        state.settled.remove(&key);

        let record = VerificationRecord {
            key,
            display_name: display_name.to_string(),
            created_at: now,
            deadline: now + window,
            status: RecordStatus::Pending,
            reasons,
            challenge_message: None,
        };
        state.pending.insert(
            key,
            PendingSlot {
                record: record.clone(),
                timer: None,
                last_join_at: now,
            },
        );
        CreateOutcome::Created(record)
    }

    /// Transition `key` from pending to resolved; only the first caller wins
    pub fn try_resolve(
        &self,
        key: VerificationKey,
        requester: Requester,
        now: DateTime<Utc>,
    ) -> ResolveOutcome {
        let mut state = self.state.lock();

        if let Some(slot) = state.pending.remove(&key) {
            let mut record = slot.record;
            record.status = RecordStatus::Resolved;
            state.settled.insert(
                key,
                Tombstone {
                    last_join_at: slot.last_join_at,
                    by: requester,
                    forget_after: now + self.replay_guard,
                },
            );
            return ResolveOutcome::ResolvedBy(Resolution {
                requester,
                record,
                timer: slot.timer,
            });
        }

        match state.settled.get(&key) {
            Some(tomb) => ResolveOutcome::AlreadyResolved(tomb.by),
            None => ResolveOutcome::NotFound,
        }
    }

    /// Attach the challenge message and expiry timer to a pending record
    ///
    /// Hands the timer back if the record was resolved in the meantime.
    pub fn arm(
        &self,
        key: VerificationKey,
        message: Option<MessageId>,
        timer: TimerHandle,
    ) -> Result<(), TimerHandle> {
        let mut state = self.state.lock();
        match state.pending.get_mut(&key) {
            Some(slot) => {
                slot.record.challenge_message = message;
                slot.timer = Some(timer);
                Ok(())
            }
            None => Err(timer),
        }
    }

    /// Re-insert a record loaded from durable state
    ///
    /// Returns false if the key is already pending.
    pub fn restore(&self, mut record: VerificationRecord) -> bool {
        let mut state = self.state.lock();
        if state.pending.contains_key(&record.key) {
            return false;
        }
        record.status = RecordStatus::Pending;
        let slot = PendingSlot {
            last_join_at: record.created_at,
            record,
            timer: None,
        };
        state.pending.insert(slot.record.key, slot);
        true
    }

    pub fn get(&self, key: VerificationKey) -> Option<VerificationRecord> {
        self.state.lock().pending.get(&key).map(|slot| slot.record.clone())
    }

    /// Snapshot of every pending record, oldest first
    pub fn pending_records(&self) -> Vec<VerificationRecord> {
        let mut records: Vec<_> = self
            .state
            .lock()
            .pending
            .values()
            .map(|slot| slot.record.clone())
            .collect();
        records.sort_by_key(|r| (r.created_at, r.key));
        records
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for VerificationRegistry {
    fn default() -> Self {
        Self::new(Duration::seconds(joinguard_common::DEFAULT_REPLAY_GUARD_SECS as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn window() -> Duration {
        Duration::seconds(300)
    }

    fn create(
        registry: &VerificationRegistry,
        key: VerificationKey,
        now: DateTime<Utc>,
    ) -> CreateOutcome {
        registry.try_create(key, "mallory", vec![SuspicionReason::Handle], now, window())
    }

    #[test]
    fn test_create_sets_deadline() {
        let registry = VerificationRegistry::default();
        let now = Utc::now();
        let key = VerificationKey::new(5, -100);

        let record = match create(&registry, key, now) {
            CreateOutcome::Created(record) => record,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(record.deadline, now + window());
        assert_eq!(record.status, RecordStatus::Pending);
        assert_eq!(registry.get(key), Some(record));
    }

    #[test]
    fn test_second_create_is_absorbed() {
        let registry = VerificationRegistry::default();
        let now = Utc::now();
        let key = VerificationKey::new(5, -100);

        assert!(matches!(create(&registry, key, now), CreateOutcome::Created(_)));
        assert_eq!(
            create(&registry, key, now + Duration::seconds(1)),
            CreateOutcome::AlreadyPending
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_same_member_in_two_groups_is_two_records() {
        let registry = VerificationRegistry::default();
        let now = Utc::now();
        for group in [-1, -2] {
            let key = VerificationKey::new(5, group);
            assert!(matches!(create(&registry, key, now), CreateOutcome::Created(_)));
        }
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_first_resolver_wins() {
        let registry = VerificationRegistry::default();
        let now = Utc::now();
        let key = VerificationKey::new(5, -100);
        create(&registry, key, now);

        let first = registry.try_resolve(key, Requester::Click, now + Duration::seconds(120));
        assert_eq!(first.winner(), Some(Requester::Click));

        let second = registry.try_resolve(key, Requester::Timeout, now + Duration::seconds(300));
        assert!(matches!(second, ResolveOutcome::AlreadyResolved(Requester::Click)));
        assert!(registry.get(key).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_resolve_unknown_key() {
        let registry = VerificationRegistry::default();
        let key = VerificationKey::new(1, 1);
        let outcome = registry.try_resolve(key, Requester::Click, Utc::now());
        assert!(matches!(outcome, ResolveOutcome::NotFound));
    }

    #[test]
    fn test_redelivered_join_after_resolution() {
        let registry = VerificationRegistry::default();
        let t0 = Utc::now();
        let key = VerificationKey::new(5, -100);
        create(&registry, key, t0);
        registry.try_resolve(key, Requester::Click, t0 + Duration::seconds(120));

        // same join delivered again
        assert_eq!(
            create(&registry, key, t0),
            CreateOutcome::RecentlyResolved(Requester::Click)
        );
        // a real re-join later is gated again
        assert!(matches!(
            create(&registry, key, t0 + Duration::seconds(500)),
            CreateOutcome::Created(_)
        ));
    }

    #[test]
    fn test_rejoin_in_same_second_as_timeout_is_gated() {
        use chrono::TimeZone;

        let registry = VerificationRegistry::default();
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let key = VerificationKey::new(5, -100);
        create(&registry, key, t0);
        // local clock, sub-second
        registry.try_resolve(key, Requester::Timeout, t0 + Duration::milliseconds(300_700));

        // platform dates are whole seconds, so this rejoin reads as +300s
        assert!(matches!(
            create(&registry, key, t0 + Duration::seconds(300)),
            CreateOutcome::Created(_)
        ));
    }

    #[test]
    fn test_join_seen_while_pending_is_remembered() {
        let registry = VerificationRegistry::default();
        let t0 = Utc::now();
        let key = VerificationKey::new(5, -100);
        create(&registry, key, t0);
        assert_eq!(
            create(&registry, key, t0 + Duration::seconds(5)),
            CreateOutcome::AlreadyPending
        );
        registry.try_resolve(key, Requester::Click, t0 + Duration::seconds(10));

        assert_eq!(
            create(&registry, key, t0 + Duration::seconds(5)),
            CreateOutcome::RecentlyResolved(Requester::Click)
        );
        assert!(matches!(
            create(&registry, key, t0 + Duration::seconds(6)),
            CreateOutcome::Created(_)
        ));
    }

    #[test]
    fn test_tombstones_are_forgotten() {
        let registry = VerificationRegistry::new(Duration::seconds(60));
        let t0 = Utc::now();
        let key = VerificationKey::new(5, -100);
        create(&registry, key, t0);
        registry.try_resolve(key, Requester::Timeout, t0 + Duration::seconds(300));

        // prune happens on the next create
        create(&registry, VerificationKey::new(6, -100), t0 + Duration::seconds(1000));
        let outcome = registry.try_resolve(key, Requester::Click, t0 + Duration::seconds(1000));
        assert!(matches!(outcome, ResolveOutcome::NotFound));
    }

    #[tokio::test]
    async fn test_arm_after_resolution_returns_timer() {
        let registry = VerificationRegistry::default();
        let timer = crate::timer::ChallengeTimer::new();
        let now = Utc::now();
        let key = VerificationKey::new(5, -100);
        create(&registry, key, now);
        registry.try_resolve(key, Requester::Click, now);

        let handle = timer.schedule(key, std::time::Duration::from_secs(300), |_| async {});
        let returned = registry.arm(key, Some(MessageId(9)), handle).unwrap_err();
        returned.cancel();
    }

    #[tokio::test]
    async fn test_resolution_hands_back_timer_and_message() {
        let registry = VerificationRegistry::default();
        let timer = crate::timer::ChallengeTimer::new();
        let now = Utc::now();
        let key = VerificationKey::new(5, -100);
        create(&registry, key, now);

        let handle = timer.schedule(key, std::time::Duration::from_secs(300), |_| async {});
        registry.arm(key, Some(MessageId(9)), handle).unwrap();
        assert_eq!(registry.get(key).unwrap().challenge_message, Some(MessageId(9)));

        match registry.try_resolve(key, Requester::Click, now) {
            ResolveOutcome::ResolvedBy(res) => {
                assert_eq!(res.record.status, RecordStatus::Resolved);
                assert_eq!(res.record.challenge_message, Some(MessageId(9)));
                res.timer.expect("timer attached").cancel();
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_restore_marks_pending() {
        let registry = VerificationRegistry::default();
        let now = Utc::now();
        let record = VerificationRecord {
            key: VerificationKey::new(1, 2),
            display_name: "eve".into(),
            created_at: now,
            deadline: now + window(),
            status: RecordStatus::Resolved,
            reasons: vec![SuspicionReason::Link],
            challenge_message: None,
        };
        assert!(registry.restore(record.clone()));
        assert!(!registry.restore(record));
        assert_eq!(registry.pending_records()[0].status, RecordStatus::Pending);
    }

    #[test]
    fn test_concurrent_resolvers_exactly_one_wins() {
        for _ in 0..64 {
            let registry = Arc::new(VerificationRegistry::default());
            let now = Utc::now();
            let key = VerificationKey::new(5, -100);
            create(&registry, key, now);

            let threads: Vec<_> = [Requester::Click, Requester::Timeout]
                .into_iter()
                .map(|requester| {
                    let registry = registry.clone();
                    std::thread::spawn(move || registry.try_resolve(key, requester, now).winner())
                })
                .collect();

            let winners: Vec<_> = threads
                .into_iter()
                .filter_map(|t| t.join().unwrap())
                .collect();
            assert_eq!(winners.len(), 1);
        }
    }

    proptest! {
        #[test]
        fn prop_exactly_one_resolution(ops in proptest::collection::vec(any::<bool>(), 1..16)) {
            let registry = VerificationRegistry::default();
            let now = Utc::now();
            let key = VerificationKey::new(5, -100);
            create(&registry, key, now);

            let wins = ops
                .into_iter()
                .map(|click| if click { Requester::Click } else { Requester::Timeout })
                .filter(|r| registry.try_resolve(key, *r, now).winner().is_some())
                .count();
            prop_assert_eq!(wins, 1);
        }
    }
}
