//! # JoinGuard Gate
//!
//! Join-time verification for chat groups. When a member joins, their
//! profile text is classified; a suspicious member is muted and challenged
//! to press a confirmation button within the challenge window, otherwise
//! removed.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   VerificationGate                       │
//! │   on_join ─────┐   on_challenge_response   on_timeout    │
//! │                │            │                  ▲         │
//! │   ┌────────────▼──┐   ┌─────▼──────────────┐   │         │
//! │   │  classifier   │   │VerificationRegistry│   │         │
//! │   │ (pure, total) │   │ try_create         │   │         │
//! │   └───────────────┘   │ try_resolve (CAS)  │   │         │
//! │                       └────────────────────┘   │         │
//! │   ┌──────────────────────────────────────────┐ │         │
//! │   │ ChallengeTimer (one task per record) ────┼─┘         │
//! │   └──────────────────────────────────────────┘           │
//! └────────────┬──────────────────────────┬──────────────────┘
//!              │                          │
//!      PlatformClient               PendingStore
//!   (mute/restore/remove/send)    (JSON checkpoint)
//! ```
//!
//! Side effects are requested only by the caller that won the registry
//! transition, after the transition committed.

pub mod admin;
pub mod classifier;
pub mod gate;
pub mod groups;
pub mod messages;
pub mod platform;
pub mod registry;
pub mod store;
pub mod telemetry;
pub mod timer;

pub use admin::{AdminConsole, CommandError, OperatorCommand};
pub use classifier::{classify, Classification, SuspicionReason};
pub use gate::{
    ChallengeOutcome, ChallengeResponse, GateConfig, JoinEvent, JoinOutcome, RecoveryReport,
    TimeoutOutcome, VerificationGate,
};
pub use groups::{GroupInfo, GroupRegistry};
pub use messages::MessageTemplates;
pub use platform::{InteractiveControl, PlatformClient};
pub use registry::{
    CreateOutcome, RecordStatus, Requester, ResolveOutcome, Resolution, VerificationRecord,
    VerificationRegistry,
};
pub use store::{InMemoryStore, JsonFileStore, PendingStore};
pub use telemetry::GateMetrics;
pub use timer::{ChallengeTimer, TimerHandle};
