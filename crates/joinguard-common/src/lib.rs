//! # JoinGuard Common
//!
//! Shared types and errors for the JoinGuard join-time verification gate.
//!
//! ## Core Types
//!
//! - [`SubjectId`]/[`GroupId`]/[`MessageId`]: opaque platform identifiers
//! - [`VerificationKey`]: the `(subject, group)` pair a pending verification is keyed by
//! - [`ChatPermissions`]: versioned permission set sent to the platform
//! - [`RemovalPolicy`]: what "remove member" means on timeout
//!
//! ## Errors
//!
//! - [`PlatformError`]: a failed messaging platform call
//! - [`StoreError`]: state file I/O and decoding
//! - [`ConfigError`]: settings rejected at startup

pub mod error;
pub mod types;

pub use error::{ConfigError, PlatformError, StoreError};
pub use types::{
    ids::{GroupId, MessageId, SubjectId, VerificationKey},
    permissions::{ChatPermissions, Posting, RemovalPolicy, PERMISSIONS_SCHEMA_VERSION},
};

/// JoinGuard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default challenge window in seconds
pub const DEFAULT_CHALLENGE_WINDOW_SECS: u64 = 300;

/// Default time a resolved key is remembered to absorb redelivered joins
pub const DEFAULT_REPLAY_GUARD_SECS: u64 = 600;

/// Callback payload prefix carried by the challenge button
pub const VERIFY_CALLBACK_PREFIX: &str = "verify:";
