//! # JoinGuard Bot
//!
//! Telegram front end for the verification gate: long-polls the Bot API,
//! routes updates into [`joinguard_gate::VerificationGate`], answers
//! operator commands in private chat and serves a status endpoint.

pub mod config;
pub mod dispatch;
pub mod status;
pub mod telegram;

pub use config::{BotConfig, StatusSettings};
pub use dispatch::{Dispatcher, ProfileLookup};
pub use telegram::TelegramClient;
