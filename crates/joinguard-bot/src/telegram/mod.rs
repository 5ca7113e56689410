//! Telegram Bot API adapter

pub mod client;
pub mod types;

pub use client::TelegramClient;
pub use types::{CallbackQuery, Chat, ChatMemberUpdated, Message, Update, User};
