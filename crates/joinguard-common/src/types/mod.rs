//! Core identifier and permission types

pub mod ids;
pub mod permissions;
