//! Shared types for the genie worker: persisted document shapes, chat
//! messages, configuration, and the common error type.

pub mod chat;
pub mod config;
pub mod docs;
pub mod error;
pub mod stream;
