//! Background worker that drains the prompt queue into streamed model
//! responses. The poller claims work; the orchestrator runs one claimed
//! prompt end to end.

pub mod orchestrate;
pub mod poller;
pub mod sanitize;
pub mod state;
pub mod user_lock;
