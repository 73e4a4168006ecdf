//! Document-store adapters: the intake/sink/history traits the worker runs
//! against, plus their MongoDB implementations.

pub mod mongo;
pub mod traits;

pub use mongo::MongoStores;
pub use traits::{HistoryStore, PromptIntake, ResponseSink};
