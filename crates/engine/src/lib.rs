//! The generation-capability seam: the [`traits::GenerationEngine`] trait the
//! orchestrator drives, the token-level stop matcher, and the llama-server
//! HTTP adapter.

pub mod llama_server;
pub(crate) mod sse;
pub mod stop;
pub mod traits;

pub use llama_server::LlamaServerEngine;
pub use stop::StopTokenMatcher;
pub use traits::{GenerationEngine, GenerationParams, TemplateOptions};
