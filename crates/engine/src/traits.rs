use genie_domain::chat::Message;
use genie_domain::error::Result;
use genie_domain::stream::BoxStream;

use crate::stop::StopTokenMatcher;

/// Options for chat-template rendering.
#[derive(Debug, Clone)]
pub struct TemplateOptions {
    /// Let the model open with a reasoning block before the answer. The
    /// worker always renders with this off.
    pub enable_thinking: bool,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self { enable_thinking: false }
    }
}

/// Sampling and stop parameters for one generation pass.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    /// When false, decode greedily.
    pub sample: bool,
    /// Token-suffix stop predicate, evaluated inside the engine after every
    /// produced token.
    pub stop: Option<StopTokenMatcher>,
}

/// An opaque causal-LM backend: render a message list into model-ready text,
/// then stream text fragments for it.
#[async_trait::async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Encode text into model token ids.
    async fn tokenize(&self, text: &str) -> Result<Vec<u32>>;

    /// Render role-tagged messages through the model's chat template, with
    /// the generation-continuation marker appended.
    async fn apply_template(&self, messages: &[Message], options: &TemplateOptions)
        -> Result<String>;

    /// Start a generation pass. The returned stream yields decoded text
    /// fragments as they are produced; a mid-stream backend failure surfaces
    /// as an `Err` item. When `params.stop` fires, the stream ends before
    /// the matched fragment is yielded.
    async fn generate(
        &self,
        input: String,
        params: GenerationParams,
    ) -> Result<BoxStream<'static, Result<String>>>;
}
