//! Generation engine backed by a local llama.cpp `llama-server`.
//!
//! Endpoints used:
//! - `POST /tokenize` for stop-phrase encoding
//! - `POST /apply-template` for chat-template rendering
//! - `POST /completion` with `stream: true, return_tokens: true` for the
//!   generation pass itself (SSE)
//!
//! The token ids returned alongside each streamed chunk feed the
//! [`StopTokenMatcher`]; on a match the stream is terminated before the
//! matched fragment is surfaced, which also drops the HTTP connection and
//! halts generation server-side.

use serde::{Deserialize, Serialize};

use genie_domain::chat::Message;
use genie_domain::config::EngineConfig;
use genie_domain::error::{Error, Result};
use genie_domain::stream::BoxStream;

use crate::sse::drain_data_lines;
use crate::traits::{GenerationEngine, GenerationParams, TemplateOptions};

pub struct LlamaServerEngine {
    base_url: String,
    http: reqwest::Client,
}

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct TokenizeRequest<'a> {
    content: &'a str,
}

#[derive(Deserialize)]
struct TokenizeResponse {
    tokens: Vec<u32>,
}

#[derive(Serialize)]
struct TemplateRequest<'a> {
    messages: &'a [Message],
    chat_template_kwargs: TemplateKwargs,
}

#[derive(Serialize)]
struct TemplateKwargs {
    enable_thinking: bool,
}

#[derive(Deserialize)]
struct TemplateResponse {
    prompt: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    temperature: f32,
    stream: bool,
    return_tokens: bool,
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tokens: Vec<u32>,
    /// Set on the final chunk when the server hit its own stop condition
    /// or the token limit.
    #[serde(default)]
    stop: bool,
}

// ── Engine ─────────────────────────────────────────────────────────

impl LlamaServerEngine {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Engine(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            http,
        })
    }

    /// Probe the backend. Called once at startup: a backend with no model
    /// loaded is fatal for the process.
    pub async fn health(&self) -> Result<()> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Error::Engine(format!(
                "backend unhealthy: HTTP {}",
                resp.status().as_u16()
            )));
        }
        Ok(())
    }

    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Engine(format!(
                "{path}: HTTP {} - {body}",
                status.as_u16()
            )));
        }
        Ok(resp)
    }
}

#[async_trait::async_trait]
impl GenerationEngine for LlamaServerEngine {
    async fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let resp = self
            .post_json("/tokenize", &TokenizeRequest { content: text })
            .await?;
        let parsed: TokenizeResponse = resp
            .json()
            .await
            .map_err(|e| Error::Engine(e.to_string()))?;
        Ok(parsed.tokens)
    }

    async fn apply_template(
        &self,
        messages: &[Message],
        options: &TemplateOptions,
    ) -> Result<String> {
        let body = TemplateRequest {
            messages,
            chat_template_kwargs: TemplateKwargs {
                enable_thinking: options.enable_thinking,
            },
        };
        let resp = self
            .post_json("/apply-template", &body)
            .await
            .map_err(|e| Error::Template(e.to_string()))?;
        let parsed: TemplateResponse = resp
            .json()
            .await
            .map_err(|e| Error::Template(e.to_string()))?;
        Ok(parsed.prompt)
    }

    async fn generate(
        &self,
        input: String,
        params: GenerationParams,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let body = CompletionRequest {
            prompt: &input,
            n_predict: params.max_tokens,
            // Greedy decoding is temperature zero on this backend.
            temperature: if params.sample { params.temperature } else { 0.0 },
            stream: true,
            return_tokens: true,
        };

        tracing::debug!(prompt_chars = input.len(), "completion stream request");
        let response = self.post_json("/completion", &body).await?;
        let stop = params.stop;

        let stream = async_stream::stream! {
            let mut response = response;
            let mut buffer = String::new();
            // All token ids produced so far, for the suffix matcher.
            let mut produced: Vec<u32> = Vec::new();

            'read: loop {
                match response.chunk().await {
                    Ok(Some(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));

                        for data in drain_data_lines(&mut buffer) {
                            let chunk: CompletionChunk = match serde_json::from_str(&data) {
                                Ok(chunk) => chunk,
                                Err(e) => {
                                    yield Err(Error::Engine(format!(
                                        "malformed completion chunk: {e}"
                                    )));
                                    break 'read;
                                }
                            };

                            if let Some(matcher) = &stop {
                                produced.extend_from_slice(&chunk.tokens);
                                if matcher.matches(&produced) {
                                    // Halt without surfacing the matched tail.
                                    break 'read;
                                }
                            }

                            if !chunk.content.is_empty() {
                                yield Ok(chunk.content);
                            }
                            if chunk.stop {
                                break 'read;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(Error::Http(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
