use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

// ── Document store connection ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// MongoDB connection string.
    #[serde(default = "default_store_uri")]
    pub uri: String,

    /// Database holding the `prompts`, `responses`, and `chathistories`
    /// collections.
    #[serde(default = "default_database")]
    pub database: String,
}

// ── Generation backend ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the llama-server instance.
    #[serde(default = "default_engine_url")]
    pub base_url: String,

    /// Request timeout in seconds. Covers the full streamed generation,
    /// so it is deliberately long.
    #[serde(default = "default_engine_timeout_secs")]
    pub timeout_secs: u64,
}

// ── Sampling parameters ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Hard cap on generated tokens per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// When false, decode greedily instead of sampling.
    #[serde(default = "default_sample")]
    pub sample: bool,

    /// Phrases that end generation early: the end-of-turn marker and the
    /// role-switch marker. Matched both as token suffixes inside the engine
    /// and as substrings on decoded fragments.
    #[serde(default = "default_stop_words")]
    pub stop_words: Vec<String>,
}

// ── Worker behavior ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Delay between intake poll iterations. This is the sole backpressure
    /// on intake and bounds pickup latency.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay between fragment writes, to bound store write rate.
    #[serde(default = "default_write_throttle_ms")]
    pub write_throttle_ms: u64,

    /// Rolling history cap per user (turns kept after each update).
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Prior turns included in the generation context.
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,

    /// Maximum concurrent generation runs. `0` means unbounded, matching a
    /// one-task-per-prompt dispatch model.
    #[serde(default)]
    pub max_in_flight: usize,

    /// When set, claims older than this many seconds without completion are
    /// swept back to the queue each poll iteration. Unset leaves failed runs
    /// parked in the claimed state.
    #[serde(default)]
    pub reclaim_after_secs: Option<u64>,

    /// The fixed system instruction prepended to every context.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

// ── Defaults ───────────────────────────────────────────────────────

fn default_store_uri() -> String {
    "mongodb://127.0.0.1:27017".into()
}
fn default_database() -> String {
    "startup-genie".into()
}
fn default_engine_url() -> String {
    "http://127.0.0.1:8080".into()
}
fn default_engine_timeout_secs() -> u64 {
    600
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}
fn default_sample() -> bool {
    true
}
fn default_stop_words() -> Vec<String> {
    vec!["<|im_end|>".into(), "<|user|>".into()]
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_write_throttle_ms() -> u64 {
    10
}
fn default_history_window() -> usize {
    10
}
fn default_context_turns() -> usize {
    4
}
fn default_system_prompt() -> String {
    "You are a professional business AI assistant that responds to two types \
of requests: business plan generation and mentorship guidance. Your primary \
goal is to provide valuable, actionable business advice.

Always prioritize the specific formatting instructions included in each user \
request. The requests will contain detailed templates that you should follow \
precisely.

For business plans, ensure all financial projections are realistic and \
well-reasoned. Include exact numbers with proper formatting for metrics.

For mentorship, provide practical, actionable advice that addresses the \
specific business challenges presented.

Maintain a professional tone, be concise, and focus on delivering maximum \
value with each response.
"
    .into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
            generation: GenerationConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: default_store_uri(),
            database: default_database(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_engine_url(),
            timeout_secs: default_engine_timeout_secs(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            sample: default_sample(),
            stop_words: default_stop_words(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            write_throttle_ms: default_write_throttle_ms(),
            history_window: default_history_window(),
            context_turns: default_context_turns(),
            max_in_flight: 0,
            reclaim_after_secs: None,
            system_prompt: default_system_prompt(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing keys.
    pub fn load(path: &str) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from file if it exists and parses, otherwise return defaults.
    pub fn load_or_default(path: &str) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path, error = %e, "config not loaded, using defaults");
                Self::default()
            }
        }
    }
}
