use serde::{Deserialize, Serialize};

use crate::turn::ToolDefinition;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_8080")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".into(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider variant: `"anthropic"` (live) or `"placeholder"`.
    #[serde(default = "d_provider")]
    pub provider: String,
    #[serde(default = "d_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_1024")]
    pub max_tokens: u32,
    /// Per-call wall-clock timeout.
    #[serde(default = "d_30u64")]
    pub timeout_secs: u64,
    /// Optional system prompt sent on every provider call.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: d_provider(),
            model: d_model(),
            api_key_env: d_api_key_env(),
            base_url: d_base_url(),
            max_tokens: 1024,
            timeout_secs: 30,
            system_prompt: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Speech chunking
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Delay between speech-partial chunks. 0 = no delay.
    #[serde(default)]
    pub partial_delay_ms: u64,
    #[serde(default = "d_30usize")]
    pub min_chunk: usize,
    #[serde(default = "d_80")]
    pub max_chunk: usize,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            partial_delay_ms: 0,
            min_chunk: 30,
            max_chunk: 80,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Protocol limits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum accepted frame size in bytes.
    #[serde(default = "d_65536")]
    pub max_event_bytes: usize,
    /// History upper bound (×2 for tool-use expansions).
    #[serde(default = "d_20")]
    pub max_turns: usize,
    /// Per-connection admissions per minute.
    #[serde(default = "d_30u32")]
    pub rate_limit_per_min: u32,
    /// TTL for pending tool calls.
    #[serde(default = "d_300")]
    pub pending_ttl_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_event_bytes: 65_536,
            max_turns: 20,
            rate_limit_per_min: 30,
            pending_ttl_secs: 300,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool catalog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    /// Domain tools advertised to the LLM. The client executes them; the
    /// conductor only forwards names and arguments.
    #[serde(default)]
    pub catalog: Vec<ToolDefinition>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Env overrides & validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Config {
    /// Apply environment-variable overrides on top of the loaded file.
    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = env_parse::<u16>("VOX_PORT") {
            self.server.port = port;
        }
        if let Ok(provider) = std::env::var("MODEL_PROVIDER") {
            if !provider.is_empty() {
                self.llm.provider = provider;
            }
        }
        if let Some(bytes) = env_parse::<usize>("MAX_EVENT_BYTES") {
            self.limits.max_event_bytes = bytes;
        }
        if let Some(turns) = env_parse::<usize>("MAX_TURNS") {
            self.limits.max_turns = turns;
        }
        if let Some(n) = env_parse::<u32>("SESSION_RATE_LIMIT_PER_MIN") {
            self.limits.rate_limit_per_min = n;
        }
    }

    /// Check the resolved configuration for problems.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if !matches!(self.llm.provider.as_str(), "anthropic" | "placeholder") {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: format!("unknown llm.provider {:?}", self.llm.provider),
            });
        }
        if self.llm.provider == "anthropic" && std::env::var(&self.llm.api_key_env).is_err() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: format!(
                    "llm.api_key_env {:?} is not set; anthropic calls will fail",
                    self.llm.api_key_env
                ),
            });
        }
        if self.speech.min_chunk == 0 || self.speech.max_chunk < self.speech.min_chunk {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: format!(
                    "speech chunk bounds invalid: min={} max={}",
                    self.speech.min_chunk, self.speech.max_chunk
                ),
            });
        }
        if self.limits.max_turns == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "limits.max_turns must be at least 1".into(),
            });
        }
        if self.limits.rate_limit_per_min == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "limits.rate_limit_per_min is 0; every frame will be refused".into(),
            });
        }

        issues
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable env override");
            None
        }
    }
}

// ── serde default helpers ──────────────────────────────────────────

fn d_8080() -> u16 {
    8080
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_provider() -> String {
    "anthropic".into()
}
fn d_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn d_api_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}
fn d_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn d_1024() -> u32 {
    1024
}
fn d_30u64() -> u64 {
    30
}
fn d_30usize() -> usize {
    30
}
fn d_30u32() -> u32 {
    30
}
fn d_80() -> usize {
    80
}
fn d_65536() -> usize {
    65_536
}
fn d_20() -> usize {
    20
}
fn d_300() -> u64 {
    300
}
