//! Configuration for the UrbanLens gateway layer.
//!
//! Maps directly to `urbanlens.toml`. Every field has a default, so an
//! empty file is a valid configuration; API keys are usually supplied via
//! the environment (see [`LensConfig::with_env_overrides`]).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LensError, Result};

/// Per-call timeout when neither the provider nor `[http]` sets one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LensConfig {
    /// Logging settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Shared HTTP defaults and the caller-side retry policy.
    #[serde(default)]
    pub http: HttpConfig,
    /// Geocoding cache storage.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Google geocoding upstream.
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    /// News upstream.
    #[serde(default)]
    pub news: NewsConfig,
    /// data.ct.gov real-estate sales upstream.
    #[serde(default)]
    pub real_estate: RealEstateConfig,
    /// National Park Service upstream.
    #[serde(default)]
    pub parks: ParksConfig,
    /// LLM provider family.
    #[serde(default)]
    pub llm: LlmConfig,
}

impl LensConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `LensError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| LensError::Config(e.to_string()))?;
        Ok(config.with_inherited_timeouts())
    }

    /// Give every provider without its own timeout `http.default_timeout_secs`.
    #[must_use]
    pub fn with_inherited_timeouts(mut self) -> Self {
        let fallback = Some(self.http.default_timeout_secs);
        for timeout in [
            &mut self.geocoding.timeout_secs,
            &mut self.news.timeout_secs,
            &mut self.real_estate.timeout_secs,
            &mut self.parks.timeout_secs,
            &mut self.llm.local.timeout_secs,
            &mut self.llm.edge.timeout_secs,
            &mut self.llm.hosted.timeout_secs,
        ] {
            if timeout.is_none() {
                *timeout = fallback;
            }
        }
        self
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Overlay secrets and paths from `URBANLENS_*` environment variables.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup. Empty values are ignored.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("URBANLENS_LOG_LEVEL") {
            self.general.log_level = v;
        }
        if let Some(v) = get("URBANLENS_CACHE_DB") {
            self.cache.db_path = v;
        }
        if let Some(v) = get("URBANLENS_GOOGLE_MAPS_API_KEY") {
            self.geocoding.api_key = Some(v);
        }
        if let Some(v) = get("URBANLENS_NEWS_API_KEY") {
            self.news.api_key = Some(v);
        }
        if let Some(v) = get("URBANLENS_NPS_API_KEY") {
            self.parks.api_key = Some(v);
        }
        if let Some(v) = get("URBANLENS_OLLAMA_URL") {
            self.llm.local.base_url = v;
        }
        if let Some(v) = get("URBANLENS_CLOUDFLARE_AI_ENDPOINT") {
            self.llm.edge.api_url = Some(v);
        }
        if let Some(v) = get("URBANLENS_CLOUDFLARE_AI_API_KEY") {
            self.llm.edge.api_key = Some(v);
        }
        if let Some(v) = get("URBANLENS_OPENAI_API_KEY") {
            self.llm.hosted.api_key = Some(v);
        }
        self
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns `LensError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(LensError::Config(msg.to_string()));

        if self.cache.max_raw_response_chars == 0 {
            return fail("cache.max_raw_response_chars must be greater than 0");
        }
        if self.http.retry.max_attempts == 0 {
            return fail("http.retry.max_attempts must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.http.retry.jitter) {
            return fail("http.retry.jitter must be between 0.0 and 1.0");
        }
        if self.llm.max_tokens <= self.llm.shortest_message {
            return fail("llm.max_tokens must exceed llm.shortest_message");
        }
        if self.llm.priority.is_empty() {
            return fail("llm.priority must name at least one provider");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level used when `RUST_LOG` is not set: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

/// Shared HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Timeout used by gateways that do not set their own.
    #[serde(default = "default_60")]
    pub default_timeout_secs: u64,
    /// Caller-side retry policy for `Network` failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_3")]
    pub max_attempts: u32,
    /// Delay before the second attempt.
    #[serde(default = "default_500")]
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay.
    #[serde(default = "default_8000")]
    pub max_backoff_ms: u64,
    /// Random spread applied to each delay, as a fraction (0.0–1.0).
    #[serde(default = "default_0_2")]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
            jitter: 0.2,
        }
    }
}

/// Geocoding cache storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// SQLite database path.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Use WAL journaling (concurrent readers while writing).
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// SQLite busy timeout.
    #[serde(default = "default_5000")]
    pub busy_timeout_ms: u64,
    /// Largest upstream payload the cache will keep.
    #[serde(default = "default_50000")]
    pub max_raw_response_chars: usize,
    /// Serialize concurrent misses for the same key so only one upstream
    /// call is made. Off by default: duplicate calls are tolerated.
    #[serde(default)]
    pub dedupe_in_flight: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            wal_mode: true,
            busy_timeout_ms: 5000,
            max_raw_response_chars: 50_000,
            dedupe_in_flight: false,
        }
    }
}

/// Google Geocoding API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    /// API key. Required to build the gateway.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Endpoint.
    #[serde(default = "default_geocode_url")]
    pub base_url: String,
    /// Per-call timeout. Unset inherits `http.default_timeout_secs`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl GeocodingConfig {
    /// Per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_geocode_url(),
            timeout_secs: None,
        }
    }
}

/// News API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    /// API key. Required to build the gateway.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Endpoint.
    #[serde(default = "default_news_url")]
    pub base_url: String,
    /// Per-call timeout. Unset inherits `http.default_timeout_secs`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl NewsConfig {
    /// Per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_news_url(),
            timeout_secs: None,
        }
    }
}

/// data.ct.gov real-estate sales dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealEstateConfig {
    /// Rows endpoint.
    #[serde(default = "default_real_estate_rows_url")]
    pub rows_url: String,
    /// Column dictionary endpoint.
    #[serde(default = "default_real_estate_columns_url")]
    pub columns_url: String,
    /// Per-call timeout. The rows export is large, so this defaults to
    /// its own generous value instead of inheriting the shared one.
    #[serde(default = "default_some_120")]
    pub timeout_secs: Option<u64>,
}

impl RealEstateConfig {
    /// Per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

impl Default for RealEstateConfig {
    fn default() -> Self {
        Self {
            rows_url: default_real_estate_rows_url(),
            columns_url: default_real_estate_columns_url(),
            timeout_secs: Some(120),
        }
    }
}

/// National Park Service API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParksConfig {
    /// API key. Required to build the gateway.
    #[serde(default)]
    pub api_key: Option<String>,
    /// API root.
    #[serde(default = "default_nps_url")]
    pub base_url: String,
    /// Per-call timeout. Unset inherits `http.default_timeout_secs`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ParksConfig {
    /// Per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

impl Default for ParksConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_nps_url(),
            timeout_secs: None,
        }
    }
}

/// One member of the LLM provider family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// Local model server (Ollama).
    #[serde(alias = "ollama")]
    Local,
    /// Edge inference (Cloudflare Workers AI).
    #[serde(alias = "cloudflare")]
    Edge,
    /// Hosted API (OpenAI-compatible).
    #[serde(alias = "openai")]
    Hosted,
}

/// LLM integration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Token budget shared by every provider.
    #[serde(default = "default_16000")]
    pub max_tokens: usize,
    /// Messages below this estimate are glue text and never dropped alone.
    #[serde(default = "default_50_usize")]
    pub shortest_message: usize,
    /// Fixed framing cost added per message when estimating a conversation.
    #[serde(default = "default_4_usize")]
    pub per_message_overhead: usize,
    /// Order in which providers are tried.
    #[serde(default = "default_priority")]
    pub priority: Vec<LlmBackend>,
    /// Ollama settings.
    #[serde(default)]
    pub local: LocalLlmConfig,
    /// Cloudflare Workers AI settings.
    #[serde(default)]
    pub edge: EdgeLlmConfig,
    /// OpenAI-compatible settings.
    #[serde(default)]
    pub hosted: HostedLlmConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            max_tokens: 16_000,
            shortest_message: 50,
            per_message_overhead: 4,
            priority: default_priority(),
            local: LocalLlmConfig::default(),
            edge: EdgeLlmConfig::default(),
            hosted: HostedLlmConfig::default(),
        }
    }
}

/// Ollama.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalLlmConfig {
    /// Server root.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// Model tag.
    #[serde(default = "default_local_model")]
    pub model: String,
    /// Per-call timeout. Unset inherits `http.default_timeout_secs`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl LocalLlmConfig {
    /// Request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

impl Default for LocalLlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            model: default_local_model(),
            timeout_secs: None,
        }
    }
}

/// Cloudflare Workers AI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeLlmConfig {
    /// Account-scoped `.../ai/run/` URL; the model name is appended.
    #[serde(default)]
    pub api_url: Option<String>,
    /// API token.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model path.
    #[serde(default = "default_edge_model")]
    pub model: String,
    /// Per-call timeout. Unset inherits `http.default_timeout_secs`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl EdgeLlmConfig {
    /// Request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

impl Default for EdgeLlmConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            model: default_edge_model(),
            timeout_secs: None,
        }
    }
}

/// OpenAI-compatible chat completions API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostedLlmConfig {
    /// API root (without `/v1`).
    #[serde(default = "default_openai_url")]
    pub base_url: String,
    /// API key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model name or alias.
    #[serde(default = "default_hosted_model")]
    pub model: String,
    /// Cap on generated tokens.
    #[serde(default = "default_1024")]
    pub max_completion_tokens: u32,
    /// Per-call timeout. Unset inherits `http.default_timeout_secs`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl HostedLlmConfig {
    /// Request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

impl Default for HostedLlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_url(),
            api_key: None,
            model: default_hosted_model(),
            max_completion_tokens: 1024,
            timeout_secs: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_db_path() -> String { "urbanlens_cache.db".to_string() }
fn default_geocode_url() -> String { "https://maps.googleapis.com/maps/api/geocode/json".to_string() }
fn default_news_url() -> String { "https://newsapi.org/v2/everything".to_string() }
fn default_real_estate_rows_url() -> String { "https://data.ct.gov/api/views/5mzw-sjtu/rows.json".to_string() }
fn default_real_estate_columns_url() -> String { "https://data.ct.gov/api/views/5mzw-sjtu/columns.json".to_string() }
fn default_nps_url() -> String { "https://developer.nps.gov/api/v1".to_string() }
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_local_model() -> String { "llama3.2".to_string() }
fn default_edge_model() -> String { "@cf/mistral/mistral-7b-instruct-v0.1".to_string() }
fn default_openai_url() -> String { "https://api.openai.com".to_string() }
fn default_hosted_model() -> String { "gpt-3.5-turbo".to_string() }
fn default_priority() -> Vec<LlmBackend> { vec![LlmBackend::Edge, LlmBackend::Local, LlmBackend::Hosted] }
fn default_0_2() -> f64 { 0.2 }
fn default_3() -> u32 { 3 }
fn default_4_usize() -> usize { 4 }
fn default_50_usize() -> usize { 50 }
fn default_60() -> u64 { 60 }
fn default_some_120() -> Option<u64> { Some(120) }
fn default_500() -> u64 { 500 }
fn default_1024() -> u32 { 1024 }
fn default_5000() -> u64 { 5000 }
fn default_8000() -> u64 { 8000 }
fn default_16000() -> usize { 16_000 }
fn default_50000() -> usize { 50_000 }
