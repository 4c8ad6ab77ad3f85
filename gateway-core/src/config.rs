//! # Gateway configuration
//!
//! A minimal, framework-agnostic configuration system based on a string
//! key/value store, in the same spirit as Feathers' `app.set()` / `app.get()`.
//! There is deliberately no TOML/JSON/YAML loader here — applications wire up
//! whichever file format they like and call [`GatewayConfig::set`]; the one
//! loader this crate does provide reads directly from the process
//! environment, which is how every key enumerated in the external interface
//! (provider API keys, blobstore credentials, rate limits) is expected to
//! arrive in production.
//!
//! ```rust
//! use gateway_core::config::GatewayConfig;
//!
//! let mut cfg = GatewayConfig::new();
//! cfg.set("default_queue_concurrency", "4");
//! assert_eq!(cfg.get("default_queue_concurrency"), Some("4"));
//! ```

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct GatewayConfig {
    values: HashMap<String, String>,
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Load every `{PREFIX}KEY` environment variable, lower-casing and
    /// stripping the prefix so that e.g. `GATEWAY_OPENAI_API_KEY` becomes
    /// `openai_api_key`.
    pub fn load_env(prefix: &str) -> Self {
        let mut cfg = Self::new();
        for (key, value) in std::env::vars() {
            if let Some(stripped) = key.strip_prefix(prefix) {
                cfg.set(stripped.to_lowercase(), value);
            }
        }
        cfg
    }

    pub fn snapshot(&self) -> GatewaySettings {
        GatewaySettings::from_map(&self.values)
    }
}

/// Typed, read-only view over a [`GatewayConfig`] with sensible defaults for
/// every tunable. Any key absent from the underlying store falls back to
/// the documented default.
#[derive(Debug, Clone, Default)]
pub struct GatewaySettings {
    raw: HashMap<String, String>,
}

impl GatewaySettings {
    fn from_map(map: &HashMap<String, String>) -> Self {
        Self { raw: map.clone() }
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw.get(key).cloned().unwrap_or_else(|| default.to_string())
    }

    fn usize(&self, key: &str, default: usize) -> usize {
        self.raw
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn u64(&self, key: &str, default: u64) -> u64 {
        self.raw
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        self.raw
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    pub fn provider_api_key(&self, provider: &str) -> Option<String> {
        self.raw.get(&format!("{provider}_api_key")).cloned()
    }

    pub fn blobstore_url(&self) -> String {
        self.string("blobstore_url", "")
    }

    pub fn blobstore_service_key(&self) -> String {
        self.string("blobstore_service_key", "")
    }

    pub fn bucket_name(&self) -> String {
        self.string("bucket_name", "generated-media")
    }

    pub fn broker_url(&self) -> String {
        self.string("redis_url", "redis://127.0.0.1:6379")
    }

    /// When true, every BlobStore path is prefixed with `test_outputs/`
    /// and staged inputs go under `test_inputs/{op_name}`.
    pub fn test_assets_mode(&self) -> bool {
        self.bool("test_assets_mode", false)
    }

    pub fn tripo_download_timeout(&self) -> Duration {
        Duration::from_secs(self.u64("tripo_download_timeout_seconds", 60))
    }

    pub fn default_queue_concurrency(&self) -> usize {
        self.usize("default_queue_concurrency", 2)
    }

    pub fn tripo_other_queue_concurrency(&self) -> usize {
        self.usize("tripo_other_queue_concurrency", 1)
    }

    pub fn tripo_refine_queue_concurrency(&self) -> usize {
        self.usize("tripo_refine_queue_concurrency", 1)
    }

    pub fn provider_requests_per_minute(&self, provider: &str) -> u32 {
        self.raw
            .get(&format!("bff_{provider}_requests_per_minute"))
            .and_then(|v| v.parse().ok())
            .unwrap_or(60)
    }

    pub fn openai_task_rate_limit(&self) -> u32 {
        self.raw
            .get("celery_openai_task_rate_limit")
            .and_then(|v| v.parse().ok())
            .unwrap_or(5)
    }

    pub fn http_timeout_short(&self) -> Duration {
        Duration::from_secs(30)
    }

    pub fn http_timeout_upload(&self) -> Duration {
        Duration::from_secs(60)
    }

    pub fn http_timeout_large_generation(&self) -> Duration {
        Duration::from_secs(120)
    }

    /// Per-kind total timeouts.
    pub fn total_timeout(&self, timeout_class: TimeoutClass) -> Duration {
        let (key, default_secs) = match timeout_class {
            TimeoutClass::Image => ("total_timeout_image_seconds", 180),
            TimeoutClass::TextOrImageToModel => ("total_timeout_model_seconds", 600),
            TimeoutClass::Multiview => ("total_timeout_multiview_seconds", 900),
        };
        Duration::from_secs(self.u64(key, default_secs))
    }

    pub fn flux_poll_interval(&self) -> Duration {
        Duration::from_secs(5)
    }

    pub fn tripo_poll_interval(&self) -> Duration {
        Duration::from_secs(1)
    }
}

/// Which total-timeout bucket a job falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    Image,
    TextOrImageToModel,
    Multiview,
}
