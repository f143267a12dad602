//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Every section is `#[serde(default)]`, so a settings file only needs the
//! keys it wants to change.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AppPaths;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Reasons a loaded configuration is unusable.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY is not set (settings.toml `api.api_key` or environment)")]
    MissingApiKey,

    #[error("API key has an invalid format (expected an `sk-` prefix)")]
    InvalidApiKey,

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

// ---------------------------------------------------------------------------
// ApiConfig
// ---------------------------------------------------------------------------

/// Connection settings for the realtime endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Bearer token.  Usually supplied through `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    /// Realtime model identifier appended to the URL as `?model=`.
    pub model: String,
    /// WebSocket endpoint without query string.
    pub base_url: String,
    /// Seconds to wait for the WebSocket handshake.
    pub connect_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o-realtime-preview-2024-10-01".into(),
            base_url: "wss://api.openai.com/v1/realtime".into(),
            connect_timeout_secs: 10,
        }
    }
}

impl ApiConfig {
    /// Full WebSocket URL including the model query parameter.
    ///
    /// A base URL with no path gets `/` so the request target stays valid.
    pub fn realtime_url(&self) -> String {
        let base = self.base_url.as_str();
        let has_path = base
            .split_once("://")
            .map_or(base, |(_, rest)| rest)
            .contains('/');
        let sep = if has_path { "" } else { "/" };
        format!("{base}{sep}?model={}", self.model)
    }
}

// ---------------------------------------------------------------------------
// TranslationConfig
// ---------------------------------------------------------------------------

/// Translation direction and the system prompt sent with `session.update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Spoken language (ISO-639-1).
    pub source_language: String,
    /// Output language (ISO-639-1).
    pub target_language: String,
    /// Replaces the generated translator prompt when set.
    pub instructions: Option<String>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            source_language: "zh".into(),
            target_language: "en".into(),
            instructions: None,
        }
    }
}

impl TranslationConfig {
    /// System instructions for the remote model.
    pub fn instructions(&self) -> String {
        if let Some(custom) = self.instructions.as_ref().filter(|s| !s.trim().is_empty()) {
            return custom.clone();
        }
        format!(
            "You are a real-time translator.\n\
             - Translate from {} to {}\n\
             - Only provide the translation, no explanations\n\
             - Be natural and preserve the tone\n",
            self.source_language, self.target_language
        )
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Microphone capture and upload settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Upload sample rate in Hz.  The `pcm16` realtime format expects 24 000.
    pub sample_rate: u32,
    /// Frames per uploaded chunk.
    pub chunk_size: usize,
    /// Uploaded channel count (mono).
    pub channels: u16,
    /// Sleep between polls of an empty audio source.
    pub poll_interval_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            chunk_size: 1024,
            channels: 1,
            poll_interval_ms: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// VadConfig
// ---------------------------------------------------------------------------

/// Server-side voice-activity detection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Activation threshold (0.0 – 1.0).
    pub threshold: f32,
    /// Silence that ends an utterance.
    pub silence_duration_ms: u32,
    /// Audio retained before detected speech onset.
    pub prefix_padding_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            silence_duration_ms: 1000,
            prefix_padding_ms: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Task correlation and trigger scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Force a commit when no utterance boundary was seen for this long.
    pub force_commit_interval_secs: u64,
    /// Number of most recent tasks kept in memory.
    pub task_cap: usize,
    /// How long a translation waits for its late transcript.
    pub source_wait_ms: u64,
    /// Correlation bindings older than this many task ids are pruned.
    pub binding_retention_tasks: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            force_commit_interval_secs: 8,
            task_cap: 10,
            source_wait_ms: 1000,
            binding_retention_tasks: 100,
        }
    }
}

impl SessionConfig {
    pub fn force_commit_interval(&self) -> Duration {
        Duration::from_secs(self.force_commit_interval_secs)
    }

    pub fn source_wait(&self) -> Duration {
        Duration::from_millis(self.source_wait_ms)
    }
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// Terminal display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Completed results kept in the on-screen history.
    pub history_len: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { history_len: 20 }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use realtime_translator::config::AppConfig;
///
/// let config = AppConfig::load().unwrap().with_env_overrides();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub translation: TranslationConfig,
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub session: SessionConfig,
    pub ui: UiConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Empty values are skipped; numeric values that fail to parse are
    /// logged and skipped.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENAI_API_KEY") {
            self.api.api_key = Some(key);
        }
        if let Some(model) = get("REALTIME_MODEL") {
            self.api.model = model;
        }
        if let Some(lang) = get("SOURCE_LANGUAGE") {
            self.translation.source_language = lang;
        }
        if let Some(lang) = get("TARGET_LANGUAGE") {
            self.translation.target_language = lang;
        }
        if let Some(v) = parse_var(&get, "SAMPLE_RATE") {
            self.audio.sample_rate = v;
        }
        if let Some(v) = parse_var(&get, "CHUNK_SIZE") {
            self.audio.chunk_size = v;
        }
        if let Some(v) = parse_var(&get, "VAD_THRESHOLD") {
            self.vad.threshold = v;
        }
        if let Some(v) = parse_var(&get, "SILENCE_DURATION_MS") {
            self.vad.silence_duration_ms = v;
        }
        if let Some(v) = parse_var(&get, "FORCE_COMMIT_INTERVAL_SECS") {
            self.session.force_commit_interval_secs = v;
        }
        self
    }

    /// Check that the configuration can drive a session.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let key = self
            .api
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        if !key.starts_with("sk-") {
            return Err(ConfigError::InvalidApiKey);
        }

        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if self.audio.chunk_size == 0 {
            return Err(invalid("audio.chunk_size", "must be positive"));
        }
        if self.audio.channels != 1 {
            return Err(invalid("audio.channels", "uploaded audio must be mono"));
        }
        if !(0.0..=1.0).contains(&self.vad.threshold) {
            return Err(invalid(
                "vad.threshold",
                format!("{} is outside 0.0 – 1.0", self.vad.threshold),
            ));
        }
        if self.session.task_cap == 0 {
            return Err(invalid("session.task_cap", "must be at least 1"));
        }
        if self.session.binding_retention_tasks < self.session.task_cap as u64 {
            return Err(invalid(
                "session.binding_retention_tasks",
                format!(
                    "{} is below session.task_cap ({})",
                    self.session.binding_retention_tasks, self.session.task_cap
                ),
            ));
        }
        if self.session.force_commit_interval_secs == 0 {
            return Err(invalid(
                "session.force_commit_interval_secs",
                "must be positive",
            ));
        }
        Ok(())
    }
}

fn invalid(key: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        message: message.into(),
    }
}

fn parse_var<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = get(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring {key}={raw:?}: not a valid number");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn valid_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.api.api_key = Some("sk-test".into());
        cfg
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert!(cfg.api.api_key.is_none());
        assert_eq!(
            cfg.api.realtime_url(),
            "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview-2024-10-01"
        );
        assert_eq!(cfg.translation.source_language, "zh");
        assert_eq!(cfg.translation.target_language, "en");
        assert_eq!(cfg.audio.sample_rate, 24_000);
        assert_eq!(cfg.audio.chunk_size, 1024);
        assert_eq!(cfg.audio.channels, 1);
        assert_eq!(cfg.vad.silence_duration_ms, 1000);
        assert_eq!(cfg.vad.prefix_padding_ms, 300);
        assert_eq!(cfg.session.force_commit_interval(), Duration::from_secs(8));
        assert_eq!(cfg.session.task_cap, 10);
        assert_eq!(cfg.session.source_wait(), Duration::from_millis(1000));
        assert_eq!(cfg.ui.history_len, 20);
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("settings.toml");

        let mut cfg = valid_config();
        cfg.translation.source_language = "ja".into();
        cfg.session.task_cap = 4;
        cfg.vad.threshold = 0.7;

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.api.api_key.as_deref(), Some("sk-test"));
        assert_eq!(loaded.translation.source_language, "ja");
        assert_eq!(loaded.session.task_cap, 4);
        assert!((loaded.vad.threshold - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.audio.sample_rate, 24_000);
        assert_eq!(config.session.task_cap, 10);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[session]\ntask_cap = 3\n").expect("write");

        let config = AppConfig::load_from(&path).expect("load");
        assert_eq!(config.session.task_cap, 3);
        assert_eq!(config.session.force_commit_interval_secs, 8);
        assert_eq!(config.translation.target_language, "en");
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[session\ntask_cap = ").expect("write");

        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-env"),
            ("SOURCE_LANGUAGE", "fr"),
            ("SAMPLE_RATE", "16000"),
            ("VAD_THRESHOLD", "0.3"),
            ("FORCE_COMMIT_INTERVAL_SECS", "5"),
        ]
        .into_iter()
        .collect();

        let cfg = AppConfig::default()
            .with_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.api.api_key.as_deref(), Some("sk-env"));
        assert_eq!(cfg.translation.source_language, "fr");
        assert_eq!(cfg.audio.sample_rate, 16_000);
        assert!((cfg.vad.threshold - 0.3).abs() < f32::EPSILON);
        assert_eq!(cfg.session.force_commit_interval_secs, 5);
    }

    #[test]
    fn unparseable_env_number_is_ignored() {
        let cfg = AppConfig::default().with_overrides_from(|k| match k {
            "CHUNK_SIZE" => Some("lots".into()),
            "REALTIME_MODEL" => Some("   ".into()),
            _ => None,
        });
        assert_eq!(cfg.audio.chunk_size, 1024);
        assert_eq!(cfg.api.model, "gpt-4o-realtime-preview-2024-10-01");
    }

    #[test]
    fn validate_requires_api_key() {
        assert_eq!(
            AppConfig::default().validate(),
            Err(ConfigError::MissingApiKey)
        );

        let mut cfg = AppConfig::default();
        cfg.api.api_key = Some("pk-nope".into());
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidApiKey));

        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_numbers() {
        let mut cfg = valid_config();
        cfg.session.task_cap = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { key: "session.task_cap", .. })
        ));

        let mut cfg = valid_config();
        cfg.vad.threshold = 1.5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { key: "vad.threshold", .. })
        ));

        let mut cfg = valid_config();
        cfg.audio.channels = 2;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { key: "audio.channels", .. })
        ));

        let mut cfg = valid_config();
        cfg.session.binding_retention_tasks = 2;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue {
                key: "session.binding_retention_tasks",
                ..
            })
        ));
        cfg.session.binding_retention_tasks = cfg.session.task_cap as u64;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn realtime_url_without_path_gets_root() {
        let mut api = ApiConfig {
            base_url: "ws://127.0.0.1:9000".into(),
            model: "m1".into(),
            ..ApiConfig::default()
        };
        assert_eq!(api.realtime_url(), "ws://127.0.0.1:9000/?model=m1");

        api.base_url = "ws://127.0.0.1:9000/v1/realtime".into();
        assert_eq!(api.realtime_url(), "ws://127.0.0.1:9000/v1/realtime?model=m1");
    }

    #[test]
    fn instructions_mention_both_languages() {
        let cfg = TranslationConfig::default();
        let text = cfg.instructions();
        assert!(text.contains("from zh to en"));

        let custom = TranslationConfig {
            instructions: Some("Translate politely.".into()),
            ..TranslationConfig::default()
        };
        assert_eq!(custom.instructions(), "Translate politely.");
    }
}
