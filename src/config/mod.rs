//! Configuration module for the realtime translator.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! `AppPaths` for cross-platform config directories, TOML persistence via
//! `AppConfig::load` / `AppConfig::save`, and environment-variable overrides.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    ApiConfig, AppConfig, AudioConfig, ConfigError, SessionConfig, TranslationConfig, UiConfig,
    VadConfig,
};
