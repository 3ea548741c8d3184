//! Configuration module for Stream2Pod.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for the remote
//! services and playback, `AppPaths` for cross-platform data directories,
//! and TOML persistence via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, PlaybackConfig, ServiceConfig};
