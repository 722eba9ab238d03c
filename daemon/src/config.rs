//! Configuration loading and management

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::adapter::SessionOptions;
use crate::engine::EngineConfig;
use crate::error::ConfigError;
use crate::telemetry::LogFormat;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// BCP-47 tag handed to the recognizer
    pub language_tag: String,

    pub max_retries: u32,
    pub restart_delay_ms: u64,
    pub auto_restart: bool,

    pub min_utterance_ms: u64,
    pub complete_silence_ms: u64,
    pub possibly_complete_silence_ms: u64,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = match lookup("VOICECMD_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = lookup("HOME").ok_or(ConfigError::MissingHome)?;
                PathBuf::from(home)
                    .join(".local")
                    .join("share")
                    .join("voicecmd")
            }
        };

        let socket_path = lookup("VOICECMD_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let defaults = SessionOptions::default();

        Ok(Self {
            socket_path,
            data_dir,
            language_tag: lookup("VOICECMD_LANGUAGE").unwrap_or_else(|| "en-US".to_string()),
            max_retries: parse_or(&lookup, "VOICECMD_MAX_RETRIES", 3)?,
            restart_delay_ms: parse_or(&lookup, "VOICECMD_RESTART_DELAY_MS", 1500)?,
            auto_restart: parse_bool_or(&lookup, "VOICECMD_AUTO_RESTART", true)?,
            min_utterance_ms: parse_or(
                &lookup,
                "VOICECMD_MIN_UTTERANCE_MS",
                defaults.min_utterance_ms,
            )?,
            complete_silence_ms: parse_or(
                &lookup,
                "VOICECMD_COMPLETE_SILENCE_MS",
                defaults.complete_silence_ms,
            )?,
            possibly_complete_silence_ms: parse_or(
                &lookup,
                "VOICECMD_POSSIBLY_COMPLETE_SILENCE_MS",
                defaults.possibly_complete_silence_ms,
            )?,
            log_format: parse_or(&lookup, "VOICECMD_LOG_FORMAT", LogFormat::Pretty)?,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }

    /// The engine-facing subset
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            language_tag: self.language_tag.clone(),
            options: SessionOptions {
                partial_results: true,
                min_utterance_ms: self.min_utterance_ms,
                complete_silence_ms: self.complete_silence_ms,
                possibly_complete_silence_ms: self.possibly_complete_silence_ms,
            },
            max_retries: self.max_retries,
            restart_delay: Duration::from_millis(self.restart_delay_ms),
            auto_restart: self.auto_restart,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(default),
    }
}

fn parse_bool_or<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue { key, value: raw }),
        },
        None => Ok(default),
    }
}
