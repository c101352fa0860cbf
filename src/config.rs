use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::app_dirs::AppDirs;

pub const DEFAULT_DURATION_SECS: u64 = 60;

/// Durations a test can be configured with
pub const ALLOWED_DURATIONS: [u64; 4] = [15, 30, 60, 120];

/// Anything outside [`ALLOWED_DURATIONS`] becomes the default
pub fn normalize_duration(secs: u64) -> u64 {
    if ALLOWED_DURATIONS.contains(&secs) {
        secs
    } else {
        warn!(secs, "unsupported test duration, using {DEFAULT_DURATION_SECS}s");
        DEFAULT_DURATION_SECS
    }
}

pub fn parse_duration(raw: &str) -> u64 {
    match raw.trim().parse::<u64>() {
        Ok(secs) => normalize_duration(secs),
        Err(_) => {
            warn!(raw, "unparseable test duration, using {DEFAULT_DURATION_SECS}s");
            DEFAULT_DURATION_SECS
        }
    }
}

/// The allowed duration after `secs`, wrapping around
pub fn next_duration(secs: u64) -> u64 {
    match ALLOWED_DURATIONS.iter().position(|d| *d == secs) {
        Some(idx) => ALLOWED_DURATIONS[(idx + 1) % ALLOWED_DURATIONS.len()],
        None => DEFAULT_DURATION_SECS,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub duration_secs: u64,
    /// Replaces the builtin paragraphs when non-empty
    pub passages: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            duration_secs: DEFAULT_DURATION_SECS,
            passages: Vec::new(),
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
}

/// Read-only JSON config file
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("typetest_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        let Ok(bytes) = fs::read(&self.path) else {
            return Config::default();
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(mut cfg) => {
                cfg.duration_secs = normalize_duration(cfg.duration_secs);
                cfg
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "ignoring malformed config");
                Config::default()
            }
        }
    }
}
