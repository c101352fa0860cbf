use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::app_dirs::AppDirs;

/// Route `tracing` output to the log file in the state dir.
///
/// The terminal belongs to the UI, so nothing is written to stdout or stderr.
/// Returns false when the file cannot be opened; logging is then disabled.
pub fn init() -> bool {
    match AppDirs::log_path() {
        Some(path) => init_with_path(&path),
        None => false,
    }
}

pub fn init_with_path(path: &Path) -> bool {
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return false;
        }
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(path) else {
        return false;
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .is_ok()
}
