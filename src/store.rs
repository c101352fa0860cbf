use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;

/// Key the best WPM is stored under
pub const BEST_WPM_KEY: &str = "best_wpm";

/// Durable key-value storage for small numeric values
pub trait ScoreStore {
    /// `None` when nothing is stored or the stored value is unreadable
    fn read(&self, key: &str) -> Option<u32>;
    fn write(&mut self, key: &str, value: u32) -> io::Result<()>;
}

/// JSON object on disk, one number per key
#[derive(Debug, Clone)]
pub struct FileScoreStore {
    path: PathBuf,
}

impl FileScoreStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::best_score_path().unwrap_or_else(|| PathBuf::from("typetest_best.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_map(&self) -> Map<String, Value> {
        fs::read(&self.path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Map<String, Value>>(&bytes).ok())
            .unwrap_or_default()
    }
}

impl Default for FileScoreStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreStore for FileScoreStore {
    fn read(&self, key: &str) -> Option<u32> {
        self.load_map()
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }

    fn write(&mut self, key: &str, value: u32) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // keep any other keys already in the file
        let mut map = self.load_map();
        map.insert(key.to_string(), Value::from(value));
        let data = serde_json::to_vec_pretty(&map).map_err(io::Error::other)?;
        fs::write(&self.path, data)
    }
}

/// In-process store, used by tests and when no state dir is available
#[derive(Debug, Clone, Default)]
pub struct MemoryScoreStore {
    values: HashMap<String, u32>,
    writes: usize,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: u32) -> Self {
        let mut values = HashMap::new();
        values.insert(key.to_string(), value);
        Self { values, writes: 0 }
    }

    /// Number of successful writes so far
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl ScoreStore for MemoryScoreStore {
    fn read(&self, key: &str) -> Option<u32> {
        self.values.get(key).copied()
    }

    fn write(&mut self, key: &str, value: u32) -> io::Result<()> {
        self.values.insert(key.to_string(), value);
        self.writes += 1;
        Ok(())
    }
}
