use include_dir::{include_dir, Dir};
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::error::Error;

static PASSAGE_DIR: Dir = include_dir!("src/passages");

#[derive(Deserialize, Clone, Debug)]
struct PassageFile {
    #[allow(dead_code)]
    name: String,
    passages: Vec<String>,
}

/// Pool of reference paragraphs a test draws from. Never empty.
#[derive(Clone, Debug, PartialEq)]
pub struct PassagePool {
    passages: Vec<String>,
}

impl PassagePool {
    /// The paragraphs shipped with the binary
    pub fn builtin() -> Self {
        let file = read_passages_from_file("english.json").expect("embedded passage file is valid");
        Self {
            passages: file.passages,
        }
    }

    /// Blank entries are dropped; an empty result falls back to the builtin pool
    pub fn new(passages: Vec<String>) -> Self {
        let passages: Vec<String> = passages
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect();

        if passages.is_empty() {
            Self::builtin()
        } else {
            Self { passages }
        }
    }

    pub fn single(text: impl Into<String>) -> Self {
        Self::new(vec![text.into()])
    }

    /// Uniformly random paragraph
    pub fn pick(&self) -> String {
        self.passages
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.passages.iter().any(|p| p == text)
    }
}

impl Default for PassagePool {
    fn default() -> Self {
        Self::builtin()
    }
}

fn read_passages_from_file(file_name: &str) -> Result<PassageFile, Box<dyn Error>> {
    let file = PASSAGE_DIR
        .get_file(file_name)
        .ok_or_else(|| format!("passage file {file_name} not found"))?;
    let contents = file
        .contents_utf8()
        .ok_or("passage file is not valid utf-8")?;

    Ok(serde_json::from_str(contents)?)
}
