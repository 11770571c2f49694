//! Word dictionary loaded once at startup and read-only afterwards.

use std::{collections::BTreeMap, fs, path::Path};

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

/// Sample dictionary compiled into the binary.
const BUILTIN_WORDS: &str = include_str!("../../config/words.json");

/// One word and the definitions it can be presented with.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WordEntry {
    pub word: String,
    pub definitions: Vec<String>,
}

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("failed to read dictionary: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse dictionary: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("dictionary contains no usable words")]
    Empty,
}

/// Mapping from category to its ordered word entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordDictionary {
    categories: BTreeMap<String, Vec<WordEntry>>,
}

impl WordDictionary {
    /// Parse `{ "<category>": [{ "word": .., "definitions": [..] }] }`.
    ///
    /// Entries without a word or without definitions are dropped, as are
    /// categories left empty.
    pub fn from_json_str(contents: &str) -> Result<Self, DictionaryError> {
        let raw: BTreeMap<String, Vec<WordEntry>> = serde_json::from_str(contents)?;
        let categories = raw
            .into_iter()
            .filter_map(|(category, entries)| {
                let entries = entries
                    .into_iter()
                    .filter(|entry| {
                        !entry.word.trim().is_empty()
                            && entry.definitions.iter().any(|d| !d.trim().is_empty())
                    })
                    .map(|mut entry| {
                        entry.definitions.retain(|d| !d.trim().is_empty());
                        entry
                    })
                    .collect::<Vec<_>>();
                (!entries.is_empty()).then_some((category, entries))
            })
            .collect::<BTreeMap<_, _>>();

        if categories.is_empty() {
            return Err(DictionaryError::Empty);
        }
        Ok(Self { categories })
    }

    /// Read the dictionary at `path`, falling back to the built-in sample.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path)
            .map_err(DictionaryError::from)
            .and_then(|contents| Self::from_json_str(&contents))
        {
            Ok(dictionary) => {
                info!(
                    path = %path.display(),
                    categories = dictionary.categories.len(),
                    words = dictionary.word_count(),
                    "loaded word dictionary"
                );
                dictionary
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to load word dictionary; using built-in sample"
                );
                Self::builtin()
            }
        }
    }

    /// The sample dictionary shipped with the binary.
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_WORDS).unwrap_or_else(|err| {
            error!(error = %err, "built-in word dictionary is invalid");
            Self::default()
        })
    }

    pub fn words_by_category(&self) -> &BTreeMap<String, Vec<WordEntry>> {
        &self.categories
    }

    pub fn word_count(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }
}
