//! Reading dictionary: surface text -> replacement reading.

use std::collections::HashMap;
use std::collections::hash_map;

use serde::{Deserialize, Serialize};

/// A word -> reading mapping owned by a guild (or the global dictionary).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dictionary(HashMap<String, String>);

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, word: &str) -> Option<&str> {
        self.0.get(word).map(String::as_str)
    }

    /// Insert or replace a reading. Returns the previous reading.
    pub fn insert(&mut self, word: impl Into<String>, reading: impl Into<String>) -> Option<String> {
        self.0.insert(word.into(), reading.into())
    }

    pub fn remove(&mut self, word: &str) -> Option<String> {
        self.0.remove(word)
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, String> {
        self.0.iter()
    }
}

impl From<HashMap<String, String>> for Dictionary {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl<W: Into<String>, R: Into<String>> FromIterator<(W, R)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (W, R)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(word, reading)| (word.into(), reading.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Dictionary {
    type Item = (&'a String, &'a String);
    type IntoIter = hash_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
