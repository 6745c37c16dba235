//! Token count vectorizer
//!
//! Lowercases the input, keeps tokens of two or more word characters and
//! maps each to a column of a sorted vocabulary learned at fit time.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{ModelError, Result};

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("static token pattern"))
}

/// Split text into lowercase tokens
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    token_pattern()
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Bag-of-words count vectorizer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountVectorizer {
    /// Token -> column index, columns ordered alphabetically
    vocabulary: BTreeMap<String, usize>,
}

impl CountVectorizer {
    /// Create an unfitted vectorizer
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn the vocabulary of a corpus
    pub fn fit<S: AsRef<str>>(&mut self, documents: &[S]) -> Result<()> {
        let mut tokens: BTreeMap<String, usize> = BTreeMap::new();
        for doc in documents {
            for token in tokenize(doc.as_ref()) {
                tokens.insert(token, 0);
            }
        }

        if tokens.is_empty() {
            return Err(ModelError::EmptyVocabulary);
        }

        for (index, column) in tokens.values_mut().enumerate() {
            *column = index;
        }
        self.vocabulary = tokens;
        Ok(())
    }

    /// Count vocabulary tokens per document; unseen tokens are ignored
    pub fn transform<S: AsRef<str>>(&self, documents: &[S]) -> Result<Vec<Vec<f32>>> {
        if self.vocabulary.is_empty() {
            return Err(ModelError::NotFitted);
        }

        Ok(documents
            .iter()
            .map(|doc| {
                let mut row = vec![0.0f32; self.vocabulary.len()];
                for token in tokenize(doc.as_ref()) {
                    if let Some(count) = self
                        .vocabulary
                        .get(&token)
                        .and_then(|&column| row.get_mut(column))
                    {
                        *count += 1.0;
                    }
                }
                row
            })
            .collect())
    }

    /// Fit then transform the same corpus
    pub fn fit_transform<S: AsRef<str>>(&mut self, documents: &[S]) -> Result<Vec<Vec<f32>>> {
        self.fit(documents)?;
        self.transform(documents)
    }

    /// Columns must be exactly `0..vocabulary_size()`, one per token
    pub(crate) fn check(&self) -> Result<()> {
        let mut seen = vec![false; self.vocabulary.len()];
        for (token, &column) in &self.vocabulary {
            match seen.get_mut(column) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(ModelError::InvalidModel(format!(
                        "token {token:?} maps to invalid column {column}"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Number of features
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Learned tokens in column order
    pub fn feature_names(&self) -> Vec<&str> {
        self.vocabulary.keys().map(String::as_str).collect()
    }
}
