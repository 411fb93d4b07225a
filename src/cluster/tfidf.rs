//! TF-IDF vectorizer.
//!
//! Tokens are lowercase runs of two or more word characters with English stop
//! words removed. The vocabulary keeps the `max_features` most frequent terms
//! of the corpus, indexed alphabetically. Weights are raw term counts times
//! smoothed idf, `ln((1 + n) / (1 + df)) + 1`, and every row is L2-normalized.

use super::sparse::{SparseMatrix, SparseVec};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use stop_words::{get, LANGUAGE};

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("valid token regex"));

static STOP_WORDS: Lazy<HashSet<String>> =
    Lazy::new(|| get(LANGUAGE::English).iter().map(|w| w.to_string()).collect());

/// Split text into lowercase tokens, dropping English stop words.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|token| !STOP_WORDS.contains(*token))
        .map(str::to_string)
        .collect()
}

/// Fitted TF-IDF model
#[derive(Debug, Clone, Default)]
pub struct TfidfVectorizer {
    max_features: usize,
    vocabulary: Vec<String>,
    index: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    pub fn new(max_features: usize) -> Self {
        Self {
            max_features,
            ..Default::default()
        }
    }

    /// Terms in column order
    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    /// Learn the vocabulary and idf weights, then transform the same corpus.
    pub fn fit_transform<S: AsRef<str>>(&mut self, docs: &[S]) -> SparseMatrix {
        let tokenized: Vec<Vec<String>> = docs.iter().map(|d| tokenize(d.as_ref())).collect();

        let mut term_counts: HashMap<&str, usize> = HashMap::new();
        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for tokens in &tokenized {
            let mut seen: HashSet<&str> = HashSet::new();
            for token in tokens {
                *term_counts.entry(token.as_str()).or_insert(0) += 1;
                if seen.insert(token.as_str()) {
                    *doc_freq.entry(token.as_str()).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(&str, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.max_features);

        let mut vocabulary: Vec<String> = ranked.iter().map(|(t, _)| t.to_string()).collect();
        vocabulary.sort();

        let n_docs = tokenized.len() as f64;
        let idf = vocabulary
            .iter()
            .map(|term| {
                let df = doc_freq.get(term.as_str()).copied().unwrap_or(0) as f64;
                ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        self.index = vocabulary
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        self.vocabulary = vocabulary;
        self.idf = idf;

        let rows = tokenized.iter().map(|tokens| self.weigh(tokens)).collect();
        SparseMatrix::new(rows, self.vocabulary.len())
    }

    /// Transform new documents with the fitted vocabulary.
    pub fn transform<S: AsRef<str>>(&self, docs: &[S]) -> SparseMatrix {
        let rows = docs
            .iter()
            .map(|d| self.weigh(&tokenize(d.as_ref())))
            .collect();
        SparseMatrix::new(rows, self.vocabulary.len())
    }

    fn weigh(&self, tokens: &[String]) -> SparseVec {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for token in tokens {
            if let Some(&idx) = self.index.get(token) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }

        let mut row = SparseVec::from_pairs(
            counts
                .into_iter()
                .map(|(idx, tf)| (idx, tf * self.idf[idx]))
                .collect(),
        );
        row.l2_normalize();
        row
    }
}
