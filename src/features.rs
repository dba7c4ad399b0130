//! Derived features: sentence counts and a per-batch TF-IDF model.
//!
//! The vectorizer is fit exactly once per batch, over the full cleaned
//! corpus, and only then are per-record vectors emitted. Vectors are only
//! meaningful against the vocabulary of the run that produced them.
//!
//! Weighting follows the usual smooth-idf scheme:
//!
//! ```text
//! idf(t)      = ln((1 + n) / (1 + df(t))) + 1
//! weight(t,d) = count(t,d) * idf(t), then each row L2-normalised
//! ```
//!
//! Fitting is optional in the sense that a batch can legitimately have
//! nothing to fit (no records, or no term frequent enough). That case is a
//! typed [`Vectorization::Skipped`] outcome with an empty feature table, not
//! an error.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::SourceConfig;
use crate::models::{CleanedReview, FeatureTable, SparseVector};

static SENTENCE_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+").expect("sentence break pattern"));

/// Count terminal-punctuation-delimited, non-blank segments.
pub fn sentence_count(text: &str) -> usize {
    SENTENCE_BREAK_RE
        .split(text)
        .filter(|segment| !segment.trim().is_empty())
        .count()
}

/// Vectorizer settings for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorizerSettings {
    pub max_features: usize,
    pub min_doc_freq: usize,
    pub max_doc_freq_fraction: f64,
    pub ngram_range: (usize, usize),
}

impl VectorizerSettings {
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            max_features: config.vocabulary_size,
            min_doc_freq: config.min_doc_freq,
            max_doc_freq_fraction: config.max_doc_freq_fraction,
            ngram_range: config.ngram_range,
        }
    }
}

impl Default for VectorizerSettings {
    fn default() -> Self {
        Self {
            max_features: 2000,
            min_doc_freq: 2,
            max_doc_freq_fraction: 0.95,
            ngram_range: (1, 2),
        }
    }
}

/// Why no model was fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyCorpus,
    EmptyVocabulary,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmptyCorpus => f.write_str("no records to vectorize"),
            SkipReason::EmptyVocabulary => {
                f.write_str("no term satisfied the document-frequency bounds")
            }
        }
    }
}

/// Result of fitting the vectorizer on a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Vectorization {
    Fitted(TfidfModel),
    Skipped(SkipReason),
}

impl Vectorization {
    pub fn model(&self) -> Option<&TfidfModel> {
        match self {
            Vectorization::Fitted(model) => Some(model),
            Vectorization::Skipped(_) => None,
        }
    }
}

/// A fitted vocabulary with per-term inverse document frequencies.
#[derive(Debug, Clone, PartialEq)]
pub struct TfidfModel {
    vocabulary: Vec<String>,
    index: HashMap<String, usize>,
    idf: Vec<f64>,
    ngram_range: (usize, usize),
}

impl TfidfModel {
    /// Fit on the whole corpus. Each document is already-cleaned text whose
    /// tokens are separated by whitespace.
    pub fn fit(settings: &VectorizerSettings, corpus: &[&str]) -> Vectorization {
        let n_docs = corpus.len();
        if n_docs == 0 {
            return Vectorization::Skipped(SkipReason::EmptyCorpus);
        }

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut corpus_freq: HashMap<String, usize> = HashMap::new();
        for doc in corpus {
            for (term, count) in term_counts(doc, settings.ngram_range) {
                *corpus_freq.entry(term.clone()).or_insert(0) += count;
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let max_df = settings.max_doc_freq_fraction * n_docs as f64;
        let mut candidates: Vec<(String, usize)> = corpus_freq
            .into_iter()
            .filter(|(term, _)| {
                let df = doc_freq[term];
                df >= settings.min_doc_freq && (df as f64) <= max_df
            })
            .collect();

        candidates.sort_by(|(ta, ca), (tb, cb)| cb.cmp(ca).then_with(|| ta.cmp(tb)));
        candidates.truncate(settings.max_features);
        if candidates.is_empty() {
            return Vectorization::Skipped(SkipReason::EmptyVocabulary);
        }

        let mut vocabulary: Vec<String> = candidates.into_iter().map(|(term, _)| term).collect();
        vocabulary.sort();

        let idf = vocabulary
            .iter()
            .map(|term| {
                let df = doc_freq[term] as f64;
                ((1.0 + n_docs as f64) / (1.0 + df)).ln() + 1.0
            })
            .collect();
        let index = vocabulary
            .iter()
            .enumerate()
            .map(|(i, term)| (term.clone(), i))
            .collect();

        Vectorization::Fitted(TfidfModel {
            vocabulary,
            index,
            idf,
            ngram_range: settings.ngram_range,
        })
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn idf(&self, term: &str) -> Option<f64> {
        self.index.get(term).map(|&i| self.idf[i])
    }

    /// Weight one document against the fitted vocabulary.
    pub fn transform(&self, doc: &str) -> SparseVector {
        let mut entries: Vec<(usize, f64)> = term_counts(doc, self.ngram_range)
            .into_iter()
            .filter_map(|(term, count)| {
                self.index
                    .get(&term)
                    .map(|&i| (i, count as f64 * self.idf[i]))
            })
            .collect();

        let norm = entries.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, w) in entries.iter_mut() {
                *w /= norm;
            }
        }
        entries.sort_by_key(|(i, _)| *i);
        SparseVector { entries }
    }
}

/// Counts of every n-gram in `ngram_range` for one whitespace-tokenised doc.
fn term_counts(doc: &str, (lo, hi): (usize, usize)) -> HashMap<String, usize> {
    let tokens: Vec<&str> = doc.split_whitespace().collect();
    let mut counts = HashMap::new();
    for n in lo.max(1)..=hi.min(tokens.len()) {
        for window in tokens.windows(n) {
            *counts.entry(window.join(" ")).or_insert(0) += 1;
        }
    }
    counts
}

/// Everything the feature stage derives for a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedFeatures {
    pub sentence_counts: Vec<usize>,
    pub vectorization: Vectorization,
    pub table: FeatureTable,
}

#[derive(Debug, Clone, Default)]
pub struct FeatureDeriver {
    settings: VectorizerSettings,
}

impl FeatureDeriver {
    pub fn new(settings: VectorizerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &VectorizerSettings {
        &self.settings
    }

    /// Sentence counts from the original content, then one vectorizer fit
    /// over all cleaned texts, then one vector per record.
    pub fn derive(&self, records: &[CleanedReview]) -> DerivedFeatures {
        let sentence_counts = records
            .iter()
            .map(|r| sentence_count(&r.content))
            .collect();

        let corpus: Vec<&str> = records.iter().map(|r| r.content_cleaned.as_str()).collect();
        let vectorization = TfidfModel::fit(&self.settings, &corpus);

        let table = match &vectorization {
            Vectorization::Fitted(model) => FeatureTable {
                vocabulary: model.vocabulary().to_vec(),
                rows: corpus.iter().map(|doc| model.transform(doc)).collect(),
            },
            Vectorization::Skipped(_) => FeatureTable {
                vocabulary: Vec::new(),
                rows: vec![SparseVector::default(); records.len()],
            },
        };

        DerivedFeatures {
            sentence_counts,
            vectorization,
            table,
        }
    }
}
