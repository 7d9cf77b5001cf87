//! TF-IDF cosine similarity over control descriptions
//!
//! Vectors are sparse and normalized to unit length, so cosine similarity
//! is a plain dot product.

use std::collections::{HashMap, HashSet};

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "it", "in", "on", "of", "to", "and", "or", "for", "with", "this",
    "that", "be", "are", "was", "were", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "can", "shall", "not", "no",
    "but", "if", "at", "by", "from", "as", "into", "must", "all", "any",
];

/// Sparse unit vector: (dimension, weight), sorted by dimension
pub type SparseVector = Vec<(usize, f32)>;

/// Vocabulary and IDF weights built from a set of documents
#[derive(Debug, Clone, Default)]
pub struct TfIdfIndex {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
}

impl TfIdfIndex {
    #[must_use]
    pub fn from_corpus(documents: &[&str]) -> Self {
        if documents.is_empty() {
            return Self::default();
        }
        let n = documents.len() as f32;

        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: Vec<usize> = Vec::new();
        for document in documents {
            let unique: HashSet<String> = tokenize(document).into_iter().collect();
            for term in unique {
                let next = vocabulary.len();
                let idx = *vocabulary.entry(term).or_insert(next);
                if idx == doc_freq.len() {
                    doc_freq.push(0);
                }
                doc_freq[idx] += 1;
            }
        }

        // Smoothed IDF: rare terms weigh more, shared terms never reach zero
        let idf = doc_freq
            .iter()
            .map(|&df| (n / (df.max(1) as f32)).ln() + 1.0)
            .collect();

        Self { vocabulary, idf }
    }

    #[inline]
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.idf.len()
    }

    /// Terms outside the vocabulary are ignored
    #[must_use]
    pub fn embed(&self, text: &str) -> SparseVector {
        let mut tf: HashMap<usize, f32> = HashMap::new();
        for token in tokenize(text) {
            if let Some(&idx) = self.vocabulary.get(&token) {
                *tf.entry(idx).or_insert(0.0) += 1.0;
            }
        }
        let mut vector: SparseVector = tf
            .into_iter()
            .map(|(idx, count)| (idx, count * self.idf[idx]))
            .collect();
        vector.sort_unstable_by_key(|(idx, _)| *idx);
        normalize(&mut vector);
        vector
    }
}

/// Dot product of two sorted unit vectors
#[must_use]
pub fn cosine(a: &SparseVector, b: &SparseVector) -> f32 {
    let (mut i, mut j) = (0, 0);
    let mut dot = 0.0;
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    dot
}

/// Lowercase, split on non-alphanumerics, drop single characters and stop words
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
        .filter(|w| !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

fn normalize(vector: &mut SparseVector) {
    let norm = vector.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
    if norm > 0.0 {
        for (_, w) in vector.iter_mut() {
            *w /= norm;
        }
    }
}
