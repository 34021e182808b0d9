//! Secondary indexes kept coherent with the primary map by [`crate::Store`].
//!
//! Two indexes are maintained side by side over the same keyspace:
//!
//! * an inverted index from lowercased word token to the set of keys whose
//!   current value contains that token (`search_full_text`);
//! * a fixed-length hashed bag-of-words embedding per key, compared by
//!   cosine similarity (`search_embedding`).
//!
//! Both are mutated only by [`IndexPair::add`]/[`IndexPair::remove`], which
//! [`crate::Store`] calls while holding its own exclusive lock. Neither type
//! does its own locking.

use std::collections::{HashMap, HashSet};

/// Dimensionality of the hashed bag-of-words embedding.
pub const EMBEDDING_DIM: usize = 16;

/// Tokenize text into lowercased maximal runs of word characters
/// (alphanumeric and underscore), mirroring the `\w+` regex the reference
/// implementation tokenizes values with.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// FNV-1a, a small non-cryptographic hash with good distribution over short
/// strings and, crucially, deterministic across runs within a process and
/// across processes alike (the original embedding index relied on an
/// interpreter's unstable string hash; this is a strict improvement, not a
/// behavioral requirement — see spec's embedding redesign note).
fn fnv1a(s: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for byte in s.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Build the hashed bag-of-words embedding for a piece of text: each token
/// increments `vec[fnv1a(token) % EMBEDDING_DIM]` by one.
fn build_embedding(text: &str) -> [f64; EMBEDDING_DIM] {
    let mut vec = [0.0f64; EMBEDDING_DIM];
    for tok in tokenize(text) {
        let slot = (fnv1a(&tok) % EMBEDDING_DIM as u64) as usize;
        vec[slot] += 1.0;
    }
    vec
}

fn dot(a: &[f64; EMBEDDING_DIM], b: &[f64; EMBEDDING_DIM]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64; EMBEDDING_DIM]) -> f64 {
    dot(a, a).sqrt()
}

/// The inverted full-text index paired with the hashed embedding index.
#[derive(Debug, Default)]
pub struct IndexPair {
    inverted: HashMap<String, HashSet<String>>,
    embeddings: HashMap<String, [f64; EMBEDDING_DIM]>,
}

impl IndexPair {
    /// Create empty indexes.
    pub fn new() -> Self {
        IndexPair {
            inverted: HashMap::new(),
            embeddings: HashMap::new(),
        }
    }

    /// Index `value` under `key`. Caller must ensure `key` has no stale
    /// entry (call [`IndexPair::remove`] first on overwrite).
    pub fn add(&mut self, key: &str, value: &str) {
        for tok in tokenize(value) {
            self.inverted
                .entry(tok)
                .or_insert_with(HashSet::new)
                .insert(key.to_string());
        }
        self.embeddings.insert(key.to_string(), build_embedding(value));
    }

    /// Remove `key`'s entries for its previous value `old_value`. Empties
    /// and drops any token bucket left with no keys (invariant 2).
    pub fn remove(&mut self, key: &str, old_value: &str) {
        for tok in tokenize(old_value) {
            if let Some(bucket) = self.inverted.get_mut(&tok) {
                bucket.remove(key);
                if bucket.is_empty() {
                    self.inverted.remove(&tok);
                }
            }
        }
        self.embeddings.remove(key);
    }

    /// Union full-text search: a key is returned if any query token matches
    /// a token in its current value. No duplicates, order unspecified.
    pub fn search_full_text(&self, query: &str) -> Vec<String> {
        let mut results = HashSet::new();
        for tok in tokenize(query) {
            if let Some(bucket) = self.inverted.get(&tok) {
                results.extend(bucket.iter().cloned());
            }
        }
        results.into_iter().collect()
    }

    /// Cosine-similarity search over the embedding index. Zero-norm query or
    /// document vectors contribute similarity 0 rather than raising.
    pub fn search_embedding(&self, query: &str, top_k: usize) -> Vec<(String, f64)> {
        if self.embeddings.is_empty() {
            return Vec::new();
        }
        let q_vec = build_embedding(query);
        let q_norm = norm(&q_vec);
        if q_norm == 0.0 {
            return Vec::new();
        }

        let mut scored: Vec<(String, f64)> = self
            .embeddings
            .iter()
            .filter_map(|(key, vec)| {
                let v_norm = norm(vec);
                if v_norm == 0.0 {
                    return None;
                }
                Some((key.clone(), dot(&q_vec, vec) / (q_norm * v_norm)))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }

    /// Number of keys with embedding entries (for invariant checks in tests).
    #[cfg(test)]
    pub fn embedding_keys(&self) -> HashSet<String> {
        self.embeddings.keys().cloned().collect()
    }

    #[cfg(test)]
    pub fn inverted_buckets(&self) -> &HashMap<String, HashSet<String>> {
        &self.inverted
    }
}
