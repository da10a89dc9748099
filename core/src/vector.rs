//! Sparse weighted feature vectors and the distance algebra the clusterer uses.
//!
//! Features are opaque strings (a clicked result id or a lexical token). The
//! map is ordered so iterating a vector, and everything derived from that
//! iteration, is reproducible across runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper bound of the distance between two L2-normalized vectors.
pub const MAX_EUCLIDEAN_DISTANCE: f64 = std::f64::consts::SQRT_2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    weights: BTreeMap<String, f64>,
}

impl SparseVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unit weight for every distinct feature, then L2-normalized.
    pub fn from_features<I, S>(features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let weights = features.into_iter().map(|f| (f.into(), 1.0)).collect();
        Self { weights }.l2_normalize()
    }

    pub fn insert(&mut self, feature: impl Into<String>, weight: f64) {
        self.weights.insert(feature.into(), weight);
    }

    pub fn get(&self, feature: &str) -> f64 {
        self.weights.get(feature).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Features in ascending order.
    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn norm(&self) -> f64 {
        self.weights.values().map(|w| w * w).sum::<f64>().sqrt()
    }

    /// Divide every weight by the Euclidean norm. A zero-norm vector carries
    /// no usable signal and comes back empty.
    pub fn l2_normalize(self) -> Self {
        let norm = self.norm();
        if norm == 0.0 {
            return Self::default();
        }
        let weights = self
            .weights
            .into_iter()
            .map(|(k, w)| (k, w / norm))
            .collect();
        Self { weights }
    }

    /// Keep only the features whose weight satisfies `keep`, rebuilding the map.
    pub fn retain(self, mut keep: impl FnMut(f64) -> bool) -> Self {
        let weights = self.weights.into_iter().filter(|(_, w)| keep(*w)).collect();
        Self { weights }
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for SparseVector {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let weights = iter.into_iter().map(|(k, w)| (k.into(), w)).collect();
        Self { weights }
    }
}

/// Distance over the union of both feature sets, absent features counting as 0.
pub fn euclidean_distance(a: &SparseVector, b: &SparseVector) -> f64 {
    let mut sum = 0.0;
    for (feature, wa) in a.iter() {
        let diff = wa - b.get(feature);
        sum += diff * diff;
    }
    for (feature, wb) in b.iter() {
        if !a.weights.contains_key(feature) {
            sum += wb * wb;
        }
    }
    sum.sqrt()
}

/// Per-feature arithmetic mean. `None` for an empty slice.
pub fn centroid<V: AsRef<SparseVector>>(vectors: &[V]) -> Option<SparseVector> {
    if vectors.is_empty() {
        return None;
    }
    let mut sums: BTreeMap<String, f64> = BTreeMap::new();
    for v in vectors {
        for (feature, w) in v.as_ref().iter() {
            *sums.entry(feature.to_string()).or_insert(0.0) += w;
        }
    }
    let n = vectors.len() as f64;
    for w in sums.values_mut() {
        *w /= n;
    }
    Some(SparseVector { weights: sums })
}

/// Root-mean-square of the pairwise distances across all unordered pairs.
/// Fewer than two vectors have no pairs and a diameter of 0.
pub fn diameter<V: AsRef<SparseVector>>(vectors: &[V]) -> f64 {
    if vectors.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, a) in vectors.iter().enumerate() {
        for b in &vectors[i + 1..] {
            let d = euclidean_distance(a.as_ref(), b.as_ref());
            total += d * d;
            pairs += 1;
        }
    }
    (total / pairs as f64).sqrt()
}

impl AsRef<SparseVector> for SparseVector {
    fn as_ref(&self) -> &SparseVector {
        self
    }
}
