//! Sparse feature vectors over a hashed feature space.
//!
//! A feature vector is a sorted list of non-zero dimensions, each a 64-bit
//! digest of the byte substring that produced it. Sparsity makes vectors of
//! effectively unbounded dimensionality cheap to store and compare, as long
//! as the dimension/value association stays sparse.

mod extract;

pub use extract::{DelimiterSet, Extractor};

use crate::config::Embedding;

/// 64-bit digest identifying a unique token (n-gram or word-gram).
pub type FeatureKey = u64;

/// Weights whose magnitude falls below this are dropped by sparsify.
pub const SPARSE_EPSILON: f64 = 1e-9;

/// An input record: opaque bytes plus an optional label and source tag.
#[derive(Debug, Clone, Default)]
pub struct Record {
    pub data: Vec<u8>,
    pub label: Option<String>,
    pub src: Option<String>,
}

impl Record {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            label: None,
            src: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }
}

/// Sparse feature vector.
///
/// Invariants: `dim` is strictly ascending, `dim.len() == val.len()`, and
/// all weights are finite and non-zero. `total` records the number of
/// features before duplicate merging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    pub(crate) dim: Vec<FeatureKey>,
    pub(crate) val: Vec<f64>,
    pub(crate) total: usize,
    pub(crate) src: Option<String>,
}

impl FeatureVector {
    /// An empty vector. Valid input to all operations; every dot product
    /// with it is 0 and both norms are 0.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Builds a vector from pre-sorted parts. Used by vector arithmetic
    /// and the persistence loader, which maintain the invariants
    /// themselves.
    pub(crate) fn from_parts(
        dim: Vec<FeatureKey>,
        val: Vec<f64>,
        total: usize,
        src: Option<String>,
    ) -> Self {
        debug_assert!(dim.windows(2).all(|w| w[0] < w[1]));
        debug_assert_eq!(dim.len(), val.len());
        Self {
            dim,
            val,
            total,
            src,
        }
    }

    pub fn len(&self) -> usize {
        self.dim.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dim.is_empty()
    }

    /// Number of features extracted before duplicates were merged.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn src(&self) -> Option<&str> {
        self.src.as_deref()
    }

    pub fn keys(&self) -> &[FeatureKey] {
        &self.dim
    }

    pub fn weights(&self) -> &[f64] {
        &self.val
    }

    /// Iterates `(key, weight)` pairs in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (FeatureKey, f64)> + '_ {
        self.dim.iter().copied().zip(self.val.iter().copied())
    }

    /// Weight of a single dimension, 0 if absent.
    pub fn get(&self, key: FeatureKey) -> f64 {
        match self.dim.binary_search(&key) {
            Ok(i) => self.val[i],
            Err(_) => 0.0,
        }
    }

    /// Estimated size in bytes, including the source tag.
    pub fn mem(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.len() * (std::mem::size_of::<FeatureKey>() + std::mem::size_of::<f64>())
            + self.src.as_ref().map_or(0, |s| s.len())
    }

    /// Normalizes weights in place. `Bin` sets every weight to 1, `L1`
    /// divides by the sum of magnitudes, `L2` divides by the Euclidean
    /// norm. Empty vectors are left untouched.
    pub fn normalize(&mut self, embedding: Embedding) {
        match embedding {
            Embedding::Bin => {
                for v in &mut self.val {
                    *v = 1.0;
                }
            }
            Embedding::L1 => {
                let n = crate::fmath::norm1(self);
                if n > 0.0 {
                    for v in &mut self.val {
                        *v /= n;
                    }
                }
            }
            Embedding::L2 => {
                let n = crate::fmath::norm2(self);
                if n > 0.0 {
                    for v in &mut self.val {
                        *v /= n;
                    }
                }
            }
        }
    }

    /// Verbose listing of the vector, one line per dimension. When a
    /// feature table is supplied the originating token is appended, with
    /// non-printable bytes escaped.
    pub fn describe(&self, table: Option<&crate::ftable::FeatureTable>) -> String {
        use std::fmt::Write as _;
        let mut out = format!("{}\n", self);
        for (key, weight) in self.iter() {
            let _ = write!(out, "    {:016x}: {:.4}", key, weight);
            if let Some(token) = table.and_then(|t| t.get(key)) {
                let _ = write!(out, " [{}]", crate::io::escape_bytes(&token));
            }
            out.push('\n');
        }
        out
    }

    /// Merges duplicate dimensions by summing their weights and drops
    /// weights that are exactly zero. Expects `dim` sorted ascending;
    /// afterwards `total` holds the pre-merge count.
    pub(crate) fn condense(&mut self) {
        self.total = self.dim.len();
        let mut out = 0usize;
        let mut i = 0usize;
        while i < self.dim.len() {
            let key = self.dim[i];
            let mut sum = 0.0;
            while i < self.dim.len() && self.dim[i] == key {
                sum += self.val[i];
                i += 1;
            }
            if sum.abs() < 1e-12 {
                continue;
            }
            self.dim[out] = key;
            self.val[out] = sum;
            out += 1;
        }
        self.dim.truncate(out);
        self.val.truncate(out);
        self.dim.shrink_to_fit();
        self.val.shrink_to_fit();
    }
}

impl std::fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "feature vector: len={}, total={}, mem={:.2}kb",
            self.len(),
            self.total(),
            self.mem() as f64 / 1e3
        )?;
        if let Some(src) = self.src() {
            write!(f, ", src='{}'", src)?;
        }
        Ok(())
    }
}
