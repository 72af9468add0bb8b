//! Quality measures for label assignments.
//!
//! Compares a ground-truth labeling against a predicted one (class labels
//! or cluster ids) using a label histogram, and derives precision,
//! recall, F-measure, Rand index and adjusted Rand index.

use std::collections::HashMap;

use crate::errors::{AnalysisError, Result};

/// Histogram over one labeling, counting the co-occurring labels of the
/// other. Transient; built and consumed inside [`quality`].
#[derive(Debug, Default)]
struct Bin {
    total: usize,
    by_other: HashMap<u32, usize>,
}

fn histogram(keys: &[u32], values: &[u32]) -> HashMap<u32, Bin> {
    let mut hist: HashMap<u32, Bin> = HashMap::new();
    for (&k, &v) in keys.iter().zip(values) {
        let bin = hist.entry(k).or_default();
        bin.total += 1;
        *bin.by_other.entry(v).or_insert(0) += 1;
    }
    hist
}

/// Sum over bins of the dominant co-occurring label, normalized by n.
fn dominant_fraction(keys: &[u32], values: &[u32]) -> f64 {
    let hist = histogram(keys, values);
    let dominant: usize = hist
        .values()
        .map(|bin| bin.by_other.values().copied().max().unwrap_or(0))
        .sum();
    dominant as f64 / keys.len() as f64
}

/// The five quality measures, in the order they are reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityReport {
    pub precision: f64,
    pub recall: f64,
    pub f_measure: f64,
    pub rand: f64,
    pub adjusted_rand: f64,
}

impl QualityReport {
    /// Fixed 5-wide vector: precision, recall, F, Rand, adjusted Rand.
    pub fn as_array(&self) -> [f64; 5] {
        [
            self.precision,
            self.recall,
            self.f_measure,
            self.rand,
            self.adjusted_rand,
        ]
    }
}

impl std::fmt::Display for QualityReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "precision={:.4}, recall={:.4}, f-measure={:.4}, rand={:.4}, adjusted-rand={:.4}",
            self.precision, self.recall, self.f_measure, self.rand, self.adjusted_rand
        )
    }
}

/// Computes quality measures for a `(true, predicted)` label pair.
///
/// Pair counts for the Rand indices run over all ordered pairs including
/// the diagonal, matching the histogram construction used for precision
/// and recall.
pub fn quality(y: &[u32], a: &[u32]) -> Result<QualityReport> {
    if y.is_empty() {
        return Err(AnalysisError::InvalidInput(
            "quality evaluation over empty labelings".to_string(),
        ));
    }
    if y.len() != a.len() {
        return Err(AnalysisError::InvalidInput(format!(
            "labeling lengths differ: {} vs {}",
            y.len(),
            a.len()
        )));
    }
    let n = y.len();

    // Precision: dominant true label per predicted cluster.
    let precision = dominant_fraction(a, y);
    // Recall: dominant predicted cluster per true label.
    let recall = dominant_fraction(y, a);
    let f_measure = 2.0 * precision * recall / (precision + recall);

    // Pair agreement counts.
    let (mut ac, mut bc, mut cc, mut dc) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
    for i in 0..n {
        for j in 0..n {
            let same_a = a[i] == a[j];
            let same_y = y[i] == y[j];
            match (same_a, same_y) {
                (true, true) => ac += 1.0,
                (false, false) => bc += 1.0,
                (false, true) => cc += 1.0,
                (true, false) => dc += 1.0,
            }
        }
    }
    let rand = (ac + bc) / (ac + bc + cc + dc);
    let denom = (ac + dc) * (dc + bc) + (ac + cc) * (cc + bc);
    let adjusted_rand = if denom == 0.0 {
        // No discriminative pairs at all; identical partitions score 1.
        if cc == 0.0 && dc == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        2.0 * (ac * bc - cc * dc) / denom
    };

    Ok(QualityReport {
        precision,
        recall,
        f_measure,
        rand,
        adjusted_rand,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(y: &[u32], a: &[u32], expected: [f64; 5]) {
        let report = quality(y, a).unwrap();
        for (got, want) in report.as_array().iter().zip(expected) {
            assert!(
                (got - want).abs() < 1e-3,
                "y={:?} a={:?}: got {:?}, want {:?}",
                y,
                a,
                report.as_array(),
                expected
            );
        }
    }

    #[test]
    fn matching_partitions_are_perfect() {
        check(&[0, 0, 1, 1], &[1, 1, 2, 2], [1.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn split_cluster() {
        check(&[0, 0, 0, 0], &[1, 1, 3, 3], [1.0, 0.5, 0.6667, 0.5, 0.0]);
    }

    #[test]
    fn merged_cluster() {
        check(&[0, 0, 1, 1], &[1, 1, 1, 1], [0.5, 1.0, 0.6667, 0.5, 0.0]);
    }

    #[test]
    fn one_cluster_many_labels() {
        check(&[1, 2, 3, 4], &[1, 1, 1, 1], [0.25, 1.0, 0.4, 0.25, 0.0]);
    }

    #[test]
    fn partial_agreement() {
        check(&[1, 1, 2, 2], &[1, 1, 1, 3], [0.75, 0.75, 0.75, 0.625, 0.25]);
    }

    #[test]
    fn measures_stay_in_unit_range() {
        let y = [1, 1, 2, 3, 3, 3, 4];
        let a = [9, 9, 9, 2, 2, 5, 5];
        let r = quality(&y, &a).unwrap();
        for v in r.as_array() {
            assert!((0.0..=1.0).contains(&v) || v.abs() <= 1.0);
        }
    }

    #[test]
    fn rejects_mismatched_lengths() {
        assert!(quality(&[1, 2], &[1]).is_err());
        assert!(quality(&[], &[]).is_err());
    }
}
