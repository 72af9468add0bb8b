//! Prototype extraction: farthest-first traversal with a coverage radius.
//!
//! A prototype is an input vector chosen to represent a region of the
//! input space. Extraction repeatedly picks the input farthest from all
//! prototypes chosen so far, until every input lies within the configured
//! radius or the prototype cap is reached. The per-iteration distance
//! refresh runs in parallel.

use rayon::prelude::*;

use crate::config::PrototypeConfig;
use crate::farray::FeatureArray;
use crate::fmath::{dot, norm2};

/// Assignment of one input to its nearest prototype.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignEntry {
    /// Index of the nearest prototype in the prototype array.
    pub proto: usize,
    /// Label index carried by that prototype; 0 marks rejection.
    pub label: u32,
    /// Euclidean distance to that prototype.
    pub dist: f64,
    /// Whether this input was itself chosen as a prototype.
    pub is_prototype: bool,
}

/// Assignment of every input in an array to a prototype.
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    entries: Vec<AssignEntry>,
}

impl Assignment {
    pub fn from_entries(entries: Vec<AssignEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[AssignEntry] {
        &self.entries
    }

    pub fn get(&self, i: usize) -> &AssignEntry {
        &self.entries[i]
    }
}

fn euclid(dp: f64, na: f64, nb: f64) -> f64 {
    (na * na + nb * nb - 2.0 * dp).max(0.0).sqrt()
}

/// Extracts prototypes from an array of feature vectors.
///
/// Returns the prototype array (cloned vectors, labels passed through)
/// and the assignment of every input to its nearest prototype. The first
/// prototype is the input at index 0; ties in the farthest-point search
/// resolve to the lowest index, which makes the selection deterministic.
pub fn extract_prototypes(
    fa: &FeatureArray,
    config: &PrototypeConfig,
) -> (FeatureArray, Assignment) {
    let n = fa.len();
    let mut protos = FeatureArray::new(Some("prototypes"));
    if n == 0 {
        return (protos, Assignment::default());
    }

    let norms: Vec<f64> = fa.vectors().par_iter().map(norm2).collect();
    let mut entries = vec![
        AssignEntry {
            proto: 0,
            label: 0,
            dist: f64::INFINITY,
            is_prototype: false,
        };
        n
    ];

    let mut candidate = 0usize;
    loop {
        let pi = protos.len();
        let plabel = fa.label_index(candidate);
        protos.push(fa.get(candidate).clone(), fa.label_name(candidate));
        entries[candidate].is_prototype = true;

        let pv = fa.get(candidate);
        let pn = norms[candidate];
        entries
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, entry)| {
                let d = euclid(dot(fa.get(i), pv), norms[i], pn);
                if d < entry.dist {
                    entry.dist = d;
                    entry.proto = pi;
                    entry.label = plabel;
                }
            });

        if protos.len() == n || (config.max_num != 0 && protos.len() >= config.max_num) {
            break;
        }

        // Farthest uncovered input; strict comparison keeps the lowest
        // index on ties.
        let (mut next, mut max_dist) = (0usize, f64::NEG_INFINITY);
        for (i, entry) in entries.iter().enumerate() {
            if entry.dist > max_dist {
                max_dist = entry.dist;
                next = i;
            }
        }
        if max_dist < config.max_dist || max_dist <= 0.0 {
            break;
        }
        candidate = next;
    }

    (protos, Assignment::from_entries(entries))
}
