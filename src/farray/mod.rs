//! Arrays of feature vectors with textual labels.
//!
//! An array owns its vectors and keeps a parallel list of label indices.
//! Label indices are content-addressed (a 32-bit digest slice of the
//! name), so the same label string yields the same index in any array
//! without coordination.

use std::collections::HashMap;

use log::warn;
use rayon::prelude::*;

use crate::config::FeaturesConfig;
use crate::errors::AnalysisError;
use crate::ftable::FeatureTable;
use crate::fvec::{Extractor, FeatureVector, Record};

/// Label names are capped at this many bytes.
pub const LABEL_MAX_LEN: usize = 63;

/// Bidirectional mapping between label names and their content-addressed
/// 32-bit indices.
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    by_index: HashMap<u32, String>,
    by_name: HashMap<String, u32>,
}

impl LabelTable {
    /// Derives the index for a name: a 32-bit slice of its digest.
    pub fn index_of(name: &str) -> u32 {
        let digest = md5::compute(truncate_label(name).as_bytes());
        u32::from_le_bytes(digest.0[..4].try_into().unwrap())
    }

    /// Inserts a name if unknown and returns its index.
    pub fn add(&mut self, name: &str) -> u32 {
        let name = truncate_label(name);
        if let Some(&index) = self.by_name.get(name) {
            return index;
        }
        let index = Self::index_of(name);
        self.by_index.insert(index, name.to_string());
        self.by_name.insert(name.to_string(), index);
        index
    }

    pub fn name(&self, index: u32) -> Option<&str> {
        self.by_index.get(&index).map(String::as_str)
    }

    pub fn index(&self, name: &str) -> Option<u32> {
        self.by_name.get(truncate_label(name)).copied()
    }

    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }

    /// Iterates `(index, name)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.by_index.iter().map(|(&i, n)| (i, n.as_str()))
    }
}

fn truncate_label(name: &str) -> &str {
    if name.len() <= LABEL_MAX_LEN {
        return name;
    }
    let mut end = LABEL_MAX_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Ordered collection of feature vectors with label indices.
#[derive(Debug, Clone, Default)]
pub struct FeatureArray {
    x: Vec<FeatureVector>,
    y: Vec<u32>,
    labels: LabelTable,
    src: Option<String>,
}

impl FeatureArray {
    pub fn new(src: Option<&str>) -> Self {
        Self {
            src: src.map(str::to_owned),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn src(&self) -> Option<&str> {
        self.src.as_deref()
    }

    pub fn vectors(&self) -> &[FeatureVector] {
        &self.x
    }

    /// Parallel sequence of label indices.
    pub fn label_indices(&self) -> &[u32] {
        &self.y
    }

    pub fn label_table(&self) -> &LabelTable {
        &self.labels
    }

    pub fn get(&self, i: usize) -> &FeatureVector {
        &self.x[i]
    }

    pub fn label_index(&self, i: usize) -> u32 {
        self.y[i]
    }

    /// Textual label of the i-th vector via inverse lookup.
    pub fn label_name(&self, i: usize) -> &str {
        self.labels
            .name(self.y[i])
            .expect("label index is registered on push")
    }

    /// Appends a vector under the given label and returns the label
    /// index. Appends are not synchronized; parallel producers collect
    /// first and push from one thread.
    pub fn push(&mut self, fv: FeatureVector, label: &str) -> u32 {
        let index = self.labels.add(label);
        self.x.push(fv);
        self.y.push(index);
        index
    }

    /// Estimated size in bytes of the array and its vectors.
    pub fn mem(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.x.iter().map(FeatureVector::mem).sum::<usize>()
            + self.y.len() * std::mem::size_of::<u32>()
            + self
                .labels
                .iter()
                .map(|(_, n)| n.len() + std::mem::size_of::<u32>())
                .sum::<usize>()
    }

    /// Moves every vector of `other` into `self`, re-deriving label
    /// indices from the label names. Content addressing makes the indices
    /// coincide, but names are authoritative.
    pub fn merge(&mut self, other: FeatureArray) {
        let FeatureArray { x, y, labels, .. } = other;
        for (fv, index) in x.into_iter().zip(y) {
            let name = labels
                .name(index)
                .expect("label index is registered on push");
            self.push(fv, name);
        }
    }

    /// Extracts vectors from a slice of records in parallel. Records that
    /// produce an empty vector are discarded with a warning; the label
    /// falls back to `"unknown"` when a record carries none.
    pub fn extract_records(
        records: &[Record],
        features: &FeaturesConfig,
        table: Option<&FeatureTable>,
        src: Option<&str>,
    ) -> FeatureArray {
        let mut extractor = Extractor::new(features);
        if let Some(table) = table {
            extractor = extractor.with_table(table);
        }

        // Workers only extract; results are collected into the array by
        // this thread, which keeps appends single-threaded.
        let extracted: Vec<Option<(FeatureVector, &str)>> = records
            .par_iter()
            .map(|record| match extractor.extract_record(record) {
                Ok(fv) => Some((fv, record.label.as_deref().unwrap_or("unknown"))),
                Err(AnalysisError::EmptyFeatureVector(src)) => {
                    warn!("discarding empty feature vector for '{}'", src);
                    None
                }
                Err(_) => None,
            })
            .collect();

        let mut fa = FeatureArray::new(src);
        for (fv, label) in extracted.into_iter().flatten() {
            fa.push(fv, label);
        }
        fa
    }

    /// Consumes the array into its vectors and label names.
    pub fn into_labeled_vectors(self) -> Vec<(FeatureVector, String)> {
        let FeatureArray { x, y, labels, .. } = self;
        x.into_iter()
            .zip(y)
            .map(|(fv, index)| {
                let name = labels
                    .name(index)
                    .expect("label index is registered on push")
                    .to_string();
                (fv, name)
            })
            .collect()
    }
}

impl std::fmt::Display for FeatureArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "feature array: len={}, labels={}, mem={:.2}Mb",
            self.len(),
            self.labels.len(),
            self.mem() as f64 / 1e6
        )?;
        if let Some(src) = self.src() {
            write!(f, ", src='{}'", src)?;
        }
        Ok(())
    }
}
