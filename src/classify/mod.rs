//! Nearest-prototype classification with distance rejection.
//!
//! Every query is assigned the label of its nearest labeled prototype,
//! unless that prototype lies beyond the configured radius, in which case
//! the query is rejected (label 0). Queries are independent; distances
//! come from the batched array primitive and rows are scanned in parallel.

use rayon::prelude::*;

use crate::config::ClassifyConfig;
use crate::errors::{AnalysisError, Result};
use crate::farray::FeatureArray;
use crate::fmath::array_dist;
use crate::prototype::{AssignEntry, Assignment};

/// Classifies queries against a labeled prototype array.
pub fn classify(
    queries: &FeatureArray,
    protos: &FeatureArray,
    config: &ClassifyConfig,
) -> Result<Assignment> {
    if protos.is_empty() {
        return Err(AnalysisError::InvalidInput(
            "empty prototype set for classification".to_string(),
        ));
    }

    let m = protos.len();
    let dist = array_dist(queries, protos)?;
    let entries: Vec<AssignEntry> = dist
        .par_chunks(m)
        .map(|row| {
            // Strict comparison keeps the lowest prototype index on ties.
            let (mut best, mut best_dist) = (0usize, f64::INFINITY);
            for (j, &d) in row.iter().enumerate() {
                if d < best_dist {
                    best_dist = d;
                    best = j;
                }
            }
            let label = if best_dist < config.max_dist {
                protos.label_index(best)
            } else {
                0
            };
            AssignEntry {
                proto: best,
                label,
                dist: best_dist,
                is_prototype: false,
            }
        })
        .collect();

    Ok(Assignment::from_entries(entries))
}

/// Collects the queries a classification rejected, labels passed through.
pub fn rejected_queries(assign: &Assignment, queries: &FeatureArray) -> FeatureArray {
    let mut out = FeatureArray::new(Some("rejected"));
    for (i, entry) in assign.entries().iter().enumerate() {
        if entry.label == 0 {
            out.push(queries.get(i).clone(), queries.label_name(i));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Embedding, FeaturesConfig};
    use crate::fvec::Extractor;

    fn array(data: &[(&str, &str)]) -> FeatureArray {
        let config = FeaturesConfig {
            ngram_len: 2,
            ngram_delim: " ".to_string(),
            embedding: Embedding::L2,
            lookup_table: false,
        };
        let ex = Extractor::new(&config);
        let mut fa = FeatureArray::new(None);
        for (s, label) in data {
            fa.push(ex.extract(s.as_bytes(), None), label);
        }
        fa
    }

    #[test]
    fn empty_prototype_set_is_invalid() {
        let queries = array(&[("A B C", "x")]);
        let protos = FeatureArray::new(None);
        assert!(matches!(
            classify(&queries, &protos, &ClassifyConfig::default()),
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[test]
    fn exact_match_classifies_at_zero_distance() {
        let protos = array(&[("A B C D", "worm"), ("X Y Z W", "bot")]);
        let queries = array(&[("X Y Z W", "?")]);
        let assign = classify(&queries, &protos, &ClassifyConfig::default()).unwrap();
        assert_eq!(assign.get(0).proto, 1);
        assert!(assign.get(0).dist < 1e-6);
        assert_eq!(assign.get(0).label, protos.label_index(1));
    }

    #[test]
    fn distant_query_is_rejected() {
        let protos = array(&[("A B C D", "worm")]);
        let queries = array(&[("Q R S T", "?")]);
        let config = ClassifyConfig { max_dist: 1.0 };
        let assign = classify(&queries, &protos, &config).unwrap();
        assert_eq!(assign.get(0).label, 0);
        assert!(assign.get(0).dist > config.max_dist);

        let rejected = rejected_queries(&assign, &queries);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected.label_name(0), "?");
    }

    #[test]
    fn nearest_prototype_wins() {
        let protos = array(&[("A B A B A B", "worm"), ("A B A B X Y", "bot")]);
        let queries = array(&[("A B A B A C", "?")]);
        let assign = classify(&queries, &protos, &ClassifyConfig { max_dist: 2.0 }).unwrap();
        assert_eq!(assign.get(0).proto, 0);
        assert_eq!(assign.get(0).label, protos.label_index(0));
    }
}
