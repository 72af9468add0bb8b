//! Nearest-prototype classification against a labeled training set.

use malwise::config::{ClassifyConfig, Embedding, FeaturesConfig};
use malwise::fvec::Extractor;
use malwise::{classify, rejected_queries, FeatureArray};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const TRAIN: [(&str, &str); 6] = [
    ("A B B B X", "1"),
    ("A A B B X", "1"),
    ("B B A B X", "1"),
    ("X Y B B Z", "2"),
    ("A B Z X Y", "2"),
    ("A X Y B Z", "2"),
];

const TEST: [(&str, &str); 8] = [
    ("A A B B X", "1"),
    ("Z A B B X", "1"),
    ("A B B X A", "1"),
    ("X Y B Z Z", "2"),
    ("B Z X Y X", "2"),
    ("A X Y B Z", "2"),
    ("A X B B Z", "2"),
    ("A Z X Y A", "2"),
];

fn features() -> FeaturesConfig {
    FeaturesConfig {
        ngram_len: 2,
        ngram_delim: " ".to_string(),
        embedding: Embedding::L2,
        lookup_table: false,
    }
}

fn labeled_array(data: &[(&str, &str)]) -> FeatureArray {
    let config = features();
    let ex = Extractor::new(&config);
    let mut fa = FeatureArray::new(None);
    for (s, label) in data {
        fa.push(ex.extract(s.as_bytes(), None), label);
    }
    fa
}

#[test]
fn predicts_training_families() {
    let train = labeled_array(&TRAIN);
    let test = labeled_array(&TEST);
    let config = ClassifyConfig { max_dist: 1.41 };
    let assign = classify(&test, &train, &config).unwrap();

    for (k, (report, expected)) in TEST.iter().enumerate() {
        let entry = assign.get(k);
        assert_eq!(
            train.label_name(entry.proto),
            *expected,
            "report '{}' assigned to wrong family",
            report
        );
        assert!(entry.dist < config.max_dist);
        assert_eq!(entry.label, train.label_index(entry.proto));
    }
    assert!(rejected_queries(&assign, &test).is_empty());
}

#[test]
fn self_classification_is_exact() {
    let train = labeled_array(&TRAIN);
    let assign = classify(&train, &train, &ClassifyConfig { max_dist: 1.41 }).unwrap();
    for (i, entry) in assign.entries().iter().enumerate() {
        assert_eq!(entry.proto, i);
        assert!(entry.dist < 1e-6);
        assert_eq!(entry.label, train.label_index(i));
    }
}

#[test]
fn stress_random_reports() {
    let mut rng = StdRng::seed_from_u64(11);
    let config = features();
    let ex = Extractor::new(&config);
    for _ in 0..5 {
        let mut fa = FeatureArray::new(None);
        for _ in 0..100 {
            let report: String = (0..40)
                .map(|_| format!("{} ", rng.gen_range(0..10)))
                .collect();
            let label = format!("label{:02}", rng.gen_range(0..10));
            fa.push(ex.extract(report.as_bytes(), None), &label);
        }
        let assign = classify(&fa, &fa, &ClassifyConfig { max_dist: 1.41 }).unwrap();
        for entry in assign.entries() {
            assert!(entry.proto < fa.len());
            assert!(entry.dist.is_finite());
        }
    }
}
