//! Full analysis pipeline: records in, cluster labels and quality out.

use malwise::config::AnalysisConfig;
use malwise::fvec::Record;
use malwise::{
    classify, cluster_linkage, extract_prototypes, quality, AnalysisState, FeatureArray,
    FeatureTable,
};

fn corpus() -> Vec<Record> {
    let families = [
        ("ransom", ["XX YY XX YY XX 11", "XX YY XX ZZ XX 66", "XX ZZ XX YY XX YY"]),
        ("dropper", ["AA BB AA BB AA 22", "AA BB AA CC AA 77", "AA CC AA BB AA BB"]),
        ("worm", ["MM NN MM NN MM 33", "MM NN MM OO MM 88", "MM OO MM NN MM NN"]),
        ("spyware", ["UU VV UU VV UU 44", "UU VV UU WW UU 99", "UU WW UU VV UU VV"]),
        ("banker", ["RR SS RR SS RR 55", "RR SS RR TT RR 00", "RR TT RR SS RR SS"]),
    ];
    families
        .iter()
        .flat_map(|(family, reports)| {
            reports.iter().enumerate().map(move |(i, r)| {
                Record::new(*r)
                    .with_label(*family)
                    .with_src(format!("{}-{}", family, i))
            })
        })
        .collect()
}

fn config() -> AnalysisConfig {
    AnalysisConfig::from_json_str(
        r#"{
            "features": {"ngram_len": 2, "ngram_delim": " ", "embedding": "l2",
                         "lookup_table": true},
            "prototypes": {"max_dist": 0.65, "max_num": 0},
            "cluster": {"min_dist": 0.95, "reject_num": 1, "link_mode": "complete"},
            "classify": {"max_dist": 1.41}
        }"#,
    )
    .unwrap()
}

#[test]
fn clustering_recovers_families() {
    let config = config();
    let table = FeatureTable::new();
    let records = corpus();

    let fa = FeatureArray::extract_records(&records, &config.features, Some(&table), Some("corpus"));
    assert_eq!(fa.len(), 15);
    assert!(!table.is_empty());

    let mut state = AnalysisState::new();
    let run = state.next_run();

    let (protos, assign) = extract_prototypes(&fa, &config.prototypes);
    let clustering = cluster_linkage(&protos, &assign, &config.cluster, run).unwrap();

    assert_eq!(clustering.num(), 5);
    let report = quality(fa.label_indices(), clustering.ids()).unwrap();
    for measure in report.as_array() {
        assert!((measure - 1.0).abs() < 1e-9, "{:?}", report);
    }

    // Carry the surviving prototypes and rejects into the next run.
    state.record(
        clustering.select_prototypes(&assign, &protos),
        clustering.rejected_inputs(&fa),
    );
    assert!(state.num_proto() >= 5);
    assert_eq!(state.num_reject(), 0);
    let families: std::collections::HashSet<&str> = (0..state.num_proto())
        .map(|i| state.prototypes().label_name(i))
        .collect();
    assert_eq!(families.len(), 5);
    assert!(families.iter().all(|name| name.starts_with("clust-001-")));

    let mut buf = Vec::new();
    state.save(&mut buf).unwrap();
    let restored = AnalysisState::load(buf.as_slice()).unwrap();
    assert_eq!(restored.run(), 1);
    assert_eq!(restored.num_proto(), state.num_proto());
}

#[test]
fn classification_against_cluster_prototypes() {
    let config = config();
    let records = corpus();
    let fa = FeatureArray::extract_records(&records, &config.features, None, None);

    let (protos, assign) = extract_prototypes(&fa, &config.prototypes);
    let clustering = cluster_linkage(&protos, &assign, &config.cluster, 1).unwrap();
    let labeled = clustering.select_prototypes(&assign, &protos);

    // Unseen reports from two of the families.
    let queries = FeatureArray::extract_records(
        &[
            Record::new("XX YY XX YY XX ZZ").with_label("?"),
            Record::new("MM NN MM NN MM OO").with_label("?"),
        ],
        &config.features,
        None,
        None,
    );
    let result = classify(&queries, &labeled, &config.classify).unwrap();
    let family_a = labeled.label_name(result.get(0).proto);
    let family_b = labeled.label_name(result.get(1).proto);
    assert!(family_a.starts_with("clust-001-"));
    assert!(family_b.starts_with("clust-001-"));
    assert_ne!(family_a, family_b);
    assert!(result.entries().iter().all(|e| e.label != 0));
}
