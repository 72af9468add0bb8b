//! Agglomerative linkage clustering over prototype distances.
//!
//! Murtagh's nearest-neighbor variant of linkage clustering: every point
//! caches its nearest not-yet-merged neighbor, and only caches touched by
//! the previous merge are rescanned. Worst case O(L^3), typically O(L^2).
//! The pairwise distances live in a strictly-upper-triangular matrix;
//! cluster-distance updates rewrite the merged point's column in place
//! according to the linkage rule.

use std::collections::{HashMap, HashSet};

use log::debug;
use rayon::prelude::*;

use crate::config::{ClusterConfig, LinkMode};
use crate::errors::Result;
use crate::farray::FeatureArray;
use crate::fmath::{array_dist_tria, tria_pos};
use crate::prototype::Assignment;

/// Result of a clustering run. Ids are 1-based; 0 marks a rejected input.
#[derive(Debug, Clone)]
pub struct Clustering {
    cluster: Vec<u32>,
    num: usize,
    run: u32,
}

impl Clustering {
    pub fn len(&self) -> usize {
        self.cluster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cluster.is_empty()
    }

    /// Number of distinct non-rejected clusters.
    pub fn num(&self) -> usize {
        self.num
    }

    /// Issue number namespacing the generated cluster names.
    pub fn run(&self) -> u32 {
        self.run
    }

    pub fn id(&self, i: usize) -> u32 {
        self.cluster[i]
    }

    pub fn ids(&self) -> &[u32] {
        &self.cluster
    }

    /// Human-readable name of the cluster the i-th input belongs to.
    pub fn name(&self, i: usize) -> String {
        match self.cluster[i] {
            0 => "rejected".to_string(),
            id => format!("clust-{:03}-{:04}", self.run, id),
        }
    }

    /// Prototypes of the surviving clusters, each labeled with its
    /// cluster name. One entry per prototype, in order of first use.
    pub fn select_prototypes(
        &self,
        assign: &Assignment,
        protos: &FeatureArray,
    ) -> FeatureArray {
        let mut out = FeatureArray::new(Some("prototypes"));
        let mut seen = HashSet::new();
        for (i, entry) in assign.entries().iter().enumerate() {
            if self.cluster[i] == 0 || !seen.insert(entry.proto) {
                continue;
            }
            out.push(protos.get(entry.proto).clone(), &self.name(i));
        }
        out
    }

    /// Inputs whose cluster was rejected, labels passed through.
    pub fn rejected_inputs(&self, fa: &FeatureArray) -> FeatureArray {
        let mut out = FeatureArray::new(Some("rejected"));
        for i in 0..fa.len() {
            if self.cluster[i] == 0 {
                out.push(fa.get(i).clone(), fa.label_name(i));
            }
        }
        out
    }
}

/// Parallel arrays of the linkage loop. `invalid` drives the
/// nearest-neighbor refresh: a cache is rescanned only when the previous
/// merge touched its neighbor.
struct LinkageState {
    done: Vec<bool>,
    nn: Vec<usize>,
    dnn: Vec<f64>,
    invalid: Vec<bool>,
}

/// Sentinel neighbor for rows with nothing left to scan.
const NO_NEIGHBOR: usize = usize::MAX;

impl LinkageState {
    fn new(len: usize) -> Self {
        Self {
            done: vec![false; len],
            nn: vec![NO_NEIGHBOR; len],
            dnn: vec![f64::INFINITY; len],
            invalid: vec![true; len],
        }
    }
}

fn link(mode: LinkMode, a: f64, b: f64) -> f64 {
    match mode {
        LinkMode::Single => a.min(b),
        LinkMode::Average => (a + b) / 2.0,
        LinkMode::Complete => a.max(b),
    }
}

/// The merge loop. `cluster` starts as the identity partition; merged
/// ids collapse onto the surviving point's id. Returns the number of
/// clusters remaining.
fn murtagh(
    cluster: &mut [u32],
    dist: &mut [f64],
    min_dist: f64,
    mode: LinkMode,
) -> usize {
    let l = cluster.len();
    let mut num = l;
    if l < 2 {
        return num;
    }
    let mut state = LinkageState::new(l);

    for _ in 0..l - 1 {
        // Refresh invalidated nearest-neighbor caches, in parallel. Every
        // row scans all live partners, which keeps each cached minimum
        // exact: a merge rewrites only the surviving column, with values
        // no smaller than both inputs' cached minima, so an
        // un-invalidated cache can never be undercut.
        {
            let LinkageState {
                done,
                nn,
                dnn,
                invalid,
            } = &mut state;
            let done = &*done;
            let dist = &*dist;
            nn.par_iter_mut()
                .zip(dnn.par_iter_mut())
                .zip(invalid.par_iter_mut())
                .enumerate()
                .for_each(|(i, ((nn_i, dnn_i), inv_i))| {
                    if done[i] || !*inv_i {
                        return;
                    }
                    let (mut dmin, mut jj) = (f64::INFINITY, NO_NEIGHBOR);
                    for j in 0..l {
                        if j == i || done[j] || dist[tria_pos(i, j, l)] >= dmin {
                            continue;
                        }
                        dmin = dist[tria_pos(i, j, l)];
                        jj = j;
                    }
                    *dnn_i = dmin;
                    *nn_i = jj;
                    *inv_i = false;
                });
        }

        // Globally smallest cached distance; first hit keeps the lowest
        // index on ties.
        let (mut im, mut dmin) = (NO_NEIGHBOR, f64::INFINITY);
        for i in 0..l {
            if state.done[i] || state.dnn[i] >= dmin {
                continue;
            }
            dmin = state.dnn[i];
            im = i;
        }
        if im == NO_NEIGHBOR || dmin > min_dist {
            break;
        }
        let jm = state.nn[im];

        // Merge jm into im.
        state.done[jm] = true;
        num -= 1;
        let merged_id = cluster[jm];
        let target_id = cluster[im];
        for id in cluster.iter_mut() {
            if *id == merged_id {
                *id = target_id;
            }
        }

        // Rewrite im's distances under the linkage rule. Rows of jm stay
        // behind unchanged; nothing reads a done row again.
        for i in 0..l {
            if state.done[i] || i == im {
                continue;
            }
            let d_new = link(
                mode,
                dist[tria_pos(im, i, l)],
                dist[tria_pos(jm, i, l)],
            );
            dist[tria_pos(i, im, l)] = d_new;
        }

        // Caches pointing at either merged index must rescan.
        for i in 0..l {
            if !state.done[i] && (state.nn[i] == im || state.nn[i] == jm) {
                state.invalid[i] = true;
            }
        }

        // im changed its whole column; rescan it against every live row.
        let (mut dmin, mut ii) = (f64::INFINITY, NO_NEIGHBOR);
        for i in 0..l {
            if state.done[i] || i == im || dist[tria_pos(im, i, l)] >= dmin {
                continue;
            }
            dmin = dist[tria_pos(im, i, l)];
            ii = i;
        }
        state.dnn[im] = dmin;
        state.nn[im] = ii;
        state.invalid[im] = false;
    }

    num
}

/// Clusters a prototype array and extrapolates the result to the full
/// input population.
///
/// Merging stops once the smallest cluster distance exceeds
/// `config.min_dist`. After extrapolation through the prototype
/// assignments, clusters with fewer than `config.reject_num` inputs are
/// rejected (id 0). `run` namespaces the generated cluster names across
/// incremental invocations.
pub fn cluster_linkage(
    protos: &FeatureArray,
    assign: &Assignment,
    config: &ClusterConfig,
    run: u32,
) -> Result<Clustering> {
    let l = protos.len();
    let mut cluster: Vec<u32> = (1..=l as u32).collect();
    let mut dist = array_dist_tria(protos)?;

    debug!(
        "clustering {} prototypes ({:?} linkage, min_dist {})",
        l, config.link_mode, config.min_dist
    );
    let mut num = murtagh(&mut cluster, &mut dist, config.min_dist, config.link_mode);

    // Prototype-level ids become input-level ids through the assignment.
    let extrapolated: Vec<u32> = assign
        .entries()
        .iter()
        .map(|entry| cluster[entry.proto])
        .collect();
    let mut result = Clustering {
        cluster: extrapolated,
        num,
        run,
    };

    // Reject clusters that cover too few inputs.
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for &id in &result.cluster {
        *counts.entry(id).or_insert(0) += 1;
    }
    let mut rejected_groups = 0usize;
    for (&id, &count) in &counts {
        if id != 0 && count < config.reject_num {
            rejected_groups += 1;
        }
    }
    if rejected_groups > 0 {
        for id in result.cluster.iter_mut() {
            if counts[id] < config.reject_num {
                *id = 0;
            }
        }
        num = num.saturating_sub(rejected_groups);
        result.num = num;
    }

    debug!("done, {} clusters", result.num);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Embedding, FeaturesConfig, PrototypeConfig};
    use crate::fvec::Extractor;
    use crate::prototype::{extract_prototypes, AssignEntry};

    fn array(data: &[&str]) -> FeatureArray {
        let config = FeaturesConfig {
            ngram_len: 2,
            ngram_delim: " ".to_string(),
            embedding: Embedding::L2,
            lookup_table: false,
        };
        let ex = Extractor::new(&config);
        let mut fa = FeatureArray::new(Some("test"));
        for s in data {
            fa.push(ex.extract(s.as_bytes(), None), "test");
        }
        fa
    }

    fn identity_assignment(fa: &FeatureArray) -> Assignment {
        // Every input stands for itself.
        let entries = (0..fa.len())
            .map(|i| AssignEntry {
                proto: i,
                label: fa.label_index(i),
                dist: 0.0,
                is_prototype: true,
            })
            .collect();
        Assignment::from_entries(entries)
    }

    #[test]
    fn zero_threshold_keeps_singletons() {
        let fa = array(&["AA BB AA", "CC DD CC", "EE FF EE"]);
        let assign = identity_assignment(&fa);
        let config = ClusterConfig {
            min_dist: 0.0,
            reject_num: 1,
            link_mode: LinkMode::Complete,
        };
        let c = cluster_linkage(&fa, &assign, &config, 1).unwrap();
        assert_eq!(c.num(), 3);
        let mut ids = c.ids().to_vec();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn trim_rejects_small_clusters() {
        let fa = array(&["AA BB AA", "CC DD CC", "EE FF EE"]);
        let assign = identity_assignment(&fa);
        let config = ClusterConfig {
            min_dist: 0.0,
            reject_num: 2,
            link_mode: LinkMode::Complete,
        };
        let c = cluster_linkage(&fa, &assign, &config, 1).unwrap();
        assert_eq!(c.num(), 0);
        assert!(c.ids().iter().all(|&id| id == 0));
        assert_eq!(c.name(0), "rejected");
    }

    #[test]
    fn merges_identical_points() {
        let fa = array(&["AA BB AA BB", "AA BB AA BB", "XX YY XX YY"]);
        let assign = identity_assignment(&fa);
        let config = ClusterConfig {
            min_dist: 0.5,
            reject_num: 1,
            link_mode: LinkMode::Single,
        };
        let c = cluster_linkage(&fa, &assign, &config, 1).unwrap();
        assert_eq!(c.num(), 2);
        assert_eq!(c.id(0), c.id(1));
        assert_ne!(c.id(0), c.id(2));
    }

    #[test]
    fn cluster_names_carry_the_run() {
        let fa = array(&["AA BB AA", "AA BB AA"]);
        let assign = identity_assignment(&fa);
        let config = ClusterConfig {
            min_dist: 0.5,
            reject_num: 1,
            link_mode: LinkMode::Average,
        };
        let c = cluster_linkage(&fa, &assign, &config, 7).unwrap();
        assert!(c.name(0).starts_with("clust-007-"));
    }

    #[test]
    fn empty_input_clusters_to_nothing() {
        let fa = FeatureArray::new(None);
        let assign = Assignment::default();
        let c =
            cluster_linkage(&fa, &assign, &ClusterConfig::default(), 1).unwrap();
        assert!(c.is_empty());
        assert_eq!(c.num(), 0);
    }

    #[test]
    fn select_prototypes_labels_by_cluster() {
        let fa = array(&["AA BB AA BB", "AA BB AA BB", "XX YY XX YY"]);
        let (protos, assign) = extract_prototypes(
            &fa,
            &PrototypeConfig {
                max_dist: 0.1,
                max_num: 0,
            },
        );
        let config = ClusterConfig {
            min_dist: 0.5,
            reject_num: 1,
            link_mode: LinkMode::Complete,
        };
        let c = cluster_linkage(&protos, &assign, &config, 1).unwrap();
        let named = c.select_prototypes(&assign, &protos);
        assert_eq!(named.len(), 2);
        assert!(named.label_name(0).starts_with("clust-001-"));

        let rejected = c.rejected_inputs(&fa);
        assert!(rejected.is_empty());
    }
}
