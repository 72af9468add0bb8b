//! malwise - behavioral malware-report analysis.
//!
//! The analytical core of a report-clustering system: behavioral reports
//! become sparse feature vectors in a hashed feature space; prototype
//! extraction picks canonical representatives; linkage clustering groups
//! them; nearest-prototype classification labels unseen reports; and a
//! quality evaluator scores any `(true, predicted)` labeling pair.
//!
//! The core is pure: all I/O happens through the stream-based
//! persistence functions, configuration arrives as a read-only snapshot,
//! and parallelism is data-parallel only.

pub mod classify;
pub mod cluster;
pub mod config;
pub mod errors;
pub mod farray;
pub mod fmath;
pub mod ftable;
pub mod fvec;
pub mod io;
pub mod prototype;
pub mod quality;
pub mod state;

pub use classify::{classify, rejected_queries};
pub use cluster::{cluster_linkage, Clustering};
pub use config::{AnalysisConfig, Embedding, LinkMode};
pub use errors::{AnalysisError, Result};
pub use farray::{FeatureArray, LabelTable};
pub use ftable::FeatureTable;
pub use fvec::{DelimiterSet, Extractor, FeatureKey, FeatureVector, Record};
pub use prototype::{extract_prototypes, AssignEntry, Assignment};
pub use quality::{quality, QualityReport};
pub use state::AnalysisState;
