//! Configuration snapshot consumed by the analysis core.
//!
//! The snapshot is plain data: it is read-only after construction and is
//! passed explicitly to the operations that need it. Collaborators own the
//! business of reading configuration files; this module only deserializes
//! a snapshot and validates it.

use serde::{Deserialize, Serialize};

use crate::errors::{AnalysisError, Result};

/// Weight transformation applied after feature counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Embedding {
    /// All weights set to 1.
    Bin,
    /// Weights divided by the L1 norm.
    L1,
    /// Weights divided by the L2 norm.
    L2,
}

impl std::str::FromStr for Embedding {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bin" => Ok(Embedding::Bin),
            "l1" => Ok(Embedding::L1),
            "l2" => Ok(Embedding::L2),
            other => Err(AnalysisError::InvalidConfig(format!(
                "unknown embedding '{}'",
                other
            ))),
        }
    }
}

/// Linkage rule for the distance between two clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Minimum of member distances.
    Single,
    /// Mean of member distances.
    Average,
    /// Maximum of member distances.
    Complete,
}

impl std::str::FromStr for LinkMode {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(LinkMode::Single),
            "average" => Ok(LinkMode::Average),
            "complete" => Ok(LinkMode::Complete),
            other => Err(AnalysisError::InvalidConfig(format!(
                "unknown link mode '{}'",
                other
            ))),
        }
    }
}

/// `input.*` section. The core ignores the format; it is carried so a
/// snapshot round-trips through collaborators unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub format: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            format: "raw".to_string(),
        }
    }
}

/// `features.*` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// n in n-gram; number of bytes or delimited words per feature.
    pub ngram_len: usize,
    /// Delimiter set with `%HH` escapes; empty selects byte n-grams.
    pub ngram_delim: String,
    /// Weight transformation.
    pub embedding: Embedding,
    /// Enable the inverse feature lookup table.
    pub lookup_table: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            ngram_len: 2,
            ngram_delim: "%20%0a%0d".to_string(),
            embedding: Embedding::Bin,
            lookup_table: false,
        }
    }
}

/// `prototypes.*` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrototypeConfig {
    /// Coverage radius; extraction stops once every input lies within.
    pub max_dist: f64,
    /// Hard cap on the number of prototypes; 0 means unlimited.
    pub max_num: usize,
}

impl Default for PrototypeConfig {
    fn default() -> Self {
        Self {
            max_dist: 0.65,
            max_num: 0,
        }
    }
}

/// `cluster.*` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Merging stops once the smallest cluster distance exceeds this.
    pub min_dist: f64,
    /// Clusters smaller than this are rejected after extrapolation.
    pub reject_num: usize,
    pub link_mode: LinkMode,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_dist: 0.95,
            reject_num: 10,
            link_mode: LinkMode::Complete,
        }
    }
}

/// `classify.*` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Queries farther than this from every prototype are rejected.
    pub max_dist: f64,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self { max_dist: 0.68 }
    }
}

/// Full configuration snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub input: InputConfig,
    pub features: FeaturesConfig,
    pub prototypes: PrototypeConfig,
    pub cluster: ClusterConfig,
    pub classify: ClassifyConfig,
}

impl AnalysisConfig {
    /// Deserializes a snapshot from JSON. Missing sections and keys take
    /// their defaults; the result is validated before being returned.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(s)
            .map_err(|e| AnalysisError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks range constraints on all sections.
    pub fn validate(&self) -> Result<()> {
        validate_min(self.features.ngram_len as f64, 1.0, "features.ngram_len")?;
        validate_finite(self.prototypes.max_dist, "prototypes.max_dist")?;
        validate_min(self.prototypes.max_dist, 0.0, "prototypes.max_dist")?;
        validate_finite(self.cluster.min_dist, "cluster.min_dist")?;
        validate_min(self.cluster.min_dist, 0.0, "cluster.min_dist")?;
        validate_min(self.cluster.reject_num as f64, 1.0, "cluster.reject_num")?;
        validate_finite(self.classify.max_dist, "classify.max_dist")?;
        validate_min(self.classify.max_dist, 0.0, "classify.max_dist")?;
        Ok(())
    }
}

fn validate_min(value: f64, min: f64, name: &str) -> Result<()> {
    if value < min {
        return Err(AnalysisError::InvalidConfig(format!(
            "'{}' must be at least {}, got {}",
            name, min, value
        )));
    }
    Ok(())
}

fn validate_finite(value: f64, name: &str) -> Result<()> {
    if !value.is_finite() {
        return Err(AnalysisError::InvalidConfig(format!(
            "'{}' must be finite, got {}",
            name, value
        )));
    }
    Ok(())
}
