//! Internal state carried across incremental analysis runs.
//!
//! The state remembers how many runs have been issued, the prototypes
//! accumulated so far and the vectors every run rejected. Persisting it
//! between invocations keeps cluster names globally unique and lets a new
//! batch of reports be analyzed against the prototypes of earlier ones.

use std::io::{BufRead, BufReader, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::errors::{AnalysisError, Result};
use crate::farray::FeatureArray;
use crate::io::{read_array, write_array};

/// Run counter plus accumulated prototype and rejected arrays.
#[derive(Debug, Default)]
pub struct AnalysisState {
    run: u32,
    prototypes: FeatureArray,
    rejected: FeatureArray,
}

impl AnalysisState {
    /// An empty state: run 0, no prototypes, no rejected vectors.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(&self) -> u32 {
        self.run
    }

    pub fn num_proto(&self) -> usize {
        self.prototypes.len()
    }

    pub fn num_reject(&self) -> usize {
        self.rejected.len()
    }

    pub fn prototypes(&self) -> &FeatureArray {
        &self.prototypes
    }

    pub fn rejected(&self) -> &FeatureArray {
        &self.rejected
    }

    /// Issues the run number for the next incremental invocation.
    pub fn next_run(&mut self) -> u32 {
        self.run += 1;
        self.run
    }

    /// Replaces the accumulated arrays after a completed run.
    pub fn record(&mut self, prototypes: FeatureArray, rejected: FeatureArray) {
        self.prototypes = prototypes;
        self.rejected = rejected;
    }

    /// Merges a run's leftovers into the accumulated arrays instead of
    /// replacing them.
    pub fn accumulate(&mut self, prototypes: FeatureArray, rejected: FeatureArray) {
        self.prototypes.merge(prototypes);
        self.rejected.merge(rejected);
    }

    /// Writes the state to a gzip-framed stream.
    pub fn save<W: Write>(&self, w: W) -> Result<()> {
        let mut enc = GzEncoder::new(w, Compression::default());
        writeln!(
            enc,
            "state: run={}, protos={}, rejects={}",
            self.run,
            self.prototypes.len(),
            self.rejected.len()
        )?;
        write_array(&mut enc, &self.prototypes)?;
        write_array(&mut enc, &self.rejected)?;
        enc.finish()?;
        Ok(())
    }

    /// Restores a state from a gzip-framed stream.
    pub fn load<R: Read>(r: R) -> Result<Self> {
        let mut reader = BufReader::new(GzDecoder::new(r));
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 {
            return Err(AnalysisError::InvalidInput("truncated stream".to_string()));
        }
        let run = header
            .trim_end()
            .strip_prefix("state: run=")
            .and_then(|rest| rest.split(',').next())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| {
                AnalysisError::InvalidInput("malformed state header".to_string())
            })?;
        let prototypes = read_array(&mut reader)?;
        let rejected = read_array(&mut reader)?;
        Ok(Self {
            run,
            prototypes,
            rejected,
        })
    }
}
