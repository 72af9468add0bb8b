//! Feature extraction from byte sequences.
//!
//! Two tokenizations are supported: sliding byte n-grams, and n-grams of
//! delimiter-separated words. Every token is digested to a 64-bit key;
//! the resulting vector is sorted, condensed and normalized in one pass.

use crate::config::FeaturesConfig;
use crate::errors::{AnalysisError, Result};
use crate::ftable::FeatureTable;

use super::{FeatureKey, FeatureVector, Record};

/// Digest a token to its 64-bit feature key (truncated MD5).
pub(crate) fn feature_key(token: &[u8]) -> FeatureKey {
    let digest = md5::compute(token);
    u64::from_le_bytes(digest.0[..8].try_into().unwrap())
}

/// Set of delimiter bytes decoded from a specification string.
///
/// The specification contains literal bytes and `%HH` hex escapes. Runs of
/// delimiter bytes in an input are collapsed to the canonical delimiter,
/// the lowest byte value in the set. The set is a plain value owned by its
/// extractor; callers that change the specification simply build a new one.
#[derive(Debug, Clone)]
pub struct DelimiterSet {
    mask: [bool; 256],
    canonical: u8,
}

impl DelimiterSet {
    /// Decodes a delimiter specification. Returns `None` for an empty
    /// specification, which selects byte n-grams instead.
    pub fn from_spec(spec: &str) -> Option<Self> {
        if spec.is_empty() {
            return None;
        }
        let mut mask = [false; 256];
        let bytes = spec.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] != b'%' {
                mask[bytes[i] as usize] = true;
                i += 1;
                continue;
            }
            // Truncated escape at the end of the specification.
            if i + 2 >= bytes.len() {
                break;
            }
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                mask[b as usize] = true;
            }
            i += 3;
        }
        let canonical = (0..=255u8).find(|&b| mask[b as usize])?;
        Some(Self { mask, canonical })
    }

    pub fn contains(&self, b: u8) -> bool {
        self.mask[b as usize]
    }

    /// The byte that stands in for any delimiter run.
    pub fn canonical(&self) -> u8 {
        self.canonical
    }

    /// Collapses delimiter runs to single canonical delimiters and strips
    /// leading ones, returning the compressed sequence plus the byte
    /// ranges of its words.
    fn compress(&self, data: &[u8]) -> (Vec<u8>, Vec<(usize, usize)>) {
        let mut out = Vec::with_capacity(data.len());
        let mut words = Vec::new();
        let mut start = None;
        for &b in data {
            if self.contains(b) {
                if let Some(s) = start.take() {
                    words.push((s, out.len()));
                    out.push(self.canonical);
                }
            } else {
                if start.is_none() {
                    start = Some(out.len());
                }
                out.push(b);
            }
        }
        if let Some(s) = start {
            words.push((s, out.len()));
        }
        (out, words)
    }
}

/// Extraction context: configuration, decoded delimiters and an optional
/// feature lookup table.
///
/// Extraction itself is lock-free; when a table is attached, tokens are
/// staged in a per-call cache and flushed in one batch afterwards, so
/// concurrent extractors contend on the table lock only once per vector.
pub struct Extractor<'a> {
    config: &'a FeaturesConfig,
    delims: Option<DelimiterSet>,
    table: Option<&'a FeatureTable>,
}

impl<'a> Extractor<'a> {
    pub fn new(config: &'a FeaturesConfig) -> Self {
        Self {
            config,
            delims: DelimiterSet::from_spec(&config.ngram_delim),
            table: None,
        }
    }

    /// Attaches a feature table; extracted tokens are recorded for
    /// inverse lookup.
    pub fn with_table(mut self, table: &'a FeatureTable) -> Self {
        self.table = Some(table);
        self
    }

    /// Extracts a feature vector from a byte sequence. An empty sequence
    /// yields a valid zero-length vector.
    pub fn extract(&self, data: &[u8], src: Option<&str>) -> FeatureVector {
        let mut fv = FeatureVector {
            dim: Vec::new(),
            val: Vec::new(),
            total: 0,
            src: src.map(str::to_owned),
        };
        if data.is_empty() {
            return fv;
        }

        let mut cache: Option<Vec<(FeatureKey, Vec<u8>)>> =
            self.table.map(|_| Vec::with_capacity(data.len() / 2));

        match &self.delims {
            None => self.byte_grams(data, &mut fv.dim, &mut cache),
            Some(delims) => self.word_grams(data, delims, &mut fv.dim, &mut cache),
        }

        // Raw weights are all 1; sorting the keys alone keeps the pairs
        // consistent.
        fv.dim.sort_unstable();
        fv.val = vec![1.0; fv.dim.len()];
        fv.condense();
        fv.normalize(self.config.embedding);

        if let (Some(table), Some(cache)) = (self.table, cache) {
            table.put_all(cache);
        }
        fv
    }

    /// Record-level extraction; an empty result is reported as
    /// [`AnalysisError::EmptyFeatureVector`] so batch extractors can warn
    /// and skip.
    pub fn extract_record(&self, record: &Record) -> Result<FeatureVector> {
        let fv = self.extract(&record.data, record.src.as_deref());
        if fv.is_empty() {
            return Err(AnalysisError::EmptyFeatureVector(
                record.src.clone().unwrap_or_else(|| "<unnamed>".to_string()),
            ));
        }
        Ok(fv)
    }

    fn byte_grams(
        &self,
        data: &[u8],
        dim: &mut Vec<FeatureKey>,
        cache: &mut Option<Vec<(FeatureKey, Vec<u8>)>>,
    ) {
        let n = self.config.ngram_len;
        if data.len() < n {
            return;
        }
        for gram in data.windows(n) {
            let key = feature_key(gram);
            dim.push(key);
            if let Some(cache) = cache {
                cache.push((key, gram.to_vec()));
            }
        }
    }

    fn word_grams(
        &self,
        data: &[u8],
        delims: &DelimiterSet,
        dim: &mut Vec<FeatureKey>,
        cache: &mut Option<Vec<(FeatureKey, Vec<u8>)>>,
    ) {
        let n = self.config.ngram_len;
        let (compressed, words) = delims.compress(data);
        if words.len() < n {
            return;
        }
        for w in 0..=(words.len() - n) {
            let gram = &compressed[words[w].0..words[w + n - 1].1];
            let key = feature_key(gram);
            dim.push(key);
            if let Some(cache) = cache {
                cache.push((key, gram.to_vec()));
            }
        }
    }
}
