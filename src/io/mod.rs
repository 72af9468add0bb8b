//! gzip-framed text persistence for vectors, arrays and feature tables.
//!
//! All formats are line-oriented text inside a gzip-compatible stream: a
//! header carrying the lengths, then one line per element. Weights are
//! printed in Rust's shortest round-trip notation, so saving and loading
//! reproduces them exactly. Feature bytes are escaped `%HH` outside the
//! plain ASCII range.

use std::io::{BufRead, BufReader, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use once_cell::sync::Lazy;

use crate::errors::{AnalysisError, Result};
use crate::farray::FeatureArray;
use crate::ftable::FeatureTable;
use crate::fvec::{FeatureKey, FeatureVector};

/// Placeholder for an absent source tag.
const NULL_SRC: &str = "(null)";

/// Bytes written verbatim by the feature-table codec; everything else,
/// including `%` itself and whitespace, becomes a `%HH` escape.
static PLAIN: Lazy<[bool; 256]> = Lazy::new(|| {
    let mut table = [false; 256];
    for b in 0x21..=0x7eu8 {
        table[b as usize] = true;
    }
    table[b'%' as usize] = false;
    table
});

fn invalid(what: &str) -> AnalysisError {
    AnalysisError::InvalidInput(what.to_string())
}

fn read_line(r: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    if r.read_line(&mut line)? == 0 {
        return Err(invalid("truncated stream"));
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

/// Extracts a numeric `key=value` field from a comma-separated header.
fn numeric_field(header: &str, key: &str) -> Result<u64> {
    for part in header.split(", ") {
        if let Some(value) = part.strip_prefix(key).and_then(|p| p.strip_prefix('=')) {
            return value
                .parse()
                .map_err(|_| invalid(&format!("malformed '{}' field", key)));
        }
    }
    Err(invalid(&format!("missing '{}' field", key)))
}

/// Extracts the source tag: everything after `src=`, `(null)` for none.
fn src_field(header: &str) -> Result<Option<String>> {
    let (_, src) = header
        .split_once("src=")
        .ok_or_else(|| invalid("missing 'src' field"))?;
    if src == NULL_SRC {
        Ok(None)
    } else {
        Ok(Some(src.to_string()))
    }
}

pub(crate) fn write_vector(w: &mut impl Write, fv: &FeatureVector) -> Result<()> {
    writeln!(
        w,
        "feature vector: len={}, total={}, mem={}, src={}",
        fv.len(),
        fv.total(),
        fv.mem(),
        fv.src().unwrap_or(NULL_SRC)
    )?;
    for (key, weight) in fv.iter() {
        writeln!(w, "  {:016x}:{}", key, weight)?;
    }
    Ok(())
}

pub(crate) fn read_vector(r: &mut impl BufRead) -> Result<FeatureVector> {
    let header = read_line(r)?;
    let header = header
        .strip_prefix("feature vector: ")
        .ok_or_else(|| invalid("malformed feature vector header"))?;
    let len = numeric_field(header, "len")? as usize;
    let total = numeric_field(header, "total")? as usize;
    let src = src_field(header)?;

    let mut dim = Vec::with_capacity(len);
    let mut val = Vec::with_capacity(len);
    for _ in 0..len {
        let line = read_line(r)?;
        let (key, weight) = line
            .trim_start()
            .split_once(':')
            .ok_or_else(|| invalid("malformed feature vector entry"))?;
        let key = FeatureKey::from_str_radix(key, 16)
            .map_err(|_| invalid("malformed feature key"))?;
        let weight: f64 = weight
            .parse()
            .map_err(|_| invalid("malformed feature weight"))?;
        if let Some(&last) = dim.last() {
            if key <= last {
                return Err(invalid("feature keys out of order"));
            }
        }
        dim.push(key);
        val.push(weight);
    }
    Ok(FeatureVector::from_parts(dim, val, total, src))
}

pub(crate) fn write_array(w: &mut impl Write, fa: &FeatureArray) -> Result<()> {
    writeln!(
        w,
        "feature array: len={}, labels={}, mem={}, src={}",
        fa.len(),
        fa.label_table().len(),
        fa.mem(),
        fa.src().unwrap_or(NULL_SRC)
    )?;
    for i in 0..fa.len() {
        write_vector(w, fa.get(i))?;
        writeln!(w, "  label={}", fa.label_name(i))?;
    }
    Ok(())
}

pub(crate) fn read_array(r: &mut impl BufRead) -> Result<FeatureArray> {
    let header = read_line(r)?;
    let header = header
        .strip_prefix("feature array: ")
        .ok_or_else(|| invalid("malformed feature array header"))?;
    let len = numeric_field(header, "len")? as usize;
    let src = src_field(header)?;

    let mut fa = FeatureArray::new(src.as_deref());
    for _ in 0..len {
        let fv = read_vector(r)?;
        let line = read_line(r)?;
        let label = line
            .trim_start()
            .strip_prefix("label=")
            .ok_or_else(|| invalid("missing label line"))?;
        fa.push(fv, label);
    }
    Ok(fa)
}

/// Saves a single feature vector to a gzip-framed stream.
pub fn save_vector<W: Write>(fv: &FeatureVector, w: W) -> Result<()> {
    let mut enc = GzEncoder::new(w, Compression::default());
    write_vector(&mut enc, fv)?;
    enc.finish()?;
    Ok(())
}

/// Loads a single feature vector from a gzip-framed stream.
pub fn load_vector<R: Read>(r: R) -> Result<FeatureVector> {
    let mut reader = BufReader::new(GzDecoder::new(r));
    read_vector(&mut reader)
}

/// Saves a feature array, including labels, to a gzip-framed stream.
pub fn save_array<W: Write>(fa: &FeatureArray, w: W) -> Result<()> {
    let mut enc = GzEncoder::new(w, Compression::default());
    write_array(&mut enc, fa)?;
    enc.finish()?;
    Ok(())
}

/// Loads a feature array from a gzip-framed stream.
pub fn load_array<R: Read>(r: R) -> Result<FeatureArray> {
    let mut reader = BufReader::new(GzDecoder::new(r));
    read_array(&mut reader)
}

/// Escapes feature bytes for persistence and display: plain ASCII stays
/// verbatim, everything else becomes `%HH`.
pub(crate) fn escape_bytes(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &b in data {
        if PLAIN[b as usize] {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02x}", b));
        }
    }
    out
}

fn decode_bytes(s: &str) -> Result<Vec<u8>> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        if i + 2 >= bytes.len() {
            return Err(invalid("truncated byte escape"));
        }
        let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
            .map_err(|_| invalid("malformed byte escape"))?;
        let b = u8::from_str_radix(hex, 16).map_err(|_| invalid("malformed byte escape"))?;
        out.push(b);
        i += 3;
    }
    Ok(out)
}

/// Saves a feature table to a gzip-framed stream, entries ordered by key.
pub fn save_table<W: Write>(table: &FeatureTable, w: W) -> Result<()> {
    let mut enc = GzEncoder::new(w, Compression::default());
    let entries = table.entries_sorted();
    writeln!(enc, "feature table: len={}", entries.len())?;
    for (key, data) in entries {
        writeln!(enc, "  {:016x}: {}", key, escape_bytes(&data))?;
    }
    enc.finish()?;
    Ok(())
}

/// Loads a feature table from a gzip-framed stream.
pub fn load_table<R: Read>(r: R) -> Result<FeatureTable> {
    let mut reader = BufReader::new(GzDecoder::new(r));
    let header = read_line(&mut reader)?;
    let header = header
        .strip_prefix("feature table: ")
        .ok_or_else(|| invalid("malformed feature table header"))?;
    let len = numeric_field(header, "len")? as usize;

    let table = FeatureTable::new();
    let mut batch = Vec::with_capacity(len);
    for _ in 0..len {
        let line = read_line(&mut reader)?;
        let (key, encoded) = line
            .trim_start()
            .split_once(": ")
            .ok_or_else(|| invalid("malformed feature table entry"))?;
        let key = FeatureKey::from_str_radix(key, 16)
            .map_err(|_| invalid("malformed feature key"))?;
        batch.push((key, decode_bytes(encoded)?));
    }
    table.put_all(batch);
    Ok(table)
}
