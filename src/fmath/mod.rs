//! Math over sparse feature vectors and arrays of them.
//!
//! Only operations with (near-)linear processing are provided: dot
//! products, structural merges for addition, norms, and the batched
//! distance matrices the analysis stages are built on. Matrix routines
//! are row-parallel.

use rayon::prelude::*;

use crate::errors::{AnalysisError, Result};
use crate::farray::FeatureArray;
use crate::fvec::{FeatureVector, SPARSE_EPSILON};

/// Coefficients below this magnitude are skipped in linear combinations.
const COEFF_EPSILON: f64 = 1e-8;

/// L1 norm: sum of weight magnitudes.
pub fn norm1(f: &FeatureVector) -> f64 {
    f.weights().iter().map(|v| v.abs()).sum()
}

/// L2 norm: Euclidean length.
pub fn norm2(f: &FeatureVector) -> f64 {
    f.weights().iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Scales every weight in place (`f = s * f`).
pub fn scale(f: &mut FeatureVector, s: f64) {
    for v in &mut f.val {
        *v *= s;
    }
}

/// Drops dimensions whose weight magnitude falls below 1e-9, in place.
pub fn sparsify(f: &mut FeatureVector) {
    let mut out = 0usize;
    for i in 0..f.dim.len() {
        if f.val[i].abs() < SPARSE_EPSILON {
            continue;
        }
        f.dim[out] = f.dim[i];
        f.val[out] = f.val[i];
        out += 1;
    }
    if out == f.dim.len() {
        return;
    }
    f.dim.truncate(out);
    f.val.truncate(out);
    f.dim.shrink_to_fit();
    f.val.shrink_to_fit();
}

/// Dot product walking both key lists in lockstep, O(|a| + |b|).
fn dot_merge(a: &FeatureVector, b: &FeatureVector) -> f64 {
    let mut s = 0.0;
    let (mut i, mut j) = (0usize, 0usize);
    while i < a.len() && j < b.len() {
        if a.dim[i] > b.dim[j] {
            j += 1;
        } else if a.dim[i] < b.dim[j] {
            i += 1;
        } else {
            s += a.val[i] * b.val[j];
            i += 1;
            j += 1;
        }
    }
    s
}

/// Dot product iterating the shorter vector and binary-searching the
/// longer, O(|b| log |a|). The search window shrinks as matches advance.
fn dot_bsearch(a: &FeatureVector, b: &FeatureVector) -> f64 {
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut s = 0.0;
    let mut lo = 0usize;
    for (key, v) in short.iter() {
        match long.dim[lo..].binary_search(&key) {
            Ok(pos) => {
                s += long.val[lo + pos] * v;
                lo += pos + 1;
            }
            Err(pos) => lo += pos,
        }
        if lo >= long.len() {
            break;
        }
    }
    s
}

/// Dot product (`s = <a, b>`). Picks the merge walk or the binary-search
/// loop depending on the vector sizes; both compute the same value modulo
/// floating-point summation order.
pub fn dot(a: &FeatureVector, b: &FeatureVector) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (la, lb) = (a.len().max(b.len()) as f64, a.len().min(b.len()) as f64);
    if la + lb > (lb * la.log2()).ceil() {
        dot_bsearch(a, b)
    } else {
        dot_merge(a, b)
    }
}

/// Euclidean distance in embedding space, valid for any normalization.
pub fn dist(a: &FeatureVector, b: &FeatureVector) -> f64 {
    let na = norm2(a);
    let nb = norm2(b);
    (na * na + nb * nb - 2.0 * dot(a, b)).max(0.0).sqrt()
}

/// Scaled addition producing a new vector (`c = a + s * b`). A linear
/// merge over both key lists; keys stay ascending and the output length
/// is at most `|a| + |b|`.
pub fn adds(a: &FeatureVector, b: &FeatureVector, s: f64) -> FeatureVector {
    let mut dim = Vec::with_capacity(a.len() + b.len());
    let mut val = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0usize, 0usize);
    while i < a.len() && j < b.len() {
        if a.dim[i] > b.dim[j] {
            dim.push(b.dim[j]);
            val.push(b.val[j] * s);
            j += 1;
        } else if a.dim[i] < b.dim[j] {
            dim.push(a.dim[i]);
            val.push(a.val[i]);
            i += 1;
        } else {
            dim.push(a.dim[i]);
            val.push(a.val[i] + b.val[j] * s);
            i += 1;
            j += 1;
        }
    }
    while j < b.len() {
        dim.push(b.dim[j]);
        val.push(b.val[j] * s);
        j += 1;
    }
    while i < a.len() {
        dim.push(a.dim[i]);
        val.push(a.val[i]);
        i += 1;
    }
    dim.shrink_to_fit();
    val.shrink_to_fit();
    let total = a.total() + b.total();
    FeatureVector::from_parts(dim, val, total, None)
}

/// `c = a + b`.
pub fn add(a: &FeatureVector, b: &FeatureVector) -> FeatureVector {
    adds(a, b, 1.0)
}

/// `c = a - b`.
pub fn sub(a: &FeatureVector, b: &FeatureVector) -> FeatureVector {
    adds(a, b, -1.0)
}

/// Linear combination of an array (`f = Σ s_i * x_i`), folding with
/// scaled addition and skipping negligible coefficients.
pub fn sums(fa: &FeatureArray, coeffs: &[f64]) -> FeatureVector {
    assert_eq!(fa.len(), coeffs.len());
    let mut f = FeatureVector::zero();
    for (x, &s) in fa.vectors().iter().zip(coeffs) {
        if s.abs() < COEFF_EPSILON {
            continue;
        }
        f = adds(&f, x, s);
    }
    f
}

/// Sum of all vectors in an array.
pub fn sum(fa: &FeatureArray) -> FeatureVector {
    sums(fa, &vec![1.0; fa.len()])
}

/// Mean vector of an array.
pub fn mean(fa: &FeatureArray) -> FeatureVector {
    if fa.is_empty() {
        return FeatureVector::zero();
    }
    sums(fa, &vec![1.0 / fa.len() as f64; fa.len()])
}

fn matrix_len(rows: usize, cols: usize) -> Result<usize> {
    rows.checked_mul(cols).ok_or_else(|| {
        AnalysisError::OutOfMemory(format!("{}x{} matrix exceeds address space", rows, cols))
    })
}

/// Dot products between all pairs of vectors in two arrays, row-major
/// `|a| x |b|`. When both arguments are the same array only the upper
/// triangle is computed and mirrored. Rows are computed in parallel.
pub fn array_dot(a: &FeatureArray, b: &FeatureArray) -> Result<Vec<f64>> {
    let (n, m) = (a.len(), b.len());
    let mut d = vec![0.0; matrix_len(n, m)?];
    if n == 0 || m == 0 {
        return Ok(d);
    }
    if std::ptr::eq(a, b) {
        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| {
                (i..m)
                    .map(|j| dot(&a.vectors()[i], &b.vectors()[j]))
                    .collect()
            })
            .collect();
        for (i, row) in rows.iter().enumerate() {
            for (k, &v) in row.iter().enumerate() {
                let j = i + k;
                d[i * m + j] = v;
                d[j * m + i] = v;
            }
        }
    } else {
        d.par_chunks_mut(m).enumerate().for_each(|(i, row)| {
            for (j, slot) in row.iter_mut().enumerate() {
                *slot = dot(&a.vectors()[i], &b.vectors()[j]);
            }
        });
    }
    Ok(d)
}

/// Euclidean distance matrix between two arrays, row-major `|a| x |b|`,
/// derived from the dot matrix and the vector norms.
pub fn array_dist(a: &FeatureArray, b: &FeatureArray) -> Result<Vec<f64>> {
    let mut d = array_dot(a, b)?;
    if d.is_empty() {
        return Ok(d);
    }
    let na: Vec<f64> = a.vectors().par_iter().map(norm2).collect();
    let nb: Vec<f64> = if std::ptr::eq(a, b) {
        na.clone()
    } else {
        b.vectors().par_iter().map(norm2).collect()
    };
    d.par_chunks_mut(b.len()).enumerate().for_each(|(i, row)| {
        for (j, v) in row.iter_mut().enumerate() {
            *v = (na[i] * na[i] + nb[j] * nb[j] - 2.0 * *v).max(0.0).sqrt();
        }
    });
    Ok(d)
}

/// Position of `(i, j)` in a strictly-upper-triangular matrix of side
/// `n`, with `(i, j)` and `(j, i)` mapping to the same slot.
pub fn tria_pos(i: usize, j: usize, n: usize) -> usize {
    debug_assert!(i < n && j < n && i != j);
    let (i, j) = if i < j { (i, j) } else { (j, i) };
    i * n - i * (i + 1) / 2 + j - i - 1
}

/// Number of slots in a strictly-upper-triangular matrix of side `n`.
pub fn tria_size(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// Pairwise Euclidean distances within one array in triangular storage,
/// indexed by [`tria_pos`]. Rows are computed in parallel.
pub fn array_dist_tria(a: &FeatureArray) -> Result<Vec<f64>> {
    let n = a.len();
    let mut d = vec![0.0; tria_size(n)];
    if n < 2 {
        return Ok(d);
    }
    let norms: Vec<f64> = a.vectors().par_iter().map(norm2).collect();

    // The triangular layout keeps each row contiguous.
    let mut rows: Vec<&mut [f64]> = Vec::with_capacity(n - 1);
    let mut rest = d.as_mut_slice();
    for i in 0..n - 1 {
        let (row, tail) = rest.split_at_mut(n - 1 - i);
        rows.push(row);
        rest = tail;
    }
    rows.into_par_iter().enumerate().for_each(|(i, row)| {
        for (k, slot) in row.iter_mut().enumerate() {
            let j = i + 1 + k;
            let dp = dot(&a.vectors()[i], &a.vectors()[j]);
            *slot = (norms[i] * norms[i] + norms[j] * norms[j] - 2.0 * dp)
                .max(0.0)
                .sqrt();
        }
    });
    Ok(d)
}
