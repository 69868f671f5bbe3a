//! Dispersion and correlation metrics computed on rasters.
//!
//! Units which never fire are handled by definition rather than by numerical accident:
//! their Fano factor is one and their Pearson correlation with any other unit is zero.
//!
//! # Examples
//!
//! ```rust
//! use spike_analysis::metrics::{fano_factors, pearson};
//! use spike_analysis::raster::Raster;
//!
//! let raster = Raster::from_rows(&[vec![4u32, 0, 0, 0], vec![1, 0, 1, 0], vec![0, 0, 0, 0]]).unwrap();
//!
//! assert_eq!(fano_factors(&raster), vec![3.0, 0.5, 1.0]);
//!
//! let corr = pearson(&raster);
//! assert_eq!(corr[(2, 2)], 1.0);
//! assert_eq!(corr[(0, 2)], 0.0);
//! ```
use itertools::Itertools;
use nalgebra::DMatrix;

use crate::raster::{CountMatrix, Raster, SparseRaster};

/// Returns the Fano factor, i.e., the variance to mean ratio of the bin counts, of every unit.
///
/// If a unit doesn't fire, a Fano factor of 1 is returned: for events happening at a rate ε → 0,
/// either as a Bernoulli process or in the many-bins limit of a single event, the Fano factor converges to 1.
pub fn fano_factors<M: CountMatrix>(raster: &M) -> Vec<f64> {
    let num_bins = raster.num_bins();

    (0..raster.num_units())
        .map(|unit_id| {
            let (total, nnz) = raster
                .row_entries(unit_id)
                .fold((0u64, 0usize), |(total, nnz), (_, c)| (total + c as u64, nnz + 1));
            if total == 0 {
                return 1.0;
            }

            let mean = total as f64 / num_bins as f64;
            // The zero entries all contribute the same squared deviation.
            let sq_dev = raster
                .row_entries(unit_id)
                .map(|(_, c)| (c as f64 - mean).powi(2))
                .sum::<f64>()
                + (num_bins - nnz) as f64 * mean * mean;
            sq_dev / num_bins as f64 / mean
        })
        .collect()
}

/// Fill a correlation matrix from covariances and standard deviations, then force the diagonal to one.
fn correlation_matrix<F>(num_units: usize, sigmas: &[f64], cov: F) -> DMatrix<f64>
where
    F: Fn(usize, usize) -> f64,
{
    let mut corr = DMatrix::from_fn(num_units, num_units, |i, j| {
        cov(i, j) / (sigmas[i] * sigmas[j])
    });
    corr.fill_diagonal(1.0);
    corr
}

/// Returns the Pearson correlation matrix of the units of a dense raster.
///
/// Rows are centered before taking products, which is numerically stable but needs the whole raster in memory.
/// Units with zero variance are given an infinite standard deviation so that their correlation with any other unit is zero.
pub fn pearson(raster: &Raster) -> DMatrix<f64> {
    let num_units = raster.num_units();
    let num_bins = raster.num_bins();

    let mut centered = DMatrix::<f64>::zeros(num_units, num_bins);
    for (unit_id, row) in raster.rows().enumerate() {
        if num_bins == 0 {
            break;
        }
        let mean = row.iter().map(|&c| c as f64).sum::<f64>() / num_bins as f64;
        for (bin, &c) in row.iter().enumerate() {
            centered[(unit_id, bin)] = c as f64 - mean;
        }
    }

    // The common 1 / num_bins factor cancels out in the ratio.
    let cov = &centered * centered.transpose();
    let sigmas: Vec<f64> = (0..num_units)
        .map(|i| {
            let sigma = cov[(i, i)].sqrt();
            if sigma > 0.0 {
                sigma
            } else {
                f64::INFINITY
            }
        })
        .collect();

    correlation_matrix(num_units, &sigmas, |i, j| cov[(i, j)])
}

/// Returns the sum of the products of two sparse rows.
fn sparse_dot(a: (&[usize], &[u32]), b: (&[usize], &[u32])) -> f64 {
    let (cols_a, values_a) = a;
    let (cols_b, values_b) = b;
    let (mut i, mut j) = (0, 0);
    let mut dot = 0.0;
    while i < cols_a.len() && j < cols_b.len() {
        match cols_a[i].cmp(&cols_b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += values_a[i] as f64 * values_b[j] as f64;
                i += 1;
                j += 1;
            }
        }
    }
    dot
}

/// Returns the Pearson correlation matrix of the units of a sparse raster.
///
/// The correlation is computed as (E[xy] - E[x]E[y]) / (σx σy) without ever densifying the raster.
/// This formula can be numerically unstable, but only for bins far too large compared to the firing rates.
/// Units with zero variance are given an infinite standard deviation so that their correlation with any other unit is zero.
pub fn pearson_sparse(raster: &SparseRaster) -> DMatrix<f64> {
    let num_units = raster.num_units();
    if raster.num_bins() == 0 {
        return DMatrix::identity(num_units, num_units);
    }
    let num_bins = raster.num_bins() as f64;

    let ex: Vec<f64> = raster
        .row_sums()
        .iter()
        .map(|&total| total as f64 / num_bins)
        .collect();

    let sigmas: Vec<f64> = (0..num_units)
        .map(|i| {
            let ex2 = raster
                .row_entries(i)
                .map(|(_, c)| (c as f64).powi(2))
                .sum::<f64>()
                / num_bins;
            let var = ex2 - ex[i] * ex[i];
            if var > 0.0 {
                var.sqrt()
            } else {
                f64::INFINITY
            }
        })
        .collect();

    let mut exy = DMatrix::<f64>::zeros(num_units, num_units);
    for (i, j) in (0..num_units).tuple_combinations() {
        let e = sparse_dot(raster.row(i), raster.row(j)) / num_bins;
        exy[(i, j)] = e;
        exy[(j, i)] = e;
    }

    correlation_matrix(num_units, &sigmas, |i, j| exy[(i, j)] - ex[i] * ex[j])
}
