//! Spike Time Tiling Coefficient (STTC), a pairwise synchrony metric.
//!
//! For two trains A and B observed over a recording of a given length, with a synchrony window `delt`:
//! - `T_A` is the fraction of the recording lying within `delt` of a spike of A,
//! - `P_A` is the fraction of spikes of A lying within `delt` of a spike of B,
//!
//! and the coefficient is `0.5 * [(P_A - T_B) / (1 - P_A T_B) + (P_B - T_A) / (1 - P_B T_A)]`.
//! A term whose denominator vanishes contributes zero, and a pair involving an empty train has a coefficient of zero.
//!
//! See Cutts & Eglen, Detecting pairwise correlations in spike trains: an objective comparison of methods and
//! application to the study of retinal waves, J Neurosci 34:43, 14288–14303 (2014).
//!
//! # Examples
//!
//! ```rust
//! use spike_analysis::spike_train::SpikeTrainStore;
//!
//! let store = SpikeTrainStore::from_trains(&[vec![10.0, 20.0, 30.0], vec![], vec![10.5, 29.0]], Some(100.0)).unwrap();
//! let tilings = store.spike_time_tilings(2.0).unwrap();
//!
//! assert_eq!(tilings[(1, 1)], 1.0);
//! assert_eq!(tilings[(0, 1)], 0.0);
//! assert!(tilings[(0, 2)] > 0.0);
//! ```
use itertools::Itertools;
use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::error::AnalysisError;
use crate::spike_train::SpikeTrainStore;
use crate::MIN_PARALLEL_UNITS;

fn check_window(delt: f64, length: f64) -> Result<(), AnalysisError> {
    if !(delt.is_finite() && delt >= 0.0) {
        return Err(AnalysisError::InvalidInput(format!(
            "the synchrony window must be non-negative and finite, got {}",
            delt
        )));
    }
    if !(length.is_finite() && length > 0.0) {
        return Err(AnalysisError::InvalidInput(format!(
            "the recording length must be positive, got {}",
            length
        )));
    }
    Ok(())
}

/// Returns the total amount of time within `delt` of a spike of the (sorted) train, clipped to [0, length].
pub fn tiling_time(train: &[f64], delt: f64, length: f64) -> f64 {
    match (train.first(), train.last()) {
        (Some(&first), Some(&last)) => {
            delt.min(first)
                + delt.min(length - last)
                + train
                    .windows(2)
                    .map(|w| (w[1] - w[0]).min(2.0 * delt))
                    .sum::<f64>()
        }
        _ => 0.0,
    }
}

/// Returns the number of spikes of the (sorted) train A lying within `delt` of a spike of the (sorted) train B.
pub fn num_tiled_spikes(train_a: &[f64], train_b: &[f64], delt: f64) -> usize {
    if train_b.is_empty() {
        return 0;
    }
    train_a
        .iter()
        .filter(|&&t| {
            // Closest spikes of B on either side of t.
            let pos = train_b.partition_point(|&s| s < t);
            let after = train_b.get(pos).map(|&s| s - t);
            let before = pos.checked_sub(1).map(|p| t - train_b[p]);
            after.into_iter().chain(before).any(|dt| dt <= delt)
        })
        .count()
}

/// Returns the spike time tiling coefficient of two sorted trains observed over `[0, length]`.
///
/// The coefficient is zero if any of the two trains is empty.
pub fn sttc(train_a: &[f64], train_b: &[f64], delt: f64, length: f64) -> Result<f64, AnalysisError> {
    check_window(delt, length)?;
    Ok(sttc_unchecked(train_a, train_b, delt, length))
}

fn sttc_unchecked(train_a: &[f64], train_b: &[f64], delt: f64, length: f64) -> f64 {
    if train_a.is_empty() || train_b.is_empty() {
        return 0.0;
    }

    let ta = tiling_time(train_a, delt, length) / length;
    let tb = tiling_time(train_b, delt, length) / length;

    let pa = num_tiled_spikes(train_a, train_b, delt) as f64 / train_a.len() as f64;
    let pb = num_tiled_spikes(train_b, train_a, delt) as f64 / train_b.len() as f64;

    let term = |p: f64, t: f64| {
        if p * t == 1.0 {
            0.0
        } else {
            (p - t) / (1.0 - p * t)
        }
    };
    0.5 * (term(pa, tb) + term(pb, ta))
}

impl SpikeTrainStore {
    /// Returns the spike time tiling coefficient between the units `i` and `j`.
    pub fn spike_time_tiling(&self, i: usize, j: usize, delt: f64) -> Result<f64, AnalysisError> {
        let train_a = self
            .train(i)
            .ok_or_else(|| AnalysisError::OutOfBounds(format!("unit {} not found", i)))?;
        let train_b = self
            .train(j)
            .ok_or_else(|| AnalysisError::OutOfBounds(format!("unit {} not found", j)))?;
        sttc(train_a, train_b, delt, self.length())
    }

    /// Returns the symmetric matrix of spike time tiling coefficients between all pairs of units.
    /// The diagonal is one by definition.
    pub fn spike_time_tilings(&self, delt: f64) -> Result<DMatrix<f64>, AnalysisError> {
        check_window(delt, self.length())?;

        let num_units = self.num_units();
        let pairs: Vec<(usize, usize)> = (0..num_units).tuple_combinations().collect();
        log::debug!(
            "Computing the spike time tilings of {} pairs of units (delt={})",
            pairs.len(),
            delt
        );

        let coefficient =
            |&(i, j): &(usize, usize)| sttc_unchecked(&self.trains()[i], &self.trains()[j], delt, self.length());
        let values: Vec<f64> = if num_units >= MIN_PARALLEL_UNITS {
            pairs.par_iter().map(coefficient).collect()
        } else {
            pairs.iter().map(coefficient).collect()
        };

        let mut tilings = DMatrix::<f64>::identity(num_units, num_units);
        for (&(i, j), value) in pairs.iter().zip(values) {
            tilings[(i, j)] = value;
            tilings[(j, i)] = value;
        }
        Ok(tilings)
    }
}
