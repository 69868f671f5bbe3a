//! Segmentation of population activity into neuronal avalanches.
//!
//! A bin is active if its spike count exceeds a threshold. An avalanche is a maximal run of active bins
//! which starts and ends with an observed transition: runs already active in the first bin or still active
//! in the last bin are discarded since their true onset or offset is unknown.
//!
//! # Examples
//!
//! ```rust
//! use spike_analysis::avalanche::avalanches;
//!
//! let avalanches = avalanches(&[0, 0, 5, 6, 2, 0, 0, 4, 0], 3.0);
//!
//! assert_eq!(avalanches.len(), 2);
//! assert_eq!(avalanches[0].counts(), &[5, 6]);
//! assert_eq!(avalanches[0].size(), 11);
//! assert_eq!(avalanches[1].duration(), 1);
//! ```
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::spike_train::SpikeTrainStore;

/// State of the population in a time bin.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ActivityState {
    Inactive,
    Active,
}

impl ActivityState {
    fn from_count(count: u64, threshold: f64) -> Self {
        if count as f64 > threshold {
            ActivityState::Active
        } else {
            ActivityState::Inactive
        }
    }
}

/// The spike counts of the consecutive bins of an avalanche.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Avalanche {
    counts: Vec<u64>,
}

impl Avalanche {
    /// Returns the spike counts of the avalanche, one per bin.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Returns the total number of spikes in the avalanche.
    pub fn size(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Returns the number of bins spanned by the avalanche.
    pub fn duration(&self) -> usize {
        self.counts.len()
    }
}

/// Returns the avalanches of a sequence of binned spike counts.
pub fn avalanches(counts: &[u64], threshold: f64) -> Vec<Avalanche> {
    let mut avalanches = Vec::new();
    let mut state = match counts.first() {
        Some(&count) => ActivityState::from_count(count, threshold),
        None => return avalanches,
    };
    // Start of the current run, only if its onset was observed.
    let mut onset: Option<usize> = None;

    for (bin, &count) in counts.iter().enumerate().skip(1) {
        let next = ActivityState::from_count(count, threshold);
        match (state, next) {
            (ActivityState::Inactive, ActivityState::Active) => onset = Some(bin),
            (ActivityState::Active, ActivityState::Inactive) => {
                if let Some(start) = onset.take() {
                    avalanches.push(Avalanche {
                        counts: counts[start..bin].to_vec(),
                    });
                }
            }
            _ => {}
        }
        state = next;
    }

    avalanches
}

impl SpikeTrainStore {
    /// Returns the avalanches of the population activity binned at `bin_size`, with bins active above `threshold`.
    pub fn avalanches(&self, threshold: f64, bin_size: f64) -> Result<Vec<Avalanche>, AnalysisError> {
        Ok(avalanches(&self.binned(bin_size)?, threshold))
    }

    /// Returns the durations (in bins) and the sizes (in spikes) of the avalanches.
    pub fn avalanche_duration_size(
        &self,
        threshold: f64,
        bin_size: f64,
    ) -> Result<(Vec<usize>, Vec<u64>), AnalysisError> {
        Ok(self
            .avalanches(threshold, bin_size)?
            .iter()
            .map(|avalanche| (avalanche.duration(), avalanche.size()))
            .unzip())
    }
}
