//! Burst analysis based on binned population activity and on interspike intervals.
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::spike_train::SpikeTrainStore;
use crate::utils::{argmax, mean};

/// Number of standard deviations covered by the smoothing kernel on each side.
const KERNEL_TRUNCATE: f64 = 4.0;

/// A histogram of interspike intervals on logarithmically spaced bins.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct IsiHistogram {
    /// Number of intervals in each bin.
    pub counts: Vec<u64>,
    /// Bin edges, one more than the number of bins.
    pub edges: Vec<f64>,
}

/// A run of consecutive spikes of a train separated by short intervals.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct Burst {
    /// Position of the first spike of the burst in the train.
    pub start: usize,
    pub num_spikes: usize,
}

impl Burst {
    /// Returns the spike times of the burst.
    pub fn times<'a>(&self, train: &'a [f64]) -> &'a [f64] {
        &train[self.start..self.start + self.num_spikes]
    }
}

impl SpikeTrainStore {
    /// Returns the burstiness index of the population activity, between 0 and 1.
    ///
    /// The fraction of spikes in the 15% most active bins is 0.15 for asynchronous activity and 1 if all spikes fall
    /// into a few bins, it is rescaled linearly to [0, 1]. A recording without spikes has a burstiness index of 0.
    ///
    /// See Wagenaar, Madhavan, Pine & Potter, Controlling bursting in cortical cultures with closed-loop
    /// multi-electrode stimulation, J Neurosci 25:3, 680–688 (2005).
    pub fn burstiness_index(&self, bin_size: f64) -> Result<f64, AnalysisError> {
        let mut counts = self.binned(bin_size)?;
        counts.sort_unstable();

        let num_low = (counts.len() as f64 * 0.85).round() as usize;
        if num_low >= counts.len() {
            return Ok(1.0);
        }
        let total = counts.iter().sum::<u64>();
        if total == 0 {
            return Ok(0.0);
        }
        let f15 = counts[num_low..].iter().sum::<u64>() as f64 / total as f64;
        Ok((f15 - 0.15) / 0.85)
    }

    /// Returns the histogram of the interspike intervals of every unit, on `num_bins` logarithmically spaced bins
    /// between the shortest and the longest interval.
    ///
    /// Zero intervals (coincident spikes) cannot be placed on a logarithmic axis and are left out.
    /// Units with no positive interval get an empty histogram.
    pub fn isi_log_histogram(&self, num_bins: usize) -> Result<Vec<IsiHistogram>, AnalysisError> {
        if num_bins == 0 {
            return Err(AnalysisError::InvalidInput(
                "an interspike interval histogram needs at least one bin".to_string(),
            ));
        }

        Ok(self
            .interspike_intervals()
            .into_iter()
            .map(|intervals| {
                let positive: Vec<f64> = intervals.into_iter().filter(|&isi| isi > 0.0).collect();
                let (lo, hi) = match (
                    positive.iter().cloned().reduce(f64::min),
                    positive.iter().cloned().reduce(f64::max),
                ) {
                    (Some(lo), Some(hi)) => (lo, hi),
                    _ => {
                        return IsiHistogram {
                            counts: vec![],
                            edges: vec![],
                        }
                    }
                };

                let mut edges: Vec<f64> = (0..=num_bins)
                    .map(|i| lo * (hi / lo).powf(i as f64 / num_bins as f64))
                    .collect();
                edges[0] = lo;
                edges[num_bins] = hi;

                let mut counts = vec![0u64; num_bins];
                for isi in positive {
                    // The last bin is closed on the right
                    let bin = edges
                        .partition_point(|&e| e <= isi)
                        .saturating_sub(1)
                        .min(num_bins - 1);
                    counts[bin] += 1;
                }
                IsiHistogram { counts, edges }
            })
            .collect())
    }

    /// Returns the skewness of the interspike intervals of every unit, or `None` for units with no interval or
    /// with all intervals equal.
    pub fn isi_skewness(&self) -> Vec<Option<f64>> {
        self.interspike_intervals()
            .iter()
            .map(|intervals| {
                let m = mean(intervals);
                let m2 = intervals.iter().map(|x| (x - m).powi(2)).sum::<f64>() / intervals.len() as f64;
                let m3 = intervals.iter().map(|x| (x - m).powi(3)).sum::<f64>() / intervals.len() as f64;
                if intervals.is_empty() || m2 <= 0.0 {
                    None
                } else {
                    Some(m3 / m2.powf(1.5))
                }
            })
            .collect()
    }

    /// Returns the firing rate of every unit at the given times, from its inverse interspike intervals.
    ///
    /// The inverse of each interval is placed halfway between its two spikes, linearly interpolated at the given
    /// times (and held constant before the first and after the last midpoint), then smoothed with a Gaussian kernel
    /// of standard deviation `sigma`. The times must be evenly spaced for the smoothing to be meaningful.
    /// Units with less than two distinct spike times have a zero rate.
    pub fn resampled_isi(&self, times: &[f64], sigma: f64) -> Result<Vec<Vec<f64>>, AnalysisError> {
        if !(sigma.is_finite() && sigma >= 0.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "the smoothing width must be non-negative and finite, got {}",
                sigma
            )));
        }
        if times.iter().any(|t| !t.is_finite()) {
            return Err(AnalysisError::InvalidInput(
                "the resampling times must be finite".to_string(),
            ));
        }
        let width = match times {
            [t0, t1, ..] if sigma > 0.0 => {
                if t1 <= t0 {
                    return Err(AnalysisError::InvalidInput(format!(
                        "the resampling times must be increasing, got {} then {}",
                        t0, t1
                    )));
                }
                sigma / (t1 - t0)
            }
            _ => 0.0,
        };

        Ok(self
            .trains()
            .iter()
            .map(|train| {
                // Coincident spikes carry no interval
                let (midpoints, rates): (Vec<f64>, Vec<f64>) = train
                    .windows(2)
                    .filter(|w| w[1] > w[0])
                    .map(|w| (0.5 * (w[0] + w[1]), 1.0 / (w[1] - w[0])))
                    .unzip();
                if midpoints.is_empty() {
                    return vec![0.0; times.len()];
                }
                let resampled: Vec<f64> = times
                    .iter()
                    .map(|&t| interpolate(&midpoints, &rates, t))
                    .collect();
                gaussian_filter(&resampled, width)
            })
            .collect())
    }
}

/// Evaluate the piecewise linear function through the points (xs, ys) at x, with constant extrapolation.
fn interpolate(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let i = xs.partition_point(|&xi| xi <= x);
    match (i, xs.len()) {
        (_, 0) => 0.0,
        (0, _) => ys[0],
        (i, n) if i == n => ys[n - 1],
        (i, _) => {
            let (x0, x1) = (xs[i - 1], xs[i]);
            if x1 > x0 {
                ys[i - 1] + (ys[i] - ys[i - 1]) * (x - x0) / (x1 - x0)
            } else {
                ys[i]
            }
        }
    }
}

/// Smooth a signal with a Gaussian kernel of standard deviation `sigma` samples, truncated at
/// [`KERNEL_TRUNCATE`] standard deviations and normalized. The signal is mirrored at both ends.
fn gaussian_filter(signal: &[f64], sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 || signal.len() < 2 {
        return signal.to_vec();
    }
    let radius = (KERNEL_TRUNCATE * sigma + 0.5) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|k| (-0.5 * (k as f64 / sigma).powi(2)).exp())
        .collect();
    let total = weights.iter().sum::<f64>();

    let n = signal.len() as isize;
    let mirror = |j: isize| {
        let m = j.rem_euclid(2 * n);
        (if m < n { m } else { 2 * n - 1 - m }) as usize
    };
    (0..n)
        .map(|i| {
            (-radius..=radius)
                .zip(weights.iter())
                .map(|(k, w)| w * signal[mirror(i - k)])
                .sum::<f64>()
                / total
        })
        .collect()
}

/// Returns the cumulative moving average of a histogram.
pub fn cumulative_moving_average(counts: &[u64]) -> Vec<f64> {
    counts
        .iter()
        .scan(0.0, |total, &c| {
            *total += c as f64;
            Some(*total)
        })
        .enumerate()
        .map(|(i, total)| total / (i + 1) as f64)
        .collect()
}

/// Returns the interspike interval threshold for burst detection, i.e., the upper edge of the bin with the largest
/// cumulative moving average, scaled by `coef`. Returns `None` for an empty histogram.
///
/// See Kapucu et al., Burst analysis tool for developing neuronal networks exhibiting highly varying action potential
/// dynamics, Frontiers in Computational Neuroscience 6:38 (2012).
pub fn isi_threshold_cma(histogram: &IsiHistogram, coef: f64) -> Option<f64> {
    let cma = cumulative_moving_average(&histogram.counts);
    let bin = argmax(&cma)?;
    histogram.edges.get(bin + 1).map(|edge| edge * coef)
}

/// Returns the bursts of a sorted spike train: runs of at least `min_spikes` spikes whose consecutive intervals are
/// all at most `isi_threshold`.
pub fn burst_detection(times: &[f64], isi_threshold: f64, min_spikes: usize) -> Vec<Burst> {
    let mut bursts = Vec::new();
    if times.is_empty() {
        return bursts;
    }

    let mut start = 0;
    for i in 1..=times.len() {
        let continues = i < times.len() && times[i] - times[i - 1] <= isi_threshold;
        if !continues {
            let num_spikes = i - start;
            if num_spikes >= min_spikes {
                bursts.push(Burst { start, num_spikes });
            }
            start = i;
        }
    }
    bursts
}
