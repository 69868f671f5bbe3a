//! Deviation from criticality (DCC) of the population activity.
//!
//! At criticality, the avalanche sizes and durations are power-law distributed, with exponents `α_size` and
//! `α_duration`, and the mean size grows with the duration as a power law of exponent `(α_duration - 1) / (α_size - 1)`.
//! The DCC is the distance between this predicted exponent and the one fitted on the avalanches themselves.
//!
//! See Ma, Turrigiano, Wessel & Hengen, Cortical circuit dynamics are homeostatically tuned to criticality in vivo,
//! Neuron 104, 655-664.e4 (2019).
//!
//! # Examples
//!
//! ```rust
//! use spike_analysis::criticality::{CriticalityConfig, CriticalityEstimator, DccResult};
//! use spike_analysis::spike_train::SpikeTrainStore;
//!
//! // A silent recording has no avalanches, hence is not critical
//! let store = SpikeTrainStore::from_trains(&[Vec::<f64>::new(), vec![]], Some(1000.0)).unwrap();
//! let estimator = CriticalityEstimator::new(CriticalityConfig::default()).unwrap();
//!
//! assert_eq!(estimator.estimate(&store).unwrap(), DccResult::not_critical());
//! ```
use serde::{Deserialize, Serialize};

use crate::avalanche::avalanches;
use crate::error::AnalysisError;
use crate::powerlaw::{fit_power_law, FitOptions, PowerLawFit, Xmin};
use crate::spike_train::SpikeTrainStore;
use crate::utils::{linear_fit_slope, quantile};

/// Configuration of the criticality estimator.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CriticalityConfig {
    /// Quantile of the binned population counts used as activity threshold.
    pub quantile: f64,
    /// Width of the time bins.
    pub bin_size: f64,
    /// Number of synthetic datasets for each goodness-of-fit test.
    pub surrogate_count: usize,
    /// Significance level required to prefer truncated power laws.
    pub truncation_pvalue: f64,
    /// Choice of the lower cutoff of the fits.
    pub xmin: Xmin,
    /// Seed of the synthetic datasets.
    pub seed: u64,
}

impl Default for CriticalityConfig {
    fn default() -> Self {
        CriticalityConfig {
            quantile: 0.35,
            bin_size: 40.0,
            surrogate_count: 1000,
            truncation_pvalue: 0.05,
            xmin: Xmin::DataMinimum,
            seed: 0,
        }
    }
}

impl CriticalityConfig {
    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(0.0..=1.0).contains(&self.quantile) {
            return Err(AnalysisError::InvalidInput(format!(
                "the activity quantile must be in [0, 1], got {}",
                self.quantile
            )));
        }
        if !(self.bin_size.is_finite() && self.bin_size > 0.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "the bin size must be positive and finite, got {}",
                self.bin_size
            )));
        }
        self.fit_options(self.seed).validate()
    }

    fn fit_options(&self, seed: u64) -> FitOptions {
        FitOptions {
            surrogate_count: self.surrogate_count,
            truncation_pvalue: self.truncation_pvalue,
            xmin: self.xmin,
            seed,
        }
    }
}

/// The deviation from criticality and the goodness of fit of the size and duration distributions.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct DccResult {
    pub dcc: f64,
    pub p_size: f64,
    pub p_duration: f64,
}

impl DccResult {
    /// Returns the result for a recording without avalanches.
    pub fn not_critical() -> Self {
        DccResult {
            dcc: f64::INFINITY,
            p_size: 1.0,
            p_duration: 1.0,
        }
    }
}

/// A [`DccResult`] with the intermediate quantities of its estimation.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct DccReport {
    pub result: DccResult,
    /// Activity threshold on the binned population counts.
    pub threshold: f64,
    pub num_avalanches: usize,
    /// Fit of the avalanche sizes, if any avalanche was found.
    pub size_fit: Option<PowerLawFit>,
    /// Fit of the avalanche durations, if any avalanche was found.
    pub duration_fit: Option<PowerLawFit>,
    /// Exponent of the mean size as a function of the duration, fitted on the avalanches.
    pub tau_fit: Option<f64>,
    /// Exponent of the mean size as a function of the duration, predicted from the size and duration exponents.
    pub tau_pred: Option<f64>,
}

/// Estimator of the deviation from criticality.
#[derive(Debug, PartialEq, Clone)]
pub struct CriticalityEstimator {
    config: CriticalityConfig,
}

impl CriticalityEstimator {
    /// Create an estimator from a valid configuration.
    pub fn new(config: CriticalityConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(CriticalityEstimator { config })
    }

    pub fn config(&self) -> &CriticalityConfig {
        &self.config
    }

    /// Returns the deviation from criticality of the recording.
    pub fn estimate(&self, store: &SpikeTrainStore) -> Result<DccResult, AnalysisError> {
        Ok(self.estimate_report(store)?.result)
    }

    /// Returns the deviation from criticality of the recording, with all intermediate quantities.
    pub fn estimate_report(&self, store: &SpikeTrainStore) -> Result<DccReport, AnalysisError> {
        let counts = store.binned(self.config.bin_size)?;
        let counts_f64: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
        let threshold = quantile(&counts_f64, self.config.quantile)
            .ok_or_else(|| AnalysisError::InvalidInput("the recording has no time bins".to_string()))?;

        let avalanches = avalanches(&counts, threshold);
        log::debug!(
            "{} avalanches found above {} spikes per bin of {}",
            avalanches.len(),
            threshold,
            self.config.bin_size
        );

        if avalanches.is_empty() {
            return Ok(DccReport {
                result: DccResult::not_critical(),
                threshold,
                num_avalanches: 0,
                size_fit: None,
                duration_fit: None,
                tau_fit: None,
                tau_pred: None,
            });
        }

        let sizes: Vec<f64> = avalanches.iter().map(|a| a.size() as f64).collect();
        let durations: Vec<f64> = avalanches.iter().map(|a| a.duration() as f64).collect();

        // Both fits draw their surrogates from disjoint seed ranges.
        let size_fit = fit_power_law(&sizes, &self.config.fit_options(self.config.seed))?;
        let duration_seed = self
            .config
            .seed
            .wrapping_add(self.config.surrogate_count as u64);
        let duration_fit = fit_power_law(&durations, &self.config.fit_options(duration_seed))?;
        log::debug!(
            "Size exponent {} (p={}), duration exponent {} (p={})",
            size_fit.alpha,
            size_fit.p_value,
            duration_fit.alpha,
            duration_fit.p_value
        );

        let ln_durations: Vec<f64> = durations.iter().map(|d| d.ln()).collect();
        let ln_sizes: Vec<f64> = sizes.iter().map(|s| s.ln()).collect();
        let tau_fit = linear_fit_slope(&ln_durations, &ln_sizes).ok_or_else(|| {
            AnalysisError::FitFailure("the avalanche durations are all equal".to_string())
        })?;
        let tau_pred = (duration_fit.alpha - 1.0) / (size_fit.alpha - 1.0);

        let result = DccResult {
            dcc: (tau_pred - tau_fit).abs(),
            p_size: size_fit.p_value,
            p_duration: duration_fit.p_value,
        };
        log::debug!("DCC {} (tau_pred={}, tau_fit={})", result.dcc, tau_pred, tau_fit);

        Ok(DccReport {
            result,
            threshold,
            num_avalanches: avalanches.len(),
            size_fit: Some(size_fit),
            duration_fit: Some(duration_fit),
            tau_fit: Some(tau_fit),
            tau_pred: Some(tau_pred),
        })
    }
}

impl SpikeTrainStore {
    /// Returns the deviation from criticality of the recording, see [`CriticalityEstimator`].
    pub fn deviation_from_criticality(&self, config: &CriticalityConfig) -> Result<DccResult, AnalysisError> {
        CriticalityEstimator::new(*config)?.estimate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Bursty activity: runs of active bins of random durations separated by silent bins.
    fn bursty_store(seed: u64) -> SpikeTrainStore {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let num_units = 20;
        let num_bins = 4000;
        let mut trains: Vec<Vec<f64>> = vec![vec![]; num_units];

        let mut bin = 1;
        while bin < num_bins - 100 {
            let duration = (1.0 / (1.0 - rng.gen::<f64>())).floor().min(30.0) as usize;
            for b in bin..bin + duration {
                for _ in 0..rng.gen_range(1..=12) {
                    let unit = rng.gen_range(0..num_units);
                    trains[unit].push(b as f64 * 40.0 + rng.gen_range(1.0..39.0));
                }
            }
            bin += duration + rng.gen_range(2..20);
        }

        SpikeTrainStore::from_trains(&trains, Some(num_bins as f64 * 40.0)).unwrap()
    }

    #[test]
    fn test_not_critical() {
        let store = SpikeTrainStore::from_trains(&[Vec::<f64>::new()], Some(4000.0)).unwrap();
        let report = CriticalityEstimator::new(CriticalityConfig::default())
            .unwrap()
            .estimate_report(&store)
            .unwrap();
        assert_eq!(report.result, DccResult::not_critical());
        assert_eq!(report.result.dcc, f64::INFINITY);
        assert_eq!(report.num_avalanches, 0);
        assert!(report.size_fit.is_none());

        // Constant activity has no transitions
        let trains: Vec<Vec<f64>> = vec![(0..100).map(|i| i as f64 * 40.0 + 20.0).collect()];
        let store = SpikeTrainStore::from_trains(&trains, Some(4000.0)).unwrap();
        assert_eq!(
            store.deviation_from_criticality(&CriticalityConfig::default()),
            Ok(DccResult::not_critical())
        );
    }

    #[test]
    fn test_invalid_config() {
        let config = CriticalityConfig {
            quantile: 1.5,
            ..CriticalityConfig::default()
        };
        assert!(matches!(CriticalityEstimator::new(config), Err(AnalysisError::InvalidInput(_))));

        let config = CriticalityConfig {
            bin_size: 0.0,
            ..CriticalityConfig::default()
        };
        assert!(matches!(CriticalityEstimator::new(config), Err(AnalysisError::InvalidInput(_))));

        let config = CriticalityConfig {
            surrogate_count: 0,
            ..CriticalityConfig::default()
        };
        assert!(matches!(CriticalityEstimator::new(config), Err(AnalysisError::InvalidInput(_))));
    }

    #[test]
    fn test_equal_durations() {
        let store = SpikeTrainStore::from_trains(
            &[vec![50.0, 55.0, 60.0, 125.0, 126.0, 127.0, 128.0, 129.0]],
            Some(200.0),
        )
        .unwrap();
        let result = store.deviation_from_criticality(&CriticalityConfig::default());
        assert!(matches!(result, Err(AnalysisError::FitFailure(_))));
    }

    #[test]
    fn test_estimate_bursty_recordings() {
        let config = CriticalityConfig {
            surrogate_count: 20,
            ..CriticalityConfig::default()
        };
        for seed in [1, 2, 3, 42] {
            let report = CriticalityEstimator::new(config)
                .unwrap()
                .estimate_report(&bursty_store(seed))
                .unwrap();
            assert!(report.result.dcc.is_finite());
            for fit in [&report.size_fit, &report.duration_fit].into_iter().flatten() {
                assert!(fit.alpha.is_finite());
                assert!(fit.lambda.map_or(true, |lambda| lambda > 0.0));
            }
        }
    }

    #[test]
    fn test_estimate() {
        let store = bursty_store(42);
        let config = CriticalityConfig {
            surrogate_count: 50,
            seed: 7,
            ..CriticalityConfig::default()
        };
        let estimator = CriticalityEstimator::new(config).unwrap();
        let report = estimator.estimate_report(&store).unwrap();

        assert!(report.num_avalanches > 10);
        assert!(report.result.dcc.is_finite() && report.result.dcc >= 0.0);
        assert!((0.0..=1.0).contains(&report.result.p_size));
        assert!((0.0..=1.0).contains(&report.result.p_duration));
        assert!(report.size_fit.as_ref().is_some_and(|fit| fit.alpha.is_finite()));
        assert!(report.duration_fit.as_ref().is_some_and(|fit| fit.alpha.is_finite()));

        let tau_pred = report.tau_pred.unwrap();
        let tau_fit = report.tau_fit.unwrap();
        assert_eq!(report.result.dcc, (tau_pred - tau_fit).abs());

        // Fixed seeds give identical results
        assert_eq!(estimator.estimate(&store), Ok(report.result));
        assert_eq!(store.deviation_from_criticality(&config), Ok(report.result));
    }
}
