//! This crate provides tools for analyzing multi-unit neural spike trains in Rust.
//!
//! # Storing Spike Trains
//!
//! ```rust
//! use spike_analysis::spike_train::SpikeTrainStore;
//!
//! // From paired unit indices and spike times (in milliseconds)
//! let store = SpikeTrainStore::from_indices_times(&[0, 1, 0, 2], &[5.0, 1.0, 2.0, 7.5], None, Some(10.0)).unwrap();
//!
//! assert_eq!(store.num_units(), 3);
//! assert_eq!(store.train(0), Some(&[2.0, 5.0][..]));
//!
//! // Slicing and concatenating recordings
//! let first = store.time_slice(0.0, 5.0).unwrap();
//! let second = store.time_slice(5.0, 10.0).unwrap();
//! assert_eq!(first.concatenate(&second, 0.0).unwrap(), store);
//! ```
//!
//! # Binning and Correlations
//!
//! ```rust
//! use spike_analysis::metrics::{fano_factors, pearson_sparse};
//! use spike_analysis::spike_train::SpikeTrainStore;
//!
//! let store = SpikeTrainStore::from_trains(&[vec![1.0, 2.0, 21.0], vec![3.0, 22.0], vec![]], Some(40.0)).unwrap();
//! let raster = store.sparse_raster(10.0).unwrap();
//!
//! let fano = fano_factors(&raster);
//! assert_eq!(fano[2], 1.0);
//!
//! let corr = pearson_sparse(&raster);
//! assert_eq!(corr[(2, 2)], 1.0);
//! assert_eq!(corr[(0, 2)], 0.0);
//!
//! let tilings = store.spike_time_tilings(5.0).unwrap();
//! assert_eq!(tilings[(0, 0)], 1.0);
//! ```
//!
//! # Avalanches and Criticality
//!
//! ```rust
//! use spike_analysis::criticality::{CriticalityConfig, DccResult};
//! use spike_analysis::spike_train::SpikeTrainStore;
//!
//! let store = SpikeTrainStore::from_trains(&[vec![50.0, 55.0, 130.0]], Some(400.0)).unwrap();
//! let (durations, sizes) = store.avalanche_duration_size(0.0, 40.0).unwrap();
//! assert_eq!(durations, vec![1, 1]);
//! assert_eq!(sizes, vec![2, 1]);
//!
//! let silent = SpikeTrainStore::from_trains(&[Vec::<f64>::new()], Some(400.0)).unwrap();
//! let result = silent.deviation_from_criticality(&CriticalityConfig::default()).unwrap();
//! assert_eq!(result, DccResult::not_critical());
//! ```

pub mod avalanche;
pub mod burst;
pub mod criticality;
pub mod error;
pub mod metrics;
pub mod powerlaw;
pub mod raster;
pub mod special;
pub mod spike_train;
pub mod sttc;
pub mod utils;

/// The minimum number of units to compute pairwise metrics in parallel.
pub const MIN_PARALLEL_UNITS: usize = 16;
