//! Module implementing multi-unit spike trains.
//!
//! A [`SpikeTrainStore`] holds one sorted sequence of spike times (in milliseconds) per unit,
//! together with the duration of the recording. Stores are never mutated: subsetting, time slicing
//! and concatenation all produce new stores.
//!
//! # Examples
//!
//! ```rust
//! use spike_analysis::spike_train::SpikeTrainStore;
//!
//! // Two units, given as parallel index/time sequences (in any order)
//! let store = SpikeTrainStore::from_indices_times(&[1, 0, 1, 0], &[7.5, 2.0, 1.0, 0.5], None, Some(10.0)).unwrap();
//!
//! assert_eq!(store.num_units(), 2);
//! assert_eq!(store.train(0).unwrap(), &[0.5, 2.0]);
//! assert_eq!(store.train(1).unwrap(), &[1.0, 7.5]);
//!
//! // Keep only the spikes in (2, 10], shifted to start at zero
//! let sliced = store.time_slice(2.0, 10.0).unwrap();
//! assert_eq!(sliced.length(), 8.0);
//! assert_eq!(sliced.train(1).unwrap(), &[5.5]);
//! ```
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::utils::sort_in;

/// Opaque key-value metadata attached to a unit, never interpreted by the analyses.
pub type UnitMetadata = BTreeMap<String, serde_json::Value>;

/// A spike, i.e., a single event emitted by a unit.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct Spike {
    /// The ID of the unit producing the spike.
    pub unit_id: usize,
    /// The time at which the spike is produced.
    pub time: f64,
}

impl Spike {
    pub fn new(unit_id: usize, time: f64) -> Self {
        Spike { unit_id, time }
    }
}

impl PartialOrd for Spike {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.time.partial_cmp(&other.time)
    }
}

/// A source of spikes given as a stream of (unit, time) events, e.g., the output of a spike sorter or of a simulator.
pub trait SpikeSource {
    /// Returns the number of units declared by the source, if any.
    /// Units without any spike are only represented if the source declares them here.
    fn num_units_hint(&self) -> Option<usize> {
        None
    }

    /// Returns an iterator over all spikes of the source, in any order.
    fn spikes(&self) -> impl Iterator<Item = Spike> + '_;
}

impl SpikeSource for [Spike] {
    fn spikes(&self) -> impl Iterator<Item = Spike> + '_ {
        self.iter().copied()
    }
}

impl SpikeSource for Vec<Spike> {
    fn spikes(&self) -> impl Iterator<Item = Spike> + '_ {
        self.iter().copied()
    }
}

/// The unit in which firing rates are expressed.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub enum RateUnit {
    /// Spikes per second.
    Hz,
    /// Spikes per millisecond.
    KHz,
}

/// A collection of spike trains, one per unit, observed over a recording of a given length.
///
/// The trains are sorted, contain only non-negative finite times and no time exceeds the recording length.
/// Deserialized stores are validated the same way as built ones.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawSpikeTrainStore")]
pub struct SpikeTrainStore {
    /// The (sorted) spike times of every unit.
    trains: Vec<Vec<f64>>,
    /// The duration of the recording.
    length: f64,
    /// Per-unit metadata, either empty or with one entry per unit.
    #[serde(default)]
    unit_metadata: Vec<UnitMetadata>,
    /// Global metadata of the recording.
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

/// The serialized form of a [`SpikeTrainStore`], before validation.
#[derive(Deserialize)]
struct RawSpikeTrainStore {
    trains: Vec<Vec<f64>>,
    length: f64,
    #[serde(default)]
    unit_metadata: Vec<UnitMetadata>,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

impl TryFrom<RawSpikeTrainStore> for SpikeTrainStore {
    type Error = AnalysisError;

    fn try_from(raw: RawSpikeTrainStore) -> Result<Self, Self::Error> {
        let store = Self::from_trains(&raw.trains, Some(raw.length))?.with_metadata(raw.metadata);
        if raw.unit_metadata.is_empty() {
            Ok(store)
        } else {
            store.with_unit_metadata(raw.unit_metadata)
        }
    }
}

/// Check that all times are non-negative and finite.
fn check_times(times: &[f64]) -> Result<(), AnalysisError> {
    match times.iter().find(|t| !t.is_finite() || **t < 0.0) {
        Some(t) => Err(AnalysisError::InvalidInput(format!(
            "spike times must be non-negative and finite, got {}",
            t
        ))),
        None => Ok(()),
    }
}

impl SpikeTrainStore {
    /// Create a store from one sequence of spike times per unit.
    /// The times are copied and sorted. If no length is provided, it defaults to the last spike time (or zero if there is no spike at all).
    /// The function returns an error for negative or non-finite times, or if a time exceeds the provided length.
    pub fn from_trains<T: AsRef<[f64]>>(
        trains: &[T],
        length: Option<f64>,
    ) -> Result<Self, AnalysisError> {
        let trains = trains
            .iter()
            .map(|train| {
                let train = train.as_ref();
                check_times(train)?;
                let mut train = train.to_vec();
                sort_in(&mut train);
                Ok(train)
            })
            .collect::<Result<Vec<Vec<f64>>, AnalysisError>>()?;

        let length = Self::resolve_length(&trains, length)?;

        Ok(SpikeTrainStore {
            trains,
            length,
            unit_metadata: vec![],
            metadata: BTreeMap::new(),
        })
    }

    /// Create a store from parallel sequences of unit indices and spike times.
    /// The number of units is the provided hint if any, otherwise the largest index plus one.
    /// The function returns an error if the sequences have different lengths or if an index exceeds the hint.
    pub fn from_indices_times(
        indices: &[usize],
        times: &[f64],
        num_units: Option<usize>,
        length: Option<f64>,
    ) -> Result<Self, AnalysisError> {
        if indices.len() != times.len() {
            return Err(AnalysisError::InvalidInput(format!(
                "The number of indices ({}) and times ({}) don't match.",
                indices.len(),
                times.len()
            )));
        }

        let num_units = match num_units {
            Some(num_units) => num_units,
            None => indices.iter().max().map_or(0, |max_id| max_id + 1),
        };

        let mut trains: Vec<Vec<f64>> = vec![vec![]; num_units];
        for (&unit_id, &time) in indices.iter().zip(times.iter()) {
            match trains.get_mut(unit_id) {
                Some(train) => train.push(time),
                None => {
                    return Err(AnalysisError::InvalidInput(format!(
                        "Unit index {} is out of range for {} units.",
                        unit_id, num_units
                    )))
                }
            }
        }

        Self::from_trains(&trains, length)
    }

    /// Create a store from any source of (unit, time) events.
    pub fn from_source<S: SpikeSource + ?Sized>(
        source: &S,
        length: Option<f64>,
    ) -> Result<Self, AnalysisError> {
        let (indices, times): (Vec<usize>, Vec<f64>) = source
            .spikes()
            .map(|spike| (spike.unit_id, spike.time))
            .unzip();
        Self::from_indices_times(&indices, &times, source.num_units_hint(), length)
    }

    /// Attach per-unit metadata to the store.
    /// Returns an error if there isn't exactly one entry per unit.
    pub fn with_unit_metadata(
        mut self,
        unit_metadata: Vec<UnitMetadata>,
    ) -> Result<Self, AnalysisError> {
        if unit_metadata.len() != self.num_units() {
            return Err(AnalysisError::InvalidInput(format!(
                "Malformed metadata: expected {} entries, got {}.",
                self.num_units(),
                unit_metadata.len()
            )));
        }
        self.unit_metadata = unit_metadata;
        Ok(self)
    }

    /// Attach global metadata to the store.
    pub fn with_metadata(mut self, metadata: BTreeMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    fn resolve_length(trains: &[Vec<f64>], length: Option<f64>) -> Result<f64, AnalysisError> {
        let last_time = trains
            .iter()
            .filter_map(|train| train.last().copied())
            .fold(0.0, f64::max);

        match length {
            None => Ok(last_time),
            Some(length) if !length.is_finite() || length < 0.0 => {
                Err(AnalysisError::InvalidInput(format!(
                    "The recording length must be non-negative and finite, got {}.",
                    length
                )))
            }
            Some(length) if last_time > length => Err(AnalysisError::InvalidInput(format!(
                "Spike time {} exceeds the recording length {}.",
                last_time, length
            ))),
            Some(length) => Ok(length),
        }
    }

    /// Returns the number of units.
    pub fn num_units(&self) -> usize {
        self.trains.len()
    }

    /// Returns the duration of the recording.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Returns the total number of spikes.
    pub fn num_spikes(&self) -> usize {
        self.trains.iter().map(|train| train.len()).sum()
    }

    /// Returns the (sorted) spike times of a unit, if it exists.
    pub fn train(&self, unit_id: usize) -> Option<&[f64]> {
        self.trains.get(unit_id).map(|train| &train[..])
    }

    /// Returns the spike trains of all units.
    pub fn trains(&self) -> &[Vec<f64>] {
        &self.trains[..]
    }

    /// Returns the per-unit metadata (empty if none was attached).
    pub fn unit_metadata(&self) -> &[UnitMetadata] {
        &self.unit_metadata[..]
    }

    /// Returns the global metadata.
    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    /// Returns an iterator over all spike times, in time order.
    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.trains
            .iter()
            .map(|train| train.iter().copied())
            .kmerge_by(|a, b| a < b)
    }

    /// Returns an iterator over all spikes, in time order.
    pub fn events(&self) -> impl Iterator<Item = Spike> + '_ {
        self.trains
            .iter()
            .enumerate()
            .map(|(unit_id, train)| train.iter().map(move |&time| Spike::new(unit_id, time)))
            .kmerge_by(|a, b| a.time < b.time)
    }

    /// Returns separate sequences of unit indices and times, in time order.
    pub fn idces_times(&self) -> (Vec<usize>, Vec<f64>) {
        self.events()
            .map(|spike| (spike.unit_id, spike.time))
            .unzip()
    }

    /// Returns a new store with only the selected units, in the order of the selection.
    /// The function returns an error if a unit does not exist.
    pub fn subset(&self, units: &[usize]) -> Result<Self, AnalysisError> {
        let trains = units
            .iter()
            .map(|&unit_id| {
                self.trains.get(unit_id).cloned().ok_or_else(|| {
                    AnalysisError::OutOfBounds(format!(
                        "Unit {} does not exist ({} units).",
                        unit_id,
                        self.num_units()
                    ))
                })
            })
            .collect::<Result<Vec<Vec<f64>>, AnalysisError>>()?;

        let unit_metadata = if self.unit_metadata.is_empty() {
            vec![]
        } else {
            units
                .iter()
                .map(|&unit_id| self.unit_metadata[unit_id].clone())
                .collect()
        };

        Ok(SpikeTrainStore {
            trains,
            length: self.length,
            unit_metadata,
            metadata: self.metadata.clone(),
        })
    }

    /// Returns a new store with only the units whose metadata value under `key` satisfies the predicate.
    /// Units without the key are dropped. The function returns an error if the store has no unit metadata.
    pub fn subset_by<F>(&self, key: &str, predicate: F) -> Result<Self, AnalysisError>
    where
        F: Fn(&serde_json::Value) -> bool,
    {
        if self.unit_metadata.is_empty() && self.num_units() > 0 {
            return Err(AnalysisError::InvalidInput(format!(
                "Cannot select units by '{}': the store has no unit metadata.",
                key
            )));
        }

        let units: Vec<usize> = self
            .unit_metadata
            .iter()
            .enumerate()
            .filter(|(_, data)| data.get(key).is_some_and(&predicate))
            .map(|(unit_id, _)| unit_id)
            .collect();

        self.subset(&units)
    }

    /// Returns a new store with only the spikes in the time range (start, end], shifted so that the new store starts at zero.
    /// The range is closed at zero, i.e., [0, end] if start is zero, so that consecutive slices never share a spike.
    /// Negative bounds are counted backwards from the end of the recording, and the end is clipped to the recording length.
    pub fn time_slice(&self, start: f64, end: f64) -> Result<Self, AnalysisError> {
        if start.is_nan() || end.is_nan() {
            return Err(AnalysisError::InvalidInput(
                "Time slice bounds cannot be NaN.".to_string(),
            ));
        }

        let start = if start < 0.0 { start + self.length } else { start };
        let end = if end < 0.0 {
            end + self.length
        } else {
            end.min(self.length)
        };

        if start < 0.0 || start > end {
            return Err(AnalysisError::InvalidInput(format!(
                "Invalid time slice ({}, {}] for a recording of length {}.",
                start, end, self.length
            )));
        }

        let trains = self
            .trains
            .iter()
            .map(|train| {
                let first = if start > 0.0 {
                    train.partition_point(|&t| t <= start)
                } else {
                    0
                };
                let last = train.partition_point(|&t| t <= end);
                train[first..last.max(first)]
                    .iter()
                    .map(|t| t - start)
                    .collect()
            })
            .collect();

        Ok(SpikeTrainStore {
            trains,
            length: end - start,
            unit_metadata: self.unit_metadata.clone(),
            metadata: self.metadata.clone(),
        })
    }

    /// Returns consecutive windows of the recording of a given length, overlapping by a given amount.
    /// The last windows are truncated at the end of the recording.
    pub fn frames(&self, frame_length: f64, overlap: f64) -> Result<Vec<Self>, AnalysisError> {
        let step = frame_length - overlap;
        if !step.is_finite() || step <= 0.0 || overlap < 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "Frame length ({}) must exceed the overlap ({}).",
                frame_length, overlap
            )));
        }

        let mut frames = vec![];
        let mut start = 0.0;
        while start < self.length {
            frames.push(self.time_slice(start, start + frame_length)?);
            start += step;
        }
        Ok(frames)
    }

    /// Returns a new store where the spikes of the other store follow those of this one, after an additional offset.
    /// The function returns an error if the stores have different numbers of units or if the offset is negative.
    pub fn concatenate(&self, other: &Self, offset: f64) -> Result<Self, AnalysisError> {
        if self.num_units() != other.num_units() {
            return Err(AnalysisError::IncompatibleSpikeData(format!(
                "The number of units ({} and {}) don't match.",
                self.num_units(),
                other.num_units()
            )));
        }
        if !offset.is_finite() || offset < 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "The concatenation offset must be non-negative and finite, got {}.",
                offset
            )));
        }

        let shift = self.length + offset;
        let trains = self
            .trains
            .iter()
            .zip_eq(other.trains.iter())
            .map(|(train, other_train)| {
                train
                    .iter()
                    .copied()
                    .chain(other_train.iter().map(|t| t + shift))
                    .collect()
            })
            .collect();

        Ok(SpikeTrainStore {
            trains,
            length: shift + other.length,
            unit_metadata: self.unit_metadata.clone(),
            metadata: self.metadata.clone(),
        })
    }

    /// Returns a new store with the units of both stores.
    /// If the recording lengths differ, the other store is first restricted to the recording of this one.
    pub fn stack_units(&self, other: &Self) -> Result<Self, AnalysisError> {
        let other = if other.length == self.length {
            other.clone()
        } else {
            other.time_slice(0.0, self.length)?
        };

        let unit_metadata = if self.unit_metadata.is_empty() && other.unit_metadata.is_empty() {
            vec![]
        } else {
            let pad = |store: &Self| {
                if store.unit_metadata.is_empty() {
                    vec![UnitMetadata::new(); store.num_units()]
                } else {
                    store.unit_metadata.clone()
                }
            };
            let mut unit_metadata = pad(self);
            unit_metadata.extend(pad(&other));
            unit_metadata
        };

        let mut metadata = self.metadata.clone();
        metadata.extend(other.metadata.clone());

        let mut trains = self.trains.clone();
        trains.extend(other.trains);

        Ok(SpikeTrainStore {
            trains,
            length: self.length,
            unit_metadata,
            metadata,
        })
    }

    /// Returns the firing rate of every unit, i.e., its number of spikes per time over the whole recording.
    pub fn rates(&self, unit: RateUnit) -> Result<Vec<f64>, AnalysisError> {
        if self.length <= 0.0 {
            return Err(AnalysisError::InvalidInput(
                "Firing rates are undefined for an empty recording.".to_string(),
            ));
        }
        let scale = match unit {
            RateUnit::Hz => 1e3,
            RateUnit::KHz => 1.0,
        };
        Ok(self
            .trains
            .iter()
            .map(|train| scale * train.len() as f64 / self.length)
            .collect())
    }

    /// Returns the interspike intervals of every unit.
    pub fn interspike_intervals(&self) -> Vec<Vec<f64>> {
        self.trains
            .iter()
            .map(|train| train.windows(2).map(|ts| ts[1] - ts[0]).collect())
            .collect()
    }

    /// For every unit, returns the latencies from each of the given times to the nearest spike of the unit,
    /// keeping only those within the window (in absolute value).
    pub fn latencies(&self, times: &[f64], window: f64) -> Vec<Vec<f64>> {
        self.trains
            .iter()
            .map(|train| {
                times
                    .iter()
                    .filter_map(|&time| {
                        let pos = train.partition_point(|&t| t < time);
                        let before = pos.checked_sub(1).map(|i| train[i] - time);
                        let after = train.get(pos).map(|t| t - time);
                        let latency = match (before, after) {
                            (Some(b), Some(a)) => {
                                if b.abs() <= a.abs() {
                                    b
                                } else {
                                    a
                                }
                            }
                            (Some(b), None) => b,
                            (None, Some(a)) => a,
                            (None, None) => return None,
                        };
                        (latency.abs() <= window).then_some(latency)
                    })
                    .collect()
            })
            .collect()
    }

    /// Returns the latencies from the spikes of a unit to the nearest spikes of every unit.
    pub fn latencies_to_index(
        &self,
        unit_id: usize,
        window: f64,
    ) -> Result<Vec<Vec<f64>>, AnalysisError> {
        let times = self.train(unit_id).ok_or_else(|| {
            AnalysisError::OutOfBounds(format!(
                "Unit {} does not exist ({} units).",
                unit_id,
                self.num_units()
            ))
        })?;
        Ok(self.latencies(times, window))
    }

    /// Save the store to a file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), AnalysisError> {
        let file = File::create(path).map_err(|e| AnalysisError::IOError(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| AnalysisError::IOError(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| AnalysisError::IOError(e.to_string()))
    }

    /// Load a store from a file.
    /// The loaded spike trains are validated as if they were built from scratch.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, AnalysisError> {
        let file = File::open(path).map_err(|e| AnalysisError::IOError(e.to_string()))?;
        let reader = BufReader::new(file);
        let raw: RawSpikeTrainStore =
            serde_json::from_reader(reader).map_err(|e| AnalysisError::IOError(e.to_string()))?;
        Self::try_from(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_store() -> SpikeTrainStore {
        SpikeTrainStore::from_trains(
            &[vec![0.0, 4.0, 10.0], vec![2.5, 7.0], vec![]],
            Some(12.0),
        )
        .unwrap()
    }

    #[test]
    fn test_from_trains() {
        // Test unsorted trains are sorted
        let store = SpikeTrainStore::from_trains(&[vec![5.0, 0.0, 2.0], vec![1.0]], None).unwrap();
        assert_eq!(store.train(0).unwrap(), &[0.0, 2.0, 5.0]);
        assert_eq!(store.length(), 5.0);
        assert_eq!(store.num_units(), 2);
        assert_eq!(store.num_spikes(), 4);

        // Test empty trains
        let empty: Vec<Vec<f64>> = vec![vec![], vec![]];
        let store = SpikeTrainStore::from_trains(&empty, None).unwrap();
        assert_eq!(store.length(), 0.0);
        assert_eq!(store.num_units(), 2);

        // Test invalid times
        assert!(matches!(
            SpikeTrainStore::from_trains(&[vec![0.0, f64::NAN]], None),
            Err(AnalysisError::InvalidInput(_))
        ));
        assert!(matches!(
            SpikeTrainStore::from_trains(&[vec![-1.0, 2.0]], None),
            Err(AnalysisError::InvalidInput(_))
        ));
        assert!(matches!(
            SpikeTrainStore::from_trains(&[vec![f64::INFINITY]], None),
            Err(AnalysisError::InvalidInput(_))
        ));

        // Test invalid lengths
        assert!(matches!(
            SpikeTrainStore::from_trains(&[vec![1.0, 20.0]], Some(10.0)),
            Err(AnalysisError::InvalidInput(_))
        ));
        assert!(matches!(
            SpikeTrainStore::from_trains(&[vec![1.0]], Some(-1.0)),
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_from_trains_copies_input() {
        let mut trains = vec![vec![3.0, 1.0]];
        let store = SpikeTrainStore::from_trains(&trains, None).unwrap();
        trains[0][0] = 100.0;
        assert_eq!(store.train(0).unwrap(), &[1.0, 3.0]);
    }

    #[test]
    fn test_from_indices_times() {
        let store =
            SpikeTrainStore::from_indices_times(&[2, 0, 2], &[3.0, 1.0, 2.0], None, None).unwrap();
        assert_eq!(store.num_units(), 3);
        assert_eq!(store.train(1).unwrap(), &[] as &[f64]);
        assert_eq!(store.train(2).unwrap(), &[2.0, 3.0]);

        // Test the unit count hint adds silent units
        let store =
            SpikeTrainStore::from_indices_times(&[0], &[1.0], Some(4), Some(2.0)).unwrap();
        assert_eq!(store.num_units(), 4);
        assert_eq!(store.length(), 2.0);

        // Test mismatched lengths
        assert!(matches!(
            SpikeTrainStore::from_indices_times(&[0, 1], &[1.0], None, None),
            Err(AnalysisError::InvalidInput(_))
        ));

        // Test index exceeding the hint
        assert!(matches!(
            SpikeTrainStore::from_indices_times(&[0, 5], &[1.0, 2.0], Some(3), None),
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    struct Recorder {
        spikes: Vec<Spike>,
        num_units: usize,
    }

    impl SpikeSource for Recorder {
        fn num_units_hint(&self) -> Option<usize> {
            Some(self.num_units)
        }

        fn spikes(&self) -> impl Iterator<Item = Spike> + '_ {
            self.spikes.iter().copied()
        }
    }

    #[test]
    fn test_from_source() {
        let spikes = vec![Spike::new(1, 4.0), Spike::new(0, 2.0), Spike::new(1, 1.0)];
        let store = SpikeTrainStore::from_source(&spikes, None).unwrap();
        assert_eq!(store.num_units(), 2);
        assert_eq!(store.train(1).unwrap(), &[1.0, 4.0]);

        let recorder = Recorder {
            spikes,
            num_units: 5,
        };
        let store = SpikeTrainStore::from_source(&recorder, Some(10.0)).unwrap();
        assert_eq!(store.num_units(), 5);
        assert_eq!(store.length(), 10.0);
    }

    #[test]
    fn test_events() {
        let store = sample_store();
        let (idces, times) = store.idces_times();
        assert_eq!(idces, vec![0, 1, 0, 1, 0]);
        assert_eq!(times, vec![0.0, 2.5, 4.0, 7.0, 10.0]);
        assert_eq!(store.times().collect::<Vec<f64>>(), times);
    }

    #[test]
    fn test_subset() {
        let store = sample_store()
            .with_unit_metadata(vec![
                UnitMetadata::from([("label".to_string(), json!("good"))]),
                UnitMetadata::from([("label".to_string(), json!("mua"))]),
                UnitMetadata::from([("label".to_string(), json!("good"))]),
            ])
            .unwrap();

        let subset = store.subset(&[1, 0]).unwrap();
        assert_eq!(subset.num_units(), 2);
        assert_eq!(subset.train(0).unwrap(), &[2.5, 7.0]);
        assert_eq!(subset.length(), 12.0);
        assert_eq!(subset.unit_metadata()[0]["label"], json!("mua"));

        assert!(matches!(
            store.subset(&[3]),
            Err(AnalysisError::OutOfBounds(_))
        ));

        let good = store.subset_by("label", |label| label == "good").unwrap();
        assert_eq!(good.num_units(), 2);
        assert_eq!(good.train(0).unwrap(), &[0.0, 4.0, 10.0]);
        assert_eq!(good.train(1).unwrap(), &[] as &[f64]);

        assert!(matches!(
            sample_store().subset_by("label", |_| true),
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_metadata_length_mismatch() {
        assert!(matches!(
            sample_store().with_unit_metadata(vec![UnitMetadata::new()]),
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_time_slice() {
        let store = sample_store();

        // A spike at zero is kept when slicing from zero
        let sliced = store.time_slice(0.0, 4.0).unwrap();
        assert_eq!(sliced.train(0).unwrap(), &[0.0, 4.0]);
        assert_eq!(sliced.length(), 4.0);

        // The lower bound is open otherwise
        let sliced = store.time_slice(4.0, 12.0).unwrap();
        assert_eq!(sliced.train(0).unwrap(), &[6.0]);
        assert_eq!(sliced.train(1).unwrap(), &[3.0]);
        assert_eq!(sliced.length(), 8.0);

        // Negative bounds are counted from the end
        let sliced = store.time_slice(-5.0, -1.0).unwrap();
        assert_eq!(sliced.train(0).unwrap(), &[3.0]);
        assert_eq!(sliced.length(), 4.0);

        // The end is clipped to the recording
        let sliced = store.time_slice(10.0, 100.0).unwrap();
        assert_eq!(sliced.length(), 2.0);
        assert_eq!(sliced.num_spikes(), 0);

        assert!(matches!(
            store.time_slice(8.0, 4.0),
            Err(AnalysisError::InvalidInput(_))
        ));
        assert!(matches!(
            store.time_slice(f64::NAN, 4.0),
            Err(AnalysisError::InvalidInput(_))
        ));

        // The original store is untouched
        assert_eq!(store, sample_store());
    }

    #[test]
    fn test_time_slice_partition() {
        let store = SpikeTrainStore::from_trains(
            &[
                vec![0.0, 1.0, 2.5, 5.0, 5.0, 7.25, 10.0],
                vec![5.0, 9.75],
                vec![0.0],
            ],
            None,
        )
        .unwrap();

        for m in [0.5, 2.5, 5.0, 7.0, 9.75] {
            let head = store.time_slice(0.0, m).unwrap();
            let tail = store.time_slice(m, store.length()).unwrap();
            for unit_id in 0..store.num_units() {
                let mut recovered = head.train(unit_id).unwrap().to_vec();
                recovered.extend(tail.train(unit_id).unwrap().iter().map(|t| t + m));
                assert_eq!(recovered, store.train(unit_id).unwrap());
            }
        }
    }

    #[test]
    fn test_frames() {
        let store = sample_store();
        let frames = store.frames(5.0, 0.0).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].train(0).unwrap(), &[0.0, 4.0]);
        assert_eq!(frames[1].train(1).unwrap(), &[2.0]);
        assert_eq!(frames[2].length(), 2.0);
        assert_eq!(
            frames.iter().map(|frame| frame.num_spikes()).sum::<usize>(),
            store.num_spikes()
        );

        assert_eq!(store.frames(5.0, 2.5).unwrap().len(), 5);
        assert!(store.frames(5.0, 5.0).is_err());
    }

    #[test]
    fn test_concatenate() {
        let store = sample_store();
        let other = SpikeTrainStore::from_trains(&[vec![1.0], vec![], vec![0.5]], Some(2.0)).unwrap();

        let joined = store.concatenate(&other, 3.0).unwrap();
        assert_eq!(joined.length(), 17.0);
        assert_eq!(joined.train(0).unwrap(), &[0.0, 4.0, 10.0, 16.0]);
        assert_eq!(joined.train(2).unwrap(), &[15.5]);

        let mismatched = SpikeTrainStore::from_trains(&[vec![1.0]], None).unwrap();
        assert!(matches!(
            store.concatenate(&mismatched, 0.0),
            Err(AnalysisError::IncompatibleSpikeData(_))
        ));
        assert!(matches!(
            store.concatenate(&other, -1.0),
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_stack_units() {
        let store = sample_store();
        let other = SpikeTrainStore::from_trains(&[vec![1.0, 11.0, 20.0]], None).unwrap();

        let stacked = store.stack_units(&other).unwrap();
        assert_eq!(stacked.num_units(), 4);
        assert_eq!(stacked.length(), 12.0);
        assert_eq!(stacked.train(3).unwrap(), &[1.0, 11.0]);
    }

    #[test]
    fn test_rates_and_intervals() {
        let store = sample_store();
        let rates = store.rates(RateUnit::Hz).unwrap();
        assert_eq!(rates, vec![250.0, 1000.0 / 6.0, 0.0]);
        assert_eq!(store.rates(RateUnit::KHz).unwrap()[0], 0.25);

        assert_eq!(
            store.interspike_intervals(),
            vec![vec![4.0, 6.0], vec![4.5], vec![]]
        );

        let empty: Vec<Vec<f64>> = vec![vec![]];
        let empty = SpikeTrainStore::from_trains(&empty, None).unwrap();
        assert!(empty.rates(RateUnit::Hz).is_err());
    }

    #[test]
    fn test_latencies() {
        let store = sample_store();
        let latencies = store.latencies(&[3.0, 8.0], 2.0);
        assert_eq!(latencies[0], vec![1.0, 2.0]);
        assert_eq!(latencies[1], vec![-0.5, -1.0]);
        assert_eq!(latencies[2], Vec::<f64>::new());

        let latencies = store.latencies_to_index(1, 3.0).unwrap();
        assert_eq!(latencies[0], vec![1.5, -3.0]);
        assert_eq!(latencies[1], vec![0.0, 0.0]);
        assert!(store.latencies_to_index(7, 1.0).is_err());
    }

    #[test]
    fn test_save_load() {
        let store = sample_store()
            .with_metadata(BTreeMap::from([("culture".to_string(), json!("organoid-3"))]));

        let file = tempfile::NamedTempFile::new().unwrap();
        store.save_to(file.path()).unwrap();
        let loaded = SpikeTrainStore::load_from(file.path()).unwrap();
        assert_eq!(loaded, store);

        assert!(matches!(
            SpikeTrainStore::load_from("/nonexistent/store.json"),
            Err(AnalysisError::IOError(_))
        ));
    }

    #[test]
    fn test_deserialize_validates() {
        let store: SpikeTrainStore =
            serde_json::from_str(r#"{"trains":[[3.0,1.0],[]],"length":10.0}"#).unwrap();
        assert_eq!(store.train(0).unwrap(), &[1.0, 3.0]);
        assert_eq!(store.num_units(), 2);

        // Negative time
        let malformed = r#"{"trains":[[30.0,5.0,-3.0]],"length":40.0}"#;
        assert!(serde_json::from_str::<SpikeTrainStore>(malformed).is_err());
        // Time beyond the recording
        let malformed = r#"{"trains":[[30.0,5.0]],"length":10.0}"#;
        assert!(serde_json::from_str::<SpikeTrainStore>(malformed).is_err());
        // One metadata entry for two units
        let malformed = r#"{"trains":[[1.0],[2.0]],"length":10.0,"unit_metadata":[{}]}"#;
        assert!(serde_json::from_str::<SpikeTrainStore>(malformed).is_err());

        // Malformed files are rejected as invalid input
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"trains":[[-1.0]],"length":10.0}"#).unwrap();
        assert!(matches!(
            SpikeTrainStore::load_from(file.path()),
            Err(AnalysisError::InvalidInput(_))
        ));
    }
}
