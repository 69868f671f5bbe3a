//! Time binning of spike trains into unit × bin count matrices.
//!
//! Bins are left-open and right-closed intervals of a fixed width, except the first one which also
//! captures spikes occurring exactly at time zero: a spike at time `t > 0` falls in bin `ceil(t / bin_size) - 1`.
//!
//! # Examples
//!
//! ```rust
//! use spike_analysis::raster::CountMatrix;
//! use spike_analysis::spike_train::SpikeTrainStore;
//!
//! let store = SpikeTrainStore::from_trains(&[vec![0.0, 5.0, 10.0], vec![7.5]], Some(10.0)).unwrap();
//! let raster = store.raster(5.0).unwrap();
//!
//! assert_eq!(raster.num_bins(), 2);
//! assert_eq!(raster.row(0), &[2, 1]);
//! assert_eq!(raster.row(1), &[0, 1]);
//! assert_eq!(store.binned(5.0).unwrap(), vec![2, 2]);
//! ```
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::spike_train::SpikeTrainStore;

/// A unit × bin matrix of spike counts, independently of its storage.
pub trait CountMatrix {
    /// Returns the number of units, i.e., rows.
    fn num_units(&self) -> usize;

    /// Returns the number of time bins, i.e., columns.
    fn num_bins(&self) -> usize;

    /// Returns an iterator over the (bin, count) pairs of the non-zero entries of a unit.
    fn row_entries(&self, unit_id: usize) -> impl Iterator<Item = (usize, u32)> + '_;
}

/// A dense raster, stored row-major.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawRaster")]
pub struct Raster {
    counts: Vec<u32>,
    num_units: usize,
    num_bins: usize,
}

#[derive(Deserialize)]
struct RawRaster {
    counts: Vec<u32>,
    num_units: usize,
    num_bins: usize,
}

impl TryFrom<RawRaster> for Raster {
    type Error = AnalysisError;

    fn try_from(raw: RawRaster) -> Result<Self, Self::Error> {
        if raw.num_units.checked_mul(raw.num_bins) != Some(raw.counts.len()) {
            return Err(AnalysisError::InvalidInput(format!(
                "A raster of {} units and {} bins cannot hold {} counts.",
                raw.num_units,
                raw.num_bins,
                raw.counts.len()
            )));
        }
        if raw.num_bins == 0 {
            return Ok(Raster {
                counts: vec![],
                num_units: raw.num_units,
                num_bins: 0,
            });
        }
        let rows: Vec<&[u32]> = raw.counts.chunks(raw.num_bins).collect();
        Raster::from_rows(&rows)
    }
}

impl Raster {
    /// Create a dense raster from one row of counts per unit.
    /// Returns an error if the rows have different lengths.
    pub fn from_rows<T: AsRef<[u32]>>(rows: &[T]) -> Result<Self, AnalysisError> {
        let num_bins = rows.first().map_or(0, |row| row.as_ref().len());
        if let Some(row) = rows.iter().find(|row| row.as_ref().len() != num_bins) {
            return Err(AnalysisError::InvalidInput(format!(
                "Raster rows must have the same length ({} and {}).",
                num_bins,
                row.as_ref().len()
            )));
        }

        Ok(Raster {
            counts: rows.iter().flat_map(|row| row.as_ref().iter().copied()).collect(),
            num_units: rows.len(),
            num_bins,
        })
    }

    /// Returns the counts of a unit.
    ///
    /// # Panics
    /// Panics if the unit does not exist.
    pub fn row(&self, unit_id: usize) -> &[u32] {
        &self.counts[unit_id * self.num_bins..(unit_id + 1) * self.num_bins]
    }

    /// Returns an iterator over the rows of the raster.
    pub fn rows(&self) -> impl Iterator<Item = &[u32]> + '_ {
        (0..self.num_units).map(move |unit_id| self.row(unit_id))
    }

    /// Returns the count of a unit in a bin, if it exists.
    pub fn get(&self, unit_id: usize, bin: usize) -> Option<u32> {
        if unit_id < self.num_units && bin < self.num_bins {
            Some(self.counts[unit_id * self.num_bins + bin])
        } else {
            None
        }
    }

    /// Returns the total count of every unit.
    pub fn row_sums(&self) -> Vec<u64> {
        self.rows()
            .map(|row| row.iter().map(|&c| c as u64).sum())
            .collect()
    }

    /// Returns the total count of every bin.
    pub fn column_sums(&self) -> Vec<u64> {
        let mut sums = vec![0; self.num_bins];
        for row in self.rows() {
            sums.iter_mut()
                .zip(row.iter())
                .for_each(|(sum, &c)| *sum += c as u64);
        }
        sums
    }

    /// Returns the compressed-row version of the raster.
    pub fn to_sparse(&self) -> SparseRaster {
        let mut values = vec![];
        let mut col_indices = vec![];
        let mut row_ptrs = Vec::with_capacity(self.num_units + 1);
        row_ptrs.push(0);

        for row in self.rows() {
            for (bin, &count) in row.iter().enumerate().filter(|(_, &c)| c > 0) {
                col_indices.push(bin);
                values.push(count);
            }
            row_ptrs.push(values.len());
        }

        SparseRaster {
            values,
            col_indices,
            row_ptrs,
            num_bins: self.num_bins,
        }
    }
}

impl CountMatrix for Raster {
    fn num_units(&self) -> usize {
        self.num_units
    }

    fn num_bins(&self) -> usize {
        self.num_bins
    }

    fn row_entries(&self, unit_id: usize) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.row(unit_id)
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, c)| *c > 0)
    }
}

/// A compressed-row raster made of three parallel arrays.
///
/// The entries of unit `i` are `values[row_ptrs[i]..row_ptrs[i + 1]]` in the bins `col_indices[row_ptrs[i]..row_ptrs[i + 1]]`.
/// Row pointers are non-decreasing and there is one more of them than units; within a row, bins are strictly increasing and values are positive.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawSparseRaster")]
pub struct SparseRaster {
    values: Vec<u32>,
    col_indices: Vec<usize>,
    row_ptrs: Vec<usize>,
    num_bins: usize,
}

#[derive(Deserialize)]
struct RawSparseRaster {
    values: Vec<u32>,
    col_indices: Vec<usize>,
    row_ptrs: Vec<usize>,
    num_bins: usize,
}

impl TryFrom<RawSparseRaster> for SparseRaster {
    type Error = AnalysisError;

    fn try_from(raw: RawSparseRaster) -> Result<Self, Self::Error> {
        SparseRaster::build(raw.values, raw.col_indices, raw.row_ptrs, raw.num_bins)
    }
}

impl SparseRaster {
    /// Create a sparse raster from its compressed-row arrays.
    /// Returns an error if the arrays violate the compressed-row invariants.
    pub fn build(
        values: Vec<u32>,
        col_indices: Vec<usize>,
        row_ptrs: Vec<usize>,
        num_bins: usize,
    ) -> Result<Self, AnalysisError> {
        if values.len() != col_indices.len() {
            return Err(AnalysisError::InvalidInput(format!(
                "The number of values ({}) and column indices ({}) don't match.",
                values.len(),
                col_indices.len()
            )));
        }
        if row_ptrs.first() != Some(&0) || row_ptrs.last() != Some(&values.len()) {
            return Err(AnalysisError::InvalidInput(
                "Row pointers must start at zero and end at the number of entries.".to_string(),
            ));
        }
        if row_ptrs.windows(2).any(|ptrs| ptrs[0] > ptrs[1]) {
            return Err(AnalysisError::InvalidInput(
                "Row pointers must be non-decreasing.".to_string(),
            ));
        }
        for ptrs in row_ptrs.windows(2) {
            let cols = &col_indices[ptrs[0]..ptrs[1]];
            if cols.windows(2).any(|c| c[0] >= c[1]) || cols.iter().any(|&c| c >= num_bins) {
                return Err(AnalysisError::InvalidInput(
                    "Column indices must be increasing within a row and smaller than the number of bins."
                        .to_string(),
                ));
            }
        }
        if values.iter().any(|&v| v == 0) {
            return Err(AnalysisError::InvalidInput(
                "Explicit zero entries are not allowed.".to_string(),
            ));
        }

        Ok(SparseRaster {
            values,
            col_indices,
            row_ptrs,
            num_bins,
        })
    }

    /// Returns the number of non-zero entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[u32] {
        &self.values[..]
    }

    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices[..]
    }

    pub fn row_ptrs(&self) -> &[usize] {
        &self.row_ptrs[..]
    }

    /// Returns the bins and counts of the non-zero entries of a unit.
    ///
    /// # Panics
    /// Panics if the unit does not exist.
    pub fn row(&self, unit_id: usize) -> (&[usize], &[u32]) {
        let range = self.row_ptrs[unit_id]..self.row_ptrs[unit_id + 1];
        (&self.col_indices[range.clone()], &self.values[range])
    }

    /// Returns the count of a unit in a bin, if it exists.
    pub fn get(&self, unit_id: usize, bin: usize) -> Option<u32> {
        if unit_id >= self.num_units() || bin >= self.num_bins {
            return None;
        }
        let (cols, values) = self.row(unit_id);
        match cols.binary_search(&bin) {
            Ok(pos) => Some(values[pos]),
            Err(_) => Some(0),
        }
    }

    /// Returns the total count of every unit.
    pub fn row_sums(&self) -> Vec<u64> {
        self.row_ptrs
            .windows(2)
            .map(|ptrs| self.values[ptrs[0]..ptrs[1]].iter().map(|&v| v as u64).sum())
            .collect()
    }

    /// Returns the total count of every bin.
    pub fn column_sums(&self) -> Vec<u64> {
        let mut sums = vec![0; self.num_bins];
        self.col_indices
            .iter()
            .zip(self.values.iter())
            .for_each(|(&bin, &v)| sums[bin] += v as u64);
        sums
    }

    /// Returns the dense version of the raster.
    pub fn to_dense(&self) -> Raster {
        let mut counts = vec![0; self.num_units() * self.num_bins];
        for unit_id in 0..self.num_units() {
            let (cols, values) = self.row(unit_id);
            cols.iter()
                .zip(values.iter())
                .for_each(|(&bin, &v)| counts[unit_id * self.num_bins + bin] = v);
        }
        Raster {
            counts,
            num_units: self.num_units(),
            num_bins: self.num_bins,
        }
    }
}

impl CountMatrix for SparseRaster {
    fn num_units(&self) -> usize {
        self.row_ptrs.len() - 1
    }

    fn num_bins(&self) -> usize {
        self.num_bins
    }

    fn row_entries(&self, unit_id: usize) -> impl Iterator<Item = (usize, u32)> + '_ {
        let (cols, values) = self.row(unit_id);
        cols.iter().copied().zip(values.iter().copied())
    }
}

impl SpikeTrainStore {
    /// Returns the number of bins of the given width covering the recording.
    fn num_bins(&self, bin_size: f64) -> Result<usize, AnalysisError> {
        if !bin_size.is_finite() || bin_size <= 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "The bin size must be positive and finite, got {}.",
                bin_size
            )));
        }
        if self.length() <= 0.0 {
            return Err(AnalysisError::InvalidInput(
                "Cannot bin a recording of zero length.".to_string(),
            ));
        }
        Ok((self.length() / bin_size).ceil() as usize)
    }

    /// Bin all spike times and create a compressed-row raster where entry (i, j) is the number of times unit i fired in bin j.
    /// Spikes whose bin falls out of range due to rounding are assigned to the nearest bin.
    pub fn sparse_raster(&self, bin_size: f64) -> Result<SparseRaster, AnalysisError> {
        let num_bins = self.num_bins(bin_size)?;

        let mut values = Vec::with_capacity(self.num_spikes());
        let mut col_indices = Vec::with_capacity(self.num_spikes());
        let mut row_ptrs = Vec::with_capacity(self.num_units() + 1);
        row_ptrs.push(0);

        for train in self.trains() {
            // Trains are sorted, hence their bins are non-decreasing.
            for (count, bin) in train
                .iter()
                .map(|&t| {
                    if t == 0.0 {
                        0
                    } else {
                        ((t / bin_size).ceil() as usize)
                            .saturating_sub(1)
                            .min(num_bins - 1)
                    }
                })
                .dedup_with_count()
            {
                col_indices.push(bin);
                values.push(count as u32);
            }
            row_ptrs.push(values.len());
        }

        Ok(SparseRaster {
            values,
            col_indices,
            row_ptrs,
            num_bins,
        })
    }

    /// Bin all spike times and create a dense raster where entry (i, j) is the number of times unit i fired in bin j.
    pub fn raster(&self, bin_size: f64) -> Result<Raster, AnalysisError> {
        Ok(self.sparse_raster(bin_size)?.to_dense())
    }

    /// Returns the number of spikes of the whole population in every bin.
    pub fn binned(&self, bin_size: f64) -> Result<Vec<u64>, AnalysisError> {
        Ok(self.sparse_raster(bin_size)?.column_sums())
    }
}
