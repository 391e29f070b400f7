//! The gridded-dataset collaborator interface and an in-memory backend.
//!
//! The extraction core only needs three things from a dataset file: its
//! native time axis, whether a named variable exists, and the time series of
//! a variable at the grid cell nearest to an arbitrary coordinate. Any
//! storage format that can answer those queries plugs in through
//! [`GriddedDataset`]; real MERRA2 netCDF files are handled by the backend in
//! `netcdf_source` (behind the `netcdf` cargo feature).
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use ndarray::{s, Array1, Array3};

use crate::error::ExtractError;
use crate::timegrid::Timestamp;

/// One opened gridded dataset file.
///
/// Nearest-neighbor selection has no distance bound: a requested coordinate
/// silently snaps to the closest grid point, however far away that is.
pub trait GriddedDataset {
    /// A human-readable identifier for error messages, usually the file path.
    fn description(&self) -> String;

    /// The file's native time axis, monotonically increasing.
    fn time_axis(&self) -> &[Timestamp];

    fn has_variable(&self, name: &str) -> bool;

    /// The full time series of `variable` at the grid cell nearest to
    /// `(lat, lon)`. The returned array has one value per native time step.
    fn nearest_cell_series(
        &self,
        variable: &str,
        lat: f64,
        lon: f64,
    ) -> Result<Array1<f64>, ExtractError>;
}

/// Opens dataset files by path. File handles are scoped to one extraction
/// call each; the store does no caching or pooling.
pub trait DatasetStore {
    type Dataset: GriddedDataset;

    fn open(&self, path: &Path) -> Result<Self::Dataset, ExtractError>;
}

/// Index of the axis value closest to `target`. The axis must be sorted
/// ascending and non-empty.
pub(crate) fn nearest_index(axis: &[f64], target: f64) -> usize {
    let i = axis.partition_point(|&v| v < target);
    if i == 0 {
        return 0;
    }
    if i == axis.len() {
        return axis.len() - 1;
    }
    // target sits between axis[i-1] and axis[i]; pick the closer one
    if (target - axis[i - 1]).abs() <= (axis[i] - target).abs() {
        i - 1
    } else {
        i
    }
}

/// A gridded dataset held entirely in memory.
///
/// Fields are stored as [time, lat, lon] cubes keyed by variable name. This
/// backend serves the test suite and embedders whose data already lives in
/// arrays; see [`crate::test_utils`] for convenient builders.
#[derive(Debug, Clone)]
pub struct MemoryDataset {
    inner: Arc<MemoryDatasetInner>,
}

#[derive(Debug)]
struct MemoryDatasetInner {
    name: String,
    times: Vec<Timestamp>,
    lats: Vec<f64>,
    lons: Vec<f64>,
    fields: IndexMap<String, Array3<f64>>,
}

impl MemoryDataset {
    /// Assemble a dataset from its axes and fields.
    ///
    /// # Panics
    /// Panics if any field's shape is not [times × lats × lons]; in-memory
    /// datasets are built by the embedder, so a shape mismatch is a
    /// programming error rather than a runtime condition.
    pub fn new(
        name: impl ToString,
        times: Vec<Timestamp>,
        lats: Vec<f64>,
        lons: Vec<f64>,
        fields: IndexMap<String, Array3<f64>>,
    ) -> Self {
        for (var, cube) in fields.iter() {
            let expected = (times.len(), lats.len(), lons.len());
            assert_eq!(
                cube.dim(),
                expected,
                "field '{var}' does not match the dataset axes"
            );
        }
        Self {
            inner: Arc::new(MemoryDatasetInner {
                name: name.to_string(),
                times,
                lats,
                lons,
                fields,
            }),
        }
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.inner.fields.keys().map(String::as_str)
    }
}

impl GriddedDataset for MemoryDataset {
    fn description(&self) -> String {
        self.inner.name.clone()
    }

    fn time_axis(&self) -> &[Timestamp] {
        &self.inner.times
    }

    fn has_variable(&self, name: &str) -> bool {
        self.inner.fields.contains_key(name)
    }

    fn nearest_cell_series(
        &self,
        variable: &str,
        lat: f64,
        lon: f64,
    ) -> Result<Array1<f64>, ExtractError> {
        let cube = self
            .inner
            .fields
            .get(variable)
            .ok_or_else(|| ExtractError::variable_missing(&self.inner.name, variable))?;
        let i = nearest_index(&self.inner.lats, lat);
        let j = nearest_index(&self.inner.lons, lon);
        log::debug!(
            "{}: ({lat}, {lon}) snapped to grid cell ({}, {})",
            self.inner.name,
            self.inner.lats[i],
            self.inner.lons[j]
        );
        Ok(cube.slice(s![.., i, j]).to_owned())
    }
}

/// A [`DatasetStore`] over in-memory datasets, keyed by path.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    files: IndexMap<PathBuf, MemoryDataset>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, dataset: MemoryDataset) {
        self.files.insert(path.into(), dataset);
    }
}

impl DatasetStore for MemoryStore {
    type Dataset = MemoryDataset;

    fn open(&self, path: &Path) -> Result<Self::Dataset, ExtractError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| ExtractError::could_not_open(path.to_owned(), "no such in-memory dataset"))
    }
}
