//! Common errors across the clearsky-rs crate
use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Errors raised while extracting station time series from gridded datasets.
///
/// Any one of these aborts the extraction call that produced it; there is no
/// partial-result mode within a call. An empty request is *not* an error and
/// yields an empty result instead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractError {
    /// Station latitude and longitude sequences must pair up one-to-one.
    /// Checked before any dataset is opened.
    #[error("latitude and longitude arrays must have the same length (got {n_lats} latitudes and {n_lons} longitudes)")]
    CoordinateLengthMismatch { n_lats: usize, n_lons: usize },
    /// The elevation sequence given to the MERRA2 pipeline must have one
    /// entry per station.
    #[error("elevation array length ({n_elev}) does not match the number of stations ({n_stations})")]
    ElevationLengthMismatch { n_elev: usize, n_stations: usize },
    /// A requested variable name is absent from an opened dataset. Aborts
    /// extraction of *all* variables for that call.
    #[error("dataset {dataset} does not contain the requested variable '{variable}'")]
    VariableMissing { dataset: String, variable: String },
    /// Exact time selection was requested but a timestamp has no exact match
    /// on the file's native time axis.
    #[error("dataset {dataset} has no native time step matching {timestamp}; consider interpolated alignment instead of exact selection")]
    TimeSelectionMismatch {
        dataset: String,
        timestamp: DateTime<Utc>,
    },
    /// A dataset file could not be opened at all.
    #[error("could not open dataset {} because: {reason}", .path.display())]
    CouldNotOpen { path: PathBuf, reason: String },
    /// The MERRA2 data directory could not be listed.
    #[error("could not read data directory {} because: {reason}", .path.display())]
    CouldNotReadDir { path: PathBuf, reason: String },
    /// The MERRA2 data directory is missing a required kind of file
    /// (e.g. no "const_2d_asm" constants file).
    #[error("no {0} file found in the data directory")]
    MissingDataFile(&'static str),
    /// A dataset file has a zero-length time axis, so its coverage window
    /// cannot be determined.
    #[error("dataset {dataset} has an empty time axis")]
    EmptyTimeAxis { dataset: String },
    /// No file in the collection overlaps any requested timestamp.
    #[error("none of the dataset files cover any of the requested timestamps")]
    NoCoverage,
}

impl ExtractError {
    pub(crate) fn variable_missing<D: ToString, V: ToString>(dataset: D, variable: V) -> Self {
        Self::VariableMissing {
            dataset: dataset.to_string(),
            variable: variable.to_string(),
        }
    }

    pub(crate) fn time_mismatch<D: ToString>(dataset: D, timestamp: DateTime<Utc>) -> Self {
        Self::TimeSelectionMismatch {
            dataset: dataset.to_string(),
            timestamp,
        }
    }

    pub(crate) fn could_not_open<R: ToString>(path: PathBuf, reason: R) -> Self {
        Self::CouldNotOpen {
            path,
            reason: reason.to_string(),
        }
    }
}
