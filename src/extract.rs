//! Extraction of station time series from one gridded file and stitching of
//! results across a file collection.
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::Duration;
use error_stack::{Report, ResultExt};
use ndarray::{concatenate, Array1, Array2, Axis};

use crate::coordinates::{StationSet, UniqueAxes};
use crate::dataset::{DatasetStore, GriddedDataset};
use crate::error::ExtractError;
use crate::interpolation::{InterpolationMethod, LinearInterp};
use crate::timegrid::{CoverageWindow, TimeMatrix, Timestamp};

/// How requested timestamps are aligned to a file's native time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignMode {
    /// Linearly interpolate the native series onto the requested timestamps.
    /// Timestamps outside the native span come back as NaN.
    Interpolate,
    /// Require every requested timestamp to match a native time step exactly;
    /// any miss fails the whole extraction with
    /// [`ExtractError::TimeSelectionMismatch`].
    Exact,
}

/// The result of extracting one file (or of stitching several): the ordered
/// row timestamps and one dense [time-row × station-column] matrix per
/// requested variable. Cells a station did not request, or that the owning
/// file could not cover, are NaN.
#[derive(Debug, Clone)]
pub struct ExtractedBlock {
    pub times: Vec<Timestamp>,
    pub variables: Vec<Array2<f64>>,
}

impl ExtractedBlock {
    /// The "this file contributes nothing" result.
    pub fn empty(n_variables: usize, n_stations: usize) -> Self {
        Self {
            times: Vec::new(),
            variables: vec![Array2::zeros((0, n_stations)); n_variables],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn n_rows(&self) -> usize {
        self.times.len()
    }
}

/// Extract `variables` from one dataset file for the given stations and
/// requested times.
///
/// The output rows are the sorted union of every station's valid timestamps;
/// each station's column is populated at exactly the rows it requested and
/// NaN elsewhere, so two stations with different request subsets share one
/// matrix without positional ambiguity. An entirely empty request returns an
/// empty block rather than an error.
///
/// Fails with [`ExtractError::VariableMissing`] if any variable is absent
/// from the file (no partial variable list is returned), and in exact mode
/// with [`ExtractError::TimeSelectionMismatch`] if a requested timestamp has
/// no native match.
pub fn extract_dataset<D: GriddedDataset>(
    dataset: &D,
    stations: &StationSet,
    variables: &[&str],
    requested: &TimeMatrix,
    mode: AlignMode,
) -> error_stack::Result<ExtractedBlock, ExtractError> {
    if requested.is_empty() {
        return Ok(ExtractedBlock::empty(variables.len(), stations.len()));
    }

    check_variables(dataset, variables)?;

    let native = dataset.time_axis();
    if native.is_empty() {
        error_stack::bail!(ExtractError::EmptyTimeAxis {
            dataset: dataset.description()
        });
    }

    let union = requested.union_times();
    let row_of: HashMap<Timestamp, usize> =
        union.iter().enumerate().map(|(r, &t)| (t, r)).collect();

    // In exact mode every union timestamp must sit on the native axis; find
    // the positions once, before any data is pulled.
    let exact_positions = match mode {
        AlignMode::Exact if native.len() > 1 => Some(exact_native_positions(
            dataset.description(),
            native,
            &union,
        )?),
        _ => None,
    };

    let axes = UniqueAxes::from_stations(stations);
    let per_station_times: Vec<Vec<Timestamp>> = (0..stations.len())
        .map(|s| requested.station_times(s))
        .collect();

    let mut out_variables = Vec::with_capacity(variables.len());
    for &var in variables {
        // one query per distinct grid cell, fanned back out to the stations
        let mut cell_cache: HashMap<(usize, usize), Vec<f64>> = HashMap::new();
        let mut matrix = Array2::from_elem((union.len(), stations.len()), f64::NAN);

        for (s, valid) in per_station_times.iter().enumerate() {
            if valid.is_empty() {
                log::debug!(
                    "station {s} has no requested times inside {}; its '{var}' column stays NaN",
                    dataset.description()
                );
                continue;
            }

            let cell = axes.station_cell(s);
            let aligned = match cell_cache.entry(cell) {
                std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                std::collections::hash_map::Entry::Vacant(e) => {
                    let raw = dataset
                        .nearest_cell_series(var, stations.latitude(s), stations.longitude(s))
                        .map_err(Report::new)?;
                    e.insert(align_series(
                        native,
                        raw,
                        &union,
                        exact_positions.as_deref(),
                    ))
                }
            };

            for t in valid {
                let row = row_of[t];
                matrix[(row, s)] = aligned[row];
            }
        }

        out_variables.push(matrix);
    }

    Ok(ExtractedBlock {
        times: union,
        variables: out_variables,
    })
}

/// Extract single-valued static fields (e.g. MERRA2's `PHIS`), one value per
/// station from the file's first time slice.
pub fn extract_static<D: GriddedDataset>(
    dataset: &D,
    stations: &StationSet,
    variables: &[&str],
) -> error_stack::Result<Vec<Array1<f64>>, ExtractError> {
    check_variables(dataset, variables)?;

    if dataset.time_axis().is_empty() {
        error_stack::bail!(ExtractError::EmptyTimeAxis {
            dataset: dataset.description()
        });
    }

    let axes = UniqueAxes::from_stations(stations);
    let mut out = Vec::with_capacity(variables.len());
    for &var in variables {
        let mut cell_cache: HashMap<(usize, usize), f64> = HashMap::new();
        let mut values = Array1::from_elem(stations.len(), f64::NAN);
        for s in 0..stations.len() {
            let cell = axes.station_cell(s);
            let value = match cell_cache.entry(cell) {
                std::collections::hash_map::Entry::Occupied(e) => *e.get(),
                std::collections::hash_map::Entry::Vacant(e) => {
                    let raw = dataset
                        .nearest_cell_series(var, stations.latitude(s), stations.longitude(s))
                        .map_err(Report::new)?;
                    *e.insert(raw[0])
                }
            };
            values[s] = value;
        }
        out.push(values);
    }

    Ok(out)
}

/// Stitch an ordered collection of dataset files into one block per request.
///
/// Each file's coverage window (expanded by `tolerance`) restricts the
/// request; files whose restricted request is empty are skipped with a debug
/// log. The surviving blocks are concatenated row-wise in file order, so
/// callers wanting rows ordered by timestamp must pass the files ordered by
/// time coverage.
///
/// An entirely empty request returns an empty block, mirroring
/// [`extract_dataset`]. If timestamps were requested but every file is
/// skipped, the request is entirely uncovered and the call fails with
/// [`ExtractError::NoCoverage`]. A timestamp that no file's expanded window
/// retains, mixed with covered ones, contributes no row at all: the output
/// holds only the rows some file claimed, and the dropped timestamps are
/// reported in a warning log. (Timestamps inside a window but beyond the
/// file's native axis still get NaN rows from the interpolation contract.)
pub fn extract_dataset_list<S: DatasetStore>(
    store: &S,
    paths: &[PathBuf],
    stations: &StationSet,
    variables: &[&str],
    requested: &TimeMatrix,
    mode: AlignMode,
    tolerance: Duration,
) -> error_stack::Result<ExtractedBlock, ExtractError> {
    if requested.is_empty() {
        return Ok(ExtractedBlock::empty(variables.len(), stations.len()));
    }

    let mut blocks: Vec<ExtractedBlock> = Vec::new();

    for path in paths {
        let dataset = store.open(path).map_err(Report::new)?;
        let window = CoverageWindow::from_time_axis(dataset.time_axis(), tolerance)
            .ok_or_else(|| {
                Report::new(ExtractError::EmptyTimeAxis {
                    dataset: dataset.description(),
                })
            })?;

        let restricted = requested.restrict_to_window(&window);
        if restricted.is_empty() {
            log::debug!(
                "skipping {}: no requested time falls in its coverage window",
                dataset.description()
            );
            continue;
        }

        let block = extract_dataset(&dataset, stations, variables, &restricted, mode)
            .attach_printable_lazy(|| format!("while extracting {}", dataset.description()))?;
        if !block.is_empty() {
            blocks.push(block);
        }
    }

    if blocks.is_empty() {
        error_stack::bail!(ExtractError::NoCoverage);
    }

    let stitched = concatenate_blocks(blocks, variables.len());

    let covered: HashSet<Timestamp> = stitched.times.iter().copied().collect();
    let dropped = requested
        .union_times()
        .into_iter()
        .filter(|t| !covered.contains(t))
        .count();
    if dropped > 0 {
        log::warn!(
            "{dropped} requested timestamp(s) fall outside every file's coverage window and contribute no rows"
        );
    }

    Ok(stitched)
}

fn check_variables<D: GriddedDataset>(
    dataset: &D,
    variables: &[&str],
) -> error_stack::Result<(), ExtractError> {
    for &var in variables {
        if !dataset.has_variable(var) {
            error_stack::bail!(ExtractError::variable_missing(dataset.description(), var));
        }
    }
    Ok(())
}

/// Align one grid cell's native series onto the union timestamps.
///
/// A single-step axis is a static field and broadcasts to every row. For
/// exact mode the caller has already resolved `positions`; otherwise the
/// series is linearly interpolated, with out-of-span rows becoming NaN.
fn align_series(
    native: &[Timestamp],
    raw: Array1<f64>,
    union: &[Timestamp],
    positions: Option<&[usize]>,
) -> Vec<f64> {
    if native.len() == 1 {
        return vec![raw[0]; union.len()];
    }

    if let Some(positions) = positions {
        return positions.iter().map(|&p| raw[p]).collect();
    }

    let raw = raw.to_vec();
    LinearInterp::new()
        .interp_series_to_times(native, &raw, union)
        .expect("native axis and cell series always have the same length of at least 2")
}

fn exact_native_positions(
    description: String,
    native: &[Timestamp],
    union: &[Timestamp],
) -> error_stack::Result<Vec<usize>, ExtractError> {
    union
        .iter()
        .map(|&t| {
            native
                .binary_search(&t)
                .map_err(|_| Report::new(ExtractError::time_mismatch(&description, t)))
        })
        .collect()
}

fn concatenate_blocks(blocks: Vec<ExtractedBlock>, n_variables: usize) -> ExtractedBlock {
    let mut times = Vec::new();
    for block in &blocks {
        times.extend_from_slice(&block.times);
    }

    let variables = (0..n_variables)
        .map(|v| {
            let views: Vec<_> = blocks.iter().map(|b| b.variables[v].view()).collect();
            concatenate(Axis(0), &views)
                .expect("stitched blocks always share the station dimension")
        })
        .collect();

    ExtractedBlock { times, variables }
}
