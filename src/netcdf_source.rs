//! A [`GriddedDataset`] backend over netCDF files (MERRA2's native format).
//!
//! Only available with the `netcdf` cargo feature. Assumes the MERRA2 layout:
//! coordinate variables named `time`, `lat`, and `lon`, with data variables
//! dimensioned (time, lat, lon) or (lat, lon).
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime, TimeZone, Utc};
use ndarray::Array1;

use crate::dataset::{nearest_index, DatasetStore, GriddedDataset};
use crate::error::ExtractError;
use crate::timegrid::Timestamp;

const TIME_DIM: &str = "time";
const LAT_DIM: &str = "lat";
const LON_DIM: &str = "lon";

/// One opened netCDF file with its coordinate axes decoded up front.
pub struct NetcdfDataset {
    file: netcdf::File,
    path: PathBuf,
    times: Vec<Timestamp>,
    lats: Vec<f64>,
    lons: Vec<f64>,
}

impl NetcdfDataset {
    pub fn open(path: &Path) -> Result<Self, ExtractError> {
        let file = netcdf::open(path)
            .map_err(|e| ExtractError::could_not_open(path.to_owned(), e))?;

        let times = read_time_axis(&file, path)?;
        let lats = read_coordinate(&file, path, LAT_DIM)?;
        let lons = read_coordinate(&file, path, LON_DIM)?;

        Ok(Self {
            file,
            path: path.to_owned(),
            times,
            lats,
            lons,
        })
    }
}

impl GriddedDataset for NetcdfDataset {
    fn description(&self) -> String {
        self.path.display().to_string()
    }

    fn time_axis(&self) -> &[Timestamp] {
        &self.times
    }

    fn has_variable(&self, name: &str) -> bool {
        self.file.variable(name).is_some()
    }

    fn nearest_cell_series(
        &self,
        variable: &str,
        lat: f64,
        lon: f64,
    ) -> Result<Array1<f64>, ExtractError> {
        let var = self
            .file
            .variable(variable)
            .ok_or_else(|| ExtractError::variable_missing(self.path.display(), variable))?;

        let i = nearest_index(&self.lats, lat);
        let j = nearest_index(&self.lons, lon);
        log::debug!(
            "{}: ({lat}, {lon}) snapped to grid cell ({}, {})",
            self.path.display(),
            self.lats[i],
            self.lons[j]
        );

        let could_not_read = |e: netcdf::Error| {
            ExtractError::could_not_open(
                self.path.clone(),
                format!("error reading variable '{variable}': {e}"),
            )
        };

        match var.dimensions().len() {
            // (time, lat, lon)
            3 => {
                let values = var
                    .get::<f64, _>((.., i, j))
                    .map_err(could_not_read)?;
                Ok(Array1::from_iter(values.iter().copied()))
            }
            // a static (lat, lon) field is one value for every time step
            2 => {
                let values = var.get::<f64, _>((i, j)).map_err(could_not_read)?;
                let value = values.iter().copied().next().ok_or_else(|| {
                    ExtractError::could_not_open(
                        self.path.clone(),
                        format!("variable '{variable}' returned no data"),
                    )
                })?;
                Ok(Array1::from_elem(self.times.len().max(1), value))
            }
            n => Err(ExtractError::could_not_open(
                self.path.clone(),
                format!("variable '{variable}' has unsupported rank {n}"),
            )),
        }
    }
}

/// Opens [`NetcdfDataset`]s from the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetcdfStore;

impl DatasetStore for NetcdfStore {
    type Dataset = NetcdfDataset;

    fn open(&self, path: &Path) -> Result<Self::Dataset, ExtractError> {
        NetcdfDataset::open(path)
    }
}

fn read_coordinate(file: &netcdf::File, path: &Path, name: &str) -> Result<Vec<f64>, ExtractError> {
    let var = file
        .variable(name)
        .ok_or_else(|| ExtractError::variable_missing(path.display(), name))?;
    let values = var.get::<f64, _>(netcdf::Extents::All).map_err(|e| {
        ExtractError::could_not_open(path.to_owned(), format!("error reading '{name}': {e}"))
    })?;
    Ok(values.iter().copied().collect())
}

fn read_time_axis(file: &netcdf::File, path: &Path) -> Result<Vec<Timestamp>, ExtractError> {
    let var = file
        .variable(TIME_DIM)
        .ok_or_else(|| ExtractError::variable_missing(path.display(), TIME_DIM))?;

    let units = var
        .attribute("units")
        .and_then(|a| match a.value() {
            Ok(netcdf::AttributeValue::Str(s)) => Some(s),
            _ => None,
        })
        .ok_or_else(|| {
            ExtractError::could_not_open(
                path.to_owned(),
                "time variable has no string 'units' attribute",
            )
        })?;

    let (step, epoch) = parse_cf_time_units(&units).ok_or_else(|| {
        ExtractError::could_not_open(
            path.to_owned(),
            format!("could not parse time units '{units}'"),
        )
    })?;

    let offsets = var.get::<f64, _>(netcdf::Extents::All).map_err(|e| {
        ExtractError::could_not_open(path.to_owned(), format!("error reading time axis: {e}"))
    })?;

    Ok(offsets
        .iter()
        .map(|&v| epoch + step_duration(step, v))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CfTimeStep {
    Seconds,
    Minutes,
    Hours,
    Days,
}

fn step_duration(step: CfTimeStep, count: f64) -> Duration {
    let seconds = match step {
        CfTimeStep::Seconds => count,
        CfTimeStep::Minutes => count * 60.0,
        CfTimeStep::Hours => count * 3600.0,
        CfTimeStep::Days => count * 86400.0,
    };
    // Sub-second precision is irrelevant at reanalysis sampling rates
    Duration::seconds(seconds.round() as i64)
}

/// Parse a CF-style time unit string such as
/// `"minutes since 2020-06-01 00:30:00"`. The epoch is taken as UTC.
pub(crate) fn parse_cf_time_units(units: &str) -> Option<(CfTimeStep, Timestamp)> {
    let mut parts = units.splitn(3, ' ');
    let step = match parts.next()? {
        "seconds" | "second" => CfTimeStep::Seconds,
        "minutes" | "minute" => CfTimeStep::Minutes,
        "hours" | "hour" => CfTimeStep::Hours,
        "days" | "day" => CfTimeStep::Days,
        _ => return None,
    };
    if parts.next()? != "since" {
        return None;
    }
    let epoch_str = parts.next()?.trim();

    let naive = NaiveDateTime::parse_from_str(epoch_str, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(epoch_str, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(epoch_str, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).expect("midnight is always valid"))
        })
        .ok()?;

    Some((step, Utc.from_utc_datetime(&naive)))
}
