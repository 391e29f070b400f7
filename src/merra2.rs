//! The fixed MERRA2 orchestration: file classification, extraction of the
//! clear-sky variable set, and the physical corrections that turn raw MERRA2
//! values into model-ready inputs.
use std::path::{Path, PathBuf};

use chrono::Duration;
use error_stack::{Report, ResultExt};
use ndarray::{Array1, Array2};

use crate::coordinates::StationSet;
use crate::dataset::DatasetStore;
use crate::error::ExtractError;
use crate::extract::{extract_dataset_list, extract_static, AlignMode};
use crate::timegrid::{TimeMatrix, Timestamp};

/// The MERRA2 variables consumed by the clear-sky model, in extraction order:
/// total extinction AOD at 550 nm, total aerosol scattering, Angstrom
/// exponent, surface albedo, total ozone column, total water vapour column,
/// surface pressure.
pub const MERRA2_VARIABLES: [&str; 7] = [
    "TOTEXTTAU",
    "TOTSCATAU",
    "TOTANGSTR",
    "ALBEDO",
    "TO3",
    "TQV",
    "PS",
];

/// Surface geopotential, taken from the constants file.
pub const GEOPOTENTIAL_VARIABLE: &str = "PHIS";

/// Standard gravity (m s-2), used to turn geopotential into geometric height.
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Aerosol/water-vapour scale height (m) for the elevation correction.
pub const SCALE_HEIGHT_M: f64 = 2100.0;

/// MERRA2 carries no NO2, so the pipeline synthesizes this constant column
/// amount (atm-cm).
pub const DEFAULT_NO2: f64 = 0.0002;

/// Half of MERRA2's nominal hourly sampling interval; bridges the gap
/// between the last time step of one daily file and the first of the next.
pub fn sampling_tolerance() -> Duration {
    Duration::minutes(30)
}

/// MERRA2 data files found in a directory, split by role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merra2Inventory {
    /// Time-series files, sorted by name. MERRA2 chunk names embed the date,
    /// so name order is time-coverage order, which the stitcher requires.
    pub timeseries: Vec<PathBuf>,
    /// `const_2d_asm` constants files (surface geopotential etc.).
    pub constants: Vec<PathBuf>,
}

impl Merra2Inventory {
    pub fn first_constants_file(&self) -> Result<&Path, ExtractError> {
        self.constants
            .first()
            .map(PathBuf::as_path)
            .ok_or(ExtractError::MissingDataFile("const_2d_asm constants"))
    }
}

/// Classify the files of a MERRA2 data directory by name substring: "index"
/// files are ignored, "const_2d_asm" files are constants, anything else
/// containing "merra2" is a time-series chunk. No other metadata is read.
pub fn classify_data_dir(dir: &Path) -> Result<Merra2Inventory, ExtractError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ExtractError::CouldNotReadDir {
        path: dir.to_owned(),
        reason: e.to_string(),
    })?;

    let mut timeseries = Vec::new();
    let mut constants = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ExtractError::CouldNotReadDir {
            path: dir.to_owned(),
            reason: e.to_string(),
        })?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if name.contains("index") {
            continue;
        } else if name.contains("const_2d_asm") {
            constants.push(path);
        } else if name.contains("merra2") {
            timeseries.push(path);
        }
    }

    timeseries.sort();
    constants.sort();

    if timeseries.is_empty() {
        return Err(ExtractError::MissingDataFile("merra2 time-series"));
    }
    log::info!(
        "{}: {} time-series file(s), {} constants file(s)",
        dir.display(),
        timeseries.len(),
        constants.len()
    );

    Ok(Merra2Inventory {
        timeseries,
        constants,
    })
}

/// The extracted, corrected MERRA2 fields, all [time-row × station-column]
/// and row-aligned with `times`.
#[derive(Debug, Clone)]
pub struct Merra2Fields {
    /// The stitched row timestamps.
    pub times: Vec<Timestamp>,
    /// Total aerosol scattering optical depth.
    pub aerosol_scattering: Array2<f64>,
    /// Total extinction AOD at 550 nm, scale-height corrected.
    pub aod_550: Array2<f64>,
    /// Angstrom exponent, clamped to be non-negative.
    pub angstrom: Array2<f64>,
    /// Ozone column in atm-cm.
    pub ozone: Array2<f64>,
    /// Surface albedo.
    pub albedo: Array2<f64>,
    /// Precipitable water vapour in cm, scale-height corrected.
    pub water_vapour: Array2<f64>,
    /// Surface pressure in Pa.
    pub pressure: Array2<f64>,
    /// Synthesized constant NO2 column in atm-cm.
    pub no2: Array2<f64>,
}

/// Run the full MERRA2 pipeline for a station set.
///
/// Classifies `data_dir`, stitches the seven [`MERRA2_VARIABLES`] in
/// interpolation mode, pulls `PHIS` from the constants file, then applies
/// the unit conversions, the per-station scale-height correction, the
/// Angstrom clamp, and the NO2 synthesis.
pub fn extract_for_merra2<S: DatasetStore>(
    store: &S,
    stations: &StationSet,
    times: &TimeMatrix,
    elevation: &Array1<f64>,
    data_dir: &Path,
) -> error_stack::Result<Merra2Fields, ExtractError> {
    let inventory = classify_data_dir(data_dir).map_err(Report::new)?;
    extract_merra2_inventory(store, stations, times, elevation, &inventory)
}

/// As [`extract_for_merra2`], but over an already-classified inventory.
pub fn extract_merra2_inventory<S: DatasetStore>(
    store: &S,
    stations: &StationSet,
    times: &TimeMatrix,
    elevation: &Array1<f64>,
    inventory: &Merra2Inventory,
) -> error_stack::Result<Merra2Fields, ExtractError> {
    if elevation.len() != stations.len() {
        error_stack::bail!(ExtractError::ElevationLengthMismatch {
            n_elev: elevation.len(),
            n_stations: stations.len(),
        });
    }

    let block = extract_dataset_list(
        store,
        &inventory.timeseries,
        stations,
        &MERRA2_VARIABLES,
        times,
        AlignMode::Interpolate,
        sampling_tolerance(),
    )
    .attach_printable("while extracting the MERRA2 time-series variables")?;

    let variables: [Array2<f64>; 7] = block
        .variables
        .try_into()
        .expect("the stitcher returns one matrix per requested variable");
    let [aod_550, aerosol_scattering, angstrom, albedo, ozone, water_vapour, pressure] = variables;

    let constants_path = inventory.first_constants_file().map_err(Report::new)?;
    let constants = store.open(constants_path).map_err(Report::new)?;
    let phis = extract_static(&constants, stations, &[GEOPOTENTIAL_VARIABLE])
        .attach_printable("while extracting the MERRA2 surface geopotential")?
        .pop()
        .expect("extract_static returns one array per requested variable");

    // raw MERRA2 units to clear-sky model units
    let water_vapour = water_vapour * 0.1;
    let ozone = ozone * 0.001;

    // geopotential to geometric height, then the per-station scale-height
    // factor exp((h0 - h) / Ha)
    let dataset_height = phis / STANDARD_GRAVITY;
    let correction = scale_height_correction(elevation, &dataset_height);

    let aod_550 = apply_station_factors(aod_550, &correction);
    let water_vapour = apply_station_factors(water_vapour, &correction);

    // negative Angstrom exponents are unphysical
    let angstrom = angstrom.mapv(|v| v.max(0.0));

    let no2 = Array2::from_elem((block.times.len(), stations.len()), DEFAULT_NO2);

    Ok(Merra2Fields {
        times: block.times,
        aerosol_scattering,
        aod_550,
        angstrom,
        ozone,
        albedo,
        water_vapour,
        pressure,
        no2,
    })
}

/// The elevation correction factor for each station: `exp((h0 - h) / Ha)`
/// with `h0` the station elevation and `h` the dataset surface height, both
/// in metres.
pub fn scale_height_correction(
    station_elevation: &Array1<f64>,
    dataset_height: &Array1<f64>,
) -> Array1<f64> {
    let mut out = Array1::zeros(station_elevation.len());
    for (o, (&h0, &h)) in out
        .iter_mut()
        .zip(station_elevation.iter().zip(dataset_height.iter()))
    {
        *o = ((h0 - h) / SCALE_HEIGHT_M).exp();
    }
    out
}

/// Multiply each station column of `matrix` by its factor, broadcast over
/// all time rows.
fn apply_station_factors(mut matrix: Array2<f64>, factors: &Array1<f64>) -> Array2<f64> {
    for (mut column, &factor) in matrix.columns_mut().into_iter().zip(factors.iter()) {
        column.mapv_inplace(|v| v * factor);
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MemoryStore;
    use crate::test_utils::{hour, linear_time_dataset, static_dataset};
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rstest::{fixture, rstest};

    #[rstest]
    #[case::equal_heights(500.0, 500.0)]
    #[case::station_above(800.0, 500.0)]
    #[case::station_below(200.0, 500.0)]
    fn test_scale_height_correction_direction(#[case] h0: f64, #[case] h: f64) {
        let factor = scale_height_correction(&array![h0], &array![h])[0];
        if h0 == h {
            assert_abs_diff_eq!(factor, 1.0);
        } else if h0 > h {
            assert!(factor > 1.0, "factor {factor} should exceed 1");
        } else {
            assert!(factor < 1.0, "factor {factor} should be below 1");
        }
    }

    #[test]
    fn test_scale_height_correction_value() {
        let factor = scale_height_correction(&array![2100.0], &array![0.0])[0];
        assert_abs_diff_eq!(factor, 1.0_f64.exp(), epsilon = 1e-12);
    }

    /// A scratch directory unique to this test run, so concurrent
    /// invocations and leftovers from crashed runs cannot interfere.
    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("clearsky_rs_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_classify_data_dir() {
        let dir = scratch_dir("classify");
        for name in [
            "merra2_20200601.nc4",
            "merra2_20200602.nc4",
            "merra2_const_2d_asm.nc4",
            "merra2_index.html",
            "notes.txt",
        ] {
            std::fs::write(dir.join(name), b"").unwrap();
        }

        let inventory = classify_data_dir(&dir).unwrap();
        assert_eq!(
            inventory.timeseries,
            vec![dir.join("merra2_20200601.nc4"), dir.join("merra2_20200602.nc4")]
        );
        assert_eq!(inventory.constants, vec![dir.join("merra2_const_2d_asm.nc4")]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_classify_empty_dir_is_an_error() {
        let dir = scratch_dir("classify_empty");

        let err = classify_data_dir(&dir).unwrap_err();
        assert!(matches!(err, ExtractError::MissingDataFile(_)));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[fixture]
    fn merra2_store() -> (MemoryStore, Merra2Inventory) {
        let mut store = MemoryStore::new();
        store.insert(
            "merra2_day1.nc4",
            linear_time_dataset("merra2_day1.nc4", hour(0), 24, &MERRA2_VARIABLES),
        );
        store.insert(
            "merra2_day2.nc4",
            linear_time_dataset("merra2_day2.nc4", hour(24), 24, &MERRA2_VARIABLES),
        );
        store.insert(
            "const_2d_asm.nc4",
            static_dataset("const_2d_asm.nc4", &[(GEOPOTENTIAL_VARIABLE, 4903.325)]),
        );
        let inventory = Merra2Inventory {
            timeseries: vec![PathBuf::from("merra2_day1.nc4"), PathBuf::from("merra2_day2.nc4")],
            constants: vec![PathBuf::from("const_2d_asm.nc4")],
        };
        (store, inventory)
    }

    #[rstest]
    fn test_pipeline_shapes_and_no2(merra2_store: (MemoryStore, Merra2Inventory)) {
        let (store, inventory) = merra2_store;
        let stations = StationSet::from_slices(&[0.0, 10.0], &[110.0, 120.0]).unwrap();
        // two rows from day 1, one from day 2
        let request = [hour(2), hour(3), hour(26)];
        let times = TimeMatrix::uniform(&request, 2);
        let elevation = array![500.0, 500.0];

        let fields =
            extract_merra2_inventory(&store, &stations, &times, &elevation, &inventory).unwrap();

        assert_eq!(fields.times, request.to_vec());
        for matrix in [
            &fields.aerosol_scattering,
            &fields.aod_550,
            &fields.angstrom,
            &fields.ozone,
            &fields.albedo,
            &fields.water_vapour,
            &fields.pressure,
            &fields.no2,
        ] {
            assert_eq!(matrix.dim(), (3, 2));
        }
        assert!(fields.no2.iter().all(|&v| v == DEFAULT_NO2));
    }

    #[rstest]
    fn test_pipeline_unit_and_height_corrections(merra2_store: (MemoryStore, Merra2Inventory)) {
        let (store, inventory) = merra2_store;
        let stations = StationSet::from_slices(&[0.0], &[110.0]).unwrap();
        let times = TimeMatrix::uniform(&[hour(2)], 1);
        // PHIS of 4903.325 corresponds to a dataset height of 500 m, so a
        // station at that exact height gets a correction factor of 1
        let dataset_height = 4903.325 / STANDARD_GRAVITY;
        let elevation = array![dataset_height];

        let fields =
            extract_merra2_inventory(&store, &stations, &times, &elevation, &inventory).unwrap();

        // synthetic values at hour 2, cell (1, 1), per variable index
        let raw = |v: usize| crate::test_utils::synthetic_value(v, 2, 1, 1);
        assert_abs_diff_eq!(fields.aod_550[(0, 0)], raw(0), epsilon = 1e-9);
        assert_abs_diff_eq!(fields.aerosol_scattering[(0, 0)], raw(1), epsilon = 1e-9);
        assert_abs_diff_eq!(fields.angstrom[(0, 0)], raw(2), epsilon = 1e-9);
        assert_abs_diff_eq!(fields.albedo[(0, 0)], raw(3), epsilon = 1e-9);
        assert_abs_diff_eq!(fields.ozone[(0, 0)], raw(4) * 0.001, epsilon = 1e-9);
        assert_abs_diff_eq!(fields.water_vapour[(0, 0)], raw(5) * 0.1, epsilon = 1e-9);
        assert_abs_diff_eq!(fields.pressure[(0, 0)], raw(6), epsilon = 1e-9);
    }

    #[rstest]
    fn test_pipeline_scale_height_applied(merra2_store: (MemoryStore, Merra2Inventory)) {
        let (store, inventory) = merra2_store;
        let stations = StationSet::from_slices(&[0.0], &[110.0]).unwrap();
        let times = TimeMatrix::uniform(&[hour(2)], 1);
        let dataset_height = 4903.325 / STANDARD_GRAVITY;
        // one scale height above the dataset surface
        let elevation = array![dataset_height + SCALE_HEIGHT_M];

        let fields =
            extract_merra2_inventory(&store, &stations, &times, &elevation, &inventory).unwrap();

        let raw = |v: usize| crate::test_utils::synthetic_value(v, 2, 1, 1);
        let e = 1.0_f64.exp();
        assert_abs_diff_eq!(fields.aod_550[(0, 0)], raw(0) * e, epsilon = 1e-9);
        assert_abs_diff_eq!(fields.water_vapour[(0, 0)], raw(5) * 0.1 * e, epsilon = 1e-9);
        // only AOD and water vapour are corrected
        assert_abs_diff_eq!(fields.pressure[(0, 0)], raw(6), epsilon = 1e-9);
    }

    #[rstest]
    fn test_angstrom_clamp(merra2_store: (MemoryStore, Merra2Inventory)) {
        let (_, inventory) = merra2_store;
        let mut store = MemoryStore::new();
        // a day-1 file whose TOTANGSTR field is negative everywhere
        let negative = {
            use indexmap::IndexMap;
            use ndarray::Array3;
            let mut fields: IndexMap<String, Array3<f64>> = IndexMap::new();
            for (v, var) in MERRA2_VARIABLES.iter().enumerate() {
                let cube = Array3::from_shape_fn((24, 3, 3), |(t, i, j)| {
                    let value = crate::test_utils::synthetic_value(v, t, i, j);
                    if *var == "TOTANGSTR" {
                        -value - 1.0
                    } else {
                        value
                    }
                });
                fields.insert(var.to_string(), cube);
            }
            crate::dataset::MemoryDataset::new(
                "merra2_day1.nc4",
                (0..24i64).map(hour).collect(),
                crate::test_utils::TEST_LATS.to_vec(),
                crate::test_utils::TEST_LONS.to_vec(),
                fields,
            )
        };
        store.insert("merra2_day1.nc4", negative);
        store.insert(
            "merra2_day2.nc4",
            linear_time_dataset("merra2_day2.nc4", hour(24), 24, &MERRA2_VARIABLES),
        );
        store.insert(
            "const_2d_asm.nc4",
            static_dataset("const_2d_asm.nc4", &[(GEOPOTENTIAL_VARIABLE, 4903.325)]),
        );

        let stations = StationSet::from_slices(&[0.0], &[110.0]).unwrap();
        let times = TimeMatrix::uniform(&[hour(2), hour(26)], 1);
        let elevation = array![0.0];

        let fields =
            extract_merra2_inventory(&store, &stations, &times, &elevation, &inventory).unwrap();

        // day 1's negative value is clamped to zero, day 2's positive value survives
        assert_abs_diff_eq!(fields.angstrom[(0, 0)], 0.0);
        assert!(fields.angstrom[(1, 0)] > 0.0);
    }

    #[rstest]
    fn test_elevation_length_mismatch(merra2_store: (MemoryStore, Merra2Inventory)) {
        let (store, inventory) = merra2_store;
        let stations = StationSet::from_slices(&[0.0, 10.0], &[110.0, 120.0]).unwrap();
        let times = TimeMatrix::uniform(&[hour(2)], 2);
        let elevation = array![500.0];

        let report =
            extract_merra2_inventory(&store, &stations, &times, &elevation, &inventory)
                .unwrap_err();
        assert!(matches!(
            report.current_context(),
            ExtractError::ElevationLengthMismatch { .. }
        ));
    }
}
