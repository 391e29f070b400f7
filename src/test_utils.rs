//! Builders for synthetic in-memory datasets.
//!
//! These exist mainly for the crate's own tests, but are public so that
//! embedders can exercise code built on [`crate::dataset::GriddedDataset`]
//! without real files on disk.
use chrono::{Duration, TimeZone, Utc};
use indexmap::IndexMap;
use ndarray::Array3;

use crate::dataset::MemoryDataset;
use crate::timegrid::Timestamp;

/// The grid used by every synthetic dataset: 3 latitudes, 3 longitudes.
pub const TEST_LATS: [f64; 3] = [-10.0, 0.0, 10.0];
pub const TEST_LONS: [f64; 3] = [100.0, 110.0, 120.0];

/// A timestamp `n` hours after the fixed test epoch (2020-06-01 00:00 UTC).
pub fn hour(n: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap() + Duration::hours(n)
}

/// The deterministic cell value used by the synthetic fields: a base offset
/// per variable plus one unit per time step, ten per latitude index, and one
/// hundred per longitude index.
pub fn synthetic_value(var_index: usize, time_step: usize, lat_index: usize, lon_index: usize) -> f64 {
    1000.0 * var_index as f64 + time_step as f64 + 10.0 * lat_index as f64 + 100.0 * lon_index as f64
}

/// A dataset with `n_steps` hourly time steps starting at `start` and one
/// field per entry of `variables`, each linear in time so that linear
/// temporal interpolation reproduces it exactly.
pub fn linear_time_dataset(
    name: &str,
    start: Timestamp,
    n_steps: usize,
    variables: &[&str],
) -> MemoryDataset {
    let times: Vec<Timestamp> = (0..n_steps)
        .map(|k| start + Duration::hours(k as i64))
        .collect();

    let mut fields = IndexMap::new();
    for (v, &var) in variables.iter().enumerate() {
        let cube = Array3::from_shape_fn((n_steps, TEST_LATS.len(), TEST_LONS.len()), |(t, i, j)| {
            synthetic_value(v, t, i, j)
        });
        fields.insert(var.to_string(), cube);
    }

    MemoryDataset::new(name, times, TEST_LATS.to_vec(), TEST_LONS.to_vec(), fields)
}

/// A single-time-step dataset holding one constant field per entry of
/// `variables` (the shape of MERRA2's `const_2d_asm` file).
pub fn static_dataset(name: &str, variables: &[(&str, f64)]) -> MemoryDataset {
    let mut fields = IndexMap::new();
    for &(var, value) in variables {
        let cube = Array3::from_elem((1, TEST_LATS.len(), TEST_LONS.len()), value);
        fields.insert(var.to_string(), cube);
    }

    MemoryDataset::new(
        name,
        vec![hour(0)],
        TEST_LATS.to_vec(),
        TEST_LONS.to_vec(),
        fields,
    )
}
