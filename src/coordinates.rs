//! Station coordinates and deduplication onto unique grid-query axes.
use ndarray::Array1;

use crate::error::ExtractError;

/// An ordered set of point locations for which time series are extracted.
///
/// Station identity is positional: the station at index `i` is the pair
/// `(lats[i], lons[i])`, and every matrix returned by the extractor uses the
/// same column order. Construction fails fast if the two sequences do not
/// pair up, before any dataset file is touched.
#[derive(Debug, Clone, PartialEq)]
pub struct StationSet {
    lats: Array1<f64>,
    lons: Array1<f64>,
}

impl StationSet {
    pub fn new(lats: Array1<f64>, lons: Array1<f64>) -> Result<Self, ExtractError> {
        if lats.len() != lons.len() {
            return Err(ExtractError::CoordinateLengthMismatch {
                n_lats: lats.len(),
                n_lons: lons.len(),
            });
        }
        Ok(Self { lats, lons })
    }

    pub fn from_slices(lats: &[f64], lons: &[f64]) -> Result<Self, ExtractError> {
        Self::new(Array1::from(lats.to_vec()), Array1::from(lons.to_vec()))
    }

    /// Number of stations.
    pub fn len(&self) -> usize {
        self.lats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lats.is_empty()
    }

    pub fn latitude(&self, station: usize) -> f64 {
        self.lats[station]
    }

    pub fn longitude(&self, station: usize) -> f64 {
        self.lons[station]
    }

    pub fn latitudes(&self) -> &Array1<f64> {
        &self.lats
    }

    pub fn longitudes(&self) -> &Array1<f64> {
        &self.lons
    }

    /// Iterate over `(lat, lon)` pairs in station order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.lats.iter().copied().zip(self.lons.iter().copied())
    }
}

/// Sorted unique latitude/longitude values with inverse indices back to the
/// original station order.
///
/// Multiple stations often share a grid cell (or an entire coordinate), so
/// the extractor queries the dataset once per unique value pair and fans the
/// result back out through the inverse indices. The deduplication is
/// lossless: [`UniqueAxes::station_coordinate`] reconstructs each station's
/// original pair exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueAxes {
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    pub lat_inverse: Vec<usize>,
    pub lon_inverse: Vec<usize>,
}

impl UniqueAxes {
    pub fn from_stations(stations: &StationSet) -> Self {
        let (lats, lat_inverse) = unique_with_inverse(stations.lats.as_slice().unwrap_or(&[]));
        let (lons, lon_inverse) = unique_with_inverse(stations.lons.as_slice().unwrap_or(&[]));
        Self {
            lats,
            lons,
            lat_inverse,
            lon_inverse,
        }
    }

    /// The original `(lat, lon)` pair for a station, reconstructed from the
    /// unique sets.
    pub fn station_coordinate(&self, station: usize) -> (f64, f64) {
        (
            self.lats[self.lat_inverse[station]],
            self.lons[self.lon_inverse[station]],
        )
    }

    /// The `(lat index, lon index)` cell key for a station.
    pub fn station_cell(&self, station: usize) -> (usize, usize) {
        (self.lat_inverse[station], self.lon_inverse[station])
    }
}

/// Sort and deduplicate `values`, returning the unique sorted list and, for
/// each input position, the index of its value in that list.
fn unique_with_inverse(values: &[f64]) -> (Vec<f64>, Vec<usize>) {
    let mut unique: Vec<f64> = values.to_vec();
    unique.sort_by(f64::total_cmp);
    unique.dedup_by(|a, b| a.total_cmp(b).is_eq());

    let inverse = values
        .iter()
        .map(|v| {
            unique
                .binary_search_by(|u| u.total_cmp(v))
                .expect("every input value is present in its own unique set")
        })
        .collect();

    (unique, inverse)
}
