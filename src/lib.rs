pub mod coordinates;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod interpolation;
pub mod logging;
pub mod merra2;
#[cfg(feature = "netcdf")]
pub mod netcdf_source;
pub mod test_utils;
pub mod timegrid;
