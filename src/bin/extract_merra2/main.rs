use std::{path::PathBuf, process::ExitCode};

use chrono::{DateTime, Utc};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use clearsky_rs::{
    coordinates::StationSet,
    error::ExtractError,
    logging::init_logging,
    merra2::{extract_for_merra2, Merra2Fields},
    netcdf_source::NetcdfStore,
    timegrid::TimeMatrix,
};
use error_stack::{Report, ResultExt};
use figment::{providers::Format, providers::Toml, Figment};
use ndarray::{Array1, Array2};
use serde::Deserialize;

fn main() -> ExitCode {
    let clargs = Cli::parse();
    init_logging(clargs.verbosity.log_level_filter());

    if let Err(e) = main_inner(clargs) {
        eprintln!("ERROR: {e:?}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn main_inner(clargs: Cli) -> error_stack::Result<(), ExtractError> {
    let request = load_request(&clargs.request_file)?;

    let stations = StationSet::new(
        Array1::from_iter(request.stations.iter().map(|s| s.lat)),
        Array1::from_iter(request.stations.iter().map(|s| s.lon)),
    )
    .map_err(Report::new)?;
    let elevation = Array1::from_iter(request.stations.iter().map(|s| s.elevation));
    let times = TimeMatrix::uniform(&request.times, stations.len());

    log::info!(
        "extracting {} timestamps for {} station(s) from {}",
        request.times.len(),
        stations.len(),
        request.data_dir.display()
    );

    let fields = extract_for_merra2(
        &NetcdfStore,
        &stations,
        &times,
        &elevation,
        &request.data_dir,
    )?;

    print_fields(&fields);
    Ok(())
}

/// Extract the clear-sky MERRA2 variable set for a list of stations
///
/// The request file is TOML:
///
/// ```toml
/// data_dir = "/data/merra2/"
/// times = ["2020-06-01T08:30:00Z", "2020-06-01T09:30:00Z"]
///
/// [[stations]]
/// lat = 46.5
/// lon = 6.6
/// elevation = 372.0
/// ```
///
/// Every station shares the same requested timestamps. The extracted fields
/// are written to stdout as one CSV block per variable; log messages go to
/// stderr.
#[derive(Debug, Parser)]
struct Cli {
    /// Path to the TOML extraction request.
    request_file: PathBuf,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

#[derive(Debug, Deserialize)]
struct ExtractionRequest {
    data_dir: PathBuf,
    times: Vec<DateTime<Utc>>,
    stations: Vec<StationRequest>,
}

#[derive(Debug, Deserialize)]
struct StationRequest {
    lat: f64,
    lon: f64,
    elevation: f64,
}

fn load_request(path: &PathBuf) -> error_stack::Result<ExtractionRequest, ExtractError> {
    Figment::new()
        .merge(Toml::file(path))
        .extract::<ExtractionRequest>()
        .change_context_lazy(|| ExtractError::CouldNotOpen {
            path: path.clone(),
            reason: "invalid extraction request".to_string(),
        })
}

fn print_fields(fields: &Merra2Fields) {
    let blocks: [(&str, &Array2<f64>); 8] = [
        ("aerosol_scattering", &fields.aerosol_scattering),
        ("aod_550", &fields.aod_550),
        ("angstrom", &fields.angstrom),
        ("ozone", &fields.ozone),
        ("albedo", &fields.albedo),
        ("water_vapour", &fields.water_vapour),
        ("pressure", &fields.pressure),
        ("no2", &fields.no2),
    ];

    for (name, matrix) in blocks {
        println!("# {name}");
        for (row, time) in fields.times.iter().enumerate() {
            let values = matrix
                .row(row)
                .iter()
                .map(|v| format!("{v:.6}"))
                .collect::<Vec<_>>()
                .join(",");
            println!("{},{values}", time.to_rfc3339());
        }
    }
}
