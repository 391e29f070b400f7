use chrono::{DateTime, TimeZone};
use itertools::Itertools;
use num_traits::Float;
use std::fmt::Debug;

#[derive(Debug, thiserror::Error)]
pub enum InterpolationError {
    #[error("Input arrays were different lengths (x.len() = {x_len}, y.len() = {y_len}")]
    InputLengthMismatch { x_len: usize, y_len: usize },
    #[error(
        "Input arrays were too short, needed at least {req_len} elements but got only {actual_len}"
    )]
    InputTooShort { req_len: usize, actual_len: usize },
}

pub trait InterpolationMethod {
    fn interp1d<F: Float + Debug>(
        &self,
        input_x: &[F],
        input_y: &[F],
        output_x: F,
    ) -> Result<F, InterpolationError>;

    fn interp1d_to_time<Z: TimeZone>(
        &self,
        input_t: &[DateTime<Z>],
        input_y: &[f64],
        output_t: DateTime<Z>,
    ) -> Result<f64, InterpolationError> {
        let input_x = input_t.iter().map(datetime_to_float).collect_vec();

        let output_x = datetime_to_float(&output_t);

        self.interp1d(input_x.as_slice(), input_y, output_x)
    }

    /// Interpolate a whole time series onto a new set of timestamps.
    fn interp_series_to_times<Z: TimeZone>(
        &self,
        input_t: &[DateTime<Z>],
        input_y: &[f64],
        output_t: &[DateTime<Z>],
    ) -> Result<Vec<f64>, InterpolationError> {
        let input_x = input_t.iter().map(datetime_to_float).collect_vec();
        output_t
            .iter()
            .map(|t| self.interp1d(input_x.as_slice(), input_y, datetime_to_float(t)))
            .collect()
    }

    fn check_1d_inputs<F: Float + Debug>(
        &self,
        input_x: &[F],
        input_y: &[F],
        min_len: usize,
    ) -> Result<(), InterpolationError> {
        if input_x.len() != input_y.len() {
            return Err(InterpolationError::InputLengthMismatch {
                x_len: input_x.len(),
                y_len: input_y.len(),
            });
        }

        // Now we know both are the same length, so only need to test 1
        if input_x.len() < min_len {
            return Err(InterpolationError::InputTooShort {
                req_len: min_len,
                actual_len: input_x.len(),
            });
        }

        Ok(())
    }
}

/// Piecewise-linear interpolation along a monotonically increasing x axis.
///
/// Output points beyond either end of the input domain produce NaN rather
/// than an error; the extraction layer relies on that to mark requested
/// timestamps a dataset file cannot cover.
pub struct LinearInterp;

impl LinearInterp {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LinearInterp {
    fn default() -> Self {
        Self::new()
    }
}

impl InterpolationMethod for LinearInterp {
    fn interp1d<F: Float + Debug>(
        &self,
        input_x: &[F],
        input_y: &[F],
        output_x: F,
    ) -> Result<F, InterpolationError> {
        self.check_1d_inputs(input_x, input_y, 2)?;

        let first = input_x[0];
        let last = input_x[input_x.len() - 1];
        if output_x < first || output_x > last {
            return Ok(F::nan());
        }

        // Find the first node at or past the output point. output_x is in
        // bounds, so i is in 0..len and i == 0 only when output_x == first.
        let i = input_x.partition_point(|&x| x < output_x);
        if i == 0 {
            return Ok(input_y[0]);
        }

        let (x0, x1) = (input_x[i - 1], input_x[i]);
        let (y0, y1) = (input_y[i - 1], input_y[i]);
        if x1 == x0 {
            return Ok(y0);
        }
        let frac = (output_x - x0) / (x1 - x0);
        Ok(y0 + (y1 - y0) * frac)
    }
}

fn datetime_to_float<Z: TimeZone>(t: &DateTime<Z>) -> f64 {
    let ts = t.timestamp() as f64;
    let ts_frac = t.timestamp_subsec_nanos() as f64;
    ts + ts_frac / 1e9
}
