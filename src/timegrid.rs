//! Requested-time matrices, coverage windows, and per-station time
//! validation.
//!
//! A station's requested timestamps are irregular: different stations may
//! request different spans, and no station's request needs to line up with a
//! dataset file's native time axis. The [`TimeMatrix`] holds one column per
//! station, right-padded with `None` (the "missing" sentinel) so that ragged
//! requests share one rectangular array.
use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use ndarray::Array2;

/// All requested and native timestamps are UTC.
pub type Timestamp = DateTime<Utc>;

/// The inclusive time range spanned by one dataset file, expanded by the
/// tolerance margin that bridges small gaps between adjacent files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageWindow {
    start: Timestamp,
    end: Timestamp,
}

impl CoverageWindow {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Build the window `[axis[0] - tolerance, axis[-1] + tolerance]` from a
    /// file's native time axis. Returns `None` for an empty axis, which has
    /// no meaningful coverage.
    pub fn from_time_axis(axis: &[Timestamp], tolerance: Duration) -> Option<Self> {
        let first = *axis.first()?;
        let last = *axis.last()?;
        Some(Self {
            start: first - tolerance,
            end: last + tolerance,
        })
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    /// Inclusive containment on both ends.
    pub fn contains(&self, t: Timestamp) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Requested timestamps, one column per station, padded with `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeMatrix {
    cells: Array2<Option<Timestamp>>,
}

impl TimeMatrix {
    pub fn new(cells: Array2<Option<Timestamp>>) -> Self {
        Self { cells }
    }

    /// Build from per-station timestamp lists, which may have different
    /// lengths. Shorter columns are right-padded with the missing sentinel.
    pub fn from_columns(columns: &[Vec<Timestamp>]) -> Self {
        let n_stations = columns.len();
        let capacity = columns.iter().map(Vec::len).max().unwrap_or(0);
        let mut cells = Array2::from_elem((capacity, n_stations), None);
        for (s, col) in columns.iter().enumerate() {
            for (r, &t) in col.iter().enumerate() {
                cells[(r, s)] = Some(t);
            }
        }
        Self { cells }
    }

    /// Every station requests the same timestamps.
    pub fn uniform(times: &[Timestamp], n_stations: usize) -> Self {
        let mut cells = Array2::from_elem((times.len(), n_stations), None);
        for (r, &t) in times.iter().enumerate() {
            for s in 0..n_stations {
                cells[(r, s)] = Some(t);
            }
        }
        Self { cells }
    }

    /// A request with no timestamps at all.
    pub fn empty(n_stations: usize) -> Self {
        Self {
            cells: Array2::from_elem((0, n_stations), None),
        }
    }

    pub fn n_stations(&self) -> usize {
        self.cells.ncols()
    }

    /// The matrix's row capacity (the longest station request, including any
    /// padding).
    pub fn row_capacity(&self) -> usize {
        self.cells.nrows()
    }

    /// True when no cell holds a timestamp.
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    /// A station's valid requested timestamps in request order, with the
    /// missing sentinel filtered out (an explicit filter, not a mask).
    pub fn station_times(&self, station: usize) -> Vec<Timestamp> {
        self.cells.column(station).iter().flatten().copied().collect()
    }

    /// The sorted, deduplicated union of every station's valid timestamps.
    pub fn union_times(&self) -> Vec<Timestamp> {
        self.cells
            .iter()
            .flatten()
            .copied()
            .sorted()
            .dedup()
            .collect()
    }

    /// The per-station temporal validator: a copy of this matrix in which
    /// every timestamp outside `window` is replaced by the missing sentinel.
    ///
    /// Idempotent: restricting an already-restricted matrix to the same
    /// window returns it unchanged.
    pub fn restrict_to_window(&self, window: &CoverageWindow) -> TimeMatrix {
        let cells = self.cells.mapv(|cell| cell.filter(|&t| window.contains(t)));
        Self { cells }
    }
}
