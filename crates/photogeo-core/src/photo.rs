use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Geographic position in signed decimal degrees (south and west negative).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Whether both components lie inside their valid ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRecord {
    /// Source file; never interpreted beyond reporting and the write hand-off
    pub path: PathBuf,
    /// Capture time as recorded by the camera (naive local time)
    pub captured_at: NaiveDateTime,
    /// Present for GPS-tagged photos
    pub coordinate: Option<Coordinate>,
}

impl PhotoRecord {
    pub fn new(path: impl Into<PathBuf>, captured_at: NaiveDateTime, coordinate: Option<Coordinate>) -> Self {
        Self {
            path: path.into(),
            captured_at,
            coordinate,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_gps(&self) -> bool {
        self.coordinate.is_some()
    }

    /// Ordering used by the time index: capture time only, other fields never break ties.
    pub fn cmp_by_capture(&self, other: &Self) -> Ordering {
        self.captured_at.cmp(&other.captured_at)
    }
}
