use std::fs::File;
use std::io::{BufRead, BufReader, Seek};
use std::path::Path;

use chrono::NaiveDateTime;
use exif::{Exif, In, Reader, Tag, Value};
use thiserror::Error;

use crate::photo::{Coordinate, PhotoRecord};

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("cannot open file: {0}")]
    Io(#[from] std::io::Error),

    #[error("no readable EXIF: {0}")]
    Exif(#[from] exif::Error),

    #[error("EXIF has no capture time")]
    MissingTimestamp,
}

/// Read capture time and GPS position from a photo on disk.
pub fn read_photo(path: &Path) -> Result<PhotoRecord, ReadError> {
    let file = File::open(path)?;
    read_container(path, &mut BufReader::new(file))
}

/// `path` only labels the record; metadata comes from `container`.
fn read_container<R: BufRead + Seek>(path: &Path, container: &mut R) -> Result<PhotoRecord, ReadError> {
    let exif = Reader::new().read_from_container(container)?;
    let captured_at = capture_time(&exif).ok_or(ReadError::MissingTimestamp)?;
    Ok(PhotoRecord::new(path, captured_at, gps_coordinate(&exif)))
}

/// EXIF datetimes have no timezone info - they are local time as-is.
fn capture_time(exif: &Exif) -> Option<NaiveDateTime> {
    let tags = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

    for tag in &tags {
        if let Some(field) = exif.get_field(*tag, In::PRIMARY) {
            let val = field.display_value().to_string();
            if let Some(dt) = parse_exif_datetime(&val) {
                return Some(dt);
            }
        }
    }

    None
}

fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let cleaned = s
        .trim()
        .trim_matches('"')
        .replace(['-', '/', '\\', '.'], ":");

    if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, "%Y:%m:%d %H:%M:%S") {
        return Some(dt);
    }

    let date = chrono::NaiveDate::parse_from_str(cleaned.split(' ').next()?, "%Y:%m:%d").ok()?;
    date.and_hms_opt(0, 0, 0)
}

/// Missing or malformed GPS tags mean "untagged", never an error.
fn gps_coordinate(exif: &Exif) -> Option<Coordinate> {
    let latitude = gps_axis(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S')?;
    let longitude = gps_axis(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W')?;
    let coordinate = Coordinate::new(latitude, longitude);
    coordinate.is_valid().then_some(coordinate)
}

fn gps_axis(exif: &Exif, value_tag: Tag, ref_tag: Tag, negative_ref: u8) -> Option<f64> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let Value::Rational(ref parts) = field.value else {
        return None;
    };
    let magnitude = dms_to_degrees(&parts.iter().map(|r| r.to_f64()).collect::<Vec<_>>())?;

    let reference = exif.get_field(ref_tag, In::PRIMARY).and_then(|f| match f.value {
        Value::Ascii(ref v) => v.first().and_then(|s| s.first().copied()),
        _ => None,
    });

    match reference.map(|c| c.to_ascii_uppercase()) {
        Some(c) if c == negative_ref => Some(-magnitude),
        _ => Some(magnitude),
    }
}

/// Degrees, minutes, seconds as stored in EXIF; trailing parts may be omitted.
fn dms_to_degrees(parts: &[f64]) -> Option<f64> {
    let degrees = *parts.first()?;
    let minutes = parts.get(1).copied().unwrap_or(0.0);
    let seconds = parts.get(2).copied().unwrap_or(0.0);
    let value = degrees + minutes / 60.0 + seconds / 3600.0;
    value.is_finite().then_some(value)
}
