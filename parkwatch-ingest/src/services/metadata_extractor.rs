//! Photo metadata extraction
//!
//! Produces a capture timestamp and optional coordinates for one image.
//! EXIF capture time is wall-clock local time at the site; it is interpreted
//! in the process's local timezone without conversion of the reading itself.
//! When no EXIF timestamp exists the file modification time stands in.
//! Extraction never fails: there is always at least a timestamp.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use exif::{In, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Capture timestamp plus optional geotag
#[derive(Debug, Clone)]
pub struct PhotoMetadata {
    pub captured_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Extract capture time and coordinates from an image file
pub fn extract(path: &Path) -> PhotoMetadata {
    let exif = File::open(path).ok().and_then(|file| {
        exif::Reader::new()
            .read_from_container(&mut BufReader::new(file))
            .ok()
    });

    let captured_at = exif
        .as_ref()
        .and_then(exif_capture_time)
        .unwrap_or_else(|| file_mtime(path));

    let (latitude, longitude) = exif
        .as_ref()
        .and_then(exif_coordinates)
        .map(|(lat, lon)| (Some(lat), Some(lon)))
        .unwrap_or((None, None));

    PhotoMetadata {
        captured_at,
        latitude,
        longitude,
    }
}

/// EXIF capture time, preferring DateTimeOriginal over DateTime
fn exif_capture_time(exif: &exif::Exif) -> Option<DateTime<Utc>> {
    for tag in [Tag::DateTimeOriginal, Tag::DateTime] {
        if let Some(field) = exif.get_field(tag, In::PRIMARY) {
            if let Value::Ascii(ref values) = field.value {
                if let Some(naive) = values.first().and_then(|v| parse_exif_datetime(v)) {
                    return Some(attach_local_timezone(naive));
                }
            }
        }
    }
    None
}

/// Parse the EXIF `YYYY:MM:DD HH:MM:SS` form
fn parse_exif_datetime(ascii: &[u8]) -> Option<NaiveDateTime> {
    let dt = exif::DateTime::from_ascii(ascii).ok()?;
    NaiveDate::from_ymd_opt(dt.year as i32, dt.month as u32, dt.day as u32)?
        .and_hms_opt(dt.hour as u32, dt.minute as u32, dt.second as u32)
}

/// Interpret a naive site-local reading in the process's timezone
fn attach_local_timezone(naive: NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Geotag as signed decimal degrees, if both axes are present
fn exif_coordinates(exif: &exif::Exif) -> Option<(f64, f64)> {
    let lat = dms_field(exif, Tag::GPSLatitude)?;
    let lon = dms_field(exif, Tag::GPSLongitude)?;
    let lat_ref = ref_field(exif, Tag::GPSLatitudeRef).unwrap_or('N');
    let lon_ref = ref_field(exif, Tag::GPSLongitudeRef).unwrap_or('E');

    Some((
        apply_hemisphere(lat, lat_ref),
        apply_hemisphere(lon, lon_ref),
    ))
}

fn dms_field(exif: &exif::Exif, tag: Tag) -> Option<[f64; 3]> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    if let Value::Rational(ref parts) = field.value {
        if parts.len() >= 3 {
            return Some([parts[0].to_f64(), parts[1].to_f64(), parts[2].to_f64()]);
        }
    }
    None
}

fn ref_field(exif: &exif::Exif, tag: Tag) -> Option<char> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    if let Value::Ascii(ref values) = field.value {
        return values
            .first()
            .and_then(|v| v.first())
            .map(|b| *b as char);
    }
    None
}

/// Degrees/minutes/seconds to signed decimal degrees
fn apply_hemisphere(dms: [f64; 3], hemisphere: char) -> f64 {
    let decimal = dms[0] + dms[1] / 60.0 + dms[2] / 3600.0;
    match hemisphere {
        'S' | 'W' => -decimal,
        _ => decimal,
    }
}

/// File modification time; current time as last resort
fn file_mtime(path: &Path) -> DateTime<Utc> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}
