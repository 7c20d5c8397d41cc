use std::path::Path;

use tracing::{info, warn};

use crate::classify::MediaKind;
use crate::engine::MetadataEngine;
use crate::manifest::Coordinates;
use crate::tags::TagMap;

/// Allowed difference, in degrees, between written and re-read coordinates.
pub const GPS_TOLERANCE: f64 = 0.001;

const VIDEO_GPS_KEYS: &[&str] = &["QuickTime:GPSCoordinates", "Keys:GPSCoordinates", "XMP:GPSLatitude"];
const IMAGE_LATITUDE_KEYS: &[&str] = &["EXIF:GPSLatitude", "Composite:GPSLatitude"];
const IMAGE_LONGITUDE_KEYS: &[&str] = &["EXIF:GPSLongitude", "Composite:GPSLongitude"];

#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    /// GPS present (and, for images, within tolerance).
    Verified,
    /// Image GPS present but outside tolerance. Still counts as a pass.
    Drifted { found: Coordinates },
    /// No GPS tag found after writing.
    Missing,
    /// GPS tag present but not a number.
    Unparsable,
    /// The engine could not read the file back.
    Unreadable(String),
}

impl Verification {
    pub fn passed(&self) -> bool {
        matches!(self, Verification::Verified | Verification::Drifted { .. })
    }
}

/// Re-read `path` and check the GPS tags written for `kind`.
pub fn verify(
    engine: &mut dyn MetadataEngine,
    path: &Path,
    expected: Coordinates,
    kind: MediaKind,
) -> Verification {
    let name = display_name(path);
    let result = match engine.read_tags(path) {
        Ok(tags) if tags.is_empty() => Verification::Unreadable("no metadata returned".to_string()),
        Ok(tags) => check_tags(&tags, expected, kind),
        Err(e) => Verification::Unreadable(e.to_string()),
    };

    match &result {
        Verification::Verified => info!("Metadata verified for {}", name),
        Verification::Drifted { found } => warn!(
            "GPS differs for {} (expected {}, found {}), accepting",
            name, expected, found
        ),
        Verification::Missing => warn!("GPS not found in {}", name),
        Verification::Unparsable => warn!("GPS in {} is not numeric", name),
        Verification::Unreadable(reason) => warn!("Verification error for {}: {}", name, reason),
    }
    result
}

fn check_tags(tags: &TagMap, expected: Coordinates, kind: MediaKind) -> Verification {
    match kind {
        MediaKind::Video => {
            if VIDEO_GPS_KEYS.iter().any(|key| tags.contains_key(*key)) {
                Verification::Verified
            } else {
                Verification::Missing
            }
        }
        MediaKind::Image => {
            let lat = IMAGE_LATITUDE_KEYS.iter().find_map(|key| tags.get(*key));
            let lon = IMAGE_LONGITUDE_KEYS.iter().find_map(|key| tags.get(*key));
            let (Some(lat), Some(lon)) = (lat, lon) else {
                return Verification::Missing;
            };
            let (Some(lat), Some(lon)) = (lat.as_f64(), lon.as_f64()) else {
                return Verification::Unparsable;
            };
            let lat_ok = (lat.abs() - expected.latitude.abs()).abs() < GPS_TOLERANCE;
            let lon_ok = (lon.abs() - expected.longitude.abs()).abs() < GPS_TOLERANCE;
            if lat_ok && lon_ok {
                Verification::Verified
            } else {
                Verification::Drifted {
                    found: Coordinates::new(lat, lon),
                }
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
