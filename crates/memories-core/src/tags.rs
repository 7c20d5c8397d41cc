use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classify::MediaKind;
use crate::manifest::Coordinates;
use crate::timestamp::LocalTimestamp;

/// A single tag value as handed to (or read back from) the metadata engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Number(f64),
    Text(String),
}

impl TagValue {
    /// Numeric view; text values are parsed leniently.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Number(n) => Some(*n),
            TagValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Number(n) => write!(f, "{}", n),
            TagValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for TagValue {
    fn from(n: f64) -> Self {
        TagValue::Number(n)
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::Text(s.to_string())
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        TagValue::Text(s)
    }
}

/// Tag name -> value. Ordered so engine invocations are reproducible.
pub type TagMap = BTreeMap<String, TagValue>;

/// EXIF tags for still images.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTagSpec {
    pub date_time_original: String,
    pub create_date: String,
    pub latitude: f64,
    pub longitude: f64,
    pub latitude_ref: &'static str,
    pub longitude_ref: &'static str,
    pub offset_time_original: String,
    pub offset_time: String,
}

/// QuickTime/Keys/XMP tags for videos. GPS is written to several namespaces
/// because players disagree on which one they read.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTagSpec {
    pub quicktime_coordinates: String,
    pub latitude_ref: &'static str,
    pub longitude_ref: &'static str,
    pub keys_coordinates: String,
    pub xmp_latitude: f64,
    pub xmp_longitude: f64,
    pub xmp_gps_date_time: String,
    pub create_date: String,
    pub track_create_date: String,
    pub track_modify_date: String,
    pub media_create_date: String,
    pub media_modify_date: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TagSpec {
    Image(ImageTagSpec),
    Video(VideoTagSpec),
}

/// Translate a capture time and location into the tag set for `kind`.
pub fn build_tags(stamp: &LocalTimestamp, coords: Coordinates, kind: MediaKind) -> TagSpec {
    let lat_abs = coords.latitude.abs();
    let lon_abs = coords.longitude.abs();
    match kind {
        MediaKind::Image => TagSpec::Image(ImageTagSpec {
            date_time_original: stamp.local.clone(),
            create_date: stamp.local.clone(),
            latitude: lat_abs,
            longitude: lon_abs,
            latitude_ref: coords.latitude_ref(),
            longitude_ref: coords.longitude_ref(),
            offset_time_original: stamp.offset.clone(),
            offset_time: stamp.offset.clone(),
        }),
        MediaKind::Video => TagSpec::Video(VideoTagSpec {
            quicktime_coordinates: format!("{:.6}, {:.6}", lat_abs, lon_abs),
            latitude_ref: coords.latitude_ref(),
            longitude_ref: coords.longitude_ref(),
            keys_coordinates: format!("{:.6} {:.6} 0.000000", coords.latitude, coords.longitude),
            xmp_latitude: coords.latitude,
            xmp_longitude: coords.longitude,
            xmp_gps_date_time: stamp.utc_gps_datetime(),
            create_date: stamp.local.clone(),
            track_create_date: stamp.local.clone(),
            track_modify_date: stamp.local.clone(),
            media_create_date: stamp.local.clone(),
            media_modify_date: stamp.local.clone(),
        }),
    }
}

impl TagSpec {
    pub fn kind(&self) -> MediaKind {
        match self {
            TagSpec::Image(_) => MediaKind::Image,
            TagSpec::Video(_) => MediaKind::Video,
        }
    }

    pub fn to_tag_map(&self) -> TagMap {
        let mut tags = TagMap::new();
        let mut put = |name: &str, value: TagValue| {
            tags.insert(name.to_string(), value);
        };
        match self {
            TagSpec::Image(s) => {
                put("DateTimeOriginal", s.date_time_original.as_str().into());
                put("CreateDate", s.create_date.as_str().into());
                put("GPSLatitude", s.latitude.into());
                put("GPSLongitude", s.longitude.into());
                put("GPSLatitudeRef", s.latitude_ref.into());
                put("GPSLongitudeRef", s.longitude_ref.into());
                put("OffsetTimeOriginal", s.offset_time_original.as_str().into());
                put("OffsetTime", s.offset_time.as_str().into());
            }
            TagSpec::Video(s) => {
                put("QuickTime:GPSCoordinates", s.quicktime_coordinates.as_str().into());
                put("QuickTime:GPSLatitudeRef", s.latitude_ref.into());
                put("QuickTime:GPSLongitudeRef", s.longitude_ref.into());
                put("Keys:GPSCoordinates", s.keys_coordinates.as_str().into());
                put("XMP:GPSLatitude", s.xmp_latitude.into());
                put("XMP:GPSLongitude", s.xmp_longitude.into());
                put("XMP:GPSDateTime", s.xmp_gps_date_time.as_str().into());
                put("CreateDate", s.create_date.as_str().into());
                put("TrackCreateDate", s.track_create_date.as_str().into());
                put("TrackModifyDate", s.track_modify_date.as_str().into());
                put("MediaCreateDate", s.media_create_date.as_str().into());
                put("MediaModifyDate", s.media_modify_date.as_str().into());
            }
        }
        tags
    }
}
