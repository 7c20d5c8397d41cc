use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};

static COORDINATE_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<lat>[-+]?\d*\.?\d+)\s*,\s*(?P<lon>[-+]?\d*\.?\d+)").unwrap()
});

/// Top level of `memories_history.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "Saved Media", default)]
    pub saved_media: Vec<ManifestRecord>,
}

/// One saved memory. Fields are optional so a single bad record does not
/// reject the whole manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestRecord {
    #[serde(rename = "Date", default)]
    pub date: Option<String>,
    #[serde(rename = "Media Type", default)]
    pub media_type: Option<String>,
    #[serde(rename = "Location", default)]
    pub location: Option<String>,
    #[serde(rename = "Media Download Url", default)]
    pub media_download_url: Option<String>,
}

impl Manifest {
    /// Read and parse the manifest. Any failure here is fatal for the run.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Manifest not found: {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
            .with_context(|| format!("Invalid manifest JSON: {}", path.display()))
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> anyhow::Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Signed decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Extract the pair from free text like `Latitude, Longitude: 43.65, -79.38`.
    ///
    /// Only the text after the first `:` is searched when one is present, so
    /// labels never contribute digits. Out-of-range values are rejected.
    pub fn parse_location(raw: &str) -> Option<Self> {
        let body = match raw.split_once(':') {
            Some((_, rest)) => rest,
            None => raw,
        };
        let caps = COORDINATE_PAIR_RE.captures(body)?;
        let latitude: f64 = caps.name("lat")?.as_str().parse().ok()?;
        let longitude: f64 = caps.name("lon")?.as_str().parse().ok()?;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(Self { latitude, longitude })
    }

    pub fn latitude_ref(&self) -> &'static str {
        if self.latitude >= 0.0 {
            "N"
        } else {
            "S"
        }
    }

    pub fn longitude_ref(&self) -> &'static str {
        if self.longitude >= 0.0 {
            "E"
        } else {
            "W"
        }
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest() {
        let json = br#"{
            "Saved Media": [
                {
                    "Date": "2024-06-01 12:00:00 UTC",
                    "Media Type": "Video",
                    "Location": "Latitude, Longitude: 43.6532, -79.3832",
                    "Media Download Url": "https://cdn.example/clip.mp4"
                },
                { "Date": "2024-06-02 08:00:00 UTC", "Media Type": "Image" }
            ]
        }"#;
        let manifest = Manifest::from_reader(&json[..]).unwrap();
        assert_eq!(manifest.saved_media.len(), 2);
        let first = &manifest.saved_media[0];
        assert_eq!(first.media_type.as_deref(), Some("Video"));
        assert_eq!(first.media_download_url.as_deref(), Some("https://cdn.example/clip.mp4"));
        assert!(manifest.saved_media[1].media_download_url.is_none());
    }

    #[test]
    fn test_missing_saved_media_is_empty() {
        let manifest = Manifest::from_reader(&b"{}"[..]).unwrap();
        assert!(manifest.saved_media.is_empty());
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Manifest::load(&dir.path().join("missing.json")).is_err());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, b"{ not json").unwrap();
        let err = Manifest::load(&bad).unwrap_err();
        assert!(err.to_string().contains("Invalid manifest JSON"));
    }

    #[test]
    fn test_parse_location() {
        let c = Coordinates::parse_location("geo: 43.6532, -79.3832").unwrap();
        assert_eq!(c, Coordinates::new(43.6532, -79.3832));
        assert_eq!(c.latitude_ref(), "N");
        assert_eq!(c.longitude_ref(), "W");

        let c = Coordinates::parse_location("Latitude, Longitude: -33.8688, 151.2093").unwrap();
        assert_eq!(c.latitude_ref(), "S");
        assert_eq!(c.longitude_ref(), "E");

        assert!(Coordinates::parse_location("").is_none());
        assert!(Coordinates::parse_location("Latitude, Longitude: unknown").is_none());
        assert!(Coordinates::parse_location("geo: 143.0, 10.0").is_none());

        let c = Coordinates::parse_location("geo: .5, -.25").unwrap();
        assert_eq!(c, Coordinates::new(0.5, -0.25));
    }
}
