use chrono::{DateTime, NaiveDateTime, Offset, Utc};
use chrono_tz::Tz;

pub const DEFAULT_TIMEZONE: &str = "America/Toronto";

/// Layout of the manifest's `Date` field once the ` UTC` suffix is removed.
const MANIFEST_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// EXIF/QuickTime date layout.
const TAG_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Parse a manifest date such as `2024-06-01 12:00:00 UTC`.
pub fn parse_manifest_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix("UTC").unwrap_or(trimmed).trim_end();
    // Some exports already use the EXIF-style colon layout.
    NaiveDateTime::parse_from_str(trimmed, MANIFEST_DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, TAG_DATE_FORMAT))
        .ok()
        .map(|naive| naive.and_utc())
}

/// `YYYYMMDD_HHMMSS`, used in output filenames and scratch directory names.
pub fn sanitized_date(utc: &DateTime<Utc>) -> String {
    utc.format("%Y%m%d_%H%M%S").to_string()
}

/// A capture instant expressed for tagging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTimestamp {
    pub utc: DateTime<Utc>,
    /// `YYYY:MM:DD HH:MM:SS` in the local zone.
    pub local: String,
    /// `±HH:MM`.
    pub offset: String,
}

impl LocalTimestamp {
    /// UTC instant in the `XMP:GPSDateTime` layout.
    pub fn utc_gps_datetime(&self) -> String {
        self.utc.format("%Y:%m:%dT%H:%M:%SZ").to_string()
    }
}

/// Policy turning a UTC capture instant into local time.
pub trait Localizer {
    fn localize(&self, utc: DateTime<Utc>) -> LocalTimestamp;
}

/// Every capture is assumed to have happened in one configured zone.
#[derive(Debug, Clone, Copy)]
pub struct FixedZone {
    tz: Tz,
}

impl FixedZone {
    pub fn new(name: &str) -> anyhow::Result<Self> {
        let tz = name
            .parse::<Tz>()
            .map_err(|_| anyhow::anyhow!("Unknown timezone: {}", name))?;
        Ok(Self { tz })
    }

    pub fn name(&self) -> &'static str {
        self.tz.name()
    }
}

impl Default for FixedZone {
    fn default() -> Self {
        Self { tz: chrono_tz::America::Toronto }
    }
}

impl Localizer for FixedZone {
    fn localize(&self, utc: DateTime<Utc>) -> LocalTimestamp {
        let local = utc.with_timezone(&self.tz);
        let offset_secs = local.offset().fix().local_minus_utc();
        LocalTimestamp {
            utc,
            local: local.format(TAG_DATE_FORMAT).to_string(),
            offset: format_offset(offset_secs),
        }
    }
}

fn format_offset(offset_secs: i32) -> String {
    let sign = if offset_secs < 0 { '-' } else { '+' };
    let abs = offset_secs.unsigned_abs();
    format!("{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
}
