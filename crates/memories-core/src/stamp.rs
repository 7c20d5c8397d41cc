use std::path::Path;

use tracing::{info, warn};

use crate::classify::{self, MediaKind};
use crate::engine::MetadataEngine;
use crate::manifest::Coordinates;
use crate::tags;
use crate::timestamp::LocalTimestamp;
use crate::verify::{self, Verification};

/// What happened when we tried to tag one saved file.
#[derive(Debug, Clone, PartialEq)]
pub enum StampOutcome {
    /// Tags written; carries the verification result.
    Tagged(Verification),
    /// The engine rejected the write. The file is kept untagged.
    WriteFailed(String),
    /// PNGs are never tagged.
    PngSkipped,
    /// No usable location for this record.
    NoGps,
}

impl StampOutcome {
    pub fn is_tagged(&self) -> bool {
        matches!(self, StampOutcome::Tagged(_))
    }
}

/// Write capture time and GPS into `path` and verify. `file_name` decides
/// the tag set (video vs. image) and the PNG exclusion.
pub fn stamp_file(
    engine: &mut dyn MetadataEngine,
    path: &Path,
    file_name: &str,
    stamp: &LocalTimestamp,
    coords: Option<Coordinates>,
) -> StampOutcome {
    if classify::is_png(file_name) {
        info!("Skipping metadata for PNG: {}", file_name);
        return StampOutcome::PngSkipped;
    }
    let Some(coords) = coords else {
        warn!("No GPS data for {}", file_name);
        return StampOutcome::NoGps;
    };

    let kind = MediaKind::from_file_name(file_name);
    let tag_spec = tags::build_tags(stamp, coords, kind);
    if let Err(e) = engine.set_tags(path, &tag_spec.to_tag_map()) {
        warn!("Metadata error for {}: {}", file_name, e);
        return StampOutcome::WriteFailed(e.to_string());
    }
    info!("Metadata set for {} ({})", file_name, tag_spec.kind());

    StampOutcome::Tagged(verify::verify(engine, path, coords, kind))
}
