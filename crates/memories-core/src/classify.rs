use serde::{Deserialize, Serialize};

/// Extensions we download, extract and keep. Order matters for `infer_extension`.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "heic", "mp4", "mov", "png", "avi", "wmv", "webp", "mkv", "m4v",
];

/// Subset of `SUPPORTED_EXTENSIONS` that gets the video tag set.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "wmv", "mkv", "m4v"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Manifest "Media Type": `video` (any case) is video, everything else is an image.
    pub fn from_declared(media_type: &str) -> Self {
        if media_type.trim().eq_ignore_ascii_case("video") {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }

    /// Kind inferred from the file extension alone.
    pub fn from_file_name(name: &str) -> Self {
        if is_video_file(name) {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    fn default_extension(self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn ends_with_extension(name_lower: &str, ext: &str) -> bool {
    name_lower
        .strip_suffix(ext)
        .map_or(false, |rest| rest.ends_with('.'))
}

pub fn is_supported_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    SUPPORTED_EXTENSIONS
        .iter()
        .any(|ext| ends_with_extension(&lower, ext))
}

pub fn is_video_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    VIDEO_EXTENSIONS
        .iter()
        .any(|ext| ends_with_extension(&lower, ext))
}

/// PNGs are kept but never tagged.
pub fn is_png(name: &str) -> bool {
    ends_with_extension(&name.to_lowercase(), "png")
}

/// Output extension for a single-file download.
///
/// Falls back to `mp4`/`jpg` by declared kind unless the URL itself ends in a
/// supported extension. The first match in `SUPPORTED_EXTENSIONS` order wins.
pub fn infer_extension(url: &str, declared: MediaKind) -> &'static str {
    let lower = url.to_lowercase();
    SUPPORTED_EXTENSIONS
        .iter()
        .copied()
        .find(|ext| ends_with_extension(&lower, ext))
        .unwrap_or_else(|| declared.default_extension())
}
