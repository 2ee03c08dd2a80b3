use std::path::Path;

/// How a file can be delivered to a renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    /// Served unchanged
    AsIs,
    /// Served after conversion to MP4/H.264
    NeedsTranscode,
    Unsupported,
}

const AS_IS_EXTENSIONS: &[&str] = &["mp4", "m4v"];

const TRANSCODE_EXTENSIONS: &[&str] = &["mkv", "avi", "wmv", "flv", "mov", "mpg", "mpeg", "webm"];

impl MediaFormat {
    /// Classifies a file by its extension (case-insensitive).
    pub fn classify(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return MediaFormat::Unsupported;
        };
        let ext = ext.to_ascii_lowercase();
        if AS_IS_EXTENSIONS.contains(&ext.as_str()) {
            MediaFormat::AsIs
        } else if TRANSCODE_EXTENSIONS.contains(&ext.as_str()) {
            MediaFormat::NeedsTranscode
        } else {
            MediaFormat::Unsupported
        }
    }

    pub fn is_supported(self) -> bool {
        self != MediaFormat::Unsupported
    }
}
