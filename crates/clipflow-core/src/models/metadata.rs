use serde::{Deserialize, Serialize};

/// Output of the probe: what the file actually contains, extracted without
/// decoding the payload. Immutable once computed for a given input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Measured duration in seconds. Zero for still images.
    pub duration: f64,
    /// Container format name as reported by the probe tool.
    pub container: String,
    /// Codec of the primary stream, when reported.
    pub codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub has_audio: bool,
    pub bitrate: Option<u64>,
}

impl MediaMetadata {
    /// Pixel dimensions when both are known.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }
}
