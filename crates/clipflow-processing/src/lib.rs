//! External-tool plumbing for the media pipeline: command runner, probe,
//! validator, thumbnail/waveform generation and the transcoder, all behind
//! the [`MediaEngine`] seam so callers never touch ffmpeg directly.

pub mod command;
pub mod engine;
pub mod probe;
pub mod thumbnail;
pub mod transcoder;
pub mod validator;
pub mod waveform;

pub use command::{ToolCommand, ToolFailure, ToolOutput};
pub use engine::{FfmpegEngine, MediaEngine};
pub use probe::Prober;
pub use thumbnail::{ThumbnailGenerator, ThumbnailSpec};
pub use transcoder::{TranscodeProfile, Transcoder};
pub use validator::UploadValidator;
pub use waveform::{compute_waveform, WaveformExtractor};
