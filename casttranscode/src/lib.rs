//! # casttranscode - on-demand MP4 renditions for renderers
//!
//! Containers most renderers cannot play (MKV, AVI, ...) are converted with
//! ffmpeg to MP4/H.264. Outputs are cached per (file, subtitle, audio)
//! selection for a configurable TTL, and the number of simultaneous encoder
//! processes is bounded by a permit pool.

mod cache;
mod errors;
mod format;
mod probe;
mod transcoder;

pub use cache::{OutputArtifact, TranscodeKey};
pub use errors::TranscodeError;
pub use format::MediaFormat;
pub use probe::{AudioTrack, MediaInfo, SubtitleTrack, TrackDescriptor, language_matches};
pub use transcoder::{Transcoder, TranscoderOptions, build_ffmpeg_args};
