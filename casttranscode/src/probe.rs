//! Stream probing: `ffprobe -print_format json -show_streams` output and the
//! track records derived from it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Subtitle stream of a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtitleTrack {
    /// Stream index within the container
    pub index: u32,
    /// Position among subtitle streams, used to select the track
    pub position: u32,
    pub language: String,
    pub title: String,
    pub is_default: bool,
}

/// Audio stream of a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioTrack {
    pub index: u32,
    pub position: u32,
    pub language: String,
    pub title: String,
    pub codec_name: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TrackDescriptor {
    Subtitle(SubtitleTrack),
    Audio(AudioTrack),
}

/// Summary of the first video and audio streams
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaInfo {
    pub video_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<f64>,
    pub audio_codec: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

impl ProbeStream {
    fn is(&self, kind: &str) -> bool {
        self.codec_type.as_deref() == Some(kind)
    }

    fn tag(&self, name: &str) -> String {
        self.tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim().to_string())
            .unwrap_or_default()
    }
}

pub(crate) fn parse_probe_output(raw: &[u8]) -> Result<ProbeOutput, serde_json::Error> {
    serde_json::from_slice(raw)
}

/// `lang` matches `preferred` exactly or as a region variant (`zh-TW` for `zh`)
pub fn language_matches(lang: &str, preferred: &str) -> bool {
    if lang.eq_ignore_ascii_case(preferred) {
        return true;
    }
    let lang = lang.to_ascii_lowercase();
    let preferred = preferred.to_ascii_lowercase();
    lang.strip_prefix(&preferred)
        .is_some_and(|rest| rest.starts_with('-') || rest.starts_with('_'))
}

impl ProbeOutput {
    /// Subtitle tracks; the first one in a preferred language is the default.
    pub(crate) fn subtitle_tracks(&self, preferred_languages: &[String]) -> Vec<SubtitleTrack> {
        let mut tracks: Vec<SubtitleTrack> = self
            .streams
            .iter()
            .filter(|s| s.is("subtitle"))
            .zip(0u32..)
            .map(|(s, position)| SubtitleTrack {
                index: s.index,
                position,
                language: s.tag("language"),
                title: s.tag("title"),
                is_default: false,
            })
            .collect();

        if let Some(track) = tracks.iter_mut().find(|t| {
            preferred_languages
                .iter()
                .any(|p| language_matches(&t.language, p))
        }) {
            track.is_default = true;
        }
        tracks
    }

    /// Audio tracks; the first one is the default.
    pub(crate) fn audio_tracks(&self) -> Vec<AudioTrack> {
        self.streams
            .iter()
            .filter(|s| s.is("audio"))
            .zip(0u32..)
            .map(|(s, position)| AudioTrack {
                index: s.index,
                position,
                language: s.tag("language"),
                title: s.tag("title"),
                codec_name: s.codec_name.clone().unwrap_or_default(),
                is_default: position == 0,
            })
            .collect()
    }

    pub(crate) fn media_info(&self) -> MediaInfo {
        let video = self.streams.iter().find(|s| s.is("video"));
        let audio = self.streams.iter().find(|s| s.is("audio"));
        let duration = video
            .and_then(|v| v.duration.as_deref())
            .or_else(|| self.format.as_ref().and_then(|f| f.duration.as_deref()))
            .and_then(|d| d.trim().parse::<f64>().ok());

        MediaInfo {
            video_codec: video.and_then(|v| v.codec_name.clone()),
            width: video.and_then(|v| v.width),
            height: video.and_then(|v| v.height),
            duration,
            audio_codec: audio.and_then(|a| a.codec_name.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "hevc", "width": 1920, "height": 1080},
            {"index": 1, "codec_type": "audio", "codec_name": "dts", "tags": {"language": "jpn", "title": "Original"}},
            {"index": 2, "codec_type": "audio", "codec_name": "aac", "tags": {"language": "eng"}},
            {"index": 3, "codec_type": "subtitle", "codec_name": "ass", "tags": {"language": "fre"}},
            {"index": 4, "codec_type": "subtitle", "codec_name": "subrip", "tags": {"LANGUAGE": "zh-TW", "title": "Chinese"}},
            {"index": 5, "codec_type": "subtitle", "codec_name": "subrip", "tags": {"language": "eng"}}
        ],
        "format": {"duration": "5400.250000"}
    }"#;

    fn preferred() -> Vec<String> {
        ["zh", "zh-CN", "chi", "en", "eng"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_subtitle_default_is_first_preferred_language() {
        let probe = parse_probe_output(PROBE.as_bytes()).unwrap();
        let subs = probe.subtitle_tracks(&preferred());

        assert_eq!(subs.len(), 3);
        assert_eq!(subs[1].index, 4);
        assert_eq!(subs[1].position, 1);
        assert_eq!(subs[1].language, "zh-TW");
        assert_eq!(subs[1].title, "Chinese");
        let defaults: Vec<u32> = subs.iter().filter(|t| t.is_default).map(|t| t.position).collect();
        assert_eq!(defaults, vec![1]);
    }

    #[test]
    fn test_audio_tracks_first_is_default() {
        let probe = parse_probe_output(PROBE.as_bytes()).unwrap();
        let audio = probe.audio_tracks();

        assert_eq!(audio.len(), 2);
        assert!(audio[0].is_default);
        assert!(!audio[1].is_default);
        assert_eq!(audio[0].codec_name, "dts");
        assert_eq!(audio[1].position, 1);
        assert_eq!(audio[1].index, 2);
    }

    #[test]
    fn test_media_info() {
        let info = parse_probe_output(PROBE.as_bytes()).unwrap().media_info();
        assert_eq!(info.video_codec.as_deref(), Some("hevc"));
        assert_eq!(info.width, Some(1920));
        assert_eq!(info.height, Some(1080));
        assert_eq!(info.duration, Some(5400.25));
        assert_eq!(info.audio_codec.as_deref(), Some("dts"));
    }

    #[test]
    fn test_no_preferred_language_means_no_default() {
        let probe =
            parse_probe_output(br#"{"streams":[{"index":2,"codec_type":"subtitle"}]}"#).unwrap();
        let subs = probe.subtitle_tracks(&preferred());
        assert_eq!(subs.len(), 1);
        assert!(!subs[0].is_default);
        assert_eq!(subs[0].language, "");
    }

    #[test]
    fn test_language_matches() {
        assert!(language_matches("ENG", "eng"));
        assert!(language_matches("zh-CN", "zh"));
        assert!(!language_matches("zho", "zh"));
        assert!(!language_matches("", "en"));
    }
}
