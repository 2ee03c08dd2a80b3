//! FFmpeg-based transcoding to MP4/H.264 with a TTL cache of outputs.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use castconfig::Config;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{ArtifactCache, OutputArtifact, TranscodeKey, remove_quietly};
use crate::errors::TranscodeError;
use crate::format::MediaFormat;
use crate::probe::{
    AudioTrack, MediaInfo, ProbeOutput, SubtitleTrack, TrackDescriptor, parse_probe_output,
};

const FFMPEG: &str = "ffmpeg";
const FFPROBE: &str = "ffprobe";

/// Longest stderr excerpt carried by a [`TranscodeError::ToolFailed`]
const MAX_DIAGNOSTICS: usize = 2000;

#[derive(Debug, Clone)]
pub struct TranscoderOptions {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub cache_ttl: Duration,
    /// Simultaneous encoder processes
    pub max_concurrent: usize,
    /// Value of ffmpeg's `-threads`
    pub threads: usize,
    pub preferred_subtitle_languages: Vec<String>,
    /// Audio codecs re-encoded to AAC instead of copied
    pub audio_transcode_codecs: Vec<String>,
    /// Parent of the private scratch directory
    pub scratch_root: PathBuf,
}

fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for TranscoderOptions {
    fn default() -> Self {
        Self {
            ffmpeg_path: FFMPEG.to_string(),
            ffprobe_path: FFPROBE.to_string(),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            max_concurrent: (cpu_count() / 2).max(1),
            threads: cpu_count(),
            preferred_subtitle_languages: ["zh", "zh-CN", "chi", "en", "eng"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            audio_transcode_codecs: vec!["dts".to_string(), "ac3".to_string()],
            scratch_root: std::env::temp_dir(),
        }
    }
}

impl TranscoderOptions {
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            ffmpeg_path: config.get_ffmpeg_path(),
            ffprobe_path: config.get_ffprobe_path(),
            cache_ttl: config.get_transcode_cache_ttl().unwrap_or_else(|e| {
                warn!("{}, using {:?}", e, defaults.cache_ttl);
                defaults.cache_ttl
            }),
            preferred_subtitle_languages: config.get_preferred_subtitle_languages(),
            audio_transcode_codecs: config.get_audio_transcode_codecs(),
            ..defaults
        }
    }
}

/// Deletes a partially written output unless the encode completed.
struct PartialOutput {
    path: PathBuf,
    keep: bool,
}

impl PartialOutput {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    fn keep(mut self) -> PathBuf {
        self.keep = true;
        self.path.clone()
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if !self.keep {
            remove_quietly(&self.path);
        }
    }
}

type KeyLocks = Mutex<HashMap<TranscodeKey, Arc<tokio::sync::Mutex<()>>>>;

/// Share of a key's lock. The last holder removes the map entry, also when
/// its request is dropped.
struct KeyLease<'a> {
    in_flight: &'a KeyLocks,
    key: TranscodeKey,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for KeyLease<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().expect("in-flight mutex poisoned");
        // Clones and releases of the lock all happen under the map mutex.
        let own = std::mem::take(&mut self.lock);
        let last_holder = in_flight
            .get(&self.key)
            .is_some_and(|entry| Arc::ptr_eq(entry, &own) && Arc::strong_count(entry) == 2);
        drop(own);
        if last_holder {
            in_flight.remove(&self.key);
        }
    }
}

pub struct Transcoder {
    options: TranscoderOptions,
    scratch_dir: PathBuf,
    permits: Semaphore,
    subtitle_tracks: Mutex<HashMap<PathBuf, Vec<SubtitleTrack>>>,
    audio_tracks: Mutex<HashMap<PathBuf, Vec<AudioTrack>>>,
    artifacts: Mutex<ArtifactCache>,
    in_flight: KeyLocks,
}

impl Transcoder {
    /// Creates the private scratch directory and the permit pool.
    pub fn new(options: TranscoderOptions) -> Result<Self, TranscodeError> {
        let scratch_dir = options
            .scratch_root
            .join(format!("castify_transcode_{}", Uuid::new_v4().simple()));
        std::fs::create_dir_all(&scratch_dir)?;

        let permits = Semaphore::new(options.max_concurrent.max(1));
        info!(
            scratch = %scratch_dir.display(),
            "🎬 Transcoder ready ({} concurrent job(s))",
            options.max_concurrent.max(1)
        );

        Ok(Self {
            options,
            scratch_dir,
            permits,
            subtitle_tracks: Mutex::new(HashMap::new()),
            audio_tracks: Mutex::new(HashMap::new()),
            artifacts: Mutex::new(ArtifactCache::default()),
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn new_configured() -> Result<Self, TranscodeError> {
        Self::new(TranscoderOptions::from_config(&castconfig::get_config()))
    }

    pub fn options(&self) -> &TranscoderOptions {
        &self.options
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Number of encodes that may start right now
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Whether the encoder binary can be executed
    pub async fn is_available(&self) -> bool {
        Command::new(&self.options.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn run_probe(&self, path: &Path, show_format: bool) -> Result<ProbeOutput, TranscodeError> {
        let mut cmd = Command::new(&self.options.ffprobe_path);
        cmd.args(["-v", "error", "-print_format", "json", "-show_streams"]);
        if show_format {
            cmd.arg("-show_format");
        }
        cmd.arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd
            .output()
            .await
            .map_err(|e| TranscodeError::spawn(FFPROBE, &self.options.ffprobe_path, e))?;

        if !output.status.success() {
            return Err(TranscodeError::ToolFailed {
                tool: FFPROBE,
                status: output.status.to_string(),
                diagnostics: diagnostics(&output.stderr),
            });
        }

        parse_probe_output(&output.stdout).map_err(|e| TranscodeError::probe(path, e))
    }

    /// Probes both track kinds once and fills their caches.
    async fn probe_tracks(
        &self,
        path: &Path,
    ) -> Result<(Vec<SubtitleTrack>, Vec<AudioTrack>), TranscodeError> {
        let probe = self.run_probe(path, false).await?;
        let subtitles = probe.subtitle_tracks(&self.options.preferred_subtitle_languages);
        let audio = probe.audio_tracks();
        debug!(
            "Probed {}: {} subtitle(s), {} audio track(s)",
            path.display(),
            subtitles.len(),
            audio.len()
        );

        self.subtitle_tracks
            .lock()
            .expect("subtitle cache mutex poisoned")
            .insert(path.to_path_buf(), subtitles.clone());
        self.audio_tracks
            .lock()
            .expect("audio cache mutex poisoned")
            .insert(path.to_path_buf(), audio.clone());

        Ok((subtitles, audio))
    }

    /// Subtitle tracks of `path`, probed once per process.
    pub async fn probe_subtitles(&self, path: &Path) -> Result<Vec<SubtitleTrack>, TranscodeError> {
        let cached = self
            .subtitle_tracks
            .lock()
            .expect("subtitle cache mutex poisoned")
            .get(path)
            .cloned();
        match cached {
            Some(tracks) => Ok(tracks),
            None => Ok(self.probe_tracks(path).await?.0),
        }
    }

    /// Audio tracks of `path`, probed once per process.
    pub async fn probe_audio(&self, path: &Path) -> Result<Vec<AudioTrack>, TranscodeError> {
        let cached = self
            .audio_tracks
            .lock()
            .expect("audio cache mutex poisoned")
            .get(path)
            .cloned();
        match cached {
            Some(tracks) => Ok(tracks),
            None => Ok(self.probe_tracks(path).await?.1),
        }
    }

    /// Subtitle then audio tracks of `path`
    pub async fn tracks(&self, path: &Path) -> Result<Vec<TrackDescriptor>, TranscodeError> {
        let subtitles = self.probe_subtitles(path).await?;
        let audio = self.probe_audio(path).await?;
        Ok(subtitles
            .into_iter()
            .map(TrackDescriptor::Subtitle)
            .chain(audio.into_iter().map(TrackDescriptor::Audio))
            .collect())
    }

    /// Codec and geometry of the first video stream and the first audio codec
    pub async fn media_info(&self, path: &Path) -> Result<MediaInfo, TranscodeError> {
        Ok(self.run_probe(path, true).await?.media_info())
    }

    fn cached_artifact(&self, key: &TranscodeKey) -> Option<PathBuf> {
        self.artifacts
            .lock()
            .expect("artifact cache mutex poisoned")
            .lookup(key)
    }

    fn key_lease(&self, key: &TranscodeKey) -> KeyLease<'_> {
        let lock = self
            .in_flight
            .lock()
            .expect("in-flight mutex poisoned")
            .entry(key.clone())
            .or_default()
            .clone();
        KeyLease {
            in_flight: &self.in_flight,
            key: key.clone(),
            lock,
        }
    }

    /// Keys with an encode running or waiting for one
    pub fn jobs_in_flight(&self) -> usize {
        self.in_flight.lock().expect("in-flight mutex poisoned").len()
    }

    /// Produces (or reuses) an MP4 rendition of `path`.
    ///
    /// `subtitle` selects a subtitle stream, converted to `mov_text`. `audio`
    /// selects one audio stream, otherwise every audio stream is kept.
    ///
    /// Cache hits never wait for a permit. Concurrent calls for the same key
    /// share one encode.
    pub async fn transcode(
        &self,
        path: &Path,
        subtitle: Option<u32>,
        audio: Option<u32>,
    ) -> Result<PathBuf, TranscodeError> {
        if !MediaFormat::classify(path).is_supported() {
            return Err(TranscodeError::UnsupportedFormat(path.display().to_string()));
        }

        let key = TranscodeKey::new(path, subtitle, audio);
        if let Some(hit) = self.cached_artifact(&key) {
            debug!("♻️ Reusing {}", hit.display());
            return Ok(hit);
        }

        let lease = self.key_lease(&key);
        let _key_guard = lease.lock.lock().await;
        match self.cached_artifact(&key) {
            Some(hit) => Ok(hit),
            None => self.encode(&key).await,
        }
    }

    async fn encode(&self, key: &TranscodeKey) -> Result<PathBuf, TranscodeError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| TranscodeError::Io(std::io::Error::other(e)))?;

        tokio::fs::create_dir_all(&self.scratch_dir).await?;

        let reencode_audio = match self.selected_audio_codec(&key.source, key.audio).await {
            Some(codec) => self
                .options
                .audio_transcode_codecs
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&codec)),
            None => false,
        };

        let output = self.output_path(key);
        let args = build_ffmpeg_args(
            &key.source,
            &output,
            key.subtitle,
            key.audio,
            reencode_audio,
            self.options.threads,
        );

        info!(
            "🎞️ Transcoding {} -> {}",
            key.source.display(),
            output.display()
        );
        let started = Instant::now();
        let partial = PartialOutput::new(output);

        let result = Command::new(&self.options.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TranscodeError::spawn(FFMPEG, &self.options.ffmpeg_path, e))?;

        if !result.status.success() {
            let diagnostics = diagnostics(&result.stderr);
            warn!("❌ ffmpeg failed for {}: {}", key.source.display(), diagnostics);
            return Err(TranscodeError::ToolFailed {
                tool: FFMPEG,
                status: result.status.to_string(),
                diagnostics,
            });
        }
        if !partial.path.is_file() {
            return Err(TranscodeError::ToolFailed {
                tool: FFMPEG,
                status: result.status.to_string(),
                diagnostics: "no output file produced".to_string(),
            });
        }

        let output = partial.keep();
        info!(
            "✅ Transcoded {} in {:.1?}",
            key.source.display(),
            started.elapsed()
        );

        self.artifacts
            .lock()
            .expect("artifact cache mutex poisoned")
            .insert(
                key.clone(),
                OutputArtifact::new(output.clone(), self.options.cache_ttl),
            );
        Ok(output)
    }

    /// Codec of the selected audio stream, or of the first one.
    async fn selected_audio_codec(&self, path: &Path, audio: Option<u32>) -> Option<String> {
        let tracks = match self.probe_audio(path).await {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!("Audio probe failed for {}, copying audio: {}", path.display(), e);
                return None;
            }
        };
        let position = audio.unwrap_or(0);
        tracks
            .into_iter()
            .find(|t| t.position == position)
            .map(|t| t.codec_name)
            .filter(|c| !c.is_empty())
    }

    fn output_path(&self, key: &TranscodeKey) -> PathBuf {
        let stem = key
            .source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "media".to_string());

        let mut hasher = DefaultHasher::new();
        key.source.hash(&mut hasher);
        let hash = hasher.finish() as u32;

        let mut name = format!("{}_{:08x}_transcoded", stem, hash);
        if let Some(sub) = key.subtitle {
            name.push_str(&format!("_sub{}", sub));
        }
        if let Some(audio) = key.audio {
            name.push_str(&format!("_audio{}", audio));
        }
        name.push_str(".mp4");
        self.scratch_dir.join(name)
    }

    /// Forgets every artifact and removes the scratch directory.
    ///
    /// Track caches are kept. The scratch directory is re-created by the next
    /// encode.
    pub async fn cleanup(&self) -> Result<(), TranscodeError> {
        let count = {
            let mut artifacts = self.artifacts.lock().expect("artifact cache mutex poisoned");
            let count = artifacts.len();
            artifacts.clear();
            count
        };

        match tokio::fs::remove_dir_all(&self.scratch_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!("🧹 Transcoder cleaned up ({} artifact(s))", count);
        Ok(())
    }
}

fn diagnostics(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(MAX_DIAGNOSTICS)
        .map(|(i, _)| i)
        .unwrap_or(0);
    text[start..].to_string()
}

/// ffmpeg arguments for an MP4/H.264 rendition tuned for fast start.
pub fn build_ffmpeg_args(
    input: &Path,
    output: &Path,
    subtitle: Option<u32>,
    audio: Option<u32>,
    reencode_audio: bool,
    threads: usize,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["-nostdin".into(), "-y".into(), "-i".into()];
    args.push(input.to_string_lossy().into_owned());
    args.extend(
        [
            "-c:v", "h264", "-preset", "ultrafast", "-crf", "28", "-profile:v", "main", "-level",
            "4.0", "-movflags", "+faststart",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.push("-threads".into());
    args.push(threads.max(1).to_string());
    args.extend(["-hide_banner", "-loglevel", "warning"].iter().map(|s| s.to_string()));

    args.push("-map".into());
    args.push("0:v:0".into());

    args.push("-map".into());
    match audio {
        Some(n) => args.push(format!("0:a:{}", n)),
        None => args.push("0:a?".into()),
    }

    if let Some(n) = subtitle {
        args.push("-map".into());
        args.push(format!("0:s:{}", n));
        args.extend(
            ["-c:s", "mov_text", "-disposition:s:0", "default"]
                .iter()
                .map(|s| s.to_string()),
        );
    }

    if reencode_audio {
        args.extend(["-c:a", "aac", "-b:a", "128k"].iter().map(|s| s.to_string()));
    } else {
        args.extend(["-c:a", "copy"].iter().map(|s| s.to_string()));
    }

    args.push(output.to_string_lossy().into_owned());
    args
}
