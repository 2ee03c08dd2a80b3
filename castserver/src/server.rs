//! HTTP origin server for one media directory.

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use castconfig::Config;
use casttranscode::{MediaFormat, Transcoder};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::range::serve_file;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("media directory {path}: {source}")]
    RootDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct MediaServerOptions {
    /// Listening port, 0 picks a free one
    pub port: u16,
    /// Host written into the base URL
    pub advertised_host: String,
    /// Wait for in-flight connections when a session stops
    pub shutdown_grace: Duration,
}

impl Default for MediaServerOptions {
    fn default() -> Self {
        Self {
            port: 8080,
            advertised_host: castutils::lan_ipv4()
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "localhost".to_string()),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl MediaServerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            port: config.get_http_port(),
            advertised_host: config.get_base_url(),
            ..Self::default()
        }
    }
}

/// Per-session state shared by request handlers
#[derive(Clone)]
pub struct MediaState {
    root: Arc<PathBuf>,
    transcoder: Option<Arc<Transcoder>>,
}

impl MediaState {
    pub fn new(root: impl Into<PathBuf>, transcoder: Option<Arc<Transcoder>>) -> Self {
        Self {
            root: Arc::new(root.into()),
            transcoder,
        }
    }
}

/// Router serving every path of `state`'s root directory
pub fn media_router(state: MediaState) -> Router {
    Router::new().fallback(handle_media).with_state(state)
}

struct ServerSession {
    root: PathBuf,
    base_url: String,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Media server holding at most one running session.
///
/// Starting on the directory already served returns the current base URL.
/// Starting on another directory stops the running session first.
pub struct MediaServer {
    options: MediaServerOptions,
    transcoder: Option<Arc<Transcoder>>,
    session: Mutex<Option<ServerSession>>,
}

impl MediaServer {
    pub fn new(options: MediaServerOptions, transcoder: Option<Arc<Transcoder>>) -> Self {
        Self {
            options,
            transcoder,
            session: Mutex::new(None),
        }
    }

    /// Server configured from the global configuration.
    ///
    /// A transcoder that cannot be set up is logged; files needing
    /// conversion are then answered with 500.
    pub fn new_configured() -> Self {
        let config = castconfig::get_config();
        let transcoder = match Transcoder::new_configured() {
            Ok(t) => Some(Arc::new(t)),
            Err(e) => {
                warn!("Transcoder unavailable: {}", e);
                None
            }
        };
        Self::new(MediaServerOptions::from_config(&config), transcoder)
    }

    pub fn options(&self) -> &MediaServerOptions {
        &self.options
    }

    pub fn transcoder(&self) -> Option<&Arc<Transcoder>> {
        self.transcoder.as_ref()
    }

    /// Serves `root` and returns the advertised base URL.
    pub async fn start(&self, root: &Path) -> Result<String, ServerError> {
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|source| ServerError::RootDir {
                path: root.to_path_buf(),
                source,
            })?;
        if !root.is_dir() {
            return Err(ServerError::RootDir {
                path: root,
                source: std::io::Error::new(std::io::ErrorKind::NotADirectory, "not a directory"),
            });
        }

        let mut session = self.session.lock().await;
        if let Some(current) = session.as_ref() {
            if current.root == root {
                debug!("Media server already serving {}", root.display());
                return Ok(current.base_url.clone());
            }
        }
        if let Some(previous) = session.take() {
            self.shutdown_session(previous).await;
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], self.options.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        let base_url = format!(
            "http://{}:{}",
            self.options.advertised_host,
            local_addr.port()
        );

        let app = media_router(MediaState::new(root.clone(), self.transcoder.clone()));
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
            {
                warn!("Media server stopped with error: {}", e);
            }
        });

        info!("✅ Media server serving {} at {}", root.display(), base_url);
        *session = Some(ServerSession {
            root,
            base_url: base_url.clone(),
            local_addr,
            shutdown,
            handle,
        });
        Ok(base_url)
    }

    /// Stops the running session, if any, and clears the transcoder.
    pub async fn stop(&self) {
        let previous = self.session.lock().await.take();
        if let Some(previous) = previous {
            self.shutdown_session(previous).await;
        }
    }

    async fn shutdown_session(&self, session: ServerSession) {
        let ServerSession {
            root,
            shutdown,
            mut handle,
            ..
        } = session;

        shutdown.cancel();
        if tokio::time::timeout(self.options.shutdown_grace, &mut handle)
            .await
            .is_err()
        {
            warn!(
                "Media server did not stop within {:?}, aborting",
                self.options.shutdown_grace
            );
            handle.abort();
        }

        if let Some(transcoder) = &self.transcoder {
            if let Err(e) = transcoder.cleanup().await {
                warn!("Transcoder cleanup failed: {}", e);
            }
        }
        info!("🛑 Media server for {} stopped", root.display());
    }

    pub async fn base_url(&self) -> Option<String> {
        self.session.lock().await.as_ref().map(|s| s.base_url.clone())
    }

    pub async fn is_running(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub async fn root_dir(&self) -> Option<PathBuf> {
        self.session.lock().await.as_ref().map(|s| s.root.clone())
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.session.lock().await.as_ref().map(|s| s.local_addr)
    }
}

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'&')
    .add(b'+');

/// URL a renderer fetches to play `file_name` from a server at `base`.
pub fn build_media_url(
    base: &str,
    file_name: &str,
    subtitle: Option<u32>,
    audio: Option<u32>,
) -> String {
    let path = file_name
        .split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/");

    let mut url = format!("{}/{}", base.trim_end_matches('/'), path);
    let params: Vec<String> = [("subtitle", subtitle), ("audio", audio)]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| format!("{}={}", name, v)))
        .collect();
    if !params.is_empty() {
        url.push('?');
        url.push_str(&params.join("&"));
    }
    url
}

/// Relative file path named by a request path, `None` when it escapes the root
fn decode_request_path(path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(path.trim_start_matches('/'))
        .decode_utf8()
        .ok()?;

    let mut relative = PathBuf::new();
    for component in Path::new(decoded.as_ref()).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if relative.as_os_str().is_empty() {
        None
    } else {
        Some(relative)
    }
}

#[derive(Debug, Default, Deserialize)]
struct TrackQuery {
    subtitle: Option<String>,
    audio: Option<String>,
}

/// Absent, unparsable or negative selections all mean "no preference".
fn track_selection(value: Option<&str>) -> Option<u32> {
    let index = value?.trim().parse::<i32>().ok()?;
    u32::try_from(index).ok()
}

fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Range"),
    );
}

async fn handle_media(
    State(state): State<MediaState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let mut response = route_media(&state, &method, &uri, &headers).await;
    apply_cors(response.headers_mut());
    response
}

async fn route_media(state: &MediaState, method: &Method, uri: &Uri, headers: &HeaderMap) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }

    let Some(relative) = decode_request_path(uri.path()) else {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };

    let format = MediaFormat::classify(&relative);
    if format == MediaFormat::Unsupported {
        return (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Unsupported media format").into_response();
    }

    let full_path = state.root.join(&relative);
    if !tokio::fs::metadata(&full_path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
    {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    }

    if method != Method::GET && method != Method::HEAD {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET, HEAD, OPTIONS")],
        )
            .into_response();
    }

    let served = match format {
        MediaFormat::NeedsTranscode => {
            let Some(transcoder) = &state.transcoder else {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Transcoder not initialised",
                )
                    .into_response();
            };
            let query = Query::<TrackQuery>::try_from_uri(uri)
                .map(|Query(q)| q)
                .unwrap_or_default();
            let subtitle = track_selection(query.subtitle.as_deref());
            let audio = track_selection(query.audio.as_deref());

            match transcoder.transcode(&full_path, subtitle, audio).await {
                Ok(artifact) => artifact,
                Err(e) => {
                    warn!("❌ Transcoding {} failed: {}", full_path.display(), e);
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("Transcoding failed: {}", e),
                    )
                        .into_response();
                }
            }
        }
        _ => full_path,
    };

    let range = headers
        .get(header::RANGE)
        .map(|value| value.to_str().unwrap_or_default());
    serve_file(&served, range, method == Method::HEAD).await
}
