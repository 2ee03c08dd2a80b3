//! Byte-range parsing and file responses.

use std::io::SeekFrom;
use std::path::Path;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("range '{header}' not satisfiable for {size} bytes")]
    NotSatisfiable { header: String, size: u64 },
}

/// Resolves a `Range` header against a file of `size` bytes.
///
/// Only the first range of a list is honoured. A missing start means 0. A
/// missing, unparsable, backwards or too large end is clamped to `size - 1`.
/// Returns the inclusive `(start, end)` pair.
pub fn parse_range(header: &str, size: u64) -> Result<(u64, u64), RangeError> {
    let not_satisfiable = || RangeError::NotSatisfiable {
        header: header.to_string(),
        size,
    };

    let spec = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(not_satisfiable)?;
    let first = spec.split(',').next().unwrap_or_default().trim();
    let (start, end) = first.split_once('-').ok_or_else(not_satisfiable)?;

    let start = match start.trim() {
        "" => 0,
        s => s.parse::<u64>().map_err(|_| not_satisfiable())?,
    };
    if start >= size {
        return Err(not_satisfiable());
    }

    let end = match end.trim().parse::<u64>() {
        Ok(e) if e >= start && e < size => e,
        _ => size - 1,
    };

    Ok((start, end))
}

/// MIME type sent for a served file
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("wmv") => "video/x-ms-wmv",
        Some("flv") => "video/x-flv",
        Some("mpg") | Some("mpeg") => "video/mpeg",
        _ => "application/octet-stream",
    }
}

/// Streams `path`, whole or the requested byte range.
///
/// With `head_only` the headers are computed the same way and the body is
/// empty.
pub async fn serve_file(path: &Path, range: Option<&str>, head_only: bool) -> Response {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return (StatusCode::NOT_FOUND, "Not found").into_response();
        }
        Err(e) => {
            warn!("Cannot open {}: {}", path.display(), e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Cannot open file").into_response();
        }
    };

    let size = match file.metadata().await {
        Ok(meta) => meta.len(),
        Err(e) => {
            warn!("Cannot stat {}: {}", path.display(), e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Cannot read file").into_response();
        }
    };
    let mime = mime_for(path).to_string();

    let Some(range) = range else {
        let body = if head_only {
            Body::empty()
        } else {
            Body::from_stream(ReaderStream::new(file))
        };
        return (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, mime),
                (header::CONTENT_LENGTH, size.to_string()),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
            body,
        )
            .into_response();
    };

    let (start, end) = match parse_range(range, size) {
        Ok(bounds) => bounds,
        Err(e) => {
            warn!("{} ({})", e, path.display());
            return (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [
                    (header::CONTENT_RANGE, format!("bytes */{}", size)),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
            )
                .into_response();
        }
    };

    let length = end - start + 1;
    let body = if head_only {
        Body::empty()
    } else {
        if let Err(e) = file.seek(SeekFrom::Start(start)).await {
            warn!("Seek to {} failed in {}: {}", start, path.display(), e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Cannot read file").into_response();
        }
        Body::from_stream(ReaderStream::new(file.take(length)))
    };

    (
        StatusCode::PARTIAL_CONTENT,
        [
            (header::CONTENT_TYPE, mime),
            (header::CONTENT_LENGTH, length.to_string()),
            (header::CONTENT_RANGE, format!("bytes {}-{}/{}", start, end, size)),
            (header::ACCEPT_RANGES, "bytes".to_string()),
        ],
        body,
    )
        .into_response()
}
