//! Finished artifacts from the outputs directory: attachment downloads and
//! in-browser playback with byte ranges.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::context::AppContext;
use crate::error::AppError;

const CHUNK_SIZE: usize = 64 * 1024;

/// A bare file name: no separators, no parent references.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(['/', '\\'])
        && name != "."
        && name != ".."
        && !name.contains('\0')
}

fn content_type(name: &str) -> &'static str {
    let ext = std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Parse `Range: bytes=START-END`. `END` is `None` for `bytes=START-`.
/// Suffix ranges (`bytes=-N`) are not supported and yield `None`.
pub fn parse_range(value: &str) -> Option<(u64, Option<u64>)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end = match end.trim() {
        "" => None,
        e => Some(e.parse().ok()?),
    };
    Some((start, end))
}

/// Open `filename` inside the outputs directory.
async fn open_artifact(ctx: &AppContext, filename: &str) -> smv_core::Result<(tokio::fs::File, u64)> {
    if !is_plain_file_name(filename) {
        return Err(smv_core::Error::Validation(format!("invalid file name '{filename}'")));
    }

    let path = ctx.config.output.dir.join(filename);
    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(smv_core::Error::not_found("output", filename));
        }
        Err(e) => return Err(e.into()),
    };
    let meta = file.metadata().await?;
    if !meta.is_file() {
        return Err(smv_core::Error::not_found("output", filename));
    }

    tracing::debug!(path = %path.display(), bytes = meta.len(), "serving artifact");
    Ok((file, meta.len()))
}

/// GET /download/{filename}
pub async fn download(
    State(ctx): State<AppContext>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (file, size) = open_artifact(&ctx, &filename).await?;

    let headers = [
        (header::CONTENT_TYPE, content_type(&filename).to_string()),
        (header::CONTENT_LENGTH, size.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename.replace('"', "")),
        ),
    ];
    Ok((headers, Body::from_stream(ReaderStream::with_capacity(file, CHUNK_SIZE))))
}

/// GET /video/{filename}
///
/// Inline playback. Honours a single `Range` header with 206 Partial
/// Content so browsers can seek.
pub async fn video(
    State(ctx): State<AppContext>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let (mut file, size) = open_artifact(&ctx, &filename).await?;
    let mime = content_type(&filename).to_string();

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range);

    let Some((start, end)) = range else {
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, mime),
                (header::CONTENT_LENGTH, size.to_string()),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
            Body::from_stream(ReaderStream::with_capacity(file, CHUNK_SIZE)),
        )
            .into_response());
    };

    let last = size.saturating_sub(1);
    let end = end.unwrap_or(last).min(last);
    if size == 0 || start > end {
        return Ok((
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{size}"))],
            Body::empty(),
        )
            .into_response());
    }

    let length = end - start + 1;
    file.seek(std::io::SeekFrom::Start(start)).await.map_err(smv_core::Error::from)?;
    let body = Body::from_stream(ReaderStream::with_capacity(file.take(length), CHUNK_SIZE));

    Ok((
        StatusCode::PARTIAL_CONTENT,
        [
            (header::CONTENT_TYPE, mime),
            (header::CONTENT_RANGE, format!("bytes {start}-{end}/{size}")),
            (header::CONTENT_LENGTH, length.to_string()),
            (header::ACCEPT_RANGES, "bytes".to_string()),
        ],
        body,
    )
        .into_response())
}
