use crate::api::error::AppError;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

const SNIFF_LEN: usize = 8192;

#[utoipa::path(
    get,
    path = "/stream/{file}",
    params(
        ("file" = String, Path, description = "Stored file name returned by /upload")
    ),
    responses(
        (status = 200, description = "Raw file bytes"),
        (status = 404, description = "No stored file with that name")
    ),
    tag = "videos"
)]
pub async fn stream_file(
    State(state): State<crate::AppState>,
    Path(file): Path<String>,
) -> Result<Response, AppError> {
    let stored = state.intake.retrieve_stored_file(&file).await?;
    let mut handle = stored.file;

    let content_type = sniff_content_type(&mut handle)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", stored.name, e)))?;

    tracing::debug!(
        "Streaming {} ({} bytes, {})",
        stored.name,
        stored.size,
        content_type
    );

    let body = Body::from_stream(ReaderStream::new(handle));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, stored.size)
        .body(body)
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Guesses the media type from the file's magic bytes and rewinds it.
async fn sniff_content_type(file: &mut File) -> std::io::Result<String> {
    let mut header = vec![0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < SNIFF_LEN {
        let n = file.read(&mut header[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    file.seek(SeekFrom::Start(0)).await?;

    Ok(infer::get(&header[..filled])
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string()))
}
