use crate::api::error::AppError;
use crate::models::UploadRecord;
use crate::services::intake::{IntakeError, StagedUpload};
use axum::{
    Json,
    extract::{Multipart, State},
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

/// Multipart field carrying the video payload.
pub const VIDEO_FIELD: &str = "video";

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = Multipart, description = "Video upload in the `video` field"),
    responses(
        (status = 200, description = "Upload accepted, processing started", body = UploadRecord),
        (status = 400, description = "No `video` field in the request"),
        (status = 413, description = "Upload too large"),
        (status = 500, description = "Upload could not be stored")
    ),
    tag = "videos"
)]
pub async fn upload_video(
    State(state): State<crate::AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadRecord>, AppError> {
    let mut staged: Option<StagedUpload> = None;

    // Read the whole request before anything is registered, so a body that
    // fails after the video field leaves no record behind.
    let result: Result<(), AppError> = async {
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            if name == VIDEO_FIELD && staged.is_none() {
                tracing::debug!(
                    "Receiving video field (filename={:?}, content_type={:?})",
                    field.file_name(),
                    field.content_type()
                );

                let reader = StreamReader::new(field.map_err(std::io::Error::other));
                staged = Some(state.intake.store_payload(Box::new(reader)).await?);
            } else {
                // Unrelated or repeated fields are drained and ignored.
                let _ = field.bytes().await?;
            }
        }
        Ok(())
    }
    .await;

    if let Err(e) = result {
        if let Some(abandoned) = staged {
            state.intake.discard(abandoned).await;
        }
        return Err(e);
    }

    let staged = staged.ok_or(AppError::from(IntakeError::MissingPayload))?;
    Ok(Json(state.intake.commit(staged)))
}
