use crate::models::UploadRecord;
use axum::{Json, extract::State};

#[utoipa::path(
    get,
    path = "/videos",
    responses(
        (status = 200, description = "Every upload seen by this process, oldest first", body = [UploadRecord])
    ),
    tag = "videos"
)]
pub async fn list_videos(State(state): State<crate::AppState>) -> Json<Vec<UploadRecord>> {
    Json(state.intake.records())
}
