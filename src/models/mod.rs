use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const PROGRESS_COMPLETE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Processing,
    /// Terminal: progress is 100 and the record no longer changes.
    Safe,
}

/// One accepted upload and its simulated processing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UploadRecord {
    pub id: String,
    /// Name of the payload inside the upload directory.
    #[serde(rename = "file")]
    pub stored_name: String,
    pub status: UploadStatus,
    pub progress: u8,
}

impl UploadRecord {
    pub fn new(id: String, stored_name: String) -> Self {
        Self {
            id,
            stored_name,
            status: UploadStatus::Processing,
            progress: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status == UploadStatus::Safe
    }

    /// Applies one tick. Reaching 100 flips the status to `Safe`.
    /// Returns false, leaving the record untouched, once it is terminal.
    pub fn advance(&mut self, step: u8) -> bool {
        if self.is_terminal() {
            return false;
        }

        let next = self.progress.saturating_add(step.max(1));
        if next >= PROGRESS_COMPLETE {
            self.progress = PROGRESS_COMPLETE;
            self.status = UploadStatus::Safe;
        } else {
            self.progress = next;
        }
        true
    }
}

/// Envelope pushed to realtime subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProgressEvent {
    pub event: String,
    pub data: UploadRecord,
}

impl ProgressEvent {
    pub const NAME: &'static str = "progress";

    pub fn new(data: UploadRecord) -> Self {
        Self {
            event: Self::NAME.to_string(),
            data,
        }
    }
}
