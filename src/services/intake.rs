use crate::models::UploadRecord;
use crate::services::broadcaster::ProgressBroadcaster;
use crate::services::registry::RecordRegistry;
use crate::services::storage::{PayloadReadError, StorageService};
use crate::utils::validation::validate_stored_name;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncRead;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("No video payload provided")]
    MissingPayload,

    #[error("Upload payload could not be read: {0}")]
    InvalidPayload(#[source] std::io::Error),

    #[error("Failed to store upload: {0}")]
    StorageWrite(#[source] anyhow::Error),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Storage read failed: {0}")]
    StorageRead(#[source] anyhow::Error),
}

/// A payload that is on disk but has no record yet. Either `commit` it
/// or `discard` it.
#[derive(Debug)]
pub struct StagedUpload {
    pub stored_name: String,
    pub size: u64,
}

/// Opened stored file ready to be streamed back.
#[derive(Debug)]
pub struct StoredFile {
    pub name: String,
    pub file: File,
    pub size: u64,
}

pub struct IntakeService {
    storage: Arc<dyn StorageService>,
    registry: RecordRegistry,
    broadcaster: Arc<ProgressBroadcaster>,
}

impl IntakeService {
    pub fn new(
        storage: Arc<dyn StorageService>,
        registry: RecordRegistry,
        broadcaster: Arc<ProgressBroadcaster>,
    ) -> Self {
        Self {
            storage,
            registry,
            broadcaster,
        }
    }

    /// Stores a single payload and registers it in one go.
    pub async fn accept_upload<'a>(
        &self,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<UploadRecord, IntakeError> {
        let staged = self.store_payload(reader).await?;
        Ok(self.commit(staged))
    }

    /// Writes the payload under a fresh random name. No record exists and
    /// nothing is broadcast until the upload is committed.
    pub async fn store_payload<'a>(
        &self,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<StagedUpload, IntakeError> {
        let stored_name = Uuid::new_v4().simple().to_string();

        let stored = self
            .storage
            .save_stream(&stored_name, reader)
            .await
            .map_err(|e| match e.downcast::<PayloadReadError>() {
                Ok(PayloadReadError(io)) => {
                    tracing::warn!("Upload payload for {} was unreadable: {}", stored_name, io);
                    IntakeError::InvalidPayload(io)
                }
                Err(e) => {
                    tracing::error!("Failed to store upload {}: {:#}", stored_name, e);
                    IntakeError::StorageWrite(e)
                }
            })?;

        Ok(StagedUpload {
            stored_name: stored.key,
            size: stored.size,
        })
    }

    /// Registers the staged payload and starts its progress ticks.
    /// Returns as soon as the record exists; processing is not awaited.
    pub fn commit(&self, staged: StagedUpload) -> UploadRecord {
        let record = UploadRecord::new(self.registry.next_id(), staged.stored_name);
        self.registry.insert(record.clone());
        self.broadcaster.start(&record.id);

        tracing::info!(
            "📥 Accepted upload {} as {} ({} bytes)",
            record.id,
            record.stored_name,
            staged.size
        );

        record
    }

    /// Drops a staged payload whose request failed after it was stored.
    pub async fn discard(&self, staged: StagedUpload) {
        if let Err(e) = self.storage.delete_file(&staged.stored_name).await {
            tracing::warn!(
                "Failed to remove abandoned upload {}: {:#}",
                staged.stored_name,
                e
            );
        }
    }

    /// Opens a stored payload by name. Any stored name is readable.
    pub async fn retrieve_stored_file(&self, name: &str) -> Result<StoredFile, IntakeError> {
        if validate_stored_name(name).is_err() {
            tracing::warn!("Rejected stream request for invalid name: {:?}", name);
            return Err(IntakeError::NotFound(name.to_string()));
        }

        match self.storage.open(name).await {
            Ok(Some((file, size))) => Ok(StoredFile {
                name: name.to_string(),
                file,
                size,
            }),
            Ok(None) => Err(IntakeError::NotFound(name.to_string())),
            Err(e) => Err(IntakeError::StorageRead(e)),
        }
    }

    pub fn records(&self) -> Vec<UploadRecord> {
        self.registry.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UploadStatus;
    use crate::services::storage::LocalStorageService;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn service(dir: &std::path::Path) -> (IntakeService, RecordRegistry, Arc<ProgressBroadcaster>) {
        let registry = RecordRegistry::new();
        let broadcaster = Arc::new(ProgressBroadcaster::new(
            registry.clone(),
            Duration::from_millis(10),
            20,
            64,
        ));
        let storage: Arc<dyn StorageService> = Arc::new(LocalStorageService::new(dir));
        (
            IntakeService::new(storage, registry.clone(), broadcaster.clone()),
            registry,
            broadcaster,
        )
    }

    #[tokio::test]
    async fn accept_returns_fresh_processing_record() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, registry, _) = service(dir.path());

        let record = intake.accept_upload(Box::new(&b"mp4 bytes"[..])).await.unwrap();

        assert_eq!(record.status, UploadStatus::Processing);
        assert_eq!(record.progress, 0);
        assert_eq!(record.stored_name.len(), 32);
        assert!(registry.get(&record.id).is_some());
        assert!(dir.path().join(&record.stored_name).exists());
    }

    #[tokio::test]
    async fn staged_upload_is_invisible_until_committed() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, registry, broadcaster) = service(dir.path());

        let staged = intake.store_payload(Box::new(&b"clip"[..])).await.unwrap();
        assert!(dir.path().join(&staged.stored_name).exists());
        assert!(registry.is_empty());
        assert_eq!(broadcaster.active_count(), 0);

        let record = intake.commit(staged);
        assert_eq!(registry.len(), 1);
        assert_eq!(broadcaster.active_count(), 1);
        assert_eq!(record.progress, 0);
    }

    #[tokio::test]
    async fn discard_removes_file_and_registers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, registry, broadcaster) = service(dir.path());

        let staged = intake.store_payload(Box::new(&b"clip"[..])).await.unwrap();
        let path = dir.path().join(&staged.stored_name);
        intake.discard(staged).await;

        assert!(!path.exists());
        assert!(registry.is_empty());
        assert_eq!(broadcaster.active_count(), 0);
    }

    #[tokio::test]
    async fn unreadable_payload_is_invalid_not_storage_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, registry, _) = service(dir.path());

        let failing = tokio_util::io::StreamReader::new(futures::stream::iter(vec![
            Ok(bytes::Bytes::from_static(b"half a frame")),
            Err(std::io::Error::other("connection reset")),
        ]));

        let err = intake.accept_upload(Box::new(failing)).await.unwrap_err();
        assert!(matches!(err, IntakeError::InvalidPayload(_)));
        assert!(registry.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn storage_failure_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, registry, broadcaster) = service(&dir.path().join("does-not-exist"));

        let err = intake.accept_upload(Box::new(&b"data"[..])).await.unwrap_err();
        assert!(matches!(err, IntakeError::StorageWrite(_)));
        assert!(registry.is_empty());
        assert_eq!(broadcaster.active_count(), 0);
    }

    #[tokio::test]
    async fn retrieve_streams_stored_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, _, _) = service(dir.path());

        let record = intake.accept_upload(Box::new(&b"playback"[..])).await.unwrap();

        let mut stored = intake.retrieve_stored_file(&record.stored_name).await.unwrap();
        let mut buf = Vec::new();
        stored.file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(stored.size, 8);
        assert_eq!(buf, b"playback");
    }

    #[tokio::test]
    async fn retrieve_unknown_or_traversal_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, _, _) = service(dir.path());

        for name in ["never-uploaded", "../Cargo.toml", "", "."] {
            let err = intake.retrieve_stored_file(name).await.unwrap_err();
            assert!(matches!(err, IntakeError::NotFound(_)), "{name}");
        }
    }

    #[tokio::test]
    async fn back_to_back_uploads_get_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, _, _) = service(dir.path());

        let first = intake.accept_upload(Box::new(&b"a"[..])).await.unwrap();
        let second = intake.accept_upload(Box::new(&b"b"[..])).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_ne!(first.stored_name, second.stored_name);
    }
}
