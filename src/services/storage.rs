use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug)]
pub struct UploadResult {
    pub key: String,
    pub size: u64,
}

/// The incoming payload could not be read. Distinguishes a bad or
/// truncated request body from a failure of the storage itself.
#[derive(Error, Debug)]
#[error("failed to read upload payload: {0}")]
pub struct PayloadReadError(#[source] pub std::io::Error);

#[async_trait]
pub trait StorageService: Send + Sync {
    /// Streams `reader` into `key`. Nothing is left under `key` if this fails.
    /// Reader failures come back as a [`PayloadReadError`].
    async fn save_stream<'a>(
        &self,
        key: &str,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<UploadResult>;
    /// Opens `key` for reading, returning the handle and its length.
    async fn open(&self, key: &str) -> Result<Option<(File, u64)>>;
    /// Removes `key`; a missing key is not an error.
    async fn delete_file(&self, key: &str) -> Result<()>;
}

/// Stores uploads as flat files inside one directory.
pub struct LocalStorageService {
    root: PathBuf,
}

impl LocalStorageService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    async fn write_to(
        path: &Path,
        reader: &mut (dyn AsyncRead + Unpin + Send + '_),
    ) -> Result<u64> {
        let file = File::create(path)
            .await
            .with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut size = 0u64;

        loop {
            let n = reader
                .read(&mut buffer)
                .await
                .map_err(|e| anyhow::Error::new(PayloadReadError(e)))?;
            if n == 0 {
                break;
            }
            writer.write_all(&buffer[..n]).await?;
            size += n as u64;
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        Ok(size)
    }
}

#[async_trait]
impl StorageService for LocalStorageService {
    async fn save_stream<'a>(
        &self,
        key: &str,
        mut reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<UploadResult> {
        let final_path = self.path_for(key);
        let part_path = self.path_for(&format!("{}.part", key));

        match Self::write_to(&part_path, reader.as_mut()).await {
            Ok(size) => {
                if let Err(e) = fs::rename(&part_path, &final_path).await {
                    let _ = fs::remove_file(&part_path).await;
                    return Err(e).with_context(|| {
                        format!("failed to move upload into {}", final_path.display())
                    });
                }
                Ok(UploadResult {
                    key: key.to_string(),
                    size,
                })
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&part_path).await
                    && cleanup.kind() != ErrorKind::NotFound
                {
                    tracing::warn!(
                        "Failed to remove partial upload {}: {}",
                        part_path.display(),
                        cleanup
                    );
                }
                Err(e)
            }
        }
    }

    async fn open(&self, key: &str) -> Result<Option<(File, u64)>> {
        let path = self.path_for(key);
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Ok(None);
        }
        Ok(Some((file, metadata.len())))
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_open_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorageService::new(dir.path());

        let result = storage
            .save_stream("clip", Box::new(&b"frame-data"[..]))
            .await
            .unwrap();
        assert_eq!(result.size, 10);
        assert!(dir.path().join("clip").exists());
        assert!(!dir.path().join("clip.part").exists());

        let (mut file, len) = storage.open("clip").await.unwrap().unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(len, 10);
        assert_eq!(buf, b"frame-data");
    }

    #[tokio::test]
    async fn open_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorageService::new(dir.path());
        assert!(storage.open("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_write_is_not_a_payload_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorageService::new(dir.path().join("missing-dir"));

        let err = storage
            .save_stream("clip", Box::new(&b"data"[..]))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<PayloadReadError>().is_none());
        assert!(storage.open("clip").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reader_error_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorageService::new(dir.path());

        let failing = tokio_util::io::StreamReader::new(futures::stream::iter(vec![
            Ok(bytes::Bytes::from_static(b"partial")),
            Err(std::io::Error::other("client went away")),
        ]));

        let err = storage
            .save_stream("clip", Box::new(failing))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<PayloadReadError>().is_some());
        assert!(!dir.path().join("clip").exists());
        assert!(!dir.path().join("clip.part").exists());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorageService::new(dir.path());

        storage
            .save_stream("clip", Box::new(&b"data"[..]))
            .await
            .unwrap();
        storage.delete_file("clip").await.unwrap();
        storage.delete_file("clip").await.unwrap();
        assert!(!dir.path().join("clip").exists());
    }
}
