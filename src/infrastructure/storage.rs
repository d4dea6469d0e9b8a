use crate::config::AppConfig;
use crate::services::storage::LocalStorageService;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &AppConfig) -> Result<Arc<LocalStorageService>> {
    let dir = &config.upload_dir;

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create upload directory {}", dir.display()))?;

    // Leftovers from uploads interrupted by a previous crash.
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().ends_with(".part")
            && tokio::fs::remove_file(entry.path()).await.is_ok()
        {
            removed += 1;
        }
    }
    if removed > 0 {
        info!("🧹 Removed {} partial uploads", removed);
    }

    info!("📁 Local Storage: {}", dir.display());
    Ok(Arc::new(LocalStorageService::new(dir.clone())))
}
