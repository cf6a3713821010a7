use crate::{ffmpeg, logi};
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// Create the work directory and its `sessions/` subtree if missing.
pub async fn ensure_work_dir(work_dir: &Path) -> Result<()> {
    let sessions = work_dir.join("sessions");
    if fs::metadata(&sessions).await.is_err() {
        fs::create_dir_all(&sessions)
            .await
            .with_context(|| format!("Failed to create directory: {}", sessions.display()))?;
        logi(format!("Created directory: {}", sessions.display()));
    }
    Ok(())
}

pub async fn check_ffmpeg() -> bool {
    ffmpeg::tools_available().await
}
