//! User-supplied media items and their on-disk storage.

use crate::error::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov"];

static UNSAFE_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify by extension. `None` means the item is not composable.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(OsStr::to_str)?.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

/// One uploaded image or video, as stored in the session's upload directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub original_filename: String,
    pub path: PathBuf,
}

impl MediaItem {
    pub fn new(original_filename: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            original_filename: original_filename.into(),
            path: path.into(),
        }
    }

    /// Wrap a file that already lives on disk without copying it.
    pub fn from_existing(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(name, path)
    }

    pub fn kind(&self) -> Option<MediaKind> {
        MediaKind::from_path(Path::new(&self.original_filename))
            .or_else(|| MediaKind::from_path(&self.path))
    }
}

/// Reduce an uploaded name to a safe single path component.
pub fn sanitize_filename(original: &str) -> String {
    let base = Path::new(original)
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or("");
    let cleaned = UNSAFE_NAME_CHARS.replace_all(base, "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// First free path for `name` inside `dir`: `name`, then `stem-2.ext`,
/// `stem-3.ext`, and so on.
pub async fn unique_destination(dir: &Path, name: &str) -> PathBuf {
    let first = dir.join(name);
    if fs::metadata(&first).await.is_err() {
        return first;
    }

    let as_path = Path::new(name);
    let stem = as_path
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or(name)
        .to_string();
    let ext = as_path.extension().and_then(OsStr::to_str);

    let mut n = 2usize;
    loop {
        let candidate = match ext {
            Some(ext) => dir.join(format!("{}-{}.{}", stem, n, ext)),
            None => dir.join(format!("{}-{}", stem, n)),
        };
        if fs::metadata(&candidate).await.is_err() {
            return candidate;
        }
        n += 1;
    }
}

/// Persist raw upload bytes under a sanitised, non-clashing name.
pub async fn store_upload(dir: &Path, original_filename: &str, bytes: &[u8]) -> Result<MediaItem> {
    fs::create_dir_all(dir).await?;
    let dest = unique_destination(dir, &sanitize_filename(original_filename)).await;

    let mut out = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&dest)
        .await?;
    out.write_all(bytes).await?;
    out.flush().await?;

    Ok(MediaItem::new(original_filename, dest))
}

/// Copy a local file into `dir` with the same naming rules as uploads.
pub async fn import_file(dir: &Path, source: &Path) -> Result<MediaItem> {
    let bytes = fs::read(source).await?;
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    store_upload(dir, &name, &bytes).await
}
