use crate::errors::{AppError, AppResult};
use crate::models::StoredBlob;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

static UNSAFE_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid filename regex"));

const CATEGORIES: [&str; 5] = ["documents", "images", "spreadsheets", "presentations", "others"];

/// Byte storage for uploaded payloads. The entity store only ever sees the
/// returned location token.
pub trait BlobStore: Send + Sync {
    fn store(&self, original_name: &str, mime_type: &str, bytes: &[u8]) -> AppResult<StoredBlob>;
    fn remove(&self, location: &str) -> AppResult<()>;
}

#[derive(Debug, Clone)]
pub struct DiskBlobStore {
    root: PathBuf,
}

impl DiskBlobStore {
    pub fn new(root: &Path) -> AppResult<Self> {
        for category in CATEGORIES {
            fs::create_dir_all(root.join(category))?;
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn resolve(&self, location: &str) -> AppResult<PathBuf> {
        let relative = Path::new(location);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, std::path::Component::ParentDir))
        {
            return Err(AppError::Validation(format!("invalid blob location: {}", location)));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for DiskBlobStore {
    fn store(&self, original_name: &str, mime_type: &str, bytes: &[u8]) -> AppResult<StoredBlob> {
        let file_name = format!(
            "{}_{}_{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            sanitize_file_name(original_name)
        );
        let location = format!("{}/{}", category_for_mime(mime_type), file_name);
        let path = self.resolve(&location)?;
        // Never overwrite: another entity may already own bytes at this location.
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        if let Err(error) = file.write_all(bytes).and_then(|()| file.sync_all()) {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(AppError::from(error));
        }

        tracing::debug!(location = %location, size = bytes.len(), "stored upload bytes");
        Ok(StoredBlob {
            location,
            size_bytes: bytes.len() as u64,
        })
    }

    fn remove(&self, location: &str) -> AppResult<()> {
        let path = self.resolve(location)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(AppError::from(error)),
        }
    }
}

pub fn category_for_mime(mime_type: &str) -> &'static str {
    let mime = mime_type.to_ascii_lowercase();
    if mime.starts_with("image/") {
        "images"
    } else if mime.contains("pdf") {
        "documents"
    } else if mime.contains("spreadsheet") || mime.contains("excel") {
        "spreadsheets"
    } else if mime.contains("presentation") || mime.contains("powerpoint") {
        "presentations"
    } else if mime.contains("document") || mime.contains("word") {
        "documents"
    } else {
        "others"
    }
}

pub fn sanitize_file_name(raw: &str) -> String {
    let base = Path::new(raw)
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or_default();
    let cleaned = UNSAFE_NAME_CHARS.replace_all(base, "_");
    let cleaned = cleaned.trim_matches(|c| c == '_' || c == '.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
