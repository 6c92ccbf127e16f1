use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Folder,
    Document,
    Spreadsheet,
    Presentation,
    Image,
    Pdf,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Document => "document",
            Self::Spreadsheet => "spreadsheet",
            Self::Presentation => "presentation",
            Self::Image => "image",
            Self::Pdf => "pdf",
        }
    }

    pub fn parse(raw: &str) -> AppResult<Self> {
        match raw.trim() {
            "folder" => Ok(Self::Folder),
            "document" => Ok(Self::Document),
            "spreadsheet" => Ok(Self::Spreadsheet),
            "presentation" => Ok(Self::Presentation),
            "image" => Ok(Self::Image),
            "pdf" => Ok(Self::Pdf),
            "" => Err(AppError::Validation("kind is required".to_string())),
            other => Err(AppError::Validation(format!("unknown kind: {}", other))),
        }
    }

    pub fn is_folder(self) -> bool {
        matches!(self, Self::Folder)
    }

    /// Classifies an uploaded payload by its declared mime type.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.contains("pdf") {
            Self::Pdf
        } else if mime.contains("spreadsheet") || mime.contains("excel") {
            Self::Spreadsheet
        } else if mime.contains("presentation") || mime.contains("powerpoint") {
            Self::Presentation
        } else {
            Self::Document
        }
    }

    /// Placeholder size for documents created without uploaded bytes.
    pub fn default_size(self) -> u64 {
        match self {
            Self::Document => 1024,
            Self::Spreadsheet => 2048,
            Self::Presentation => 4096,
            Self::Folder | Self::Image | Self::Pdf => 0,
        }
    }

    pub fn default_mime(self) -> Option<&'static str> {
        match self {
            Self::Folder => None,
            Self::Document => Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
            Self::Spreadsheet => Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
            Self::Presentation => {
                Some("application/vnd.openxmlformats-officedocument.presentationml.presentation")
            }
            Self::Pdf => Some("application/pdf"),
            Self::Image => Some("image/jpeg"),
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Folder => "Folder",
            Self::Document => "Document",
            Self::Spreadsheet => "Spreadsheet",
            Self::Presentation => "Presentation",
            Self::Image => "Image",
            Self::Pdf => "PDF",
        }
    }
}

/// A file or folder record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub size_bytes: u64,
    pub mime_type: Option<String>,
    pub file_path: Option<String>,
    pub parent_id: Option<String>,
    pub starred: bool,
    pub shared: bool,
    pub shared_emails: Option<String>,
    pub trashed: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Entity {
    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }

    pub fn is_active(&self) -> bool {
        !self.trashed
    }
}

/// Input to `Database::insert`. Every record starts active; only `starred`
/// may be preset by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDraft {
    pub name: String,
    pub kind: EntityKind,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub size_bytes: u64,
    pub mime_type: Option<String>,
    pub file_path: Option<String>,
    #[serde(default)]
    pub starred: bool,
}

impl EntityDraft {
    pub fn new(name: impl Into<String>, kind: EntityKind, parent_id: Option<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            parent_id,
            size_bytes: 0,
            mime_type: None,
            file_path: None,
            starred: false,
        }
    }
}

/// Payload metadata for non-folder kinds. Raw bytes never reach the store,
/// only the location token returned by the blob store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PayloadMeta {
    pub size_bytes: u64,
    pub mime_type: Option<String>,
    pub file_path: Option<String>,
}

/// Whitelisted mutation. Unknown keys fail deserialization instead of being
/// silently dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntityPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trashed: Option<bool>,
}

impl EntityPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn starred(value: bool) -> Self {
        Self {
            starred: Some(value),
            ..Self::default()
        }
    }

    pub fn trashed(value: bool) -> Self {
        Self {
            trashed: Some(value),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.starred.is_none() && self.trashed.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewType {
    #[default]
    All,
    Recent,
    Starred,
    Trash,
}

/// One step of the navigation stack: the folder's display name and id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PathSegment {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewResult {
    pub view: ViewType,
    pub path: String,
    pub entities: Vec<Entity>,
    /// True when the store read failed and the last known snapshot was served.
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredBlob {
    pub location: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub recent_window_days: u32,
    pub max_upload_mb: u32,
    /// Shown to users only; nothing purges the trash on a schedule.
    pub trash_retention_days: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            recent_window_days: 7,
            max_upload_mb: 50,
            trash_retention_days: 30,
        }
    }
}

impl AppSettings {
    pub fn max_upload_bytes(&self) -> u64 {
        u64::from(self.max_upload_mb) * 1024 * 1024
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub store_reachable: bool,
    pub entity_count: Option<i64>,
    pub checked_at: DateTime<Utc>,
    pub message: Option<String>,
}

/// Transport envelope: `{ success, data?, message? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_mime_matches_upload_categories() {
        assert_eq!(EntityKind::from_mime("image/png"), EntityKind::Image);
        assert_eq!(EntityKind::from_mime("application/pdf"), EntityKind::Pdf);
        assert_eq!(EntityKind::from_mime("application/vnd.ms-excel"), EntityKind::Spreadsheet);
        assert_eq!(
            EntityKind::from_mime("application/vnd.ms-powerpoint"),
            EntityKind::Presentation
        );
        assert_eq!(EntityKind::from_mime("application/msword"), EntityKind::Document);
        assert_eq!(EntityKind::from_mime("application/octet-stream"), EntityKind::Document);
    }

    #[test]
    fn unknown_and_missing_kinds_are_validation_errors() {
        assert!(matches!(EntityKind::parse("video"), Err(AppError::Validation(_))));
        assert!(matches!(EntityKind::parse("  "), Err(AppError::Validation(_))));
        assert_eq!(EntityKind::parse("pdf").expect("pdf"), EntityKind::Pdf);
    }

    #[test]
    fn patch_rejects_unknown_keys() {
        let error = serde_json::from_value::<EntityPatch>(serde_json::json!({
            "name": "x",
            "shared": true
        }))
        .expect_err("unknown key must be rejected");
        assert!(error.to_string().contains("shared"));

        let patch: EntityPatch = serde_json::from_value(serde_json::json!({"starred": true})).expect("patch");
        assert_eq!(patch, EntityPatch::starred(true));
        assert!(EntityPatch::default().is_empty());
    }

    #[test]
    fn envelope_omits_absent_fields() {
        let value = serde_json::to_value(ApiResponse::<()>::failure("nope")).expect("json");
        assert_eq!(value, serde_json::json!({"success": false, "message": "nope"}));
    }
}
