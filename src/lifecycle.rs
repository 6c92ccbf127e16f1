use crate::db::{validate_name, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{Entity, EntityDraft, EntityKind, EntityPatch, PayloadMeta};
use crate::storage::BlobStore;
use std::sync::Arc;

/// Legal transitions over the entity store:
/// active -> trashed -> active, trashed -> purged.
#[derive(Clone)]
pub struct LifecycleEngine {
    db: Arc<Database>,
    blobs: Arc<dyn BlobStore>,
}

impl LifecycleEngine {
    pub fn new(db: Arc<Database>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { db, blobs }
    }

    pub fn get(&self, id: &str) -> AppResult<Entity> {
        self.db
            .get_by_id(id)?
            .ok_or_else(|| AppError::NotFound(format!("entity {} not found", id)))
    }

    pub fn create(
        &self,
        name: &str,
        kind: EntityKind,
        parent_id: Option<&str>,
        payload: Option<PayloadMeta>,
    ) -> AppResult<Entity> {
        let name = validate_name(name)?;
        if let Some(parent_id) = parent_id {
            let parent = self
                .db
                .get_by_id(parent_id)?
                .ok_or_else(|| AppError::Validation(format!("parent {} does not exist", parent_id)))?;
            if !parent.is_folder() {
                return Err(AppError::Validation(format!("parent {} is not a folder", parent.name)));
            }
        }

        let mut draft = EntityDraft::new(name, kind, parent_id.map(ToString::to_string));
        if let (false, Some(payload)) = (kind.is_folder(), payload) {
            draft.size_bytes = payload.size_bytes;
            draft.mime_type = payload.mime_type;
            draft.file_path = payload.file_path;
        }

        let entity = self.db.insert(&draft)?;
        tracing::info!(entity_id = %entity.id, kind = kind.as_str(), parent_id = ?entity.parent_id, "entity created");
        Ok(entity)
    }

    /// Stores uploaded bytes and records the resulting file. The stored bytes
    /// are removed again when the record cannot be created.
    pub fn upload(
        &self,
        name: &str,
        mime_type: &str,
        bytes: &[u8],
        parent_id: Option<&str>,
    ) -> AppResult<Entity> {
        if bytes.is_empty() {
            return Err(AppError::Validation("upload is empty".to_string()));
        }
        let limit = self.db.get_settings()?.max_upload_bytes();
        if bytes.len() as u64 > limit {
            return Err(AppError::Validation(format!(
                "upload of {} bytes exceeds the {} byte limit",
                bytes.len(),
                limit
            )));
        }
        validate_name(name)?;

        let blob = self.blobs.store(name, mime_type, bytes)?;
        let payload = PayloadMeta {
            size_bytes: blob.size_bytes,
            mime_type: Some(mime_type.to_string()),
            file_path: Some(blob.location.clone()),
        };
        match self.create(name, EntityKind::from_mime(mime_type), parent_id, Some(payload)) {
            Ok(entity) => Ok(entity),
            Err(error) => {
                if let Err(cleanup) = self.blobs.remove(&blob.location) {
                    tracing::warn!(location = %blob.location, error = %cleanup, "failed to remove orphaned upload");
                }
                Err(error)
            }
        }
    }

    pub fn toggle_star(&self, id: &str) -> AppResult<Entity> {
        let current = self.get(id)?;
        let updated = self.db.update_fields(id, &EntityPatch::starred(!current.starred))?;
        tracing::info!(entity_id = %id, starred = updated.starred, "star toggled");
        Ok(updated)
    }

    /// Trashing an already trashed entity succeeds without touching it.
    pub fn move_to_trash(&self, id: &str) -> AppResult<Entity> {
        let current = self.get(id)?;
        if current.trashed {
            tracing::debug!(entity_id = %id, "entity already in trash");
            return Ok(current);
        }
        let updated = self.db.update_fields(id, &EntityPatch::trashed(true))?;
        tracing::info!(entity_id = %id, "entity moved to trash");
        Ok(updated)
    }

    pub fn restore(&self, id: &str) -> AppResult<Entity> {
        let current = self.get(id)?;
        if !current.trashed {
            return Err(AppError::InvalidState(format!("{} is not in trash", current.name)));
        }
        let updated = self.db.update_fields(id, &EntityPatch::trashed(false))?;
        tracing::info!(entity_id = %id, "entity restored");
        Ok(updated)
    }

    /// Irreversibly removes a trashed entity. Folders must be empty.
    pub fn purge(&self, id: &str) -> AppResult<Entity> {
        let removed = self.db.purge(id)?;
        if let Some(location) = removed.file_path.as_deref() {
            if let Err(error) = self.blobs.remove(location) {
                tracing::warn!(entity_id = %id, location = %location, error = %error, "failed to remove stored bytes");
            }
        }
        tracing::info!(entity_id = %id, "entity purged");
        Ok(removed)
    }

    pub fn rename(&self, id: &str, new_name: &str) -> AppResult<Entity> {
        let name = validate_name(new_name)?;
        let updated = self.db.update_fields(id, &EntityPatch::rename(name))?;
        tracing::info!(entity_id = %id, "entity renamed");
        Ok(updated)
    }

    /// Applies a whitelisted patch. A `trashed` change obeys the same rules
    /// as `move_to_trash` and `restore`.
    pub fn update(&self, id: &str, patch: &EntityPatch) -> AppResult<Entity> {
        if patch.is_empty() {
            return Err(AppError::Validation("no updatable fields in request".to_string()));
        }
        let current = self.get(id)?;
        let mut patch = patch.clone();
        match patch.trashed {
            Some(false) if !current.trashed => {
                return Err(AppError::InvalidState(format!("{} is not in trash", current.name)));
            }
            Some(true) if current.trashed => patch.trashed = None,
            _ => {}
        }
        if patch.is_empty() {
            return Ok(current);
        }

        let updated = self.db.update_fields(id, &patch)?;
        tracing::info!(entity_id = %id, patch = ?patch, "entity updated");
        Ok(updated)
    }
}

/// Size and mime placeholders for documents created without uploaded bytes.
pub fn placeholder_payload(kind: EntityKind) -> Option<PayloadMeta> {
    if kind.is_folder() {
        return None;
    }
    Some(PayloadMeta {
        size_bytes: kind.default_size(),
        mime_type: kind.default_mime().map(ToString::to_string),
        file_path: None,
    })
}
