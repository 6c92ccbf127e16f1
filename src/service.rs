use crate::config::BootConfig;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::lifecycle::{placeholder_payload, LifecycleEngine};
use crate::models::{AppSettings, Entity, EntityKind, EntityPatch, HealthReport, ViewResult};
use crate::navigation::NavigationContext;
use crate::storage::{BlobStore, DiskBlobStore};
use crate::views::ViewProjector;
use chrono::Utc;
use std::sync::Arc;

/// Wires the store, lifecycle engine, blob storage and view projector
/// together behind one handle.
#[derive(Clone)]
pub struct DriveService {
    db: Arc<Database>,
    engine: LifecycleEngine,
    projector: Arc<ViewProjector>,
}

impl DriveService {
    pub fn new(config: &BootConfig) -> AppResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let db = Arc::new(Database::new(&config.database_path())?);
        let blobs: Arc<dyn BlobStore> = Arc::new(DiskBlobStore::new(&config.uploads_dir())?);
        Self::with_parts(db, blobs)
    }

    pub fn with_parts(db: Arc<Database>, blobs: Arc<dyn BlobStore>) -> AppResult<Self> {
        let settings = db.get_settings()?;
        let projector = Arc::new(ViewProjector::new(db.clone(), settings.recent_window_days));
        Ok(Self {
            engine: LifecycleEngine::new(db.clone(), blobs),
            db,
            projector,
        })
    }

    pub fn engine(&self) -> &LifecycleEngine {
        &self.engine
    }

    pub fn projector(&self) -> &ViewProjector {
        &self.projector
    }

    /// Creates a folder or an empty document; documents get placeholder
    /// size and mime type for their kind.
    pub fn create(&self, name: &str, kind: EntityKind, parent_id: Option<&str>) -> AppResult<Entity> {
        self.engine.create(name, kind, parent_id, placeholder_payload(kind))
    }

    pub fn list_children(&self, parent_id: Option<&str>) -> AppResult<Vec<Entity>> {
        if let Some(parent_id) = parent_id {
            let parent = self.engine.get(parent_id)?;
            if !parent.is_folder() {
                return Err(AppError::Validation(format!("{} is not a folder", parent.name)));
            }
        }
        self.db.query_by_parent(parent_id, false)
    }

    pub fn view(&self, ctx: &NavigationContext) -> AppResult<ViewResult> {
        self.projector.project(ctx, Utc::now())
    }

    pub fn search(&self, ctx: &NavigationContext, term: &str) -> AppResult<ViewResult> {
        self.projector.search(ctx, term, Utc::now())
    }

    /// Opens a child folder of the folder currently shown.
    pub fn navigate(&self, ctx: &mut NavigationContext, folder_id: &str) -> AppResult<ViewResult> {
        let folder = self.engine.get(folder_id)?;
        ctx.descend_into(&folder)?;
        self.view(ctx)
    }

    /// Opens any folder by id, rebuilding the stack from its ancestors.
    pub fn open_folder(&self, ctx: &mut NavigationContext, folder_id: &str) -> AppResult<ViewResult> {
        let folder = self.engine.get(folder_id)?;
        if !folder.is_folder() {
            return Err(AppError::Validation(format!("{} is not a folder", folder.name)));
        }
        let chain = self.db.ancestor_chain(folder_id)?;
        ctx.open_folder(chain);
        self.view(ctx)
    }

    pub fn ascend(&self, ctx: &mut NavigationContext) -> AppResult<ViewResult> {
        ctx.ascend();
        self.view(ctx)
    }

    pub fn update(&self, id: &str, patch: &EntityPatch) -> AppResult<Entity> {
        self.engine.update(id, patch)
    }

    pub fn get_settings(&self) -> AppResult<AppSettings> {
        self.db.get_settings()
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        let settings = self.db.update_settings(update)?;
        self.projector.set_recent_window_days(settings.recent_window_days);
        tracing::info!(settings = ?settings, "settings updated");
        Ok(settings)
    }

    pub fn health(&self) -> HealthReport {
        match self.db.ping() {
            Ok(count) => HealthReport {
                store_reachable: true,
                entity_count: Some(count),
                checked_at: Utc::now(),
                message: None,
            },
            Err(error) => {
                tracing::warn!(error = %error, "health check failed");
                HealthReport {
                    store_reachable: false,
                    entity_count: None,
                    checked_at: Utc::now(),
                    message: Some(error.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ViewType;

    fn service() -> (tempfile::TempDir, DriveService) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = BootConfig {
            data_dir: dir.path().join("data"),
            ..BootConfig::default()
        };
        let service = DriveService::new(&config).expect("service");
        (dir, service)
    }

    #[test]
    fn open_folder_from_starred_view_restores_full_path() {
        let (_dir, service) = service();
        let a = service.create("A", EntityKind::Folder, None).expect("a");
        let b = service.create("B", EntityKind::Folder, Some(&a.id)).expect("b");
        service.engine().toggle_star(&b.id).expect("star");

        let mut ctx = NavigationContext::new();
        ctx.select_view(ViewType::Starred);
        let starred = service.view(&ctx).expect("starred");
        assert_eq!(starred.entities.len(), 1);

        let opened = service.open_folder(&mut ctx, &b.id).expect("open");
        assert_eq!(opened.path, "/A/B");
        assert_eq!(opened.view, ViewType::All);

        let up = service.ascend(&mut ctx).expect("up");
        assert_eq!(up.path, "/A");
        assert_eq!(ctx.current_parent_id(), Some(a.id.as_str()));
        assert_eq!(up.entities.len(), 1);
    }

    #[test]
    fn settings_update_changes_recent_window() {
        let (_dir, service) = service();
        service
            .update_settings(serde_json::json!({"recentWindowDays": 30}))
            .expect("settings");
        assert_eq!(service.projector().recent_window(), chrono::Duration::days(30));
    }

    #[test]
    fn health_reports_entity_count() {
        let (_dir, service) = service();
        service.create("doc", EntityKind::Document, None).expect("doc");
        let report = service.health();
        assert!(report.store_reachable);
        assert_eq!(report.entity_count, Some(1));
    }

    #[test]
    fn list_children_rejects_non_folders() {
        let (_dir, service) = service();
        let doc = service.create("doc", EntityKind::Document, None).expect("doc");
        assert_eq!(doc.size_bytes, 1024);
        assert!(matches!(service.list_children(Some(&doc.id)), Err(AppError::Validation(_))));
        assert!(matches!(service.list_children(Some("missing")), Err(AppError::NotFound(_))));
    }
}
