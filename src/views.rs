use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{Entity, ViewResult, ViewType};
use crate::navigation::NavigationContext;
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

/// Read side of the entity store as the projector sees it.
pub trait EntitySource: Send + Sync {
    fn snapshot(&self) -> AppResult<Vec<Entity>>;
}

impl EntitySource for Database {
    fn snapshot(&self) -> AppResult<Vec<Entity>> {
        self.list_all()
    }
}

pub struct ViewProjector {
    source: Arc<dyn EntitySource>,
    recent_window_days: AtomicU32,
    last_snapshot: Mutex<Option<Vec<Entity>>>,
}

impl ViewProjector {
    pub fn new(source: Arc<dyn EntitySource>, recent_window_days: u32) -> Self {
        Self {
            source,
            recent_window_days: AtomicU32::new(recent_window_days.max(1)),
            last_snapshot: Mutex::new(None),
        }
    }

    pub fn set_recent_window_days(&self, days: u32) {
        self.recent_window_days.store(days.max(1), AtomicOrdering::Relaxed);
    }

    pub fn recent_window(&self) -> Duration {
        Duration::days(i64::from(self.recent_window_days.load(AtomicOrdering::Relaxed)))
    }

    /// Members of the context's current view.
    pub fn project(&self, ctx: &NavigationContext, now: DateTime<Utc>) -> AppResult<ViewResult> {
        let (entities, stale) = self.snapshot()?;
        Ok(ViewResult {
            view: ctx.view(),
            path: ctx.path(),
            entities: filter_view(&entities, ctx.view(), ctx.current_parent_id(), now, self.recent_window()),
            stale,
        })
    }

    /// Case-insensitive name search over active entities in every folder.
    /// A blank term means no filter: the current view is returned instead.
    pub fn search(&self, ctx: &NavigationContext, term: &str, now: DateTime<Utc>) -> AppResult<ViewResult> {
        if term.trim().is_empty() {
            return self.project(ctx, now);
        }
        let (entities, stale) = self.snapshot()?;
        Ok(ViewResult {
            view: ctx.view(),
            path: ctx.path(),
            entities: filter_search(&entities, term),
            stale,
        })
    }

    /// Reads a fresh snapshot, falling back to the last good one when the
    /// store is unavailable.
    fn snapshot(&self) -> AppResult<(Vec<Entity>, bool)> {
        match self.source.snapshot() {
            Ok(entities) => {
                if let Ok(mut cached) = self.last_snapshot.lock() {
                    *cached = Some(entities.clone());
                }
                Ok((entities, false))
            }
            Err(error) => {
                let cached = self
                    .last_snapshot
                    .lock()
                    .map_err(|_| AppError::Internal("snapshot cache mutex poisoned".to_string()))?
                    .clone();
                match cached {
                    Some(entities) => {
                        tracing::warn!(error = %error, "entity store read failed, serving last snapshot");
                        Ok((entities, true))
                    }
                    None => Err(error),
                }
            }
        }
    }
}

pub fn filter_view(
    entities: &[Entity],
    view: ViewType,
    parent_id: Option<&str>,
    now: DateTime<Utc>,
    recent_window: Duration,
) -> Vec<Entity> {
    let mut members: Vec<Entity> = match view {
        ViewType::All => entities
            .iter()
            .filter(|entity| entity.is_active() && entity.parent_id.as_deref() == parent_id)
            .cloned()
            .collect(),
        ViewType::Recent => {
            let cutoff = now - recent_window;
            entities
                .iter()
                .filter(|entity| entity.is_active() && entity.modified_at >= cutoff)
                .cloned()
                .collect()
        }
        ViewType::Starred => entities
            .iter()
            .filter(|entity| entity.is_active() && entity.starred)
            .cloned()
            .collect(),
        ViewType::Trash => entities.iter().filter(|entity| entity.trashed).cloned().collect(),
    };

    match view {
        ViewType::All | ViewType::Starred => members.sort_by(folders_first),
        ViewType::Recent | ViewType::Trash => {
            members.sort_by(|left, right| right.modified_at.cmp(&left.modified_at).then_with(|| folders_first(left, right)))
        }
    }
    members
}

pub fn filter_search(entities: &[Entity], term: &str) -> Vec<Entity> {
    let needle = term.trim().to_lowercase();
    let mut members: Vec<Entity> = entities
        .iter()
        .filter(|entity| entity.is_active() && entity.name.to_lowercase().contains(&needle))
        .cloned()
        .collect();
    members.sort_by(folders_first);
    members
}

/// Folders before everything else, then byte-order name, matching the store.
fn folders_first(left: &Entity, right: &Entity) -> Ordering {
    right
        .is_folder()
        .cmp(&left.is_folder())
        .then_with(|| left.name.cmp(&right.name))
        .then_with(|| left.created_at.cmp(&right.created_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;

    fn entity(id: &str, name: &str, kind: EntityKind, parent_id: Option<&str>, modified_at: DateTime<Utc>) -> Entity {
        Entity {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            size_bytes: 0,
            mime_type: None,
            file_path: None,
            parent_id: parent_id.map(ToString::to_string),
            starred: false,
            shared: false,
            shared_emails: None,
            trashed: false,
            created_at: modified_at,
            modified_at,
        }
    }

    fn names(entities: &[Entity]) -> Vec<&str> {
        entities.iter().map(|entity| entity.name.as_str()).collect()
    }

    struct FlakySource {
        fail: std::sync::atomic::AtomicBool,
        entities: Vec<Entity>,
    }

    impl EntitySource for FlakySource {
        fn snapshot(&self) -> AppResult<Vec<Entity>> {
            if self.fail.load(AtomicOrdering::SeqCst) {
                Err(AppError::Store("connection lost".to_string()))
            } else {
                Ok(self.entities.clone())
            }
        }
    }

    #[test]
    fn recent_boundary_is_inclusive() {
        let now = Utc::now();
        let window = Duration::days(7);
        let items = vec![
            entity("1", "edge", EntityKind::Document, None, now - window),
            entity("2", "old", EntityKind::Document, None, now - window - Duration::microseconds(1)),
            entity("3", "fresh", EntityKind::Document, Some("f"), now),
        ];
        let recent = filter_view(&items, ViewType::Recent, None, now, window);
        assert_eq!(names(&recent), vec!["fresh", "edge"]);
    }

    #[test]
    fn flat_views_ignore_folder_and_respect_trash() {
        let now = Utc::now();
        let mut starred = entity("1", "starred", EntityKind::Document, Some("f"), now);
        starred.starred = true;
        let mut starred_trashed = entity("2", "gone", EntityKind::Document, None, now);
        starred_trashed.starred = true;
        starred_trashed.trashed = true;
        let items = vec![starred, starred_trashed];

        let window = Duration::days(7);
        assert_eq!(names(&filter_view(&items, ViewType::Starred, None, now, window)), vec!["starred"]);
        assert_eq!(names(&filter_view(&items, ViewType::Trash, Some("f"), now, window)), vec!["gone"]);
        assert!(filter_view(&items, ViewType::All, None, now, window).is_empty());
    }

    #[test]
    fn search_is_case_insensitive_and_skips_trash() {
        let now = Utc::now();
        let mut trashed = entity("3", "Report old", EntityKind::Document, None, now);
        trashed.trashed = true;
        let items = vec![
            entity("1", "Quarterly REPORT", EntityKind::Document, Some("f"), now),
            entity("2", "Reports", EntityKind::Folder, None, now),
            trashed,
        ];
        assert_eq!(names(&filter_search(&items, "report")), vec!["Reports", "Quarterly REPORT"]);
    }

    #[test]
    fn blank_search_falls_back_to_current_view() {
        let now = Utc::now();
        let mut starred = entity("1", "fav", EntityKind::Document, None, now);
        starred.starred = true;
        let source = Arc::new(FlakySource {
            fail: std::sync::atomic::AtomicBool::new(false),
            entities: vec![starred, entity("2", "plain", EntityKind::Document, None, now)],
        });
        let projector = ViewProjector::new(source, 7);
        let mut ctx = NavigationContext::new();
        ctx.select_view(ViewType::Starred);

        let result = projector.search(&ctx, "   ", now).expect("search");
        assert_eq!(result.view, ViewType::Starred);
        assert_eq!(names(&result.entities), vec!["fav"]);
    }

    #[test]
    fn failed_read_serves_last_snapshot() {
        let now = Utc::now();
        let source = Arc::new(FlakySource {
            fail: std::sync::atomic::AtomicBool::new(true),
            entities: vec![entity("1", "a", EntityKind::Document, None, now)],
        });
        let projector = ViewProjector::new(source.clone(), 7);
        let ctx = NavigationContext::new();

        assert!(matches!(projector.project(&ctx, now), Err(AppError::Store(_))));

        source.fail.store(false, AtomicOrdering::SeqCst);
        let fresh = projector.project(&ctx, now).expect("fresh");
        assert!(!fresh.stale);

        source.fail.store(true, AtomicOrdering::SeqCst);
        let stale = projector.project(&ctx, now).expect("stale");
        assert!(stale.stale);
        assert_eq!(names(&stale.entities), vec!["a"]);
    }
}
