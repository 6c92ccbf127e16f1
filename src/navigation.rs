use crate::errors::{AppError, AppResult};
use crate::models::{Entity, PathSegment, ViewType};
use serde::{Deserialize, Serialize};

pub const ROOT_PATH: &str = "/";

/// Path of `name` opened from `current_path`.
pub fn descend_path(current_path: &str, name: &str) -> String {
    if current_path == ROOT_PATH || current_path.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", current_path.trim_end_matches('/'), name)
    }
}

pub fn breadcrumb_parts(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Where the user is: the selected view plus the folder stack.
///
/// The stack holds `(name, id)` pairs so going up resolves the real parent
/// id at any depth. Selecting a view clears the stack and moving through
/// folders resets the view to `all`, so no single call can leave a folder
/// open under a flat view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationContext {
    view: ViewType,
    stack: Vec<PathSegment>,
}

impl NavigationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> ViewType {
        self.view
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.stack
    }

    /// Folder whose children the `all` view lists; `None` is the root.
    pub fn current_parent_id(&self) -> Option<&str> {
        self.stack.last().map(|segment| segment.id.as_str())
    }

    pub fn path(&self) -> String {
        self.stack
            .iter()
            .fold(ROOT_PATH.to_string(), |path, segment| descend_path(&path, &segment.name))
    }

    /// One part per open folder, taken from the stack so a name containing
    /// `/` still counts as a single level.
    pub fn breadcrumbs(&self) -> Vec<String> {
        self.stack.iter().map(|segment| segment.name.clone()).collect()
    }

    pub fn is_root(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn select_view(&mut self, view: ViewType) {
        self.view = view;
        self.stack.clear();
    }

    /// Opens `folder` below the current folder and returns the new path.
    pub fn descend_into(&mut self, folder: &Entity) -> AppResult<String> {
        if !folder.is_folder() {
            return Err(AppError::Validation(format!("{} is not a folder", folder.name)));
        }
        if folder.parent_id.as_deref() != self.current_parent_id() {
            return Err(AppError::Validation(format!(
                "{} is not inside {}",
                folder.name,
                self.path()
            )));
        }
        let path = descend_path(&self.path(), &folder.name);
        self.view = ViewType::All;
        self.stack.push(PathSegment {
            name: folder.name.clone(),
            id: folder.id.clone(),
        });
        Ok(path)
    }

    /// Pops one level and returns the id of the folder now open (`None` at root).
    pub fn ascend(&mut self) -> Option<String> {
        self.stack.pop();
        self.view = ViewType::All;
        self.current_parent_id().map(ToString::to_string)
    }

    /// Replaces the stack with a root-first ancestor chain, e.g. when a folder
    /// is opened from the starred or recent view.
    pub fn open_folder(&mut self, chain: Vec<PathSegment>) -> String {
        self.view = ViewType::All;
        self.stack = chain;
        self.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;
    use chrono::Utc;

    fn folder(id: &str, name: &str, parent_id: Option<&str>) -> Entity {
        let now = Utc::now();
        Entity {
            id: id.to_string(),
            name: name.to_string(),
            kind: EntityKind::Folder,
            size_bytes: 0,
            mime_type: None,
            file_path: None,
            parent_id: parent_id.map(ToString::to_string),
            starred: false,
            shared: false,
            shared_emails: None,
            trashed: false,
            created_at: now,
            modified_at: now,
        }
    }

    #[test]
    fn descend_path_handles_root() {
        assert_eq!(descend_path("/", "A"), "/A");
        assert_eq!(descend_path("/A", "B"), "/A/B");
    }

    #[test]
    fn breadcrumb_parts_drop_empty_segments() {
        assert_eq!(breadcrumb_parts("/A//B/"), vec!["A", "B"]);
        assert!(breadcrumb_parts("/").is_empty());
    }

    #[test]
    fn ascend_resolves_true_parent_from_depth() {
        let mut ctx = NavigationContext::new();
        ctx.descend_into(&folder("a", "A", None)).expect("a");
        ctx.descend_into(&folder("b", "B", Some("a"))).expect("b");
        let path = ctx.descend_into(&folder("c", "C", Some("b"))).expect("c");
        assert_eq!(path, "/A/B/C");
        assert_eq!(ctx.breadcrumbs(), vec!["A", "B", "C"]);

        assert_eq!(ctx.ascend().as_deref(), Some("b"));
        assert_eq!(ctx.path(), "/A/B");
        assert_eq!(ctx.ascend().as_deref(), Some("a"));
        assert_eq!(ctx.ascend(), None);
        assert_eq!(ctx.ascend(), None);
        assert!(ctx.is_root());
    }

    #[test]
    fn breadcrumbs_keep_one_part_per_level() {
        let mut ctx = NavigationContext::new();
        ctx.descend_into(&folder("a", "a/b", None)).expect("a");
        ctx.descend_into(&folder("c", "C", Some("a"))).expect("c");
        assert_eq!(ctx.breadcrumbs(), vec!["a/b", "C"]);
        assert_eq!(ctx.breadcrumbs().len(), ctx.segments().len());
    }

    #[test]
    fn view_and_folder_resets_are_exclusive() {
        let mut ctx = NavigationContext::new();
        ctx.descend_into(&folder("a", "A", None)).expect("a");
        ctx.select_view(ViewType::Starred);
        assert_eq!(ctx.view(), ViewType::Starred);
        assert!(ctx.is_root());

        ctx.descend_into(&folder("a", "A", None)).expect("a again");
        assert_eq!(ctx.view(), ViewType::All);
        assert_eq!(ctx.current_parent_id(), Some("a"));
    }

    #[test]
    fn descend_rejects_documents_and_foreign_folders() {
        let mut ctx = NavigationContext::new();
        let mut doc = folder("d", "Plan.docx", None);
        doc.kind = EntityKind::Document;
        assert!(matches!(ctx.descend_into(&doc), Err(AppError::Validation(_))));
        assert!(matches!(
            ctx.descend_into(&folder("x", "X", Some("elsewhere"))),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn open_folder_rebuilds_stack() {
        let mut ctx = NavigationContext::new();
        ctx.select_view(ViewType::Recent);
        let path = ctx.open_folder(vec![
            PathSegment { name: "A".to_string(), id: "a".to_string() },
            PathSegment { name: "B".to_string(), id: "b".to_string() },
        ]);
        assert_eq!(path, "/A/B");
        assert_eq!(ctx.view(), ViewType::All);
        assert_eq!(ctx.ascend().as_deref(), Some("a"));
    }
}
