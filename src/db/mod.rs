use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, Entity, EntityDraft, EntityKind, EntityPatch, PathSegment};
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const ENTITY_COLUMNS: &str = "id, name, kind, size_bytes, mime_type, file_path, parent_id, starred, shared, \
                              shared_emails, trashed, created_at, modified_at";

/// Upper bound on ancestor walks; a deeper chain means the store is corrupt.
const MAX_TREE_DEPTH: usize = 4_096;

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };

        db.apply_pragmas()?;
        db.ensure_default_settings()?;

        tracing::debug!(path = %db.db_path.display(), "entity store opened");
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn insert(&self, draft: &EntityDraft) -> AppResult<Entity> {
        let name = validate_name(&draft.name)?;

        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        if let Some(parent_id) = draft.parent_id.as_deref() {
            let parent_kind = conn
                .query_row("SELECT kind FROM entities WHERE id = ?1", [parent_id], |row| {
                    row.get::<_, String>(0)
                })
                .optional()?;
            match parent_kind.as_deref() {
                None => {
                    return Err(AppError::Validation(format!("parent {} does not exist", parent_id)));
                }
                Some(kind) if kind != EntityKind::Folder.as_str() => {
                    return Err(AppError::Validation(format!("parent {} is not a folder", parent_id)));
                }
                Some(_) => {}
            }
        }

        let id = fresh_id(&conn)?;
        let now = now_stamp();
        let (size_bytes, mime_type, file_path) = if draft.kind.is_folder() {
            (0, None, None)
        } else {
            (draft.size_bytes, draft.mime_type.clone(), draft.file_path.clone())
        };

        conn.execute(
            "INSERT INTO entities (
               id, name, kind, size_bytes, mime_type, file_path, parent_id, starred, shared,
               shared_emails, trashed, created_at, modified_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, NULL, 0, ?9, ?9)",
            params![
                id,
                name,
                draft.kind.as_str(),
                to_sql_size(size_bytes)?,
                mime_type,
                file_path,
                draft.parent_id,
                draft.starred,
                format_time(now),
            ],
        )?;

        Ok(Entity {
            id,
            name,
            kind: draft.kind,
            size_bytes,
            mime_type,
            file_path,
            parent_id: draft.parent_id.clone(),
            starred: draft.starred,
            shared: false,
            shared_emails: None,
            trashed: false,
            created_at: now,
            modified_at: now,
        })
    }

    pub fn get_by_id(&self, id: &str) -> AppResult<Option<Entity>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        fetch_entity(&conn, id)
    }

    /// Children of `parent_id` (root when `None`), folders first, then by
    /// name in byte order.
    pub fn query_by_parent(&self, parent_id: Option<&str>, include_trashed: bool) -> AppResult<Vec<Entity>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let mut query = format!("SELECT {} FROM entities WHERE 1 = 1", ENTITY_COLUMNS);
        let mut params_vec: Vec<String> = Vec::new();

        match parent_id {
            Some(parent_id) => {
                query.push_str(" AND parent_id = ?");
                params_vec.push(parent_id.to_string());
            }
            None => query.push_str(" AND parent_id IS NULL"),
        }
        if !include_trashed {
            query.push_str(" AND trashed = 0");
        }
        query.push_str(" ORDER BY CASE WHEN kind = 'folder' THEN 0 ELSE 1 END, name COLLATE BINARY ASC, created_at ASC");

        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map(rusqlite::params_from_iter(params_vec.iter()), parse_entity_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn list_all(&self) -> AppResult<Vec<Entity>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let mut statement = conn.prepare(&format!("SELECT {} FROM entities ORDER BY created_at ASC", ENTITY_COLUMNS))?;
        let rows = statement.query_map([], parse_entity_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Applies the whitelisted fields of `patch` and stamps `modified_at`.
    pub fn update_fields(&self, id: &str, patch: &EntityPatch) -> AppResult<Entity> {
        if patch.is_empty() {
            return Err(AppError::Validation("no updatable fields in request".to_string()));
        }
        let name = patch.name.as_deref().map(validate_name).transpose()?;

        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let previous: Option<String> = conn
            .query_row("SELECT modified_at FROM entities WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        let Some(previous) = previous else {
            return Err(AppError::NotFound(format!("entity {} not found", id)));
        };
        let stamp = next_stamp(parse_time(&previous)?);

        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(name) = name {
            assignments.push("name = ?");
            values.push(Box::new(name));
        }
        if let Some(starred) = patch.starred {
            assignments.push("starred = ?");
            values.push(Box::new(starred));
        }
        if let Some(trashed) = patch.trashed {
            assignments.push("trashed = ?");
            values.push(Box::new(trashed));
        }
        assignments.push("modified_at = ?");
        values.push(Box::new(format_time(stamp)));
        values.push(Box::new(id.to_string()));

        let query = format!("UPDATE entities SET {} WHERE id = ?", assignments.join(", "));
        let affected = conn.execute(&query, rusqlite::params_from_iter(values.iter()))?;
        if affected == 0 {
            return Err(AppError::NotFound(format!("entity {} not found", id)));
        }

        fetch_entity(&conn, id)?.ok_or_else(|| AppError::NotFound(format!("entity {} not found", id)))
    }

    /// Hard-deletes a trashed record and remembers its id so it is never handed
    /// out again. The trashed and no-children checks run in the same
    /// transaction as the delete, so a concurrent restore cannot slip between them.
    pub fn purge(&self, id: &str) -> AppResult<Entity> {
        let mut conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let tx = conn.transaction()?;
        let Some(entity) = fetch_entity(&tx, id)? else {
            return Err(AppError::NotFound(format!("entity {} not found", id)));
        };
        if !entity.trashed {
            return Err(AppError::InvalidState(format!(
                "{} must be moved to trash before it can be purged",
                entity.name
            )));
        }
        let children: i64 =
            tx.query_row("SELECT COUNT(1) FROM entities WHERE parent_id = ?1", [id], |row| row.get(0))?;
        if children > 0 {
            return Err(AppError::InvalidState(format!(
                "folder {} still contains {} item(s)",
                entity.name, children
            )));
        }

        let deleted = tx.execute("DELETE FROM entities WHERE id = ?1 AND trashed = 1", [id])?;
        if deleted == 0 {
            return Err(AppError::InvalidState(format!("{} is no longer in trash", entity.name)));
        }
        tx.execute(
            "INSERT OR IGNORE INTO purged_ids (id, purged_at) VALUES (?1, ?2)",
            params![id, format_time(now_stamp())],
        )?;
        tx.commit()?;

        Ok(entity)
    }

    /// Root-first chain of `(name, id)` from the top-level ancestor down to `id` itself.
    pub fn ancestor_chain(&self, id: &str) -> AppResult<Vec<PathSegment>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut cursor = Some(id.to_string());

        while let Some(current) = cursor {
            if !visited.insert(current.clone()) || visited.len() > MAX_TREE_DEPTH {
                return Err(AppError::Store(format!("parent chain of {} contains a cycle", id)));
            }
            let row = conn
                .query_row(
                    "SELECT name, parent_id FROM entities WHERE id = ?1",
                    [current.as_str()],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
                )
                .optional()?;
            let Some((name, parent_id)) = row else {
                if chain.is_empty() {
                    return Err(AppError::NotFound(format!("entity {} not found", id)));
                }
                return Err(AppError::Store(format!("dangling parent reference {}", current)));
            };
            chain.push(PathSegment { name, id: current });
            cursor = parent_id;
        }

        chain.reverse();
        Ok(chain)
    }

    pub fn was_purged(&self, id: &str) -> AppResult<bool> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let count: i64 = conn.query_row("SELECT COUNT(1) FROM purged_ids WHERE id = ?1", [id], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Cheap liveness probe; returns the number of stored entities.
    pub fn ping(&self) -> AppResult<i64> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let count = conn.query_row("SELECT COUNT(1) FROM entities", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn get_settings(&self) -> AppResult<AppSettings> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let raw = conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = 'app'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        match raw {
            Some(raw) => serde_json::from_str::<AppSettings>(&raw)
                .map_err(|error| AppError::Store(format!("stored settings are unreadable: {}", error))),
            None => Ok(AppSettings::default()),
        }
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        let current = self.get_settings()?;
        let mut merged = serde_json::to_value(current)?;
        merge_json(&mut merged, update);
        let settings: AppSettings =
            serde_json::from_value(merged).map_err(|error| AppError::Validation(error.to_string()))?;
        if settings.recent_window_days == 0 {
            return Err(AppError::Validation("recentWindowDays must be at least 1".to_string()));
        }

        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO settings (key, value_json, updated_at)
             VALUES ('app', ?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![serde_json::to_string(&settings)?, Utc::now().to_rfc3339()],
        )?;

        Ok(settings)
    }

    fn apply_pragmas(&self) -> AppResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(())
    }

    fn ensure_default_settings(&self) -> AppResult<()> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let count: i64 = conn.query_row("SELECT COUNT(1) FROM settings WHERE key = 'app'", [], |row| row.get(0))?;
        if count == 0 {
            conn.execute(
                "INSERT INTO settings (key, value_json, updated_at) VALUES ('app', ?1, ?2)",
                params![
                    serde_json::to_string(&AppSettings::default())?,
                    Utc::now().to_rfc3339()
                ],
            )?;
        }
        Ok(())
    }
}

fn fetch_entity(conn: &Connection, id: &str) -> AppResult<Option<Entity>> {
    let entity = conn
        .query_row(
            &format!("SELECT {} FROM entities WHERE id = ?1", ENTITY_COLUMNS),
            [id],
            parse_entity_row,
        )
        .optional()?;
    Ok(entity)
}

fn fresh_id(conn: &Connection) -> AppResult<String> {
    loop {
        let candidate = Uuid::new_v4().to_string();
        let taken: i64 = conn.query_row(
            "SELECT (SELECT COUNT(1) FROM entities WHERE id = ?1) + (SELECT COUNT(1) FROM purged_ids WHERE id = ?1)",
            [candidate.as_str()],
            |row| row.get(0),
        )?;
        if taken == 0 {
            return Ok(candidate);
        }
    }
}

pub(crate) fn validate_name(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }
    Ok(trimmed.to_string())
}

/// Current time truncated to the precision the store keeps.
pub fn now_stamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// A stamp strictly after `previous`, even when the clock has not moved.
pub fn next_stamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = now_stamp();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

fn format_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_sql_size(size: u64) -> AppResult<i64> {
    i64::try_from(size).map_err(|_| AppError::Validation(format!("size {} is out of range", size)))
}

fn parse_entity_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entity> {
    let size: i64 = row.get(3)?;
    Ok(Entity {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: parse_kind(&row.get::<_, String>(2)?)?,
        size_bytes: u64::try_from(size).unwrap_or_default(),
        mime_type: row.get(4)?,
        file_path: row.get(5)?,
        parent_id: row.get(6)?,
        starred: row.get(7)?,
        shared: row.get(8)?,
        shared_emails: row.get(9)?,
        trashed: row.get(10)?,
        created_at: parse_time(&row.get::<_, String>(11)?)?,
        modified_at: parse_time(&row.get::<_, String>(12)?)?,
    })
}

fn parse_kind(raw: &str) -> rusqlite::Result<EntityKind> {
    EntityKind::parse(raw).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unknown entity kind '{}'", raw),
            )),
        )
    })
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}
