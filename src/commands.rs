use crate::errors::{AppError, AppResult};
use crate::models::{ApiResponse, Entity, EntityKind, EntityPatch, ViewType};
use crate::navigation::NavigationContext;
use crate::service::DriveService;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One client intent, as received over the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    Create {
        name: Option<String>,
        kind: Option<String>,
        parent_id: Option<String>,
    },
    Upload {
        name: String,
        mime_type: String,
        content_base64: String,
        parent_id: Option<String>,
    },
    Get {
        id: String,
    },
    List {
        parent_id: Option<String>,
    },
    ToggleStar {
        id: String,
    },
    Trash {
        id: String,
    },
    Restore {
        id: String,
    },
    Purge {
        id: String,
    },
    Rename {
        id: String,
        name: String,
    },
    Update {
        id: String,
        patch: EntityPatch,
    },
    View,
    Search {
        term: String,
    },
    Navigate {
        id: String,
    },
    Ascend,
    SelectView {
        view: ViewType,
    },
    OpenFolder {
        id: String,
    },
    Breadcrumbs,
    GetSettings,
    UpdateSettings {
        update: Value,
    },
    Health,
}

/// Per-client state: the navigation context every view query is run against.
#[derive(Debug, Default)]
pub struct Session {
    pub navigation: NavigationContext,
}

pub fn parse_command(raw: &str) -> AppResult<Command> {
    serde_json::from_str(raw).map_err(|error| AppError::Validation(format!("invalid request: {}", error)))
}

/// Runs one command and wraps the outcome in the transport envelope.
pub fn dispatch(service: &DriveService, session: &mut Session, command: Command) -> ApiResponse<Value> {
    match execute(service, session, command) {
        Ok((data, Some(message))) => ApiResponse::ok_with_message(data, message),
        Ok((data, None)) => ApiResponse::ok(data),
        Err(error) => {
            tracing::warn!(code = error.code(), error = %error, "command failed");
            ApiResponse::failure(error.to_string())
        }
    }
}

/// Parses and dispatches a raw JSON request; malformed input becomes a
/// failure envelope like any other error.
pub fn handle_raw(service: &DriveService, session: &mut Session, raw: &str) -> ApiResponse<Value> {
    match parse_command(raw) {
        Ok(command) => dispatch(service, session, command),
        Err(error) => ApiResponse::failure(error.to_string()),
    }
}

fn execute(service: &DriveService, session: &mut Session, command: Command) -> AppResult<(Value, Option<String>)> {
    let engine = service.engine();
    match command {
        Command::Create { name, kind, parent_id } => {
            let (Some(name), Some(kind)) = (name, kind) else {
                return Err(AppError::Validation("name and kind are required".to_string()));
            };
            let kind = EntityKind::parse(&kind)?;
            let entity = service.create(&name, kind, parent_id.as_deref())?;
            let message = if kind.is_folder() {
                "Folder created".to_string()
            } else {
                format!("{} created", kind.display_name())
            };
            Ok((entity_json(&entity)?, Some(message)))
        }
        Command::Upload {
            name,
            mime_type,
            content_base64,
            parent_id,
        } => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(content_base64.as_bytes())
                .map_err(|error| AppError::Validation(format!("invalid upload content: {}", error)))?;
            let entity = engine.upload(&name, &mime_type, &bytes, parent_id.as_deref())?;
            Ok((entity_json(&entity)?, Some("File uploaded".to_string())))
        }
        Command::Get { id } => Ok((entity_json(&engine.get(&id)?)?, None)),
        Command::List { parent_id } => {
            let children = service.list_children(parent_id.as_deref())?;
            Ok((serde_json::to_value(children)?, None))
        }
        Command::ToggleStar { id } => {
            let entity = engine.toggle_star(&id)?;
            let message = if entity.starred { "Item starred" } else { "Item unstarred" };
            Ok((entity_json(&entity)?, Some(message.to_string())))
        }
        Command::Trash { id } => {
            let entity = engine.move_to_trash(&id)?;
            Ok((entity_json(&entity)?, Some("Item moved to trash".to_string())))
        }
        Command::Restore { id } => {
            let entity = engine.restore(&id)?;
            Ok((entity_json(&entity)?, Some("Item restored".to_string())))
        }
        Command::Purge { id } => {
            let entity = engine.purge(&id)?;
            Ok((json!({"id": entity.id}), Some("Item permanently deleted".to_string())))
        }
        Command::Rename { id, name } => {
            let entity = engine.rename(&id, &name)?;
            Ok((entity_json(&entity)?, Some("Item renamed".to_string())))
        }
        Command::Update { id, patch } => {
            let entity = service.update(&id, &patch)?;
            Ok((entity_json(&entity)?, Some("Item updated".to_string())))
        }
        Command::View => Ok((serde_json::to_value(service.view(&session.navigation)?)?, None)),
        Command::Search { term } => Ok((serde_json::to_value(service.search(&session.navigation, &term)?)?, None)),
        Command::Navigate { id } => {
            let result = service.navigate(&mut session.navigation, &id)?;
            Ok((serde_json::to_value(result)?, None))
        }
        Command::Ascend => {
            let result = service.ascend(&mut session.navigation)?;
            Ok((serde_json::to_value(result)?, None))
        }
        Command::SelectView { view } => {
            session.navigation.select_view(view);
            Ok((serde_json::to_value(service.view(&session.navigation)?)?, None))
        }
        Command::OpenFolder { id } => {
            let result = service.open_folder(&mut session.navigation, &id)?;
            Ok((serde_json::to_value(result)?, None))
        }
        Command::Breadcrumbs => Ok((
            json!({
                "path": session.navigation.path(),
                "parts": session.navigation.breadcrumbs(),
                "segments": session.navigation.segments(),
            }),
            None,
        )),
        Command::GetSettings => Ok((serde_json::to_value(service.get_settings()?)?, None)),
        Command::UpdateSettings { update } => {
            let settings = service.update_settings(update)?;
            Ok((serde_json::to_value(settings)?, Some("Settings updated".to_string())))
        }
        Command::Health => Ok((serde_json::to_value(service.health())?, None)),
    }
}

fn entity_json(entity: &Entity) -> AppResult<Value> {
    Ok(serde_json::to_value(entity)?)
}
