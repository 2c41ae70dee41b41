use crate::db;
use crate::ipc::error::{err, ok, respond, HandlerErr};
use crate::ipc::helpers::require_db;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::{Path, PathBuf};

/// Opens (creating if needed) the workspace database and makes it current.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<()> {
    let conn = db::open_db(path)?;
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    Ok(())
}

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match open_workspace(state, &path) {
        Ok(()) => ok(&req.id, json!({ "workspacePath": path.to_string_lossy() })),
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn handle_workspace_seed_demo(state: &mut AppState, req: &Request) -> serde_json::Value {
    let outcome = require_db(state).and_then(|conn| {
        match db::seed_demo(conn) {
            Ok(Some(counts)) => Ok(json!({ "seeded": counts })),
            Ok(None) => Err(HandlerErr::new(
                "conflict",
                "workspace already has users; demo data needs an empty workspace",
            )),
            Err(e) => Err(HandlerErr::new("db_insert_failed", format!("{e:?}"))),
        }
    });
    respond(&req.id, outcome)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "workspace.seedDemo" => Some(handle_workspace_seed_demo(state, req)),
        _ => None,
    }
}
