use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn read_path_param(req: &Request, key: &str) -> Result<PathBuf, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn handle_export_database(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let out_path = match read_path_param(req, "outPath") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let snapshot = match backup::snapshot(conn) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "backup_failed", e.to_string(), None),
    };

    if let Some(parent) = out_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": out_path.to_string_lossy() })),
            );
        }
    }
    let text = match serde_json::to_string_pretty(&snapshot.document) {
        Ok(t) => t,
        Err(e) => return err(&req.id, "backup_failed", e.to_string(), None),
    };
    if let Err(e) = std::fs::write(&out_path, text) {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": out_path.to_string_lossy() })),
        );
    }

    ok(
        &req.id,
        json!({
            "path": out_path.to_string_lossy(),
            "tables": snapshot.tables,
            "rows": snapshot.rows,
            "warnings": snapshot.warnings,
        }),
    )
}

fn handle_restore_database(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let in_path = match read_path_param(req, "inPath") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if !in_path.is_file() {
        return err(
            &req.id,
            "not_found",
            "backup file not found",
            Some(json!({ "path": in_path.to_string_lossy() })),
        );
    }

    let text = match std::fs::read_to_string(&in_path) {
        Ok(t) => t,
        Err(e) => {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": in_path.to_string_lossy() })),
            )
        }
    };
    let doc: serde_json::Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_backup",
                format!("backup file is not valid JSON: {}", e),
                Some(json!({ "path": in_path.to_string_lossy() })),
            )
        }
    };

    match backup::restore(conn, &doc) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "message": format!("restored {} rows", summary.rows()),
                "restored": {
                    "seats": summary.seats,
                    "students": summary.students,
                    "payments": summary.payments,
                    "expenses": summary.expenses,
                    "studentFeesConfig": summary.fees_config,
                    "users": summary.users,
                },
                "adminSkipped": summary.admin_skipped,
                "skippedTables": summary.skipped_tables,
            }),
        ),
        Err(e) => err(
            &req.id,
            "restore_failed",
            format!("{e:#}; the transaction was rolled back and no data was restored"),
            Some(json!({ "path": in_path.to_string_lossy() })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportDatabase" => Some(handle_export_database(state, req)),
        "backup.restoreDatabase" => Some(handle_restore_database(state, req)),
        _ => None,
    }
}
