use crate::export;
use crate::import;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::mapping;
use crate::workbook;
use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

fn read_path_param(req: &Request, key: &str) -> Result<PathBuf, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn handle_import_excel(state: &mut AppState, req: &Request) -> serde_json::Value {
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
            "workbook file not found",
            Some(json!({ "path": in_path.to_string_lossy() })),
        );
    }

    let request_id = Uuid::new_v4().to_string();
    let book = match workbook::read_workbook(&in_path) {
        Ok(b) => b,
        Err(e) => {
            return err(
                &req.id,
                "bad_workbook",
                e.to_string(),
                Some(json!({ "path": in_path.to_string_lossy() })),
            )
        }
    };

    // Sheet resolution fails fast, before any transaction is opened.
    let sheets = match mapping::find_import_sheets(&book) {
        Ok(s) => s,
        Err(e) => {
            return err(
                &req.id,
                "missing_sheet",
                e.to_string(),
                Some(json!({ "sheetsPresent": book.sheet_names() })),
            )
        }
    };

    match import::run(conn, &sheets) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "message": format!(
                    "imported {} rows, skipped {}",
                    summary.imported(),
                    summary.skipped()
                ),
                "imported": summary.imported(),
                "skipped": summary.skipped(),
                "members": {
                    "total": summary.members.total,
                    "imported": summary.members.imported,
                    "skipped": summary.members.skipped,
                },
                "renewals": {
                    "total": summary.renewals.total,
                    "imported": summary.renewals.imported,
                    "skipped": summary.renewals.skipped,
                },
                "seatConflicts": summary.seat_conflicts,
                "warnings": summary.warnings,
                "success": true,
                "allOrNothing": true,
                "requestId": request_id,
                "timestamp": Utc::now().to_rfc3339(),
            }),
        ),
        Err(e) => err(
            &req.id,
            "import_failed",
            format!("{e:#}; the transaction was rolled back and no data was imported"),
            Some(json!({
                "allOrNothing": true,
                "requestId": request_id,
                "timestamp": Utc::now().to_rfc3339(),
            })),
        ),
    }
}

fn handle_export_excel(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let out_path = match read_path_param(req, "outPath") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match export::export_workbook(conn, &out_path) {
        Ok(counts) => ok(
            &req.id,
            json!({
                "path": out_path.to_string_lossy(),
                "members": counts.members,
                "renewals": counts.renewals,
            }),
        ),
        Err(e) => err(
            &req.id,
            "export_failed",
            e.to_string(),
            Some(json!({ "path": out_path.to_string_lossy() })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exchange.importExcel" => Some(handle_import_excel(state, req)),
        "exchange.exportExcel" => Some(handle_export_excel(state, req)),
        _ => None,
    }
}
