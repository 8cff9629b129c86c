use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::reset;
use serde_json::json;

fn handle_clean_database(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let seed_command = req
        .params
        .get("seedCommand")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| {
            state
                .workspace
                .as_ref()
                .map(|w| format!("sh {}", w.join(reset::DEFAULT_SEED_SCRIPT).to_string_lossy()))
        });
    let Some(seed_command) = seed_command else {
        return err(&req.id, "bad_params", "missing seedCommand", None);
    };

    let summary = match reset::clean_database(conn) {
        Ok(s) => s,
        Err(e) => {
            // Nothing committed; the database is untouched.
            return err(&req.id, "db_clean_failed", e.to_string(), None);
        }
    };

    // The wipe is committed; the re-seed runs outside that transaction and
    // its failure is reported distinctly.
    let output = match state.runner.run("sh", &["-c".to_string(), seed_command]) {
        Ok(o) => o,
        Err(e) => {
            return err(
                &req.id,
                "seed_failed",
                "database cleaned but the re-seed process could not be started",
                Some(json!({
                    "setupError": e.to_string(),
                    "tablesCleared": summary.tables_cleared,
                })),
            )
        }
    };

    if !output.success() {
        return err(
            &req.id,
            "seed_failed",
            "database cleaned but the re-seed process failed",
            Some(json!({
                "exitStatus": output.status,
                "setupOutput": output.stdout,
                "setupError": output.stderr,
                "tablesCleared": summary.tables_cleared,
            })),
        );
    }

    ok(
        &req.id,
        json!({
            "message": "database cleaned and re-seeded",
            "setupOutput": output.stdout,
            "tablesCleared": summary.tables_cleared,
            "triggersRestored": summary.triggers_restored,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "admin.cleanDatabase" => Some(handle_clean_database(state, req)),
        _ => None,
    }
}
