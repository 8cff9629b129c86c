use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;
use studyroomd::ipc::{handle_request, AppState, Request};
use studyroomd::workbook::{write_workbook, Cell, SheetData};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn request(id: &str, method: &str, params: serde_json::Value) -> Request {
    Request {
        id: id.to_string(),
        method: method.to_string(),
        params,
    }
}

#[test]
fn router_covers_the_reconciliation_surface() {
    let workspace = temp_dir("studyroom-ipc");
    let mut state = AppState::new();

    let resp = handle_request(&mut state, request("1", "health", json!({})));
    assert_eq!(resp["ok"], json!(true));
    assert!(resp["result"]["version"].is_string());

    // Mutating methods refuse to run without a workspace.
    let resp = handle_request(&mut state, request("2", "exchange.importExcel", json!({})));
    assert_eq!(resp["error"]["code"], json!("no_workspace"));

    let resp = handle_request(
        &mut state,
        request("3", "workspace.select", json!({ "path": workspace.to_string_lossy() })),
    );
    assert_eq!(resp["ok"], json!(true), "workspace.select failed: {resp}");
    assert!(workspace.join("studyroom.sqlite3").is_file());

    let resp = handle_request(&mut state, request("4", "exchange.importExcel", json!({})));
    assert_eq!(resp["error"]["code"], json!("bad_params"));

    let missing = workspace.join("nope.xlsx");
    let resp = handle_request(
        &mut state,
        request(
            "5",
            "exchange.importExcel",
            json!({ "inPath": missing.to_string_lossy() }),
        ),
    );
    assert_eq!(resp["error"]["code"], json!("not_found"));

    let resp = handle_request(&mut state, request("6", "no.such.method", json!({})));
    assert_eq!(resp["error"]["code"], json!("not_implemented"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn backup_export_writes_a_restorable_document() {
    let workspace = temp_dir("studyroom-ipc-backup");
    let mut state = AppState::new();
    let resp = handle_request(
        &mut state,
        request("1", "workspace.select", json!({ "path": workspace.to_string_lossy() })),
    );
    assert_eq!(resp["ok"], json!(true));

    state
        .db
        .as_ref()
        .expect("db")
        .execute(
            "INSERT INTO students(id, name, contact_number, membership_date,
                                  membership_status, aadhaar_number)
             VALUES(1, 'Asha Verma', '9876543210', '2024-01-01 00:00:00',
                    'active', '123456789012')",
            [],
        )
        .expect("seed student");

    let out = workspace.join("study-room-backup.json");
    let resp = handle_request(
        &mut state,
        request(
            "2",
            "backup.exportDatabase",
            json!({ "outPath": out.to_string_lossy() }),
        ),
    );
    assert_eq!(resp["ok"], json!(true), "backup failed: {resp}");
    assert_eq!(resp["result"]["rows"], json!(1));

    // Wipe the student, then restore from the exported document.
    state
        .db
        .as_ref()
        .expect("db")
        .execute("DELETE FROM students", [])
        .expect("wipe");

    let resp = handle_request(
        &mut state,
        request(
            "3",
            "backup.restoreDatabase",
            json!({ "inPath": out.to_string_lossy() }),
        ),
    );
    assert_eq!(resp["ok"], json!(true), "restore failed: {resp}");
    assert_eq!(resp["result"]["restored"]["students"], json!(1));

    let count: i64 = state
        .db
        .as_ref()
        .expect("db")
        .query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))
        .expect("count");
    assert_eq!(count, 1);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn import_reports_missing_sheets_with_the_names_actually_present() {
    let workspace = temp_dir("studyroom-ipc-sheets");
    let mut state = AppState::new();
    let resp = handle_request(
        &mut state,
        request("1", "workspace.select", json!({ "path": workspace.to_string_lossy() })),
    );
    assert_eq!(resp["ok"], json!(true));

    let path = workspace.join("wrong.xlsx");
    write_workbook(
        &path,
        &[
            SheetData {
                name: "Foo",
                headers: &["ID"],
                rows: vec![vec![Cell::Number(1.0)]],
            },
            SheetData {
                name: "Bar",
                headers: &["ID"],
                rows: vec![vec![Cell::Number(2.0)]],
            },
        ],
    )
    .expect("write workbook");

    let resp = handle_request(
        &mut state,
        request(
            "2",
            "exchange.importExcel",
            json!({ "inPath": path.to_string_lossy() }),
        ),
    );
    assert_eq!(resp["error"]["code"], json!("missing_sheet"));
    let msg = resp["error"]["message"].as_str().expect("message");
    assert!(msg.contains("Foo") && msg.contains("Bar"), "message was: {msg}");
    assert_eq!(
        resp["error"]["details"]["sheetsPresent"],
        json!(["Foo", "Bar"])
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn import_summarizes_counts_and_marks_the_operation_all_or_nothing() {
    let workspace = temp_dir("studyroom-ipc-import");
    let mut state = AppState::new();
    let resp = handle_request(
        &mut state,
        request("1", "workspace.select", json!({ "path": workspace.to_string_lossy() })),
    );
    assert_eq!(resp["ok"], json!(true));

    let path = workspace.join("good.xlsx");
    write_workbook(
        &path,
        &[
            SheetData {
                name: "Library Members",
                headers: &["ID", "Name", "Sex"],
                rows: vec![
                    vec![
                        Cell::Number(1.0),
                        Cell::Text("Asha Verma".into()),
                        Cell::Text("F".into()),
                    ],
                    vec![Cell::Empty, Cell::Text("No Id".into())],
                ],
            },
            SheetData {
                name: "Renewals",
                headers: &["ID", "Amount Paid"],
                rows: vec![vec![Cell::Number(1.0), Cell::Number(750.0)]],
            },
        ],
    )
    .expect("write workbook");

    let resp = handle_request(
        &mut state,
        request(
            "2",
            "exchange.importExcel",
            json!({ "inPath": path.to_string_lossy() }),
        ),
    );
    assert_eq!(resp["ok"], json!(true), "import failed: {resp}");
    let result = &resp["result"];
    assert_eq!(result["success"], json!(true));
    assert_eq!(result["allOrNothing"], json!(true));
    assert_eq!(result["imported"], json!(2));
    assert_eq!(result["skipped"], json!(1));
    assert_eq!(result["members"]["total"], json!(2));
    assert_eq!(result["members"]["imported"], json!(1));
    assert_eq!(result["members"]["skipped"], json!(1));
    assert_eq!(result["renewals"]["imported"], json!(1));
    assert!(result["requestId"].as_str().expect("requestId").len() >= 32);
    assert!(result["timestamp"].is_string());

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn restore_rejects_files_that_are_not_json() {
    let workspace = temp_dir("studyroom-ipc-badjson");
    let mut state = AppState::new();
    let resp = handle_request(
        &mut state,
        request("1", "workspace.select", json!({ "path": workspace.to_string_lossy() })),
    );
    assert_eq!(resp["ok"], json!(true));

    let bad = workspace.join("not-json.txt");
    std::fs::write(&bad, "definitely not json").expect("write file");

    let resp = handle_request(
        &mut state,
        request(
            "2",
            "backup.restoreDatabase",
            json!({ "inPath": bad.to_string_lossy() }),
        ),
    );
    assert_eq!(resp["error"]["code"], json!("bad_backup"));

    let _ = std::fs::remove_dir_all(workspace);
}
