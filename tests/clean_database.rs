use std::cell::RefCell;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::Connection;
use serde_json::json;
use studyroomd::ipc::{handle_request, AppState, Request};
use studyroomd::reset::{self, CommandOutput, CommandRunner};
use studyroomd::{db, reset::clean_database};

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

fn seeded_db() -> Connection {
    let conn = Connection::open_in_memory().expect("open db");
    db::init_schema(&conn).expect("schema");
    conn.execute_batch(
        "INSERT INTO users(username, password_hash, role, status)
           VALUES('admin', 'hash', 'admin', 'active');
         INSERT INTO seats(seat_number, occupant_sex) VALUES('A1', 'female');
         INSERT INTO students(id, name, contact_number, sex, seat_number, membership_date,
                              membership_status, aadhaar_number)
           VALUES(1, 'Asha Verma', '9876543210', 'female', 'A1',
                  '2023-03-14 18:30:00', 'active', '123456789012');
         INSERT INTO payments(student_id, amount, payment_date, payment_mode)
           VALUES(1, 1500, '2024-01-14 18:30:00', 'cash');
         INSERT INTO expenses(category, amount, expense_date)
           VALUES('maintenance', 700, '2024-02-01 00:00:00');
         INSERT INTO student_fees_config(fee_key, monthly_fees) VALUES('female', 600);",
    )
    .expect("seed rows");
    conn
}

struct FakeRunner {
    output: CommandOutput,
    calls: RefCell<Vec<(String, Vec<String>)>>,
}

impl FakeRunner {
    fn new(status: i32, stdout: &str, stderr: &str) -> Self {
        FakeRunner {
            output: CommandOutput {
                status,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, program: &str, args: &[String]) -> anyhow::Result<CommandOutput> {
        self.calls
            .borrow_mut()
            .push((program.to_string(), args.to_vec()));
        Ok(self.output.clone())
    }
}

#[test]
fn clean_empties_everything_except_users_and_keeps_triggers() {
    let conn = seeded_db();
    let summary = clean_database(&conn).expect("clean");

    for table in ["students", "seats", "payments", "expenses", "student_fees_config"] {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .expect("count");
        assert_eq!(count, 0, "table {table} should be empty");
        assert!(summary.tables_cleared.contains(&table.to_string()));
    }
    assert!(!summary.tables_cleared.contains(&"users".to_string()));

    let users: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
        .expect("count");
    assert_eq!(users, 1, "the protected table survives");

    // The touch triggers were dropped for the wipe and re-created.
    assert!(summary.triggers_restored >= 2);
    let trigger: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'trigger' AND name = 'touch_students_updated'",
            [],
            |r| r.get(0),
        )
        .expect("trigger");
    assert_eq!(trigger, 1);
}

#[test]
fn fresh_student_numbering_restarts_at_the_watermark() {
    let conn = seeded_db();
    clean_database(&conn).expect("clean");

    conn.execute(
        "INSERT INTO students(name, contact_number, membership_date, aadhaar_number)
         VALUES('First After Reset', '1234567890', datetime('now'), '999900001111')",
        [],
    )
    .expect("insert");
    let id: i64 = conn
        .query_row("SELECT id FROM students WHERE name = 'First After Reset'", [], |r| {
            r.get(0)
        })
        .expect("id");
    assert_eq!(id, reset::STUDENT_ID_RESTART);
}

#[test]
fn handler_reports_seed_output_after_a_successful_wipe() {
    let workspace = temp_dir("studyroom-clean");
    let mut state = AppState {
        workspace: Some(workspace.clone()),
        db: Some(seeded_db()),
        runner: Box::new(FakeRunner::new(0, "seeded 4 defaults\n", "")),
    };

    let resp = handle_request(
        &mut state,
        Request {
            id: "1".into(),
            method: "admin.cleanDatabase".into(),
            params: json!({ "seedCommand": "echo seeded" }),
        },
    );
    assert_eq!(resp["ok"], json!(true));
    assert_eq!(resp["result"]["setupOutput"], json!("seeded 4 defaults\n"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn seed_failure_is_reported_distinctly_because_the_wipe_already_committed() {
    let workspace = temp_dir("studyroom-clean-fail");
    let mut state = AppState {
        workspace: Some(workspace.clone()),
        db: Some(seeded_db()),
        runner: Box::new(FakeRunner::new(1, "", "missing defaults file\n")),
    };

    let resp = handle_request(
        &mut state,
        Request {
            id: "2".into(),
            method: "admin.cleanDatabase".into(),
            params: json!({}),
        },
    );
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("seed_failed"));
    assert_eq!(
        resp["error"]["details"]["setupError"],
        json!("missing defaults file\n")
    );

    // The database really is clean even though the request reported failure.
    let students: i64 = state
        .db
        .as_ref()
        .expect("db")
        .query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))
        .expect("count");
    assert_eq!(students, 0);

    let _ = std::fs::remove_dir_all(workspace);
}
