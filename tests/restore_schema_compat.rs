use rusqlite::Connection;
use serde_json::json;
use studyroomd::{backup, db};

fn backup_with_remarks() -> serde_json::Value {
    json!({
        "students": [{
            "id": 1, "name": "Asha Verma", "contact_number": "9876543210",
            "membership_date": "2024-01-01 00:00:00", "membership_status": "active",
            "aadhaar_number": "123456789012"
        }],
        "payments": [{
            "id": 7, "student_id": 1, "amount": 800.0,
            "payment_date": "2024-01-02 00:00:00", "payment_mode": "online",
            "payment_type": "renewal", "remarks": "seat A1"
        }],
    })
}

#[test]
fn restore_works_against_the_upgraded_payments_shape() {
    let conn = Connection::open_in_memory().expect("open db");
    db::init_schema(&conn).expect("schema");
    assert!(db::table_has_column(&conn, "payments", "remarks").expect("probe"));

    backup::restore(&conn, &backup_with_remarks()).expect("restore");
    let remarks: Option<String> = conn
        .query_row("SELECT remarks FROM payments WHERE id = 7", [], |r| r.get(0))
        .expect("payment");
    assert_eq!(remarks.as_deref(), Some("seat A1"));
}

#[test]
fn restore_works_against_the_old_payments_shape_without_remarks() {
    let conn = Connection::open_in_memory().expect("open db");
    db::init_schema(&conn).expect("schema");
    conn.execute("ALTER TABLE payments DROP COLUMN remarks", [])
        .expect("recreate the pre-upgrade shape");
    assert!(!db::table_has_column(&conn, "payments", "remarks").expect("probe"));

    backup::restore(&conn, &backup_with_remarks()).expect("restore against old shape");

    let (amount, mode): (f64, String) = conn
        .query_row(
            "SELECT amount, payment_mode FROM payments WHERE id = 7",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .expect("payment");
    assert_eq!(amount, 800.0);
    assert_eq!(mode, "online");
}

#[test]
fn column_probe_reflects_the_actual_table_shape() {
    let conn = Connection::open_in_memory().expect("open db");
    db::init_schema(&conn).expect("schema");
    assert!(db::table_has_column(&conn, "students", "aadhaar_number").expect("probe"));
    assert!(!db::table_has_column(&conn, "students", "no_such_column").expect("probe"));
    assert!(!db::table_has_column(&conn, "no_such_table", "x").expect("probe"));
}

#[test]
fn reopening_an_old_workspace_adds_the_remarks_column() {
    let conn = Connection::open_in_memory().expect("open db");
    db::init_schema(&conn).expect("schema");
    conn.execute("ALTER TABLE payments DROP COLUMN remarks", [])
        .expect("simulate old workspace");

    db::ensure_payments_remarks(&conn).expect("upgrade");
    assert!(db::table_has_column(&conn, "payments", "remarks").expect("probe"));
    // Running it again is a no-op.
    db::ensure_payments_remarks(&conn).expect("idempotent upgrade");
}
