use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::Connection;
use studyroomd::workbook::{read_workbook, Cell};
use studyroomd::{db, export, mapping};

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
        "INSERT INTO seats(seat_number, occupant_sex) VALUES('A1', 'female');
         INSERT INTO students(id, name, father_name, contact_number, sex, seat_number,
                              membership_date, membership_status, aadhaar_number, address)
           VALUES(1, 'Asha Verma', 'Mohan Verma', '9876543210', 'female', 'A1',
                  '2023-03-14 18:30:00', 'active', '123456789012', '12 Park Lane');
         INSERT INTO students(id, name, contact_number, membership_date,
                              membership_status, aadhaar_number)
           VALUES(2, 'Ravi Kumar', '1234567890',
                  '2024-01-14 18:30:00', 'expired', '222233334444');
         INSERT INTO payments(student_id, amount, payment_date, payment_mode, payment_type)
           VALUES(1, 1000, '2024-01-01 00:00:00', 'cash', 'renewal');
         INSERT INTO payments(student_id, amount, payment_date, payment_mode, payment_type)
           VALUES(1, 1500, '2024-02-01 00:00:00', 'online', 'renewal');",
    )
    .expect("seed rows");
    conn
}

#[test]
fn export_rebuilds_both_historical_sheets_with_canonical_headers() {
    let dir = temp_dir("studyroom-export");
    let path = dir.join("export.xlsx");

    let conn = seeded_db();
    let counts = export::export_workbook(&conn, &path).expect("export");
    assert_eq!(counts.members, 2);
    assert_eq!(counts.renewals, 2);

    let book = read_workbook(&path).expect("read back");
    assert_eq!(book.sheet_names(), vec!["Library Members", "Renewals"]);

    let members = &book.sheets[0];
    assert_eq!(
        members.headers,
        mapping::MEMBER_EXPORT_HEADERS
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>()
    );
    assert_eq!(members.rows.len(), 2);

    // Student 1 carries the aggregated payment summary.
    let row = &members.rows[0];
    assert_eq!(row.get("Name"), Some(&Cell::Text("Asha Verma".into())));
    assert_eq!(row.get("Total Paid"), Some(&Cell::Number(2500.0)));
    assert_eq!(
        row.get("Last Payment Date"),
        Some(&Cell::Text("2024-02-01 00:00:00".into()))
    );
    assert_eq!(row.get("Seat Number"), Some(&Cell::Text("A1".into())));
    assert_eq!(
        row.get("Aadhaar Number"),
        Some(&Cell::Text("123456789012".into()))
    );

    // Student 2 has no payments: zero total, no last payment date cell.
    let row = &members.rows[1];
    assert_eq!(row.get("Total Paid"), Some(&Cell::Number(0.0)));
    assert_eq!(row.get("Last Payment Date"), None);
    assert_eq!(row.get("Seat Number"), None);

    let renewals = &book.sheets[1];
    assert_eq!(
        renewals.headers,
        mapping::RENEWAL_EXPORT_HEADERS
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>()
    );
    let row = &renewals.rows[0];
    assert_eq!(row.get("ID"), Some(&Cell::Number(1.0)));
    assert_eq!(row.get("Amount Paid"), Some(&Cell::Number(1000.0)));
    assert_eq!(row.get("Payment Mode"), Some(&Cell::Text("cash".into())));

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn an_exported_workbook_can_be_imported_back() {
    let dir = temp_dir("studyroom-export-roundtrip");
    let path = dir.join("export.xlsx");

    let conn = seeded_db();
    export::export_workbook(&conn, &path).expect("export");

    let book = read_workbook(&path).expect("read back");
    let target = Connection::open_in_memory().expect("open db");
    db::init_schema(&target).expect("schema");
    let summary = studyroomd::import::import_workbook(&target, &book).expect("import");

    assert_eq!(summary.members.imported, 2);
    assert_eq!(summary.renewals.imported, 2);

    let students: i64 = target
        .query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))
        .expect("count");
    assert_eq!(students, 2);

    let _ = std::fs::remove_dir_all(dir);
}
