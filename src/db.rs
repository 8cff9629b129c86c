use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "studyroom.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Create the schema on a raw connection. Separated from `open_db` so tests
/// can run against an in-memory database.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS seats(
            seat_number TEXT PRIMARY KEY,
            occupant_sex TEXT,
            modified_by TEXT,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            father_name TEXT,
            contact_number TEXT NOT NULL DEFAULT '1234567890',
            sex TEXT,
            seat_number TEXT,
            membership_date TEXT NOT NULL,
            membership_till TEXT,
            membership_status TEXT NOT NULL DEFAULT 'active',
            aadhaar_number TEXT NOT NULL UNIQUE,
            address TEXT,
            modified_by TEXT,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(seat_number) REFERENCES seats(seat_number)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_seat ON students(seat_number)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            amount REAL NOT NULL,
            payment_date TEXT NOT NULL,
            payment_mode TEXT NOT NULL DEFAULT 'cash',
            payment_type TEXT,
            modified_by TEXT,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_student ON payments(student_id)",
        [],
    )?;

    // Older workspaces predate the remarks column. Add it when missing;
    // restore still probes because a backup may land on either shape.
    ensure_payments_remarks(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS expenses(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category TEXT NOT NULL,
            description TEXT,
            amount REAL NOT NULL,
            expense_date TEXT NOT NULL,
            modified_by TEXT,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_fees_config(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fee_key TEXT NOT NULL UNIQUE,
            monthly_fees REAL NOT NULL,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL,
            permissions TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS touch_students_updated
         AFTER UPDATE OF seat_number, membership_status, membership_till ON students
         BEGIN
           UPDATE students SET updated_at = datetime('now') WHERE id = NEW.id;
         END",
        [],
    )?;
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS touch_seats_updated
         AFTER UPDATE OF occupant_sex ON seats
         BEGIN
           UPDATE seats SET updated_at = datetime('now') WHERE seat_number = NEW.seat_number;
         END",
        [],
    )?;

    Ok(())
}

pub fn ensure_payments_remarks(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "payments", "remarks")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE payments ADD COLUMN remarks TEXT", [])?;
    Ok(())
}

pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
