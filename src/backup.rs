use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db;
use crate::normalize;
use crate::workbook::Cell;

/// Tables with a typed restore path, in backup order.
pub const KNOWN_TABLES: &[&str] = &[
    "seats",
    "students",
    "payments",
    "expenses",
    "student_fees_config",
    "users",
];

/// Restore never touches this account so the operator cannot be locked out.
pub const RESERVED_ADMIN_USERNAME: &str = "admin";

#[derive(Debug)]
pub struct SnapshotSummary {
    pub document: Value,
    pub tables: usize,
    pub rows: usize,
    pub warnings: Vec<String>,
}

/// Enumerate base tables: the known set first, then anything else found in
/// the catalog (schema drift is tolerated, not fatal).
pub fn discover_tables(conn: &Connection) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;
    let found = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out: Vec<String> = KNOWN_TABLES
        .iter()
        .filter(|t| found.iter().any(|f| f == *t))
        .map(|t| t.to_string())
        .collect();
    for name in found {
        if !KNOWN_TABLES.contains(&name.as_str()) {
            out.push(name);
        }
    }
    Ok(out)
}

/// Full-database snapshot as one self-describing JSON object keyed by table
/// name. Best-effort per table: an unreadable table degrades to an empty
/// array instead of failing the whole backup.
pub fn snapshot(conn: &Connection) -> anyhow::Result<SnapshotSummary> {
    let mut doc = serde_json::Map::new();
    let mut rows_total = 0usize;
    let mut warnings = Vec::new();

    let tables = discover_tables(conn)?;
    let table_count = tables.len();
    for table in tables {
        match table_rows(conn, &table) {
            Ok(rows) => {
                rows_total += rows.len();
                doc.insert(table, Value::Array(rows));
            }
            Err(e) => {
                tracing::warn!(table = %table, error = %e, "backup: table unreadable, recording empty");
                warnings.push(format!("table {}: {}", table, e));
                doc.insert(table, json!([]));
            }
        }
    }

    Ok(SnapshotSummary {
        document: Value::Object(doc),
        tables: table_count,
        rows: rows_total,
        warnings,
    })
}

fn table_rows(conn: &Connection, table: &str) -> anyhow::Result<Vec<Value>> {
    // Table names come from the catalog, not from user input.
    let mut stmt = conn.prepare(&format!("SELECT * FROM \"{}\"", table))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut obj = serde_json::Map::new();
        for (i, col) in columns.iter().enumerate() {
            obj.insert(col.clone(), json_value(row.get_ref(i)?));
        }
        out.push(Value::Object(obj));
    }
    Ok(out)
}

fn json_value(v: ValueRef) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SeatRow {
    seat_number: String,
    occupant_sex: Option<String>,
    modified_by: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StudentRow {
    id: Option<i64>,
    name: Option<String>,
    father_name: Option<String>,
    contact_number: Option<Value>,
    sex: Option<String>,
    seat_number: Option<String>,
    membership_date: Option<String>,
    membership_till: Option<String>,
    membership_status: Option<String>,
    aadhaar_number: Option<String>,
    address: Option<String>,
    modified_by: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PaymentRow {
    id: Option<i64>,
    student_id: Option<i64>,
    amount: Option<f64>,
    payment_date: Option<String>,
    payment_mode: Option<String>,
    payment_type: Option<String>,
    remarks: Option<String>,
    modified_by: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExpenseRow {
    id: Option<i64>,
    category: Option<String>,
    description: Option<String>,
    amount: Option<f64>,
    expense_date: Option<String>,
    modified_by: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FeesConfigRow {
    id: Option<i64>,
    fee_key: Option<String>,
    monthly_fees: Option<f64>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserRow {
    id: Option<i64>,
    username: Option<String>,
    password_hash: Option<String>,
    role: Option<String>,
    permissions: Option<String>,
    status: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

#[derive(Debug, Default)]
pub struct RestoreSummary {
    pub seats: usize,
    pub students: usize,
    pub payments: usize,
    pub expenses: usize,
    pub fees_config: usize,
    pub users: usize,
    pub admin_skipped: usize,
    pub skipped_tables: Vec<String>,
}

impl RestoreSummary {
    pub fn rows(&self) -> usize {
        self.seats + self.students + self.payments + self.expenses + self.fees_config + self.users
    }
}

/// Symmetric inverse of [`snapshot`]: wipe the domain tables in dependency
/// order inside one transaction and re-insert every backed-up row with
/// conflict-ignore, so replaying the same document is idempotent. Student
/// contacts are re-normalized (old backups carry malformed values). Any
/// failure rolls the whole restore back.
pub fn restore(conn: &Connection, doc: &Value) -> anyhow::Result<RestoreSummary> {
    let obj = doc
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("backup document must be a JSON object keyed by table name"))?;

    // The payments schema may predate the remarks column; work on both shapes.
    let has_remarks = db::table_has_column(conn, "payments", "remarks")?;

    let tx = conn.unchecked_transaction()?;
    let mut summary = RestoreSummary::default();

    for table in ["payments", "expenses", "students", "seats", "student_fees_config"] {
        tx.execute(&format!("DELETE FROM {}", table), [])?;
    }

    for row in rows_of(obj, "seats") {
        let r: SeatRow = serde_json::from_value(row.clone())?;
        summary.seats += tx.execute(
            "INSERT INTO seats(seat_number, occupant_sex, modified_by, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(seat_number) DO NOTHING",
            (
                &r.seat_number,
                &r.occupant_sex,
                &r.modified_by,
                &r.created_at,
                &r.updated_at,
            ),
        )?;
    }

    for row in rows_of(obj, "students") {
        let r: StudentRow = serde_json::from_value(row.clone())?;
        let contact = restored_contact(r.contact_number.as_ref());
        summary.students += tx.execute(
            "INSERT INTO students(id, name, father_name, contact_number, sex, seat_number,
                                  membership_date, membership_till, membership_status,
                                  aadhaar_number, address, modified_by, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, COALESCE(?9, 'active'), ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(id) DO NOTHING",
            (
                r.id,
                &r.name,
                &r.father_name,
                &contact,
                &r.sex,
                &r.seat_number,
                &r.membership_date,
                &r.membership_till,
                &r.membership_status,
                &r.aadhaar_number,
                &r.address,
                &r.modified_by,
                &r.created_at,
                &r.updated_at,
            ),
        )?;
    }

    for row in rows_of(obj, "payments") {
        let r: PaymentRow = serde_json::from_value(row.clone())?;
        let amount = r.amount.unwrap_or(0.0).max(0.0);
        if has_remarks {
            summary.payments += tx.execute(
                "INSERT INTO payments(id, student_id, amount, payment_date, payment_mode,
                                      payment_type, remarks, modified_by, created_at, updated_at)
                 VALUES(?1, ?2, ?3, ?4, COALESCE(?5, 'cash'), ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO NOTHING",
                (
                    r.id,
                    r.student_id,
                    amount,
                    &r.payment_date,
                    &r.payment_mode,
                    &r.payment_type,
                    &r.remarks,
                    &r.modified_by,
                    &r.created_at,
                    &r.updated_at,
                ),
            )?;
        } else {
            summary.payments += tx.execute(
                "INSERT INTO payments(id, student_id, amount, payment_date, payment_mode,
                                      payment_type, modified_by, created_at, updated_at)
                 VALUES(?1, ?2, ?3, ?4, COALESCE(?5, 'cash'), ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO NOTHING",
                (
                    r.id,
                    r.student_id,
                    amount,
                    &r.payment_date,
                    &r.payment_mode,
                    &r.payment_type,
                    &r.modified_by,
                    &r.created_at,
                    &r.updated_at,
                ),
            )?;
        }
    }

    for row in rows_of(obj, "expenses") {
        let r: ExpenseRow = serde_json::from_value(row.clone())?;
        summary.expenses += tx.execute(
            "INSERT INTO expenses(id, category, description, amount, expense_date,
                                  modified_by, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO NOTHING",
            (
                r.id,
                &r.category,
                &r.description,
                r.amount,
                &r.expense_date,
                &r.modified_by,
                &r.created_at,
                &r.updated_at,
            ),
        )?;
    }

    for row in rows_of(obj, "student_fees_config") {
        let r: FeesConfigRow = serde_json::from_value(row.clone())?;
        summary.fees_config += tx.execute(
            "INSERT INTO student_fees_config(id, fee_key, monthly_fees, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO NOTHING",
            (r.id, &r.fee_key, r.monthly_fees, &r.created_at, &r.updated_at),
        )?;
    }

    for row in rows_of(obj, "users") {
        let r: UserRow = serde_json::from_value(row.clone())?;
        if r.username.as_deref() == Some(RESERVED_ADMIN_USERNAME) {
            summary.admin_skipped += 1;
            continue;
        }
        summary.users += tx.execute(
            "INSERT INTO users(id, username, password_hash, role, permissions, status,
                               created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, COALESCE(?6, 'active'), ?7, ?8)
             ON CONFLICT(id) DO NOTHING",
            (
                r.id,
                &r.username,
                &r.password_hash,
                &r.role,
                &r.permissions,
                &r.status,
                &r.created_at,
                &r.updated_at,
            ),
        )?;
    }

    for key in obj.keys() {
        if !KNOWN_TABLES.contains(&key.as_str()) {
            summary.skipped_tables.push(key.clone());
        }
    }

    tx.commit()?;
    Ok(summary)
}

fn rows_of<'a>(obj: &'a serde_json::Map<String, Value>, table: &str) -> &'a [Value] {
    obj.get(table)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn restored_contact(v: Option<&Value>) -> String {
    let cell = match v {
        Some(Value::String(s)) => Some(Cell::Text(s.clone())),
        Some(Value::Number(n)) => n.as_f64().map(Cell::Number),
        _ => None,
    };
    normalize::contact_or_default(cell.as_ref())
}
