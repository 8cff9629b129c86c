use std::collections::HashMap;

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use crate::db;
use crate::identity;
use crate::mapping::{self, ImportSheets};
use crate::normalize;
use crate::workbook::{Cell, Sheet, Workbook};

pub const MODIFIED_BY: &str = "excel-import";

const ALLOWED_STATUSES: &[&str] = &["active", "expired", "suspended"];
const PROGRESS_EVERY: usize = 50;

/// Members sheet row after schema mapping and normalization.
#[derive(Debug, Default)]
pub struct MemberRow {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub father_name: Option<String>,
    pub contact_number: String,
    pub sex: Option<&'static str>,
    pub seat_number: Option<String>,
    pub membership_date: Option<NaiveDateTime>,
    pub membership_till: Option<NaiveDateTime>,
    pub membership_status: Option<String>,
    pub aadhaar_number: Option<String>,
    pub address: Option<String>,
}

/// Renewals sheet row after schema mapping and normalization.
#[derive(Debug, Default)]
pub struct RenewalRow {
    pub id: Option<i64>,
    pub seat_number: Option<String>,
    pub amount: Option<f64>,
    pub payment_date: Option<NaiveDateTime>,
    pub payment_mode: Option<String>,
}

pub fn member_row(raw: &HashMap<String, Cell>) -> MemberRow {
    MemberRow {
        id: mapping::pick(raw, mapping::COL_MEMBER_ID).and_then(Cell::as_i64),
        name: mapping::pick(raw, mapping::COL_NAME).and_then(Cell::as_clean_text),
        father_name: mapping::pick(raw, mapping::COL_FATHER_NAME).and_then(Cell::as_clean_text),
        contact_number: normalize::contact_or_default(mapping::pick(raw, mapping::COL_CONTACT)),
        sex: normalize::parse_gender(mapping::pick(raw, mapping::COL_SEX)),
        seat_number: mapping::pick(raw, mapping::COL_SEAT).and_then(Cell::as_clean_text),
        membership_date: normalize::parse_excel_date(mapping::pick(raw, mapping::COL_MEMBERSHIP_DATE)),
        membership_till: normalize::parse_excel_date(mapping::pick(raw, mapping::COL_MEMBERSHIP_TILL)),
        membership_status: mapping::pick(raw, mapping::COL_MEMBERSHIP_STATUS)
            .and_then(Cell::as_clean_text)
            .map(|s| s.to_ascii_lowercase()),
        aadhaar_number: mapping::pick(raw, mapping::COL_AADHAAR).and_then(Cell::as_clean_text),
        address: mapping::pick(raw, mapping::COL_ADDRESS).and_then(Cell::as_clean_text),
    }
}

pub fn renewal_row(raw: &HashMap<String, Cell>) -> RenewalRow {
    RenewalRow {
        id: mapping::pick(raw, mapping::COL_RENEWAL_ID).and_then(Cell::as_i64),
        seat_number: mapping::pick(raw, mapping::COL_RENEWAL_SEAT).and_then(Cell::as_clean_text),
        amount: mapping::pick(raw, mapping::COL_AMOUNT_PAID).and_then(Cell::as_f64),
        payment_date: normalize::parse_excel_date(mapping::pick(raw, mapping::COL_PAYMENT_DATE)),
        payment_mode: mapping::pick(raw, mapping::COL_PAYMENT_MODE).and_then(Cell::as_clean_text),
    }
}

#[derive(Debug, Default, Clone)]
pub struct SheetCounts {
    pub total: usize,
    pub imported: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub members: SheetCounts,
    pub renewals: SheetCounts,
    /// Seat assignments that no-opped because the seat is restricted to the
    /// other gender. The student row itself is still written.
    pub seat_conflicts: usize,
    pub identity_exhausted: usize,
    pub warnings: Vec<serde_json::Value>,
}

impl ImportSummary {
    pub fn imported(&self) -> usize {
        self.members.imported + self.renewals.imported
    }

    pub fn skipped(&self) -> usize {
        self.members.skipped + self.renewals.skipped
    }

    fn skip(&mut self, sheet: &str, row_no: usize, code: &str, message: &str) {
        match sheet {
            "members" => self.members.skipped += 1,
            _ => self.renewals.skipped += 1,
        }
        self.warnings.push(json!({
            "sheet": sheet,
            "row": row_no,
            "code": code,
            "message": message,
        }));
    }
}

/// Convenience entry: resolve sheets, then run the transactional import.
pub fn import_workbook(conn: &Connection, book: &Workbook) -> anyhow::Result<ImportSummary> {
    let sheets = mapping::find_import_sheets(book)?;
    run(conn, &sheets)
}

/// Apply a resolved workbook in a single transaction: members first, then
/// renewals, so renewal rows can see students created moments earlier. Row
/// defects are skipped and counted; any error that escapes rolls the whole
/// transaction back and nothing is persisted.
pub fn run(conn: &Connection, sheets: &ImportSheets) -> anyhow::Result<ImportSummary> {
    let tx = conn.unchecked_transaction()?;
    let mut summary = ImportSummary::default();
    import_members(&tx, sheets.members, &mut summary)?;
    import_renewals(&tx, sheets.renewals, &mut summary)?;
    tx.commit()?;
    Ok(summary)
}

fn import_members(tx: &Connection, sheet: &Sheet, summary: &mut ImportSummary) -> anyhow::Result<()> {
    summary.members.total = sheet.rows.len();

    for (i, raw) in sheet.rows.iter().enumerate() {
        let row_no = i + 2; // 1-based, after the header row
        if (i + 1) % PROGRESS_EVERY == 0 {
            tracing::info!(processed = i + 1, total = sheet.rows.len(), "import: members progress");
        }

        let row = member_row(raw);
        let Some(id) = row.id else {
            summary.skip("members", row_no, "missing_id", "row has no usable student id");
            continue;
        };
        let Some(name) = row.name.as_deref() else {
            summary.skip("members", row_no, "missing_name", "row has no usable name");
            continue;
        };

        // Only a valid 12-digit source value may replace a stored identity
        // number; anything else keeps the existing one on update.
        let source_identity = row
            .aadhaar_number
            .as_deref()
            .map(str::trim)
            .filter(|s| normalize::is_identity_number(s));
        let resolved = identity::resolve_unique(
            source_identity,
            id,
            |cand| {
                tx.query_row(
                    "SELECT id FROM students WHERE aadhaar_number = ?",
                    [cand],
                    |r| r.get::<_, i64>(0),
                )
                .optional()
                .map_err(Into::into)
            },
            identity::MAX_ATTEMPTS,
        );
        if resolved.exhausted {
            summary.identity_exhausted += 1;
            tracing::warn!(student_id = id, "identity generation exhausted, proceeding with last candidate");
        }

        let membership_date = row.membership_date.as_ref().map(normalize::format_datetime);
        let membership_till = row.membership_till.as_ref().map(normalize::format_datetime);
        let status_ok = row
            .membership_status
            .as_deref()
            .map(|s| ALLOWED_STATUSES.contains(&s))
            .unwrap_or(false);

        tx.execute(
            "INSERT INTO students(id, name, father_name, contact_number, sex, membership_date,
                                  membership_till, membership_status, aadhaar_number, address,
                                  modified_by, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5, COALESCE(?6, datetime('now')), ?7,
                    COALESCE(?8, 'active'), ?9, ?10, ?11, datetime('now'))
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               father_name = COALESCE(excluded.father_name, father_name),
               contact_number = excluded.contact_number,
               sex = CASE WHEN excluded.sex IN ('male', 'female')
                          THEN excluded.sex ELSE sex END,
               membership_date = COALESCE(?6, membership_date),
               membership_till = COALESCE(?7, membership_till),
               membership_status = CASE WHEN ?13 <> 0
                                        THEN excluded.membership_status
                                        ELSE membership_status END,
               aadhaar_number = CASE WHEN ?12 <> ''
                                     THEN excluded.aadhaar_number
                                     ELSE aadhaar_number END,
               address = CASE WHEN excluded.address IS NOT NULL AND excluded.address <> ''
                              THEN excluded.address ELSE address END,
               modified_by = excluded.modified_by",
            (
                id,
                name,
                &row.father_name,
                &row.contact_number,
                row.sex,
                &membership_date,
                &membership_till,
                &row.membership_status,
                &resolved.value,
                &row.address,
                MODIFIED_BY,
                source_identity.unwrap_or(""),
                status_ok as i64,
            ),
        )?;
        summary.members.imported += 1;

        if let Some(seat) = row.seat_number.as_deref() {
            assign_seat(tx, id, seat, row.sex, row_no, summary)?;
        }
    }

    Ok(())
}

/// Make sure the seat exists (a new seat inherits the student's gender as
/// its restriction), then assign it only when unrestricted or matching.
/// A restriction conflict leaves the student without the seat and the
/// import moving on.
fn assign_seat(
    tx: &Connection,
    student_id: i64,
    seat: &str,
    sex: Option<&'static str>,
    row_no: usize,
    summary: &mut ImportSummary,
) -> anyhow::Result<()> {
    tx.execute(
        "INSERT OR IGNORE INTO seats(seat_number, occupant_sex, modified_by, created_at)
         VALUES(?1, ?2, ?3, datetime('now'))",
        (seat, sex, MODIFIED_BY),
    )?;

    let changed = tx.execute(
        "UPDATE students SET seat_number = ?1
         WHERE id = ?2
           AND EXISTS (SELECT 1 FROM seats
                       WHERE seat_number = ?1
                         AND (occupant_sex IS NULL OR occupant_sex = ?3))",
        (seat, student_id, sex),
    )?;
    if changed == 0 {
        summary.seat_conflicts += 1;
        summary.warnings.push(json!({
            "sheet": "members",
            "row": row_no,
            "code": "seat_conflict",
            "message": format!("seat {} is restricted to the other gender; assignment skipped", seat),
        }));
    }
    Ok(())
}

fn import_renewals(tx: &Connection, sheet: &Sheet, summary: &mut ImportSummary) -> anyhow::Result<()> {
    summary.renewals.total = sheet.rows.len();
    let has_remarks = db::table_has_column(tx, "payments", "remarks")?;

    for (i, raw) in sheet.rows.iter().enumerate() {
        let row_no = i + 2;
        if (i + 1) % PROGRESS_EVERY == 0 {
            tracing::info!(processed = i + 1, total = sheet.rows.len(), "import: renewals progress");
        }

        let row = renewal_row(raw);
        let Some(id) = row.id else {
            summary.skip("renewals", row_no, "missing_id", "row has no usable student id");
            continue;
        };
        let Some(amount) = row.amount.filter(|a| *a != 0.0) else {
            summary.skip("renewals", row_no, "missing_amount", "row has no nonzero amount");
            continue;
        };

        // Renewals never create students.
        let known = tx
            .query_row("SELECT 1 FROM students WHERE id = ?", [id], |r| {
                r.get::<_, i64>(0)
            })
            .optional()?
            .is_some();
        if !known {
            summary.skip("renewals", row_no, "unknown_student", "no student with this id exists");
            continue;
        }

        let amount = amount.max(0.0);
        let mode = match row.payment_mode.as_deref().map(str::to_ascii_lowercase) {
            Some(m) if m == "cash" || m == "online" => m,
            _ => "cash".to_string(),
        };
        let payment_date = row.payment_date.as_ref().map(normalize::format_datetime);
        let remarks = match row.seat_number.as_deref() {
            Some(seat) => format!("Renewal import - seat {}", seat),
            None => "Renewal import".to_string(),
        };

        if has_remarks {
            tx.execute(
                "INSERT INTO payments(student_id, amount, payment_date, payment_mode,
                                      payment_type, remarks, modified_by, created_at)
                 VALUES(?1, ?2, COALESCE(?3, datetime('now')), ?4, 'renewal', ?5, ?6, datetime('now'))",
                (id, amount, &payment_date, &mode, &remarks, MODIFIED_BY),
            )?;
        } else {
            tx.execute(
                "INSERT INTO payments(student_id, amount, payment_date, payment_mode,
                                      payment_type, modified_by, created_at)
                 VALUES(?1, ?2, COALESCE(?3, datetime('now')), ?4, 'renewal', ?5, datetime('now'))",
                (id, amount, &payment_date, &mode, MODIFIED_BY),
            )?;
        }
        summary.renewals.imported += 1;
    }

    Ok(())
}
