use std::path::Path;

use rusqlite::Connection;

use crate::mapping;
use crate::workbook::{self, Cell, SheetData};

#[derive(Debug, Clone, Copy)]
pub struct ExportCounts {
    pub members: usize,
    pub renewals: usize,
}

/// Rebuild the two historical worksheets from the live schema and write
/// them as one workbook. Read-only; no transaction needed.
pub fn export_workbook(conn: &Connection, out_path: &Path) -> anyhow::Result<ExportCounts> {
    let members = members_rows(conn)?;
    let renewals = renewals_rows(conn)?;
    let counts = ExportCounts {
        members: members.len(),
        renewals: renewals.len(),
    };

    workbook::write_workbook(
        out_path,
        &[
            SheetData {
                name: mapping::MEMBER_EXPORT_SHEET,
                headers: mapping::MEMBER_EXPORT_HEADERS,
                rows: members,
            },
            SheetData {
                name: mapping::RENEWAL_EXPORT_SHEET,
                headers: mapping::RENEWAL_EXPORT_HEADERS,
                rows: renewals,
            },
        ],
    )?;

    Ok(counts)
}

fn members_rows(conn: &Connection) -> anyhow::Result<Vec<Vec<Cell>>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, s.father_name, s.contact_number, s.sex, s.seat_number,
                s.membership_date, COALESCE(p.total_paid, 0), s.membership_till,
                s.membership_status, p.last_payment_date, s.aadhaar_number, s.address
         FROM students s
         LEFT JOIN (SELECT student_id, SUM(amount) AS total_paid,
                           MAX(payment_date) AS last_payment_date
                    FROM payments GROUP BY student_id) p ON p.student_id = s.id
         ORDER BY s.id",
    )?;

    let rows = stmt
        .query_map([], |r| {
            Ok(vec![
                Cell::Number(r.get::<_, i64>(0)? as f64),
                Cell::Text(r.get::<_, String>(1)?),
                text_or_empty(r.get::<_, Option<String>>(2)?),
                Cell::Text(r.get::<_, String>(3)?),
                text_or_empty(r.get::<_, Option<String>>(4)?),
                text_or_empty(r.get::<_, Option<String>>(5)?),
                Cell::Text(r.get::<_, String>(6)?),
                Cell::Number(r.get::<_, f64>(7)?),
                text_or_empty(r.get::<_, Option<String>>(8)?),
                Cell::Text(r.get::<_, String>(9)?),
                text_or_empty(r.get::<_, Option<String>>(10)?),
                Cell::Text(r.get::<_, String>(11)?),
                text_or_empty(r.get::<_, Option<String>>(12)?),
            ])
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn renewals_rows(conn: &Connection) -> anyhow::Result<Vec<Vec<Cell>>> {
    let mut stmt = conn.prepare(
        "SELECT p.student_id, s.seat_number, p.amount, p.payment_date, p.payment_mode
         FROM payments p
         JOIN students s ON s.id = p.student_id
         ORDER BY p.payment_date, p.id",
    )?;

    let rows = stmt
        .query_map([], |r| {
            Ok(vec![
                Cell::Number(r.get::<_, i64>(0)? as f64),
                text_or_empty(r.get::<_, Option<String>>(1)?),
                Cell::Number(r.get::<_, f64>(2)?),
                Cell::Text(r.get::<_, String>(3)?),
                Cell::Text(r.get::<_, String>(4)?),
            ])
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn text_or_empty(v: Option<String>) -> Cell {
    match v {
        Some(s) => Cell::Text(s),
        None => Cell::Empty,
    }
}
