use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::workbook::Cell;

/// Sentinel used whenever a mandatory contact field has no usable value.
pub const DEFAULT_CONTACT: &str = "1234567890";

pub const IDENTITY_LEN: usize = 12;

/// The source application rendered all dates in a fixed +5:30 display zone
/// and persisted the shifted values; imports undo that bias.
const DISPLAY_TZ_OFFSET_MIN: i64 = 330;

/// Conventional spreadsheet serial epoch (1899-12-30, which absorbs the
/// historical 1900 leap-year bug).
fn sheet_epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)
}

/// Convert a raw cell into a timestamp. Accepts a native spreadsheet date,
/// a numeric serial, or an ISO-like text value; everything else is `None`.
pub fn parse_excel_date(cell: Option<&Cell>) -> Option<NaiveDateTime> {
    let raw = match cell? {
        Cell::DateTime(dt) => Some(*dt),
        Cell::Number(n) => serial_to_datetime(*n),
        Cell::Text(s) => parse_date_text(s),
        _ => None,
    }?;
    raw.checked_sub_signed(Duration::minutes(DISPLAY_TZ_OFFSET_MIN))
}

fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial.abs() > 4_000_000.0 {
        return None;
    }
    let millis = (serial * 86_400_000.0).round() as i64;
    sheet_epoch()?.checked_add_signed(Duration::milliseconds(millis))
}

fn parse_date_text(s: &str) -> Option<NaiveDateTime> {
    let t = s.trim().trim_end_matches('Z');
    if t.is_empty() {
        return None;
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(t, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(t, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Parse a gender marker: `m`/`male`/`M`/... map to `male`, `f...` to
/// `female`, anything else is unusable.
pub fn parse_gender(cell: Option<&Cell>) -> Option<&'static str> {
    let text = cell?.as_clean_text()?;
    let lower = text.to_ascii_lowercase();
    if lower.starts_with('m') {
        Some("male")
    } else if lower.starts_with('f') {
        Some("female")
    } else {
        None
    }
}

/// Strip everything but digits; a contact is usable only when exactly 10
/// digits remain. Callers that must write a contact fall back to
/// [`DEFAULT_CONTACT`].
pub fn normalize_contact(cell: Option<&Cell>) -> Option<String> {
    let text = cell?.as_clean_text()?;
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 10 {
        Some(digits)
    } else {
        None
    }
}

pub fn contact_or_default(cell: Option<&Cell>) -> String {
    normalize_contact(cell).unwrap_or_else(|| DEFAULT_CONTACT.to_string())
}

/// Best-effort identity number: last 8 digits of the millisecond clock plus
/// 4 random digits. Uniqueness is enforced downstream, not here.
pub fn generate_identity_number() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let mut out = format!("{:08}", millis % 100_000_000);
    let mut rng = rand::thread_rng();
    for _ in 0..4 {
        out.push(char::from(b'0' + rng.gen_range(0..10u8)));
    }
    out.truncate(IDENTITY_LEN);
    out
}

pub fn is_identity_number(s: &str) -> bool {
    s.len() == IDENTITY_LEN && s.chars().all(|c| c.is_ascii_digit())
}

pub fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}
