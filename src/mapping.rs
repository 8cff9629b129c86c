use std::collections::HashMap;

use crate::workbook::{Cell, Sheet, Workbook};

// Worksheet name variants, in priority order. Matching is case-insensitive
// substring containment in either direction, so "Student_Data 2024" still
// resolves as the members sheet.
pub const MEMBER_SHEET_NAMES: &[&str] = &[
    "Library Members",
    "Members",
    "Students",
    "Library_Members",
    "Student_Data",
];
pub const RENEWAL_SHEET_NAMES: &[&str] = &[
    "Renewals",
    "Payments",
    "Renewal",
    "Payment",
    "Renewal_Data",
];

// Historically-observed header spellings per canonical field, first match
// wins. Matching is exact on the header text; the first spelling in each
// list is the canonical export header.
pub const COL_MEMBER_ID: &[&str] = &["ID", "Id", "id", "Student ID", "Student Id"];
pub const COL_NAME: &[&str] = &["Name", "Student Name", "Full Name", "name"];
pub const COL_FATHER_NAME: &[&str] = &["Father Name", "Father's Name", "Fathers Name", "FatherName"];
pub const COL_CONTACT: &[&str] = &["Contact Number", "Contact", "Mobile Number", "Mobile", "Phone"];
pub const COL_SEX: &[&str] = &["Sex", "Gender", "sex"];
pub const COL_SEAT: &[&str] = &["Seat Number", "Seat No", "Seat", "SeatNo"];
pub const COL_MEMBERSHIP_DATE: &[&str] = &[
    "Membership Date",
    "Joining Date",
    "Date of Joining",
    "Start Date",
];
pub const COL_TOTAL_PAID: &[&str] = &["Total Paid", "Total Amount", "Total Fees Paid"];
pub const COL_MEMBERSHIP_TILL: &[&str] =
    &["Membership Till", "Valid Till", "Valid Upto", "Expiry Date"];
pub const COL_MEMBERSHIP_STATUS: &[&str] = &["Membership Status", "Status"];
pub const COL_LAST_PAYMENT_DATE: &[&str] =
    &["Last Payment Date", "Last Payment", "Last Paid On"];
pub const COL_AADHAAR: &[&str] = &["Aadhaar Number", "Aadhar Number", "Aadhaar", "Aadhar", "Aadhaar No"];
pub const COL_ADDRESS: &[&str] = &["Address", "Full Address", "address"];

pub const COL_RENEWAL_ID: &[&str] = &["ID", "Id", "id", "Student ID", "Student Id"];
pub const COL_RENEWAL_SEAT: &[&str] = &["Seat Number", "Seat No", "Seat"];
pub const COL_AMOUNT_PAID: &[&str] = &["Amount Paid", "Amount", "Paid Amount", "Fees Paid"];
pub const COL_PAYMENT_DATE: &[&str] = &["Payment Date", "Date", "Paid On"];
pub const COL_PAYMENT_MODE: &[&str] = &["Payment Mode", "Mode", "Payment Method"];

pub const MEMBER_EXPORT_HEADERS: &[&str] = &[
    "ID",
    "Name",
    "Father Name",
    "Contact Number",
    "Sex",
    "Seat Number",
    "Membership Date",
    "Total Paid",
    "Membership Till",
    "Membership Status",
    "Last Payment Date",
    "Aadhaar Number",
    "Address",
];
pub const RENEWAL_EXPORT_HEADERS: &[&str] = &[
    "ID",
    "Seat Number",
    "Amount Paid",
    "Payment Date",
    "Payment Mode",
];

pub const MEMBER_EXPORT_SHEET: &str = "Library Members";
pub const RENEWAL_EXPORT_SHEET: &str = "Renewals";

/// First variant present on this row, if any.
pub fn pick<'a>(row: &'a HashMap<String, Cell>, variants: &[&str]) -> Option<&'a Cell> {
    variants.iter().find_map(|v| row.get(*v))
}

fn name_matches(sheet_name: &str, candidate: &str) -> bool {
    let s = sheet_name.trim().to_ascii_lowercase();
    let c = candidate.to_ascii_lowercase();
    if s.is_empty() {
        return false;
    }
    s.contains(&c) || c.contains(&s)
}

pub fn find_sheet<'a>(book: &'a Workbook, candidates: &[&str]) -> Option<&'a Sheet> {
    for cand in candidates {
        if let Some(sheet) = book.sheets.iter().find(|s| name_matches(&s.name, cand)) {
            return Some(sheet);
        }
    }
    None
}

#[derive(Debug)]
pub struct ImportSheets<'a> {
    pub members: &'a Sheet,
    pub renewals: &'a Sheet,
}

/// Resolve the members and renewals worksheets, independently. Failing here
/// happens before any transaction is opened; the error names what is
/// missing and echoes the sheet names actually present.
pub fn find_import_sheets(book: &Workbook) -> anyhow::Result<ImportSheets<'_>> {
    let members = find_sheet(book, MEMBER_SHEET_NAMES);
    let renewals = find_sheet(book, RENEWAL_SHEET_NAMES);
    if let (Some(members), Some(renewals)) = (members, renewals) {
        return Ok(ImportSheets { members, renewals });
    }

    let mut missing = Vec::new();
    if members.is_none() {
        missing.push(format!("a members sheet (one of: {})", MEMBER_SHEET_NAMES.join(", ")));
    }
    if renewals.is_none() {
        missing.push(format!("a renewals sheet (one of: {})", RENEWAL_SHEET_NAMES.join(", ")));
    }
    let present = book.sheet_names();
    let present = if present.is_empty() {
        "(none)".to_string()
    } else {
        present.join(", ")
    };
    anyhow::bail!(
        "workbook is missing {}; sheets present: {}",
        missing.join(" and "),
        present
    )
}
