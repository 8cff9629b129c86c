use anyhow::Context;
use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// One spreadsheet cell, reduced to the shapes the import pipeline cares
/// about. `Empty` only appears on the write side; readers drop empty cells.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// Trimmed, non-empty text rendering. Numbers are rendered without an
    /// exponent so identifier-like values (contacts, seat codes) survive.
    pub fn as_clean_text(&self) -> Option<String> {
        let text = match self {
            Cell::Empty => return None,
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(f) => render_number(*f),
            Cell::Bool(b) => {
                if *b {
                    "TRUE".to_string()
                } else {
                    "FALSE".to_string()
                }
            }
            Cell::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(f) => Some(*f),
            Cell::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Number(f) if f.fract() == 0.0 => Some(*f as i64),
            Cell::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }
}

fn render_number(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{:.0}", f)
    } else {
        format!("{}", f)
    }
}

#[derive(Debug)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<HashMap<String, Cell>>,
}

#[derive(Debug)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Load a workbook fully into memory. The first row of each worksheet is
/// taken as the header row; data rows are keyed by header text with empty
/// cells dropped, so "column present on this row" is a plain map lookup.
pub fn read_workbook(path: &Path) -> anyhow::Result<Workbook> {
    let mut wb = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.to_string_lossy()))?;
    let names: Vec<String> = wb.sheet_names().to_vec();

    let mut sheets = Vec::new();
    for name in names {
        let range = match wb.worksheet_range(&name) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(sheet = %name, error = %e, "skipping unreadable worksheet");
                continue;
            }
        };

        let mut raw_rows = range.rows();
        let headers: Vec<String> = match raw_rows.next() {
            Some(row) => row.iter().map(header_text).collect(),
            None => Vec::new(),
        };

        let mut rows = Vec::new();
        for raw in raw_rows {
            let mut row: HashMap<String, Cell> = HashMap::new();
            for (i, data) in raw.iter().enumerate() {
                let Some(header) = headers.get(i).filter(|h| !h.is_empty()) else {
                    continue;
                };
                if let Some(cell) = convert_cell(data) {
                    row.insert(header.clone(), cell);
                }
            }
            if !row.is_empty() {
                rows.push(row);
            }
        }

        sheets.push(Sheet {
            name,
            headers,
            rows,
        });
    }

    Ok(Workbook { sheets })
}

fn header_text(data: &Data) -> String {
    match data {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => render_number(*f),
        Data::Int(i) => i.to_string(),
        _ => String::new(),
    }
}

fn convert_cell(data: &Data) -> Option<Cell> {
    match data {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => {
            if s.trim().is_empty() {
                None
            } else {
                Some(Cell::Text(s.clone()))
            }
        }
        Data::Float(f) => Some(Cell::Number(*f)),
        Data::Int(i) => Some(Cell::Number(*i as f64)),
        Data::Bool(b) => Some(Cell::Bool(*b)),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Some(Cell::DateTime(naive)),
            None => Some(Cell::Number(dt.as_f64())),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(Cell::Text(s.clone())),
    }
}

pub struct SheetData<'a> {
    pub name: &'a str,
    pub headers: &'a [&'a str],
    pub rows: Vec<Vec<Cell>>,
}

/// Write a workbook as a minimal SpreadsheetML package: one zip container
/// with inline-string cells, no shared-string table or styles. Dates are
/// written as text in the same format the import side parses.
pub fn write_workbook(path: &Path, sheets: &[SheetData]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out = File::create(path)
        .with_context(|| format!("failed to create workbook {}", path.to_string_lossy()))?;
    let mut zip = ZipWriter::new(out);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut content_types = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
         <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
         <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
         <Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>",
    );
    for i in 1..=sheets.len() {
        content_types.push_str(&format!(
            "<Override PartName=\"/xl/worksheets/sheet{}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>",
            i
        ));
    }
    content_types.push_str("</Types>");
    zip.start_file("[Content_Types].xml", opts)
        .context("failed to start content-types entry")?;
    zip.write_all(content_types.as_bytes())
        .context("failed to write content-types entry")?;

    zip.start_file("_rels/.rels", opts)
        .context("failed to start package rels entry")?;
    zip.write_all(
        b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
          <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
          <Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"xl/workbook.xml\"/>\
          </Relationships>",
    )
    .context("failed to write package rels entry")?;

    let mut workbook_xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
         xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\"><sheets>",
    );
    let mut workbook_rels = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    );
    for (i, sheet) in sheets.iter().enumerate() {
        let n = i + 1;
        workbook_xml.push_str(&format!(
            "<sheet name=\"{}\" sheetId=\"{}\" r:id=\"rId{}\"/>",
            xml_escape(sheet.name),
            n,
            n
        ));
        workbook_rels.push_str(&format!(
            "<Relationship Id=\"rId{}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet{}.xml\"/>",
            n, n
        ));
    }
    workbook_xml.push_str("</sheets></workbook>");
    workbook_rels.push_str("</Relationships>");

    zip.start_file("xl/workbook.xml", opts)
        .context("failed to start workbook entry")?;
    zip.write_all(workbook_xml.as_bytes())
        .context("failed to write workbook entry")?;
    zip.start_file("xl/_rels/workbook.xml.rels", opts)
        .context("failed to start workbook rels entry")?;
    zip.write_all(workbook_rels.as_bytes())
        .context("failed to write workbook rels entry")?;

    for (i, sheet) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), opts)
            .with_context(|| format!("failed to start worksheet entry {}", sheet.name))?;
        zip.write_all(worksheet_xml(sheet).as_bytes())
            .with_context(|| format!("failed to write worksheet entry {}", sheet.name))?;
    }

    zip.finish().context("failed to finalize workbook")?;
    Ok(())
}

fn worksheet_xml(sheet: &SheetData) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"><sheetData>",
    );
    xml.push_str("<row r=\"1\">");
    for (col, header) in sheet.headers.iter().enumerate() {
        push_cell(&mut xml, 1, col, &Cell::Text((*header).to_string()));
    }
    xml.push_str("</row>");
    for (r, row) in sheet.rows.iter().enumerate() {
        let row_no = r + 2;
        xml.push_str(&format!("<row r=\"{}\">", row_no));
        for (col, cell) in row.iter().enumerate() {
            push_cell(&mut xml, row_no, col, cell);
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

fn push_cell(xml: &mut String, row_no: usize, col: usize, cell: &Cell) {
    let cell_ref = format!("{}{}", col_ref(col), row_no);
    match cell {
        Cell::Empty => {}
        Cell::Text(s) => {
            if !s.is_empty() {
                xml.push_str(&format!(
                    "<c r=\"{}\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                    cell_ref,
                    xml_escape(s)
                ));
            }
        }
        Cell::Number(f) => {
            xml.push_str(&format!("<c r=\"{}\"><v>{}</v></c>", cell_ref, render_number(*f)));
        }
        Cell::Bool(b) => {
            xml.push_str(&format!(
                "<c r=\"{}\" t=\"b\"><v>{}</v></c>",
                cell_ref,
                if *b { 1 } else { 0 }
            ));
        }
        Cell::DateTime(dt) => {
            xml.push_str(&format!(
                "<c r=\"{}\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                cell_ref,
                dt.format("%Y-%m-%d %H:%M:%S")
            ));
        }
    }
}

fn col_ref(mut idx: usize) -> String {
    let mut s = String::new();
    loop {
        s.insert(0, (b'A' + (idx % 26) as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    s
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
