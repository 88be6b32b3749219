// ABOUTME: Single-sheet XLSX workbooks built in memory
// ABOUTME: Writes the SpreadsheetML parts into a zip buffer and finishes it before returning

use std::io::{Cursor, Write};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ExplorerError, Result};
use crate::models::{ResultPage, Value};

pub const MAX_SHEET_NAME_LEN: usize = 31;
const MAX_COLUMNS: usize = 16_384;
/// Excel's per-cell text limit
pub const MAX_CELL_CHARS: usize = 32_767;
const FORBIDDEN_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

// Cell styles: 1 bold header, 2 date, 3 date and time, 4 time of day
const HEADER_STYLE: u8 = 1;
const DATE_STYLE: u8 = 2;
const DATETIME_STYLE: u8 = 3;
const TIME_STYLE: u8 = 4;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><numFmts count="3"><numFmt numFmtId="164" formatCode="yyyy\-mm\-dd"/><numFmt numFmtId="165" formatCode="yyyy\-mm\-dd\ hh:mm:ss"/><numFmt numFmtId="166" formatCode="hh:mm:ss"/></numFmts><fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="5"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/><xf numFmtId="164" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/><xf numFmtId="165" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/><xf numFmtId="166" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;

/// Check a sheet name against Excel's rules
pub fn validate_sheet_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("sheet name is empty".to_string());
    }
    if name.chars().count() > MAX_SHEET_NAME_LEN {
        return Err(format!("sheet name '{}' is longer than 31 characters", name));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_SHEET_CHARS.contains(c)) {
        return Err(format!("sheet name '{}' contains '{}'", name, c));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(format!("sheet name '{}' starts or ends with an apostrophe", name));
    }
    Ok(())
}

/// Derive a valid sheet name from a table name
pub fn sheet_name_for(table: &str) -> String {
    let cleaned: String = table
        .chars()
        .map(|c| if FORBIDDEN_SHEET_CHARS.contains(&c) { '_' } else { c })
        .take(MAX_SHEET_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim_matches('\'');
    if cleaned.is_empty() {
        "Sheet1".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Spreadsheet column letters: 0 -> A, 25 -> Z, 26 -> AA
fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().map(|&b| b as char).collect()
}

/// Escape text for XML, writing illegal control characters as `_xHHHH_`.
///
/// Literal text already shaped like `_xHHHH_` gets its underscore escaped
/// too, otherwise Excel decodes it on open.
fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' | '\n' | '\r' => out.push(c),
            '_' if is_escape_sequence(&text[i..]) => out.push_str("_x005F_"),
            c if (c as u32) < 0x20 => out.push_str(&format!("_x{:04X}_", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// `_x` + four hex digits + `_` at the start of `text`
fn is_escape_sequence(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() >= 7
        && bytes[0] == b'_'
        && bytes[1] == b'x'
        && bytes[2..6].iter().all(u8::is_ascii_hexdigit)
        && bytes[6] == b'_'
}

/// Days since 1899-12-30, the epoch Excel's 1900 date system effectively uses
/// from March 1900 on. Earlier dates have no faithful serial value.
fn date_serial(date: NaiveDate) -> Option<f64> {
    let first_exact = NaiveDate::from_ymd_opt(1900, 3, 1)?;
    if date < first_exact {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    Some((date - epoch).num_days() as f64)
}

fn time_fraction(time: NaiveTime) -> f64 {
    // Leap-second nanoseconds are folded into the last second
    let nanos = time.nanosecond().min(999_999_999);
    (f64::from(time.num_seconds_from_midnight()) + f64::from(nanos) / 1e9) / 86_400.0
}

fn datetime_serial(value: NaiveDateTime) -> Option<f64> {
    date_serial(value.date()).map(|days| days + time_fraction(value.time()))
}

fn number_cell(out: &mut String, reference: &str, number: f64, style: u8) {
    out.push_str(&format!(r#"<c r="{}" s="{}"><v>{}</v></c>"#, reference, style, number));
}

fn inline_string_cell(out: &mut String, reference: &str, text: &str, style: Option<u8>) {
    let style = style.map(|s| format!(" s=\"{}\"", s)).unwrap_or_default();
    out.push_str(&format!(
        r#"<c r="{}"{} t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
        reference,
        style,
        escape_xml(text)
    ));
}

fn value_cell(out: &mut String, reference: &str, column: &str, value: &Value) -> Result<()> {
    match value {
        Value::Null => {}
        Value::Bool(v) => {
            out.push_str(&format!(r#"<c r="{}" t="b"><v>{}</v></c>"#, reference, u8::from(*v)));
        }
        Value::Int(v) => {
            out.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, reference, v));
        }
        Value::Float(v) => {
            if !v.is_finite() {
                return Err(ExplorerError::Export(format!(
                    "column '{}' holds {} which a spreadsheet cannot store",
                    column, v
                )));
            }
            out.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, reference, v));
        }
        Value::Decimal(v) => {
            out.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, reference, escape_xml(v)));
        }
        Value::Bytes(_) => {
            return Err(ExplorerError::Export(format!(
                "column '{}' holds binary data which a spreadsheet cannot store",
                column
            )));
        }
        Value::Date(v) => match date_serial(*v) {
            Some(serial) => number_cell(out, reference, serial, DATE_STYLE),
            None => inline_string_cell(out, reference, &value.to_string(), None),
        },
        Value::Time(v) => number_cell(out, reference, time_fraction(*v), TIME_STYLE),
        Value::DateTime(v) => match datetime_serial(*v) {
            Some(serial) => number_cell(out, reference, serial, DATETIME_STYLE),
            None => inline_string_cell(out, reference, &value.to_string(), None),
        },
        // Wall-clock time at the stored offset; spreadsheets have no zone
        Value::DateTimeOffset(v) => match datetime_serial(v.naive_local()) {
            Some(serial) => number_cell(out, reference, serial, DATETIME_STYLE),
            None => inline_string_cell(out, reference, &value.to_string(), None),
        },
        Value::Text(_) | Value::Uuid(_) => {
            let text = value.to_string();
            if text.chars().count() > MAX_CELL_CHARS {
                return Err(ExplorerError::Export(format!(
                    "column '{}' holds text longer than the {} characters a cell can store",
                    column, MAX_CELL_CHARS
                )));
            }
            inline_string_cell(out, reference, &text, None);
        }
    }
    Ok(())
}

fn worksheet_xml(page: &ResultPage) -> Result<String> {
    if page.columns.len() > MAX_COLUMNS {
        return Err(ExplorerError::Export(format!(
            "{} columns exceed the spreadsheet limit of {}",
            page.columns.len(),
            MAX_COLUMNS
        )));
    }
    let letters: Vec<String> = (0..page.columns.len()).map(column_letters).collect();

    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );

    xml.push_str(r#"<row r="1">"#);
    for (letter, column) in letters.iter().zip(&page.columns) {
        inline_string_cell(&mut xml, &format!("{}1", letter), column, Some(HEADER_STYLE));
    }
    xml.push_str("</row>");

    for (index, row) in page.rows.iter().enumerate() {
        let row_number = index + 2;
        xml.push_str(&format!(r#"<row r="{}">"#, row_number));
        for ((letter, column), value) in letters.iter().zip(&page.columns).zip(row) {
            value_cell(&mut xml, &format!("{}{}", letter, row_number), column, value)?;
        }
        xml.push_str("</row>");
    }

    xml.push_str("</sheetData></worksheet>");
    Ok(xml)
}

fn workbook_xml(sheet_name: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        escape_xml(sheet_name)
    )
}

/// Render `page` as an XLSX workbook with one sheet called `sheet_name`
pub fn to_spreadsheet(page: &ResultPage, sheet_name: &str) -> Result<Vec<u8>> {
    validate_sheet_name(sheet_name).map_err(ExplorerError::Export)?;

    // Build every part first so value errors surface before any zip work
    let worksheet = worksheet_xml(page)?;
    let workbook = workbook_xml(sheet_name);

    let parts: [(&str, &str); 6] = [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("xl/workbook.xml", workbook.as_str()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
        ("xl/styles.xml", STYLES),
        ("xl/worksheets/sheet1.xml", worksheet.as_str()),
    ];

    let mut zip_writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, contents) in parts {
        zip_writer
            .start_file(name, options)
            .map_err(|e| ExplorerError::Export(format!("Failed to add '{}': {}", name, e)))?;
        zip_writer
            .write_all(contents.as_bytes())
            .map_err(|e| ExplorerError::Export(format!("Failed to write '{}': {}", name, e)))?;
    }

    let finished = zip_writer
        .finish()
        .map_err(|e| ExplorerError::Export(format!("Failed to finalize workbook: {}", e)))?;
    Ok(finished.into_inner())
}
