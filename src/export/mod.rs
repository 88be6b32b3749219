// ABOUTME: Export of result pages to portable tabular formats
// ABOUTME: Produces CSV or XLSX artifacts with MIME type and suggested file name

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::ResultPage;

pub mod csv;
pub mod xlsx;

pub use xlsx::{sheet_name_for, validate_sheet_name};

pub const CSV_MIME: &str = "text/csv";
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => CSV_MIME,
            ExportFormat::Xlsx => XLSX_MIME,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

/// Bytes ready for download; never written to disk here
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub file_name: String,
}

/// Render `page` as UTF-8 CSV
pub fn to_csv(page: &ResultPage) -> Result<Vec<u8>> {
    Ok(csv::to_csv(page))
}

/// Render `page` as a one-sheet workbook named `sheet_name`
pub fn to_spreadsheet(page: &ResultPage, sheet_name: &str) -> Result<Vec<u8>> {
    xlsx::to_spreadsheet(page, sheet_name)
}

/// Export `page` in `format`, naming the file and sheet after the table
pub fn export(page: &ResultPage, format: ExportFormat) -> Result<ExportArtifact> {
    let bytes = match format {
        ExportFormat::Csv => to_csv(page)?,
        ExportFormat::Xlsx => to_spreadsheet(page, &sheet_name_for(&page.table))?,
    };
    log::debug!(
        "Exported {} rows of {} as {} ({} bytes)",
        page.len(),
        page.table,
        format.extension(),
        bytes.len()
    );

    Ok(ExportArtifact {
        bytes,
        mime_type: format.mime_type(),
        file_name: format!("{}.{}", page.table, format.extension()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    fn page(table: &str) -> ResultPage {
        ResultPage {
            table: table.to_string(),
            offset: 10,
            columns: vec!["id".to_string()],
            rows: vec![vec![Value::Int(11)], vec![Value::Int(12)]],
        }
    }

    #[test]
    fn test_csv_artifact() {
        let artifact = export(&page("Orders"), ExportFormat::Csv).unwrap();
        assert_eq!(artifact.file_name, "Orders.csv");
        assert_eq!(artifact.mime_type, "text/csv");
        assert_eq!(artifact.bytes, b"id\n11\n12\n".to_vec());
    }

    #[test]
    fn test_xlsx_artifact() {
        let artifact = export(&page("Orders"), ExportFormat::Xlsx).unwrap();
        assert_eq!(artifact.file_name, "Orders.xlsx");
        assert_eq!(artifact.mime_type, XLSX_MIME);
        // Zip local file header magic
        assert_eq!(&artifact.bytes[..4], b"PK\x03\x04");
    }

    #[test]
    fn test_xlsx_artifact_for_awkward_table_name() {
        let long_name = "customer_order_history_archive_2019_q4";
        let artifact = export(&page(long_name), ExportFormat::Xlsx).unwrap();
        assert_eq!(artifact.file_name, format!("{}.xlsx", long_name));
    }

    #[test]
    fn test_format_names() {
        let parsed: ExportFormat = serde_json::from_str("\"xlsx\"").unwrap();
        assert_eq!(parsed, ExportFormat::Xlsx);
        assert_eq!(ExportFormat::Csv.extension(), "csv");
    }
}
