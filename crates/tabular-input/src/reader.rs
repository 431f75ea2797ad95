//! Upload Readers for CSV and JSON Tables

use crate::cell::Cell;
use crate::error::InputError;
use crate::record::{RawRecord, RawTable};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Upload reader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Maximum number of data rows accepted in one upload
    pub max_rows: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self { max_rows: 50_000 }
    }
}

/// Supported upload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadFormat {
    /// Comma separated values with a header row
    Csv,
    /// JSON array of objects
    Json,
}

impl UploadFormat {
    /// Pick a format from the file name, falling back to the content type
    pub fn detect(file_name: Option<&str>, content_type: Option<&str>) -> Result<Self, InputError> {
        let extension = file_name
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("csv") | Some("txt") => return Ok(UploadFormat::Csv),
            Some("json") => return Ok(UploadFormat::Json),
            Some("xlsx") | Some("xls") | Some("xlsm") | Some("ods") => {
                return Err(InputError::UnsupportedFormat(
                    "spreadsheet workbooks are not read directly, export the sheet as CSV".to_string(),
                ))
            }
            _ => {}
        }

        let mime = content_type
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase());
        match mime.as_deref() {
            Some("text/csv") | Some("application/csv") | Some("text/plain") => Ok(UploadFormat::Csv),
            Some("application/json") => Ok(UploadFormat::Json),
            other => Err(InputError::UnsupportedFormat(format!(
                "cannot infer format from file name {:?} and content type {:?}",
                file_name, other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadFormat::Csv => "csv",
            UploadFormat::Json => "json",
        }
    }
}

/// Parse an upload whose format is inferred from its name and content type
pub fn parse_upload(
    file_name: Option<&str>,
    content_type: Option<&str>,
    bytes: &[u8],
    config: &ReaderConfig,
) -> Result<RawTable, InputError> {
    let format = UploadFormat::detect(file_name, content_type)?;
    let table = match format {
        UploadFormat::Csv => read_csv(bytes, config)?,
        UploadFormat::Json => read_json(bytes, config)?,
    };

    info!(
        format = format.as_str(),
        rows = table.len(),
        columns = table.columns.len(),
        "Parsed upload"
    );
    Ok(table)
}

/// Read a CSV table with a header row
pub fn read_csv(bytes: &[u8], config: &ReaderConfig) -> Result<RawTable, InputError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let malformed = |reason: String| InputError::Malformed { format: "csv", reason };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| malformed(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(malformed("missing header row".to_string()));
    }
    check_unique(&headers)?;

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(|e| malformed(format!("row {}: {}", line + 1, e)))?;

        let record: RawRecord = headers
            .iter()
            .zip(row.iter())
            .map(|(column, raw)| (column.clone(), Cell::parse(raw)))
            .collect();

        if record.is_blank() {
            debug!("Skipping blank row {}", line + 1);
            continue;
        }

        records.push(record);
        if records.len() > config.max_rows {
            return Err(InputError::TooManyRows {
                rows: records.len(),
                limit: config.max_rows,
            });
        }
    }

    Ok(RawTable {
        columns: headers,
        records,
    })
}

/// Read a JSON array of flat objects
pub fn read_json(bytes: &[u8], config: &ReaderConfig) -> Result<RawTable, InputError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let malformed = |reason: String| InputError::Malformed { format: "json", reason };

    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| malformed(e.to_string()))?;

    let rows = value
        .as_array()
        .ok_or_else(|| malformed("expected a top-level array of objects".to_string()))?;

    if rows.len() > config.max_rows {
        return Err(InputError::TooManyRows {
            rows: rows.len(),
            limit: config.max_rows,
        });
    }

    let mut columns = Vec::new();
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(rows.len());

    for (idx, row) in rows.iter().enumerate() {
        let object = row
            .as_object()
            .ok_or_else(|| malformed(format!("row {} is not an object", idx + 1)))?;

        let mut record = RawRecord::new();
        for (column, value) in object {
            let column = column.trim();
            // keys equal after trimming would overwrite each other
            if record.contains(column) {
                return Err(InputError::DuplicateColumn(column.to_string()));
            }
            if seen.insert(column.to_string()) {
                columns.push(column.to_string());
            }
            record.insert(column, Cell::from(value));
        }

        if record.is_blank() {
            debug!("Skipping blank row {}", idx + 1);
            continue;
        }
        records.push(record);
    }

    Ok(RawTable { columns, records })
}

fn check_unique(headers: &[String]) -> Result<(), InputError> {
    let mut seen = HashSet::with_capacity(headers.len());
    for header in headers {
        if !seen.insert(header.as_str()) {
            return Err(InputError::DuplicateColumn(header.clone()));
        }
    }
    Ok(())
}
