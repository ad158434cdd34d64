//! Worker sheets: where rows come from and where their outcome goes
//!
//! A worker sheet has a header row (row 1) with at least `IMEI`, `Status` and
//! `Location`. The Knack login sits in the same row, email in I1 and password
//! in K1. `Logs` and `TimeStamp` are appended to the header row when missing.

use crate::errors::SheetError;
use crate::types::{Account, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub mod csv_file;
pub mod google;

pub use csv_file::CsvWorkbook;
pub use google::{GoogleSheets, ServiceAccountKey};

pub const LOGS_HEADER: &str = "Logs";
pub const TIMESTAMP_HEADER: &str = "TimeStamp";

/// (row, column) of the account cells, 1-based
const EMAIL_CELL: (usize, usize) = (1, 9);
const PASSWORD_CELL: (usize, usize) = (1, 11);

/// One tab of a spreadsheet. Rows and columns are 1-based.
#[async_trait::async_trait]
pub trait Worksheet: Send + Sync {
    fn title(&self) -> &str;

    /// Every row from row 1 down to the last non-empty one. Rows may be ragged.
    async fn all_values(&self) -> Result<Vec<Vec<String>>, SheetError>;

    async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<(), SheetError>;

    /// Write `values` left to right into `row`, starting at `first_col`
    async fn update_range(
        &self,
        row: usize,
        first_col: usize,
        values: &[String],
    ) -> Result<(), SheetError>;

    async fn cell(&self, row: usize, col: usize) -> Result<Option<String>, SheetError> {
        check_cell(row, col)?;
        let values = self.all_values().await?;
        Ok(values
            .get(row - 1)
            .and_then(|r| r.get(col - 1))
            .filter(|v| !v.is_empty())
            .cloned())
    }
}

/// Reject the 0 row or column before it turns into an index
pub fn check_cell(row: usize, col: usize) -> Result<(), SheetError> {
    if row == 0 || col == 0 {
        return Err(SheetError::InvalidCell { row, col });
    }
    Ok(())
}

/// A spreadsheet holding worker sheets
#[async_trait::async_trait]
pub trait Spreadsheet: Send + Sync {
    /// Open the tab named `title`, creating an empty one when it does not exist
    async fn worksheet_or_create(&self, title: &str) -> Result<Arc<dyn Worksheet>, SheetError>;
}

/// Header row of a worker sheet, with the outcome columns guaranteed present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headers {
    names: Vec<String>,
    pub logs_col: usize,
    pub timestamp_col: usize,
}

impl Headers {
    /// 1-based column of the header named `name`
    pub fn column(&self, name: &str) -> Option<usize> {
        self.names
            .iter()
            .position(|h| !h.is_empty() && h == name)
            .map(|i| i + 1)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Trim trailing empty cells the way the Sheets API reports a row
fn trimmed_row(row: &[String]) -> Vec<String> {
    let len = row
        .iter()
        .rposition(|v| !v.trim().is_empty())
        .map_or(0, |i| i + 1);
    row[..len].iter().map(|v| v.trim().to_string()).collect()
}

/// Make sure the header row has `Logs` and `TimeStamp`, appending them if missing.
pub async fn ensure_log_columns(ws: &dyn Worksheet) -> Result<Headers, SheetError> {
    let values = ws.all_values().await?;
    let mut names = values.first().map(|r| trimmed_row(r)).unwrap_or_default();

    for header in [LOGS_HEADER, TIMESTAMP_HEADER] {
        if !names.iter().any(|h| h == header) {
            ws.update_cell(1, names.len() + 1, header).await?;
            names.push(header.to_string());
            info!("[{}] Added '{}' column", ws.title(), header);
        }
    }

    let position = |name: &str| {
        names
            .iter()
            .position(|h| h == name)
            .map(|i| i + 1)
            .ok_or_else(|| SheetError::MissingColumn(name.to_string()))
    };
    let logs_col = position(LOGS_HEADER)?;
    let timestamp_col = position(TIMESTAMP_HEADER)?;
    Ok(Headers {
        names,
        logs_col,
        timestamp_col,
    })
}

/// Read the Knack login stored in I1 (email) and K1 (password)
pub async fn knack_account(ws: &dyn Worksheet) -> Result<Account, SheetError> {
    let values = ws.all_values().await?;
    let read = |(row, col): (usize, usize)| {
        values
            .get(row - 1)
            .and_then(|r| r.get(col - 1))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };
    Ok(Account {
        email: read(EMAIL_CELL),
        password: read(PASSWORD_CELL),
    })
}

/// All data rows keyed by the header row, starting at spreadsheet row 2
pub async fn records(ws: &dyn Worksheet) -> Result<Vec<Row>, SheetError> {
    let values = ws.all_values().await?;
    let Some((header, data)) = values.split_first() else {
        return Ok(Vec::new());
    };

    let index: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .filter(|(_, name)| !name.trim().is_empty())
        .map(|(i, name)| (name.trim(), i))
        .collect();

    let rows: Vec<Row> = data
        .iter()
        .enumerate()
        .map(|(i, cells)| {
            let get = |name: &str| {
                index
                    .get(name)
                    .and_then(|&col| cells.get(col))
                    .map(|v| v.trim().to_string())
                    .unwrap_or_default()
            };
            Row {
                row_index: i + 2,
                imei: get("IMEI"),
                status: get("Status"),
                location: get("Location"),
                logs: get(LOGS_HEADER),
                timestamp: get(TIMESTAMP_HEADER),
            }
        })
        .collect();
    debug!("[{}] {} data rows read", ws.title(), rows.len());
    Ok(rows)
}

/// Write a row's log message and timestamp. Adjacent columns go out as one range update.
pub async fn write_outcome(
    ws: &dyn Worksheet,
    headers: &Headers,
    row_index: usize,
    log: &str,
    timestamp: &str,
) -> Result<(), SheetError> {
    let (logs, ts) = (headers.logs_col, headers.timestamp_col);
    if ts == logs + 1 {
        ws.update_range(row_index, logs, &[log.to_string(), timestamp.to_string()])
            .await
    } else if logs == ts + 1 {
        ws.update_range(row_index, ts, &[timestamp.to_string(), log.to_string()])
            .await
    } else {
        ws.update_cell(row_index, logs, log).await?;
        ws.update_cell(row_index, ts, timestamp).await
    }
}

/// A1 column name for a 1-based column index: 1 → A, 26 → Z, 27 → AA
pub fn column_letter(mut col: usize) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        letters.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// A1 notation for a single-row range on the sheet titled `title`
pub fn a1_range(title: &str, row: usize, first_col: usize, last_col: usize) -> String {
    format!(
        "{}!{}{row}:{}{row}",
        quote_title(title),
        column_letter(first_col),
        column_letter(last_col)
    )
}

/// Sheet titles are always quoted; embedded quotes are doubled
pub fn quote_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}
