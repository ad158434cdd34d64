//! Offline backend: a directory of CSV files, one per worker sheet

use super::{check_cell, Spreadsheet, Worksheet};
use crate::errors::SheetError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// A directory where `Worker-1.csv` plays the part of the `Worker-1` tab
#[derive(Debug, Clone)]
pub struct CsvWorkbook {
    dir: PathBuf,
}

impl CsvWorkbook {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, title: &str) -> PathBuf {
        let file: String = title
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        self.dir.join(format!("{file}.csv"))
    }
}

#[async_trait::async_trait]
impl Spreadsheet for CsvWorkbook {
    async fn worksheet_or_create(&self, title: &str) -> Result<Arc<dyn Worksheet>, SheetError> {
        let path = self.path_for(title);
        if !tokio::fs::try_exists(&path).await? {
            tokio::fs::create_dir_all(&self.dir).await?;
            tokio::fs::write(&path, b"").await?;
            info!("📄 Created worksheet file {}", path.display());
        }
        Ok(Arc::new(CsvWorksheet {
            title: title.to_string(),
            path,
            lock: Mutex::new(()),
        }))
    }
}

pub struct CsvWorksheet {
    title: String,
    path: PathBuf,
    lock: Mutex<()>,
}

fn read_grid(path: &Path) -> Result<Vec<Vec<String>>, SheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut grid = Vec::new();
    for record in reader.records() {
        grid.push(record?.iter().map(str::to_string).collect());
    }
    Ok(grid)
}

fn write_grid(path: &Path, grid: &[Vec<String>]) -> Result<(), SheetError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    for row in grid {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Blocking file I/O off the async runtime
async fn blocking<T, F>(f: F) -> Result<T, SheetError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SheetError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SheetError::Io(std::io::Error::other(e)))?
}

impl CsvWorksheet {
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn modify(
        &self,
        row: usize,
        first_col: usize,
        values: Vec<String>,
    ) -> Result<(), SheetError> {
        check_cell(row, first_col)?;
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        blocking(move || {
            let mut grid = read_grid(&path)?;
            if grid.len() < row {
                grid.resize_with(row, Vec::new);
            }
            let cells = &mut grid[row - 1];
            let needed = first_col - 1 + values.len();
            if cells.len() < needed {
                cells.resize(needed, String::new());
            }
            for (offset, value) in values.into_iter().enumerate() {
                cells[first_col - 1 + offset] = value;
            }
            write_grid(&path, &grid)
        })
        .await
    }
}

#[async_trait::async_trait]
impl Worksheet for CsvWorksheet {
    fn title(&self) -> &str {
        &self.title
    }

    async fn all_values(&self) -> Result<Vec<Vec<String>>, SheetError> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        blocking(move || read_grid(&path)).await
    }

    async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<(), SheetError> {
        self.modify(row, col, vec![value.to_string()]).await
    }

    async fn update_range(
        &self,
        row: usize,
        first_col: usize,
        values: &[String],
    ) -> Result<(), SheetError> {
        self.modify(row, first_col, values.to_vec()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_missing_sheet_file() {
        let dir = tempfile::tempdir().unwrap();
        let book = CsvWorkbook::new(dir.path().join("sheets"));
        let ws = book.worksheet_or_create("Worker-3").await.unwrap();
        assert_eq!(ws.title(), "Worker-3");
        assert!(dir.path().join("sheets/Worker-3.csv").exists());
        assert!(ws.all_values().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn updates_grow_ragged_rows() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Worker-1.csv"),
            "IMEI,Status,Location\n356938035643809,READY,Main\n",
        )
        .unwrap();
        let book = CsvWorkbook::new(dir.path());
        let ws = book.worksheet_or_create("Worker-1").await.unwrap();

        ws.update_cell(1, 4, "Logs").await.unwrap();
        ws.update_range(4, 2, &["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        let values = ws.all_values().await.unwrap();
        assert_eq!(values[0], vec!["IMEI", "Status", "Location", "Logs"]);
        assert_eq!(values[1][0], "356938035643809");
        assert_eq!(values[3], vec!["", "a", "b"]);
        assert_eq!(ws.cell(4, 3).await.unwrap().as_deref(), Some("b"));
        assert_eq!(ws.cell(3, 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn zero_row_or_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ws = CsvWorkbook::new(dir.path())
            .worksheet_or_create("Worker-1")
            .await
            .unwrap();

        assert!(matches!(
            ws.update_cell(0, 1, "x").await,
            Err(SheetError::InvalidCell { row: 0, col: 1 })
        ));
        assert!(matches!(
            ws.update_range(2, 0, &["x".to_string()]).await,
            Err(SheetError::InvalidCell { row: 2, col: 0 })
        ));
        assert!(matches!(
            ws.cell(0, 0).await,
            Err(SheetError::InvalidCell { .. })
        ));
        assert!(ws.all_values().await.unwrap().is_empty());
    }
}
