//! Local CSV files as a tabular source, for development without a spreadsheet API.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    application::ports::{RowFetch, TabularError, TabularSource},
    domain::entities::SheetReference,
    util::paths::safe_relative,
};

/// Resolves `sheet_id` to `{root}/{sheet_id}.csv`; the first record is the header.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    root: PathBuf,
}

impl CsvDirectorySource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn file_for(&self, sheet_id: &str) -> Result<PathBuf, TabularError> {
        safe_relative(&format!("{sheet_id}.csv"))
            .map(|relative| self.root.join(relative))
            .ok_or_else(|| TabularError::Request(format!("invalid sheet id `{sheet_id}`")))
    }
}

fn cell_value(cell: &str) -> Value {
    if cell.is_empty() {
        Value::Null
    } else {
        Value::String(cell.to_string())
    }
}

fn read_row(data: &[u8], offset: u64) -> Result<RowFetch, TabularError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);
    let mut records = reader.records();

    let header = match records.next() {
        Some(record) => record
            .map_err(|err| TabularError::Decode(err.to_string()))?
            .iter()
            .map(str::to_string)
            .collect(),
        None => return Ok(RowFetch::default()),
    };

    let skip = usize::try_from(offset)
        .map_err(|_| TabularError::Decode(format!("offset {offset} out of range")))?;
    let row = match records.nth(skip) {
        Some(record) => {
            let record = record.map_err(|err| TabularError::Decode(err.to_string()))?;
            Some(record.iter().map(cell_value).collect())
        }
        None => None,
    };

    Ok(RowFetch { header, row })
}

fn populated_after(data: &[u8], offset: u64) -> Result<bool, TabularError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|err| TabularError::Decode(err.to_string()))?;
        let later = u64::try_from(index).map_or(true, |index| index > offset);
        if later && record.iter().any(|cell| !cell.is_empty()) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[async_trait]
impl TabularSource for CsvDirectorySource {
    async fn fetch_row(
        &self,
        sheet: &SheetReference,
        offset: u64,
    ) -> Result<RowFetch, TabularError> {
        let path = self.file_for(&sheet.sheet_id)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|err| TabularError::Request(format!("{}: {err}", path.display())))?;
        read_row(&data, offset)
    }

    async fn has_rows_after(
        &self,
        sheet: &SheetReference,
        offset: u64,
    ) -> Result<bool, TabularError> {
        let path = self.file_for(&sheet.sheet_id)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|err| TabularError::Request(format!("{}: {err}", path.display())))?;
        populated_after(&data, offset)
    }
}
