//! Streaming CSV row reader
//!
//! Rows are read one at a time from an async source; nothing beyond the
//! current record is buffered. A reader cannot rewind, so callers that need a
//! second pass reopen the spooled file with [`open`].
//!
//! Header handling:
//! - names are matched case-insensitively after trimming whitespace and a
//!   UTF-8 byte order mark
//! - `sku` is mandatory; `name`, `description` and `price` read as empty when
//!   absent
//! - unknown columns are ignored
//!
//! Rows shorter than the header read their missing trailing fields as empty
//! strings. Invalid UTF-8 is replaced rather than rejected.

use crate::error::{ImportError, Result};
use csv_async::{AsyncReader, AsyncReaderBuilder, ByteRecord};
use std::path::Path;
use tokio::io::AsyncRead;
use tracing::warn;

pub const KNOWN_COLUMNS: [&str; 4] = ["sku", "name", "description", "price"];

/// One physical data row, with the fields the importer cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based position among data rows (the header is not counted)
    pub row_number: u64,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub price: String,
}

#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    sku: usize,
    name: Option<usize>,
    description: Option<usize>,
    price: Option<usize>,
}

fn normalize_header(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_start_matches('\u{feff}')
        .trim()
        .to_lowercase()
}

impl ColumnMap {
    fn from_headers(headers: &ByteRecord) -> Result<Self> {
        let names: Vec<String> = headers.iter().map(normalize_header).collect();
        let find = |column: &str| names.iter().position(|name| name == column);

        Ok(Self {
            sku: find("sku").ok_or(ImportError::MissingColumn("sku"))?,
            name: find("name"),
            description: find("description"),
            price: find("price"),
        })
    }

    fn missing(&self) -> Vec<&'static str> {
        [
            ("name", self.name),
            ("description", self.description),
            ("price", self.price),
        ]
        .into_iter()
        .filter(|(_, index)| index.is_none())
        .map(|(column, _)| column)
        .collect()
    }
}

fn field(record: &ByteRecord, index: Option<usize>) -> String {
    index
        .and_then(|i| record.get(i))
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_default()
}

pub struct RowReader<R> {
    reader: AsyncReader<R>,
    columns: ColumnMap,
    record: ByteRecord,
    rows_read: u64,
}

impl<R> RowReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Read and check the header row.
    pub async fn new(source: R) -> Result<Self> {
        let mut reader = AsyncReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .create_reader(source);

        let headers = reader.byte_headers().await?.clone();
        let columns = ColumnMap::from_headers(&headers)?;

        Ok(Self {
            reader,
            columns,
            record: ByteRecord::new(),
            rows_read: 0,
        })
    }

    /// Columns from [`KNOWN_COLUMNS`] that the header lacks.
    pub fn missing_columns(&self) -> Vec<&'static str> {
        self.columns.missing()
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    async fn advance(&mut self) -> Result<bool> {
        if !self.reader.read_byte_record(&mut self.record).await? {
            return Ok(false);
        }
        self.rows_read += 1;
        Ok(true)
    }

    pub async fn next_row(&mut self) -> Result<Option<RawRow>> {
        if !self.advance().await? {
            return Ok(None);
        }

        Ok(Some(RawRow {
            row_number: self.rows_read,
            sku: field(&self.record, Some(self.columns.sku)),
            name: field(&self.record, self.columns.name),
            description: field(&self.record, self.columns.description),
            price: field(&self.record, self.columns.price),
        }))
    }

    /// Like [`next_row`](Self::next_row) but only decodes the SKU field.
    pub async fn next_sku(&mut self) -> Result<Option<String>> {
        if !self.advance().await? {
            return Ok(None);
        }
        Ok(Some(field(&self.record, Some(self.columns.sku))))
    }
}

/// Open a spooled CSV file from the start.
pub async fn open(path: &Path) -> Result<RowReader<tokio::fs::File>> {
    let file = tokio::fs::File::open(path).await?;
    let reader = RowReader::new(file).await?;

    let missing = reader.missing_columns();
    if !missing.is_empty() {
        warn!(
            path = %path.display(),
            columns = ?missing,
            "CSV header lacks optional columns, reading them as empty"
        );
    }

    Ok(reader)
}
