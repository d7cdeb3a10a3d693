// =============================================================================
// Feed Table — loosely-typed snapshot of the upstream indicator sheet
// =============================================================================
//
// The upstream feed is a spreadsheet export: a header row of column names and
// rows of string cells.  Nothing here assumes which columns are present;
// presence is checked later, per instrument.
//
// Numeric coercion is lenient: empty, non-numeric or non-finite cells become
// NaN (the missing sentinel) and are never treated as zero.
// =============================================================================

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

/// Name of the timestamp column in the feed.
pub const TIMESTAMP_COLUMN: &str = "Timestamp";

/// One snapshot of the feed: headers plus rows of raw cells.
#[derive(Debug, Clone, Default)]
pub struct FeedTable {
    headers: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl FeedTable {
    /// Build a table from headers and rows.  Short rows are padded with
    /// empty cells; extra cells are dropped.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let headers: Vec<String> = headers.into_iter().map(|h| h.trim().to_string()).collect();
        let width = headers.len();
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self {
            headers,
            index,
            rows,
        }
    }

    /// Parse CSV text with a header row.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .context("failed to read feed CSV header row")?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record.with_context(|| format!("malformed feed CSV record {}", line + 1))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        debug!(columns = headers.len(), rows = rows.len(), "feed CSV parsed");
        Ok(Self::new(headers, rows))
    }

    pub fn from_csv_str(text: &str) -> Result<Self> {
        Self::from_csv_reader(text.as_bytes())
    }

    /// Read a CSV snapshot from disk.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open feed snapshot {}", path.display()))?;
        Self::from_csv_reader(std::io::BufReader::new(file))
            .with_context(|| format!("failed to parse feed snapshot {}", path.display()))
    }

    /// Read a JSON snapshot from disk: an array of row objects.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read feed snapshot {}", path.display()))?;
        let records: Vec<Value> = serde_json::from_str(&content)
            .with_context(|| format!("feed snapshot {} is not a JSON array", path.display()))?;
        Ok(Self::from_json_records(&records))
    }

    /// Read a snapshot, choosing the format by file extension (`.json`,
    /// anything else is CSV).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_path(path)
        } else {
            Self::from_csv_path(path)
        }
    }

    /// Build a table from JSON objects (one per row).  The header set is the
    /// union of keys across rows.  Non-object rows are skipped.
    pub fn from_json_records(records: &[Value]) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for record in records {
            if let Some(obj) = record.as_object() {
                for key in obj.keys() {
                    if !headers.iter().any(|h| h == key) {
                        headers.push(key.clone());
                    }
                }
            }
        }

        let rows = records
            .iter()
            .filter_map(Value::as_object)
            .map(|obj| {
                headers
                    .iter()
                    .map(|h| match obj.get(h) {
                        Some(Value::String(s)) => s.clone(),
                        Some(Value::Null) | None => String::new(),
                        Some(other) => other.to_string(),
                    })
                    .collect()
            })
            .collect();

        Self::new(headers, rows)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Raw cell text, if the column exists.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let col = *self.index.get(column)?;
        self.rows.get(row).map(|r| r[col].as_str())
    }

    /// Numeric view of a column, or `None` if the column is absent.
    pub fn numeric_column(&self, column: &str) -> Option<Vec<f64>> {
        let col = *self.index.get(column)?;
        Some(self.rows.iter().map(|r| coerce_numeric(&r[col])).collect())
    }
}

/// Coerce a raw cell to a number; anything unusable becomes NaN.
pub fn coerce_numeric(cell: &str) -> f64 {
    let trimmed = cell.trim().trim_end_matches('%').replace(',', "");
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => f64::NAN,
    }
}
