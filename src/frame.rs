// =============================================================================
// Frame — aligned per-timestamp numeric table
// =============================================================================
//
// A Frame is an ordered timestamp axis plus named numeric columns that all
// share that axis.  Missing values are NaN.  Column absence is explicit:
// `column()` returns `None` rather than an all-NaN column, so callers can
// tell "not in the feed" apart from "in the feed but empty".
//
// Frames are rebuilt from scratch every refresh cycle and never mutated
// across cycles.
// =============================================================================

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Frame {
    timestamps: Vec<NaiveDateTime>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl Frame {
    /// Create an empty frame on the given axis.  Timestamps must already be
    /// in non-decreasing order.
    pub fn new(timestamps: Vec<NaiveDateTime>) -> Self {
        debug_assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
        Self {
            timestamps,
            columns: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Insert or replace a column.  Fails if the column is not aligned with
    /// the timestamp axis.
    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.timestamps.len() {
            bail!(
                "column '{}' has {} values but the frame has {} timestamps",
                name,
                values.len(),
                self.timestamps.len()
            );
        }
        self.columns.insert(name, values);
        Ok(())
    }

    /// Copy the named columns that are present into a new frame on the same
    /// axis.  Absent names are skipped.
    pub fn select<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Frame {
        let mut out = Frame::new(self.timestamps.clone());
        for name in names {
            if let Some(values) = self.columns.get(name) {
                out.columns.insert(name.to_string(), values.clone());
            }
        }
        out
    }

    /// Consume the frame, yielding its columns.
    pub fn into_columns(self) -> BTreeMap<String, Vec<f64>> {
        self.columns
    }
}
