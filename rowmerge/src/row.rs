//! In-memory row model.
//!
//! A [`RowValue`] is the reconciled state of one partition key: an optional
//! row-level tombstone plus a map from column name to [`Column`]. Rows are
//! immutable once built; merging consumes fragments and yields a new row.
//!
//! ```text
//! RowValue
//! ├── row_tombstone: Option<RowTombstone { marked_for_delete_at, local_deletion_time }>
//! └── columns: BTreeMap<name, Column>
//!                 ├── Value     { timestamp, value }
//!                 └── Tombstone { timestamp, local_deletion_time }
//! ```

use std::collections::BTreeMap;

use crate::codec;
use crate::merge;

/// Row-level deletion marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowTombstone {
    /// Logical write time of the delete, ordered against column timestamps.
    pub marked_for_delete_at: i64,
    /// Wall-clock seconds of the delete, used only for grace-period expiry.
    pub local_deletion_time: u32,
}

impl RowTombstone {
    pub fn new(marked_for_delete_at: i64, local_deletion_time: u32) -> Self {
        Self {
            marked_for_delete_at,
            local_deletion_time,
        }
    }
}

/// State of a single column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Column {
    /// Live cell.
    Value { timestamp: i64, value: Vec<u8> },
    /// Column-level deletion marker.
    Tombstone {
        timestamp: i64,
        local_deletion_time: u32,
    },
}

impl Column {
    pub fn value(timestamp: i64, value: impl Into<Vec<u8>>) -> Self {
        Column::Value {
            timestamp,
            value: value.into(),
        }
    }

    pub fn tombstone(timestamp: i64, local_deletion_time: u32) -> Self {
        Column::Tombstone {
            timestamp,
            local_deletion_time,
        }
    }

    /// Logical write time, the sole authority for last-write-wins.
    pub fn timestamp(&self) -> i64 {
        match self {
            Column::Value { timestamp, .. } | Column::Tombstone { timestamp, .. } => *timestamp,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Column::Tombstone { .. })
    }

    /// Payload of a live column.
    pub fn as_value(&self) -> Option<&[u8]> {
        match self {
            Column::Value { value, .. } => Some(value),
            Column::Tombstone { .. } => None,
        }
    }
}

/// One partition's row: the unit of reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowValue {
    row_tombstone: Option<RowTombstone>,
    columns: BTreeMap<Vec<u8>, Column>,
}

impl RowValue {
    /// Build a row from parts that are already reconciled.
    pub fn new(row_tombstone: Option<RowTombstone>, columns: BTreeMap<Vec<u8>, Column>) -> Self {
        Self {
            row_tombstone,
            columns,
        }
    }

    /// A row with no tombstone and no columns.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> RowBuilder {
        RowBuilder::default()
    }

    /// A fragment carrying only a row delete.
    pub fn row_delete(marked_for_delete_at: i64, local_deletion_time: u32) -> Self {
        Self {
            row_tombstone: Some(RowTombstone::new(marked_for_delete_at, local_deletion_time)),
            columns: BTreeMap::new(),
        }
    }

    pub fn row_tombstone(&self) -> Option<&RowTombstone> {
        self.row_tombstone.as_ref()
    }

    pub fn columns(&self) -> &BTreeMap<Vec<u8>, Column> {
        &self.columns
    }

    pub fn column(&self, name: &[u8]) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Payload of a live column, `None` for absent or deleted columns.
    pub fn get(&self, name: &[u8]) -> Option<&[u8]> {
        self.column(name).and_then(Column::as_value)
    }

    /// Iterate live columns only.
    pub fn live_columns(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.columns
            .iter()
            .filter_map(|(name, col)| col.as_value().map(|v| (name.as_slice(), v)))
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// True when the row carries neither a row tombstone nor any column.
    pub fn is_empty(&self) -> bool {
        self.row_tombstone.is_none() && self.columns.is_empty()
    }

    /// Exact number of bytes the codec emits for this row.
    pub fn size(&self) -> usize {
        codec::serialized_size(self)
    }

    /// Fold fragments without shadowing or tombstone collection.
    ///
    /// The result is still an operand; see [`merge::merge`] for the full
    /// form and tie accounting.
    pub fn merge_partial(fragments: Vec<RowValue>) -> RowValue {
        merge::merge(fragments, merge::MergeMode::Partial).row
    }

    pub(crate) fn into_parts(self) -> (Option<RowTombstone>, BTreeMap<Vec<u8>, Column>) {
        (self.row_tombstone, self.columns)
    }
}

/// Incremental construction of a [`RowValue`].
///
/// Repeated names are reconciled with the merge rules, so the order of
/// builder calls never matters.
#[derive(Debug, Default)]
pub struct RowBuilder {
    row_tombstone: Option<RowTombstone>,
    columns: BTreeMap<Vec<u8>, Column>,
}

impl RowBuilder {
    pub fn value(self, name: impl Into<Vec<u8>>, timestamp: i64, value: impl Into<Vec<u8>>) -> Self {
        self.column(name, Column::value(timestamp, value))
    }

    pub fn tombstone(self, name: impl Into<Vec<u8>>, timestamp: i64, local_deletion_time: u32) -> Self {
        self.column(name, Column::tombstone(timestamp, local_deletion_time))
    }

    pub fn column(mut self, name: impl Into<Vec<u8>>, column: Column) -> Self {
        merge::insert_column(&mut self.columns, name.into(), column);
        self
    }

    pub fn row_tombstone(mut self, marked_for_delete_at: i64, local_deletion_time: u32) -> Self {
        let candidate = RowTombstone::new(marked_for_delete_at, local_deletion_time);
        self.row_tombstone = merge::newer_row_tombstone(self.row_tombstone, Some(candidate));
        self
    }

    pub fn build(self) -> RowValue {
        RowValue::new(self.row_tombstone, self.columns)
    }
}
