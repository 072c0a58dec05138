//! Tombstone collection.
//!
//! A tombstone is collectable once `now - local_deletion_time` is strictly
//! greater than the grace period: at `T + g` it is retained, at
//! `T + g + 1` it is dropped. Only the full-merge path may collect, since
//! a partially merged operand can still meet older data the tombstone has
//! to suppress.

use std::collections::BTreeMap;

use crate::row::{Column, RowValue};

/// Whether a tombstone written at `local_deletion_time` has outlived the
/// grace period at `now_seconds`.
pub fn is_collectable(local_deletion_time: u32, gc_grace_period_seconds: u64, now_seconds: u64) -> bool {
    now_seconds.saturating_sub(u64::from(local_deletion_time)) > gc_grace_period_seconds
}

/// Drop the row tombstone and column tombstones older than the grace period.
///
/// Live columns are untouched. Applying this twice with the same arguments
/// yields the same row as applying it once.
pub fn remove_tombstones(row: RowValue, gc_grace_period_seconds: u64, now_seconds: u64) -> RowValue {
    let (row_tombstone, columns) = row.into_parts();

    let row_tombstone = row_tombstone.filter(|tombstone| {
        !is_collectable(tombstone.local_deletion_time, gc_grace_period_seconds, now_seconds)
    });

    let columns: BTreeMap<Vec<u8>, Column> = columns
        .into_iter()
        .filter(|(_, column)| match column {
            Column::Value { .. } => true,
            Column::Tombstone {
                local_deletion_time,
                ..
            } => !is_collectable(*local_deletion_time, gc_grace_period_seconds, now_seconds),
        })
        .collect();

    RowValue::new(row_tombstone, columns)
}
