//! Merge engine: folds row fragments into one row.
//!
//! Every conflict is resolved from data carried by the fragments, never
//! from their position, so any permutation or grouping of the same
//! fragments produces the same row.
//!
//! Column precedence, highest first:
//! 1. greater `timestamp`
//! 2. on equal timestamps, `Tombstone` over `Value`
//! 3. on equal timestamps and variants (an inconsistent tie), the
//!    greater payload for values, the later `local_deletion_time` for
//!    tombstones
//!
//! Rule 3 only keeps replicas convergent; it does not pick a "correct"
//! value, since writers that reuse a timestamp for different data have
//! already lost the ordering information.

use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::row::{Column, RowTombstone, RowValue};

/// Which merge boundary is being computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Coalescing operands only. Columns are never shadowed because an
    /// older base value may still be merged in later.
    Partial,
    /// Producing the final value: columns not newer than the row
    /// tombstone are dropped.
    Full,
}

/// Result of one merge, with the number of inconsistent ties resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub row: RowValue,
    pub inconsistent_ties: usize,
}

/// Merge `fragments` into a single row.
///
/// Runs in one pass over all column entries; each entry is moved into the
/// result map at most once.
pub fn merge(fragments: Vec<RowValue>, mode: MergeMode) -> MergeOutcome {
    let mut row_tombstone = None;
    let mut columns: BTreeMap<Vec<u8>, Column> = BTreeMap::new();
    let mut inconsistent_ties = 0;

    for fragment in fragments {
        let (tombstone, fragment_columns) = fragment.into_parts();
        row_tombstone = newer_row_tombstone(row_tombstone, tombstone);
        for (name, column) in fragment_columns {
            if insert_column(&mut columns, name, column) {
                inconsistent_ties += 1;
            }
        }
    }

    if mode == MergeMode::Full {
        if let Some(tombstone) = row_tombstone {
            columns.retain(|_, column| column.timestamp() > tombstone.marked_for_delete_at);
        }
    }

    MergeOutcome {
        row: RowValue::new(row_tombstone, columns),
        inconsistent_ties,
    }
}

/// Reconcile `column` into `columns` under `name`.
///
/// Returns `true` when the two columns formed an inconsistent tie.
pub(crate) fn insert_column(
    columns: &mut BTreeMap<Vec<u8>, Column>,
    name: Vec<u8>,
    column: Column,
) -> bool {
    match columns.entry(name) {
        Entry::Vacant(slot) => {
            slot.insert(column);
            false
        }
        Entry::Occupied(mut slot) => {
            let tie = is_inconsistent_tie(slot.get(), &column);
            if precedence(&column, slot.get()) == Ordering::Greater {
                slot.insert(column);
            }
            tie
        }
    }
}

/// Total order deciding which column survives.
fn precedence(a: &Column, b: &Column) -> Ordering {
    a.timestamp()
        .cmp(&b.timestamp())
        .then_with(|| match (a, b) {
            (Column::Tombstone { .. }, Column::Value { .. }) => Ordering::Greater,
            (Column::Value { .. }, Column::Tombstone { .. }) => Ordering::Less,
            (Column::Value { value: va, .. }, Column::Value { value: vb, .. }) => va.cmp(vb),
            (
                Column::Tombstone {
                    local_deletion_time: la,
                    ..
                },
                Column::Tombstone {
                    local_deletion_time: lb,
                    ..
                },
            ) => la.cmp(lb),
        })
}

fn is_inconsistent_tie(a: &Column, b: &Column) -> bool {
    a.timestamp() == b.timestamp() && a.is_tombstone() == b.is_tombstone() && a != b
}

/// The row tombstone that wins between two candidates.
pub(crate) fn newer_row_tombstone(
    a: Option<RowTombstone>,
    b: Option<RowTombstone>,
) -> Option<RowTombstone> {
    match (a, b) {
        (Some(a), Some(b)) => {
            let a_key = (a.marked_for_delete_at, a.local_deletion_time);
            let b_key = (b.marked_for_delete_at, b.local_deletion_time);
            Some(if b_key > a_key { b } else { a })
        }
        (a, None) => a,
        (None, b) => b,
    }
}
