//! Merge operator adapter.
//!
//! The host storage engine sees only encoded bytes: an optional existing
//! value plus a list of operands. This module decodes them, runs the merge
//! engine (and the tombstone collector on full merges), and encodes the
//! result into a caller-owned buffer.
//!
//! ```text
//! full_merge:    Decoding → Merging(Full)    → Collecting → Encoding → Done
//! partial_merge: Decoding → Merging(Partial) ──────────────→ Encoding → Done
//!                    │
//!                    └── any decode error ──→ Failed (buffer untouched)
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::codec;
use crate::error::{MergeError, OperandIndex};
use crate::gc;
use crate::merge::{self, MergeMode};
use crate::row::RowValue;

/// Default grace period before tombstones may be collected: 10 days.
pub const DEFAULT_GC_GRACE_PERIOD_SECONDS: u64 = 10 * 24 * 60 * 60;

/// Merge operator configuration, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Seconds a tombstone must outlive before a full merge drops it.
    pub gc_grace_period_seconds: u64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            gc_grace_period_seconds: DEFAULT_GC_GRACE_PERIOD_SECONDS,
        }
    }
}

impl MergeConfig {
    pub fn with_grace_period(gc_grace_period_seconds: u64) -> Self {
        Self {
            gc_grace_period_seconds,
        }
    }
}

/// Capability a host storage engine needs from a merge operator.
///
/// On error, implementations must leave `out` exactly as they found it.
pub trait MergeOperator: Send + Sync {
    /// Stable name used by the host for registration and diagnostics.
    fn name(&self) -> &str;

    /// Reconcile an optional base value and all pending operands into the
    /// final persisted value.
    fn full_merge(
        &self,
        existing: Option<&[u8]>,
        operands: &[&[u8]],
        out: &mut Vec<u8>,
    ) -> Result<(), MergeError>;

    /// Coalesce operands without a base value; the result is itself an
    /// operand for a later merge.
    fn partial_merge(&self, operands: &[&[u8]], out: &mut Vec<u8>) -> Result<(), MergeError>;
}

/// Merge operator for encoded [`RowValue`]s.
pub struct RowValueMergeOperator {
    config: MergeConfig,
    clock: Arc<dyn Clock>,
}

impl RowValueMergeOperator {
    pub const NAME: &'static str = "RowValueMergeOperator";

    pub fn new(config: MergeConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Use `clock` as the notion of "now" for tombstone expiry.
    pub fn with_clock(config: MergeConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Decode every fragment up front; the first failure aborts the call.
    fn decode_all(
        existing: Option<&[u8]>,
        operands: &[&[u8]],
    ) -> Result<Vec<RowValue>, MergeError> {
        let mut rows = Vec::with_capacity(operands.len() + usize::from(existing.is_some()));
        if let Some(bytes) = existing {
            rows.push(codec::decode(bytes).map_err(|e| e.at_operand(OperandIndex::Existing))?);
        }
        for (i, bytes) in operands.iter().enumerate() {
            rows.push(codec::decode(bytes).map_err(|e| e.at_operand(OperandIndex::Operand(i)))?);
        }
        Ok(rows)
    }

    fn run(
        &self,
        existing: Option<&[u8]>,
        operands: &[&[u8]],
        mode: MergeMode,
        out: &mut Vec<u8>,
    ) -> Result<(), MergeError> {
        let fragments = Self::decode_all(existing, operands).inspect_err(|e| {
            log::warn!("{} {:?} merge failed: {e}", Self::NAME, mode);
        })?;
        let fragment_count = fragments.len();

        let outcome = merge::merge(fragments, mode);
        if outcome.inconsistent_ties > 0 {
            log::debug!(
                "{} resolved {} equal-timestamp conflicts across {fragment_count} fragments",
                Self::NAME,
                outcome.inconsistent_ties
            );
        }

        let merged = match mode {
            MergeMode::Full => gc::remove_tombstones(
                outcome.row,
                self.config.gc_grace_period_seconds,
                self.clock.now_seconds(),
            ),
            MergeMode::Partial => outcome.row,
        };

        codec::encode(&merged, out)
    }
}

impl MergeOperator for RowValueMergeOperator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn full_merge(
        &self,
        existing: Option<&[u8]>,
        operands: &[&[u8]],
        out: &mut Vec<u8>,
    ) -> Result<(), MergeError> {
        self.run(existing, operands, MergeMode::Full, out)
    }

    fn partial_merge(&self, operands: &[&[u8]], out: &mut Vec<u8>) -> Result<(), MergeError> {
        self.run(None, operands, MergeMode::Partial, out)
    }
}

impl std::fmt::Debug for RowValueMergeOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowValueMergeOperator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
