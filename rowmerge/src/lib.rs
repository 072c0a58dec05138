//! # rowmerge — Conflict resolution for column-oriented rows in RocksDB
//!
//! Writers append partial row updates (column writes, column deletes, row
//! deletes) as merge operands; RocksDB hands them to this crate at read and
//! compaction time to be folded into one canonical row.
//!
//! ## Architecture
//!
//! ```text
//!  encoded fragments
//!        │
//!        ▼
//! ┌─────────────┐   RowValue    ┌──────────────┐   RowValue   ┌──────────────┐
//! │ codec       │ ────────────► │ merge        │ ───────────► │ gc           │
//! │ (decode)    │               │ (LWW fold)   │  full only   │ (tombstones) │
//! └─────────────┘               └──────────────┘              └──────┬───────┘
//!        ▲                                                           │
//!        │              ┌──────────────────────┐                     │
//!        └───────────── │ operator             │ ◄───── encode ──────┘
//!                       │ (RocksDB callbacks)  │
//!                       └──────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`row`] — `RowValue`, `Column`, `RowTombstone`
//! - [`codec`] — Versioned binary format with exact `serialized_size`
//! - [`merge`] — Last-write-wins fold, delete-wins on ties, row tombstone shadowing
//! - [`gc`] — Grace-period tombstone collection
//! - [`clock`] — Injectable wall clock
//! - [`operator`] — Full/partial merge entry points for the host engine
//! - [`storage`] — RocksDB registration and a row store built on it

pub mod clock;
pub mod codec;
pub mod error;
pub mod gc;
pub mod merge;
pub mod operator;
pub mod row;
pub mod storage;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{MergeError, OperandIndex};
pub use merge::{merge, MergeMode, MergeOutcome};
pub use operator::{MergeConfig, MergeOperator, RowValueMergeOperator};
pub use row::{Column, RowBuilder, RowTombstone, RowValue};
pub use storage::{install_merge_operator, RowStore, StoreConfig, StoreError, StoreManifest};
