//! RocksDB host integration for the row merge operator.
//!
//! Architecture:
//! ```text
//! ┌─────────────┐   merge / put    ┌──────────────────────────────────┐
//! │  RowStore   │ ───────────────► │ RocksDB                          │
//! │  (writers)  │                  │ CF "rows" — RowValueMergeOperator│
//! └─────────────┘                  │            + EmptyRowFilter      │
//!                                  │ CF "meta" — StoreManifest        │
//!                                  └──────────────────────────────────┘
//! ```
//!
//! Reads and compactions call the operator's full merge (with tombstone
//! collection); flushes and intermediate compactions may call its partial
//! merge.

pub mod manifest;
pub mod rocks;

pub use manifest::StoreManifest;
pub use rocks::{install_merge_operator, RowStore, StoreConfig, StoreError};
