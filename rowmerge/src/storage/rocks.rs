//! RocksDB-backed row store with the row merge operator installed.
//!
//! Column families:
//! - `rows` — encoded row values; writers append fragments with `merge`,
//!   RocksDB folds them through [`RowValueMergeOperator`] on reads and
//!   compactions
//! - `meta` — the [`StoreManifest`] (bincode)
//!
//! ```text
//!  merge_fragment ──► operands ──┐
//!  put_row ─────────► base ──────┼──► get_row    (full merge, read time)
//!                                └──► compact    (full merge, persisted)
//!                     memtable flush / L0 ──► partial merge of operands
//! ```

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, CompactionDecision, DBCompressionType,
    DBWithThreadMode, MergeOperands, Options, SingleThreaded, WriteOptions,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::manifest::{StoreManifest, MANIFEST_KEY};
use crate::clock::{Clock, SystemClock};
use crate::codec::{self, FORMAT_VERSION};
use crate::error::MergeError;
use crate::gc;
use crate::merge::{self, MergeMode};
use crate::operator::{
    MergeConfig, MergeOperator, RowValueMergeOperator, DEFAULT_GC_GRACE_PERIOD_SECONDS,
};
use crate::row::{Column, RowValue};

/// Column family names.
const CF_ROWS: &str = "rows";
const CF_META: &str = "meta";

/// All column family names for initialization.
const COLUMN_FAMILIES: &[&str] = &[CF_ROWS, CF_META];

const EMPTY_ROW_FILTER: &str = "EmptyRowFilter";

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Seconds before a tombstone may be collected (default: 10 days)
    pub gc_grace_period_seconds: u64,
    /// Block cache size in bytes (default: 256MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 512)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 64MB)
    pub write_buffer_size: usize,
    /// Remove base values holding only expired tombstones during compaction
    pub drop_empty_rows: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("rowmerge_data"),
            gc_grace_period_seconds: DEFAULT_GC_GRACE_PERIOD_SECONDS,
            block_cache_size: 256 * 1024 * 1024, // 256MB
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 512,
            write_buffer_size: 64 * 1024 * 1024, // 64MB
            drop_empty_rows: true,
        }
    }
}

impl StoreConfig {
    /// Create config for testing (small caches).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gc_grace_period_seconds: DEFAULT_GC_GRACE_PERIOD_SECONDS,
            block_cache_size: 8 * 1024 * 1024, // 8MB
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024, // 4MB
            drop_empty_rows: true,
        }
    }

    pub fn merge_config(&self) -> MergeConfig {
        MergeConfig::with_grace_period(self.gc_grace_period_seconds)
    }
}

/// Storage errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// RocksDB internal error, including merges the operator refused
    #[error("Database error: {0}")]
    Database(#[from] rocksdb::Error),
    /// A stored or supplied row could not be encoded or decoded
    #[error("Row error: {0}")]
    Merge(#[from] MergeError),
    /// Manifest could not be read or written
    #[error("Manifest error: {0}")]
    Manifest(String),
    /// Store was written by an incompatible row format
    #[error("Incompatible row format: store has version {found}, expected {expected}")]
    IncompatibleFormat { found: u8, expected: u8 },
    /// Column family missing from an opened database
    #[error("Column family '{0}' not found")]
    ColumnFamilyMissing(&'static str),
}

/// Register `operator` as the merge operator of `opts`.
///
/// A failed merge is reported to RocksDB as `None`, which surfaces as an
/// error from the read or compaction that triggered it.
pub fn install_merge_operator(opts: &mut Options, operator: Arc<dyn MergeOperator>) {
    let full = Arc::clone(&operator);
    let partial = Arc::clone(&operator);
    opts.set_merge_operator(
        operator.name(),
        move |_key: &[u8], existing: Option<&[u8]>, operands: &MergeOperands| {
            let operands: Vec<&[u8]> = operands.iter().collect();
            let mut out = Vec::new();
            full.full_merge(existing, &operands, &mut out).ok()?;
            Some(out)
        },
        move |_key: &[u8], _existing: Option<&[u8]>, operands: &MergeOperands| {
            let operands: Vec<&[u8]> = operands.iter().collect();
            let mut out = Vec::new();
            partial.partial_merge(&operands, &mut out).ok()?;
            Some(out)
        },
    );
}

/// Compaction filter removing base values that hold nothing but expired
/// tombstones. RocksDB turns a removal into a delete marker, so older
/// versions of the key stay hidden.
fn empty_row_filter(
    gc_grace_period_seconds: u64,
    clock: Arc<dyn Clock>,
) -> impl FnMut(u32, &[u8], &[u8]) -> CompactionDecision + Send + 'static {
    move |_level: u32, _key: &[u8], value: &[u8]| {
        let expired = codec::decode(value)
            .map(|row| {
                gc::remove_tombstones(row, gc_grace_period_seconds, clock.now_seconds()).is_empty()
            })
            .unwrap_or(false);
        if expired {
            CompactionDecision::Remove
        } else {
            CompactionDecision::Keep
        }
    }
}

/// RocksDB-backed store of reconciled rows.
///
/// Every write is a fragment; RocksDB defers reconciliation to reads and
/// compactions, where the row merge operator applies last-write-wins,
/// row-tombstone shadowing and tombstone collection.
pub struct RowStore {
    /// RocksDB instance
    db: DBWithThreadMode<SingleThreaded>,
    /// Store configuration
    config: StoreConfig,
    /// Clock shared with the merge operator
    clock: Arc<dyn Clock>,
    /// Manifest as of open
    manifest: StoreManifest,
}

impl RowStore {
    /// Open the row store at the configured path, using the system clock.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open the row store with an explicit clock for deletion times and
    /// tombstone expiry.
    pub fn open_with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let operator: Arc<dyn MergeOperator> = Arc::new(RowValueMergeOperator::with_clock(
            config.merge_config(),
            Arc::clone(&clock),
        ));

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| {
                let cf_opts = Self::cf_options(name, &config, &operator, &clock);
                ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        let manifest = Self::load_or_init_manifest(&db, &config, clock.as_ref())?;
        log::info!(
            "Opened row store at {} (format v{}, gc grace {}s)",
            config.path.display(),
            manifest.format_version,
            manifest.gc_grace_period_seconds
        );

        Ok(Self {
            db,
            config,
            clock,
            manifest,
        })
    }

    /// Build column-family-specific options.
    fn cf_options(
        name: &str,
        config: &StoreConfig,
        operator: &Arc<dyn MergeOperator>,
        clock: &Arc<dyn Clock>,
    ) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024); // 16KB blocks
        opts.set_block_based_table_factory(&block_opts);

        opts.set_compression_type(DBCompressionType::Lz4);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_ROWS => {
                // Many small merge operands per key
                opts.set_max_write_buffer_number(4);
                install_merge_operator(&mut opts, Arc::clone(operator));
                if config.drop_empty_rows {
                    opts.set_compaction_filter(
                        EMPTY_ROW_FILTER,
                        empty_row_filter(config.gc_grace_period_seconds, Arc::clone(clock)),
                    );
                }
            }
            CF_META => {
                opts.set_max_write_buffer_number(2);
                opts.set_compression_type(DBCompressionType::None);
            }
            _ => {}
        }

        opts
    }

    /// Read the manifest, creating it on first open.
    fn load_or_init_manifest(
        db: &DBWithThreadMode<SingleThreaded>,
        config: &StoreConfig,
        clock: &dyn Clock,
    ) -> Result<StoreManifest, StoreError> {
        let cf = db
            .cf_handle(CF_META)
            .ok_or(StoreError::ColumnFamilyMissing(CF_META))?;

        let manifest = match db.get_cf(&cf, MANIFEST_KEY)? {
            Some(bytes) => {
                let mut manifest = StoreManifest::decode(&bytes)?;
                if manifest.format_version != FORMAT_VERSION {
                    return Err(StoreError::IncompatibleFormat {
                        found: manifest.format_version,
                        expected: FORMAT_VERSION,
                    });
                }
                if manifest.gc_grace_period_seconds == config.gc_grace_period_seconds {
                    return Ok(manifest);
                }
                log::info!(
                    "gc grace period changed from {}s to {}s",
                    manifest.gc_grace_period_seconds,
                    config.gc_grace_period_seconds
                );
                manifest.gc_grace_period_seconds = config.gc_grace_period_seconds;
                manifest
            }
            None => StoreManifest::new(
                FORMAT_VERSION,
                config.gc_grace_period_seconds,
                clock.now_seconds(),
            ),
        };

        db.put_cf(&cf, MANIFEST_KEY, manifest.encode()?)?;
        Ok(manifest)
    }

    // ─── Writes ───────────────────────────────────────────────────────

    /// Overwrite the base value of `key` with `row`.
    ///
    /// The row is stored in full-merge form (shadowed columns and expired
    /// tombstones removed) since RocksDB returns a lone base value without
    /// calling the merge operator. Pending fragments written before the put
    /// are discarded by RocksDB.
    pub fn put_row(&self, key: &[u8], row: &RowValue) -> Result<(), StoreError> {
        let cf = self.cf(CF_ROWS)?;
        let merged = merge::merge(vec![row.clone()], MergeMode::Full).row;
        let merged = gc::remove_tombstones(
            merged,
            self.config.gc_grace_period_seconds,
            self.clock.now_seconds(),
        );
        let value = codec::encode_to_vec(&merged)?;
        self.db.put_cf_opt(&cf, key, value, &self.write_options())?;
        Ok(())
    }

    /// Append `fragment` as a merge operand for `key`.
    pub fn merge_fragment(&self, key: &[u8], fragment: &RowValue) -> Result<(), StoreError> {
        let cf = self.cf(CF_ROWS)?;
        let value = codec::encode_to_vec(fragment)?;
        self.db.merge_cf_opt(&cf, key, value, &self.write_options())?;
        Ok(())
    }

    /// Write column values at `timestamp`.
    pub fn write_columns<N, V>(
        &self,
        key: &[u8],
        timestamp: i64,
        columns: impl IntoIterator<Item = (N, V)>,
    ) -> Result<(), StoreError>
    where
        N: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        let fragment = columns
            .into_iter()
            .fold(RowValue::builder(), |b, (name, value)| b.value(name, timestamp, value))
            .build();
        self.merge_fragment(key, &fragment)
    }

    /// Delete columns at `timestamp`; the deletion time is taken from the
    /// store clock.
    pub fn delete_columns<N>(
        &self,
        key: &[u8],
        timestamp: i64,
        names: impl IntoIterator<Item = N>,
    ) -> Result<(), StoreError>
    where
        N: Into<Vec<u8>>,
    {
        let local_deletion_time = self.local_deletion_time();
        let fragment = names
            .into_iter()
            .fold(RowValue::builder(), |b, name| {
                b.column(name, Column::tombstone(timestamp, local_deletion_time))
            })
            .build();
        self.merge_fragment(key, &fragment)
    }

    /// Delete the whole row at `timestamp`.
    pub fn delete_row(&self, key: &[u8], timestamp: i64) -> Result<(), StoreError> {
        let fragment = RowValue::row_delete(timestamp, self.local_deletion_time());
        self.merge_fragment(key, &fragment)
    }

    // ─── Reads ────────────────────────────────────────────────────────

    /// Read the reconciled row for `key`.
    ///
    /// RocksDB runs a full merge over the base value and pending fragments;
    /// the result is not written back.
    pub fn get_row(&self, key: &[u8]) -> Result<Option<RowValue>, StoreError> {
        match self.get_raw(key)? {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Read the encoded row for `key`.
    pub fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let cf = self.cf(CF_ROWS)?;
        Ok(self.db.get_cf(&cf, key)?)
    }

    // ─── Maintenance ──────────────────────────────────────────────────

    /// Flush memtables and compact the whole row keyspace, persisting full
    /// merges and collecting expired tombstones.
    pub fn compact(&self) -> Result<(), StoreError> {
        let cf = self.cf(CF_ROWS)?;
        self.db.flush_cf(&cf)?;
        self.db.compact_range_cf(&cf, None::<&[u8]>, None::<&[u8]>);
        Ok(())
    }

    /// Flush the row memtable to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        let cf = self.cf(CF_ROWS)?;
        self.db.flush_cf(&cf)?;
        Ok(())
    }

    /// Get the database path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn manifest(&self) -> &StoreManifest {
        &self.manifest
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    /// Get a column family handle.
    fn cf(&self, name: &'static str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or(StoreError::ColumnFamilyMissing(name))
    }

    fn write_options(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }

    /// Current clock reading as a deletion time, saturating at `u32::MAX`.
    fn local_deletion_time(&self) -> u32 {
        u32::try_from(self.clock.now_seconds()).unwrap_or(u32::MAX)
    }
}

/// Get number of CPU cores for RocksDB parallelism.
fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}
