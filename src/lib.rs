//! # TabulaDB
//!
//! An embeddable, **columnar table store** with snapshot-isolated reads,
//! built on a log-structured merge-tree.  Writers append sorted runs of
//! keyed updates; a commit protocol publishes each batch as an immutable
//! snapshot; readers resolve a snapshot to its live file set and
//! merge-read those files into a deduplicated, key-ordered stream.
//!
//! ## Architecture
//!
//! ```text
//!  write path                      read path
//!  ─────────                      ─────────
//!  TableWriter                    ScanPlanner
//!     │ sorted runs                  │ snapshot → manifest list
//!     ▼                              │ → manifests (parallel read)
//!  SST files  + CommitIncrement      │ → ADD/DELETE fold → Plan
//!     │                              ▼
//!     ▼                          MergeReader
//!  Committer                        │ k-way merge + accumulator
//!     │ manifests → manifest        ▼
//!     │ list → snapshot-<id>     deduplicated key-ordered stream
//!     ▼
//!  snapshot/  manifest/  <k=v>/bucket-<n>/
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`table`] | Facade — open, write, commit, plan, read, compact |
//! | [`scan`] | Snapshot → live file set resolution with pruning |
//! | [`mergetree`] | K-way merge read with per-key accumulators |
//! | [`commit`] | Writer increments → published snapshots |
//! | [`manifest`] | ADD/DELETE event files and manifest lists |
//! | [`sstable`] | Immutable sorted runs of key/value records |
//! | [`snapshot`] | JSON snapshot documents |
//! | [`predicate`] | Filters with exact and stats-conservative evaluation |
//! | [`row`] | Typed row tuples and schemas |
//! | [`stats`] | Per-field min/max summaries for pruning |
//! | [`path`] | Storage path layout |
//! | [`pool`] | Shared I/O worker pool and cancellation |
//! | [`encoding`] | Deterministic binary wire format for metadata |
//!
//! ## Consistency model
//!
//! All on-disk artifacts are write-once and content-immutable.  Snapshot
//! ids are strictly monotonic; the manifest list of snapshot N replays to
//! the state of N−1 plus the newly committed events.  A plan is a
//! deterministic function of `(snapshot, filters)`, and no lock is ever
//! taken on the read path — writers coordinate only at commit time via
//! atomic snapshot publication.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tabuladb::mergetree::MergeEngine;
//! use tabuladb::row::{Datum, DatumKind, Row, RowField, RowType};
//! use tabuladb::scan::ScanRequest;
//! use tabuladb::table::{Table, TableConfig};
//!
//! let config = TableConfig {
//!     key_type: RowType::new(vec![RowField::new("id", DatumKind::Int)]),
//!     value_type: RowType::new(vec![RowField::new("count", DatumKind::Int)]),
//!     partition_type: RowType::empty(),
//!     merge_engine: MergeEngine::Deduplicate,
//!     manifest_target_size: 8 * 1024 * 1024,
//!     write_buffer_entries: 65536,
//!     io_threads: 4,
//! };
//! let table = Table::open("/tmp/events", config).unwrap();
//!
//! // Write and commit.
//! let mut write = table.new_write(Row::empty(), 0).unwrap();
//! write.put(Row::new(vec![Datum::Int(1)]), Row::new(vec![Datum::Int(10)])).unwrap();
//! let snapshot = table.commit(&[write.finish().unwrap()], "writer-1", "batch-1").unwrap();
//!
//! // Plan and read at that snapshot.
//! let plan = table
//!     .plan(&ScanRequest { snapshot_id: Some(snapshot.id), ..Default::default() })
//!     .unwrap();
//! for record in table.read_bucket(&plan, &Row::empty(), 0).unwrap() {
//!     println!("{:?}", record.unwrap());
//! }
//! ```

pub mod commit;
pub mod encoding;
pub mod manifest;
pub mod mergetree;
pub mod path;
pub mod pool;
pub mod predicate;
pub mod row;
pub mod scan;
pub mod snapshot;
pub mod sstable;
pub mod stats;
pub mod table;
