//! Resumable, task-keyed result ledger.
//!
//! One JSONL file per worker shard; one line per task, carrying at least
//! `task_id`, `is_solved`, `source_codes` and `no_of_try`.

pub mod entry;
pub mod merge;
pub mod store;

pub use entry::{Attempt, LedgerEntry};
pub use merge::{merge_shards, merged_path, missing_ranges, shard_path, write_merged, MergeReport, Summary};
pub use store::ResultLedger;
