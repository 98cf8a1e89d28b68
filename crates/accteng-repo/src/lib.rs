pub mod blockstore_adapter;
pub mod car;
pub mod operations;
#[cfg(test)]
mod test_support;

// Re-export key types for external consumers
pub use blockstore_adapter::{RepoStoreAdapter, cid_from_bytes, cid_to_bytes};
pub use car::{ImportOutcome, car_from_commit, export_full_car, generate_diff_car, import_car};
pub use operations::{
    BatchWrite, BatchWriteOutput, BatchWriteResult, MAX_BATCH_WRITES, RecordOutput,
    RecordWriteOutput, apply_writes, create_record, create_repo, delete_record, get_record,
    get_record_proof, list_collections, list_records, put_record,
};
