//! Margo Core - Storage and infrastructure for the retail-ops data lake
//!
//! This crate provides the partitioned parquet store, the watermark
//! metadata store, and the shared infrastructure (retry, caching,
//! shutdown) used by the extraction and attribution pipelines.

pub mod cache;
pub mod column;
pub mod dimension;
pub mod partition;
pub mod retry;
pub mod shutdown;
pub mod sink;
pub mod watermark;

// Re-exports for convenience
pub use cache::{Cache, MemoryCache};
pub use dimension::{merge_dimension, replace_dimension};
pub use partition::LakeLayout;
pub use retry::{MAX_RETRIES, Retryable, backoff_duration, retry_with_backoff};
pub use shutdown::{is_shutdown_requested, request_shutdown, shutdown_flag};
pub use sink::{ParquetSink, cleanup_tmp_files, is_valid_parquet, read_batches, write_batch};
pub use watermark::WatermarkStore;
