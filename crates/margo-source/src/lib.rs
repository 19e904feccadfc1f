//! Margo Source - Boundary to the upstream ERP
//!
//! Provides the [`SourceClient`] trait with its JSON-RPC implementation,
//! the record value model over the source's JSON conventions, and the
//! per-worker connection context with TTL-based reuse.

pub mod client;
pub mod context;
pub mod error;
pub mod memory;
pub mod record;
pub mod rpc;

pub use client::{Condition, Domain, SourceClient, day_window};
pub use context::{CONNECTION_TTL, ConnectionFactory, RpcConnectionFactory, WorkerContext};
pub use error::SourceError;
pub use memory::MemoryClient;
pub use record::{BATCH_SIZE, Record, batch_ids};
pub use rpc::{JsonRpcClient, SourceConfig};
