//! Extraction adapters: one module per source dataset plus the dimension
//! refresh. Each dataset module owns its raw/clean/fact row types and arrow
//! schemas and exposes the same partition flow: `extract` from the source,
//! `save_raw` to the raw partition, `clean_partition` raw → clean,
//! `merge_fact` clean → fact.

pub mod dimensions;
pub mod inventory;
pub mod invoices;
pub mod pos;
pub mod stock;

pub use dimensions::Dimension;
pub use invoices::MoveKind;
