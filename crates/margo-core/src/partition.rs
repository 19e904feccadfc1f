//! Date-partition path convention and data-lake layout
//!
//! ```text
//! {root}/
//! ├── raw/{dataset}/year=YYYY/month=MM/day=DD/{dataset}_{date}.parquet
//! ├── clean/{dataset}/year=YYYY/month=MM/day=DD/{dataset}_clean_{date}.parquet
//! ├── star-schema/
//! │   ├── {fact}/year=YYYY/month=MM/day=DD/{fact}_{date}.parquet
//! │   └── dim_{name}.parquet
//! └── metadata/
//!     ├── etl_status.json
//!     └── dimension_sync.json
//! ```

use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};

/// Partition directory for a date under `base`: `year=YYYY/month=MM/day=DD`.
pub fn partition_dir(base: &Path, date: NaiveDate) -> PathBuf {
    base.join(format!("year={:04}", date.year()))
        .join(format!("month={:02}", date.month()))
        .join(format!("day={:02}", date.day()))
}

/// Full path of one date's partition file: `{dir}/{dataset}_{date}.parquet`.
pub fn partition_file(base: &Path, dataset: &str, date: NaiveDate) -> PathBuf {
    partition_dir(base, date).join(format!("{dataset}_{date}.parquet"))
}

/// Root directory layout of the data lake.
#[derive(Debug, Clone)]
pub struct LakeLayout {
    root: PathBuf,
}

impl LakeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_base(&self, dataset: &str) -> PathBuf {
        self.root.join("raw").join(dataset)
    }

    pub fn clean_base(&self, dataset: &str) -> PathBuf {
        self.root.join("clean").join(dataset)
    }

    pub fn star_schema(&self) -> PathBuf {
        self.root.join("star-schema")
    }

    pub fn fact_base(&self, fact: &str) -> PathBuf {
        self.star_schema().join(fact)
    }

    pub fn raw_file(&self, dataset: &str, date: NaiveDate) -> PathBuf {
        partition_file(&self.raw_base(dataset), dataset, date)
    }

    pub fn clean_file(&self, dataset: &str, date: NaiveDate) -> PathBuf {
        partition_file(
            &self.clean_base(dataset),
            &format!("{dataset}_clean"),
            date,
        )
    }

    pub fn fact_file(&self, fact: &str, date: NaiveDate) -> PathBuf {
        partition_file(&self.fact_base(fact), fact, date)
    }

    /// Single-file dimension table: `star-schema/dim_{name}.parquet`.
    pub fn dimension_file(&self, name: &str) -> PathBuf {
        self.star_schema().join(format!("dim_{name}.parquet"))
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join("metadata")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn partition_dir_zero_pads() {
        let dir = partition_dir(Path::new("/data/star-schema/fact_sales"), d("2025-03-15"));
        assert_eq!(
            dir,
            PathBuf::from("/data/star-schema/fact_sales/year=2025/month=03/day=15")
        );
    }

    #[test]
    fn partition_file_embeds_date() {
        let file = partition_file(Path::new("/lake/raw/pos_order_lines"), "pos_order_lines", d("2025-01-02"));
        assert_eq!(
            file,
            PathBuf::from(
                "/lake/raw/pos_order_lines/year=2025/month=01/day=02/pos_order_lines_2025-01-02.parquet"
            )
        );
    }

    #[test]
    fn layout_paths() {
        let layout = LakeLayout::new("/lake");
        assert_eq!(
            layout.clean_file("pos_order_lines", d("2025-03-15")),
            PathBuf::from(
                "/lake/clean/pos_order_lines/year=2025/month=03/day=15/pos_order_lines_clean_2025-03-15.parquet"
            )
        );
        assert_eq!(
            layout.dimension_file("products"),
            PathBuf::from("/lake/star-schema/dim_products.parquet")
        );
        assert_eq!(layout.metadata_dir(), PathBuf::from("/lake/metadata"));
    }
}
