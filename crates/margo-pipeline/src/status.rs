//! Partition and dimension inventory for operator tooling

use chrono::NaiveDate;

use margo_core::sink::count_rows;
use margo_core::LakeLayout;
use margo_extract::dimensions::Dimension;

use crate::dataset::Dataset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    Missing,
    Empty,
    Ok(usize),
}

impl PartitionState {
    fn of(path: &std::path::Path) -> Self {
        if !path.exists() {
            return Self::Missing;
        }
        match count_rows(path) {
            0 => Self::Empty,
            n => Self::Ok(n),
        }
    }

    pub fn describe(self) -> String {
        match self {
            Self::Missing => "missing".to_string(),
            Self::Empty => "empty".to_string(),
            Self::Ok(n) => format!("{n} rows"),
        }
    }
}

#[derive(Debug)]
pub struct DatasetStatus {
    pub dataset: Dataset,
    pub date: NaiveDate,
    pub raw: PartitionState,
    pub clean: PartitionState,
    pub fact: PartitionState,
}

pub fn dataset_status(layout: &LakeLayout, dataset: Dataset, date: NaiveDate) -> DatasetStatus {
    let spec = dataset.spec();
    DatasetStatus {
        dataset,
        date,
        raw: PartitionState::of(&layout.raw_file(spec.dataset, date)),
        clean: PartitionState::of(&layout.clean_file(spec.dataset, date)),
        fact: PartitionState::of(&layout.fact_file(spec.fact, date)),
    }
}

/// Raw/clean/fact state for every dataset on one date.
pub fn scan(layout: &LakeLayout, date: NaiveDate) -> Vec<DatasetStatus> {
    Dataset::ALL
        .into_iter()
        .map(|dataset| dataset_status(layout, dataset, date))
        .collect()
}

#[derive(Debug)]
pub struct DimensionStatus {
    pub name: &'static str,
    pub state: PartitionState,
}

/// Existence and row counts of the dimension files.
pub fn dimension_inventory(layout: &LakeLayout) -> Vec<DimensionStatus> {
    Dimension::ALL
        .into_iter()
        .map(|dim| DimensionStatus {
            name: dim.name(),
            state: PartitionState::of(&layout.dimension_file(dim.name())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_partitions_report_missing() {
        let dir = TempDir::new().unwrap();
        let layout = LakeLayout::new(dir.path());
        let date: NaiveDate = "2025-03-15".parse().unwrap();

        let statuses = scan(&layout, date);
        assert_eq!(statuses.len(), 5);
        assert!(statuses.iter().all(|s| s.raw == PartitionState::Missing));

        let dims = dimension_inventory(&layout);
        assert_eq!(dims.len(), 4);
        assert!(dims.iter().all(|d| d.state == PartitionState::Missing));
    }
}
