//! Watermark metadata: last-processed date and per-dimension sync times
//!
//! Two small JSON documents under `{root}/metadata`, each rewritten
//! atomically (tmp + rename) on every successful stage:
//!
//! - `etl_status.json`      `{last_processed_date, last_updated}`
//! - `dimension_sync.json`  `{dimension_name: iso_timestamp}`

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct EtlStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    last_processed_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_updated: Option<NaiveDateTime>,
}

/// Watermark store rooted at the metadata directory.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    dir: PathBuf,
}

impl WatermarkStore {
    pub fn new(metadata_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: metadata_dir.into(),
        }
    }

    fn status_file(&self) -> PathBuf {
        self.dir.join("etl_status.json")
    }

    fn dimension_file(&self) -> PathBuf {
        self.dir.join("dimension_sync.json")
    }

    /// Last successfully processed date, if any.
    ///
    /// A missing or corrupt file is not an error: the pipeline treats it as
    /// "no baseline" and the problem is logged as a warning.
    pub fn last_processed_date(&self) -> Option<NaiveDate> {
        read_json::<EtlStatus>(&self.status_file())?.last_processed_date
    }

    /// Advance the last-processed date. Called only after a date's final
    /// stage succeeds.
    pub fn set_last_processed_date(&self, date: NaiveDate) -> io::Result<()> {
        let mut status = read_json::<EtlStatus>(&self.status_file()).unwrap_or_default();
        status.last_processed_date = Some(date);
        status.last_updated = Some(chrono::Local::now().naive_local());
        write_json(&self.status_file(), &status)
    }

    pub fn dimension_last_sync(&self, dimension: &str) -> Option<NaiveDateTime> {
        read_json::<BTreeMap<String, NaiveDateTime>>(&self.dimension_file())?
            .get(dimension)
            .copied()
    }

    pub fn set_dimension_last_sync(
        &self,
        dimension: &str,
        sync_time: NaiveDateTime,
    ) -> io::Result<()> {
        let mut data =
            read_json::<BTreeMap<String, NaiveDateTime>>(&self.dimension_file()).unwrap_or_default();
        data.insert(dimension.to_string(), sync_time);
        write_json(&self.dimension_file(), &data)
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("Error reading metadata {}: {e}", path.display());
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("Error parsing metadata {}: {e}", path.display());
            None
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    let tmp = path.with_extension("json.tmp");
    let result = fs::write(&tmp, json).and_then(|()| fs::rename(&tmp, path));
    if result.is_err() && tmp.exists() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = WatermarkStore::new(dir.path());
        assert_eq!(store.last_processed_date(), None);
        assert_eq!(store.dimension_last_sync("products"), None);
    }

    #[test]
    fn last_processed_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = WatermarkStore::new(dir.path());
        store.set_last_processed_date(d("2025-03-15")).unwrap();
        assert_eq!(store.last_processed_date(), Some(d("2025-03-15")));

        store.set_last_processed_date(d("2025-03-16")).unwrap();
        assert_eq!(store.last_processed_date(), Some(d("2025-03-16")));
        assert!(!dir.path().join("etl_status.json.tmp").exists());
    }

    #[test]
    fn dimension_sync_independent_keys() {
        let dir = TempDir::new().unwrap();
        let store = WatermarkStore::new(dir.path());
        let t1: NaiveDateTime = "2025-03-15T02:00:00".parse().unwrap();
        let t2: NaiveDateTime = "2025-03-15T06:00:00".parse().unwrap();

        store.set_dimension_last_sync("products", t1).unwrap();
        store.set_dimension_last_sync("taxes", t2).unwrap();

        assert_eq!(store.dimension_last_sync("products"), Some(t1));
        assert_eq!(store.dimension_last_sync("taxes"), Some(t2));
        assert_eq!(store.dimension_last_sync("vendors"), None);
    }

    #[test]
    fn corrupt_file_degraded_to_none() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("etl_status.json"), b"{not json").unwrap();
        let store = WatermarkStore::new(dir.path());
        assert_eq!(store.last_processed_date(), None);
        // And a write recovers the file
        store.set_last_processed_date(d("2025-01-01")).unwrap();
        assert_eq!(store.last_processed_date(), Some(d("2025-01-01")));
    }
}
