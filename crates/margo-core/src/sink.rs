//! Atomic parquet writes: tmp file, rename over the target on success

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::Schema;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

const ZSTD_LEVEL: i32 = 3;

/// Buffered parquet writer with atomic tmp→rename.
///
/// A partition is only ever replaced wholesale: the writer targets
/// `{path}.tmp` and renames over `{path}` on [`finalize`](Self::finalize).
/// Dropping the sink without finalizing removes the tmp file, leaving the
/// target in its last-good state.
pub struct ParquetSink {
    writer: Option<ArrowWriter<File>>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    row_count: usize,
}

impl std::fmt::Debug for ParquetSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetSink")
            .field("final_path", &self.final_path)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl ParquetSink {
    /// Create a new sink writing to a temporary file next to `path`.
    pub fn new(path: &Path, schema: &Schema) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = tmp_path_for(path);
        // Clean up stale tmp file
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let file = File::create(&tmp_path)?;
        let level = ZstdLevel::try_new(ZSTD_LEVEL)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(level))
            .build();

        let writer = ArrowWriter::try_new(file, Arc::new(schema.clone()), Some(props))
            .map_err(io::Error::other)?;

        Ok(Self {
            writer: Some(writer),
            tmp_path,
            final_path: path.to_path_buf(),
            row_count: 0,
        })
    }

    pub fn write_batch(&mut self, batch: &RecordBatch) -> io::Result<()> {
        self.row_count += batch.num_rows();
        self.writer
            .as_mut()
            .expect("writer present until finalize")
            .write(batch)
            .map_err(io::Error::other)
    }

    /// Flush the footer and atomically rename tmp → final.
    pub fn finalize(mut self) -> io::Result<usize> {
        let row_count = self.row_count;
        let writer = self.writer.take().expect("writer present until finalize");
        writer.close().map_err(io::Error::other)?;
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(row_count)
    }
}

impl Drop for ParquetSink {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            // Abandoned mid-write: discard the tmp file
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write a single batch as a complete partition file, atomically.
pub fn write_batch(batch: &RecordBatch, path: &Path) -> io::Result<usize> {
    let mut sink = ParquetSink::new(path, batch.schema_ref())?;
    sink.write_batch(batch)?;
    sink.finalize()
}

/// Read all record batches of a parquet file.
pub fn read_batches(path: &Path) -> io::Result<Vec<RecordBatch>> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(io::Error::other)?
        .build()
        .map_err(io::Error::other)?;
    reader
        .map(|b| b.map_err(io::Error::other))
        .collect::<io::Result<Vec<_>>>()
}

/// Total row count of a parquet file; 0 if the file is missing or unreadable.
pub fn count_rows(path: &Path) -> usize {
    let Ok(file) = File::open(path) else { return 0 };
    match ParquetRecordBatchReaderBuilder::try_new(file) {
        Ok(builder) => builder.metadata().file_metadata().num_rows().max(0) as usize,
        Err(_) => 0,
    }
}

/// Check that a completed parquet file exists and has a valid footer.
pub fn is_valid_parquet(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };
    parquet::file::reader::SerializedFileReader::new(file).is_ok()
}

/// Remove stale .tmp files left in a partition directory by a crashed writer.
pub fn cleanup_tmp_files(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field};
    use tempfile::TempDir;

    fn sample_batch() -> RecordBatch {
        let schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(Int64Array::from(vec![1, 2, 3]))],
        )
        .unwrap()
    }

    #[test]
    fn write_then_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("y=2025").join("part.parquet");

        let rows = write_batch(&sample_batch(), &path).unwrap();
        assert_eq!(rows, 3);
        assert!(path.exists());
        assert!(!path.with_file_name("part.parquet.tmp").exists());

        let batches = read_batches(&path).unwrap();
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 3);
        assert_eq!(count_rows(&path), 3);
    }

    #[test]
    fn rerun_replaces_partition() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("part.parquet");

        write_batch(&sample_batch(), &path).unwrap();

        let schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        let smaller = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(Int64Array::from(vec![9]))],
        )
        .unwrap();
        write_batch(&smaller, &path).unwrap();

        assert_eq!(count_rows(&path), 1);
    }

    #[test]
    fn abandoned_sink_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("part.parquet");
        write_batch(&sample_batch(), &path).unwrap();

        {
            let mut sink = ParquetSink::new(&path, sample_batch().schema_ref()).unwrap();
            sink.write_batch(&sample_batch()).unwrap();
            // Dropped without finalize — simulated mid-write failure
        }

        assert_eq!(count_rows(&path), 3);
        assert!(!path.with_file_name("part.parquet.tmp").exists());
    }

    #[test]
    fn is_valid_parquet_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.parquet");
        fs::write(&path, b"this is not parquet").unwrap();
        assert!(!is_valid_parquet(&path));
        assert!(!is_valid_parquet(&dir.path().join("missing.parquet")));
    }

    #[test]
    fn cleanup_tmp_files_removes_only_tmp() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.tmp"), b"stale").unwrap();
        fs::write(dir.path().join("b.parquet"), b"keep").unwrap();

        cleanup_tmp_files(dir.path()).unwrap();

        assert!(!dir.path().join("a.tmp").exists());
        assert!(dir.path().join("b.parquet").exists());
    }

    #[test]
    fn count_rows_missing_file_is_zero() {
        assert_eq!(count_rows(Path::new("/nonexistent/nope.parquet")), 0);
    }
}
