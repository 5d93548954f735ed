//! Fixed-stride series files.
//!
//! ```text
//! offset 0   magic   b"SRSv0001"
//! offset 8   width   u32 LE, values per record
//! offset 12  reserved u32
//! offset 16  record 0: width x f64 LE
//!            record 1 ...
//! ```
//!
//! Record `t` starts at `16 + t * width * 8`, so random access never scans.
//! Writers append whole records; a trailing partial record is never part of
//! the visible length.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::errors::{ModelError, ModelResult};
use crate::file_io::write_atomic;

pub(crate) const MAGIC: &[u8; 8] = b"SRSv0001";
pub(crate) const HEADER_LEN: u64 = 16;
const VALUE_LEN: u64 = 8;

fn io_error(operation: &str, path: &Path, e: std::io::Error) -> ModelError {
    ModelError::file_error(operation, path.display().to_string(), e.to_string())
}

fn header_bytes(width: u32) -> [u8; HEADER_LEN as usize] {
    let mut header = [0u8; HEADER_LEN as usize];
    header[..8].copy_from_slice(MAGIC);
    header[8..12].copy_from_slice(&width.to_le_bytes());
    header
}

/// Read and check the header of a series file, returning its width.
pub(crate) fn read_header(file: &mut File, run_id: &str, path: &Path) -> ModelResult<u32> {
    let mut header = [0u8; HEADER_LEN as usize];
    file.read_exact(&mut header)
        .map_err(|_| ModelError::corrupt_run(run_id, format!("{} has a truncated header", path.display())))?;
    if &header[..8] != MAGIC {
        return Err(ModelError::corrupt_run(run_id, format!("{} is not a series file", path.display())));
    }
    let width = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
    if width == 0 {
        return Err(ModelError::corrupt_run(run_id, format!("{} declares zero-width records", path.display())));
    }
    Ok(width)
}

fn stride(width: u32) -> u64 {
    u64::from(width) * VALUE_LEN
}

fn decode(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(VALUE_LEN as usize)
        .map(|chunk| {
            let mut value = [0u8; 8];
            value.copy_from_slice(chunk);
            f64::from_le_bytes(value)
        })
        .collect()
}

// ============================================================================
// Writing
// ============================================================================

/// Append handle for one series file.
#[derive(Debug)]
pub(crate) struct SeriesWriter {
    path: PathBuf,
    file: File,
    width: u32,
    len: u64,
}

impl SeriesWriter {
    /// Open `path` for appending, creating it with `width` if missing.
    ///
    /// An existing file keeps its width. A partially written trailing record
    /// left by an interrupted writer is truncated away.
    pub(crate) fn open(path: &Path, width: u32, run_id: &str) -> ModelResult<Self> {
        if !path.exists() {
            write_atomic(path, &header_bytes(width))?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| io_error("open series", path, e))?;
        let width = read_header(&mut file, run_id, path)?;

        let size = file.metadata().map_err(|e| io_error("stat series", path, e))?.len();
        let body = size.saturating_sub(HEADER_LEN);
        let len = body / stride(width);
        let tail = body % stride(width);
        if tail != 0 {
            warn!(path = %path.display(), bytes = tail, "truncating partial record");
            file.set_len(HEADER_LEN + len * stride(width))
                .map_err(|e| io_error("truncate series", path, e))?;
        }
        file.seek(SeekFrom::End(0)).map_err(|e| io_error("seek series", path, e))?;

        Ok(SeriesWriter {
            path: path.to_path_buf(),
            file,
            width,
            len,
        })
    }

    pub(crate) fn width(&self) -> u32 {
        self.width
    }

    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    /// Append one record. `values` must have exactly `width` entries.
    pub(crate) fn append(&mut self, values: &[f64], sync: bool) -> ModelResult<()> {
        if values.len() != self.width as usize {
            return Err(ModelError::invalid_input(
                "values",
                format!("{} values", values.len()),
                format!("series {} holds {} values per step", self.path.display(), self.width),
            ));
        }
        let mut record = Vec::with_capacity(values.len() * VALUE_LEN as usize);
        for value in values {
            record.extend_from_slice(&value.to_le_bytes());
        }
        self.file
            .write_all(&record)
            .map_err(|e| io_error("append series", &self.path, e))?;
        if sync {
            self.file.sync_data().map_err(|e| io_error("sync series", &self.path, e))?;
        }
        self.len += 1;
        Ok(())
    }
}

// ============================================================================
// Reading
// ============================================================================

/// Read-only view of one series.
///
/// The length is captured when the series is opened; records appended
/// afterwards become visible after [`Series::refresh`]. Nothing is read
/// until a record is requested.
#[derive(Debug, Clone)]
pub struct Series {
    run_id: String,
    path: PathBuf,
    width: u32,
    len: usize,
}

impl Series {
    pub(crate) fn open(path: &Path, run_id: &str) -> ModelResult<Self> {
        let mut file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ModelError::ResultsNotFound {
                run_id: run_id.to_string(),
                path: path.display().to_string(),
            },
            _ => io_error("open series", path, e),
        })?;
        let width = read_header(&mut file, run_id, path)?;
        let mut series = Series {
            run_id: run_id.to_string(),
            path: path.to_path_buf(),
            width,
            len: 0,
        };
        series.len = series.visible_len(&file)?;
        Ok(series)
    }

    fn visible_len(&self, file: &File) -> ModelResult<usize> {
        let size = file.metadata().map_err(|e| io_error("stat series", &self.path, e))?.len();
        Ok((size.saturating_sub(HEADER_LEN) / stride(self.width)) as usize)
    }

    /// Number of records in this view
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Values per record
    pub fn width(&self) -> usize {
        self.width as usize
    }

    /// Pick up records appended since the view was taken.
    pub fn refresh(&mut self) -> ModelResult<usize> {
        let file = File::open(&self.path).map_err(|e| io_error("open series", &self.path, e))?;
        self.len = self.visible_len(&file)?.max(self.len);
        Ok(self.len)
    }

    /// Record `step`, read directly at its offset.
    pub fn get(&self, step: usize) -> ModelResult<Vec<f64>> {
        if step >= self.len {
            return Err(ModelError::StepOutOfRange {
                run_id: self.run_id.clone(),
                step: step as u64,
                committed: self.len as u64,
            });
        }
        let mut file = File::open(&self.path).map_err(|e| io_error("open series", &self.path, e))?;
        file.seek(SeekFrom::Start(HEADER_LEN + step as u64 * stride(self.width)))
            .map_err(|e| io_error("seek series", &self.path, e))?;
        let mut bytes = vec![0u8; stride(self.width) as usize];
        file.read_exact(&mut bytes)
            .map_err(|_| ModelError::corrupt_run(&self.run_id, format!("{} shrank while reading", self.path.display())))?;
        Ok(decode(&bytes))
    }

    /// Iterate the records of this view from the start. Each call starts a
    /// fresh pass.
    pub fn iter(&self) -> SeriesIter {
        SeriesIter {
            series: self.clone(),
            reader: None,
            next: 0,
        }
    }

    /// Every record of this view, in order.
    pub fn to_vec(&self) -> ModelResult<Vec<Vec<f64>>> {
        self.iter().collect()
    }
}

impl IntoIterator for &Series {
    type Item = ModelResult<Vec<f64>>;
    type IntoIter = SeriesIter;

    fn into_iter(self) -> SeriesIter {
        self.iter()
    }
}

/// Sequential pass over a [`Series`]. Reads through a buffered handle
/// opened on first use.
#[derive(Debug)]
pub struct SeriesIter {
    series: Series,
    reader: Option<BufReader<File>>,
    next: usize,
}

impl SeriesIter {
    fn reader(&mut self) -> ModelResult<&mut BufReader<File>> {
        if self.reader.is_none() {
            let path = &self.series.path;
            let mut file = File::open(path).map_err(|e| io_error("open series", path, e))?;
            file.seek(SeekFrom::Start(HEADER_LEN)).map_err(|e| io_error("seek series", path, e))?;
            self.reader = Some(BufReader::new(file));
        }
        self.reader
            .as_mut()
            .ok_or_else(|| ModelError::Internal { message: "series reader missing".to_string() })
    }
}

impl Iterator for SeriesIter {
    type Item = ModelResult<Vec<f64>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.series.len {
            return None;
        }
        let size = stride(self.series.width) as usize;
        let run_id = self.series.run_id.clone();
        let path = self.series.path.display().to_string();
        let mut bytes = vec![0u8; size];
        let read = self.reader().and_then(|reader| {
            reader
                .read_exact(&mut bytes)
                .map_err(|_| ModelError::corrupt_run(run_id, format!("{path} shrank while reading")))
        });
        match read {
            Ok(()) => {
                self.next += 1;
                Some(Ok(decode(&bytes)))
            }
            Err(e) => {
                self.next = self.series.len;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.series.len - self.next;
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_random_access() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("disp.series");
        let mut writer = SeriesWriter::open(&path, 2, "run").unwrap();
        for step in 0..10 {
            writer.append(&[step as f64, -(step as f64)], false).unwrap();
        }

        let series = Series::open(&path, "run").unwrap();
        assert_eq!(series.len(), 10);
        assert_eq!(series.width(), 2);
        assert_eq!(series.get(7).unwrap(), vec![7.0, -7.0]);
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            HEADER_LEN + 10 * 16
        );
    }

    #[test]
    fn test_iteration_is_restartable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("force.series");
        let mut writer = SeriesWriter::open(&path, 1, "run").unwrap();
        for step in 0..5 {
            writer.append(&[step as f64], false).unwrap();
        }
        let series = Series::open(&path, "run").unwrap();
        let first: Vec<f64> = series.iter().map(|r| r.unwrap()[0]).collect();
        let second: Vec<f64> = (&series).into_iter().map(|r| r.unwrap()[0]).collect();
        assert_eq!(first, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(first, second);
        assert_eq!(series.iter().size_hint(), (5, Some(5)));
    }

    #[test]
    fn test_view_is_a_snapshot_until_refreshed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.series");
        let mut writer = SeriesWriter::open(&path, 1, "run").unwrap();
        writer.append(&[1.0], false).unwrap();

        let mut series = Series::open(&path, "run").unwrap();
        writer.append(&[2.0], false).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.iter().count(), 1);
        assert_eq!(series.refresh().unwrap(), 2);
        assert_eq!(series.get(1).unwrap(), vec![2.0]);
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let mut writer = SeriesWriter::open(&dir.path().join("s.series"), 3, "run").unwrap();
        let err = writer.append(&[1.0], false).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
        assert_eq!(writer.len(), 0);
    }

    #[test]
    fn test_partial_tail_is_hidden_and_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.series");
        let mut writer = SeriesWriter::open(&path, 1, "run").unwrap();
        writer.append(&[1.0], false).unwrap();
        writer.append(&[2.0], false).unwrap();
        drop(writer);

        // Simulate a crash halfway through the third record
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0xAB; 5]).unwrap();
        drop(file);

        assert_eq!(Series::open(&path, "run").unwrap().len(), 2);

        let mut writer = SeriesWriter::open(&path, 1, "run").unwrap();
        assert_eq!(writer.len(), 2);
        writer.append(&[3.0], false).unwrap();
        let series = Series::open(&path, "run").unwrap();
        assert_eq!(series.to_vec().unwrap(), vec![vec![1.0], vec![2.0], vec![3.0]]);
    }

    #[test]
    fn test_bad_magic_is_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.series");
        std::fs::write(&path, b"NOTASERIESFILE!!").unwrap();
        let err = Series::open(&path, "run-7").unwrap_err();
        assert_eq!(err.error_code(), "CORRUPT_RESULTS_STORE");
        assert!(err.to_string().contains("run-7"));
    }

    #[test]
    fn test_out_of_range_step() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.series");
        SeriesWriter::open(&path, 1, "run").unwrap();
        let err = Series::open(&path, "run").unwrap().get(0).unwrap_err();
        assert_eq!(
            err,
            ModelError::StepOutOfRange { run_id: "run".into(), step: 0, committed: 0 }
        );
    }
}
