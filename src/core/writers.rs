//! Candidate table writer and reader.
//!
//! Candidates persist as a delimited table with a fixed column order:
//! `source_file, snr, time, width, dm, cluster_id, mask_reference,
//! merge_count`. Floats are written in shortest round-trip form, so a
//! read-back is bit-exact; a missing `mask_reference` stays an empty field.
//!
//! Writes are atomic per invocation: the full new table content is staged
//! in a temporary file in the target's directory and renamed over the
//! target. A failed write leaves the previous state untouched and no
//! partial file behind. Append mode unions passes into one growing table,
//! writing the header only when the target does not yet exist.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::processors::reduce::Candidate;

/// Column order of the candidate table.
pub const COLUMNS: [&str; 8] = [
    "source_file",
    "snr",
    "time",
    "width",
    "dm",
    "cluster_id",
    "mask_reference",
    "merge_count",
];

/// Errors raised while reading or writing a candidate table.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("IO error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("unexpected header in '{path}': expected {expected:?}, found {found:?}")]
    Header {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

/// Result type for table operations.
pub type Result<T> = std::result::Result<T, TableError>;

/// Whether a write replaces the target table or extends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendMode {
    /// Replace any existing table with exactly this candidate set.
    Truncate,
    /// Append rows after any existing ones, keeping prior rows byte-for-byte.
    Append,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> TableError {
    let path = path.to_path_buf();
    move |source| TableError::Io { path, source }
}

fn csv_err(path: &Path) -> impl FnOnce(csv::Error) -> TableError {
    let path = path.to_path_buf();
    move |source| TableError::Csv { path, source }
}

/// Serialize candidates (with header) into an in-memory CSV buffer.
fn serialize_rows(path: &Path, candidates: &[Candidate], header: bool) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(header)
        .from_writer(Vec::new());
    for candidate in candidates {
        writer.serialize(candidate).map_err(csv_err(path))?;
    }
    writer
        .into_inner()
        .map_err(|e| TableError::Io {
            path: path.to_path_buf(),
            source: e.into_error(),
        })
}

/// Write a candidate set to `path`.
///
/// In [`AppendMode::Append`] the existing table content (if any) is carried
/// over unchanged and the new rows follow it; the header is written only
/// when the target does not yet exist. In [`AppendMode::Truncate`] the
/// table is replaced outright.
///
/// Either the full batch lands or the previous state survives; mid-write
/// failure never leaves a partial table.
pub fn write_candidates(path: &Path, candidates: &[Candidate], mode: AppendMode) -> Result<()> {
    let exists = path.exists();
    let header = mode == AppendMode::Truncate || !exists;
    let rows = serialize_rows(path, candidates, header)?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(io_err(path))?;

    // Stage the complete new content next to the target, then rename over
    // it; the rename is what makes the batch all-or-nothing.
    let mut staged = NamedTempFile::new_in(&dir).map_err(io_err(path))?;
    if mode == AppendMode::Append && exists {
        let prior = fs::read(path).map_err(io_err(path))?;
        staged.write_all(&prior).map_err(io_err(path))?;
    }
    staged.write_all(&rows).map_err(io_err(path))?;
    staged.flush().map_err(io_err(path))?;
    staged.persist(path).map_err(|e| TableError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    debug!(
        "wrote {} candidate rows to {} ({:?})",
        candidates.len(),
        path.display(),
        mode
    );
    Ok(())
}

/// Read a candidate table back into memory.
///
/// # Errors
///
/// Returns [`TableError::Header`] if the column set does not match
/// [`COLUMNS`], and [`TableError::Csv`] for malformed rows.
pub fn read_candidates(path: &Path) -> Result<Vec<Candidate>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(csv_err(path))?;

    let found: Vec<String> = reader
        .headers()
        .map_err(csv_err(path))?
        .iter()
        .map(str::to_string)
        .collect();
    if found != COLUMNS {
        return Err(TableError::Header {
            path: path.to_path_buf(),
            expected: COLUMNS.iter().map(|s| s.to_string()).collect(),
            found,
        });
    }

    let mut candidates = Vec::new();
    for row in reader.deserialize() {
        let candidate: Candidate = row.map_err(csv_err(path))?;
        candidates.push(candidate);
    }
    Ok(candidates)
}

/// Dump the raw detections of a store as a `dm,time,snr,width` CSV.
///
/// Inspection aid written before clustering, mirroring the raw-candidates
/// dump the legacy pipeline kept beside its reduced table.
pub fn write_raw_peaks(path: &Path, store: &crate::core::loaders::PeakStore) -> Result<()> {
    let rows = {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["dm", "time", "snr", "width"])
            .map_err(csv_err(path))?;
        for i in 0..store.len() {
            writer
                .write_record(&[
                    store.dm()[i].to_string(),
                    store.time()[i].to_string(),
                    store.snr()[i].to_string(),
                    store.width()[i].to_string(),
                ])
                .map_err(csv_err(path))?;
        }
        writer.into_inner().map_err(|e| TableError::Io {
            path: path.to_path_buf(),
            source: e.into_error(),
        })?
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(io_err(path))?;

    let mut staged = NamedTempFile::new_in(&dir).map_err(io_err(path))?;
    staged.write_all(&rows).map_err(io_err(path))?;
    staged.flush().map_err(io_err(path))?;
    staged.persist(path).map_err(|e| TableError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
