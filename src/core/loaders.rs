//! Loader for raw single-pulse peak dumps.
//!
//! A peak dump is a flat binary stream of little-endian 32-bit float
//! quadruples, one `(dm, time, snr, width)` record per detected pulse.
//! The loader validates the stream and exposes the detections column-wise,
//! so downstream stages can borrow whole columns without copying.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

/// Bytes per on-disk detection record: four little-endian f32 fields.
pub const RECORD_SIZE: usize = 16;

/// Errors raised while loading a peak dump.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("IO error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("truncated peak dump '{path}': {len} bytes is not a multiple of the {record_size}-byte record size")]
    Truncated {
        path: PathBuf,
        len: usize,
        record_size: usize,
    },

    #[error("non-finite {field} value in record {record}")]
    NonFinite { field: &'static str, record: usize },

    #[error("negative width {value} in record {record}")]
    NegativeWidth { value: f32, record: usize },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, FormatError>;

/// Column-wise store of one observation's raw detections.
///
/// Detections are immutable once loaded; clustering and reduction only ever
/// annotate them with derived labels, never rewrite them. All four columns
/// have equal length.
#[derive(Debug, Clone)]
pub struct PeakStore {
    dm: Vec<f32>,
    time: Vec<f32>,
    snr: Vec<f32>,
    width: Vec<u32>,
    source_file: String,
}

impl PeakStore {
    /// Build a store directly from columns. Used by tests and by callers
    /// that already hold decoded detections.
    pub fn from_columns(
        dm: Vec<f32>,
        time: Vec<f32>,
        snr: Vec<f32>,
        width: Vec<u32>,
        source_file: impl Into<String>,
    ) -> Self {
        debug_assert!(dm.len() == time.len() && time.len() == snr.len() && snr.len() == width.len());
        Self {
            dm,
            time,
            snr,
            width,
            source_file: source_file.into(),
        }
    }

    /// Load a binary peak dump from disk.
    ///
    /// `source_file` is the provenance identifier propagated onto every
    /// candidate reduced from this store (typically the filterbank path the
    /// detections came from); it is not part of the clustering feature
    /// space.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Truncated`] if the byte length is not a
    /// multiple of [`RECORD_SIZE`], [`FormatError::NonFinite`] if any field
    /// is NaN or infinite, and [`FormatError::NegativeWidth`] for a
    /// negative width field.
    pub fn from_file<P: AsRef<Path>>(path: P, source_file: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| FormatError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let store = Self::from_bytes(&bytes, source_file).map_err(|e| match e {
            FormatError::Truncated {
                len, record_size, ..
            } => FormatError::Truncated {
                path: path.to_path_buf(),
                len,
                record_size,
            },
            other => other,
        })?;
        debug!("loaded {} detections from {}", store.len(), path.display());
        Ok(store)
    }

    /// Decode a peak dump from an in-memory byte buffer.
    pub fn from_bytes(bytes: &[u8], source_file: impl Into<String>) -> Result<Self> {
        if bytes.len() % RECORD_SIZE != 0 {
            return Err(FormatError::Truncated {
                path: PathBuf::new(),
                len: bytes.len(),
                record_size: RECORD_SIZE,
            });
        }

        let n = bytes.len() / RECORD_SIZE;
        let mut dm = Vec::with_capacity(n);
        let mut time = Vec::with_capacity(n);
        let mut snr = Vec::with_capacity(n);
        let mut width = Vec::with_capacity(n);

        for (record, chunk) in bytes.chunks_exact(RECORD_SIZE).enumerate() {
            let fields = [
                ("dm", f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])),
                ("time", f32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]])),
                ("snr", f32::from_le_bytes([chunk[8], chunk[9], chunk[10], chunk[11]])),
                ("width", f32::from_le_bytes([chunk[12], chunk[13], chunk[14], chunk[15]])),
            ];

            for &(field, value) in &fields {
                if !value.is_finite() {
                    return Err(FormatError::NonFinite { field, record });
                }
            }

            let w = fields[3].1;
            if w < 0.0 {
                return Err(FormatError::NegativeWidth { value: w, record });
            }

            dm.push(fields[0].1);
            time.push(fields[1].1);
            snr.push(fields[2].1);
            width.push(w.round() as u32);
        }

        Ok(Self {
            dm,
            time,
            snr,
            width,
            source_file: source_file.into(),
        })
    }

    /// Number of detections in the store.
    #[inline]
    pub fn len(&self) -> usize {
        self.dm.len()
    }

    /// Returns true if the store holds no detections.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dm.is_empty()
    }

    /// Dispersion measures (pc cm^-3), one per detection.
    #[inline]
    pub fn dm(&self) -> &[f32] {
        &self.dm
    }

    /// Arrival times in seconds since observation start.
    #[inline]
    pub fn time(&self) -> &[f32] {
        &self.time
    }

    /// Signal-to-noise ratios.
    #[inline]
    pub fn snr(&self) -> &[f32] {
        &self.snr
    }

    /// Pulse widths in time-bin units.
    #[inline]
    pub fn width(&self) -> &[u32] {
        &self.width
    }

    /// Provenance identifier for every detection in this store.
    #[inline]
    pub fn source_file(&self) -> &str {
        &self.source_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn encode(records: &[(f32, f32, f32, f32)]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(records.len() * RECORD_SIZE);
        for &(dm, time, snr, width) in records {
            bytes.extend_from_slice(&dm.to_le_bytes());
            bytes.extend_from_slice(&time.to_le_bytes());
            bytes.extend_from_slice(&snr.to_le_bytes());
            bytes.extend_from_slice(&width.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_from_bytes_columns() {
        let bytes = encode(&[(10.0, 0.5, 8.0, 2.0), (30.0, 5.0, 6.5, 4.0)]);
        let store = PeakStore::from_bytes(&bytes, "obs.fil").unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.dm(), &[10.0, 30.0]);
        assert_eq!(store.time(), &[0.5, 5.0]);
        assert_eq!(store.snr(), &[8.0, 6.5]);
        assert_eq!(store.width(), &[2, 4]);
        assert_eq!(store.source_file(), "obs.fil");
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&encode(&[(12.5, 1.0, 9.0, 1.0)])).unwrap();
        file.flush().unwrap();

        let store = PeakStore::from_file(file.path(), "obs.fil").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.dm()[0], 12.5);
    }

    #[test]
    fn test_truncated_dump_rejected() {
        let mut bytes = encode(&[(10.0, 0.5, 8.0, 2.0)]);
        bytes.pop();

        let err = PeakStore::from_bytes(&bytes, "obs.fil").unwrap_err();
        match err {
            FormatError::Truncated { len, record_size, .. } => {
                assert_eq!(len, 15);
                assert_eq!(record_size, RECORD_SIZE);
            }
            other => panic!("expected Truncated, got {other:?}"),
        }
    }

    #[test]
    fn test_non_finite_field_rejected() {
        let bytes = encode(&[(10.0, f32::NAN, 8.0, 2.0)]);

        let err = PeakStore::from_bytes(&bytes, "obs.fil").unwrap_err();
        match err {
            FormatError::NonFinite { field, record } => {
                assert_eq!(field, "time");
                assert_eq!(record, 0);
            }
            other => panic!("expected NonFinite, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_width_rejected() {
        let bytes = encode(&[(10.0, 0.5, 8.0, -1.0)]);

        let err = PeakStore::from_bytes(&bytes, "obs.fil").unwrap_err();
        assert!(matches!(err, FormatError::NegativeWidth { record: 0, .. }));
    }

    #[test]
    fn test_empty_dump_is_empty_store() {
        let store = PeakStore::from_bytes(&[], "obs.fil").unwrap();
        assert!(store.is_empty());
    }
}
