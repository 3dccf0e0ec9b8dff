//! Candidate-reduction stage for single-pulse radio transient searches.
//!
//! This crate collapses near-duplicate pulse detections, caused by the
//! same astrophysical burst triggering many adjacent trial-DM/time bins,
//! into one representative candidate per physical event:
//!
//! - Loading binary peak dumps of `(dm, time, snr, width)` detections
//! - KD-tree neighbor queries over the normalized (DM, time) plane
//! - DBSCAN labeling of detections (parallelized)
//! - Max-SNR representative selection per cluster
//! - Append-capable candidate tables for downstream classification
//!
//! # Example
//!
//! ```no_run
//! use pulse_reduce::config::ClusteringConfig;
//! use pulse_reduce::core::loaders::PeakStore;
//! use pulse_reduce::processors::{cluster_detections, reduce, NoisePolicy};
//!
//! let store = PeakStore::from_file("global_peaks.dat", "obs.fil").unwrap();
//! let labels = cluster_detections(&store, &ClusteringConfig::default()).unwrap();
//! let candidates = reduce(&store, &labels, NoisePolicy::Collapse).unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{ClusteringConfig, PipelineConfig, ReductionConfig};
pub use core::loaders::PeakStore;
pub use processors::{Candidate, NoisePolicy, NOISE};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
