//! Processing stages: spatial indexing, clustering, and reduction.

pub mod clustering;
pub mod neighbors;
pub mod reduce;

pub use clustering::{cluster_detections, dbscan, NOISE};
pub use neighbors::NeighborIndex;
pub use reduce::{reduce, Candidate, NoisePolicy};
