//! Density-based clustering of pulse detections.
//!
//! A single astrophysical burst fires many adjacent trial-DM/time bins, so
//! raw detections arrive in dense clumps around each physical event. This
//! module labels every detection with a cluster id (or [`NOISE`]) using a
//! DBSCAN over the normalized (DM, time) plane:
//!
//! - `kiddo` KD-tree neighbor queries (via [`NeighborIndex`])
//! - `rayon` for parallel neighbor finding and core point identification
//! - Atomic union-find for lock-free cluster merging
//!
//! The parallel phases never touch shared mutable state beyond the
//! union-find, and label ids are assigned in a final sequential scan, so
//! the output labeling is deterministic for a fixed input and parameters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use rayon::prelude::*;
use thiserror::Error;

use crate::config::ClusteringConfig;
use crate::core::loaders::PeakStore;
use super::neighbors::NeighborIndex;

/// Label assigned to detections not density-reachable from any core point.
pub const NOISE: i32 = -1;

/// Invalid clustering parameters.
#[derive(Error, Debug)]
pub enum InvalidParameterError {
    #[error("eps must be positive and finite, got {0}")]
    Eps(f32),

    #[error("min_samples must be at least 1")]
    MinSamples,

    #[error("axis scale factors must be positive and finite (dm_scale={dm_scale}, time_scale={time_scale})")]
    Scaling { dm_scale: f32, time_scale: f32 },
}

/// Atomic union-find for lock-free parallel cluster merging.
///
/// Uses path compression with compare-and-swap updates, which is safe
/// because union-find only needs eventual consistency: every thread
/// converges to the same root set.
pub struct AtomicUnionFind {
    parent: Vec<AtomicUsize>,
}

impl AtomicUnionFind {
    /// Create a union-find where each element is its own parent.
    pub fn new(size: usize) -> Self {
        let parent = (0..size).map(AtomicUsize::new).collect();
        Self { parent }
    }

    /// Find the root of the set containing `x`, compressing paths as it goes.
    #[inline]
    pub fn find(&self, mut x: usize) -> usize {
        loop {
            let p = self.parent[x].load(Ordering::Relaxed);
            if p == x {
                return x;
            }
            let gp = self.parent[p].load(Ordering::Relaxed);
            if gp != p {
                // Point x at its grandparent; losing the race is harmless.
                let _ = self.parent[x].compare_exchange_weak(
                    p,
                    gp,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                );
            }
            x = p;
        }
    }

    /// Union the sets containing `x` and `y`. Returns true if a merge
    /// actually occurred.
    #[inline]
    pub fn union(&self, x: usize, y: usize) -> bool {
        loop {
            let root_x = self.find(x);
            let root_y = self.find(y);

            if root_x == root_y {
                return false;
            }

            // Smaller root points to larger root, for some balance without
            // explicit rank tracking.
            let (small, large) = if root_x < root_y {
                (root_x, root_y)
            } else {
                (root_y, root_x)
            };

            match self.parent[small].compare_exchange_weak(
                small,
                large,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }
}

/// DBSCAN over an already-built neighbor index.
///
/// A detection with at least `min_samples` neighbors within `eps` (itself
/// included) is a core point. Core points within `eps` of each other share
/// a cluster; non-core detections within `eps` of a core point join that
/// core point's cluster as border points; everything else is [`NOISE`].
///
/// # Determinism
///
/// Cluster ids are assigned in order of each cluster's lowest detection
/// index, and a border point reachable from several clusters joins the one
/// owned by its lowest-index core neighbor. Two runs over identical input
/// and parameters therefore produce identical label vectors, regardless of
/// thread scheduling.
///
/// # Errors
///
/// Returns [`InvalidParameterError`] if `eps` is not positive and finite
/// or `min_samples` is zero.
pub fn dbscan(
    index: &NeighborIndex,
    eps: f32,
    min_samples: usize,
) -> Result<Vec<i32>, InvalidParameterError> {
    if !(eps > 0.0) || !eps.is_finite() {
        return Err(InvalidParameterError::Eps(eps));
    }
    if min_samples == 0 {
        return Err(InvalidParameterError::MinSamples);
    }

    let n = index.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    // Phase 1: parallel neighbor finding. Each list includes the query
    // point itself and is sorted ascending by index.
    let neighbors: Vec<Vec<usize>> = (0..n)
        .into_par_iter()
        .map(|i| index.within(i, eps))
        .collect();

    // Phase 2: parallel core point identification.
    let is_core: Vec<bool> = neighbors
        .par_iter()
        .map(|neigh| neigh.len() >= min_samples)
        .collect();

    // Phase 3: lock-free merging of core points that neighbor each other.
    let uf = AtomicUnionFind::new(n);
    (0..n).into_par_iter().for_each(|i| {
        if is_core[i] {
            for &j in &neighbors[i] {
                if is_core[j] {
                    uf.union(i, j);
                }
            }
        }
    });

    // Phase 4: sequential label assignment. Scanning in input order maps
    // each union-find root to the id of its lowest-index member, which is
    // what makes the labeling independent of merge order.
    let mut root_to_cluster: HashMap<usize, i32> = HashMap::new();
    let mut next_cluster_id: i32 = 0;
    let mut labels = vec![NOISE; n];

    for i in 0..n {
        if is_core[i] {
            let root = uf.find(i);
            let id = *root_to_cluster.entry(root).or_insert_with(|| {
                let id = next_cluster_id;
                next_cluster_id += 1;
                id
            });
            labels[i] = id;
        }
    }

    // Border points join the cluster of their lowest-index core neighbor;
    // neighbor lists are sorted, so the first core hit wins.
    for i in 0..n {
        if !is_core[i] {
            for &j in &neighbors[i] {
                if is_core[j] {
                    labels[i] = root_to_cluster[&uf.find(j)];
                    break;
                }
            }
        }
    }

    let noise = labels.iter().filter(|&&l| l == NOISE).count();
    debug!(
        "dbscan: {} detections, {} clusters, {} noise",
        n, next_cluster_id, noise
    );

    Ok(labels)
}

/// Cluster an observation's detections under the given configuration.
///
/// Validates the axis scaling, builds the spatial index over the store's
/// (DM, time) columns, and runs [`dbscan`].
pub fn cluster_detections(
    store: &PeakStore,
    config: &ClusteringConfig,
) -> Result<Vec<i32>, InvalidParameterError> {
    if !config.scaling.is_valid() {
        return Err(InvalidParameterError::Scaling {
            dm_scale: config.scaling.dm_scale,
            time_scale: config.scaling.time_scale,
        });
    }

    let index = NeighborIndex::build(store.dm(), store.time(), &config.scaling);
    dbscan(&index, config.eps, config.min_samples)
}
