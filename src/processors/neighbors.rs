//! Spatial index over the (DM, time) feature plane.
//!
//! DM and time live on very different numeric scales, so each axis is
//! divided by a configurable scale factor before indexing; `eps` is then
//! interpreted in normalized units. The index is a `kiddo` KD-tree built
//! once per observation and queried read-only from any number of threads.

use kiddo::{KdTree, SquaredEuclidean};
use serde::{Deserialize, Serialize};

/// Per-axis normalization applied before distance computation.
///
/// A scale of 1.0 on both axes leaves coordinates untouched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AxisScaling {
    /// Divisor applied to the DM axis.
    #[serde(default = "default_scale")]
    pub dm_scale: f32,

    /// Divisor applied to the time axis.
    #[serde(default = "default_scale")]
    pub time_scale: f32,
}

fn default_scale() -> f32 {
    1.0
}

impl Default for AxisScaling {
    fn default() -> Self {
        Self {
            dm_scale: default_scale(),
            time_scale: default_scale(),
        }
    }
}

impl AxisScaling {
    /// Returns true if both scale factors are positive and finite.
    pub fn is_valid(&self) -> bool {
        self.dm_scale > 0.0
            && self.time_scale > 0.0
            && self.dm_scale.is_finite()
            && self.time_scale.is_finite()
    }
}

/// KD-tree index answering "all detections within `eps`" queries over the
/// normalized (DM, time) plane.
///
/// Built on kiddo's mutable `KdTree`, which copes with any number of
/// detections sharing identical coordinates (re-detections in the same
/// trial bin are common in real dumps).
pub struct NeighborIndex {
    coords: Vec<[f32; 2]>,
    tree: KdTree<f32, 2>,
}

impl NeighborIndex {
    /// Build an index over the given detection columns.
    ///
    /// `dms` and `times` must have equal length. An empty input yields an
    /// index that answers no queries.
    pub fn build(dms: &[f32], times: &[f32], scaling: &AxisScaling) -> Self {
        debug_assert_eq!(dms.len(), times.len());

        let coords: Vec<[f32; 2]> = dms
            .iter()
            .zip(times.iter())
            .map(|(&dm, &t)| [dm / scaling.dm_scale, t / scaling.time_scale])
            .collect();

        let mut tree: KdTree<f32, 2> = KdTree::with_capacity(coords.len());
        for (i, coord) in coords.iter().enumerate() {
            tree.add(coord, i as u64);
        }

        Self { coords, tree }
    }

    /// Number of indexed detections.
    #[inline]
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// Returns true if no detections are indexed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// All detection indices within normalized distance `eps` of detection
    /// `i`, including `i` itself.
    ///
    /// Results are sorted ascending by index, so query output is
    /// deterministic regardless of tree layout. Distance is exact squared
    /// Euclidean compared against `eps * eps`, which makes neighborhoods
    /// symmetric: `j` appears in `within(i, eps)` iff `i` appears in
    /// `within(j, eps)`.
    pub fn within(&self, i: usize, eps: f32) -> Vec<usize> {
        // kiddo's within_unsorted is exclusive at the query radius; widen it
        // one ulp and filter back to <= so the eps boundary is inclusive.
        let eps_sq = eps * eps;
        let mut neighbors: Vec<usize> = self
            .tree
            .within_unsorted::<SquaredEuclidean>(&self.coords[i], eps_sq.next_up())
            .iter()
            .filter(|nn| nn.distance <= eps_sq)
            .map(|nn| nn.item as usize)
            .collect();
        neighbors.sort_unstable();
        neighbors
    }
}
