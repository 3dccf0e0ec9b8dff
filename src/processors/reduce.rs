//! Reduction of labeled detections into one candidate per cluster.
//!
//! After clustering, every label group collapses to the single detection
//! with the highest SNR; that representative becomes the candidate handed
//! to downstream feature extraction and classification.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::loaders::PeakStore;
use super::clustering::NOISE;

/// The store handed to the reducer contained no detections.
#[derive(Error, Debug)]
#[error("no detections to reduce")]
pub struct EmptyInputError;

/// How noise-labeled detections are reduced.
///
/// The legacy pipeline collapses all noise detections into one
/// representative, which can swallow real but sparse bursts; `PerPoint`
/// instead emits one candidate per individual noise detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoisePolicy {
    /// All noise detections form one pseudo-cluster (legacy behavior).
    #[default]
    Collapse,
    /// Each noise detection becomes its own candidate.
    PerPoint,
}

/// One deduplicated candidate, the unit passed downstream.
///
/// Field order matches the candidate table's column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Provenance of the representative detection.
    pub source_file: String,
    /// Signal-to-noise ratio of the representative.
    pub snr: f32,
    /// Arrival time of the representative, seconds since observation start.
    pub time: f32,
    /// Pulse width of the representative, in time-bin units.
    pub width: u32,
    /// Dispersion measure of the representative, pc cm^-3.
    pub dm: f32,
    /// Cluster label the representative was reduced from; noise rows carry
    /// [`NOISE`]. Callers needing the legacy constant-zero field must zero
    /// it at the boundary, not here.
    pub cluster_id: i32,
    /// Externally-maintained channel mask, if any.
    pub mask_reference: Option<String>,
    /// Number of source inputs folded into this candidate.
    pub merge_count: u32,
}

/// Reduce labeled detections to one candidate per label group.
///
/// Groups are emitted in ascending label order (the noise group first when
/// present). Within a group the representative is the detection with
/// maximum SNR; exact SNR ties break to the earliest arrival time, then to
/// the lowest input index, so reduction is deterministic.
///
/// `labels` must have one entry per detection in `store`.
///
/// # Errors
///
/// Returns [`EmptyInputError`] if the store is empty.
pub fn reduce(
    store: &PeakStore,
    labels: &[i32],
    noise_policy: NoisePolicy,
) -> Result<Vec<Candidate>, EmptyInputError> {
    if store.is_empty() {
        return Err(EmptyInputError);
    }
    assert_eq!(
        labels.len(),
        store.len(),
        "label count must match detection count"
    );

    // BTreeMap keeps groups in ascending label order: noise (-1) first,
    // then cluster ids, matching the sorted-unique traversal of the
    // legacy reducer.
    let mut groups: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        groups.entry(label).or_default().push(i);
    }

    let mut candidates = Vec::with_capacity(groups.len());
    for (label, members) in &groups {
        if *label == NOISE && noise_policy == NoisePolicy::PerPoint {
            for &i in members {
                candidates.push(candidate_from(store, i, NOISE));
            }
        } else {
            let rep = select_representative(store, members);
            candidates.push(candidate_from(store, rep, *label));
        }
    }

    debug!(
        "reduced {} detections in {} groups to {} candidates",
        store.len(),
        groups.len(),
        candidates.len()
    );

    Ok(candidates)
}

/// Index of the group member with maximum SNR, ties broken by earliest
/// time, then by lowest input index.
fn select_representative(store: &PeakStore, members: &[usize]) -> usize {
    let snr = store.snr();
    let time = store.time();

    let mut best = members[0];
    for &i in &members[1..] {
        let better = snr[i] > snr[best] || (snr[i] == snr[best] && time[i] < time[best]);
        if better {
            best = i;
        }
    }
    best
}

fn candidate_from(store: &PeakStore, i: usize, label: i32) -> Candidate {
    Candidate {
        source_file: store.source_file().to_string(),
        snr: store.snr()[i],
        time: store.time()[i],
        width: store.width()[i],
        dm: store.dm()[i],
        cluster_id: label,
        mask_reference: None,
        merge_count: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(records: &[(f32, f32, f32, u32)]) -> PeakStore {
        PeakStore::from_columns(
            records.iter().map(|r| r.0).collect(),
            records.iter().map(|r| r.1).collect(),
            records.iter().map(|r| r.2).collect(),
            records.iter().map(|r| r.3).collect(),
            "obs.fil",
        )
    }

    #[test]
    fn test_max_snr_representative_per_group() {
        // (dm, time, snr, width)
        let store = store(&[
            (10.0, 0.0, 8.0, 2),
            (10.1, 0.01, 15.0, 2),
            (30.0, 5.0, 6.0, 4),
        ]);
        let labels = vec![0, 0, NOISE];

        let candidates = reduce(&store, &labels, NoisePolicy::Collapse).unwrap();
        assert_eq!(candidates.len(), 2);

        // Noise group first (label -1), then cluster 0.
        assert_eq!(candidates[0].cluster_id, NOISE);
        assert_eq!(candidates[0].snr, 6.0);
        assert_eq!(candidates[1].cluster_id, 0);
        assert_eq!(candidates[1].snr, 15.0);
        assert_eq!(candidates[1].dm, 10.1);
        assert_eq!(candidates[1].merge_count, 1);
        assert_eq!(candidates[1].source_file, "obs.fil");
        assert!(candidates[1].mask_reference.is_none());
    }

    #[test]
    fn test_snr_tie_breaks_to_earliest_time() {
        let store = store(&[(10.0, 2.0, 9.0, 1), (10.1, 1.0, 9.0, 1)]);
        let labels = vec![0, 0];

        let candidates = reduce(&store, &labels, NoisePolicy::Collapse).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].time, 1.0);
    }

    #[test]
    fn test_full_tie_breaks_to_input_order() {
        let store = store(&[(10.0, 1.0, 9.0, 1), (10.1, 1.0, 9.0, 2)]);
        let labels = vec![0, 0];

        let candidates = reduce(&store, &labels, NoisePolicy::Collapse).unwrap();
        assert_eq!(candidates[0].dm, 10.0);
        assert_eq!(candidates[0].width, 1);
    }

    #[test]
    fn test_noise_collapsed_to_one_candidate() {
        let store = store(&[(10.0, 0.0, 5.0, 1), (50.0, 3.0, 7.0, 1), (90.0, 8.0, 6.0, 1)]);
        let labels = vec![NOISE, NOISE, NOISE];

        let candidates = reduce(&store, &labels, NoisePolicy::Collapse).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].snr, 7.0);
    }

    #[test]
    fn test_per_point_noise_policy() {
        let store = store(&[(10.0, 0.0, 5.0, 1), (50.0, 3.0, 7.0, 1), (12.0, 0.1, 9.0, 1)]);
        let labels = vec![NOISE, NOISE, 0];

        let candidates = reduce(&store, &labels, NoisePolicy::PerPoint).unwrap();
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].snr, 5.0);
        assert_eq!(candidates[1].snr, 7.0);
        assert_eq!(candidates[0].cluster_id, NOISE);
        assert_eq!(candidates[2].cluster_id, 0);
    }

    #[test]
    fn test_candidate_count_equals_distinct_labels() {
        let store = store(&[
            (1.0, 0.0, 5.0, 1),
            (1.1, 0.1, 6.0, 1),
            (2.0, 1.0, 7.0, 1),
            (9.0, 4.0, 4.0, 1),
        ]);
        let labels = vec![0, 0, 1, NOISE];

        let candidates = reduce(&store, &labels, NoisePolicy::Collapse).unwrap();
        assert_eq!(candidates.len(), 3);

        let ids: Vec<i32> = candidates.iter().map(|c| c.cluster_id).collect();
        assert_eq!(ids, vec![NOISE, 0, 1]);
    }

    #[test]
    fn test_empty_store_rejected() {
        let store = PeakStore::from_columns(vec![], vec![], vec![], vec![], "obs.fil");
        assert!(reduce(&store, &[], NoisePolicy::Collapse).is_err());
    }
}
