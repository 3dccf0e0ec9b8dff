//! Configuration types for the reduction pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::processors::neighbors::AxisScaling;
use crate::processors::reduce::NoisePolicy;

/// Configuration for the density clustering pass.
///
/// `eps` and `min_samples` are per-observation choices with no meaningful
/// universal default; the values here are only a starting point and are
/// validated again by the engine before every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Neighborhood radius in normalized (DM, time) units.
    #[serde(default = "default_eps")]
    pub eps: f32,

    /// Minimum neighborhood size (self included) for a core point.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Per-axis normalization applied before distance computation.
    #[serde(default)]
    pub scaling: AxisScaling,
}

fn default_eps() -> f32 {
    5.0
}

fn default_min_samples() -> usize {
    10
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            eps: default_eps(),
            min_samples: default_min_samples(),
            scaling: AxisScaling::default(),
        }
    }
}

/// Configuration for candidate reduction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReductionConfig {
    /// How noise-labeled detections are reduced.
    #[serde(default)]
    pub noise_policy: NoisePolicy,

    /// Zero the cluster_id column at the output boundary, reproducing the
    /// legacy pipeline's constant label field.
    #[serde(default)]
    pub zero_labels: bool,
}

/// Top-level pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub reduction: ReductionConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
