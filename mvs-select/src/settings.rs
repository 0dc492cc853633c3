#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// How the triangulation angles of shared tracks are turned into a pair score.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScoringPolicy {
    /// Count shared tracks, but only for pairs with enough tracks and a wide enough typical angle.
    AngleFilteredCount,
    /// Sum an asymmetric gaussian of the angle, peaked at the preferred angle.
    ContinuousKernel,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self::AngleFilteredCount
    }
}

/// The settings for view selection and range computation.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ViewSelectionSettings {
    /// The scoring policy
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub policy: ScoringPolicy,
    /// The number of neighbors selected for each view
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_neighbors"))]
    pub neighbors: usize,
    /// The minimum number of triangulation angles a pair needs for a nonzero count score
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_min_angle_samples")
    )]
    pub min_angle_samples: usize,
    /// The percentile (0 to 100) of a pair's triangulation angles compared against the minimum angle
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_angle_percentile")
    )]
    pub angle_percentile: f64,
    /// The minimum triangulation angle in degrees at `angle_percentile` for a nonzero count score
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_min_triangulation_angle")
    )]
    pub min_triangulation_angle: f64,
    /// The triangulation angle in degrees that scores highest with the kernel policy
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_kernel_center"))]
    pub kernel_center: f64,
    /// The kernel width in degrees for angles below `kernel_center`
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_kernel_sigma_below")
    )]
    pub kernel_sigma_below: f64,
    /// The kernel width in degrees for angles at or above `kernel_center`
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_kernel_sigma_above")
    )]
    pub kernel_sigma_above: f64,
    /// The maximum width of the pixel grid ranges are computed on, downscaling if needed
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub max_width: Option<u32>,
    /// The maximum height of the pixel grid ranges are computed on, downscaling if needed
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub max_height: Option<u32>,
}

impl Default for ViewSelectionSettings {
    fn default() -> Self {
        Self {
            policy: ScoringPolicy::default(),
            neighbors: default_neighbors(),
            min_angle_samples: default_min_angle_samples(),
            angle_percentile: default_angle_percentile(),
            min_triangulation_angle: default_min_triangulation_angle(),
            kernel_center: default_kernel_center(),
            kernel_sigma_below: default_kernel_sigma_below(),
            kernel_sigma_above: default_kernel_sigma_above(),
            max_width: None,
            max_height: None,
        }
    }
}

fn default_neighbors() -> usize {
    10
}

fn default_min_angle_samples() -> usize {
    100
}

fn default_angle_percentile() -> f64 {
    75.0
}

fn default_min_triangulation_angle() -> f64 {
    1.0
}

fn default_kernel_center() -> f64 {
    5.0
}

fn default_kernel_sigma_below() -> f64 {
    1.0
}

fn default_kernel_sigma_above() -> f64 {
    10.0
}
