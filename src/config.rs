//! Tunables for the whole tracking chain, loadable from JSON.
//!
//! Every section falls back to its defaults for missing keys, so a config file
//! only needs to name what it changes.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub extractor: OrbConfig,
    pub matcher: MatcherConfig,
    pub estimator: EstimatorConfig,
    pub camera: CameraConfig,
    pub reference: ReferenceConfig,
}

/// Candidate source for the corner detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// Every pixel is a candidate, ranked by Harris response.
    #[default]
    Harris,
    /// FAST-9 segment test candidates, ranked by Harris response.
    Fast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbConfig {
    pub n_levels: usize,
    /// Downscale between consecutive pyramid levels.
    pub scale_factor: f32,
    /// Upper bound on features over all levels.
    pub max_features: usize,
    pub detector: DetectorKind,
    pub harris_k: f32,
    /// Minimum corner response relative to the strongest one on the level.
    pub quality_level: f32,
    pub fast_threshold: u8,
    /// Radius of the orientation and descriptor disc, in level pixels.
    pub patch_radius: f32,
    /// Blur applied before sampling descriptor tests.
    pub smoothing_sigma: f32,
}

impl Default for OrbConfig {
    fn default() -> Self {
        Self {
            n_levels: 4,
            scale_factor: std::f32::consts::SQRT_2,
            max_features: 500,
            detector: DetectorKind::Harris,
            harris_k: 0.04,
            quality_level: 0.01,
            fast_threshold: 20,
            patch_radius: 48.0,
            smoothing_sigma: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Lowe's ratio between the best and second best distance.
    pub ratio: f32,
    /// Largest accepted Hamming distance.
    pub max_distance: u32,
    /// Let each reference feature be claimed by at most one live feature.
    pub unique: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            ratio: 0.8,
            max_distance: 80,
            unique: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMethod {
    #[default]
    Ransac,
    Arrsac,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub method: ConsensusMethod,
    /// Inlier tolerance on the homography transfer error, in pixels.
    pub reprojection_threshold: f64,
    pub max_iterations: usize,
    pub confidence: f64,
    pub min_inliers: usize,
    pub min_inlier_ratio: f64,
    pub seed: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            method: ConsensusMethod::Ransac,
            reprojection_threshold: 3.0,
            max_iterations: 1000,
            confidence: 0.995,
            min_inliers: 10,
            min_inlier_ratio: 0.25,
            seed: 0x5eed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Focal length in pixels. Derived from the field of view when absent.
    pub focal_length_px: Option<f64>,
    pub horizontal_fov_deg: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            focal_length_px: None,
            horizontal_fov_deg: 60.0,
        }
    }
}

impl CameraConfig {
    /// Focal length for a frame of the given (upright) width.
    pub fn focal_length(&self, width: u32) -> f64 {
        match self.focal_length_px {
            Some(focal) => focal,
            None => {
                let half_fov = self.horizontal_fov_deg.to_radians() / 2.0;
                width as f64 / 2.0 / half_fov.tan()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    /// Physical width of the tracked surface. Translations come out in this unit.
    pub physical_width: f64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            physical_width: 1.0,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

impl TrackerConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let orb = &self.extractor;
        if orb.n_levels == 0 {
            return Err(invalid("extractor.n_levels", "at least one level is required"));
        }
        if !(orb.scale_factor > 1.0) {
            return Err(invalid("extractor.scale_factor", "must be greater than 1"));
        }
        if orb.max_features == 0 {
            return Err(invalid("extractor.max_features", "must be positive"));
        }
        if !(0.0..1.0).contains(&orb.quality_level) {
            return Err(invalid("extractor.quality_level", "must lie in [0, 1)"));
        }
        if !(orb.patch_radius >= 4.0) {
            return Err(invalid("extractor.patch_radius", "must be at least 4 pixels"));
        }
        if !(orb.smoothing_sigma > 0.0) {
            return Err(invalid("extractor.smoothing_sigma", "must be positive"));
        }

        let matcher = &self.matcher;
        if !(matcher.ratio > 0.0 && matcher.ratio <= 1.0) {
            return Err(invalid("matcher.ratio", "must lie in (0, 1]"));
        }

        let estimator = &self.estimator;
        if !(estimator.reprojection_threshold > 0.0) {
            return Err(invalid("estimator.reprojection_threshold", "must be positive"));
        }
        if estimator.max_iterations == 0 {
            return Err(invalid("estimator.max_iterations", "must be positive"));
        }
        if !(estimator.confidence > 0.0 && estimator.confidence < 1.0) {
            return Err(invalid("estimator.confidence", "must lie in (0, 1)"));
        }
        if !(0.0..=1.0).contains(&estimator.min_inlier_ratio) {
            return Err(invalid("estimator.min_inlier_ratio", "must lie in [0, 1]"));
        }

        let camera = &self.camera;
        if let Some(focal) = camera.focal_length_px {
            if !(focal > 0.0) {
                return Err(invalid("camera.focal_length_px", "must be positive"));
            }
        } else if !(camera.horizontal_fov_deg > 0.0 && camera.horizontal_fov_deg < 180.0) {
            return Err(invalid("camera.horizontal_fov_deg", "must lie in (0, 180)"));
        }

        if !(self.reference.physical_width > 0.0) {
            return Err(invalid("reference.physical_width", "must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(TrackerConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = TrackerConfig::from_json(
            r#"{ "matcher": { "ratio": 0.7 }, "extractor": { "detector": "fast" } }"#,
        )
        .unwrap();

        assert_eq!(config.matcher.ratio, 0.7);
        assert_eq!(config.matcher.max_distance, 80);
        assert_eq!(config.extractor.detector, DetectorKind::Fast);
        assert_eq!(config.extractor.n_levels, 4);
        assert_eq!(config.estimator, EstimatorConfig::default());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = TrackerConfig::from_json(r#"{ "matcher": { "ratio": 1.5 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "matcher.ratio", .. }));

        let err = TrackerConfig::from_json(r#"{ "extractor": { "scale_factor": 1.0 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "extractor.scale_factor", .. }));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = TrackerConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_a_file() {
        let path = std::env::temp_dir().join(format!("planar-tracker-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "reference": { "physical_width": 0.21 } }"#).unwrap();
        let loaded = TrackerConfig::load(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.unwrap().reference.physical_width, 0.21);
        assert!(matches!(
            TrackerConfig::load(std::env::temp_dir().join("planar-tracker-missing.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn focal_length_from_field_of_view() {
        let camera = CameraConfig {
            focal_length_px: None,
            horizontal_fov_deg: 90.0,
        };
        assert!((camera.focal_length(640) - 320.0).abs() < 1e-9);

        let fixed = CameraConfig {
            focal_length_px: Some(500.0),
            ..Default::default()
        };
        assert_eq!(fixed.focal_length(640), 500.0);
    }
}
