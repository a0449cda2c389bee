use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use tracing::debug;

use crate::{
    algorithms::{
        camera::pose_from_plane_homography,
        consensus::fit_robust,
        homography::{HomographyEstimator, PointPair},
    },
    config::EstimatorConfig,
};
use sample_consensus::Estimator;

/// Camera pose relative to the reference plane.
///
/// A point `X` on the plane (metric, `Z = 0`, origin at the reference centre,
/// `x` right and `y` down like the image) lands in camera coordinates at
/// `rotation * X + translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl Pose {
    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_rotation_matrix(&self.rotation)
    }

    /// Axis-angle (Rodrigues) form of the rotation, as renderers usually take it.
    pub fn rotation_vector(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseStatus {
    Valid,
    /// Not enough correspondences to attempt a fit.
    InsufficientMatches,
    /// A fit was attempted but did not pass the plausibility checks.
    PoseRejected,
}

/// Outcome of one pose estimation. Carries a pose only when it is valid.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseResult {
    pub status: PoseStatus,
    pub pose: Option<Pose>,
    pub inliers: usize,
    pub correspondences: usize,
    pub mean_residual: Option<f64>,
    /// Reference pixels to live pixels, when a model was found.
    pub homography: Option<Matrix3<f64>>,
}

impl PoseResult {
    pub fn insufficient(correspondences: usize) -> Self {
        Self {
            status: PoseStatus::InsufficientMatches,
            pose: None,
            inliers: 0,
            correspondences,
            mean_residual: None,
            homography: None,
        }
    }

    pub fn rejected(correspondences: usize, inliers: usize) -> Self {
        Self {
            status: PoseStatus::PoseRejected,
            pose: None,
            inliers,
            correspondences,
            mean_residual: None,
            homography: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == PoseStatus::Valid
    }

    pub fn inlier_ratio(&self) -> f64 {
        if self.correspondences == 0 {
            0.0
        } else {
            self.inliers as f64 / self.correspondences as f64
        }
    }
}

/// Metric frame of the reference plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceMetric {
    /// Reference image size in pixels.
    pub width: u32,
    pub height: u32,
    /// Physical size of one reference pixel.
    pub units_per_pixel: f64,
}

impl ReferenceMetric {
    /// Reference of the given pixel size spanning `physical_width` units horizontally.
    pub fn from_width(width: u32, height: u32, physical_width: f64) -> Self {
        Self {
            width,
            height,
            units_per_pixel: physical_width / width as f64,
        }
    }

    /// Maps metric plane coordinates onto reference pixels.
    pub fn plane_to_pixels(&self) -> Matrix3<f64> {
        let inverse = 1.0 / self.units_per_pixel;
        let cx = (self.width as f64 - 1.0) / 2.0;
        let cy = (self.height as f64 - 1.0) / 2.0;
        Matrix3::new(inverse, 0.0, cx, 0.0, inverse, cy, 0.0, 0.0, 1.0)
    }
}

/// Recovers the camera pose from matched reference and live points.
pub trait PoseEstimator {
    /// Correspondences below this count are never fitted.
    fn min_correspondences(&self) -> usize;

    fn estimate(
        &self,
        pairs: &[PointPair],
        reference: &ReferenceMetric,
        camera_intrinsic: &Matrix3<f64>,
    ) -> PoseResult;
}

/// Robust homography between reference and live pixels, decomposed into a pose.
#[derive(Debug, Clone, Default)]
pub struct HomographyPoseEstimator {
    config: EstimatorConfig,
}

impl HomographyPoseEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }
}

impl PoseEstimator for HomographyPoseEstimator {
    fn min_correspondences(&self) -> usize {
        <HomographyEstimator as Estimator<PointPair>>::MIN_SAMPLES.max(self.config.min_inliers)
    }

    fn estimate(
        &self,
        pairs: &[PointPair],
        reference: &ReferenceMetric,
        camera_intrinsic: &Matrix3<f64>,
    ) -> PoseResult {
        let correspondences = pairs.len();
        if correspondences < self.min_correspondences() {
            return PoseResult::insufficient(correspondences);
        }

        let Some(consensus) = fit_robust(&HomographyEstimator, pairs, &self.config) else {
            debug!(correspondences, "no homography consensus");
            return PoseResult::rejected(correspondences, 0);
        };

        let inliers = consensus.inliers.len();
        let ratio = inliers as f64 / correspondences as f64;
        if inliers < self.config.min_inliers
            || ratio < self.config.min_inlier_ratio
            || consensus.mean_residual > self.config.reprojection_threshold
        {
            debug!(correspondences, inliers, "homography support too weak");
            return PoseResult::rejected(correspondences, inliers);
        }

        let homography = consensus.model.0;
        let plane_to_image = homography * reference.plane_to_pixels();
        let Some((rotation, translation)) = pose_from_plane_homography(camera_intrinsic, &plane_to_image)
        else {
            debug!(correspondences, inliers, "homography does not decompose into a pose");
            return PoseResult::rejected(correspondences, inliers);
        };

        PoseResult {
            status: PoseStatus::Valid,
            pose: Some(Pose {
                rotation,
                translation,
            }),
            inliers,
            correspondences,
            mean_residual: Some(consensus.mean_residual),
            homography: Some(homography),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::camera::get_camera_intrinsic;
    use approx::assert_relative_eq;
    use nalgebra::Point2;

    #[test]
    fn too_few_correspondences_skip_fitting() {
        let estimator = HomographyPoseEstimator::default();
        let metric = ReferenceMetric::from_width(100, 100, 1.0);
        let k = get_camera_intrinsic(300.0, 320.0, 240.0);
        let pairs = vec![PointPair::new(Point2::new(1.0, 2.0), Point2::new(3.0, 4.0)); 9];

        let result = estimator.estimate(&pairs, &metric, &k);
        assert_eq!(result.status, PoseStatus::InsufficientMatches);
        assert_eq!(result.correspondences, 9);
        assert!(result.pose.is_none());
        assert!(!result.is_valid());
    }

    #[test]
    fn minimum_follows_configured_inliers() {
        let small = HomographyPoseEstimator::new(EstimatorConfig {
            min_inliers: 2,
            ..Default::default()
        });
        assert_eq!(small.min_correspondences(), 4);
        assert_eq!(HomographyPoseEstimator::default().min_correspondences(), 10);
    }

    #[test]
    fn reference_centre_maps_to_the_plane_origin() {
        let metric = ReferenceMetric::from_width(201, 101, 0.5);
        let centre = metric.plane_to_pixels() * Vector3::new(0.0, 0.0, 1.0);
        assert_relative_eq!(centre, Vector3::new(100.0, 50.0, 1.0));

        let corner = metric.plane_to_pixels() * Vector3::new(0.25, 0.0, 1.0);
        assert_relative_eq!(corner.x, 100.0 + 100.5, epsilon = 1e-9);
    }

    #[test]
    fn rotation_vector_is_axis_times_angle() {
        let pose = Pose {
            rotation: Rotation3::from_axis_angle(&Vector3::z_axis(), 0.3),
            translation: Vector3::new(0.0, 0.0, 2.0),
        };
        assert_relative_eq!(pose.rotation_vector(), Vector3::new(0.0, 0.0, 0.3), epsilon = 1e-12);
        assert_relative_eq!(pose.quaternion().angle(), 0.3, epsilon = 1e-12);
    }
}
