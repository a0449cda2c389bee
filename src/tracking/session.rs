use std::sync::Arc;

use image::{DynamicImage, GrayImage};
use tracing::{debug, info, trace};

use crate::{
    algorithms::{camera::get_camera_intrinsic, homography::PointPair},
    config::{CameraConfig, TrackerConfig},
    error::{TrackingError, Usage},
    tracking::{
        features::{FeatureExtractor, FeatureSet, OrbExtractor},
        frame::{gray_from_dynamic, gray_from_rgba},
        matcher::{BruteForceMatcher, DescriptorMatcher},
        pose::{HomographyPoseEstimator, PoseEstimator, PoseResult, ReferenceMetric},
    },
};

/// Features of the tracked reference, shared read-only with the worker.
#[derive(Debug)]
pub struct Reference {
    pub features: FeatureSet,
    pub metric: ReferenceMetric,
}

enum SessionState {
    Unarmed,
    Armed(Arc<Reference>),
}

/// Tracks one planar reference across frames.
///
/// Starts Unarmed; [`TrackingSession::initialize`] extracts the reference
/// features once and arms it. The reference can not be swapped afterwards.
pub struct TrackingSession<X = OrbExtractor, M = BruteForceMatcher, P = HomographyPoseEstimator> {
    extractor: X,
    matcher: M,
    estimator: P,
    camera: CameraConfig,
    physical_width: f64,
    state: SessionState,
}

impl TrackingSession {
    /// Builds the default components from a validated config.
    pub fn new(config: &TrackerConfig) -> Result<Self, TrackingError> {
        config.validate()?;
        Ok(Self::with_components(
            OrbExtractor::new(config.extractor.clone()),
            BruteForceMatcher::new(config.matcher.clone()),
            HomographyPoseEstimator::new(config.estimator.clone()),
            config.camera.clone(),
            config.reference.physical_width,
        ))
    }
}

impl Default for TrackingSession {
    fn default() -> Self {
        let config = TrackerConfig::default();
        Self::with_components(
            OrbExtractor::new(config.extractor),
            BruteForceMatcher::new(config.matcher),
            HomographyPoseEstimator::new(config.estimator),
            config.camera,
            config.reference.physical_width,
        )
    }
}

impl<X, M, P> TrackingSession<X, M, P>
where
    X: FeatureExtractor,
    M: DescriptorMatcher,
    P: PoseEstimator,
{
    pub fn with_components(extractor: X, matcher: M, estimator: P, camera: CameraConfig, physical_width: f64) -> Self {
        Self {
            extractor,
            matcher,
            estimator,
            camera,
            physical_width,
            state: SessionState::Unarmed,
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, SessionState::Armed(_))
    }

    pub fn reference(&self) -> Option<&Arc<Reference>> {
        match &self.state {
            SessionState::Armed(reference) => Some(reference),
            SessionState::Unarmed => None,
        }
    }

    /// Extracts the reference features and arms the session.
    ///
    /// Fails without changing state when the image does not carry enough
    /// features for a pose, or when the session is already armed.
    pub fn initialize(&mut self, image: &GrayImage) -> Result<Arc<Reference>, TrackingError> {
        if self.is_armed() {
            return Err(TrackingError::InvalidUsage(Usage::AlreadyInitialized));
        }

        let features = self.extractor.extract(image);
        let required = self.estimator.min_correspondences();
        if features.len() < required {
            return Err(TrackingError::ReferenceFeatureShortage {
                found: features.len(),
                required,
            });
        }

        let (width, height) = image.dimensions();
        info!(features = features.len(), width, height, "reference armed");
        let reference = Arc::new(Reference {
            features,
            metric: ReferenceMetric::from_width(width, height, self.physical_width),
        });
        self.state = SessionState::Armed(reference.clone());
        Ok(reference)
    }

    /// Same as [`TrackingSession::initialize`], for an 8-bit RGBA reference buffer.
    pub fn initialize_rgba(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Arc<Reference>, TrackingError> {
        let gray = gray_from_rgba(pixels, width, height)?;
        self.initialize(&gray)
    }

    /// Same as [`TrackingSession::initialize`], for a decoded image of any color type.
    pub fn initialize_dynamic(&mut self, image: &DynamicImage) -> Result<Arc<Reference>, TrackingError> {
        let gray = gray_from_dynamic(image)?;
        self.initialize(&gray)
    }

    /// Runs extraction, matching and pose estimation on one upright frame.
    pub fn estimate(&self, image: &GrayImage) -> Result<PoseResult, TrackingError> {
        let SessionState::Armed(reference) = &self.state else {
            return Err(TrackingError::InvalidUsage(Usage::NotInitialized));
        };

        let live = self.extractor.extract(image);
        let pairs: Vec<PointPair> = self
            .matcher
            .match_features(&live, &reference.features)
            .map(|c| {
                PointPair::new(
                    reference.features.features[c.reference].keypoint.point(),
                    live.features[c.live].keypoint.point(),
                )
            })
            .collect();
        trace!(live = live.len(), matches = pairs.len(), "matched frame");

        let (width, height) = image.dimensions();
        let camera_intrinsic = get_camera_intrinsic(self.camera.focal_length(width), width as f64, height as f64);
        let result = self.estimator.estimate(&pairs, &reference.metric, &camera_intrinsic);

        debug!(
            status = ?result.status,
            features = live.len(),
            correspondences = result.correspondences,
            inliers = result.inliers,
            "frame estimated"
        );
        Ok(result)
    }
}
