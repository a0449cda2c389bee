use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;
use nalgebra::Point2;

use crate::{
    algorithms::{
        brief::{self, BinaryDescriptor, Descriptor, DESCRIPTOR_SIZE},
        corners::{self, CornerParams, Disc},
        pyramid::ScalePyramid,
    },
    config::OrbConfig,
};

/// Corners closer than this to a level's edge are skipped.
const DETECTION_BORDER: u32 = 3;

/// A detected interest point, expressed in level-0 pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Pyramid level the point was detected on.
    pub octave: usize,
    /// Downscale of that level relative to the input image.
    pub scale: f32,
    /// Patch orientation in radians.
    pub angle: f32,
    pub response: f32,
}

impl Keypoint {
    pub fn point(&self) -> Point2<f64> {
        Point2::new(self.x as f64, self.y as f64)
    }
}

/// Feature object which holds a keypoint on the image
/// and tries to handle a generic descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct Feature<Descriptor> {
    pub keypoint: Keypoint,
    pub descriptor: Descriptor,
}

impl<const N: usize> Default for Feature<BinaryDescriptor<N>> {
    fn default() -> Self {
        Self {
            keypoint: Keypoint::default(),
            descriptor: [0; N],
        }
    }
}

pub type OrbFeature = Feature<Descriptor>;

/// Every feature extracted from one image, with that image's dimensions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    pub features: Vec<OrbFeature>,
    pub width: u32,
    pub height: u32,
}

impl FeatureSet {
    pub fn new(features: Vec<OrbFeature>, width: u32, height: u32) -> Self {
        Self {
            features,
            width,
            height,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OrbFeature> {
        self.features.iter()
    }
}

/// Turns a grayscale image into a set of keypoints with binary descriptors.
///
/// Implementations must be deterministic: the same image yields the same set.
pub trait FeatureExtractor {
    fn extract(&self, image: &GrayImage) -> FeatureSet;
}

/// ORB (Oriented FAST and Rotated BRIEF) style extractor: corners on a scale
/// pyramid, oriented by their intensity centroid, described by steered BRIEF.
pub struct OrbExtractor {
    config: OrbConfig,
    disc: Disc,
}

impl OrbExtractor {
    pub fn new(config: OrbConfig) -> Self {
        let disc = Disc::new(config.patch_radius);
        Self { config, disc }
    }

    pub fn config(&self) -> &OrbConfig {
        &self.config
    }

    /// Splits the feature budget over the levels geometrically, so every
    /// level gets a share proportional to its area.
    fn level_budgets(&self, levels: usize) -> Vec<usize> {
        let total = self.config.max_features;
        let factor = 1.0 / (self.config.scale_factor as f64).powi(2);
        let first = total as f64 * (1.0 - factor) / (1.0 - factor.powi(levels as i32));

        let mut budgets = Vec::with_capacity(levels);
        let mut assigned = 0;
        for level in 0..levels {
            let share = if level + 1 == levels {
                total.saturating_sub(assigned)
            } else {
                ((first * factor.powi(level as i32)).round() as usize).min(total - assigned)
            };
            assigned += share;
            budgets.push(share);
        }
        budgets
    }
}

impl Default for OrbExtractor {
    fn default() -> Self {
        Self::new(OrbConfig::default())
    }
}

impl FeatureExtractor for OrbExtractor {
    fn extract(&self, image: &GrayImage) -> FeatureSet {
        let (width, height) = image.dimensions();
        let config = &self.config;
        let pyramid = ScalePyramid::build(image, config.n_levels, config.scale_factor);
        let budgets = self.level_budgets(pyramid.levels.len());

        let mut features = Vec::new();
        for (octave, (level, budget)) in pyramid.levels.iter().zip(budgets).enumerate() {
            let params = CornerParams {
                detector: config.detector,
                harris_k: config.harris_k,
                quality_level: config.quality_level,
                fast_threshold: config.fast_threshold,
                border: DETECTION_BORDER,
                max_corners: budget,
            };
            let found = corners::detect_corners(&level.image, &params);
            if found.is_empty() {
                continue;
            }

            // apply a guassian blur to the level before sampling orientation and BRIEF tests,
            // that way the descriptor is not overly sensitive to high frequency noise.
            let smoothed = if config.smoothing_sigma > 0.0 {
                gaussian_blur_f32(&level.image, config.smoothing_sigma)
            } else {
                level.image.clone()
            };

            features.extend(found.into_iter().map(|corner| {
                let angle = corners::intensity_centroid_angle(&smoothed, corner.x, corner.y, &self.disc);
                let descriptor: BinaryDescriptor<DESCRIPTOR_SIZE> =
                    brief::compute_descriptor(&smoothed, corner.x, corner.y, angle, config.patch_radius);
                let (x, y) = level.to_base(corner.x, corner.y);

                Feature {
                    keypoint: Keypoint {
                        x,
                        y,
                        octave,
                        scale: level.scale,
                        angle,
                        response: corner.response,
                    },
                    descriptor,
                }
            }));
        }

        FeatureSet::new(features, width, height)
    }
}
