//! Tracking of a planar reference image in a live camera feed.
//!
//! A [`TrackingSession`] extracts ORB-style features from the reference once,
//! then matches every live frame against them and recovers the camera pose
//! from a robust plane homography. [`FramePipeline`] runs a session on its own
//! thread behind a single latest-wins frame slot.
//!
//! ```no_run
//! use planar_tracker::{Frame, FramePipeline, TrackerConfig, TrackingSession};
//!
//! # fn main() -> Result<(), planar_tracker::TrackingError> {
//! # let reference = image::GrayImage::new(320, 240);
//! let mut session = TrackingSession::new(&TrackerConfig::default())?;
//! session.initialize(&reference)?;
//!
//! let (pipeline, poses) = FramePipeline::spawn(session)?;
//! pipeline.submit(Frame::new(vec![0; 640 * 480], 640, 480, 0))?;
//! if let Ok(update) = poses.recv() {
//!     if let Some(pose) = update.result.pose {
//!         println!("rvec {:?} tvec {:?}", pose.rotation_vector(), pose.translation);
//!     }
//! }
//! pipeline.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod algorithms;
pub mod config;
pub mod error;
pub mod tracking;

pub use config::TrackerConfig;
pub use error::{ConfigError, FrameError, TrackingError, Usage};
pub use tracking::{
    features::{Feature, FeatureExtractor, FeatureSet, Keypoint, OrbExtractor},
    frame::{gray_from_dynamic, gray_from_rgb, gray_from_rgba, sensor_to_device_rotation, Frame, FrameRotation},
    matcher::{BruteForceMatcher, Correspondence, DescriptorMatcher},
    pipeline::{FramePipeline, FrameProducer, FrameTicket, PipelineStats, PoseUpdate},
    pose::{HomographyPoseEstimator, Pose, PoseEstimator, PoseResult, PoseStatus, ReferenceMetric},
    session::{Reference, TrackingSession},
};
