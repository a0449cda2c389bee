//! Collection of general image and geometry algorithms which may be useful
//! to any kind of feature based pose tracking implementation

pub mod brief;
pub mod camera;
pub mod consensus;
pub mod corners;
pub mod homography;
pub mod pyramid;
