//! The tracking chain: features, matching, pose, and the threads around them.

pub mod features;
pub mod frame;
pub mod matcher;
pub mod pipeline;
pub mod pose;
pub mod session;
