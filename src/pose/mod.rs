#[cfg(feature = "desktop")]
pub mod detector;
pub mod keypoint;
pub mod landmarks;
#[cfg(feature = "desktop")]
pub mod preprocess;
pub mod raster;
pub mod sequence;
pub mod source;

#[cfg(feature = "desktop")]
pub use detector::PoseDetector;
pub use keypoint::{Keypoint, KeypointIndex, Pose};
pub use landmarks::{LandmarkMap, Landmarks};
#[cfg(feature = "desktop")]
pub use preprocess::preprocess_for_movenet;
pub use raster::RasterImage;
pub use sequence::{PoseSequence, Sample};
pub use source::{KeypointSource, SharedSource};
