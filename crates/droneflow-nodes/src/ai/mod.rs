//! AI nodes
//!
//! Perception and language tasks served by the host's inference backends.
//! Failures here are usually transient or "service unavailable", which the
//! default error policy turns into fallback results.

mod capture_image;
mod chat;
mod object_detection;
mod segmentation;
mod vision_analysis;

pub use capture_image::CaptureImageNode;
pub use chat::ChatNode;
pub use object_detection::ObjectDetectionNode;
pub use segmentation::SegmentationNode;
pub use vision_analysis::VisionAnalysisNode;

/// Context variable holding the most recent capture
pub const LAST_IMAGE: &str = "last_image";
