pub mod canvas;
pub mod face;
pub mod model;
pub mod pipeline;
pub mod video;
pub mod yunet;

// Re-export commonly used types
pub use canvas::Canvas;
pub use face::Detection;
pub use model::ModelPaths;
pub use pipeline::{Face, Pipeline, SingleFace};
pub use video::{Camera, CameraFeed, FeedStatus};
