pub mod backend;
pub mod config;
pub mod error;
pub mod geometry;
pub mod inference;
pub mod lifecycle;
pub mod loader;
pub mod matcher;
pub mod overlay;
pub mod roster;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod video;

pub use geometry::{BoundingBox, Point, Size};
pub use inference::{DetectOptions, DetectionResult, FaceInference, Frame, ReferenceFace};
pub use lifecycle::{LifecycleManager, Readiness, SessionInputs, SessionSettings};
pub use loader::{DescriptorLoader, LoadSummary};
pub use matcher::{LabeledDescriptorSet, MatchOutcome, Matcher};
pub use overlay::{BoxStyle, OverlayFrame, OverlayRenderer, Surface, SurfaceSlot};
pub use roster::{RosterClient, RosterEntry};
pub use scheduler::{Phase, SamplingScheduler, ScheduleConfig};
pub use session::SessionStats;
pub use video::{PlaybackState, VideoSource};
