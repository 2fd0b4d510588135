pub mod camera_motion;
pub mod config;
pub mod error;
pub mod interpolation;
pub mod kinematics;
pub mod perspective;
pub mod pipeline;
pub mod possession;
pub mod report;
pub mod team;
pub mod track;
pub mod tracker;
pub mod utils;
pub mod video;

// Re-export main types
pub use crate::camera_motion::{CachedCameraMovement, CameraMotionEstimator, CameraMovementSource, Displacement};
pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::pipeline::{Pipeline, PipelineOutput};
pub use crate::possession::PossessionTimeline;
pub use crate::report::MatchReport;
pub use crate::track::{BoundingBox, ObjectClass, Team, TrackId, TrackRecord, TrackTable};
pub use crate::tracker::{JsonTrackCache, TrackSource};
