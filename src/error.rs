use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("failed to open video {path:?}")]
    VideoOpen { path: PathBuf },

    #[error("video {path:?} contains no frames")]
    EmptyVideo { path: PathBuf },

    #[error("video has {frames} frames but the track table has {tracks}")]
    FrameCountMismatch { frames: usize, tracks: usize },

    #[error("stale cache {path:?}: {reason}")]
    StaleCache { path: PathBuf, reason: String },

    #[error("team color model: {0}")]
    TeamModel(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
