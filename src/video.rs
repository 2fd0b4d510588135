use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::path::Path;
use tracing::info;

use crate::error::{Error, Result};

/// Decode every frame of the video at `path` into memory.
pub fn read_video(path: &Path) -> Result<Vec<Mat>> {
    let mut cap = VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)?;
    if !cap.is_opened()? {
        return Err(Error::VideoOpen {
            path: path.to_path_buf(),
        });
    }

    let fps = cap.get(videoio::CAP_PROP_FPS)?;
    let mut frames = Vec::new();
    let mut frame = Mat::default();
    while cap.read(&mut frame)? {
        if frame.empty() {
            break;
        }
        frames.push(frame.try_clone()?);
    }

    if frames.is_empty() {
        return Err(Error::EmptyVideo {
            path: path.to_path_buf(),
        });
    }
    let size = frames[0].size()?;
    info!(
        "read {} frames ({}x{}, {:.2} fps) from {:?}",
        frames.len(),
        size.width,
        size.height,
        fps,
        path
    );
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_video_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_video(&dir.path().join("missing.mp4"));
        assert!(matches!(result, Err(Error::VideoOpen { .. }) | Err(Error::OpenCv(_))));
    }
}
