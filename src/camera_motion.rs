//! Camera motion estimation from background feature tracking.
//!
//! Broadcast footage pans to follow play. Sparse corners are tracked with
//! pyramidal Lucas-Kanade inside pixel bands that only show the stands and
//! touchline, and the largest tracked shift is taken as the camera motion for
//! that frame.
use nalgebra::Vector2;
use opencv::{
    core::{Mat, Point2f, Rect, Scalar, Size, TermCriteria, Vector, CV_8UC1},
    imgproc,
    prelude::*,
    video::calc_optical_flow_pyr_lk,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{CameraConfig, Compensation};
use crate::error::{Error, Result};
use crate::track::{ObjectClass, TrackTable};

/// Pixel shift of the camera between a frame and the one before it.
pub type Displacement = Vector2<f32>;

pub const CAMERA_CACHE_SCHEMA: &str = "camera-movement/v1";

/// Anything that can provide the per-frame camera movement of a video.
pub trait CameraMovementSource {
    fn camera_movement(&self, frames: &[Mat]) -> Result<Vec<Displacement>>;
}

/// Computes camera movement from scratch with sparse optical flow.
pub struct CameraMotionEstimator {
    config: CameraConfig,
}

impl CameraMotionEstimator {
    pub fn new(config: &CameraConfig) -> Self {
        CameraMotionEstimator {
            config: config.clone(),
        }
    }

    fn criteria(&self) -> Result<TermCriteria> {
        Ok(TermCriteria::new(
            opencv::core::TermCriteria_Type::COUNT as i32 | opencv::core::TermCriteria_Type::EPS as i32,
            self.config.max_iterations,
            self.config.epsilon,
        )?)
    }

    /// Binary mask that is non-zero only inside the configured column bands.
    pub fn feature_mask(&self, size: Size) -> Result<Mat> {
        let mut mask = Mat::new_size_with_default(size, CV_8UC1, Scalar::all(0.0))?;
        for band in &self.config.feature_bands {
            let start = band[0].clamp(0, size.width);
            let end = band[1].clamp(0, size.width);
            if end <= start {
                continue;
            }
            let rect = Rect::new(start, 0, end - start, size.height);
            imgproc::rectangle(&mut mask, rect, Scalar::all(255.0), imgproc::FILLED, imgproc::LINE_8, 0)?;
        }
        Ok(mask)
    }

    fn detect_features(&self, gray: &Mat, mask: &Mat) -> Result<Vector<Point2f>> {
        let mut corners = Vector::<Point2f>::new();
        imgproc::good_features_to_track(
            gray,
            &mut corners,
            self.config.max_corners,
            self.config.quality_level,
            self.config.min_feature_distance,
            mask,
            self.config.block_size,
            false,
            0.04,
        )?;
        Ok(corners)
    }

    /// Displacement for every frame; frame 0 is always zero.
    pub fn estimate(&self, frames: &[Mat]) -> Result<Vec<Displacement>> {
        let mut movement = vec![Displacement::zeros(); frames.len()];
        let Some(first) = frames.first() else {
            return Ok(movement);
        };

        let criteria = self.criteria()?;
        let win_size = Size::new(self.config.win_size, self.config.win_size);

        let mut old_gray = to_gray(first)?;
        let mask = self.feature_mask(old_gray.size()?)?;
        let mut old_features = self.detect_features(&old_gray, &mask)?;
        debug!("{} background features in frame 0", old_features.len());

        for (frame_num, frame) in frames.iter().enumerate().skip(1) {
            let gray = to_gray(frame)?;

            if old_features.is_empty() {
                // Nothing to track; the frame keeps zero movement.
                old_features = self.detect_features(&gray, &mask)?;
                old_gray = gray;
                continue;
            }

            let mut new_features = Vector::<Point2f>::new();
            let mut status = Vector::<u8>::new();
            let mut err = Vector::<f32>::new();
            calc_optical_flow_pyr_lk(
                &old_gray,
                &gray,
                &old_features,
                &mut new_features,
                &mut status,
                &mut err,
                win_size,
                self.config.max_level,
                criteria,
                0,
                1e-4,
            )?;

            let tracked = old_features
                .iter()
                .zip(new_features.iter())
                .zip(status.iter())
                .filter(|(_, ok)| *ok != 0)
                .map(|(pair, _)| pair);

            if let Some(shift) = largest_displacement(tracked) {
                if shift.norm() > self.config.min_movement {
                    movement[frame_num] = shift;
                    old_features = self.detect_features(&gray, &mask)?;
                }
            }

            old_gray = gray;
        }

        let moving = movement.iter().filter(|m| **m != Displacement::zeros()).count();
        info!("camera moved in {} of {} frames", moving, frames.len());
        Ok(movement)
    }
}

impl CameraMovementSource for CameraMotionEstimator {
    fn camera_movement(&self, frames: &[Mat]) -> Result<Vec<Displacement>> {
        self.estimate(frames)
    }
}

fn to_gray(frame: &Mat) -> Result<Mat> {
    if frame.channels() == 1 {
        return Ok(frame.try_clone()?);
    }
    let mut gray = Mat::default();
    imgproc::cvt_color_def(frame, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    Ok(gray)
}

/// Camera shift implied by the tracked pair that moved the most, as `old - new`.
///
/// Returns `None` when no pair moved at all.
pub fn largest_displacement<I>(pairs: I) -> Option<Displacement>
where
    I: IntoIterator<Item = (Point2f, Point2f)>,
{
    let mut max_distance = 0.0f32;
    let mut best = None;
    for (old, new) in pairs {
        let shift = Displacement::new(old.x - new.x, old.y - new.y);
        let distance = shift.norm();
        if distance > max_distance {
            max_distance = distance;
            best = Some(shift);
        }
    }
    best
}

#[derive(Debug, Serialize, Deserialize)]
struct CameraMovementFile {
    schema: String,
    frame_count: usize,
    movement: Vec<[f32; 2]>,
}

/// File-backed camera movement for a specific video.
pub struct CameraMovementCache {
    path: PathBuf,
}

impl CameraMovementCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CameraMovementCache { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached sequence, checking it was written for `frame_count` frames.
    pub fn load(&self, frame_count: usize) -> Result<Vec<Displacement>> {
        let data = fs::read_to_string(&self.path)?;
        let file: CameraMovementFile = serde_json::from_str(&data)?;
        if file.schema != CAMERA_CACHE_SCHEMA {
            return Err(Error::StaleCache {
                path: self.path.clone(),
                reason: format!("schema {:?}, expected {:?}", file.schema, CAMERA_CACHE_SCHEMA),
            });
        }
        if file.frame_count != frame_count || file.movement.len() != frame_count {
            return Err(Error::StaleCache {
                path: self.path.clone(),
                reason: format!("{} frames cached, video has {}", file.movement.len(), frame_count),
            });
        }
        Ok(file.movement.into_iter().map(|[x, y]| Displacement::new(x, y)).collect())
    }

    pub fn save(&self, movement: &[Displacement]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = CameraMovementFile {
            schema: CAMERA_CACHE_SCHEMA.to_string(),
            frame_count: movement.len(),
            movement: movement.iter().map(|m| [m.x, m.y]).collect(),
        };
        fs::write(&self.path, serde_json::to_string(&file)?)?;
        Ok(())
    }
}

impl CameraMovementSource for CameraMovementCache {
    fn camera_movement(&self, frames: &[Mat]) -> Result<Vec<Displacement>> {
        self.load(frames.len())
    }
}

/// Serves camera movement from a cache file, computing and storing it on a miss.
///
/// A missing, corrupt, or stale cache file is a miss, never an error.
pub struct CachedCameraMovement<S> {
    cache: CameraMovementCache,
    inner: S,
}

impl<S: CameraMovementSource> CachedCameraMovement<S> {
    pub fn new(path: impl Into<PathBuf>, inner: S) -> Self {
        CachedCameraMovement {
            cache: CameraMovementCache::new(path),
            inner,
        }
    }
}

impl<S: CameraMovementSource> CameraMovementSource for CachedCameraMovement<S> {
    fn camera_movement(&self, frames: &[Mat]) -> Result<Vec<Displacement>> {
        if self.cache.path().exists() {
            match self.cache.load(frames.len()) {
                Ok(movement) => {
                    info!("camera movement loaded from {:?}", self.cache.path());
                    return Ok(movement);
                }
                Err(e) => warn!("ignoring camera cache {:?}: {}", self.cache.path(), e),
            }
        }
        let movement = self.inner.camera_movement(frames)?;
        self.cache.save(&movement)?;
        info!("camera movement cached to {:?}", self.cache.path());
        Ok(movement)
    }
}

/// Write `adjusted_position = position - offset[frame]` for every record of every class.
pub fn adjust_positions(table: &mut TrackTable, movement: &[Displacement], mode: Compensation) {
    let offsets: Vec<Displacement> = match mode {
        Compensation::PerFrame => movement.to_vec(),
        Compensation::Cumulative => movement
            .iter()
            .scan(Displacement::zeros(), |total, m| {
                *total += m;
                Some(*total)
            })
            .collect(),
    };

    for class in ObjectClass::ALL {
        for (frame_num, frame) in table.frames_mut(class).iter_mut().enumerate() {
            let offset = offsets.get(frame_num).copied().unwrap_or_else(Displacement::zeros);
            for record in frame.values_mut() {
                if let Some(position) = record.position {
                    record.adjusted_position = Some(position - offset);
                }
            }
        }
    }
}
