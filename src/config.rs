use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Pipeline thresholds and calibration, loaded from a JSON file.
///
/// Every field has a default, so `{}` is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub perspective: PerspectiveConfig,
    pub kinematics: KinematicsConfig,
    pub possession: PossessionConfig,
}

/// How the per-frame camera displacement is applied to raw positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compensation {
    /// Subtract the displacement measured for the frame itself.
    #[default]
    PerFrame,
    /// Subtract the running sum of displacements up to the frame.
    Cumulative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub max_corners: i32,
    pub quality_level: f64,
    pub min_feature_distance: f64,
    pub block_size: i32,
    /// Half-open pixel column ranges `[start, end)` searched for features.
    pub feature_bands: Vec<[i32; 2]>,
    pub win_size: i32,
    pub max_level: i32,
    pub max_iterations: i32,
    pub epsilon: f64,
    /// Displacements at or below this many pixels count as a still camera.
    pub min_movement: f32,
    pub compensation: Compensation,
}

impl Default for CameraConfig {
    fn default() -> Self {
        CameraConfig {
            max_corners: 100,
            quality_level: 0.3,
            min_feature_distance: 3.0,
            block_size: 7,
            feature_bands: vec![[0, 20], [900, 1050]],
            win_size: 15,
            max_level: 2,
            max_iterations: 10,
            epsilon: 0.03,
            min_movement: 5.0,
            compensation: Compensation::PerFrame,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerspectiveConfig {
    /// Court corners in pixel space: bottom-left, top-left, top-right, bottom-right.
    pub pixel_vertices: [[f32; 2]; 4],
    pub court_width: f32,
    pub court_length: f32,
}

impl Default for PerspectiveConfig {
    fn default() -> Self {
        PerspectiveConfig {
            pixel_vertices: [
                [110.0, 1035.0],
                [265.0, 275.0],
                [910.0, 260.0],
                [1640.0, 915.0],
            ],
            court_width: 68.0,
            court_length: 23.32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicsConfig {
    pub frame_window: usize,
    pub frame_rate: f32,
    /// Field-plane displacement under this is treated as noise.
    pub min_distance: f32,
    /// Windows faster than this are dropped as tracking glitches.
    pub max_speed_kmh: f32,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        KinematicsConfig {
            frame_window: 5,
            frame_rate: 24.0,
            min_distance: 0.1,
            max_speed_kmh: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PossessionConfig {
    pub max_player_ball_distance: f32,
}

impl Default for PossessionConfig {
    fn default() -> Self {
        PossessionConfig {
            max_player_ball_distance: 70.0,
        }
    }
}

impl Config {
    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let cfg: Config = serde_json::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.kinematics.frame_window == 0 {
            return Err(Error::InvalidConfig("kinematics.frame_window must be > 0".into()));
        }
        if !(self.kinematics.frame_rate > 0.0) {
            return Err(Error::InvalidConfig("kinematics.frame_rate must be > 0".into()));
        }
        if let Some(band) = self.camera.feature_bands.iter().find(|b| b[0] < 0 || b[1] <= b[0]) {
            return Err(Error::InvalidConfig(format!(
                "camera.feature_bands entry {:?} is empty or negative",
                band
            )));
        }
        if self.camera.win_size <= 0 || self.camera.max_corners <= 0 {
            return Err(Error::InvalidConfig(
                "camera.win_size and camera.max_corners must be > 0".into(),
            ));
        }
        Ok(())
    }
}
